//! In-memory store
//!
//! Keeps every entity in a map keyed by its natural identity, so the
//! uniqueness and upsert rules hold exactly as they do in MongoDB.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::schemas::{
    AccessPolicy, Bap, CatalogSyncState, CatalogSyncStatus, JobStatus, PermissionsJob, Seller,
    SellerFilter,
};
use super::store::{PermissionsStore, SellerStore};
use crate::types::{PolicyAgentError, Result};

type SellerKey = (String, String, String);
type PolicyKey = (String, String, String, String);

fn seller_key(seller_id: &str, domain: &str, registry_env: &str) -> SellerKey {
    (
        seller_id.to_string(),
        domain.to_string(),
        registry_env.to_string(),
    )
}

/// Store backed by process memory
#[derive(Default)]
pub struct InMemoryStore {
    sellers: RwLock<BTreeMap<SellerKey, Seller>>,
    catalog_states: RwLock<BTreeMap<SellerKey, CatalogSyncState>>,
    baps: RwLock<HashMap<String, Bap>>,
    policies: RwLock<HashMap<PolicyKey, AccessPolicy>>,
    jobs: RwLock<HashMap<Uuid, PermissionsJob>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored policies
    pub async fn policy_count(&self) -> usize {
        self.policies.read().await.len()
    }

    /// Snapshot of every stored policy
    pub async fn all_policies(&self) -> Vec<AccessPolicy> {
        self.policies.read().await.values().cloned().collect()
    }

    /// Number of jobs ever created
    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl SellerStore for InMemoryStore {
    async fn insert_sellers(&self, sellers: &[Seller]) -> Result<Vec<String>> {
        let mut rows = self.sellers.write().await;
        let mut inserted = Vec::with_capacity(sellers.len());
        for seller in sellers {
            if rows.contains_key(&seller.key()) {
                warn!(
                    seller_id = %seller.seller_id,
                    domain = %seller.domain,
                    "Seller identity already stored, insert skipped"
                );
                continue;
            }
            rows.insert(seller.key(), seller.clone());
            inserted.push(seller.seller_id.clone());
        }
        Ok(inserted)
    }

    async fn update_sellers(&self, sellers: &[Seller]) -> Result<()> {
        let mut rows = self.sellers.write().await;
        for seller in sellers {
            rows.insert(seller.key(), seller.clone());
        }
        Ok(())
    }

    async fn deactivate_sellers(
        &self,
        seller_ids: &[String],
        domain: &str,
        registry_env: &str,
    ) -> Result<u64> {
        let mut rows = self.sellers.write().await;
        let mut touched = 0;
        for id in seller_ids {
            if let Some(seller) = rows.get_mut(&seller_key(id, domain, registry_env)) {
                seller.active = false;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn sellers_by_domain_and_env(
        &self,
        domain: &str,
        registry_env: &str,
    ) -> Result<Vec<Seller>> {
        let rows = self.sellers.read().await;
        Ok(rows
            .values()
            .filter(|s| s.domain == domain && s.registry_env == registry_env)
            .cloned()
            .collect())
    }

    async fn sellers_by_filter(&self, filter: &SellerFilter) -> Result<Vec<Seller>> {
        let rows = self.sellers.read().await;
        Ok(rows.values().filter(|s| filter.matches(s)).cloned().collect())
    }

    async fn seller_by_id(
        &self,
        seller_id: &str,
        domain: &str,
        registry_env: &str,
    ) -> Result<Option<Seller>> {
        let rows = self.sellers.read().await;
        Ok(rows.get(&seller_key(seller_id, domain, registry_env)).cloned())
    }

    async fn upsert_catalog_state(&self, state: &CatalogSyncState) -> Result<()> {
        let mut rows = self.catalog_states.write().await;
        let mut state = state.clone();
        state.updated_at = Utc::now();
        rows.insert(
            seller_key(&state.seller_id, &state.domain, &state.registry_env),
            state,
        );
        Ok(())
    }

    async fn catalog_state(
        &self,
        seller_id: &str,
        domain: &str,
        registry_env: &str,
    ) -> Result<Option<CatalogSyncState>> {
        let rows = self.catalog_states.read().await;
        Ok(rows.get(&seller_key(seller_id, domain, registry_env)).cloned())
    }

    async fn pending_sellers(
        &self,
        domain: &str,
        registry_env: &str,
        statuses: &[CatalogSyncStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CatalogSyncState>> {
        let sellers = self.sellers.read().await;
        let states = self.catalog_states.read().await;

        // BTreeMap iteration is ordered by key, and seller_id leads the key.
        Ok(states
            .iter()
            .filter(|(key, state)| {
                state.domain == domain
                    && state.registry_env == registry_env
                    && statuses.contains(&state.status)
                    && sellers.get(*key).is_some_and(|s| s.active)
            })
            .map(|(_, state)| state.clone())
            .skip(offset)
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl PermissionsStore for InMemoryStore {
    async fn upsert_baps(&self, baps: &HashMap<String, Bap>) -> Result<()> {
        let mut rows = self.baps.write().await;
        for (bap_id, bap) in baps {
            match rows.get_mut(bap_id) {
                Some(existing) => existing.last_seen_at = bap.last_seen_at,
                None => {
                    rows.insert(bap_id.clone(), bap.clone());
                }
            }
        }
        Ok(())
    }

    async fn find_bap(&self, bap_id: &str) -> Result<Option<Bap>> {
        Ok(self.baps.read().await.get(bap_id).cloned())
    }

    async fn upsert_access_policies(&self, policies: &[AccessPolicy]) -> Result<()> {
        let mut rows = self.policies.write().await;
        for policy in policies {
            let mut policy = policy.clone();
            policy.updated_at = Utc::now();
            rows.insert(policy.key(), policy);
        }
        Ok(())
    }

    async fn query_access_policies(
        &self,
        bap_id: &str,
        domain: &str,
        registry_env: &str,
        seller_ids: &[String],
    ) -> Result<Vec<AccessPolicy>> {
        let rows = self.policies.read().await;
        Ok(rows
            .values()
            .filter(|p| {
                p.bap_id == bap_id
                    && p.domain == domain
                    && p.registry_env == registry_env
                    && seller_ids.contains(&p.seller_id)
            })
            .cloned()
            .collect())
    }

    async fn policy_for_bap(&self, bap_id: &str) -> Result<Option<AccessPolicy>> {
        let rows = self.policies.read().await;
        Ok(rows.values().find(|p| p.bap_id == bap_id).cloned())
    }

    async fn initiated_job_for_bap(&self, bap_id: &str) -> Result<Option<PermissionsJob>> {
        let rows = self.jobs.read().await;
        Ok(rows
            .values()
            .find(|j| j.bap_id == bap_id && j.status == JobStatus::Initiated)
            .cloned())
    }

    async fn create_job(&self, job: &PermissionsJob) -> Result<()> {
        let mut rows = self.jobs.write().await;
        if rows.contains_key(&job.id) {
            return Err(PolicyAgentError::Store(format!("duplicate job id {}", job.id)));
        }
        if let Some(running) = rows
            .values()
            .find(|j| j.bap_id == job.bap_id && j.status == JobStatus::Initiated)
        {
            return Err(PolicyAgentError::AlreadyResolved(format!(
                "broadcast {} already in progress for bap_id: {}",
                running.id, job.bap_id
            )));
        }
        rows.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<()> {
        let mut rows = self.jobs.write().await;
        let job = rows
            .get_mut(&job_id)
            .ok_or_else(|| PolicyAgentError::NotFound(format!("job {}", job_id)))?;
        if job.status.is_terminal() {
            return Err(PolicyAgentError::AlreadyResolved(format!(
                "job {} already {}",
                job_id, job.status
            )));
        }
        job.status = status;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<PermissionsJob>> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }
}
