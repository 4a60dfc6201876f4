//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;

use policy_agent::db::schemas::{CatalogSyncState, CatalogSyncStatus, Seller, SellerFilter};
use policy_agent::db::{InMemoryStore, SellerStore};
use policy_agent::registry::{ParticipantSource, RegistryParticipant};
use policy_agent::types::{PolicyAgentError, Result};

pub const DOMAIN: &str = "ONDC:RET10";
pub const ENV: &str = "preprod";
pub const CITY: &str = "std:080";

/// Base64 of a fixed 32-byte Ed25519 seed
pub fn test_private_key() -> String {
    STANDARD.encode([7u8; 32])
}

pub fn participant(id: &str) -> RegistryParticipant {
    RegistryParticipant {
        subscriber_id: id.to_string(),
        subscriber_url: Some(format!("https://{}/ondc", id)),
        domain: DOMAIN.to_string(),
        country: "IND".to_string(),
        city: CITY.to_string(),
        status: "SUBSCRIBED".to_string(),
        valid_from: "2024-01-01T00:00:00.000Z".to_string(),
        valid_until: "2030-01-01T00:00:00.000Z".to_string(),
        raw: format!(r#"{{"subscriber_id":"{}"}}"#, id),
        ..Default::default()
    }
}

pub fn seller(id: &str, subscriber_url: &str, city: &str, active: bool) -> Seller {
    Seller {
        seller_id: id.to_string(),
        domain: DOMAIN.to_string(),
        registry_env: ENV.to_string(),
        status: "SUBSCRIBED".to_string(),
        seller_type: "BPP".to_string(),
        subscriber_url: subscriber_url.to_string(),
        country: "IND".to_string(),
        city: city.to_string(),
        active,
        last_seen_in_registry: Utc::now(),
        ..Default::default()
    }
}

// =============================================================================
// Registry stub
// =============================================================================

/// Canned registry answers per domain; unknown domains fail
#[derive(Default)]
pub struct StubRegistry {
    answers: Mutex<HashMap<String, Vec<RegistryParticipant>>>,
    calls: AtomicUsize,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, domain: &str, participants: Vec<RegistryParticipant>) {
        self.answers
            .lock()
            .unwrap()
            .insert(domain.to_string(), participants);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParticipantSource for StubRegistry {
    async fn lookup(&self, domain: &str) -> Result<Vec<RegistryParticipant>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap()
            .get(domain)
            .cloned()
            .ok_or_else(|| {
                PolicyAgentError::RegistryUnavailable(format!(
                    "API request failed with status 503: {} unavailable",
                    domain
                ))
            })
    }
}

// =============================================================================
// Fault-injecting seller store
// =============================================================================

/// Failure mode for one `SellerStore` operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Fault {
    #[default]
    None,
    Error,
    Panic,
    /// Another writer stores the first row of the batch just before it lands
    Clash,
}

/// Wraps an `InMemoryStore` and breaks selected operations
#[derive(Default)]
pub struct FaultyStore {
    pub inner: InMemoryStore,
    pub insert: Fault,
    pub filter: Fault,
}

impl FaultyStore {
    fn trip(fault: Fault, op: &str) -> Result<()> {
        match fault {
            Fault::None | Fault::Clash => Ok(()),
            Fault::Error => Err(PolicyAgentError::Store(format!("{} unavailable", op))),
            Fault::Panic => panic!("{} exploded", op),
        }
    }
}

#[async_trait]
impl SellerStore for FaultyStore {
    async fn insert_sellers(&self, sellers: &[Seller]) -> Result<Vec<String>> {
        Self::trip(self.insert, "insert")?;
        if self.insert == Fault::Clash {
            if let Some(first) = sellers.first() {
                self.inner.insert_sellers(std::slice::from_ref(first)).await?;
            }
        }
        self.inner.insert_sellers(sellers).await
    }

    async fn update_sellers(&self, sellers: &[Seller]) -> Result<()> {
        self.inner.update_sellers(sellers).await
    }

    async fn deactivate_sellers(
        &self,
        seller_ids: &[String],
        domain: &str,
        registry_env: &str,
    ) -> Result<u64> {
        self.inner
            .deactivate_sellers(seller_ids, domain, registry_env)
            .await
    }

    async fn sellers_by_domain_and_env(
        &self,
        domain: &str,
        registry_env: &str,
    ) -> Result<Vec<Seller>> {
        self.inner.sellers_by_domain_and_env(domain, registry_env).await
    }

    async fn sellers_by_filter(&self, filter: &SellerFilter) -> Result<Vec<Seller>> {
        Self::trip(self.filter, "filter")?;
        self.inner.sellers_by_filter(filter).await
    }

    async fn seller_by_id(
        &self,
        seller_id: &str,
        domain: &str,
        registry_env: &str,
    ) -> Result<Option<Seller>> {
        self.inner.seller_by_id(seller_id, domain, registry_env).await
    }

    async fn upsert_catalog_state(&self, state: &CatalogSyncState) -> Result<()> {
        self.inner.upsert_catalog_state(state).await
    }

    async fn catalog_state(
        &self,
        seller_id: &str,
        domain: &str,
        registry_env: &str,
    ) -> Result<Option<CatalogSyncState>> {
        self.inner.catalog_state(seller_id, domain, registry_env).await
    }

    async fn pending_sellers(
        &self,
        domain: &str,
        registry_env: &str,
        statuses: &[CatalogSyncStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CatalogSyncState>> {
        self.inner
            .pending_sellers(domain, registry_env, statuses, limit, offset)
            .await
    }
}
