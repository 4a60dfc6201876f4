//! Buyer Service
//!
//! Bulk permission updates and per-buyer permission queries.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::schemas::{AccessDecision, AccessPolicy, Bap, DecisionSource};
use crate::db::PermissionsStore;
use crate::types::{PolicyAgentError, Result};

/// Decision reported for a seller with no stored policy
pub const NO_POLICY: &str = "NO_POLICY";

// ============================================================================
// Types
// ============================================================================

/// One manual permission decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionUpdate {
    pub seller_id: String,
    pub domain: String,
    pub registry_env: String,
    pub bap_id: String,
    pub decision: String,
    #[serde(default)]
    pub decision_source: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionUpdateResult {
    pub seller_id: String,
    pub domain: String,
    pub registry_env: String,
    pub bap_id: String,
    pub decision: AccessDecision,
    pub stored: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionsQuery {
    pub bap_id: String,
    pub domain: String,
    pub registry_env: String,
    pub seller_ids: Vec<String>,
    #[serde(default)]
    pub include_no_policy: bool,
}

/// Whether the buyer was known before this query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BapStatus {
    NewBap,
    ExistingBap,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionDetail {
    pub seller_id: String,
    pub domain: String,
    pub registry_env: String,
    pub bap_id: String,
    /// An access decision, or `NO_POLICY`
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_source: Option<DecisionSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&AccessPolicy> for PermissionDetail {
    fn from(policy: &AccessPolicy) -> Self {
        Self {
            seller_id: policy.seller_id.clone(),
            domain: policy.domain.clone(),
            registry_env: policy.registry_env.clone(),
            bap_id: policy.bap_id.clone(),
            decision: policy.decision.to_string(),
            decision_source: Some(policy.decision_source),
            decided_at: Some(policy.decided_at),
            expires_at: policy.expires_at,
            reason: policy.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsQueryResponse {
    pub bap_status: BapStatus,
    pub domain: String,
    pub registry_env: String,
    pub permissions: Vec<PermissionDetail>,
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PolicyAgentError::BadRequest(format!("{} is required", field)));
    }
    Ok(())
}

// ============================================================================
// Service
// ============================================================================

pub struct BuyerService<P: PermissionsStore> {
    store: Arc<P>,
}

impl<P: PermissionsStore> BuyerService<P> {
    pub fn new(store: Arc<P>) -> Self {
        Self { store }
    }

    /// Store a batch of manual decisions.
    ///
    /// Buyers are upserted before policies. Every row is validated before
    /// anything is written.
    pub async fn update_permissions(
        &self,
        updates: &[PermissionUpdate],
    ) -> Result<Vec<PermissionUpdateResult>> {
        if updates.is_empty() {
            return Err(PolicyAgentError::BadRequest(
                "at least one permission update is required".into(),
            ));
        }

        let now = Utc::now();
        let mut baps: HashMap<String, Bap> = HashMap::new();
        let mut policies = Vec::with_capacity(updates.len());
        let mut results = Vec::with_capacity(updates.len());

        for update in updates {
            require("seller_id", &update.seller_id)?;
            require("domain", &update.domain)?;
            require("bap_id", &update.bap_id)?;

            let decision: AccessDecision = update.decision.parse()?;
            let decision_source: DecisionSource = update
                .decision_source
                .as_deref()
                .unwrap_or_default()
                .parse()?;

            policies.push(AccessPolicy {
                seller_id: update.seller_id.clone(),
                domain: update.domain.clone(),
                registry_env: update.registry_env.clone(),
                bap_id: update.bap_id.clone(),
                decision,
                decision_source,
                decided_at: now,
                expires_at: update.expires_at,
                reason: update.reason.clone(),
                updated_at: now,
            });

            baps.entry(update.bap_id.clone())
                .or_insert_with(|| Bap::first_seen(&update.bap_id));

            results.push(PermissionUpdateResult {
                seller_id: update.seller_id.clone(),
                domain: update.domain.clone(),
                registry_env: update.registry_env.clone(),
                bap_id: update.bap_id.clone(),
                decision,
                stored: false,
            });
        }

        self.store.upsert_baps(&baps).await?;
        self.store.upsert_access_policies(&policies).await?;

        for result in &mut results {
            result.stored = true;
        }

        info!(
            policies = policies.len(),
            buyers = baps.len(),
            "Permission updates stored"
        );

        Ok(results)
    }

    /// Resolved permissions of one buyer for the requested sellers.
    ///
    /// Registers the buyer on first contact and refreshes `last_seen_at`
    /// otherwise. Rows follow the order of `seller_ids`.
    pub async fn query_permissions(&self, query: &PermissionsQuery) -> Result<PermissionsQueryResponse> {
        require("bap_id", &query.bap_id)?;
        require("domain", &query.domain)?;
        require("registry_env", &query.registry_env)?;
        if query.seller_ids.is_empty() {
            return Err(PolicyAgentError::BadRequest("seller_ids is required".into()));
        }

        let (bap_status, bap) = match self.store.find_bap(&query.bap_id).await? {
            Some(mut bap) => {
                bap.touch();
                (BapStatus::ExistingBap, bap)
            }
            None => (BapStatus::NewBap, Bap::first_seen(&query.bap_id)),
        };
        self.store
            .upsert_baps(&HashMap::from([(query.bap_id.clone(), bap)]))
            .await?;

        let policies = self
            .store
            .query_access_policies(&query.bap_id, &query.domain, &query.registry_env, &query.seller_ids)
            .await?;
        let by_seller: HashMap<&str, &AccessPolicy> =
            policies.iter().map(|p| (p.seller_id.as_str(), p)).collect();

        let permissions: Vec<PermissionDetail> = query
            .seller_ids
            .iter()
            .filter_map(|seller_id| match by_seller.get(seller_id.as_str()) {
                Some(policy) => Some(PermissionDetail::from(*policy)),
                None if query.include_no_policy => Some(PermissionDetail {
                    seller_id: seller_id.clone(),
                    domain: query.domain.clone(),
                    registry_env: query.registry_env.clone(),
                    bap_id: query.bap_id.clone(),
                    decision: NO_POLICY.to_string(),
                    decision_source: None,
                    decided_at: None,
                    expires_at: None,
                    reason: None,
                }),
                None => None,
            })
            .collect();

        debug!(
            bap_id = %query.bap_id,
            requested = query.seller_ids.len(),
            returned = permissions.len(),
            "Permissions queried"
        );

        Ok(PermissionsQueryResponse {
            bap_status,
            domain: query.domain.clone(),
            registry_env: query.registry_env.clone(),
            permissions,
        })
    }
}
