//! Seller Service
//!
//! Drives registry reconciliation and answers catalog-sync queries.
//!
//! ## Reconciliation
//!
//! ```text
//! for each domain:
//!   registry.lookup(domain) ──► plan_domain(R, L) ──► insert / update / deactivate
//!                                                        │
//!                                          NOT_SYNCED catalog state for inserts
//! ```
//!
//! A domain whose lookup or local read fails is skipped and reported in
//! `failed_domains`; the other domains still run. Within a domain the three
//! batches are independent: a failed batch is logged and its siblings are
//! still applied.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::reconcile::plan_domain;
use crate::db::schemas::{CatalogSyncState, CatalogSyncStatus, SellerSyncInfo};
use crate::db::SellerStore;
use crate::registry::ParticipantSource;
use crate::types::{PolicyAgentError, Result};

/// Default page size for the pending list
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Largest page size a caller may ask for
pub const MAX_PAGE_LIMIT: usize = 1000;

// ============================================================================
// Types
// ============================================================================

/// Reconciliation trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub domains: Vec<String>,
    pub registry_env: String,
}

/// Per-domain counts for one reconciliation run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainSyncSummary {
    pub domain: String,
    pub new_sellers: usize,
    pub updated_sellers: usize,
    pub deactivated_sellers: usize,
    pub total_sellers_in_registry: usize,
}

/// Result of a reconciliation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub registry_env: String,
    /// RFC 3339 start time of the run
    pub run_at: String,
    pub domains: Vec<DomainSyncSummary>,
    /// Domains skipped because the registry or the local read failed
    pub failed_domains: Vec<String>,
}

/// Pending-list query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingQuery {
    pub domain: String,
    pub registry_env: String,
    /// Comma-separated statuses; empty means `NOT_SYNCED,FAILED`
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub page: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageInfo {
    pub limit: usize,
    pub page: usize,
    pub has_more: bool,
}

/// One page of sellers waiting on a catalog pull
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCatalogSyncPage {
    pub domain: String,
    pub registry_env: String,
    pub status_filter: Vec<CatalogSyncStatus>,
    pub sellers: Vec<SellerSyncInfo>,
    pub page: PageInfo,
}

/// Catalog sync status of one seller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogSyncStatusView {
    pub seller_id: String,
    pub domain: String,
    pub registry_env: String,
    pub status: CatalogSyncStatus,
    pub last_pull_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub sync_version: i64,
    pub registry_last_seen_at: DateTime<Utc>,
}

// ============================================================================
// Service
// ============================================================================

pub struct SellerService<S: SellerStore, R: ParticipantSource> {
    store: Arc<S>,
    registry: Arc<R>,
}

impl<S: SellerStore + 'static, R: ParticipantSource + 'static> SellerService<S, R> {
    pub fn new(store: Arc<S>, registry: Arc<R>) -> Self {
        Self { store, registry }
    }

    /// Reconcile every requested domain against the registry
    pub async fn sync_registry(&self, request: &SyncRequest) -> Result<SyncReport> {
        if request.domains.is_empty() {
            return Err(PolicyAgentError::BadRequest(
                "at least one domain is required".into(),
            ));
        }

        let run_at = Utc::now();
        let mut report = SyncReport {
            registry_env: request.registry_env.clone(),
            run_at: run_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            domains: Vec::with_capacity(request.domains.len()),
            failed_domains: Vec::new(),
        };

        info!(
            registry_env = %request.registry_env,
            domains = request.domains.len(),
            "Registry sync started"
        );

        for domain in &request.domains {
            match self.reconcile_domain(domain, &request.registry_env, run_at).await {
                Ok(summary) => report.domains.push(summary),
                Err(e) => {
                    error!(domain = %domain, error = %e, "Domain sync skipped");
                    report.failed_domains.push(domain.clone());
                }
            }
        }

        info!(
            registry_env = %request.registry_env,
            synced = report.domains.len(),
            failed = report.failed_domains.len(),
            "Registry sync finished"
        );

        Ok(report)
    }

    async fn reconcile_domain(
        &self,
        domain: &str,
        registry_env: &str,
        now: DateTime<Utc>,
    ) -> Result<DomainSyncSummary> {
        let registry = self.registry.lookup(domain).await?;
        let local = self.store.sellers_by_domain_and_env(domain, registry_env).await?;

        let plan = plan_domain(domain, registry_env, &registry, &local, now);
        debug!(
            domain = %domain,
            inserts = plan.inserts.len(),
            updates = plan.updates.len(),
            deactivations = plan.deactivations.len(),
            "Domain plan computed"
        );

        let summary = DomainSyncSummary {
            domain: domain.to_string(),
            new_sellers: plan.inserts.len(),
            updated_sellers: plan.updates.len(),
            deactivated_sellers: plan.deactivations.len(),
            total_sellers_in_registry: plan.total_in_registry,
        };

        if !plan.inserts.is_empty() {
            match self.store.insert_sellers(&plan.inserts).await {
                Ok(inserted) => {
                    if inserted.len() < plan.inserts.len() {
                        warn!(
                            domain = %domain,
                            planned = plan.inserts.len(),
                            inserted = inserted.len(),
                            "Some new sellers were not inserted"
                        );
                    }
                    for seller_id in &inserted {
                        let state = CatalogSyncState::not_synced(seller_id, domain, registry_env);
                        if let Err(e) = self.store.upsert_catalog_state(&state).await {
                            error!(
                                domain = %domain,
                                seller_id = %seller_id,
                                error = %e,
                                "Failed to initialise catalog state"
                            );
                        }
                    }
                }
                Err(e) => {
                    error!(domain = %domain, count = plan.inserts.len(), error = %e, "Failed to insert new sellers");
                }
            }
        }

        if !plan.updates.is_empty() {
            if let Err(e) = self.store.update_sellers(&plan.updates).await {
                error!(domain = %domain, count = plan.updates.len(), error = %e, "Failed to update existing sellers");
            }
        }

        if !plan.deactivations.is_empty() {
            // A single incomplete registry answer is enough to deactivate.
            warn!(
                domain = %domain,
                count = plan.deactivations.len(),
                "Deactivating sellers absent from this registry pull"
            );
            if let Err(e) = self
                .store
                .deactivate_sellers(&plan.deactivations, domain, registry_env)
                .await
            {
                error!(domain = %domain, count = plan.deactivations.len(), error = %e, "Failed to deactivate sellers");
            }
        }

        info!(
            domain = %domain,
            new = summary.new_sellers,
            updated = summary.updated_sellers,
            deactivated = summary.deactivated_sellers,
            total = summary.total_sellers_in_registry,
            "Domain synced"
        );

        Ok(summary)
    }

    /// Sellers whose catalog still needs pulling, one page at a time
    pub async fn pending_catalog_sync(&self, query: &PendingQuery) -> Result<PendingCatalogSyncPage> {
        if query.domain.trim().is_empty() {
            return Err(PolicyAgentError::BadRequest("domain is required".into()));
        }

        let status_filter = CatalogSyncStatus::parse_filter(query.status.as_deref().unwrap_or(""))?;
        let limit = query
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .min(MAX_PAGE_LIMIT);
        let page = query.page.filter(|p| *p > 0).unwrap_or(1);
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| PolicyAgentError::BadRequest(format!("page {} is out of range", page)))?;

        // One extra row tells us whether another page exists
        let mut rows = self
            .store
            .pending_sellers(&query.domain, &query.registry_env, &status_filter, limit + 1, offset)
            .await?;

        let has_more = rows.len() > limit;
        rows.truncate(limit);

        Ok(PendingCatalogSyncPage {
            domain: query.domain.clone(),
            registry_env: query.registry_env.clone(),
            status_filter,
            sellers: rows.iter().map(SellerSyncInfo::from).collect(),
            page: PageInfo {
                limit,
                page,
                has_more,
            },
        })
    }

    /// Catalog sync status of one seller.
    ///
    /// A seller with no catalog row yet reports `NOT_SYNCED`.
    pub async fn sync_status(
        &self,
        seller_id: &str,
        domain: &str,
        registry_env: &str,
    ) -> Result<CatalogSyncStatusView> {
        let seller = self
            .store
            .seller_by_id(seller_id, domain, registry_env)
            .await?
            .ok_or_else(|| {
                PolicyAgentError::NotFound(format!(
                    "seller {} in {}/{}",
                    seller_id, domain, registry_env
                ))
            })?;

        let view = match self.store.catalog_state(seller_id, domain, registry_env).await? {
            Some(state) => CatalogSyncStatusView {
                seller_id: state.seller_id,
                domain: state.domain,
                registry_env: state.registry_env,
                status: state.status,
                last_pull_at: state.last_pull_at,
                last_success_at: state.last_success_at,
                last_error: state.last_error,
                sync_version: state.sync_version,
                registry_last_seen_at: seller.last_seen_in_registry,
            },
            None => CatalogSyncStatusView {
                seller_id: seller.seller_id,
                domain: seller.domain,
                registry_env: seller.registry_env,
                status: CatalogSyncStatus::NotSynced,
                last_pull_at: None,
                last_success_at: None,
                last_error: None,
                sync_version: 0,
                registry_last_seen_at: seller.last_seen_in_registry,
            },
        };

        Ok(view)
    }
}

/// Spawn the periodic registry sync.
///
/// Runs once immediately, then every `interval`. A failed run is logged and
/// the loop carries on.
pub fn spawn_registry_sync_task<S, R>(
    service: Arc<SellerService<S, R>>,
    request: SyncRequest,
    interval: Duration,
) -> JoinHandle<()>
where
    S: SellerStore + 'static,
    R: ParticipantSource + 'static,
{
    tokio::spawn(async move {
        info!(
            registry_env = %request.registry_env,
            interval_secs = interval.as_secs(),
            "Registry sync task started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match service.sync_registry(&request).await {
                Ok(report) => {
                    for summary in &report.domains {
                        debug!(
                            domain = %summary.domain,
                            new = summary.new_sellers,
                            updated = summary.updated_sellers,
                            deactivated = summary.deactivated_sellers,
                            "Scheduled sync summary"
                        );
                    }
                }
                Err(e) => error!(error = %e, "Scheduled registry sync failed"),
            }
        }
    })
}
