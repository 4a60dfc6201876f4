//! Broadcast Coordinator
//!
//! Runs a buyer permission broadcast as an asynchronous job.
//!
//! ## Flow
//!
//! ```text
//! broadcast(request)
//!   ├─ require search_payload.context.bap_id
//!   ├─ ensure BAP row
//!   ├─ reject if any policy exists for the buyer (AlreadyResolved)
//!   ├─ reject if a job for the buyer is still INITIATED (AlreadyResolved)
//!   ├─ create job (INITIATED, at most one per buyer)
//!   └─ spawn supervisor ──► execute
//!                             ├─ select candidates (store error → FAILED)
//!                             ├─ none → COMPLETED
//!                             └─ JoinSet fan-out, Semaphore-bounded
//!                                  dispatch → classify → upsert policy
//!                                drained → COMPLETED
//! ```
//!
//! The supervisor owns the terminal write: if execution panics the job is
//! still moved to FAILED. Per-seller failures never surface to the caller;
//! they are logged and counted.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::notifier::{classify_peer_response, search_url, PeerOutcome, SellerNotifier};
use crate::db::schemas::{
    AccessDecision, AccessPolicy, Bap, DecisionSource, JobStatus, PermissionsJob, Seller,
    SellerFilter,
};
use crate::db::{PermissionsStore, SellerStore};
use crate::types::{PolicyAgentError, Result};

/// Reason recorded on synthetic policies
pub const MOCK_ALLOW_REASON: &str = "ALLOWED for testing";

// ============================================================================
// Types
// ============================================================================

/// Coordinator configuration, fixed at construction
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Registry environment candidates and policies belong to
    pub registry_env: String,
    /// Skip outbound calls and allow every candidate
    pub mock_seller_response: bool,
    /// Maximum in-flight seller dispatches per broadcast (default: 64)
    pub max_concurrency: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            registry_env: "preprod".to_string(),
            mock_seller_response: false,
            max_concurrency: 64,
        }
    }
}

/// Buyer permission broadcast request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastRequest {
    #[serde(default)]
    pub search_payload: Option<SearchPayload>,
    /// Explicit allowlist; when empty, every active seller in the city is asked
    #[serde(default)]
    pub seller_ids: Vec<String>,
}

/// `/search` body forwarded to sellers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPayload {
    #[serde(default)]
    pub context: Option<SearchContext>,
    #[serde(default)]
    pub message: serde_json::Value,
}

/// Search context; only the routing fields are interpreted
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchContext {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub bap_id: String,
    #[serde(default)]
    pub city: String,
    /// Remaining context fields, forwarded untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Accepted broadcast: the created job plus a handle on its completion
#[derive(Debug)]
pub struct BroadcastTicket {
    pub job: PermissionsJob,
    completion: JoinHandle<JobStatus>,
}

impl BroadcastTicket {
    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    /// Wait for the job to reach its terminal status
    pub async fn wait(self) -> Result<JobStatus> {
        self.completion
            .await
            .map_err(|e| PolicyAgentError::Internal(format!("broadcast supervisor lost: {}", e)))
    }
}

/// Result of one seller dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchOutcome {
    Allowed,
    Denied,
    Errored,
    /// 2xx that was neither ACK nor NACK
    Dropped,
    /// Transport failure, timeout, or unusable URL
    Unreachable,
    /// Policy write failed
    StoreFailed,
}

#[derive(Debug, Default)]
struct DispatchTally {
    allowed: usize,
    denied: usize,
    errored: usize,
    dropped: usize,
    unreachable: usize,
    store_failed: usize,
    panicked: usize,
}

impl DispatchTally {
    fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Allowed => self.allowed += 1,
            DispatchOutcome::Denied => self.denied += 1,
            DispatchOutcome::Errored => self.errored += 1,
            DispatchOutcome::Dropped => self.dropped += 1,
            DispatchOutcome::Unreachable => self.unreachable += 1,
            DispatchOutcome::StoreFailed => self.store_failed += 1,
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

pub struct BroadcastCoordinator<P: PermissionsStore, S: SellerStore, N: SellerNotifier> {
    config: BroadcastConfig,
    permissions: Arc<P>,
    sellers: Arc<S>,
    notifier: Arc<N>,
}

impl<P, S, N> BroadcastCoordinator<P, S, N>
where
    P: PermissionsStore + 'static,
    S: SellerStore + 'static,
    N: SellerNotifier + 'static,
{
    pub fn new(config: BroadcastConfig, permissions: Arc<P>, sellers: Arc<S>, notifier: Arc<N>) -> Self {
        Self {
            config,
            permissions,
            sellers,
            notifier,
        }
    }

    /// Admit a broadcast and start it in the background.
    ///
    /// Returns once the job row exists; the fan-out continues on its own task.
    pub async fn broadcast(&self, request: BroadcastRequest) -> Result<BroadcastTicket> {
        let payload = request
            .search_payload
            .ok_or_else(|| PolicyAgentError::BadRequest("search_payload is required".into()))?;
        let context = payload.context.clone().ok_or_else(|| {
            PolicyAgentError::BadRequest("search_payload.context is required".into())
        })?;
        if context.bap_id.trim().is_empty() {
            return Err(PolicyAgentError::BadRequest("bap_id is required".into()));
        }
        let bap_id = context.bap_id.clone();

        if self.permissions.find_bap(&bap_id).await?.is_none() {
            let bap = Bap::first_seen(&bap_id);
            self.permissions
                .upsert_baps(&HashMap::from([(bap_id.clone(), bap)]))
                .await?;
            debug!(bap_id = %bap_id, "New BAP registered");
        }

        if self.permissions.policy_for_bap(&bap_id).await?.is_some() {
            warn!(bap_id = %bap_id, "Policy already exists, broadcast not started");
            return Err(PolicyAgentError::AlreadyResolved(format!(
                "policy already exists for bap_id: {}",
                bap_id
            )));
        }

        if let Some(running) = self.permissions.initiated_job_for_bap(&bap_id).await? {
            warn!(bap_id = %bap_id, job_id = %running.id, "Broadcast already in progress");
            return Err(PolicyAgentError::AlreadyResolved(format!(
                "broadcast {} already in progress for bap_id: {}",
                running.id, bap_id
            )));
        }

        // The store refuses a second INITIATED job, so a racing caller fails here
        let job = PermissionsJob::initiated(&bap_id);
        self.permissions.create_job(&job).await?;

        info!(bap_id = %bap_id, job_id = %job.id, "Broadcast initiated");

        let run = Arc::new(BroadcastRun {
            config: self.config.clone(),
            permissions: Arc::clone(&self.permissions),
            sellers: Arc::clone(&self.sellers),
            notifier: Arc::clone(&self.notifier),
            job_id: job.id,
            bap_id,
            seller_ids: request.seller_ids,
            search_body: serde_json::json!({
                "context": context,
                "message": payload.message,
            }),
            context,
        });

        let completion = tokio::spawn(supervise(run));

        Ok(BroadcastTicket { job, completion })
    }

    /// Current row of a broadcast job
    pub async fn job_status(&self, job_id: Uuid) -> Result<PermissionsJob> {
        self.permissions
            .get_job(job_id)
            .await?
            .ok_or_else(|| PolicyAgentError::NotFound(format!("job {}", job_id)))
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Everything one broadcast needs once admitted
struct BroadcastRun<P, S, N> {
    config: BroadcastConfig,
    permissions: Arc<P>,
    sellers: Arc<S>,
    notifier: Arc<N>,
    job_id: Uuid,
    bap_id: String,
    context: SearchContext,
    seller_ids: Vec<String>,
    search_body: serde_json::Value,
}

/// Run the broadcast and guarantee a terminal status
async fn supervise<P, S, N>(run: Arc<BroadcastRun<P, S, N>>) -> JobStatus
where
    P: PermissionsStore + 'static,
    S: SellerStore + 'static,
    N: SellerNotifier + 'static,
{
    let worker = tokio::spawn(Arc::clone(&run).execute());

    match worker.await {
        Ok(status) => status,
        Err(e) => {
            error!(job_id = %run.job_id, bap_id = %run.bap_id, error = %e, "Broadcast execution aborted");
            run.finalize(JobStatus::Failed).await
        }
    }
}

impl<P, S, N> BroadcastRun<P, S, N>
where
    P: PermissionsStore + 'static,
    S: SellerStore + 'static,
    N: SellerNotifier + 'static,
{
    fn candidate_filter(&self) -> SellerFilter {
        let filter = SellerFilter::active_in(&self.context.domain, &self.config.registry_env);
        if self.seller_ids.is_empty() {
            filter.with_city(&self.context.city)
        } else {
            filter.with_seller_ids(self.seller_ids.clone())
        }
    }

    async fn execute(self: Arc<Self>) -> JobStatus {
        let filter = self.candidate_filter();
        let candidates = match self.sellers.sellers_by_filter(&filter).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(job_id = %self.job_id, bap_id = %self.bap_id, error = %e, "Failed to fetch sellers for broadcast");
                return self.finalize(JobStatus::Failed).await;
            }
        };

        if candidates.is_empty() {
            warn!(
                job_id = %self.job_id,
                domain = %self.context.domain,
                city = %self.context.city,
                "No sellers match broadcast criteria"
            );
            return self.finalize(JobStatus::Completed).await;
        }

        info!(
            job_id = %self.job_id,
            bap_id = %self.bap_id,
            sellers = candidates.len(),
            mock = self.config.mock_seller_response,
            "Starting broadcast"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut dispatches = JoinSet::new();

        for seller in candidates {
            let run = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            dispatches.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                run.dispatch(&seller).await
            });
        }

        let mut tally = DispatchTally::default();
        while let Some(joined) = dispatches.join_next().await {
            match joined {
                Ok(outcome) => tally.record(outcome),
                Err(e) => {
                    error!(job_id = %self.job_id, error = %e, "Seller dispatch panicked");
                    tally.panicked += 1;
                }
            }
        }

        info!(
            job_id = %self.job_id,
            bap_id = %self.bap_id,
            allowed = tally.allowed,
            denied = tally.denied,
            errored = tally.errored,
            dropped = tally.dropped,
            unreachable = tally.unreachable,
            store_failed = tally.store_failed,
            panicked = tally.panicked,
            "Broadcast finished"
        );

        self.finalize(JobStatus::Completed).await
    }

    /// Ask one seller and record its decision
    async fn dispatch(&self, seller: &Seller) -> DispatchOutcome {
        let (decision, source, reason) = if self.config.mock_seller_response {
            debug!(seller_id = %seller.seller_id, "Mock seller response");
            (
                AccessDecision::Allowed,
                DecisionSource::Mock,
                Some(MOCK_ALLOW_REASON.to_string()),
            )
        } else {
            let url = match search_url(&seller.subscriber_url) {
                Ok(url) => url,
                Err(e) => {
                    warn!(seller_id = %seller.seller_id, error = %e, "Unusable seller callback URL");
                    return DispatchOutcome::Unreachable;
                }
            };

            debug!(seller_id = %seller.seller_id, url = %url, "Sending /search");

            let response = match self.notifier.search(&url, &self.search_body).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(seller_id = %seller.seller_id, error = %e, "Seller unreachable");
                    return DispatchOutcome::Unreachable;
                }
            };

            match classify_peer_response(&response) {
                PeerOutcome::Ack => (AccessDecision::Allowed, DecisionSource::Broadcast, None),
                PeerOutcome::Nack { reason } => {
                    (AccessDecision::Denied, DecisionSource::Broadcast, Some(reason))
                }
                PeerOutcome::Error { reason } => {
                    warn!(seller_id = %seller.seller_id, status = response.status, "Seller returned non-success status");
                    (AccessDecision::ErrorOccurred, DecisionSource::Broadcast, Some(reason))
                }
                PeerOutcome::Unrecognized => {
                    let err = PolicyAgentError::PeerRejected(format!(
                        "could not decode ACK/NACK: {}",
                        response.body
                    ));
                    warn!(seller_id = %seller.seller_id, error = %err, "Seller answer dropped");
                    return DispatchOutcome::Dropped;
                }
            }
        };

        let policy = AccessPolicy::from_broadcast(
            &seller.seller_id,
            &self.context.domain,
            &self.config.registry_env,
            &self.bap_id,
            decision,
            source,
            reason,
        );

        if let Err(e) = self.permissions.upsert_access_policies(&[policy]).await {
            error!(
                seller_id = %seller.seller_id,
                bap_id = %self.bap_id,
                error = %e,
                "Failed to store access policy"
            );
            return DispatchOutcome::StoreFailed;
        }

        debug!(seller_id = %seller.seller_id, bap_id = %self.bap_id, decision = %decision, "Access policy stored");

        match decision {
            AccessDecision::Allowed => DispatchOutcome::Allowed,
            AccessDecision::Denied => DispatchOutcome::Denied,
            AccessDecision::ErrorOccurred => DispatchOutcome::Errored,
        }
    }

    async fn finalize(&self, status: JobStatus) -> JobStatus {
        if let Err(e) = self.permissions.update_job_status(self.job_id, status).await {
            error!(job_id = %self.job_id, status = %status, error = %e, "Failed to write job status");
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_unknown_fields() {
        let payload: SearchPayload = serde_json::from_value(serde_json::json!({
            "context": {
                "domain": "ONDC:RET10",
                "bap_id": "buyer.example.com",
                "city": "std:080",
                "transaction_id": "t-1",
            },
            "message": { "intent": {} },
        }))
        .unwrap();

        let context = payload.context.unwrap();
        assert_eq!(context.bap_id, "buyer.example.com");
        assert_eq!(context.extra["transaction_id"], "t-1");

        let round = serde_json::to_value(&context).unwrap();
        assert_eq!(round["transaction_id"], "t-1");
        assert_eq!(round["city"], "std:080");
    }

    #[test]
    fn test_tally() {
        let mut tally = DispatchTally::default();
        tally.record(DispatchOutcome::Allowed);
        tally.record(DispatchOutcome::Allowed);
        tally.record(DispatchOutcome::Unreachable);
        assert_eq!(tally.allowed, 2);
        assert_eq!(tally.unreachable, 1);
    }
}
