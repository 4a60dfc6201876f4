//! Store contracts
//!
//! The reconciler owns sellers and catalog state; the broadcast coordinator
//! owns policies and jobs. Buyer rows are shared. Every write is keyed by
//! natural identity so batches can be replayed out of order.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use super::schemas::{
    AccessPolicy, Bap, CatalogSyncState, CatalogSyncStatus, JobStatus, PermissionsJob, Seller,
    SellerFilter,
};
use crate::types::Result;

/// Persistence for mirrored sellers and their catalog state
#[async_trait]
pub trait SellerStore: Send + Sync {
    /// Insert newly sighted sellers and return the `seller_id`s written.
    ///
    /// A row whose identity already exists is skipped; the rest of the batch
    /// still lands.
    async fn insert_sellers(&self, sellers: &[Seller]) -> Result<Vec<String>>;

    /// Overwrite existing sellers by identity
    async fn update_sellers(&self, sellers: &[Seller]) -> Result<()>;

    /// Soft-delete: flip `active` to false. Returns the number of rows touched.
    async fn deactivate_sellers(
        &self,
        seller_ids: &[String],
        domain: &str,
        registry_env: &str,
    ) -> Result<u64>;

    /// All sellers (active or not) of a domain in one environment
    async fn sellers_by_domain_and_env(&self, domain: &str, registry_env: &str)
        -> Result<Vec<Seller>>;

    async fn sellers_by_filter(&self, filter: &SellerFilter) -> Result<Vec<Seller>>;

    async fn seller_by_id(
        &self,
        seller_id: &str,
        domain: &str,
        registry_env: &str,
    ) -> Result<Option<Seller>>;

    async fn upsert_catalog_state(&self, state: &CatalogSyncState) -> Result<()>;

    async fn catalog_state(
        &self,
        seller_id: &str,
        domain: &str,
        registry_env: &str,
    ) -> Result<Option<CatalogSyncState>>;

    /// Catalog states in `statuses` whose seller exists and is active,
    /// ordered by `seller_id`
    async fn pending_sellers(
        &self,
        domain: &str,
        registry_env: &str,
        statuses: &[CatalogSyncStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CatalogSyncState>>;
}

/// Persistence for buyers, access policies, and broadcast jobs
#[async_trait]
pub trait PermissionsStore: Send + Sync {
    /// Upsert buyers by `bap_id`. An existing row keeps its `first_seen_at`.
    async fn upsert_baps(&self, baps: &HashMap<String, Bap>) -> Result<()>;

    async fn find_bap(&self, bap_id: &str) -> Result<Option<Bap>>;

    /// Replace-or-insert policies by (`seller_id`, `domain`, `registry_env`, `bap_id`)
    async fn upsert_access_policies(&self, policies: &[AccessPolicy]) -> Result<()>;

    async fn query_access_policies(
        &self,
        bap_id: &str,
        domain: &str,
        registry_env: &str,
        seller_ids: &[String],
    ) -> Result<Vec<AccessPolicy>>;

    /// Any policy for the buyer, regardless of seller or domain
    async fn policy_for_bap(&self, bap_id: &str) -> Result<Option<AccessPolicy>>;

    /// The buyer's job still in `INITIATED`, if any
    async fn initiated_job_for_bap(&self, bap_id: &str) -> Result<Option<PermissionsJob>>;

    /// Insert a job. Fails with `AlreadyResolved` while another job for the
    /// same buyer is still `INITIATED`.
    async fn create_job(&self, job: &PermissionsJob) -> Result<()>;

    /// Move a job to `status`. A job already in a terminal state is not
    /// changed and yields `AlreadyResolved`.
    async fn update_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<()>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<PermissionsJob>>;
}
