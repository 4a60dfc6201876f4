//! Database schemas for the policy agent
//!
//! Defines the participant, catalog, buyer, policy, and job records.

mod access_policy;
mod bap;
mod catalog_state;
mod permissions_job;
mod seller;

pub use access_policy::{
    AccessDecision, AccessPolicy, DecisionSource, ACCESS_POLICY_COLLECTION,
    BROADCAST_POLICY_TTL_HOURS,
};
pub use bap::{Bap, BAP_COLLECTION};
pub use catalog_state::{
    CatalogSyncState, CatalogSyncStatus, SellerSyncInfo, CATALOG_STATE_COLLECTION,
};
pub use permissions_job::{JobStatus, PermissionsJob, PermissionsJobDoc, PERMISSIONS_JOB_COLLECTION};
pub use seller::{Seller, SellerFilter, SELLER_COLLECTION, SELLER_TYPE_BPP};
