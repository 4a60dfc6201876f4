//! Services for the policy agent
//!
//! - **SellerService**: registry reconciliation and catalog-sync queries
//! - **BuyerService**: bulk permission updates and permission queries
//! - **BroadcastCoordinator**: asynchronous buyer permission broadcasts
//! - **SellerNotifier**: outbound `/search` calls to sellers

pub mod broadcast;
pub mod buyer;
pub mod notifier;
pub mod reconcile;
pub mod seller;

pub use broadcast::{
    BroadcastConfig, BroadcastCoordinator, BroadcastRequest, BroadcastTicket, SearchContext,
    SearchPayload, MOCK_ALLOW_REASON,
};
pub use buyer::{
    BapStatus, BuyerService, PermissionDetail, PermissionUpdate, PermissionUpdateResult,
    PermissionsQuery, PermissionsQueryResponse, NO_POLICY,
};
pub use notifier::{
    classify_peer_response, search_url, HttpSellerNotifier, NotifierConfig, PeerOutcome,
    PeerResponse, SellerNotifier, DEFAULT_NACK_REASON,
};
pub use reconcile::{plan_domain, seller_from_participant, DomainPlan};
pub use seller::{
    spawn_registry_sync_task, CatalogSyncStatusView, DomainSyncSummary, PageInfo,
    PendingCatalogSyncPage, PendingQuery, SellerService, SyncReport, SyncRequest,
    DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
