//! Buyer permission tests: bulk updates and permission queries

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use common::{DOMAIN, ENV};
use policy_agent::db::schemas::{AccessDecision, DecisionSource};
use policy_agent::db::{InMemoryStore, PermissionsStore};
use policy_agent::services::{
    BapStatus, BuyerService, PermissionUpdate, PermissionsQuery, NO_POLICY,
};
use policy_agent::types::PolicyAgentError;

const BAP: &str = "buyer.example.com";

fn update(seller_id: &str, decision: &str) -> PermissionUpdate {
    PermissionUpdate {
        seller_id: seller_id.to_string(),
        domain: DOMAIN.to_string(),
        registry_env: ENV.to_string(),
        bap_id: BAP.to_string(),
        decision: decision.to_string(),
        decision_source: None,
        reason: None,
        expires_at: None,
    }
}

fn query(seller_ids: &[&str], include_no_policy: bool) -> PermissionsQuery {
    PermissionsQuery {
        bap_id: BAP.to_string(),
        domain: DOMAIN.to_string(),
        registry_env: ENV.to_string(),
        seller_ids: seller_ids.iter().map(|s| s.to_string()).collect(),
        include_no_policy,
    }
}

fn service() -> (Arc<InMemoryStore>, BuyerService<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    (Arc::clone(&store), BuyerService::new(store))
}

// =============================================================================
// Bulk update
// =============================================================================

#[tokio::test]
async fn test_update_stores_policies_and_buyer() {
    let (store, buyers) = service();

    let mut denied = update("s2", "denied");
    denied.reason = Some("blocked by seller".to_string());
    denied.decision_source = Some("SELLER".to_string());
    let expiry = Utc::now() + Duration::days(7);
    denied.expires_at = Some(expiry);

    let results = buyers
        .update_permissions(&[update("s1", "ALLOWED"), denied])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.stored));
    assert_eq!(results[0].decision, AccessDecision::Allowed);
    assert_eq!(results[1].decision, AccessDecision::Denied);

    assert!(store.find_bap(BAP).await.unwrap().is_some());
    assert_eq!(store.policy_count().await, 2);

    let stored = store
        .query_access_policies(BAP, DOMAIN, ENV, &["s2".to_string()])
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].decision_source, DecisionSource::Seller);
    assert_eq!(stored[0].reason.as_deref(), Some("blocked by seller"));
    assert_eq!(stored[0].expires_at, Some(expiry));
}

#[tokio::test]
async fn test_update_replaces_existing_decision() {
    let (store, buyers) = service();

    buyers
        .update_permissions(&[update("s1", "ALLOWED")])
        .await
        .unwrap();
    buyers
        .update_permissions(&[update("s1", "DENIED")])
        .await
        .unwrap();

    let policies = store.all_policies().await;
    assert_eq!(policies.len(), 1);
    assert_eq!(policies[0].decision, AccessDecision::Denied);
    assert_eq!(policies[0].decision_source, DecisionSource::Manual);
}

#[tokio::test]
async fn test_invalid_row_rejects_whole_batch() {
    let (store, buyers) = service();

    let err = buyers
        .update_permissions(&[update("s1", "ALLOWED"), update("s2", "MAYBE")])
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyAgentError::BadRequest(_)));

    let err = buyers
        .update_permissions(&[update("", "ALLOWED")])
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyAgentError::BadRequest(_)));

    let mut bad_source = update("s1", "ALLOWED");
    bad_source.decision_source = Some("GUESS".to_string());
    assert!(buyers.update_permissions(&[bad_source]).await.is_err());

    assert!(buyers.update_permissions(&[]).await.is_err());

    assert_eq!(store.policy_count().await, 0);
    assert!(store.find_bap(BAP).await.unwrap().is_none());
}

// =============================================================================
// Query
// =============================================================================

#[tokio::test]
async fn test_query_registers_new_buyer() {
    let (store, buyers) = service();

    let response = buyers.query_permissions(&query(&["s1"], false)).await.unwrap();
    assert_eq!(response.bap_status, BapStatus::NewBap);
    assert!(response.permissions.is_empty());

    let bap = store.find_bap(BAP).await.unwrap().unwrap();
    let response = buyers.query_permissions(&query(&["s1"], false)).await.unwrap();
    assert_eq!(response.bap_status, BapStatus::ExistingBap);

    let seen_again = store.find_bap(BAP).await.unwrap().unwrap();
    assert_eq!(seen_again.first_seen_at, bap.first_seen_at);
    assert!(seen_again.last_seen_at >= bap.last_seen_at);
}

#[tokio::test]
async fn test_query_reports_missing_sellers_on_request() {
    let (_store, buyers) = service();
    buyers
        .update_permissions(&[update("s1", "ALLOWED"), update("s3", "DENIED")])
        .await
        .unwrap();

    let response = buyers
        .query_permissions(&query(&["s3", "s2", "s1"], true))
        .await
        .unwrap();
    let rows: Vec<(&str, &str)> = response
        .permissions
        .iter()
        .map(|p| (p.seller_id.as_str(), p.decision.as_str()))
        .collect();
    assert_eq!(
        rows,
        vec![("s3", "DENIED"), ("s2", NO_POLICY), ("s1", "ALLOWED")]
    );
    assert!(response.permissions[1].decided_at.is_none());
    assert_eq!(
        response.permissions[0].decision_source,
        Some(DecisionSource::Manual)
    );

    let response = buyers
        .query_permissions(&query(&["s3", "s2", "s1"], false))
        .await
        .unwrap();
    assert_eq!(response.permissions.len(), 2);
}

#[tokio::test]
async fn test_query_is_scoped_to_domain_and_env() {
    let (_store, buyers) = service();
    let mut other_env = update("s1", "ALLOWED");
    other_env.registry_env = "prod".to_string();
    buyers.update_permissions(&[other_env]).await.unwrap();

    let response = buyers
        .query_permissions(&query(&["s1"], true))
        .await
        .unwrap();
    assert_eq!(response.permissions[0].decision, NO_POLICY);
}

#[tokio::test]
async fn test_query_requires_identity() {
    let (_store, buyers) = service();

    let mut no_bap = query(&["s1"], false);
    no_bap.bap_id = String::new();
    assert!(matches!(
        buyers.query_permissions(&no_bap).await.unwrap_err(),
        PolicyAgentError::BadRequest(_)
    ));

    assert!(matches!(
        buyers.query_permissions(&query(&[], false)).await.unwrap_err(),
        PolicyAgentError::BadRequest(_)
    ));
}
