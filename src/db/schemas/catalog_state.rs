//! Catalog sync state schema
//!
//! One row per (`seller_id`, `domain`, `registry_env`). The lifecycle is
//! driven by the external catalog-pull process; the reconciler only seeds
//! rows as `NOT_SYNCED` when a participant first appears.

use std::fmt;
use std::str::FromStr;

use bson::serde_helpers::{
    chrono_datetime_as_bson_datetime, chrono_datetime_as_bson_datetime_optional,
};
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::types::PolicyAgentError;

/// Collection name for catalog sync state
pub const CATALOG_STATE_COLLECTION: &str = "seller_catalog_state";

/// Catalog pipeline status
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CatalogSyncStatus {
    #[default]
    NotSynced,
    Syncing,
    Synced,
    Failed,
}

impl CatalogSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSynced => "NOT_SYNCED",
            Self::Syncing => "SYNCING",
            Self::Synced => "SYNCED",
            Self::Failed => "FAILED",
        }
    }

    /// Statuses reported as pending when the caller gives no filter
    pub fn default_pending() -> Vec<Self> {
        vec![Self::NotSynced, Self::Failed]
    }

    /// Parse a comma-separated status filter; empty means the default set
    pub fn parse_filter(csv: &str) -> Result<Vec<Self>, PolicyAgentError> {
        let parts: Vec<&str> = csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            return Ok(Self::default_pending());
        }

        parts.into_iter().map(Self::from_str).collect()
    }
}

impl fmt::Display for CatalogSyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CatalogSyncStatus {
    type Err = PolicyAgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NOT_SYNCED" => Ok(Self::NotSynced),
            "SYNCING" => Ok(Self::Syncing),
            "SYNCED" => Ok(Self::Synced),
            "FAILED" => Ok(Self::Failed),
            other => Err(PolicyAgentError::BadRequest(format!(
                "Unknown catalog sync status: {}",
                other
            ))),
        }
    }
}

/// Catalog sync state stored per seller
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CatalogSyncState {
    pub seller_id: String,
    pub domain: String,
    pub registry_env: String,
    pub status: CatalogSyncStatus,
    #[serde(default, with = "chrono_datetime_as_bson_datetime_optional")]
    pub last_pull_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono_datetime_as_bson_datetime_optional")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub sync_version: i64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl CatalogSyncState {
    /// Fresh state for a newly discovered seller
    pub fn not_synced(seller_id: &str, domain: &str, registry_env: &str) -> Self {
        Self {
            seller_id: seller_id.to_string(),
            domain: domain.to_string(),
            registry_env: registry_env.to_string(),
            status: CatalogSyncStatus::NotSynced,
            last_pull_at: None,
            last_success_at: None,
            last_error: None,
            sync_version: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Pending-list row: the catalog fields a puller needs
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SellerSyncInfo {
    pub seller_id: String,
    pub status: CatalogSyncStatus,
    pub last_pull_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl From<&CatalogSyncState> for SellerSyncInfo {
    fn from(state: &CatalogSyncState) -> Self {
        Self {
            seller_id: state.seller_id.clone(),
            status: state.status,
            last_pull_at: state.last_pull_at,
            last_success_at: state.last_success_at,
            last_error: state.last_error.clone(),
        }
    }
}

impl IntoIndexes for CatalogSyncState {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "seller_id": 1, "domain": 1, "registry_env": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("catalog_state_identity_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "domain": 1, "registry_env": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("catalog_state_status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&CatalogSyncStatus::NotSynced).unwrap();
        assert_eq!(json, "\"NOT_SYNCED\"");
        assert_eq!("failed".parse::<CatalogSyncStatus>().unwrap(), CatalogSyncStatus::Failed);
    }

    #[test]
    fn test_parse_filter_defaults() {
        assert_eq!(
            CatalogSyncStatus::parse_filter("").unwrap(),
            vec![CatalogSyncStatus::NotSynced, CatalogSyncStatus::Failed]
        );
        assert_eq!(
            CatalogSyncStatus::parse_filter("SYNCED, SYNCING").unwrap(),
            vec![CatalogSyncStatus::Synced, CatalogSyncStatus::Syncing]
        );
        assert!(CatalogSyncStatus::parse_filter("DONE").is_err());
    }
}
