//! Seller (BPP) participant schema
//!
//! Local mirror of a registry subscriber. Identity is
//! (`seller_id`, `domain`, `registry_env`); rows are never hard-deleted,
//! only flipped to `active = false` when they drop out of the registry.

use bson::serde_helpers::{
    chrono_datetime_as_bson_datetime, chrono_datetime_as_bson_datetime_optional,
};
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for sellers
pub const SELLER_COLLECTION: &str = "sellers";

/// Participant type marker for mirrored sellers
pub const SELLER_TYPE_BPP: &str = "BPP";

/// Seller participant stored locally
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Seller {
    pub seller_id: String,
    pub domain: String,
    pub registry_env: String,

    /// Registry status string (e.g. "SUBSCRIBED")
    pub status: String,

    #[serde(rename = "type")]
    pub seller_type: String,

    /// Callback endpoint the seller registered
    pub subscriber_url: String,

    pub country: String,
    pub city: String,

    /// `None` when the registry value did not parse as RFC 3339
    #[serde(default, with = "chrono_datetime_as_bson_datetime_optional")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono_datetime_as_bson_datetime_optional")]
    pub valid_until: Option<DateTime<Utc>>,

    /// Local liveness flag
    pub active: bool,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub last_seen_in_registry: DateTime<Utc>,

    /// Serialized registry record, kept for audit
    #[serde(default)]
    pub registry_raw: String,
}

impl Seller {
    /// Natural identity key
    pub fn key(&self) -> (String, String, String) {
        (
            self.seller_id.clone(),
            self.domain.clone(),
            self.registry_env.clone(),
        )
    }
}

/// Typed filter for candidate selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SellerFilter {
    pub domain: String,
    pub registry_env: Option<String>,
    pub active: Option<bool>,
    /// Explicit allowlist; when set, `city` is ignored
    pub seller_ids: Option<Vec<String>>,
    /// Exact city code; empty or "*" means any city
    pub city: Option<String>,
}

impl SellerFilter {
    /// Active sellers of a domain in one registry environment
    pub fn active_in(domain: &str, registry_env: &str) -> Self {
        Self {
            domain: domain.to_string(),
            registry_env: Some(registry_env.to_string()),
            active: Some(true),
            seller_ids: None,
            city: None,
        }
    }

    /// Restrict to an explicit allowlist
    pub fn with_seller_ids(mut self, seller_ids: Vec<String>) -> Self {
        self.seller_ids = Some(seller_ids);
        self
    }

    /// Restrict to a city (wildcards are normalised away)
    pub fn with_city(mut self, city: &str) -> Self {
        let city = city.trim();
        self.city = if city.is_empty() || city == "*" {
            None
        } else {
            Some(city.to_string())
        };
        self
    }

    /// Evaluate the filter against one seller
    pub fn matches(&self, seller: &Seller) -> bool {
        if seller.domain != self.domain {
            return false;
        }
        if let Some(env) = &self.registry_env {
            if &seller.registry_env != env {
                return false;
            }
        }
        if let Some(active) = self.active {
            if seller.active != active {
                return false;
            }
        }
        if let Some(ids) = &self.seller_ids {
            return ids.iter().any(|id| id == &seller.seller_id);
        }
        if let Some(city) = &self.city {
            return &seller.city == city;
        }
        true
    }

    /// Equivalent MongoDB query document
    pub fn to_document(&self) -> Document {
        let mut filter = doc! { "domain": &self.domain };
        if let Some(env) = &self.registry_env {
            filter.insert("registry_env", env.as_str());
        }
        if let Some(active) = self.active {
            filter.insert("active", active);
        }
        if let Some(ids) = &self.seller_ids {
            filter.insert("seller_id", doc! { "$in": ids.clone() });
        } else if let Some(city) = &self.city {
            filter.insert("city", city.as_str());
        }
        filter
    }
}

impl IntoIndexes for Seller {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "seller_id": 1, "domain": 1, "registry_env": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("seller_identity_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "domain": 1, "registry_env": 1, "active": 1, "city": 1 },
                Some(
                    IndexOptions::builder()
                        .name("seller_candidates_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
