//! Access policy schema
//!
//! One current decision per (`seller_id`, `domain`, `registry_env`, `bap_id`).
//! Writes replace the row for the key; history is not kept.

use std::fmt;
use std::str::FromStr;

use bson::serde_helpers::{
    chrono_datetime_as_bson_datetime, chrono_datetime_as_bson_datetime_optional,
};
use bson::{doc, Document};
use chrono::{DateTime, Duration, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::types::PolicyAgentError;

/// Collection name for access policies
pub const ACCESS_POLICY_COLLECTION: &str = "bap_access_policy";

/// How long a broadcast-derived decision stays valid
pub const BROADCAST_POLICY_TTL_HOURS: i64 = 24;

/// Outcome of a permission request
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessDecision {
    Allowed,
    Denied,
    ErrorOccurred,
}

impl AccessDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "ALLOWED",
            Self::Denied => "DENIED",
            Self::ErrorOccurred => "ERROR_OCCURRED",
        }
    }
}

impl fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessDecision {
    type Err = PolicyAgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALLOWED" => Ok(Self::Allowed),
            "DENIED" => Ok(Self::Denied),
            "ERROR_OCCURRED" => Ok(Self::ErrorOccurred),
            other => Err(PolicyAgentError::BadRequest(format!(
                "Unknown access decision: {}",
                other
            ))),
        }
    }
}

/// Where a decision came from
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionSource {
    /// Derived from a seller's ACK/NACK during a broadcast
    Broadcast,
    /// Synthetic decision while seller dispatch is mocked
    Mock,
    /// Pushed through the bulk update operation
    #[default]
    Manual,
    /// Reported by the seller out of band
    Seller,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broadcast => "BROADCAST",
            Self::Mock => "MOCK",
            Self::Manual => "MANUAL",
            Self::Seller => "SELLER",
        }
    }
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionSource {
    type Err = PolicyAgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "MANUAL" => Ok(Self::Manual),
            "BROADCAST" => Ok(Self::Broadcast),
            "MOCK" => Ok(Self::Mock),
            "SELLER" => Ok(Self::Seller),
            other => Err(PolicyAgentError::BadRequest(format!(
                "Unknown decision source: {}",
                other
            ))),
        }
    }
}

/// Current access decision for one buyer/seller pair
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AccessPolicy {
    pub seller_id: String,
    pub domain: String,
    pub registry_env: String,
    pub bap_id: String,
    pub decision: AccessDecision,
    pub decision_source: DecisionSource,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub decided_at: DateTime<Utc>,
    #[serde(default, with = "chrono_datetime_as_bson_datetime_optional")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl AccessPolicy {
    /// Decision taken now from a broadcast round, valid for 24 hours
    pub fn from_broadcast(
        seller_id: &str,
        domain: &str,
        registry_env: &str,
        bap_id: &str,
        decision: AccessDecision,
        source: DecisionSource,
        reason: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            seller_id: seller_id.to_string(),
            domain: domain.to_string(),
            registry_env: registry_env.to_string(),
            bap_id: bap_id.to_string(),
            decision,
            decision_source: source,
            decided_at: now,
            expires_at: Some(now + Duration::hours(BROADCAST_POLICY_TTL_HOURS)),
            reason,
            updated_at: now,
        }
    }

    /// Natural identity key
    pub fn key(&self) -> (String, String, String, String) {
        (
            self.seller_id.clone(),
            self.domain.clone(),
            self.registry_env.clone(),
            self.bap_id.clone(),
        )
    }
}

impl IntoIndexes for AccessPolicy {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "seller_id": 1, "domain": 1, "registry_env": 1, "bap_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("policy_identity_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "bap_id": 1, "domain": 1, "registry_env": 1 },
                Some(
                    IndexOptions::builder()
                        .name("policy_bap_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
