//! Registry lookup wire types

use serde::{Deserialize, Serialize};

/// Country every lookup is scoped to
pub const LOOKUP_COUNTRY: &str = "IND";

/// Participant type we mirror (seller-side apps)
pub const LOOKUP_TYPE: &str = "BPP";

/// Body of a registry `lookup` call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LookupRequest {
    pub country: String,
    #[serde(rename = "type")]
    pub participant_type: String,
    pub domain: String,
}

impl LookupRequest {
    /// Canonical seller lookup for one domain
    pub fn sellers_in(domain: &str) -> Self {
        Self {
            country: LOOKUP_COUNTRY.to_string(),
            participant_type: LOOKUP_TYPE.to_string(),
            domain: domain.to_string(),
        }
    }
}

/// One subscriber record as returned by the registry
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegistryParticipant {
    pub subscriber_id: String,
    #[serde(default)]
    pub subscriber_url: Option<String>,
    #[serde(default, rename = "ukId")]
    pub uk_id: Option<String>,
    #[serde(default)]
    pub br_id: Option<String>,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: String,
    #[serde(default, rename = "signing_public_key")]
    pub signing_key: Option<String>,
    #[serde(default, rename = "encr_public_key")]
    pub encryption_key: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub valid_from: String,
    #[serde(default)]
    pub valid_until: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,

    /// Full record as received, kept for audit
    #[serde(skip)]
    pub raw: String,
}

impl RegistryParticipant {
    /// Callback endpoint for the participant.
    ///
    /// Older registry records carry no `subscriber_url`; the subscriber id is
    /// the participant's host name in that case.
    pub fn callback_url(&self) -> &str {
        self.subscriber_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&self.subscriber_id)
    }
}
