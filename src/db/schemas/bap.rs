//! Buyer app (BAP) schema

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for buyer apps
pub const BAP_COLLECTION: &str = "baps";

/// Buyer app, created lazily on first interaction
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Bap {
    pub bap_id: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub first_seen_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub last_seen_at: DateTime<Utc>,
}

impl Bap {
    /// A buyer seen for the first time now
    pub fn first_seen(bap_id: &str) -> Self {
        let now = Utc::now();
        Self {
            bap_id: bap_id.to_string(),
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    /// Refresh `last_seen_at`
    pub fn touch(&mut self) {
        self.last_seen_at = Utc::now();
    }
}

impl IntoIndexes for Bap {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "bap_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("bap_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}
