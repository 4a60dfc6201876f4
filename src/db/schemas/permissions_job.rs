//! Permissions broadcast job schema
//!
//! `INITIATED → {COMPLETED, FAILED}`; both end states are terminal.

use std::fmt;

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::mongo::IntoIndexes;

/// Collection name for broadcast jobs
pub const PERMISSIONS_JOB_COLLECTION: &str = "permissions_jobs";

/// Broadcast job status
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Initiated,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "INITIATED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Initiated)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One broadcast round for a buyer
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PermissionsJob {
    #[serde(rename = "job_id")]
    pub id: Uuid,
    pub bap_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PermissionsJob {
    /// New job in `INITIATED`
    pub fn initiated(bap_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            bap_id: bap_id.to_string(),
            status: JobStatus::Initiated,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage form of a job; `job_id` is the hyphenated uuid string
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PermissionsJobDoc {
    pub job_id: String,
    pub bap_id: String,
    pub status: JobStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl From<&PermissionsJob> for PermissionsJobDoc {
    fn from(job: &PermissionsJob) -> Self {
        Self {
            job_id: job.id.to_string(),
            bap_id: job.bap_id.clone(),
            status: job.status,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

impl TryFrom<PermissionsJobDoc> for PermissionsJob {
    type Error = uuid::Error;

    fn try_from(doc: PermissionsJobDoc) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&doc.job_id)?,
            bap_id: doc.bap_id,
            status: doc.status,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        })
    }
}

impl IntoIndexes for PermissionsJobDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "job_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("job_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "bap_id": 1, "created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("job_bap_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "bap_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "status": JobStatus::Initiated.as_str() })
                        .name("job_one_initiated_per_bap".to_string())
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
    fn test_doc_roundtrip_keeps_id() {
        let job = PermissionsJob::initiated("bap.example.com");
        let doc = PermissionsJobDoc::from(&job);
        assert_eq!(doc.job_id, job.id.to_string());
        let back = PermissionsJob::try_from(doc).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_doc_stores_native_dates() {
        let job = PermissionsJob::initiated("bap.example.com");
        let document = bson::to_document(&PermissionsJobDoc::from(&job)).unwrap();
        assert!(matches!(document.get("created_at"), Some(bson::Bson::DateTime(_))));
        assert_eq!(document.get_str("status").unwrap(), "INITIATED");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Initiated.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
