//! MongoDB client, collection wrapper, and store backend

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::error::{ErrorKind, InsertManyError, WriteFailure};
use mongodb::{options::IndexOptions, Client, Collection, IndexModel};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::schemas::{
    AccessPolicy, Bap, CatalogSyncState, CatalogSyncStatus, JobStatus, PermissionsJob,
    PermissionsJobDoc, Seller, SellerFilter, ACCESS_POLICY_COLLECTION, BAP_COLLECTION,
    CATALOG_STATE_COLLECTION, PERMISSIONS_JOB_COLLECTION, SELLER_COLLECTION,
};
use super::store::{PermissionsStore, SellerStore};
use crate::types::{PolicyAgentError, Result};

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and verify the server answers a ping
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| PolicyAgentError::Store(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| PolicyAgentError::Store(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection with its indexes applied
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
{
    /// Create a new collection and apply indexes
    pub async fn new(client: &Client, db_name: &str, collection_name: &str) -> Result<Self> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<()> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| PolicyAgentError::Store(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| PolicyAgentError::Store(format!("Find failed: {}", e)))
    }

    /// Find many documents by filter, optionally sorted
    pub async fn find_many(&self, filter: Document, sort: Option<Document>) -> Result<Vec<T>> {
        let mut find = self.inner.find(filter);
        if let Some(sort) = sort {
            find = find.sort(sort);
        }
        let cursor = find
            .await
            .map_err(|e| PolicyAgentError::Store(format!("Find failed: {}", e)))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| PolicyAgentError::Store(format!("Cursor read failed: {}", e)))
    }

    /// Replace the document matching `filter`, inserting when absent
    pub async fn replace_upsert(&self, filter: Document, item: &T) -> Result<()> {
        self.inner
            .replace_one(filter, item)
            .upsert(true)
            .await
            .map_err(|e| PolicyAgentError::Store(format!("Upsert failed: {}", e)))?;
        Ok(())
    }

    /// Get the underlying collection for advanced operations
    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }
}

/// Server code for a unique index violation
const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

fn job_from_doc(row: PermissionsJobDoc) -> Result<PermissionsJob> {
    PermissionsJob::try_from(row)
        .map_err(|e| PolicyAgentError::Store(format!("Malformed job id: {}", e)))
}

fn seller_identity(seller_id: &str, domain: &str, registry_env: &str) -> Document {
    doc! { "seller_id": seller_id, "domain": domain, "registry_env": registry_env }
}

/// Production store: one collection per entity
#[derive(Clone)]
pub struct MongoStore {
    sellers: MongoCollection<Seller>,
    catalog_states: MongoCollection<CatalogSyncState>,
    baps: MongoCollection<Bap>,
    policies: MongoCollection<AccessPolicy>,
    jobs: MongoCollection<PermissionsJobDoc>,
}

impl MongoStore {
    /// Open every collection and ensure its indexes
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let store = Self {
            sellers: client.collection(SELLER_COLLECTION).await?,
            catalog_states: client.collection(CATALOG_STATE_COLLECTION).await?,
            baps: client.collection(BAP_COLLECTION).await?,
            policies: client.collection(ACCESS_POLICY_COLLECTION).await?,
            jobs: client.collection(PERMISSIONS_JOB_COLLECTION).await?,
        };
        info!(db = %client.db_name(), "MongoDB store ready");
        Ok(store)
    }
}

#[async_trait]
impl SellerStore for MongoStore {
    async fn insert_sellers(&self, sellers: &[Seller]) -> Result<Vec<String>> {
        if sellers.is_empty() {
            return Ok(Vec::new());
        }

        // Unordered so one duplicate identity does not strand the rows after it
        let failed: HashSet<usize> = match self.sellers.inner().insert_many(sellers).ordered(false).await {
            Ok(_) => HashSet::new(),
            Err(e) => {
                let per_row = match e.kind.as_ref() {
                    ErrorKind::InsertMany(InsertManyError {
                        write_errors: Some(write_errors),
                        write_concern_error: None,
                        ..
                    }) => {
                        for failure in write_errors {
                            if let Some(seller) = sellers.get(failure.index) {
                                if failure.code == DUPLICATE_KEY {
                                    warn!(seller_id = %seller.seller_id, "Seller identity already stored, insert skipped");
                                } else {
                                    error!(seller_id = %seller.seller_id, code = failure.code, error = %failure.message, "Seller insert failed");
                                }
                            }
                        }
                        Some(write_errors.iter().map(|f| f.index).collect())
                    }
                    _ => None,
                };
                match per_row {
                    Some(failed) => failed,
                    None => return Err(e.into()),
                }
            }
        };

        Ok(sellers
            .iter()
            .enumerate()
            .filter(|(i, _)| !failed.contains(i))
            .map(|(_, s)| s.seller_id.clone())
            .collect())
    }

    async fn update_sellers(&self, sellers: &[Seller]) -> Result<()> {
        for seller in sellers {
            let filter = seller_identity(&seller.seller_id, &seller.domain, &seller.registry_env);
            self.sellers.replace_upsert(filter, seller).await?;
        }
        Ok(())
    }

    async fn deactivate_sellers(
        &self,
        seller_ids: &[String],
        domain: &str,
        registry_env: &str,
    ) -> Result<u64> {
        if seller_ids.is_empty() {
            return Ok(0);
        }
        let result = self
            .sellers
            .inner()
            .update_many(
                doc! {
                    "seller_id": { "$in": seller_ids.to_vec() },
                    "domain": domain,
                    "registry_env": registry_env,
                },
                doc! { "$set": { "active": false } },
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn sellers_by_domain_and_env(
        &self,
        domain: &str,
        registry_env: &str,
    ) -> Result<Vec<Seller>> {
        self.sellers
            .find_many(doc! { "domain": domain, "registry_env": registry_env }, None)
            .await
    }

    async fn sellers_by_filter(&self, filter: &SellerFilter) -> Result<Vec<Seller>> {
        let query = filter.to_document();
        debug!(filter = %query, "Seller filter query");
        self.sellers
            .find_many(query, Some(doc! { "seller_id": 1 }))
            .await
    }

    async fn seller_by_id(
        &self,
        seller_id: &str,
        domain: &str,
        registry_env: &str,
    ) -> Result<Option<Seller>> {
        self.sellers
            .find_one(seller_identity(seller_id, domain, registry_env))
            .await
    }

    async fn upsert_catalog_state(&self, state: &CatalogSyncState) -> Result<()> {
        let mut state = state.clone();
        state.updated_at = Utc::now();
        let filter = seller_identity(&state.seller_id, &state.domain, &state.registry_env);
        self.catalog_states.replace_upsert(filter, &state).await
    }

    async fn catalog_state(
        &self,
        seller_id: &str,
        domain: &str,
        registry_env: &str,
    ) -> Result<Option<CatalogSyncState>> {
        self.catalog_states
            .find_one(seller_identity(seller_id, domain, registry_env))
            .await
    }

    async fn pending_sellers(
        &self,
        domain: &str,
        registry_env: &str,
        statuses: &[CatalogSyncStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CatalogSyncState>> {
        let statuses: Vec<Bson> = statuses
            .iter()
            .map(|s| Bson::String(s.as_str().to_string()))
            .collect();
        let skip = i64::try_from(offset)
            .map_err(|_| PolicyAgentError::BadRequest(format!("offset {} is out of range", offset)))?;
        let limit = i64::try_from(limit)
            .map_err(|_| PolicyAgentError::BadRequest(format!("limit {} is out of range", limit)))?;

        let pipeline = vec![
            doc! { "$match": {
                "domain": domain,
                "registry_env": registry_env,
                "status": { "$in": statuses },
            }},
            doc! { "$lookup": {
                "from": SELLER_COLLECTION,
                "let": { "sid": "$seller_id" },
                "pipeline": [
                    { "$match": { "$expr": { "$and": [
                        { "$eq": ["$seller_id", "$$sid"] },
                        { "$eq": ["$domain", domain] },
                        { "$eq": ["$registry_env", registry_env] },
                        { "$eq": ["$active", true] },
                    ]}}},
                    { "$limit": 1 },
                ],
                "as": "seller",
            }},
            doc! { "$match": { "seller.0": { "$exists": true } } },
            doc! { "$project": { "seller": 0, "_id": 0 } },
            doc! { "$sort": { "seller_id": 1 } },
            doc! { "$skip": skip },
            doc! { "$limit": limit },
        ];

        let cursor = self.catalog_states.inner().aggregate(pipeline).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;

        documents
            .into_iter()
            .map(|d| bson::from_document(d).map_err(PolicyAgentError::from))
            .collect()
    }
}

#[async_trait]
impl PermissionsStore for MongoStore {
    async fn upsert_baps(&self, baps: &HashMap<String, Bap>) -> Result<()> {
        for (bap_id, bap) in baps {
            self.baps
                .inner()
                .update_one(
                    doc! { "bap_id": bap_id.as_str() },
                    doc! {
                        "$set": { "last_seen_at": bson::DateTime::from_chrono(bap.last_seen_at) },
                        "$setOnInsert": { "first_seen_at": bson::DateTime::from_chrono(bap.first_seen_at) },
                    },
                )
                .upsert(true)
                .await?;
        }
        Ok(())
    }

    async fn find_bap(&self, bap_id: &str) -> Result<Option<Bap>> {
        self.baps.find_one(doc! { "bap_id": bap_id }).await
    }

    async fn upsert_access_policies(&self, policies: &[AccessPolicy]) -> Result<()> {
        for policy in policies {
            let mut policy = policy.clone();
            policy.updated_at = Utc::now();
            let filter = doc! {
                "seller_id": policy.seller_id.as_str(),
                "domain": policy.domain.as_str(),
                "registry_env": policy.registry_env.as_str(),
                "bap_id": policy.bap_id.as_str(),
            };
            self.policies.replace_upsert(filter, &policy).await?;
        }
        Ok(())
    }

    async fn query_access_policies(
        &self,
        bap_id: &str,
        domain: &str,
        registry_env: &str,
        seller_ids: &[String],
    ) -> Result<Vec<AccessPolicy>> {
        self.policies
            .find_many(
                doc! {
                    "bap_id": bap_id,
                    "domain": domain,
                    "registry_env": registry_env,
                    "seller_id": { "$in": seller_ids.to_vec() },
                },
                None,
            )
            .await
    }

    async fn policy_for_bap(&self, bap_id: &str) -> Result<Option<AccessPolicy>> {
        self.policies.find_one(doc! { "bap_id": bap_id }).await
    }

    async fn initiated_job_for_bap(&self, bap_id: &str) -> Result<Option<PermissionsJob>> {
        let Some(row) = self
            .jobs
            .find_one(doc! { "bap_id": bap_id, "status": JobStatus::Initiated.as_str() })
            .await?
        else {
            return Ok(None);
        };
        job_from_doc(row).map(Some)
    }

    async fn create_job(&self, job: &PermissionsJob) -> Result<()> {
        // job_one_initiated_per_bap turns a concurrent second broadcast into a duplicate key
        match self.jobs.inner().insert_one(PermissionsJobDoc::from(job)).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(PolicyAgentError::AlreadyResolved(format!(
                "broadcast already in progress for bap_id: {}",
                job.bap_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<()> {
        let result = self
            .jobs
            .inner()
            .update_one(
                doc! { "job_id": job_id.to_string(), "status": JobStatus::Initiated.as_str() },
                doc! { "$set": {
                    "status": status.as_str(),
                    "updated_at": bson::DateTime::now(),
                }},
            )
            .await?;
        if result.matched_count == 0 {
            return match self.get_job(job_id).await? {
                Some(job) => Err(PolicyAgentError::AlreadyResolved(format!(
                    "job {} already {}",
                    job_id, job.status
                ))),
                None => Err(PolicyAgentError::NotFound(format!("job {}", job_id))),
            };
        }
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<PermissionsJob>> {
        let Some(row) = self.jobs.find_one(doc! { "job_id": job_id.to_string() }).await? else {
            return Ok(None);
        };
        job_from_doc(row).map(Some)
    }
}
