//! Memoised reference data reads
//!
//! `ReferenceData` sits in front of a `ReferenceSource` and keeps each list in
//! an `EphemeralCache` as JSON. A value that no longer decodes is treated as a
//! miss, so cache trouble only ever costs a direct read.

use async_trait::async_trait;
use bson::doc;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{keys, EphemeralCache};
use crate::db::mongo::MongoClient;
use crate::db::schemas::{
    CategoryDoc, Role, UserDoc, ViolationTypeDoc, CATEGORY_COLLECTION, USER_COLLECTION,
    VIOLATION_TYPE_COLLECTION,
};
use crate::types::Result;

/// Where reference data ultimately comes from
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn categories(&self) -> Result<Vec<CategoryDoc>>;

    async fn violation_types(&self) -> Result<Vec<ViolationTypeDoc>>;

    /// Active users with the hearing officer role
    async fn hearing_officers(&self) -> Result<Vec<UserDoc>>;
}

/// Reads reference collections from MongoDB
#[derive(Clone)]
pub struct MongoReferenceSource {
    client: MongoClient,
}

impl MongoReferenceSource {
    pub fn new(client: MongoClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReferenceSource for MongoReferenceSource {
    async fn categories(&self) -> Result<Vec<CategoryDoc>> {
        self.client
            .collection::<CategoryDoc>(CATEGORY_COLLECTION)
            .find_many(doc! {})
            .await
    }

    async fn violation_types(&self) -> Result<Vec<ViolationTypeDoc>> {
        self.client
            .collection::<ViolationTypeDoc>(VIOLATION_TYPE_COLLECTION)
            .find_many(doc! {})
            .await
    }

    async fn hearing_officers(&self) -> Result<Vec<UserDoc>> {
        self.client
            .collection::<UserDoc>(USER_COLLECTION)
            .find_many(doc! { "role": Role::HearingOfficer.as_str(), "is_active": true })
            .await
    }
}

/// Cached view over a `ReferenceSource`
pub struct ReferenceData<S> {
    source: S,
    cache: Arc<EphemeralCache<serde_json::Value>>,
}

impl<S: ReferenceSource> ReferenceData<S> {
    pub fn new(source: S, cache: Arc<EphemeralCache<serde_json::Value>>) -> Self {
        Self { source, cache }
    }

    /// The cache instance, for callers that must invalidate after writes
    pub fn cache(&self) -> &Arc<EphemeralCache<serde_json::Value>> {
        &self.cache
    }

    pub async fn categories(&self) -> Result<Vec<CategoryDoc>> {
        self.memoised(keys::CATEGORIES, || self.source.categories())
            .await
    }

    pub async fn violation_types(&self) -> Result<Vec<ViolationTypeDoc>> {
        self.memoised(keys::VIOLATION_TYPES, || self.source.violation_types())
            .await
    }

    pub async fn hearing_officers(&self) -> Result<Vec<UserDoc>> {
        self.memoised(keys::HEARING_OFFICERS, || self.source.hearing_officers())
            .await
    }

    async fn memoised<T, F, Fut>(&self, key: &str, load: F) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        if let Some(cached) = self.cache.get(key) {
            match serde_json::from_value::<Vec<T>>(cached) {
                Ok(items) => return Ok(items),
                Err(e) => {
                    warn!(key = key, error = %e, "Discarding undecodable cache entry");
                    self.cache.clear(key);
                }
            }
        }

        let items = load().await?;

        match serde_json::to_value(&items) {
            Ok(value) => self.cache.set(key, value),
            Err(e) => warn!(key = key, error = %e, "Reference data not cached"),
        }
        debug!(key = key, count = items.len(), "Loaded reference data from store");

        Ok(items)
    }
}
