//! Resource merge engine
//!
//! Create-or-replace writes keyed by resource identity. Each batch fetches the existing
//! documents once, then writes operations sequentially in request order.

use super::collection::CollectionStrategy;
use super::document::{resource_key, ResourceDocument, ResourceKey};
use super::wrapper::{ResourceWrapper, ResourceWrapperOperation};
use crate::constants::{fields, ops, resource_path};
use crate::search_value::SearchIndexEntry;
use crate::store::{cancellable, DocumentStore, FindOptions};
use crate::{encoder, extjson, Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How replaces guard against concurrent writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConcurrencyMode {
    /// The replace matches on identity only; the last writer wins.
    #[default]
    LastWriteWins,
    /// The replace also matches on the version read in the batch fetch.
    Optimistic,
}

/// Result of one operation in a merge batch.
#[derive(Debug)]
pub enum MergeOutcome {
    Created(ResourceWrapper),
    Updated(ResourceWrapper),
    Failed(Error),
}

impl MergeOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, MergeOutcome::Failed(_))
    }

    pub fn wrapper(&self) -> Option<&ResourceWrapper> {
        match self {
            MergeOutcome::Created(w) | MergeOutcome::Updated(w) => Some(w),
            MergeOutcome::Failed(_) => None,
        }
    }
}

/// Storage front end over a [`DocumentStore`].
#[derive(Clone)]
pub struct FhirDataStore {
    store: Arc<dyn DocumentStore>,
    collections: CollectionStrategy,
    concurrency: ConcurrencyMode,
}

impl FhirDataStore {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collections: CollectionStrategy,
        concurrency: ConcurrencyMode,
    ) -> Self {
        Self {
            store,
            collections,
            concurrency,
        }
    }

    pub fn collections(&self) -> &CollectionStrategy {
        &self.collections
    }

    pub fn concurrency(&self) -> ConcurrencyMode {
        self.concurrency
    }

    pub fn document_store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    /// Creates or replaces every operation's resource.
    ///
    /// Each operation gets an outcome; a failure on one key does not stop the batch. Later
    /// operations on a key already written in this batch see that write. Returns
    /// `Error::Cancelled` if `cancel` fires; writes completed before that stay applied.
    pub async fn merge(
        &self,
        operations: &[ResourceWrapperOperation],
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<ResourceKey, MergeOutcome>> {
        let mut results = BTreeMap::new();
        if operations.is_empty() {
            return Ok(results);
        }

        let keys: Vec<ResourceKey> = operations.iter().map(|op| op.key()).collect();
        let mut existing = self.fetch_documents(&keys, cancel).await?;

        for operation in operations {
            let key = operation.key();
            let written = self.write_one(operation, existing.get(&key), cancel).await;
            let outcome = match written {
                Ok((outcome, written)) => {
                    existing.insert(key.clone(), written);
                    outcome
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Merge operation failed");
                    MergeOutcome::Failed(e)
                }
            };
            results.insert(key, outcome);
        }

        let failed = results.values().filter(|o| !o.is_success()).count();
        tracing::info!(
            operations = operations.len(),
            keys = results.len(),
            failed,
            "Merged resource batch"
        );
        Ok(results)
    }

    /// Single-operation merge that surfaces a failed outcome as an error.
    pub async fn upsert(
        &self,
        operation: ResourceWrapperOperation,
        cancel: &CancellationToken,
    ) -> Result<MergeOutcome> {
        let key = operation.key();
        let mut results = self.merge(std::slice::from_ref(&operation), cancel).await?;
        match results.remove(&key) {
            Some(MergeOutcome::Failed(e)) => Err(e),
            Some(outcome) => Ok(outcome),
            None => Err(Error::Store(format!("merge produced no outcome for {key}"))),
        }
    }

    /// Stored resources for `keys`, soft-deleted ones included. Unknown keys are skipped.
    pub async fn get(
        &self,
        keys: &[ResourceKey],
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceWrapper>> {
        let found = self.fetch_documents(keys, cancel).await?;
        let mut seen = HashSet::new();
        let mut wrappers = Vec::new();
        for key in keys {
            if !seen.insert(key) {
                continue;
            }
            if let Some(doc) = found.get(key) {
                wrappers.push(wrapper_from(key, doc));
            }
        }
        Ok(wrappers)
    }

    pub async fn get_one(
        &self,
        key: &ResourceKey,
        cancel: &CancellationToken,
    ) -> Result<Option<ResourceWrapper>> {
        Ok(self
            .get(std::slice::from_ref(key), cancel)
            .await?
            .into_iter()
            .next())
    }

    /// Physically removes a resource. Returns false if nothing was stored under `key`.
    pub async fn hard_delete(&self, key: &ResourceKey, cancel: &CancellationToken) -> Result<bool> {
        let collection = self.collections.collection_for(&key.resource_type);
        let result = cancellable(cancel, self.store.delete_one(&collection, &key_filter(key)))
            .await?;
        tracing::info!(key = %key, deleted = result.deleted, "Hard delete");
        Ok(result.deleted > 0)
    }

    /// Replaces the stored index set of an existing resource without touching its payload
    /// or version.
    pub async fn update_search_indexes(
        &self,
        key: &ResourceKey,
        entries: &[SearchIndexEntry],
        cancel: &CancellationToken,
    ) -> Result<ResourceWrapper> {
        let existing = self.fetch_documents(std::slice::from_ref(key), cancel).await?;
        let current = existing
            .get(key)
            .ok_or_else(|| Error::ResourceNotFound {
                resource_type: key.resource_type.clone(),
                id: key.id.clone(),
            })?;

        let indexes = encoder::encode_all(entries)?;
        let now = Utc::now();
        let filter = self.replace_filter(key, current.version);
        let update = json!({ (ops::SET): {
            (fields::SEARCH_INDEXES): indexes,
            (fields::LAST_MODIFIED): extjson::date(&now)
        }});

        let collection = self.collections.collection_for(&key.resource_type);
        let result = cancellable(cancel, self.store.update_one(&collection, &filter, &update))
            .await?;
        if result.matched == 0 {
            return Err(self.lost_race(key, current.version, cancel).await);
        }

        let mut wrapper = wrapper_from(key, current);
        wrapper.last_modified = now;
        wrapper.search_indices = entries.to_vec();
        Ok(wrapper)
    }

    async fn write_one(
        &self,
        operation: &ResourceWrapperOperation,
        existing: Option<&ResourceDocument>,
        cancel: &CancellationToken,
    ) -> Result<(MergeOutcome, ResourceDocument)> {
        let wrapper = &operation.wrapper;
        let key = wrapper.key();
        let payload_key = resource_key(&wrapper.resource)?;
        if payload_key != key {
            return Err(Error::Validation(format!(
                "wrapper key {key} does not match resource identity {payload_key}"
            )));
        }
        let collection = self.collections.collection_for(&key.resource_type);
        let now = Utc::now();

        let current_version = existing.map_or(0, |d| d.version);
        if let Some(expected) = operation.expected_version {
            if expected != current_version {
                return Err(version_conflict(&key, expected, current_version));
            }
        }

        let Some(current) = existing else {
            let document = ResourceDocument::build(
                wrapper.resource.clone(),
                &wrapper.search_indices,
                false,
                1,
                now,
            )?;
            cancellable(cancel, self.store.insert_one(&collection, document.to_json()?)).await?;
            tracing::debug!(key = %key, collection = %collection, "Inserted resource");
            let stored = stored_wrapper(wrapper, &document);
            return Ok((MergeOutcome::Created(stored), document));
        };

        let document = ResourceDocument::build(
            wrapper.resource.clone(),
            &wrapper.search_indices,
            wrapper.is_deleted,
            current.version + 1,
            now,
        )?;
        let filter = self.replace_filter(&key, current.version);
        let replacement = document.to_json()?;
        let update = json!({ (ops::SET): replacement });
        let result = cancellable(cancel, self.store.update_one(&collection, &filter, &update))
            .await?;
        if result.matched == 0 {
            return Err(self.lost_race(&key, current.version, cancel).await);
        }

        tracing::debug!(
            key = %key,
            version = document.version,
            deleted = document.is_deleted,
            "Replaced resource"
        );
        let stored = stored_wrapper(wrapper, &document);
        Ok((MergeOutcome::Updated(stored), document))
    }

    /// Identity filter, plus the expected version under optimistic concurrency.
    fn replace_filter(&self, key: &ResourceKey, version: i64) -> JsonValue {
        let mut filter = key_filter(key);
        if self.concurrency == ConcurrencyMode::Optimistic {
            if let Some(map) = filter.as_object_mut() {
                map.insert(fields::VERSION.to_string(), JsonValue::from(version));
            }
        }
        filter
    }

    /// Error for a replace that matched nothing.
    async fn lost_race(
        &self,
        key: &ResourceKey,
        expected: i64,
        cancel: &CancellationToken,
    ) -> Error {
        match self.fetch_documents(std::slice::from_ref(key), cancel).await {
            Ok(found) => match found.get(key) {
                Some(doc) => version_conflict(key, expected, doc.version),
                None => Error::ResourceNotFound {
                    resource_type: key.resource_type.clone(),
                    id: key.id.clone(),
                },
            },
            Err(e) => e,
        }
    }

    /// Batch fetch: one `find` per collection with an `$or` over the distinct keys.
    ///
    /// No soft-delete filter is applied; merges must see deleted documents to replace them.
    async fn fetch_documents(
        &self,
        keys: &[ResourceKey],
        cancel: &CancellationToken,
    ) -> Result<HashMap<ResourceKey, ResourceDocument>> {
        let mut by_collection: BTreeMap<String, Vec<&ResourceKey>> = BTreeMap::new();
        for key in keys {
            let group = by_collection
                .entry(self.collections.collection_for(&key.resource_type))
                .or_default();
            if !group.contains(&key) {
                group.push(key);
            }
        }

        let mut found = HashMap::new();
        for (collection, group) in by_collection {
            let alternatives: Vec<JsonValue> = group.iter().copied().map(key_filter).collect();
            let filter = json!({ (ops::OR): alternatives });
            let documents = cancellable(
                cancel,
                self.store.find(&collection, &filter, &FindOptions::default()),
            )
            .await?;
            for raw in documents {
                let doc = ResourceDocument::from_json(&raw)?;
                let key = doc.key().map_err(|e| Error::InvalidDocument(e.to_string()))?;
                found.insert(key, doc);
            }
        }
        tracing::debug!(
            requested = keys.len(),
            found = found.len(),
            "Fetched existing resources"
        );
        Ok(found)
    }
}

/// `{"resource.id": id, "resource.resourceType": type}`
fn key_filter(key: &ResourceKey) -> JsonValue {
    let mut map = Map::new();
    map.insert(resource_path(fields::ID), JsonValue::from(key.id.clone()));
    map.insert(
        resource_path(fields::RESOURCE_TYPE),
        JsonValue::from(key.resource_type.clone()),
    );
    JsonValue::Object(map)
}

fn version_conflict(key: &ResourceKey, expected: i64, actual: i64) -> Error {
    Error::VersionConflict {
        resource_type: key.resource_type.clone(),
        id: key.id.clone(),
        expected,
        actual,
    }
}

fn stored_wrapper(request: &ResourceWrapper, document: &ResourceDocument) -> ResourceWrapper {
    ResourceWrapper {
        is_deleted: document.is_deleted,
        version: document.version,
        last_modified: document.last_modified,
        ..request.clone()
    }
}

fn wrapper_from(key: &ResourceKey, document: &ResourceDocument) -> ResourceWrapper {
    ResourceWrapper {
        id: key.id.clone(),
        resource_type: key.resource_type.clone(),
        resource: document.resource.clone(),
        is_deleted: document.is_deleted,
        version: document.version,
        last_modified: document.last_modified,
        search_indices: Vec::new(),
    }
}
