#![allow(dead_code)]

use async_trait::async_trait;
use ferrum_docstore::storage::{CollectionStrategy, ConcurrencyMode, FhirDataStore};
use ferrum_docstore::store::{
    DeleteResult, DocumentStore, FindOptions, InMemoryDocumentStore, UpdateResult,
};
use ferrum_docstore::{
    Error, ResourceWrapper, ResourceWrapperOperation, Result, SearchIndexEntry, SearchParamType,
    SearchParameterInfo, SearchValue,
};
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

static TRACING: OnceLock<()> = OnceLock::new();

pub fn init_tracing() {
    TRACING.get_or_init(ferrum_docstore::logging::init_simple_logging);
}

pub fn data_store(store: Arc<dyn DocumentStore>, concurrency: ConcurrencyMode) -> FhirDataStore {
    init_tracing();
    FhirDataStore::new(store, CollectionStrategy::default(), concurrency)
}

pub fn patient(id: &str, family: &str) -> JsonValue {
    json!({
        "resourceType": "Patient",
        "id": id,
        "name": [{"family": family}]
    })
}

pub fn name_entry(family: &str) -> SearchIndexEntry {
    SearchIndexEntry::new(
        SearchParameterInfo::new("name", SearchParamType::String)
            .with_url("http://hl7.org/fhir/SearchParameter/individual-given"),
        SearchValue::string(family),
    )
}

pub fn identifier_entry(system: &str, value: &str) -> SearchIndexEntry {
    SearchIndexEntry::new(
        SearchParameterInfo::new("identifier", SearchParamType::Token),
        SearchValue::token(Some(system), value),
    )
}

pub fn operation(resource: JsonValue, entries: Vec<SearchIndexEntry>) -> ResourceWrapperOperation {
    ResourceWrapperOperation::new(
        ResourceWrapper::new(resource, entries).expect("test resource has type and id"),
    )
}

fn filter_id(filter: &JsonValue) -> Option<&str> {
    filter.get("resource.id").and_then(JsonValue::as_str)
}

/// Fails every write that targets one of `failing_ids`.
#[derive(Clone)]
pub struct FaultyStore {
    pub inner: InMemoryDocumentStore,
    failing_ids: HashSet<String>,
}

impl FaultyStore {
    pub fn new(failing_ids: &[&str]) -> Self {
        Self {
            inner: InMemoryDocumentStore::new(),
            failing_ids: failing_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn check(&self, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) if self.failing_ids.contains(id) => {
                Err(Error::Store(format!("write rejected for {id}")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn find(
        &self,
        collection: &str,
        filter: &JsonValue,
        options: &FindOptions,
    ) -> Result<Vec<JsonValue>> {
        self.inner.find(collection, filter, options).await
    }

    async fn insert_one(&self, collection: &str, document: JsonValue) -> Result<()> {
        self.check(document["resource"]["id"].as_str())?;
        self.inner.insert_one(collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &JsonValue,
        update: &JsonValue,
    ) -> Result<UpdateResult> {
        self.check(filter_id(filter))?;
        self.inner.update_one(collection, filter, update).await
    }

    async fn delete_one(&self, collection: &str, filter: &JsonValue) -> Result<DeleteResult> {
        self.inner.delete_one(collection, filter).await
    }
}

/// Fires `cancel` once the first write has been applied.
pub struct CancellingStore {
    pub inner: InMemoryDocumentStore,
    pub cancel: CancellationToken,
}

#[async_trait]
impl DocumentStore for CancellingStore {
    async fn find(
        &self,
        collection: &str,
        filter: &JsonValue,
        options: &FindOptions,
    ) -> Result<Vec<JsonValue>> {
        self.inner.find(collection, filter, options).await
    }

    async fn insert_one(&self, collection: &str, document: JsonValue) -> Result<()> {
        self.inner.insert_one(collection, document).await?;
        self.cancel.cancel();
        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &JsonValue,
        update: &JsonValue,
    ) -> Result<UpdateResult> {
        let result = self.inner.update_one(collection, filter, update).await?;
        self.cancel.cancel();
        Ok(result)
    }

    async fn delete_one(&self, collection: &str, filter: &JsonValue) -> Result<DeleteResult> {
        self.inner.delete_one(collection, filter).await
    }
}

/// Simulates a concurrent writer: the first replace is preceded by a foreign version bump.
pub struct RacingStore {
    pub inner: InMemoryDocumentStore,
    pub bumped_version: i64,
    raced: AtomicBool,
}

impl RacingStore {
    pub fn new(bumped_version: i64) -> Self {
        Self {
            inner: InMemoryDocumentStore::new(),
            bumped_version,
            raced: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DocumentStore for RacingStore {
    async fn find(
        &self,
        collection: &str,
        filter: &JsonValue,
        options: &FindOptions,
    ) -> Result<Vec<JsonValue>> {
        self.inner.find(collection, filter, options).await
    }

    async fn insert_one(&self, collection: &str, document: JsonValue) -> Result<()> {
        self.inner.insert_one(collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &JsonValue,
        update: &JsonValue,
    ) -> Result<UpdateResult> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let mut identity = filter.clone();
            if let Some(map) = identity.as_object_mut() {
                map.remove("version");
            }
            self.inner
                .update_one(
                    collection,
                    &identity,
                    &json!({"$set": {"version": self.bumped_version}}),
                )
                .await?;
        }
        self.inner.update_one(collection, filter, update).await
    }

    async fn delete_one(&self, collection: &str, filter: &JsonValue) -> Result<DeleteResult> {
        self.inner.delete_one(collection, filter).await
    }
}
