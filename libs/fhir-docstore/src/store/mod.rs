//! Document-store client contract
//!
//! The storage layer and the search service only talk to a document store through
//! [`DocumentStore`]. Drivers own connection handling, retries and wire encoding.

mod matcher;
mod memory;

pub use matcher::matches;
pub use memory::InMemoryDocumentStore;

use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::future::Future;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One sort key, applied in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub path: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub sort: Vec<SortSpec>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted: u64,
}

/// Minimal filter-based document store.
///
/// Filters and documents use MongoDB extended JSON (`$numberDecimal`, `$date`).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Documents of `collection` matching `filter`, after sort, skip and limit.
    async fn find(
        &self,
        collection: &str,
        filter: &JsonValue,
        options: &FindOptions,
    ) -> Result<Vec<JsonValue>>;

    async fn insert_one(&self, collection: &str, document: JsonValue) -> Result<()>;

    /// Applies `update` (a `{"$set": {...}}` document) to the first document matching `filter`.
    async fn update_one(
        &self,
        collection: &str,
        filter: &JsonValue,
        update: &JsonValue,
    ) -> Result<UpdateResult>;

    /// Physically removes the first document matching `filter`.
    async fn delete_one(&self, collection: &str, filter: &JsonValue) -> Result<DeleteResult>;
}

/// Runs a store call until it finishes or `cancel` fires.
///
/// A fired token wins over a ready result, so callers never observe work started after
/// cancellation.
pub async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = call => result,
    }
}
