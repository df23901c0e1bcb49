use super::document::{resource_key, ResourceDocument, ResourceKey};
use crate::search_value::SearchIndexEntry;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

/// A resource plus the metadata the storage layer tracks for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceWrapper {
    pub id: String,
    pub resource_type: String,
    /// Raw resource payload
    pub resource: JsonValue,
    pub is_deleted: bool,
    /// Starts at 1, incremented on each overwrite
    pub version: i64,
    pub last_modified: DateTime<Utc>,
    /// Index entries to persist with the resource. Empty for wrappers read back from storage.
    pub search_indices: Vec<SearchIndexEntry>,
}

impl ResourceWrapper {
    /// Wraps a payload for writing. Version and timestamp are assigned by the store.
    pub fn new(resource: JsonValue, search_indices: Vec<SearchIndexEntry>) -> Result<Self> {
        let key = resource_key(&resource)?;
        Ok(Self {
            id: key.id,
            resource_type: key.resource_type,
            resource,
            is_deleted: false,
            version: 0,
            last_modified: Utc::now(),
            search_indices,
        })
    }

    /// Marks the wrapper as a soft delete.
    pub fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.resource_type.clone(), self.id.clone())
    }

    /// Rebuilds a wrapper from a stored document.
    pub fn from_document(document: &JsonValue) -> Result<Self> {
        let parsed = ResourceDocument::from_json(document)?;
        let key = parsed
            .key()
            .map_err(|e| Error::InvalidDocument(e.to_string()))?;
        Ok(Self {
            id: key.id,
            resource_type: key.resource_type,
            resource: parsed.resource,
            is_deleted: parsed.is_deleted,
            version: parsed.version,
            last_modified: parsed.last_modified,
            search_indices: Vec::new(),
        })
    }
}

/// One write request in a merge batch.
#[derive(Debug, Clone)]
pub struct ResourceWrapperOperation {
    pub wrapper: ResourceWrapper,
    /// Version the caller last saw; checked before overwriting.
    pub expected_version: Option<i64>,
}

impl ResourceWrapperOperation {
    pub fn new(wrapper: ResourceWrapper) -> Self {
        Self {
            wrapper,
            expected_version: None,
        }
    }

    pub fn with_expected_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn key(&self) -> ResourceKey {
        self.wrapper.key()
    }
}
