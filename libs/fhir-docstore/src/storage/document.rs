//! Persisted resource document
//!
//! ```json
//! { "resource": {...}, "isDeleted": false, "searchIndexes": [...],
//!   "version": 3, "lastModified": {"$date": "..."} }
//! ```

use crate::constants::fields;
use crate::encoder::{self, SearchIndexEntryDocument};
use crate::search_value::SearchIndexEntry;
use crate::{extjson, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Identity of a stored resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceKey {
    pub resource_type: String,
    pub id: String,
}

impl ResourceKey {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDocument {
    pub resource: JsonValue,
    pub is_deleted: bool,
    pub search_indexes: Vec<SearchIndexEntryDocument>,
    pub version: i64,
    pub last_modified: DateTime<Utc>,
}

impl ResourceDocument {
    /// Builds a document, encoding the full index set.
    pub fn build(
        resource: JsonValue,
        entries: &[SearchIndexEntry],
        is_deleted: bool,
        version: i64,
        last_modified: DateTime<Utc>,
    ) -> Result<Self> {
        let search_indexes = entries
            .iter()
            .map(encoder::encode)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            resource,
            is_deleted,
            search_indexes,
            version,
            last_modified,
        })
    }

    pub fn to_json(&self) -> Result<JsonValue> {
        let mut doc = Map::new();
        doc.insert(fields::RESOURCE.into(), self.resource.clone());
        doc.insert(fields::IS_DELETED.into(), JsonValue::Bool(self.is_deleted));
        doc.insert(
            fields::SEARCH_INDEXES.into(),
            serde_json::to_value(&self.search_indexes)?,
        );
        doc.insert(fields::VERSION.into(), JsonValue::from(self.version));
        doc.insert(
            fields::LAST_MODIFIED.into(),
            extjson::date(&self.last_modified),
        );
        Ok(JsonValue::Object(doc))
    }

    /// Parses a stored document.
    ///
    /// Documents written before versioning was introduced read as version 1 with an unknown
    /// modification time, reported as the Unix epoch.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::InvalidDocument("document is not an object".to_string()))?;

        let resource = map
            .get(fields::RESOURCE)
            .filter(|r| r.is_object())
            .cloned()
            .ok_or_else(|| Error::InvalidDocument("missing resource payload".to_string()))?;
        let is_deleted = map
            .get(fields::IS_DELETED)
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        let search_indexes = match map.get(fields::SEARCH_INDEXES) {
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
                Error::InvalidDocument(format!("malformed searchIndexes: {e}"))
            })?,
            None => Vec::new(),
        };
        let version = map
            .get(fields::VERSION)
            .and_then(JsonValue::as_i64)
            .unwrap_or(1);
        let last_modified = map
            .get(fields::LAST_MODIFIED)
            .and_then(extjson::as_date)
            .unwrap_or_default();

        Ok(Self {
            resource,
            is_deleted,
            search_indexes,
            version,
            last_modified,
        })
    }

    pub fn key(&self) -> Result<ResourceKey> {
        resource_key(&self.resource)
    }
}

/// Reads `resourceType` and `id` from a raw resource payload.
pub fn resource_key(resource: &JsonValue) -> Result<ResourceKey> {
    let resource_type = resource
        .get(fields::RESOURCE_TYPE)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::Validation("resource is missing resourceType".to_string()))?;
    let id = resource
        .get(fields::ID)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::Validation(format!("{resource_type} resource is missing id")))?;
    Ok(ResourceKey::new(resource_type, id))
}
