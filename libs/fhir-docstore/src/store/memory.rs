use super::matcher::{compare_values, matches, resolve};
use super::{DeleteResult, DocumentStore, FindOptions, SortDirection, SortSpec, UpdateResult};
use crate::constants::ops;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Document store kept in process memory.
///
/// Evaluates the same filter dialect a MongoDB server would for the filters this crate
/// produces. Used by tests and by embedders running without a database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Vec<JsonValue>>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`, deleted or not.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }

    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find(
        &self,
        collection: &str,
        filter: &JsonValue,
        options: &FindOptions,
    ) -> Result<Vec<JsonValue>> {
        let guard = self.collections.read().await;
        let Some(documents) = guard.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits = Vec::new();
        for doc in documents {
            if matches(doc, filter)? {
                hits.push(doc);
            }
        }
        if !options.sort.is_empty() {
            hits.sort_by(|a, b| compare_by(a, b, &options.sort));
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options.limit.map_or(usize::MAX, |l| l as usize);
        Ok(hits.into_iter().skip(skip).take(limit).cloned().collect())
    }

    async fn insert_one(&self, collection: &str, document: JsonValue) -> Result<()> {
        if !document.is_object() {
            return Err(Error::Store("only objects can be inserted".to_string()));
        }
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &JsonValue,
        update: &JsonValue,
    ) -> Result<UpdateResult> {
        let assignments = set_clause(update)?;
        let mut guard = self.collections.write().await;
        let Some(documents) = guard.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };

        for doc in documents.iter_mut() {
            if !matches(doc, filter)? {
                continue;
            }
            let before = doc.clone();
            for (path, value) in assignments {
                set_path(doc, path, value.clone())?;
            }
            return Ok(UpdateResult {
                matched: 1,
                modified: u64::from(*doc != before),
            });
        }
        Ok(UpdateResult::default())
    }

    async fn delete_one(&self, collection: &str, filter: &JsonValue) -> Result<DeleteResult> {
        let mut guard = self.collections.write().await;
        let Some(documents) = guard.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };

        let mut position = None;
        for (i, doc) in documents.iter().enumerate() {
            if matches(doc, filter)? {
                position = Some(i);
                break;
            }
        }
        Ok(match position {
            Some(i) => {
                documents.remove(i);
                DeleteResult { deleted: 1 }
            }
            None => DeleteResult::default(),
        })
    }
}

fn set_clause(update: &JsonValue) -> Result<&Map<String, JsonValue>> {
    let Some(map) = update.as_object() else {
        return Err(Error::Store("update must be an object".to_string()));
    };
    if let Some(other) = map.keys().find(|k| k.as_str() != ops::SET) {
        return Err(Error::Store(format!("unsupported update operator {other}")));
    }
    map.get(ops::SET)
        .and_then(JsonValue::as_object)
        .ok_or_else(|| Error::Store("update requires a $set document".to_string()))
}

/// Assigns `value` at a dotted path, creating intermediate objects.
fn set_path(doc: &mut JsonValue, path: &str, value: JsonValue) -> Result<()> {
    let mut current = doc;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let map = current
            .as_object_mut()
            .ok_or_else(|| Error::Store(format!("cannot set '{path}' through a non-object")))?;
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return Ok(());
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
    }
    Ok(())
}

fn compare_by(a: &JsonValue, b: &JsonValue, sort: &[SortSpec]) -> Ordering {
    for spec in sort {
        let left = resolve(a, &spec.path).into_iter().next();
        let right = resolve(b, &spec.path).into_iter().next();
        // Missing values sort first.
        let ordering = match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(l), Some(r)) => compare_values(l, r).unwrap_or(Ordering::Equal),
        };
        let ordering = match spec.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
