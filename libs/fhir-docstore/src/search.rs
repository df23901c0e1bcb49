//! Search execution over stored resources
//!
//! Compiles a predicate tree, runs it against the target collection and pages the result with
//! an opaque continuation token.

use crate::config::SearchConfig;
use crate::constants::{fields, ops, resource_path};
use crate::expression::Expression;
use crate::query::{compile, match_all};
use crate::storage::{FhirDataStore, ResourceWrapper};
use crate::store::{cancellable, FindOptions, SortSpec};
use crate::{Error, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::{json, Value as JsonValue};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Predicate tree; `None` matches every live resource.
    pub expression: Option<Expression>,
    /// Restricts the search to one resource type.
    pub resource_type: Option<String>,
    pub max_item_count: Option<u64>,
    pub continuation_token: Option<String>,
    pub sort: Vec<SortSpec>,
}

impl SearchOptions {
    pub fn new(expression: Expression) -> Self {
        Self {
            expression: Some(expression),
            ..Self::default()
        }
    }

    pub fn for_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn with_max_item_count(mut self, count: u64) -> Self {
        self.max_item_count = Some(count);
        self
    }

    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort.push(sort);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub entries: Vec<ResourceWrapper>,
    /// Present when another page may follow.
    pub continuation_token: Option<String>,
}

#[derive(Clone)]
pub struct SearchService {
    data_store: FhirDataStore,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(data_store: FhirDataStore, config: SearchConfig) -> Self {
        Self { data_store, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn search(
        &self,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchResult> {
        let collection = self
            .data_store
            .collections()
            .collection_for_search(options.resource_type.as_deref())?;
        let filter = self.build_filter(options)?;

        let page_size = self.config.page_size(options.max_item_count);
        let skip = match &options.continuation_token {
            Some(token) => decode_continuation_token(token)?,
            None => 0,
        };
        // One extra row tells whether a next page exists.
        let find = FindOptions {
            skip: (skip > 0).then_some(skip),
            limit: Some(page_size + 1),
            sort: options.sort.clone(),
        };

        let store = self.data_store.document_store();
        let mut documents =
            cancellable(cancel, store.find(&collection, &filter, &find)).await?;

        let has_more = documents.len() as u64 > page_size;
        documents.truncate(page_size as usize);
        let entries = documents
            .iter()
            .map(ResourceWrapper::from_document)
            .collect::<Result<Vec<_>>>()?;

        let continuation_token =
            has_more.then(|| encode_continuation_token(skip + entries.len() as u64));

        tracing::debug!(
            collection = %collection,
            skip,
            page_size,
            returned = entries.len(),
            has_more,
            "Search executed"
        );

        Ok(SearchResult {
            entries,
            continuation_token,
        })
    }

    fn build_filter(&self, options: &SearchOptions) -> Result<JsonValue> {
        let compiled = match &options.expression {
            Some(expression) => compile(expression, &self.config.compile_options())
                .inspect_err(|e| {
                    if e.is_compile_error() {
                        tracing::debug!(
                            kind = expression.kind_name(),
                            error = %e,
                            "Search expression rejected"
                        );
                    }
                })?,
            None => match_all(),
        };
        Ok(match &options.resource_type {
            Some(ty) => json!({
                (ops::AND): [compiled, { (resource_path(fields::RESOURCE_TYPE)): ty }]
            }),
            None => compiled,
        })
    }
}

/// Encodes a result offset as an opaque token.
pub fn encode_continuation_token(offset: u64) -> String {
    URL_SAFE_NO_PAD.encode(offset.to_string().as_bytes())
}

pub fn decode_continuation_token(token: &str) -> Result<u64> {
    URL_SAFE_NO_PAD
        .decode(token)
        .ok()
        .and_then(|raw| String::from_utf8(raw).ok())
        .and_then(|raw| raw.parse::<u64>().ok())
        .ok_or_else(|| Error::Validation(format!("invalid continuation token '{token}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_token_round_trips_offset() {
        let token = encode_continuation_token(40);
        assert_eq!(decode_continuation_token(&token).unwrap(), 40);
    }

    #[test]
    fn malformed_token_is_a_validation_error() {
        assert!(matches!(
            decode_continuation_token("%%%"),
            Err(Error::Validation(_))
        ));
        let not_a_number = URL_SAFE_NO_PAD.encode("abc");
        assert!(decode_continuation_token(&not_a_number).is_err());
    }

    #[test]
    fn options_builder() {
        let options = SearchOptions::default()
            .for_type("Patient")
            .with_max_item_count(5)
            .with_sort(SortSpec::desc("lastModified"));
        assert_eq!(options.resource_type.as_deref(), Some("Patient"));
        assert_eq!(options.max_item_count, Some(5));
        assert_eq!(options.sort.len(), 1);
        assert!(options.expression.is_none());
    }
}
