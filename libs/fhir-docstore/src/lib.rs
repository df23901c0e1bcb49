//! Document-store search and persistence backend for a FHIR server
//!
//! - Compiles FHIR search predicate trees into MongoDB-style native filters
//! - Encodes extracted search-index entries into stored sub-documents
//! - Persists resources with create-or-replace merge semantics
//! - Pages search results over any [`store::DocumentStore`]

pub mod capabilities;
pub mod config;
pub mod constants;
pub mod encoder;
pub mod error;
pub mod expression;
pub mod extjson;
pub mod jobs;
pub mod logging;
pub mod mapping;
pub mod query;
pub mod search;
pub mod search_value;
pub mod storage;
pub mod store;

pub use capabilities::StoreCapabilities;
pub use config::Config;
pub use error::{Error, Result};
pub use expression::Expression;
pub use query::{compile, CompileOptions, NegationMode};
pub use search::{SearchOptions, SearchResult, SearchService};
pub use search_value::{SearchIndexEntry, SearchParamType, SearchParameterInfo, SearchValue};
pub use storage::{FhirDataStore, MergeOutcome, ResourceKey, ResourceWrapper, ResourceWrapperOperation};
