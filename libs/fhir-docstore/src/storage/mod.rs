//! Resource persistence on top of a document store

mod collection;
mod document;
mod merge;
mod wrapper;

pub use collection::{CollectionStrategy, DEFAULT_COLLECTION};
pub use document::{resource_key, ResourceDocument, ResourceKey};
pub use merge::{ConcurrencyMode, FhirDataStore, MergeOutcome};
pub use wrapper::{ResourceWrapper, ResourceWrapperOperation};
