//! Error types for the search compiler and the document store

use crate::expression::{FieldName, StringOperator};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("No document field is mapped for {0:?}")]
    UnmappedField(FieldName),

    #[error("No native operator is mapped for {0}")]
    UnmappedOperator(String),

    #[error("Unsupported value type in comparison: {0}")]
    UnsupportedValueType(String),

    #[error("Unsupported string operator: {0:?}")]
    UnsupportedStringOperator(StringOperator),

    #[error("Unsupported search value encoding: {0}")]
    UnsupportedValueEncoding(String),

    #[error("Query assembler misuse: {0}")]
    AssemblerState(String),

    #[error("Document store error: {0}")]
    Store(String),

    #[error("Resource not found: {resource_type}/{id}")]
    ResourceNotFound { resource_type: String, id: String },

    #[error("Invalid stored document: {0}")]
    InvalidDocument(String),

    #[error("Version conflict on {resource_type}/{id}: expected {expected}, got {actual}")]
    VersionConflict {
        resource_type: String,
        id: String,
        expected: i64,
        actual: i64,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Job queue error: {0}")]
    JobQueue(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// True for errors raised while walking a predicate tree.
    ///
    /// These are fatal to the compile call and never leave a partial filter behind.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedExpression(_)
                | Error::UnmappedField(_)
                | Error::UnmappedOperator(_)
                | Error::UnsupportedValueType(_)
                | Error::UnsupportedStringOperator(_)
                | Error::UnsupportedValueEncoding(_)
                | Error::AssemblerState(_)
        )
    }
}
