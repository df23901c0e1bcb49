//! Configuration for the document-store backend
//!
//! Layered from the built-in defaults below, an optional TOML file, then
//! `FHIR_DOCSTORE__<SECTION>__<KEY>` environment variables (a `.env` file is read first).

use crate::query::{CompileOptions, NegationMode};
use crate::storage::{CollectionStrategy, ConcurrencyMode};
use crate::{Error, Result};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_PREFIX: &str = "FHIR_DOCSTORE";

const DEFAULT_CONFIG: &str = r#"
[store]
connection_string = "mongodb://localhost:27017"
database          = "fhir"
concurrency       = "last-write-wins"

[store.collections]
kind = "shared"
name = "resource"

[search]
default_page_size = 10
max_page_size     = 1000
negation          = "leaf-only"

[logging]
level          = "info"
json           = false
file_enabled   = false
file_directory = "./logs"
file_prefix    = "fhir-docstore"
file_rotation  = "daily"
"#;

const ROTATIONS: &[&str] = &["daily", "hourly", "minutely", "never"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub connection_string: String,
    pub database: String,
    #[serde(default)]
    pub collections: CollectionStrategy,
    #[serde(default)]
    pub concurrency: ConcurrencyMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Page size used when a search does not ask for one
    pub default_page_size: u64,
    /// Upper bound applied to requested page sizes
    pub max_page_size: u64,
    #[serde(default)]
    pub negation: NegationMode,
}

impl SearchConfig {
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions::with_negation(self.negation)
    }

    /// Requested page size clamped to `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 1000,
            negation: NegationMode::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub file_enabled: bool,
    pub file_directory: String,
    pub file_prefix: String,
    /// One of `daily`, `hourly`, `minutely`, `never`
    pub file_rotation: String,
}

impl Config {
    /// Loads configuration from defaults, `path` (if it exists) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config: Config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        tracing::debug!(
            database = %config.store.database,
            concurrency = ?config.store.concurrency,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Built-in defaults only. Does not read files or the environment.
    pub fn defaults() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.database.trim().is_empty() {
            return Err(Error::Validation("store.database must not be empty".to_string()));
        }
        self.store.collections.validate()?;

        if self.search.default_page_size == 0 || self.search.max_page_size == 0 {
            return Err(Error::Validation(
                "search page sizes must be greater than zero".to_string(),
            ));
        }
        if self.search.default_page_size > self.search.max_page_size {
            return Err(Error::Validation(format!(
                "search.default_page_size ({}) exceeds search.max_page_size ({})",
                self.search.default_page_size, self.search.max_page_size
            )));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(Error::Validation(format!(
                "unknown logging level '{}'",
                self.logging.level
            )));
        }
        if !ROTATIONS.contains(&self.logging.file_rotation.as_str()) {
            return Err(Error::Validation(format!(
                "logging.file_rotation must be one of {ROTATIONS:?}"
            )));
        }
        Ok(())
    }
}
