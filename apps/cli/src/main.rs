//! Command-line front end for the FHIR document-store backend
//!
//! Usage:
//!   fhir-docstore compile tree.json [--negation reject-composite] [--pretty]
//!   fhir-docstore encode entries.json
//!   fhir-docstore capabilities

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ferrum_docstore::logging::init_logging;
use ferrum_docstore::{
    compile, encoder, CompileOptions, Config, Expression, NegationMode, SearchIndexEntry,
    StoreCapabilities,
};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "fhir-docstore")]
#[command(about = "Compile FHIR search trees and encode search indexes for a document store")]
struct Args {
    /// Configuration file (TOML). Defaults and FHIR_DOCSTORE__* variables apply either way.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the native filter for a predicate tree
    Compile {
        /// JSON file holding the predicate tree
        tree: PathBuf,

        /// Overrides search.negation from the configuration
        #[arg(long)]
        negation: Option<NegationMode>,

        #[arg(long)]
        pretty: bool,
    },
    /// Print the encoded searchIndexes array for a list of index entries
    Encode {
        /// JSON file holding an array of index entries
        entries: PathBuf,

        #[arg(long)]
        pretty: bool,
    },
    /// Print the capabilities this backend advertises
    Capabilities,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let _guard = init_logging(&config.logging)?;

    match args.command {
        Command::Compile {
            tree,
            negation,
            pretty,
        } => {
            let expression: Expression = read_json(&tree)?;
            let options = match negation {
                Some(mode) => CompileOptions::with_negation(mode),
                None => config.search.compile_options(),
            };
            let filter = compile(&expression, &options)
                .with_context(|| format!("Failed to compile {}", tree.display()))?;
            print_json(&filter, pretty)
        }
        Command::Encode { entries, pretty } => {
            let entries: Vec<SearchIndexEntry> = read_json(&entries)?;
            tracing::debug!(count = entries.len(), "Encoding search index entries");
            let encoded = encoder::encode_all(&entries).context("Failed to encode entries")?;
            print_json(&encoded, pretty)
        }
        Command::Capabilities => {
            let capabilities = serde_json::to_value(StoreCapabilities::document_store())?;
            print_json(&capabilities, true)
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json(value: &JsonValue, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{rendered}");
    Ok(())
}
