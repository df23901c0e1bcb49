//! Predicate tree to native filter compilation.
//!
//! - `filter`: immutable filter fragments and their rendering
//! - `assembler`: scope and negation bookkeeping while a tree is walked
//! - `compiler`: per-node translation rules

mod assembler;
mod compiler;
mod filter;

pub use assembler::{missing_parameter_filter, QueryAssembler};
pub use compiler::{compile, compile_into, match_all, CompileOptions, NegationMode};
pub use filter::{is_operator_doc, Filter};
