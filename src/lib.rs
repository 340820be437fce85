//! Analyzes PL/SQL source trees into a persisted catalog of code objects.
//!
//! The pipeline has three parsing stages over length-preserving cleaned
//! text (structural scope recognition, header signature parsing and call
//! extraction) plus an incremental workflow that hashes files and writes
//! changed ones to a SQLite-backed store in per-file transactions.

pub mod calls;
pub mod catalog;
pub mod cleaner;
pub mod cli;
pub mod config;
pub mod error;
pub mod lexer;
pub mod signature;
pub mod source;
pub mod store;
pub mod structure;
pub mod util;
pub mod workflow;

pub use calls::{extract_calls, KeywordFilter};
pub use catalog::{Call, CodeObject, ObjectKind, ParamMode, Parameter};
pub use cleaner::{clean, CleanedSource, LiteralMap};
pub use config::AnalyzeConfig;
pub use error::Diagnostic;
pub use signature::{parse_signature, Signature};
pub use store::{Catalog, ObjectFilter, SqliteCatalog};
pub use structure::{parse_structure, FileStructure};
pub use workflow::{Extractor, RunSummary};
