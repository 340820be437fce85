//! Implements workflow configuration: defaults, TOML file loading and
//! validation.

use crate::error::ConfigError;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Inputs of the extraction workflow.
///
/// Every field has a default, so an empty TOML file (or none at all) is a
/// valid starting point; CLI flags override file values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzeConfig {
    /// Directory tree to scan.
    pub source_root: PathBuf,
    /// Directory receiving the catalog store and logs.
    pub output_root: PathBuf,
    /// Store file name inside `output_root`.
    pub database_filename: String,
    /// File extensions to process (lowercase, without dot).
    pub include_extensions: Vec<String>,
    /// Directory names pruned from the walk.
    pub exclude_path_names: Vec<String>,
    /// Path components ignored when deriving schema/package names.
    pub exclude_names_for_package_derivation: Vec<String>,
    /// A leading path component with this prefix is taken as the schema.
    pub schema_prefix: String,
    /// Call names (exact or `prefix.*`) that are never recorded.
    pub call_extractor_keywords_to_drop: Vec<String>,
    /// Relative paths re-processed even when their hash is unchanged.
    pub force_reprocess: Vec<PathBuf>,
    /// Relative paths whose prior records are dropped before the run.
    pub clear_history_for_file: Vec<PathBuf>,
    /// 0 = warnings only … 3 = trace.
    pub log_verbosity: u8,
    /// Log per-file timing.
    pub enable_profiler: bool,
}

/// SQL builtins whose invocations are noise for call-graph purposes.
const DEFAULT_DROPPED_KEYWORDS: &[&str] = &[
    "abs", "avg", "coalesce", "count", "decode", "greatest", "instr", "least",
    "length", "lower", "lpad", "ltrim", "max", "min", "mod", "nvl", "nvl2",
    "round", "rpad", "rtrim", "substr", "sum", "to_char", "to_date",
    "to_number", "trim", "trunc", "upper",
];

impl Default for AnalyzeConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("."),
            output_root: PathBuf::from("plsql-catalog-output"),
            database_filename: "plsql_catalog.db".to_owned(),
            include_extensions: ["sql", "pks", "pkb", "fnc", "prc", "trg"]
                .map(str::to_owned)
                .to_vec(),
            exclude_path_names: Vec::new(),
            exclude_names_for_package_derivation: ["packages", "procedures", "functions", "triggers"]
                .map(str::to_owned)
                .to_vec(),
            schema_prefix: "schema_".to_owned(),
            call_extractor_keywords_to_drop: DEFAULT_DROPPED_KEYWORDS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            force_reprocess: Vec::new(),
            clear_history_for_file: Vec::new(),
            log_verbosity: 1,
            enable_profiler: false,
        }
    }
}

impl AnalyzeConfig {
    /// Loads a TOML config file. Unknown keys are rejected.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source_root.is_dir() {
            return Err(ConfigError::MissingSourceRoot(self.source_root.clone()));
        }
        if self.log_verbosity > 3 {
            return Err(ConfigError::VerbosityOutOfRange(self.log_verbosity));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.output_root.join(&self.database_filename)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.output_root.join("logs")
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.log_verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
