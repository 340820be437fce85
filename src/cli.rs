//! Implements the command-line interface of the `plsql-catalog` binary.

use crate::config::AnalyzeConfig;
use crate::error::ConfigError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "plsql-catalog",
    version,
    about = "Extracts a structural and dependency catalog from PL/SQL source trees"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a source tree and persist the catalog.
    Analyze(AnalyzeArgs),
}

/// Flags mirror the config file; anything given here overrides it.
#[derive(Args, Debug, Default)]
pub struct AnalyzeArgs {
    /// TOML configuration file.
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Directory tree to scan.
    #[arg(long, value_name = "DIR")]
    pub source_root: Option<PathBuf>,

    /// Directory receiving the catalog store and logs.
    #[arg(long, value_name = "DIR")]
    pub output_root: Option<PathBuf>,

    /// Store file name inside the output root.
    #[arg(long, value_name = "NAME")]
    pub database_filename: Option<String>,

    /// File extensions to process (comma separated, without dot).
    #[arg(long, value_delimiter = ',', value_name = "EXT")]
    pub include_extensions: Vec<String>,

    /// Directory names to prune from the walk (comma separated).
    #[arg(long, value_delimiter = ',', value_name = "NAME")]
    pub exclude_path_names: Vec<String>,

    /// Relative path to re-process even if unchanged; may repeat.
    #[arg(long, value_name = "PATH")]
    pub force_reprocess: Vec<PathBuf>,

    /// Relative path whose stored history is dropped first; may repeat.
    #[arg(long, value_name = "PATH")]
    pub clear_history_for_file: Vec<PathBuf>,

    /// 0 = warnings only … 3 = trace.
    #[arg(long, value_name = "N")]
    pub verbosity: Option<u8>,

    /// Log per-file timing.
    #[arg(long)]
    pub enable_profiler: bool,
}

impl AnalyzeArgs {
    /// Resolves the effective configuration: defaults, then the config
    /// file, then CLI overrides.
    pub fn into_config(self) -> Result<AnalyzeConfig, ConfigError> {
        let mut config = match &self.config_file {
            Some(path) => AnalyzeConfig::from_file(path)?,
            None => AnalyzeConfig::default(),
        };

        if let Some(source_root) = self.source_root {
            config.source_root = source_root;
        }
        if let Some(output_root) = self.output_root {
            config.output_root = output_root;
        }
        if let Some(database_filename) = self.database_filename {
            config.database_filename = database_filename;
        }
        if !self.include_extensions.is_empty() {
            config.include_extensions = self
                .include_extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect();
        }
        if !self.exclude_path_names.is_empty() {
            config.exclude_path_names = self.exclude_path_names;
        }
        if !self.force_reprocess.is_empty() {
            config.force_reprocess = self.force_reprocess;
        }
        if !self.clear_history_for_file.is_empty() {
            config.clear_history_for_file = self.clear_history_for_file;
        }
        if let Some(verbosity) = self.verbosity {
            config.log_verbosity = verbosity;
        }
        if self.enable_profiler {
            config.enable_profiler = true;
        }

        Ok(config)
    }
}

/// Process exit codes of the binary.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExitStatus {
    /// Clean run, possibly with non-fatal diagnostics.
    Success,
    /// Unrecoverable failure (store, I/O) after startup.
    Failure,
    /// Invalid configuration or missing source root.
    ConfigError,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => ExitCode::from(0),
            ExitStatus::Failure => ExitCode::from(1),
            ExitStatus::ConfigError => ExitCode::from(2),
        }
    }
}
