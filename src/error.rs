//! Implements the error taxonomy and the diagnostic type attached to files
//! and code objects.
//!
//! Per-file fatal conditions ([`CleanError`], [`StructureError`], storage
//! failures) are caught at the workflow boundary and folded into the run
//! summary; non-fatal conditions ([`SignatureError`], call extraction
//! warnings) are attached to the relevant code object as [`Diagnostic`]s.

use serde::Serialize;
use std::path::PathBuf;

/// Stable machine-readable diagnostic codes.
pub mod codes {
    pub const IO_READ: &str = "CM-IO-001";
    pub const MALFORMED_SOURCE: &str = "CM-CLEAN-001";
    pub const STRUCTURAL_MISMATCH: &str = "CM-STRUCT-001";
    pub const END_LABEL_MISMATCH: &str = "CM-STRUCT-002";
    pub const UNCLOSED_SCOPE: &str = "CM-STRUCT-003";
    pub const SIGNATURE_PARSE: &str = "CM-SIG-001";
    pub const CALL_EXTRACTION: &str = "CM-CALL-001";
    pub const STORAGE_FAILURE: &str = "CM-STORE-001";
}

/// Errors of the cleaning pass. Per-file fatal.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum CleanError {
    #[error("unterminated block comment starting at byte {at}")]
    UnterminatedBlockComment { at: usize },
    #[error("unterminated string literal starting at byte {at}")]
    UnterminatedLiteral { at: usize },
}

impl CleanError {
    pub fn at_byte(&self) -> usize {
        match self {
            Self::UnterminatedBlockComment { at } | Self::UnterminatedLiteral { at } => *at,
        }
    }
}

/// Errors of the structural parser. Per-file fatal.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum StructureError {
    #[error("line {line}: `END {label}` does not close the open {kind} scope")]
    MismatchedEnd {
        line: usize,
        label: String,
        kind: &'static str,
    },
    #[error("line {line}: `END` without any open scope")]
    StrayEnd { line: usize },
}

impl StructureError {
    pub fn line(&self) -> usize {
        match self {
            Self::MismatchedEnd { line, .. } | Self::StrayEnd { line } => *line,
        }
    }
}

/// Signature parsing failure. Non-fatal; the enclosing code object is still
/// recorded with empty parameters.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
#[error("{reason} at byte {at_byte}")]
pub struct SignatureError {
    pub reason: String,
    pub at_byte: usize,
}

/// Errors from the catalog store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{0}")]
    Failed(String),
}

/// Configuration loading and validation failures. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("source root does not exist: {0}")]
    MissingSourceRoot(PathBuf),
    #[error("log verbosity {0} out of range 0..=3")]
    VerbosityOutOfRange(u8),
}

/// Unrecoverable workflow failures; everything else is folded into the run
/// summary as diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cannot create output root {path}: {source}")]
    OutputRoot {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// A machine-readable report of an error or warning, attached to a file or a
/// code object.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Diagnostic {
    pub code: &'static str,
    pub severity: Severity,
    pub path: PathBuf,
    pub object_id: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn error<P, M>(code: &'static str, path: P, message: M) -> Self
    where
        P: Into<PathBuf>,
        M: Into<String>,
    {
        Self {
            code,
            severity: Severity::Error,
            path: path.into(),
            object_id: None,
            message: message.into(),
        }
    }

    pub fn warning<P, M>(code: &'static str, path: P, message: M) -> Self
    where
        P: Into<PathBuf>,
        M: Into<String>,
    {
        Self {
            code,
            severity: Severity::Warning,
            path: path.into(),
            object_id: None,
            message: message.into(),
        }
    }

    pub fn for_object(mut self, id: &str) -> Self {
        self.object_id = Some(id.to_owned());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn diagnostic_carries_code_and_object() {
        let diag = Diagnostic::warning(codes::SIGNATURE_PARSE, "a/b.pks", "oops")
            .for_object("hr.pkg.proc#0");

        assert_eq!(diag.code, "CM-SIG-001");
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.object_id.as_deref(), Some("hr.pkg.proc#0"));
    }

    #[test]
    fn clean_error_reports_offset() {
        let err = CleanError::UnterminatedBlockComment { at: 42 };
        assert_eq!(err.at_byte(), 42);
        assert_eq!(
            err.to_string(),
            "unterminated block comment starting at byte 42"
        );
    }
}
