//! Implements the extraction workflow: walk the source tree, skip unchanged
//! files, run the parsing pipeline on the rest and persist the results.
//!
//! Files are processed sequentially; each one is written in a single store
//! transaction, so a failure never leaves partial state behind. Per-file
//! fatals are folded into the run summary, the workflow keeps going.

use crate::calls::{extract_calls, KeywordFilter};
use crate::catalog::{assemble_objects, ByteSpan, CodeObject, ObjectKind, ObjectOutline};
use crate::cleaner::clean;
use crate::config::AnalyzeConfig;
use crate::error::{codes, Diagnostic, WorkflowError};
use crate::signature::parse_signature;
use crate::source::{classify_path, content_hash};
use crate::store::Catalog;
use crate::structure::{parse_structure, WarningKind};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use walkdir::{DirEntry, WalkDir};

/// Totals of one workflow run.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct RunSummary {
    pub scanned: usize,
    pub skipped: usize,
    pub reprocessed: usize,
    pub failed: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Drives components A–F over a source tree against a [`Catalog`].
pub struct Extractor<'a, C: Catalog> {
    config: &'a AnalyzeConfig,
    catalog: &'a mut C,
    filter: KeywordFilter,
    cancel: Arc<AtomicBool>,
}

/// Creates `output_root` (and its log directory) if missing.
pub fn prepare_output_root(config: &AnalyzeConfig) -> Result<(), WorkflowError> {
    let log_dir = config.log_dir();
    for dir in [&config.output_root, &log_dir] {
        fs::create_dir_all(dir).map_err(|source| WorkflowError::OutputRoot {
            path: dir.clone(),
            source,
        })?;
    }
    Ok(())
}

impl<'a, C: Catalog> Extractor<'a, C> {
    pub fn new(config: &'a AnalyzeConfig, catalog: &'a mut C) -> Self {
        Self {
            filter: KeywordFilter::new(&config.call_extractor_keywords_to_drop),
            config,
            catalog,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cooperative cancellation: checked between files and between objects.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn run(&mut self) -> Result<RunSummary, WorkflowError> {
        self.config.validate()?;

        let files = self.collect_files();
        info!(
            "analyzing {} file(s) under {}",
            files.len(),
            self.config.source_root.display()
        );

        let mut summary = RunSummary::default();
        for rel in files {
            if self.cancelled() {
                info!("cancellation requested, stopping before `{}`", rel.display());
                break;
            }
            summary.scanned += 1;
            self.process_file(&rel, &mut summary);
        }

        info!(
            "run finished: {} scanned, {} skipped, {} reprocessed, {} failed",
            summary.scanned, summary.skipped, summary.reprocessed, summary.failed
        );
        Ok(summary)
    }

    fn collect_files(&self) -> Vec<PathBuf> {
        let excluded = |entry: &DirEntry| -> bool {
            entry.depth() > 0
                && entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .map(|name| {
                        self.config
                            .exclude_path_names
                            .iter()
                            .any(|e| e.eq_ignore_ascii_case(name))
                    })
                    .unwrap_or(false)
        };

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.config.source_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !excluded(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping unreadable directory entry: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let extension = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .unwrap_or_default();
            if !self.config.include_extensions.contains(&extension) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.config.source_root) {
                files.push(rel.to_owned());
            }
        }
        files.sort();
        files
    }

    fn process_file(&mut self, rel: &Path, summary: &mut RunSummary) {
        let rel_str = rel_key(rel);
        let started = Instant::now();

        let bytes = match fs::read(self.config.source_root.join(rel)) {
            Ok(bytes) => bytes,
            Err(err) => {
                summary.failed += 1;
                summary.diagnostics.push(Diagnostic::error(
                    codes::IO_READ,
                    rel,
                    format!("cannot read source file: {err}"),
                ));
                return;
            }
        };
        let hash = content_hash(&bytes);

        if self.is_listed(&self.config.clear_history_for_file, rel) {
            if let Err(err) = self.catalog.delete_file_history(&rel_str) {
                summary.failed += 1;
                summary.diagnostics.push(Diagnostic::error(
                    codes::STORAGE_FAILURE,
                    rel,
                    format!("cannot clear history: {err}"),
                ));
                return;
            }
            info!("cleared history for `{rel_str}`");
        }

        let force = self.is_listed(&self.config.force_reprocess, rel);
        match self.catalog.file_record(&rel_str) {
            Ok(Some(record)) if record.hash == hash && !force => {
                debug!("`{rel_str}` unchanged, skipping");
                summary.skipped += 1;
                return;
            }
            Ok(_) => {}
            Err(err) => {
                summary.failed += 1;
                summary.diagnostics.push(Diagnostic::error(
                    codes::STORAGE_FAILURE,
                    rel,
                    format!("cannot look up file record: {err}"),
                ));
                return;
            }
        }

        let objects = match self.parse_file(rel, &bytes, summary) {
            Some(objects) => objects,
            None => return,
        };
        if self.cancelled() {
            return;
        }

        match self.catalog.upsert_file(&rel_str, &hash, &objects) {
            Ok(()) => {
                summary.reprocessed += 1;
                if self.config.enable_profiler {
                    info!(
                        "processed `{rel_str}`: {} object(s) in {:?}",
                        objects.len(),
                        started.elapsed()
                    );
                } else {
                    debug!("processed `{rel_str}`: {} object(s)", objects.len());
                }
            }
            Err(err) => {
                summary.failed += 1;
                summary.diagnostics.push(Diagnostic::error(
                    codes::STORAGE_FAILURE,
                    rel,
                    format!("transaction rolled back: {err}"),
                ));
            }
        }
    }

    /// Runs cleaner, structural parser, signature parser and call extractor.
    /// `None` means a per-file fatal was recorded.
    fn parse_file(
        &self,
        rel: &Path,
        bytes: &[u8],
        summary: &mut RunSummary,
    ) -> Option<Vec<CodeObject>> {
        let raw = match std::str::from_utf8(bytes) {
            Ok(raw) => raw,
            Err(err) => {
                summary.failed += 1;
                summary.diagnostics.push(Diagnostic::error(
                    codes::MALFORMED_SOURCE,
                    rel,
                    format!("file is not valid UTF-8: {err}"),
                ));
                return None;
            }
        };

        let cleaned = match clean(raw) {
            Ok(cleaned) => cleaned,
            Err(err) => {
                summary.failed += 1;
                summary.diagnostics.push(Diagnostic::error(
                    codes::MALFORMED_SOURCE,
                    rel,
                    err.to_string(),
                ));
                return None;
            }
        };

        let structure = match parse_structure(&cleaned.text) {
            Ok(structure) => structure,
            Err(err) => {
                summary.failed += 1;
                summary.diagnostics.push(Diagnostic::error(
                    codes::STRUCTURAL_MISMATCH,
                    rel,
                    err.to_string(),
                ));
                return None;
            }
        };
        for warning in &structure.warnings {
            let code = match warning.kind {
                WarningKind::EndLabelMismatch => codes::END_LABEL_MISMATCH,
                WarningKind::UnclosedScope => codes::UNCLOSED_SCOPE,
            };
            summary.diagnostics.push(Diagnostic::warning(
                code,
                rel,
                format!("line {}: {}", warning.line, warning.message),
            ));
        }

        let class = classify_path(
            rel,
            &self.config.exclude_names_for_package_derivation,
            &self.config.schema_prefix,
        );
        let rel_str = rel_key(rel);
        let mut objects = assemble_objects(&structure.objects, &class, &rel_str);

        for (i, outline) in structure.objects.iter().enumerate() {
            if self.cancelled() {
                return None;
            }

            if matches!(outline.kind, ObjectKind::Procedure | ObjectKind::Function) {
                let header = &cleaned.text[outline.bytes.start..outline.header_end];
                match parse_signature(header, outline.bytes.start) {
                    Ok(signature) => {
                        objects[i].parameters = signature.parameters;
                        objects[i].return_type = signature.return_type;
                    }
                    Err(err) => {
                        summary.diagnostics.push(
                            Diagnostic::warning(codes::SIGNATURE_PARSE, rel, err.to_string())
                                .for_object(&objects[i].id),
                        );
                    }
                }
            }

            if let Some(body) = outline.body {
                let masked = mask_children(&cleaned.text, body, i, &structure.objects);
                let extraction =
                    extract_calls(&masked, body.start, &cleaned.literals, &self.filter);
                objects[i].calls = extraction.calls;
                for warning in extraction.warnings {
                    summary.diagnostics.push(
                        Diagnostic::warning(codes::CALL_EXTRACTION, rel, warning)
                            .for_object(&objects[i].id),
                    );
                }
            }
        }

        Some(objects)
    }

    fn is_listed(&self, list: &[PathBuf], rel: &Path) -> bool {
        let key = rel_key(rel);
        list.iter().any(|p| rel_key(p) == key)
    }
}

/// Relative path with `/` separators, the key files are stored under.
pub fn rel_key(path: &Path) -> String {
    path.components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect::<Vec<_>>()
        .join("/")
}

/// Copies an object's body slice with the spans of its child objects blanked
/// out, so every call is attributed to its innermost enclosing object only.
fn mask_children(
    cleaned: &str,
    body: ByteSpan,
    owner: usize,
    outlines: &[ObjectOutline],
) -> String {
    let mut bytes = cleaned.as_bytes()[body.start..body.end].to_vec();
    for (i, outline) in outlines.iter().enumerate() {
        if outline.parent != Some(owner) || i == owner {
            continue;
        }
        let start = outline.bytes.start.max(body.start);
        let end = outline.bytes.end.min(body.end);
        if start >= end {
            continue;
        }
        for b in &mut bytes[start - body.start..end - body.start] {
            if *b != b'\n' && *b != b'\r' {
                *b = b' ';
            }
        }
    }
    String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
