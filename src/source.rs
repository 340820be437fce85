//! Implements content hashing and schema/package derivation from file paths.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::Path;

/// SHA-256 of the raw bytes, lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// What a relative path says about the objects inside the file.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SourceClass {
    /// Derived schema; empty when no component matches the schema prefix.
    pub schema: String,
    /// Package name for standalone objects in `.pks`/`.pkb` files; empty for
    /// other extensions. Objects nested in a parsed package always take the
    /// parsed package name instead.
    pub default_package: String,
}

/// Derives schema and default package name from a path relative to the
/// source root.
///
/// Path components found in `exclude_names` (case-insensitive) are dropped;
/// the first remaining directory component is the schema when it starts with
/// `schema_prefix`.
pub fn classify_path(rel: &Path, exclude_names: &[String], schema_prefix: &str) -> SourceClass {
    let mut dirs = rel
        .parent()
        .map(|p| {
            p.components()
                .filter_map(|c| c.as_os_str().to_str())
                .filter(|c| {
                    !exclude_names
                        .iter()
                        .any(|e| e.eq_ignore_ascii_case(c))
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    dirs.retain(|c| !c.is_empty() && *c != ".");

    let schema = match dirs.first() {
        Some(first)
            if first
                .get(..schema_prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(schema_prefix)) =>
        {
            (*first).to_owned()
        }
        _ => String::new(),
    };

    let extension = rel
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let default_package = if extension == "pks" || extension == "pkb" {
        rel.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_owned()
    } else {
        String::new()
    };

    SourceClass {
        schema,
        default_package,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn excludes() -> Vec<String> {
        vec!["packages".into(), "procedures".into(), "triggers".into()]
    }

    #[test]
    fn hash_is_stable_and_sensitive() {
        let a = content_hash(b"create package x as end;");
        let b = content_hash(b"create package x as end;");
        let c = content_hash(b"create package y as end;");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn classify_package_file() {
        let class = classify_path(
            Path::new("schema_util_common/packages/logger_pkg.pks"),
            &excludes(),
            "schema_",
        );
        assert_eq!(
            class,
            SourceClass {
                schema: "schema_util_common".into(),
                default_package: "logger_pkg".into(),
            }
        );
    }

    #[test]
    fn classify_standalone_procedure() {
        let class = classify_path(
            Path::new("schema_app_core/procedures/cleanup_sessions.prc"),
            &excludes(),
            "schema_",
        );
        assert_eq!(class.schema, "schema_app_core");
        assert_eq!(class.default_package, "");
    }

    #[test]
    fn classify_without_schema_component() {
        let class = classify_path(Path::new("misc/setup.sql"), &excludes(), "schema_");
        assert_eq!(class.schema, "");
        assert_eq!(class.default_package, "");
    }

    #[test]
    fn excluded_components_are_dropped_case_insensitively() {
        let class = classify_path(
            Path::new("Packages/schema_hr/logger_pkg.pkb"),
            &excludes(),
            "schema_",
        );
        assert_eq!(class.schema, "schema_hr");
    }
}
