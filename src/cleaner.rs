//! Implements the literal and comment cleaning pass.
//!
//! The output text has exactly the same byte length as the input, so every
//! downstream span (structure, signature, call) is valid against the original
//! file by identity. Newlines inside comments and multi-line literals are
//! kept in place so line numbers stay stable as well.

use crate::error::CleanError;
use indexmap::IndexMap;

/// One replaced string literal.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LiteralEntry {
    /// Placeholder written into the cleaned text, if the literal was long
    /// enough to hold one; short literals are blanked in place instead.
    pub placeholder: Option<String>,
    /// Byte offset of the literal in the original text.
    pub start: usize,
    /// Byte length of the literal, quotes included.
    pub len: usize,
    /// The literal exactly as written, quotes included.
    pub original: String,
}

/// Mapping from placeholder tokens (and byte offsets) back to the original
/// string literals.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct LiteralMap {
    entries: Vec<LiteralEntry>,
    by_placeholder: IndexMap<String, usize>,
}

impl LiteralMap {
    fn push(&mut self, entry: LiteralEntry) {
        if let Some(placeholder) = &entry.placeholder {
            self.by_placeholder
                .insert(placeholder.clone(), self.entries.len());
        }
        self.entries.push(entry);
    }

    /// Looks up the original literal for a placeholder token.
    pub fn get(&self, placeholder: &str) -> Option<&str> {
        self.by_placeholder
            .get(placeholder)
            .map(|&i| self.entries[i].original.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LiteralEntry] {
        &self.entries
    }

    /// Restores all literals fully contained in a cleaned-text slice.
    ///
    /// `start` is the byte offset of `text` within the cleaned file. Every
    /// replacement is length-preserving, so entries can be spliced back by
    /// offset regardless of whether they were substituted by placeholder or
    /// blanked in place.
    pub fn restore(&self, start: usize, text: &str) -> String {
        let end = start + text.len();
        let mut bytes = text.as_bytes().to_vec();
        for entry in &self.entries {
            if entry.start >= start && entry.start + entry.len <= end {
                let at = entry.start - start;
                bytes[at..at + entry.len].copy_from_slice(entry.original.as_bytes());
            }
        }
        // Splices are whole literals at the offsets the cleaner wrote them,
        // so the result is valid UTF-8 again.
        String::from_utf8(bytes).unwrap_or_else(|e| {
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        })
    }
}

/// Result of the cleaning pass.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CleanedSource {
    pub text: String,
    pub literals: LiteralMap,
}

/// Strips comments and substitutes string literals, preserving byte length.
///
/// Applied left-to-right in one pass:
/// 1. `-- …` line comments become spaces up to the line terminator.
/// 2. `/* … */` block comments become spaces (newlines kept); an unterminated
///    block comment is an error.
/// 3. `'…''…'` string literals become `§L<i>§` placeholders padded with
///    spaces; literals too short for a placeholder, or spanning lines, are
///    blanked between their kept quotes.
/// 4. `"…"` quoted identifiers are preserved verbatim.
pub fn clean(raw: &str) -> Result<CleanedSource, CleanError> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut literals = LiteralMap::default();

    // The placeholder prefix must not otherwise appear in the input;
    // lengthen it until it does not.
    let mut prefix = String::from("§");
    while raw.contains(&format!("{prefix}L")) {
        prefix.push('§');
    }

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' && bytes[i] != b'\r' {
                    out.push(b' ');
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let start = i;
                let mut j = i + 2;
                loop {
                    if j + 1 >= bytes.len() {
                        return Err(CleanError::UnterminatedBlockComment { at: start });
                    }
                    if bytes[j] == b'*' && bytes[j + 1] == b'/' {
                        j += 2;
                        break;
                    }
                    j += 1;
                }
                for &b in &bytes[start..j] {
                    out.push(if b == b'\n' || b == b'\r' { b } else { b' ' });
                }
                i = j;
            }
            b'\'' => {
                let start = i;
                let mut j = i + 1;
                let end = loop {
                    match bytes.get(j) {
                        None => return Err(CleanError::UnterminatedLiteral { at: start }),
                        Some(b'\'') => {
                            if bytes.get(j + 1) == Some(&b'\'') {
                                j += 2;
                            } else {
                                break j + 1;
                            }
                        }
                        Some(_) => j += 1,
                    }
                };

                let original = raw[start..end].to_owned();
                let len = end - start;
                let placeholder = format!("{prefix}L{}§", literals.len());
                let multiline = original.contains('\n') || original.contains('\r');

                if !multiline && placeholder.len() <= len {
                    out.extend_from_slice(placeholder.as_bytes());
                    out.resize(out.len() + (len - placeholder.len()), b' ');
                    literals.push(LiteralEntry {
                        placeholder: Some(placeholder),
                        start,
                        len,
                        original,
                    });
                } else {
                    out.push(b'\'');
                    for &b in &bytes[start + 1..end - 1] {
                        out.push(if b == b'\n' || b == b'\r' { b } else { b' ' });
                    }
                    out.push(b'\'');
                    literals.push(LiteralEntry {
                        placeholder: None,
                        start,
                        len,
                        original,
                    });
                }
                i = end;
            }
            b'"' => {
                out.push(b'"');
                i += 1;
                while i < bytes.len() {
                    out.push(bytes[i]);
                    if bytes[i] == b'"' {
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    debug_assert_eq!(out.len(), bytes.len());
    let text = String::from_utf8(out)
        .expect("length-preserving replacements keep the text valid UTF-8");

    Ok(CleanedSource { text, literals })
}
