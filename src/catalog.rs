//! Implements the catalog data model: code objects, signatures and calls.

use crate::source::SourceClass;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Different kinds of code objects the pipeline can discover.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    PackageSpec,
    PackageBody,
    Procedure,
    Function,
    Trigger,
    AnonymousBlock,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PackageSpec => "package_spec",
            Self::PackageBody => "package_body",
            Self::Procedure => "procedure",
            Self::Function => "function",
            Self::Trigger => "trigger",
            Self::AnonymousBlock => "anonymous_block",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "package_spec" => Some(Self::PackageSpec),
            "package_body" => Some(Self::PackageBody),
            "procedure" => Some(Self::Procedure),
            "function" => Some(Self::Function),
            "trigger" => Some(Self::Trigger),
            "anonymous_block" => Some(Self::AnonymousBlock),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter passing mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamMode {
    In,
    Out,
    InOut,
}

impl ParamMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
            Self::InOut => "IN OUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN" => Some(Self::In),
            "OUT" => Some(Self::Out),
            "IN OUT" => Some(Self::InOut),
            _ => None,
        }
    }
}

/// Half-open byte range `[start, end)` into the original file.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize)]
pub struct ByteSpan {
    pub start: usize,
    pub end: usize,
}

impl ByteSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(self) -> bool {
        self.end <= self.start
    }

    pub fn contains(self, other: ByteSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(self, other: ByteSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Inclusive 1-based line range.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub mode: ParamMode,
    pub type_text: String,
    pub default_text: Option<String>,
}

/// An outbound call recorded inside a code object's body.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Call {
    /// Callee name as written, possibly dotted.
    pub callee: String,
    pub positional_args: Vec<String>,
    pub named_args: IndexMap<String, String>,
    pub span: ByteSpan,
}

/// A discovered PL/SQL entity with its source span.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CodeObject {
    pub id: String,
    pub kind: ObjectKind,
    pub name: String,
    pub schema: String,
    pub package: String,
    pub parent_id: Option<String>,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
    pub source_file: String,
    pub lines: LineSpan,
    pub bytes: ByteSpan,
    pub calls: Vec<Call>,
    pub overload_index: u32,
    pub overloaded: bool,
}

/// What the structural parser knows about an object before signatures and
/// calls are attached.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ObjectOutline {
    pub kind: ObjectKind,
    /// Declared name; empty for anonymous blocks.
    pub name: String,
    /// Index of the enclosing outline in emission (source) order.
    pub parent: Option<usize>,
    pub lines: LineSpan,
    pub bytes: ByteSpan,
    /// End of the header slice handed to the signature parser.
    pub header_end: usize,
    /// Body slice handed to the call extractor; `None` for package-spec
    /// declarations, which have no body.
    pub body: Option<ByteSpan>,
}

/// Turns structural outlines into code objects with stable identities.
///
/// Overload indexes are assigned in source order among siblings sharing
/// `(schema, package, name, kind)`; ids join the non-empty qualified-name
/// segments and append `#<overload_index>`. The package segment of objects
/// under a package body carries `%body` so spec and body ids never collide.
pub fn assemble_objects(
    outlines: &[ObjectOutline],
    class: &SourceClass,
    source_file: &str,
) -> Vec<CodeObject> {
    // (package field, package id segment) per outline.
    let mut packages = Vec::with_capacity(outlines.len());
    for outline in outlines {
        let mut ancestor = outline.parent;
        let mut found = None;
        while let Some(i) = ancestor {
            match outlines[i].kind {
                ObjectKind::PackageSpec => {
                    found = Some((outlines[i].name.clone(), outlines[i].name.clone()));
                    break;
                }
                ObjectKind::PackageBody => {
                    found = Some((outlines[i].name.clone(), format!("{}%body", outlines[i].name)));
                    break;
                }
                _ => ancestor = outlines[i].parent,
            }
        }
        let entry = found.unwrap_or_else(|| {
            match outline.kind {
                // A package is not contained in a package.
                ObjectKind::PackageSpec | ObjectKind::PackageBody => Default::default(),
                _ if outline.parent.is_none() => (
                    class.default_package.clone(),
                    class.default_package.clone(),
                ),
                _ => Default::default(),
            }
        });
        packages.push(entry);
    }

    let name_segment = |outline: &ObjectOutline| -> String {
        let base = if outline.name.is_empty() {
            "anonymous_block".to_owned()
        } else {
            outline.name.clone()
        };
        match outline.kind {
            ObjectKind::PackageBody => format!("{base}%body"),
            _ => base,
        }
    };

    // Overload grouping: schema is constant per file, so the key is the
    // folded (package segment, name, kind) triple.
    let mut group_sizes: HashMap<(String, String, ObjectKind), u32> = HashMap::new();
    for (i, outline) in outlines.iter().enumerate() {
        let key = (
            packages[i].1.to_lowercase(),
            outline.name.to_lowercase(),
            outline.kind,
        );
        *group_sizes.entry(key).or_default() += 1;
    }

    let mut next_index: HashMap<(String, String, ObjectKind), u32> = HashMap::new();
    let mut ids = Vec::with_capacity(outlines.len());
    let mut overload = Vec::with_capacity(outlines.len());
    for (i, outline) in outlines.iter().enumerate() {
        let key = (
            packages[i].1.to_lowercase(),
            outline.name.to_lowercase(),
            outline.kind,
        );
        let index = {
            let slot = next_index.entry(key).or_default();
            let index = *slot;
            *slot += 1;
            index
        };
        let name_seg = name_segment(outline);
        let segments = [
            class.schema.as_str(),
            packages[i].1.as_str(),
            name_seg.as_str(),
        ];
        let qualified = segments
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(".");
        ids.push(format!("{qualified}#{index}"));
        overload.push(index);
    }

    outlines
        .iter()
        .enumerate()
        .map(|(i, outline)| {
            let key = (
                packages[i].1.to_lowercase(),
                outline.name.to_lowercase(),
                outline.kind,
            );
            CodeObject {
                id: ids[i].clone(),
                kind: outline.kind,
                name: outline.name.clone(),
                schema: class.schema.clone(),
                package: packages[i].0.clone(),
                parent_id: outline.parent.map(|p| ids[p].clone()),
                parameters: Vec::new(),
                return_type: None,
                source_file: source_file.to_owned(),
                lines: outline.lines,
                bytes: outline.bytes,
                calls: Vec::new(),
                overload_index: overload[i],
                overloaded: group_sizes[&key] > 1,
            }
        })
        .collect()
}
