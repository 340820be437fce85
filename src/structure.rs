//! Implements the structural parser: a single pass over the cleaned text
//! that tracks a scope stack and emits the nested span of every declared
//! object.
//!
//! The recognizer is deliberately tolerant. It understands just enough of
//! the statement structure (object openers, `BEGIN`/`END` pairing, the
//! block-only `IF`/`LOOP`/`CASE` scopes and embedded SQL statements) to
//! produce a correct span forest; everything else passes through untouched.

use crate::catalog::{ByteSpan, LineSpan, ObjectKind, ObjectOutline};
use crate::error::StructureError;
use crate::lexer::{significant_tokens, Token, TokenKind};
use crate::util::SqlIdent;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WarningKind {
    EndLabelMismatch,
    UnclosedScope,
}

/// Non-fatal oddity found while pairing scopes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StructureWarning {
    pub kind: WarningKind,
    pub line: usize,
    pub message: String,
}

/// Everything the structural pass knows about one file.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FileStructure {
    /// Outlines in source order of their opening token.
    pub objects: Vec<ObjectOutline>,
    pub warnings: Vec<StructureWarning>,
}

/// Runs the structural pass over cleaned text.
pub fn parse_structure(cleaned: &str) -> Result<FileStructure, StructureError> {
    StructureParser::new(cleaned).run()
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum BlockKind {
    If,
    Loop,
    Case,
    Begin,
}

impl BlockKind {
    fn describe(self) -> &'static str {
        match self {
            Self::If => "IF",
            Self::Loop => "LOOP",
            Self::Case => "CASE",
            Self::Begin => "BEGIN",
        }
    }
}

#[derive(Debug)]
enum Frame {
    Object {
        /// Slot in the emitted outline vector.
        index: usize,
        body_start: Option<usize>,
        in_body: bool,
    },
    Block {
        kind: BlockKind,
        /// For `DECLARE`-opened blocks: whether `BEGIN` was seen yet.
        begun: bool,
    },
}

struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        Self { starts }
    }

    /// 1-based line of a byte offset.
    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset)
    }

    fn line_end(&self, offset: usize) -> usize {
        let line = self.line_of(offset);
        self.starts.get(line).map(|&s| s - 1).unwrap_or(usize::MAX)
    }
}

struct StructureParser<'a> {
    text: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
    lines: LineIndex,
    stack: Vec<Frame>,
    objects: Vec<ObjectOutline>,
    warnings: Vec<StructureWarning>,
}

impl<'a> StructureParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            tokens: significant_tokens(text),
            pos: 0,
            lines: LineIndex::new(text),
            stack: Vec::new(),
            objects: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn current(&self) -> TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn token(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.current() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn run(mut self) -> Result<FileStructure, StructureError> {
        while self.pos < self.tokens.len() {
            match self.current() {
                TokenKind::CreateKw => self.on_create()?,
                TokenKind::ProcedureKw | TokenKind::FunctionKw => {
                    let start = self.tokens[self.pos].start();
                    self.on_subprogram(start)
                }
                TokenKind::DeclareKw => self.on_declare(),
                TokenKind::BeginKw => self.on_begin(),
                TokenKind::IfKw => {
                    self.stack.push(Frame::Block {
                        kind: BlockKind::If,
                        begun: true,
                    });
                    self.bump();
                }
                TokenKind::LoopKw => {
                    self.stack.push(Frame::Block {
                        kind: BlockKind::Loop,
                        begun: true,
                    });
                    self.bump();
                }
                TokenKind::CaseKw => {
                    self.stack.push(Frame::Block {
                        kind: BlockKind::Case,
                        begun: true,
                    });
                    self.bump();
                }
                TokenKind::EndKw => self.on_end()?,
                TokenKind::SelectKw
                | TokenKind::InsertKw
                | TokenKind::UpdateKw
                | TokenKind::DeleteKw
                | TokenKind::MergeKw => self.skip_sql_statement(),
                TokenKind::Slash => {
                    if self.slash_terminates_statement() {
                        let at = self.tokens[self.pos].start();
                        self.close_all_open_scopes(at);
                    }
                    self.bump();
                }
                _ => self.bump(),
            }
        }

        // Missing END or terminating slash: close what is left, with a
        // warning per dangling object scope.
        let end = self.text.len();
        while let Some(frame) = self.stack.pop() {
            if let Frame::Object {
                index, body_start, ..
            } = frame
            {
                self.warnings.push(StructureWarning {
                    kind: WarningKind::UnclosedScope,
                    line: self.objects[index].lines.start,
                    message: format!(
                        "scope of `{}` not closed before end of file",
                        display_name(&self.objects[index])
                    ),
                });
                self.finish_object(index, body_start, end);
            }
        }

        Ok(FileStructure {
            objects: self.objects,
            warnings: self.warnings,
        })
    }

    /// Index of the innermost open object frame.
    fn enclosing_object(&self) -> Option<usize> {
        self.stack.iter().rev().find_map(|f| match f {
            Frame::Object { index, .. } => Some(*index),
            Frame::Block { .. } => None,
        })
    }

    fn push_object(
        &mut self,
        kind: ObjectKind,
        name: String,
        start: usize,
        header_end: usize,
        body_start: Option<usize>,
        in_body: bool,
    ) {
        let parent = self.enclosing_object();
        let index = self.objects.len();
        self.objects.push(ObjectOutline {
            kind,
            name,
            parent,
            lines: LineSpan {
                start: self.lines.line_of(start),
                end: 0,
            },
            bytes: ByteSpan::new(start, 0),
            header_end,
            body: None,
        });
        self.stack.push(Frame::Object {
            index,
            body_start,
            in_body,
        });
    }

    fn finish_object(&mut self, index: usize, body_start: Option<usize>, end: usize) {
        let outline = &mut self.objects[index];
        outline.bytes.end = end;
        outline.lines.end = self.lines.line_of(end.saturating_sub(1));
        outline.body = body_start.map(|s| ByteSpan::new(s, end));
    }

    /// Consumes a possibly dotted identifier; returns the last segment as
    /// written (quotes stripped for delimited identifiers).
    fn parse_name(&mut self) -> Option<String> {
        if !self.current().is_ident() {
            return None;
        }
        let mut last = self.tokens[self.pos].text;
        self.bump();
        while self.current() == TokenKind::Dot
            && self
                .tokens
                .get(self.pos + 1)
                .is_some_and(|t| t.kind.is_ident())
        {
            self.bump();
            last = self.tokens[self.pos].text;
            self.bump();
        }
        Some(SqlIdent::from(last).as_str().to_owned())
    }

    fn on_create(&mut self) -> Result<(), StructureError> {
        let start = self.tokens[self.pos].start();
        self.bump();
        if self.eat(TokenKind::OrKw) {
            self.eat(TokenKind::ReplaceKw);
        }
        while matches!(
            self.current(),
            TokenKind::Editionable | TokenKind::NonEditionable
        ) {
            self.bump();
        }

        match self.current() {
            TokenKind::PackageKw => {
                self.bump();
                let kind = if self.eat(TokenKind::BodyKw) {
                    ObjectKind::PackageBody
                } else {
                    ObjectKind::PackageSpec
                };
                let name = self.parse_name().unwrap_or_default();
                while !matches!(
                    self.current(),
                    TokenKind::IsKw | TokenKind::AsKw | TokenKind::Eof
                ) {
                    self.bump();
                }
                let (header_end, body_start) = match self.token() {
                    Some(tok) => {
                        let ends = (tok.start(), tok.end());
                        self.bump();
                        ends
                    }
                    None => (self.text.len(), self.text.len()),
                };
                self.push_object(kind, name, start, header_end, Some(body_start), false);
                Ok(())
            }
            TokenKind::ProcedureKw | TokenKind::FunctionKw => {
                self.on_subprogram(start);
                Ok(())
            }
            TokenKind::TriggerKw => {
                self.on_trigger(start);
                Ok(())
            }
            // CREATE TABLE / VIEW / TYPE / …: opaque, skip the statement.
            _ => {
                self.skip_plain_statement();
                Ok(())
            }
        }
    }

    /// Handles `PROCEDURE`/`FUNCTION` at statement level, scanning the
    /// header until the first `IS`, `AS` or `;` at parenthesis depth 0.
    fn on_subprogram(&mut self, start: usize) {
        let kind = if self.current() == TokenKind::ProcedureKw {
            ObjectKind::Procedure
        } else {
            ObjectKind::Function
        };
        self.bump();
        let name = self.parse_name().unwrap_or_default();

        let mut depth = 0usize;
        loop {
            match self.current() {
                TokenKind::LParen => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::RParen => {
                    depth = depth.saturating_sub(1);
                    self.bump();
                }
                TokenKind::IsKw | TokenKind::AsKw if depth == 0 => {
                    let tok = self.tokens[self.pos];
                    self.bump();
                    self.push_object(kind, name, start, tok.start(), Some(tok.end()), false);
                    return;
                }
                TokenKind::SemiColon if depth == 0 => {
                    let semi = self.tokens[self.pos];
                    self.bump();
                    // Inside a package spec this is a declared subprogram;
                    // anywhere else it is a forward declaration.
                    if let Some(parent) = self.enclosing_object() {
                        if self.objects[parent].kind == ObjectKind::PackageSpec {
                            self.objects.push(ObjectOutline {
                                kind,
                                name,
                                parent: Some(parent),
                                lines: LineSpan {
                                    start: self.lines.line_of(start),
                                    end: self.lines.line_of(semi.end().saturating_sub(1)),
                                },
                                bytes: ByteSpan::new(start, semi.end()),
                                header_end: semi.start(),
                                body: None,
                            });
                        }
                    }
                    return;
                }
                TokenKind::Eof => return,
                _ => self.bump(),
            }
        }
    }

    /// `CREATE TRIGGER`: everything up to the first `DECLARE`/`BEGIN` at
    /// parenthesis depth 0 is header.
    fn on_trigger(&mut self, start: usize) {
        self.bump();
        let name = self.parse_name().unwrap_or_default();

        let mut depth = 0usize;
        loop {
            match self.current() {
                TokenKind::LParen => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::RParen => {
                    depth = depth.saturating_sub(1);
                    self.bump();
                }
                TokenKind::DeclareKw | TokenKind::BeginKw if depth == 0 => {
                    let header_end = self.tokens[self.pos].start();
                    self.push_object(ObjectKind::Trigger, name, start, header_end, None, false);
                    return;
                }
                TokenKind::SemiColon if depth == 0 => {
                    // Body-less trigger (e.g. CALL form); record it closed.
                    let semi_end = self.tokens[self.pos].end();
                    self.bump();
                    let parent = self.enclosing_object();
                    self.objects.push(ObjectOutline {
                        kind: ObjectKind::Trigger,
                        name,
                        parent,
                        lines: LineSpan {
                            start: self.lines.line_of(start),
                            end: self.lines.line_of(semi_end.saturating_sub(1)),
                        },
                        bytes: ByteSpan::new(start, semi_end),
                        header_end: semi_end,
                        body: None,
                    });
                    return;
                }
                TokenKind::Eof => return,
                _ => self.bump(),
            }
        }
    }

    fn on_declare(&mut self) {
        let at = self.tokens[self.pos].start();
        match self.stack.last_mut() {
            Some(Frame::Object {
                index,
                body_start,
                in_body: false,
            }) if self.objects[*index].kind == ObjectKind::Trigger && body_start.is_none() => {
                *body_start = Some(at);
                self.bump();
            }
            None => {
                self.push_object(
                    ObjectKind::AnonymousBlock,
                    String::new(),
                    at,
                    at,
                    Some(at),
                    false,
                );
                self.bump();
            }
            Some(_) => {
                self.stack.push(Frame::Block {
                    kind: BlockKind::Begin,
                    begun: false,
                });
                self.bump();
            }
        }
    }

    fn on_begin(&mut self) {
        let at = self.tokens[self.pos].start();
        match self.stack.last_mut() {
            Some(Frame::Object {
                body_start,
                in_body,
                ..
            }) if !*in_body => {
                *in_body = true;
                if body_start.is_none() {
                    *body_start = Some(at);
                }
                self.bump();
            }
            Some(Frame::Block { begun, .. }) if !*begun => {
                *begun = true;
                self.bump();
            }
            None => {
                self.push_object(
                    ObjectKind::AnonymousBlock,
                    String::new(),
                    at,
                    at,
                    Some(at),
                    true,
                );
                self.bump();
            }
            Some(_) => {
                self.stack.push(Frame::Block {
                    kind: BlockKind::Begin,
                    begun: true,
                });
                self.bump();
            }
        }
    }

    fn on_end(&mut self) -> Result<(), StructureError> {
        let end_tok = self.tokens[self.pos];
        let line = self.lines.line_of(end_tok.start());
        self.bump();

        match self.current() {
            TokenKind::IfKw => {
                self.bump();
                let end = self.consume_scope_tail(end_tok.end());
                self.pop_block(BlockKind::If, line, end)
            }
            TokenKind::LoopKw => {
                self.bump();
                let end = self.consume_scope_tail(end_tok.end());
                self.pop_block(BlockKind::Loop, line, end)
            }
            TokenKind::CaseKw => {
                self.bump();
                let end = self.consume_scope_tail(end_tok.end());
                self.pop_block(BlockKind::Case, line, end)
            }
            kind if kind.is_ident() => {
                let label = self.parse_name().unwrap_or_default();
                let end = self.consume_scope_tail(end_tok.end());
                match self.stack.pop() {
                    Some(Frame::Object {
                        index, body_start, ..
                    }) => {
                        let declared = &self.objects[index].name;
                        if !declared.is_empty()
                            && SqlIdent::from(label.as_str()) != SqlIdent::from(declared.as_str())
                        {
                            self.warnings.push(StructureWarning {
                                kind: WarningKind::EndLabelMismatch,
                                line,
                                message: format!(
                                    "`END {label}` closes `{declared}` declared on line {}",
                                    self.objects[index].lines.start
                                ),
                            });
                        }
                        self.finish_object(index, body_start, end);
                        Ok(())
                    }
                    Some(Frame::Block { kind, .. }) => Err(StructureError::MismatchedEnd {
                        line,
                        label,
                        kind: kind.describe(),
                    }),
                    None => Err(StructureError::StrayEnd { line }),
                }
            }
            _ => {
                // Bare `END` (`END;`, or the terminator of a CASE
                // expression).
                let end = self.consume_scope_tail(end_tok.end());
                match self.stack.pop() {
                    Some(Frame::Object {
                        index, body_start, ..
                    }) => {
                        self.finish_object(index, body_start, end);
                        Ok(())
                    }
                    Some(Frame::Block {
                        kind: BlockKind::Begin | BlockKind::Case,
                        ..
                    }) => Ok(()),
                    Some(Frame::Block { kind, .. }) => Err(StructureError::MismatchedEnd {
                        line,
                        label: String::new(),
                        kind: kind.describe(),
                    }),
                    None => Err(StructureError::StrayEnd { line }),
                }
            }
        }
    }

    /// Consumes an optional trailing `;` and returns the byte offset the
    /// closed scope ends at.
    fn consume_scope_tail(&mut self, fallback: usize) -> usize {
        let mut end = self
            .pos
            .checked_sub(1)
            .and_then(|p| self.tokens.get(p))
            .map(|t| t.end())
            .unwrap_or(fallback);
        if self.current() == TokenKind::SemiColon {
            end = self.tokens[self.pos].end();
            self.bump();
        }
        end
    }

    fn pop_block(
        &mut self,
        expected: BlockKind,
        line: usize,
        _end: usize,
    ) -> Result<(), StructureError> {
        match self.stack.pop() {
            Some(Frame::Block { kind, .. }) if kind == expected => Ok(()),
            Some(Frame::Block { kind, .. }) => Err(StructureError::MismatchedEnd {
                line,
                label: expected.describe().to_owned(),
                kind: kind.describe(),
            }),
            Some(frame @ Frame::Object { .. }) => {
                // `END IF` cannot close an object scope.
                self.stack.push(frame);
                Err(StructureError::MismatchedEnd {
                    line,
                    label: expected.describe().to_owned(),
                    kind: "object",
                })
            }
            None => Err(StructureError::StrayEnd { line }),
        }
    }

    /// Skips an embedded SQL statement: everything up to `;` (or an
    /// unbalanced `)`, for subqueries living inside parentheses).
    fn skip_sql_statement(&mut self) {
        self.bump();
        let mut depth = 0usize;
        loop {
            match self.current() {
                TokenKind::LParen => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::RParen => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    self.bump();
                }
                TokenKind::SemiColon if depth == 0 => {
                    self.bump();
                    return;
                }
                TokenKind::Eof => return,
                _ => self.bump(),
            }
        }
    }

    /// Skips a non-object `CREATE …` statement up to its `;`.
    fn skip_plain_statement(&mut self) {
        while !matches!(self.current(), TokenKind::SemiColon | TokenKind::Eof) {
            self.bump();
        }
        self.eat(TokenKind::SemiColon);
    }

    /// A `/` alone at column 0 terminates the top-level statement.
    fn slash_terminates_statement(&self) -> bool {
        let tok = match self.token() {
            Some(t) => t,
            None => return false,
        };
        let start = tok.start();
        let at_column_0 = start == 0 || self.text.as_bytes()[start - 1] == b'\n';
        if !at_column_0 {
            return false;
        }
        let line_end = self.lines.line_end(start).min(self.text.len());
        self.text[start + 1..line_end].trim().is_empty()
    }

    fn close_all_open_scopes(&mut self, at: usize) {
        while let Some(frame) = self.stack.pop() {
            if let Frame::Object {
                index, body_start, ..
            } = frame
            {
                self.finish_object(index, body_start, at);
            }
        }
    }
}

fn display_name(outline: &ObjectOutline) -> String {
    if outline.name.is_empty() {
        format!("anonymous {}", outline.kind)
    } else {
        outline.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::clean;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> FileStructure {
        let cleaned = clean(input).unwrap();
        parse_structure(&cleaned.text).unwrap()
    }

    fn kinds_and_names(structure: &FileStructure) -> Vec<(ObjectKind, String)> {
        structure
            .objects
            .iter()
            .map(|o| (o.kind, o.name.clone()))
            .collect()
    }

    #[test]
    fn package_spec_with_declarations() {
        let structure = parse(
            "CREATE OR REPLACE PACKAGE logger_pkg AS\n\
             \x20   PROCEDURE log_message(p_text IN VARCHAR2);\n\
             \x20   PROCEDURE log_error(p_text IN VARCHAR2, p_code IN NUMBER DEFAULT SQLCODE);\n\
             END logger_pkg;\n\
             /\n",
        );

        assert_eq!(
            kinds_and_names(&structure),
            vec![
                (ObjectKind::PackageSpec, "logger_pkg".to_owned()),
                (ObjectKind::Procedure, "log_message".to_owned()),
                (ObjectKind::Procedure, "log_error".to_owned()),
            ]
        );
        assert_eq!(structure.objects[1].parent, Some(0));
        assert_eq!(structure.objects[2].parent, Some(0));
        assert!(structure.objects[1].body.is_none());
        assert!(structure.warnings.is_empty());
    }

    #[test]
    fn package_body_with_nested_procedures() {
        let structure = parse(
            "CREATE OR REPLACE PACKAGE BODY logger_pkg AS\n\
             \x20 PROCEDURE log_message(p_text IN VARCHAR2) IS\n\
             \x20 BEGIN\n\
             \x20   NULL;\n\
             \x20 END log_message;\n\
             \x20 FUNCTION level_name RETURN VARCHAR2 IS\n\
             \x20 BEGIN\n\
             \x20   RETURN 'x';\n\
             \x20 END level_name;\n\
             END logger_pkg;\n\
             /\n",
        );

        assert_eq!(
            kinds_and_names(&structure),
            vec![
                (ObjectKind::PackageBody, "logger_pkg".to_owned()),
                (ObjectKind::Procedure, "log_message".to_owned()),
                (ObjectKind::Function, "level_name".to_owned()),
            ]
        );
        let pkg = structure.objects[0].bytes;
        assert!(pkg.contains(structure.objects[1].bytes));
        assert!(pkg.contains(structure.objects[2].bytes));
        assert!(!structure.objects[1].bytes.overlaps(structure.objects[2].bytes));
        assert!(structure.objects[1].body.is_some());
    }

    #[test]
    fn forward_declaration_in_body_is_not_an_object() {
        let structure = parse(
            "CREATE PACKAGE BODY p AS\n\
             \x20 PROCEDURE helper;\n\
             \x20 PROCEDURE helper IS\n\
             \x20 BEGIN\n\
             \x20   NULL;\n\
             \x20 END;\n\
             END p;\n",
        );

        assert_eq!(
            kinds_and_names(&structure),
            vec![
                (ObjectKind::PackageBody, "p".to_owned()),
                (ObjectKind::Procedure, "helper".to_owned()),
            ]
        );
    }

    #[test]
    fn control_blocks_balance_without_emitting_objects() {
        let structure = parse(
            "CREATE PROCEDURE busy IS\n\
             BEGIN\n\
             \x20 IF x > 1 THEN\n\
             \x20   FOR i IN 1..10 LOOP\n\
             \x20     CASE i WHEN 1 THEN NULL; ELSE NULL; END CASE;\n\
             \x20   END LOOP;\n\
             \x20 END IF;\n\
             \x20 WHILE TRUE LOOP\n\
             \x20   EXIT;\n\
             \x20 END LOOP;\n\
             END busy;\n",
        );

        assert_eq!(
            kinds_and_names(&structure),
            vec![(ObjectKind::Procedure, "busy".to_owned())]
        );
        assert!(structure.warnings.is_empty());
    }

    #[test]
    fn case_expression_ends_with_bare_end() {
        let structure = parse(
            "CREATE PROCEDURE pick IS\n\
             BEGIN\n\
             \x20 v := CASE WHEN a THEN 1 ELSE 2 END;\n\
             END pick;\n",
        );
        assert_eq!(structure.objects.len(), 1);
        assert!(structure.warnings.is_empty());
    }

    #[test]
    fn nested_anonymous_block_in_body() {
        let structure = parse(
            "CREATE PROCEDURE outer_p IS\n\
             BEGIN\n\
             \x20 DECLARE\n\
             \x20   v NUMBER;\n\
             \x20 BEGIN\n\
             \x20   NULL;\n\
             \x20 END;\n\
             END outer_p;\n",
        );
        assert_eq!(
            kinds_and_names(&structure),
            vec![(ObjectKind::Procedure, "outer_p".to_owned())]
        );
    }

    #[test]
    fn top_level_anonymous_block() {
        let structure = parse(
            "DECLARE\n\
             \x20 v NUMBER := 0;\n\
             BEGIN\n\
             \x20 v := 1;\n\
             END;\n\
             /\n",
        );
        assert_eq!(
            kinds_and_names(&structure),
            vec![(ObjectKind::AnonymousBlock, String::new())]
        );
    }

    #[test]
    fn two_packages_in_one_file() {
        let structure = parse(
            "CREATE PACKAGE BODY a_pkg AS\n\
             END a_pkg;\n\
             /\n\
             CREATE PACKAGE BODY b_pkg AS\n\
             END b_pkg;\n\
             /\n",
        );
        assert_eq!(
            kinds_and_names(&structure),
            vec![
                (ObjectKind::PackageBody, "a_pkg".to_owned()),
                (ObjectKind::PackageBody, "b_pkg".to_owned()),
            ]
        );
        assert_eq!(structure.objects[0].parent, None);
        assert_eq!(structure.objects[1].parent, None);
    }

    #[test]
    fn slash_closes_dangling_scopes() {
        let structure = parse(
            "CREATE PACKAGE BODY p AS\n\
             \x20 PROCEDURE q IS\n\
             \x20 BEGIN\n\
             \x20   NULL;\n\
             /\n\
             CREATE PACKAGE BODY r AS\n\
             END r;\n",
        );
        assert_eq!(
            kinds_and_names(&structure),
            vec![
                (ObjectKind::PackageBody, "p".to_owned()),
                (ObjectKind::Procedure, "q".to_owned()),
                (ObjectKind::PackageBody, "r".to_owned()),
            ]
        );
        // Both scopes end at the slash.
        assert_eq!(structure.objects[0].bytes.end, structure.objects[1].bytes.end);
    }

    #[test]
    fn end_label_mismatch_is_tolerated_with_warning() {
        let structure = parse(
            "CREATE PROCEDURE right_name IS\n\
             BEGIN\n\
             \x20 NULL;\n\
             END wrong_name;\n",
        );
        assert_eq!(structure.objects.len(), 1);
        assert_eq!(structure.warnings.len(), 1);
        assert!(structure.warnings[0].message.contains("wrong_name"));
    }

    #[test]
    fn labelled_end_over_block_frame_is_fatal() {
        let cleaned = clean(
            "CREATE PROCEDURE p IS\n\
             BEGIN\n\
             \x20 IF a THEN\n\
             \x20 END p;\n\
             END p;\n",
        )
        .unwrap();
        let err = parse_structure(&cleaned.text).unwrap_err();
        assert_eq!(
            err,
            StructureError::MismatchedEnd {
                line: 4,
                label: "p".to_owned(),
                kind: "IF",
            }
        );
    }

    #[test]
    fn end_if_over_loop_frame_is_fatal() {
        let cleaned = clean(
            "BEGIN\n\
             \x20 LOOP\n\
             \x20 END IF;\n\
             END;\n",
        )
        .unwrap();
        let err = parse_structure(&cleaned.text).unwrap_err();
        assert!(matches!(err, StructureError::MismatchedEnd { line: 3, .. }));
    }

    #[test]
    fn multi_line_header_terminates_at_depth_zero() {
        let structure = parse(
            "CREATE PROCEDURE spread\n\
             \x20 ( p_a IN NUMBER,\n\
             \x20   p_b IN VARCHAR2 DEFAULT 'x,y (z'\n\
             \x20 )\n\
             IS\n\
             BEGIN\n\
             \x20 NULL;\n\
             END spread;\n",
        );
        assert_eq!(structure.objects.len(), 1);
        let outline = &structure.objects[0];
        // Header runs up to the IS on its own line.
        let header_line_start = outline.header_end;
        assert_eq!(structure.objects[0].lines.start, 1);
        assert!(header_line_start > 0);
        assert!(outline.body.is_some());
    }

    #[test]
    fn embedded_sql_is_opaque() {
        let structure = parse(
            "CREATE PROCEDURE q IS\n\
             \x20 CURSOR c IS SELECT CASE WHEN x THEN 1 ELSE 2 END FROM t;\n\
             BEGIN\n\
             \x20 FOR r IN (SELECT id FROM emp) LOOP\n\
             \x20   NULL;\n\
             \x20 END LOOP;\n\
             \x20 UPDATE emp SET sal = sal + 1 WHERE id = 1;\n\
             END q;\n",
        );
        assert_eq!(
            kinds_and_names(&structure),
            vec![(ObjectKind::Procedure, "q".to_owned())]
        );
        assert!(structure.warnings.is_empty());
    }

    #[test]
    fn trigger_scope_is_recognized() {
        let structure = parse(
            "CREATE OR REPLACE TRIGGER emp_audit\n\
             AFTER UPDATE ON employees\n\
             FOR EACH ROW\n\
             DECLARE\n\
             \x20 v NUMBER;\n\
             BEGIN\n\
             \x20 log_change(:new.id);\n\
             END emp_audit;\n\
             /\n",
        );
        assert_eq!(
            kinds_and_names(&structure),
            vec![(ObjectKind::Trigger, "emp_audit".to_owned())]
        );
        assert!(structure.objects[0].body.is_some());
    }

    #[test]
    fn unclosed_scope_at_eof_warns() {
        let structure = parse(
            "CREATE PACKAGE BODY p AS\n\
             \x20 PROCEDURE q IS\n\
             \x20 BEGIN\n\
             \x20   NULL;\n",
        );
        assert_eq!(structure.objects.len(), 2);
        assert_eq!(structure.warnings.len(), 2);
        assert!(structure.objects.iter().all(|o| o.bytes.end > 0));
    }

    #[test]
    fn conditional_compilation_is_inert() {
        let structure = parse(
            "CREATE PROCEDURE cc IS\n\
             BEGIN\n\
             $IF DBMS_DB_VERSION.VER_LE_11 $THEN\n\
             \x20 NULL;\n\
             $END\n\
             \x20 NULL;\n\
             END cc;\n",
        );
        assert_eq!(structure.objects.len(), 1);
        assert!(structure.warnings.is_empty());
    }

    #[test]
    fn spans_form_a_forest() {
        let structure = parse(
            "CREATE PACKAGE BODY p AS\n\
             \x20 PROCEDURE a IS\n\
             \x20   FUNCTION inner_f RETURN NUMBER IS\n\
             \x20   BEGIN\n\
             \x20     RETURN 1;\n\
             \x20   END inner_f;\n\
             \x20 BEGIN\n\
             \x20   NULL;\n\
             \x20 END a;\n\
             \x20 PROCEDURE b IS\n\
             \x20 BEGIN\n\
             \x20   NULL;\n\
             \x20 END b;\n\
             END p;\n",
        );
        let spans = structure
            .objects
            .iter()
            .map(|o| o.bytes)
            .collect::<Vec<_>>();
        for (i, a) in spans.iter().enumerate() {
            for b in spans.iter().skip(i + 1) {
                assert!(
                    a.contains(*b) || b.contains(*a) || !a.overlaps(*b),
                    "{a:?} vs {b:?}"
                );
            }
        }
        // inner_f is a child of a, which is a child of p.
        assert_eq!(structure.objects[2].parent, Some(1));
        assert_eq!(structure.objects[1].parent, Some(0));
        assert_eq!(structure.objects[3].parent, Some(0));
    }
}
