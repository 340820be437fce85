//! Token definition for the [`logos`] lexer.
//!
//! One token set serves the structural parser, the signature parser and the
//! call extractor. Only keywords with structural meaning are tokenized;
//! everything else (including most of the PL/SQL reserved set) lexes as a
//! plain identifier and is filtered downstream where it matters.

use std::fmt;

/// Use to tokenize the (cleaned) input text.
#[derive(logos::Logos, Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenKind {
    #[regex("[ \t\n\r\u{c}]+")]
    Whitespace,

    #[token("create", ignore(case))]
    CreateKw,

    #[token("or", priority = 100, ignore(case))]
    OrKw,

    #[token("replace", ignore(case))]
    ReplaceKw,

    #[token("editionable", ignore(case))]
    Editionable,

    #[token("noneditionable", ignore(case))]
    NonEditionable,

    #[token("package", ignore(case))]
    PackageKw,

    #[token("body", ignore(case))]
    BodyKw,

    #[token("procedure", ignore(case))]
    ProcedureKw,

    #[token("function", ignore(case))]
    FunctionKw,

    #[token("trigger", ignore(case))]
    TriggerKw,

    #[token("return", ignore(case))]
    ReturnKw,

    #[token("is", ignore(case))]
    IsKw,

    #[token("as", ignore(case))]
    AsKw,

    #[token("declare", ignore(case))]
    DeclareKw,

    #[token("begin", ignore(case))]
    BeginKw,

    #[token("end", ignore(case))]
    EndKw,

    #[token("if", ignore(case))]
    IfKw,

    #[token("then", ignore(case))]
    ThenKw,

    #[token("elsif", ignore(case))]
    ElsifKw,

    #[token("else", ignore(case))]
    ElseKw,

    #[token("loop", ignore(case))]
    LoopKw,

    #[token("while", ignore(case))]
    WhileKw,

    #[token("for", ignore(case))]
    ForKw,

    #[token("case", ignore(case))]
    CaseKw,

    #[token("in", ignore(case))]
    InKw,

    #[token("out", ignore(case))]
    OutKw,

    #[token("nocopy", ignore(case))]
    NocopyKw,

    #[token("default", ignore(case))]
    DefaultKw,

    #[token("select", ignore(case))]
    SelectKw,

    #[token("insert", ignore(case))]
    InsertKw,

    #[token("update", ignore(case))]
    UpdateKw,

    #[token("delete", ignore(case))]
    DeleteKw,

    #[token("merge", ignore(case))]
    MergeKw,

    #[token("%type", ignore(case))]
    TypeAttrKw,

    #[token("%rowtype", ignore(case))]
    RowtypeAttrKw,

    #[regex(r"-?\d+", priority = 2)]
    Integer,

    // A leading `$` admits conditional-compilation directives ($IF, $END, …)
    // so they cannot collide with the structural IF/END keywords.
    #[regex(r"(?i)\$?[a-z_][a-z0-9_$#]*", priority = 1)]
    Ident,

    #[regex(r#""(?:[^"]|"")+""#)]
    DelimitedIdent,

    // On cleaned text these only appear as blanked-out short literals; the
    // doubled-quote escape is still accepted for raw input in tests.
    #[regex("'(?:[^']|'')*'")]
    QuotedLiteral,

    // Literal placeholders substituted by the cleaner (`§L<i>§`, with the
    // prefix lengthened on collision).
    #[regex("§+L[0-9]+§")]
    Placeholder,

    #[token(".")]
    Dot,

    #[token(",")]
    Comma,

    #[token(";")]
    SemiColon,

    #[token(":=")]
    Assign,

    #[token("=>")]
    Arrow,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("%")]
    Percentage,

    #[token("!")]
    Exclam,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Asterisk,

    #[token("/")]
    Slash,

    #[token(":")]
    Colon,

    #[regex("=|<>|<|>|<=|>=")]
    ComparisonOp,

    #[token("||")]
    DoublePipe,

    #[regex("--[^\n]*")]
    Comment,

    /// Catch-all for bytes the lexer cannot place.
    Error,

    /// Marker token to indicate end of input, not used by lexer directly.
    Eof,
}

impl TokenKind {
    pub fn is_trivia(self) -> bool {
        matches!(self, Self::Whitespace | Self::Comment)
    }

    /// Tokens that may start or continue an identifier path (`a.b.c`).
    pub fn is_ident(self) -> bool {
        matches!(self, Self::Ident | Self::DelimitedIdent)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn check(input: &str, kind: TokenKind) {
        let mut lexer = Lexer::new(input);
        let token = lexer.next().unwrap();
        assert_eq!(token.kind, kind);
        assert_eq!(token.text, input);
    }

    #[test]
    fn lex_spaces_and_newlines() {
        check("  \n", TokenKind::Whitespace);
    }

    #[test]
    fn lex_ident() {
        check("hello", TokenKind::Ident);
    }

    #[test]
    fn lex_keywords_case_insensitively() {
        check("ProCeDuRe", TokenKind::ProcedureKw);
        check("END", TokenKind::EndKw);
        check("%TYPE", TokenKind::TypeAttrKw);
    }

    #[test]
    fn lex_conditional_compilation_as_ident() {
        check("$IF", TokenKind::Ident);
        check("$END", TokenKind::Ident);
    }

    #[test]
    fn lex_named_arg_arrow() {
        check("=>", TokenKind::Arrow);
    }

    #[test]
    fn lex_placeholder() {
        check("§L0§", TokenKind::Placeholder);
        check("§§L17§", TokenKind::Placeholder);
    }

    #[test]
    fn lex_quoted_ident() {
        check(r#""读文👩🏼‍🔬""#, TokenKind::DelimitedIdent);
    }
}
