//! Implements call extraction from code object bodies.
//!
//! Tolerant token scanning, by design: an identifier followed by `(` at
//! parenthesis depth 0 is a call candidate, a dotted identifier alone in
//! statement position is a parameterless call, and embedded SQL statements
//! are opaque blobs that are never mined.

use crate::catalog::{ByteSpan, Call};
use crate::cleaner::LiteralMap;
use crate::lexer::{significant_tokens, Token, TokenKind};
use crate::util::SqlIdent;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use std::collections::HashSet;

lazy_static! {
    /// PL/SQL statement words that lex as plain identifiers but can never be
    /// user calls.
    static ref RESERVED_WORDS: HashSet<&'static str> = HashSet::from([
        "null", "exit", "goto", "continue", "raise", "commit", "rollback",
        "savepoint", "open", "close", "fetch", "pipe", "execute", "forall",
        "exception", "pragma", "when", "others", "into", "using", "values",
        "exists", "not", "and",
    ]);
}

/// Configured names whose calls are not recorded (`COUNT`, `SUM`, common
/// builtins). Entries are compared case-folded; `pkg.*` drops everything
/// under that prefix.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl KeywordFilter {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        for entry in entries {
            let entry = entry.as_ref().to_lowercase();
            if let Some(prefix) = entry.strip_suffix(".*") {
                filter.prefixes.push(format!("{prefix}."));
            } else {
                filter.exact.insert(entry);
            }
        }
        filter
    }

    pub fn matches(&self, folded_name: &str) -> bool {
        self.exact.contains(folded_name)
            || self
                .prefixes
                .iter()
                .any(|p| folded_name.starts_with(p.as_str()))
    }
}

/// Result of mining one body slice.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CallExtraction {
    pub calls: Vec<Call>,
    pub warnings: Vec<String>,
}

/// Extracts outbound calls from a body slice of cleaned text.
///
/// `body_start` is the byte offset of `body` within the file; spans and
/// literal restoration work in file coordinates.
pub fn extract_calls(
    body: &str,
    body_start: usize,
    literals: &LiteralMap,
    drop: &KeywordFilter,
) -> CallExtraction {
    let tokens = significant_tokens(body);
    let mut out = CallExtraction::default();
    let mut depth = 0usize;
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i].kind {
            TokenKind::SelectKw
            | TokenKind::InsertKw
            | TokenKind::UpdateKw
            | TokenKind::DeleteKw
            | TokenKind::MergeKw => {
                i = skip_sql_statement(&tokens, i);
            }
            TokenKind::LParen => {
                depth += 1;
                i += 1;
            }
            TokenKind::RParen => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            kind if kind.is_ident() => {
                let statement_position = match i.checked_sub(1).map(|p| tokens[p].kind) {
                    None => false,
                    Some(
                        TokenKind::SemiColon
                        | TokenKind::BeginKw
                        | TokenKind::ThenKw
                        | TokenKind::ElseKw
                        | TokenKind::LoopKw,
                    ) => true,
                    Some(_) => false,
                };

                let (name_start, name_end, next) = dotted_name_range(&tokens, i);
                let callee = &body[name_start..name_end];
                let folded = fold_name(callee);
                let wanted = !RESERVED_WORDS.contains(folded.as_str()) && !drop.matches(&folded);

                match tokens.get(next).map(|t| t.kind) {
                    Some(TokenKind::LParen) if depth == 0 && wanted => {
                        match scan_args(&tokens, next, body, body_start, literals) {
                            Some((positional_args, named_args, after, close_end)) => {
                                out.calls.push(Call {
                                    callee: callee.to_owned(),
                                    positional_args,
                                    named_args,
                                    span: ByteSpan::new(
                                        body_start + name_start,
                                        body_start + close_end,
                                    ),
                                });
                                i = after;
                            }
                            None => {
                                out.warnings
                                    .push(format!("unterminated argument list for `{callee}`"));
                                i = next;
                            }
                        }
                    }
                    Some(TokenKind::SemiColon) if depth == 0 && statement_position && wanted => {
                        out.calls.push(Call {
                            callee: callee.to_owned(),
                            positional_args: Vec::new(),
                            named_args: IndexMap::new(),
                            span: ByteSpan::new(body_start + name_start, body_start + name_end),
                        });
                        i = next;
                    }
                    _ => i = next,
                }
            }
            _ => i += 1,
        }
    }

    out
}

/// Consumes `a.b.c`; returns the byte range of the dotted name and the index
/// of the first token past it.
fn dotted_name_range(tokens: &[Token<'_>], start: usize) -> (usize, usize, usize) {
    let mut end = tokens[start].end();
    let mut i = start + 1;
    while tokens.get(i).map(|t| t.kind) == Some(TokenKind::Dot)
        && tokens.get(i + 1).is_some_and(|t| t.kind.is_ident())
    {
        end = tokens[i + 1].end();
        i += 2;
    }
    (tokens[start].start(), end, i)
}

/// Case-folds a dotted name segment-wise, respecting quoted identifiers.
fn fold_name(name: &str) -> String {
    name.split('.')
        .map(|segment| SqlIdent::from(segment.trim()).folded())
        .collect::<Vec<_>>()
        .join(".")
}

type ScannedArgs = (Vec<String>, IndexMap<String, String>, usize, usize);

/// Scans the argument list starting at the `(` token, splitting on top-level
/// commas and resolving literal placeholders.
fn scan_args(
    tokens: &[Token<'_>],
    open: usize,
    body: &str,
    body_start: usize,
    literals: &LiteralMap,
) -> Option<ScannedArgs> {
    let mut positional = Vec::new();
    let mut named = IndexMap::new();
    let mut depth = 1usize;
    let mut arg_start = open + 1;
    let mut j = open + 1;

    loop {
        let token = tokens.get(j)?;
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth -= 1;
                if depth == 0 {
                    push_arg(
                        tokens,
                        arg_start..j,
                        body,
                        body_start,
                        literals,
                        &mut positional,
                        &mut named,
                    );
                    return Some((positional, named, j + 1, token.end()));
                }
            }
            TokenKind::Comma if depth == 1 => {
                push_arg(
                    tokens,
                    arg_start..j,
                    body,
                    body_start,
                    literals,
                    &mut positional,
                    &mut named,
                );
                arg_start = j + 1;
            }
            _ => {}
        }
        j += 1;
    }
}

fn push_arg(
    tokens: &[Token<'_>],
    range: std::ops::Range<usize>,
    body: &str,
    body_start: usize,
    literals: &LiteralMap,
    positional: &mut Vec<String>,
    named: &mut IndexMap<String, String>,
) {
    if range.is_empty() {
        return;
    }
    let slice_text = |from: usize, to: usize| -> String {
        let start = tokens[from].start();
        let end = tokens[to].end();
        literals
            .restore(body_start + start, &body[start..end])
            .trim()
            .to_owned()
    };

    let is_named = range.len() >= 2
        && tokens[range.start].kind.is_ident()
        && tokens[range.start + 1].kind == TokenKind::Arrow;
    if is_named {
        let name = SqlIdent::from(tokens[range.start].text)
            .as_str()
            .to_owned();
        let value = if range.start + 2 < range.end {
            slice_text(range.start + 2, range.end - 1)
        } else {
            String::new()
        };
        named.insert(name, value);
    } else {
        positional.push(slice_text(range.start, range.end - 1));
    }
}

/// Skips an embedded SQL statement up to `;` (or an unbalanced `)` for
/// parenthesized subqueries); returns the index to resume at.
fn skip_sql_statement(tokens: &[Token<'_>], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start + 1;
    while let Some(token) = tokens.get(i) {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                if depth == 0 {
                    return i;
                }
                depth -= 1;
            }
            TokenKind::SemiColon if depth == 0 => return i + 1,
            _ => {}
        }
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::clean;
    use pretty_assertions::assert_eq;

    fn extract(body: &str) -> CallExtraction {
        extract_with_filter(body, KeywordFilter::default())
    }

    fn extract_with_filter(body: &str, filter: KeywordFilter) -> CallExtraction {
        let cleaned = clean(body).unwrap();
        extract_calls(&cleaned.text, 0, &cleaned.literals, &filter)
    }

    fn callees(extraction: &CallExtraction) -> Vec<&str> {
        extraction.calls.iter().map(|c| c.callee.as_str()).collect()
    }

    #[test]
    fn positional_and_named_arguments() {
        let extraction = extract(
            "BEGIN\n\
             \x20 schema_app_core.employee_pkg.get_employee(p_emp_id => v_id);\n\
             \x20 calculate_tax(v_salary, p_rate => 0.2);\n\
             END;",
        );
        assert_eq!(
            callees(&extraction),
            vec!["schema_app_core.employee_pkg.get_employee", "calculate_tax"]
        );
        let get_employee = &extraction.calls[0];
        assert!(get_employee.positional_args.is_empty());
        assert_eq!(get_employee.named_args.get("p_emp_id").unwrap(), "v_id");

        let calc = &extraction.calls[1];
        assert_eq!(calc.positional_args, vec!["v_salary"]);
        assert_eq!(calc.named_args.get("p_rate").unwrap(), "0.2");
    }

    #[test]
    fn bare_statement_call() {
        let extraction = extract(
            "BEGIN\n\
             \x20 refresh_caches;\n\
             \x20 util_pkg.flush_all;\n\
             \x20 v_x := v_y;\n\
             END;",
        );
        assert_eq!(callees(&extraction), vec!["refresh_caches", "util_pkg.flush_all"]);
        assert!(extraction.calls[0].positional_args.is_empty());
        assert_eq!(extraction.calls[1].span.start, 26);
    }

    #[test]
    fn reserved_statements_are_not_calls() {
        let extraction = extract(
            "BEGIN\n\
             \x20 NULL;\n\
             \x20 EXIT;\n\
             \x20 COMMIT;\n\
             \x20 RAISE value_error;\n\
             END;",
        );
        assert!(extraction.calls.is_empty());
    }

    #[test]
    fn keyword_filter_drops_exact_and_prefix() {
        let filter = KeywordFilter::new(["count", "DBMS_SQL.*"]);
        let extraction = extract_with_filter(
            "BEGIN\n\
             \x20 v := count(x);\n\
             \x20 v_cur := DBMS_SQL.OPEN_CURSOR(1);\n\
             \x20 log_it(v);\n\
             END;",
            filter,
        );
        assert_eq!(callees(&extraction), vec!["log_it"]);
    }

    #[test]
    fn without_filter_builtin_calls_are_kept() {
        let extraction = extract("BEGIN v_cur := DBMS_SQL.OPEN_CURSOR(); END;");
        assert_eq!(callees(&extraction), vec!["DBMS_SQL.OPEN_CURSOR"]);
        assert!(extraction.calls[0].positional_args.is_empty());
    }

    #[test]
    fn nested_calls_are_not_candidates() {
        let extraction = extract("BEGIN outer_call(inner_call(x), y); END;");
        assert_eq!(callees(&extraction), vec!["outer_call"]);
        assert_eq!(
            extraction.calls[0].positional_args,
            vec!["inner_call(x)", "y"]
        );
    }

    #[test]
    fn literal_placeholders_are_restored_in_arguments() {
        let extraction = extract(
            "BEGIN dummy_utl_file_write('inv_' || p_invoice_id || '.txt'); END;",
        );
        assert_eq!(
            extraction.calls[0].positional_args,
            vec!["'inv_' || p_invoice_id || '.txt'"]
        );
    }

    #[test]
    fn embedded_sql_is_not_mined() {
        let extraction = extract(
            "BEGIN\n\
             \x20 SELECT MAX(sal) INTO v_max FROM emp WHERE dept = norm(p_dept);\n\
             \x20 INSERT INTO log_t VALUES (next_id(), 'x');\n\
             \x20 after_sql(v_max);\n\
             END;",
        );
        assert_eq!(callees(&extraction), vec!["after_sql"]);
    }

    #[test]
    fn call_span_covers_name_to_closing_paren() {
        let body = "BEGIN log_it(a, b); END;";
        let cleaned = clean(body).unwrap();
        let extraction = extract_calls(&cleaned.text, 0, &cleaned.literals, &KeywordFilter::default());
        let span = extraction.calls[0].span;
        assert_eq!(&body[span.start..span.end], "log_it(a, b)");
    }

    #[test]
    fn spans_respect_nonzero_body_start() {
        let file = "junk junk BEGIN log_it(a); END;";
        let body_start = 10;
        let cleaned = clean(file).unwrap();
        let extraction = extract_calls(
            &cleaned.text[body_start..],
            body_start,
            &cleaned.literals,
            &KeywordFilter::default(),
        );
        let span = extraction.calls[0].span;
        assert_eq!(&file[span.start..span.end], "log_it(a)");
    }

    #[test]
    fn argument_roundtrip_against_original() {
        let raw = "BEGIN send_mail(p_to => 'a@b.c', p_subject => 'inv ' || v_no, v_cc); END;";
        let cleaned = clean(raw).unwrap();
        let extraction =
            extract_calls(&cleaned.text, 0, &cleaned.literals, &KeywordFilter::default());
        let call = &extraction.calls[0];

        let rebuilt = format!(
            "{}({}, {})",
            call.callee,
            call.named_args
                .iter()
                .map(|(k, v)| format!("{k} => {v}"))
                .collect::<Vec<_>>()
                .join(", "),
            call.positional_args.join(", "),
        );
        assert_eq!(&raw[call.span.start..call.span.end], rebuilt);
    }

    #[test]
    fn empty_argument_list() {
        let extraction = extract("BEGIN tick(); END;");
        assert_eq!(callees(&extraction), vec!["tick"]);
        assert!(extraction.calls[0].positional_args.is_empty());
        assert!(extraction.calls[0].named_args.is_empty());
    }

    #[test]
    fn unterminated_argument_list_warns() {
        let extraction = extract("BEGIN broken(a, b");
        assert!(extraction.calls.is_empty());
        assert_eq!(extraction.warnings.len(), 1);
    }
}
