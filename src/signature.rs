//! Implements grammar parsing of PROCEDURE/FUNCTION headers.
//!
//! The input is the header slice chosen by the structural parser: everything
//! from the opening keyword up to (excluding) the `IS`/`AS`/`;` terminator.
//!
//! ```text
//! header := (PROCEDURE | FUNCTION) name [ '(' param (',' param)* ')' ] [ RETURN type ]
//! param  := pname [ mode ] type [ DEFAULT expr | ':=' expr ]
//! mode   := IN | OUT | IN OUT
//! ```

use crate::catalog::{ParamMode, Parameter};
use crate::error::SignatureError;
use crate::lexer::{significant_tokens, Token, TokenKind};
use crate::util::SqlIdent;

/// Parsed header of a procedure or function.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Signature {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
}

/// Trailing header attributes that are not part of a type.
const TYPE_TAIL_ATTRIBUTES: &[&str] = &[
    "deterministic",
    "pipelined",
    "parallel_enable",
    "result_cache",
    "authid",
    "definer",
    "current_user",
];

/// Parses a subprogram header slice taken from cleaned text.
///
/// `header_start` is the byte offset of the slice within the file; error
/// offsets are reported in file coordinates.
pub fn parse_signature(header: &str, header_start: usize) -> Result<Signature, SignatureError> {
    Cursor::new(header, header_start).parse()
}

struct Cursor<'a> {
    text: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
    base: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, base: usize) -> Self {
        Self {
            text,
            tokens: significant_tokens(text),
            pos: 0,
            base,
        }
    }

    fn kind(&self) -> TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.kind() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn offset(&self) -> usize {
        self.base
            + self
                .tokens
                .get(self.pos)
                .map(|t| t.start())
                .unwrap_or(self.text.len())
    }

    fn error<M: Into<String>>(&self, reason: M) -> SignatureError {
        SignatureError {
            reason: reason.into(),
            at_byte: self.offset(),
        }
    }

    fn parse(mut self) -> Result<Signature, SignatureError> {
        while matches!(
            self.kind(),
            TokenKind::CreateKw
                | TokenKind::OrKw
                | TokenKind::ReplaceKw
                | TokenKind::Editionable
                | TokenKind::NonEditionable
        ) {
            self.bump();
        }

        let is_function = match self.kind() {
            TokenKind::ProcedureKw => false,
            TokenKind::FunctionKw => true,
            _ => return Err(self.error("expected PROCEDURE or FUNCTION")),
        };
        self.bump();

        let name = self
            .parse_dotted_name()
            .ok_or_else(|| self.error("expected subprogram name"))?;

        let mut parameters = Vec::new();
        if self.eat(TokenKind::LParen) {
            if !self.eat(TokenKind::RParen) {
                loop {
                    parameters.push(self.parse_param()?);
                    if self.eat(TokenKind::Comma) {
                        continue;
                    }
                    if self.eat(TokenKind::RParen) {
                        break;
                    }
                    return Err(self.error("expected `,` or `)` in parameter list"));
                }
            }
        }

        let return_type = if is_function && self.eat(TokenKind::ReturnKw) {
            let text = self.collect_text(&[TokenKind::SemiColon])?;
            if text.is_empty() {
                return Err(self.error("expected return type"));
            }
            Some(strip_tail_attributes(&text))
        } else {
            None
        };

        Ok(Signature {
            name,
            parameters,
            return_type,
        })
    }

    fn parse_dotted_name(&mut self) -> Option<String> {
        if !self.kind().is_ident() {
            return None;
        }
        let mut last = self.tokens[self.pos].text;
        self.bump();
        while self.kind() == TokenKind::Dot
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

    fn parse_param(&mut self) -> Result<Parameter, SignatureError> {
        if !self.kind().is_ident() {
            return Err(self.error("expected parameter name"));
        }
        let name = SqlIdent::from(self.tokens[self.pos].text)
            .as_str()
            .to_owned();
        self.bump();

        let mode = if self.eat(TokenKind::InKw) {
            if self.eat(TokenKind::OutKw) {
                ParamMode::InOut
            } else {
                ParamMode::In
            }
        } else if self.eat(TokenKind::OutKw) {
            ParamMode::Out
        } else {
            ParamMode::In
        };
        self.eat(TokenKind::NocopyKw);

        let type_text = self.collect_text(&[
            TokenKind::Comma,
            TokenKind::RParen,
            TokenKind::DefaultKw,
            TokenKind::Assign,
        ])?;
        if type_text.is_empty() {
            return Err(self.error(format!("expected type for parameter `{name}`")));
        }

        let default_text = if self.eat(TokenKind::DefaultKw) || self.eat(TokenKind::Assign) {
            let text = self.collect_text(&[TokenKind::Comma, TokenKind::RParen])?;
            if text.is_empty() {
                return Err(self.error(format!("expected default value for parameter `{name}`")));
            }
            Some(text)
        } else {
            None
        };

        Ok(Parameter {
            name,
            mode,
            type_text,
            default_text,
        })
    }

    /// Collects raw text up to one of `stops` at parenthesis depth 0,
    /// collapsing whitespace runs. The stop token is not consumed.
    fn collect_text(&mut self, stops: &[TokenKind]) -> Result<String, SignatureError> {
        let first = self.pos;
        let mut depth = 0usize;
        loop {
            let kind = self.kind();
            if kind == TokenKind::Eof {
                break;
            }
            if depth == 0 && stops.contains(&kind) {
                break;
            }
            match kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    // Unbalanced `)` at depth 0 is handled by the caller via
                    // its stop set; here it can only close a group.
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| self.error("unbalanced `)`"))?;
                }
                _ => {}
            }
            self.bump();
        }
        if self.pos == first {
            return Ok(String::new());
        }
        let start = self.tokens[first].start();
        let end = self.tokens[self.pos - 1].end();
        Ok(collapse_whitespace(&self.text[start..end]))
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_tail_attributes(text: &str) -> String {
    let mut words = text.split(' ').collect::<Vec<_>>();
    while let Some(last) = words.last() {
        if words.len() > 1 && TYPE_TAIL_ATTRIBUTES.contains(&last.to_lowercase().as_str()) {
            words.pop();
        } else {
            break;
        }
    }
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(header: &str) -> Signature {
        parse_signature(header, 0).unwrap()
    }

    fn param(sig: &Signature, i: usize) -> &Parameter {
        &sig.parameters[i]
    }

    #[test]
    fn procedure_without_parameters() {
        let sig = parse("PROCEDURE refresh_caches");
        assert_eq!(sig.name, "refresh_caches");
        assert!(sig.parameters.is_empty());
        assert_eq!(sig.return_type, None);
    }

    #[test]
    fn procedure_with_modes_and_default() {
        let sig = parse(
            "PROCEDURE log_error(p_text IN VARCHAR2, p_code IN NUMBER DEFAULT SQLCODE)",
        );
        assert_eq!(sig.name, "log_error");
        assert_eq!(sig.parameters.len(), 2);
        assert_eq!(param(&sig, 0).name, "p_text");
        assert_eq!(param(&sig, 0).mode, ParamMode::In);
        assert_eq!(param(&sig, 0).type_text, "VARCHAR2");
        assert_eq!(param(&sig, 1).default_text.as_deref(), Some("SQLCODE"));
    }

    #[test]
    fn in_out_nocopy_parameter() {
        let sig = parse("PROCEDURE fill(p_buf IN OUT NOCOPY CLOB, p_n OUT NUMBER)");
        assert_eq!(param(&sig, 0).mode, ParamMode::InOut);
        assert_eq!(param(&sig, 0).type_text, "CLOB");
        assert_eq!(param(&sig, 1).mode, ParamMode::Out);
    }

    #[test]
    fn assignment_style_default() {
        let sig = parse("PROCEDURE p(p_limit IN PLS_INTEGER := 100)");
        assert_eq!(param(&sig, 0).default_text.as_deref(), Some("100"));
    }

    #[test]
    fn anchored_and_sized_types() {
        let sig = parse(
            "FUNCTION get_employee(p_emp_id IN employees.employee_id%TYPE, \
             p_name IN VARCHAR2(200)) RETURN employees%ROWTYPE",
        );
        assert_eq!(param(&sig, 0).type_text, "employees.employee_id%TYPE");
        assert_eq!(param(&sig, 1).type_text, "VARCHAR2(200)");
        assert_eq!(sig.return_type.as_deref(), Some("employees%ROWTYPE"));
    }

    #[test]
    fn function_return_strips_trailing_attributes() {
        let sig = parse("FUNCTION day_count(p_from IN DATE) RETURN NUMBER DETERMINISTIC");
        assert_eq!(sig.return_type.as_deref(), Some("NUMBER"));
    }

    #[test]
    fn multi_line_header_collapses_whitespace() {
        let sig = parse(
            "PROCEDURE add_job_history\n    (  p_emp_id          job_history.employee_id%TYPE\n     , p_start_date      job_history.start_date%TYPE\n    )",
        );
        assert_eq!(sig.parameters.len(), 2);
        assert_eq!(param(&sig, 0).name, "p_emp_id");
        assert_eq!(param(&sig, 0).type_text, "job_history.employee_id%TYPE");
    }

    #[test]
    fn create_or_replace_prologue_is_skipped() {
        let sig = parse("CREATE OR REPLACE FUNCTION hr.tax_rate RETURN NUMBER");
        assert_eq!(sig.name, "tax_rate");
        assert_eq!(sig.return_type.as_deref(), Some("NUMBER"));
    }

    #[test]
    fn default_expression_is_depth_aware() {
        let sig = parse("PROCEDURE p(p_ids IN t_ids DEFAULT t_ids(1, 2), p_x IN NUMBER)");
        assert_eq!(
            param(&sig, 0).default_text.as_deref(),
            Some("t_ids(1, 2)")
        );
        assert_eq!(param(&sig, 1).name, "p_x");
    }

    #[test]
    fn quoted_parameter_name() {
        let sig = parse(r#"PROCEDURE p("Weird Name" IN NUMBER)"#);
        assert_eq!(param(&sig, 0).name, "Weird Name");
    }

    #[test]
    fn missing_name_is_an_error() {
        let err = parse_signature("PROCEDURE (p IN NUMBER)", 10).unwrap_err();
        assert_eq!(err.at_byte, 20);
        assert!(err.reason.contains("name"));
    }

    #[test]
    fn missing_type_is_an_error() {
        let err = parse_signature("PROCEDURE p(p_x IN)", 0).unwrap_err();
        assert!(err.reason.contains("p_x"));
    }

    #[test]
    fn garbage_is_an_error() {
        let err = parse_signature("TABLE t(x NUMBER)", 0).unwrap_err();
        assert!(err.reason.contains("expected PROCEDURE or FUNCTION"));
        assert_eq!(err.at_byte, 0);
    }
}
