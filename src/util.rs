//! Implements miscellaneous types and helper.

use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A SQL identifier: compared case-insensitively unless quoted.
#[derive(Clone, Debug, Eq, Serialize)]
pub struct SqlIdent {
    name: String,
    is_quoted: bool,
}

impl SqlIdent {
    pub fn new<S>(name: S, is_quoted: bool) -> Self
    where
        S: Into<String>,
    {
        Self {
            name: name.into(),
            is_quoted,
        }
    }

    /// The identifier as written, quotes stripped.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Comparison form: lowercased for ordinary names, exact spelling for
    /// quoted identifiers. Also used for keyword set lookups.
    pub fn folded(&self) -> String {
        if self.is_quoted {
            self.name.clone()
        } else {
            self.name.to_lowercase()
        }
    }
}

impl From<&str> for SqlIdent {
    fn from(s: &str) -> Self {
        if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
            Self::new(s[1..s.len() - 1].replace("\"\"", "\""), true)
        } else {
            Self::new(s, false)
        }
    }
}

impl fmt::Display for SqlIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let escape = |s: &str| s.replace('\"', "\"\"");

        if self.is_quoted {
            write!(f, "\"{}\"", escape(&self.name))
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl PartialEq for SqlIdent {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_quoted, other.is_quoted) {
            // Quoted identifiers match their exact spelling only.
            (true, true) => self.name == other.name,
            // Unquoted PL/SQL names are folded before comparing.
            (false, false) => self.folded() == other.folded(),
            // A quoted name never equals an unquoted one, even when the
            // spelling agrees.
            _ => false,
        }
    }
}

impl Hash for SqlIdent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Hash what `eq` compares: the quote flag plus the folded form
        // (which is the exact spelling for quoted identifiers).
        self.is_quoted.hash(state);
        self.folded().hash(state);
    }
}
