//! Fixed catalog of named osquery queries.
//!
//! Each template has one typed placeholder. Arguments are rendered as SQLite
//! string literals, never spliced in raw.

use std::fmt;
use std::str::FromStr;

use super::QueryResponse;
use crate::error::{CollectionError, FleetError, Result};
use crate::fleet::Row;

/// Longest argument accepted for a template placeholder.
pub const MAX_ARGUMENT_LEN: usize = 4096;

/// A named query with its SQL and result-shaping rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTemplate {
    /// MD5, SHA-1 and SHA-256 of one file, by path.
    FileHash,
}

/// How collected rows become a [`QueryResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Return the first row; anything else collapses to `not_found`.
    FirstRow { not_found: &'static str },
}

impl QueryTemplate {
    pub const ALL: &'static [QueryTemplate] = &[QueryTemplate::FileHash];

    pub fn name(&self) -> &'static str {
        match self {
            Self::FileHash => "file_hash",
        }
    }

    /// Looks a template up by its exact name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    pub fn shape(&self) -> ResultShape {
        match self {
            Self::FileHash => ResultShape::FirstRow {
                not_found: "file not found or hash cannot be calculated",
            },
        }
    }

    /// Renders the SQL for `arg`.
    pub fn render(&self, arg: &str) -> Result<String> {
        let literal = SqlLiteral::new(arg).map_err(|reason| {
            FleetError::invalid_argument(format!("{} {}", self.name(), reason))
        })?;

        Ok(match self {
            Self::FileHash => {
                format!("SELECT path, md5, sha1, sha256 FROM hash WHERE path = {literal}")
            }
        })
    }

    /// Applies the template's shaping rule to a collection outcome.
    pub fn shape_result(
        &self,
        collected: std::result::Result<Vec<Row>, CollectionError>,
    ) -> QueryResponse {
        match self.shape() {
            ResultShape::FirstRow { not_found } => match collected {
                Ok(rows) => match rows.into_iter().next() {
                    Some(row) => QueryResponse::row(row),
                    None => QueryResponse::failure(not_found),
                },
                Err(_) => QueryResponse::failure(not_found),
            },
        }
    }
}

impl FromStr for QueryTemplate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("Unknown query name: {}", s))
    }
}

impl fmt::Display for QueryTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A value rendered as a single-quoted SQLite string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlLiteral(String);

impl SqlLiteral {
    /// Validates `value`; NUL bytes and oversized values are rejected.
    pub fn new(value: &str) -> std::result::Result<Self, String> {
        if value.contains('\0') {
            return Err("argument contains a NUL byte".to_string());
        }
        if value.len() > MAX_ARGUMENT_LEN {
            return Err(format!(
                "argument is longer than {} bytes",
                MAX_ARGUMENT_LEN
            ));
        }
        Ok(Self(value.to_string()))
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.0.replace('\'', "''"))
    }
}
