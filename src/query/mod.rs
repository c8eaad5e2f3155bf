//! Named queries against a single host.
//!
//! This module holds the template catalog and the [`FleetQuery`] client that
//! runs a template through the Fleet pipeline and shapes the answer.

pub mod executor;
pub mod templates;

pub use executor::FleetQuery;
pub use templates::{QueryTemplate, ResultShape, SqlLiteral};

use serde::Serialize;
use serde_json::Value;

use crate::error::CollectionError;
use crate::fleet::Row;

/// Answer to a query: a success flag and either data or a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub payload: Payload,
}

/// Data or diagnostic carried by a [`QueryResponse`]. Never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Row(Row),
    Rows(Vec<Row>),
    Message(String),
}

impl QueryResponse {
    /// A successful answer holding one row.
    pub fn row(row: Row) -> Self {
        Self {
            success: true,
            payload: Payload::Row(row),
        }
    }

    /// An answer holding all rows; it is only a success when rows are present.
    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            success: !rows.is_empty(),
            payload: Payload::Rows(rows),
        }
    }

    /// A failed answer with a human-readable reason.
    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: Payload::Message(msg.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Returns the diagnostic text of a failed answer.
    pub fn message(&self) -> Option<&str> {
        match &self.payload {
            Payload::Message(msg) => Some(msg),
            _ => None,
        }
    }

    /// Converts into the `(success, payload)` pair.
    pub fn into_pair(self) -> (bool, Value) {
        let payload = serde_json::to_value(&self.payload).unwrap_or(Value::Null);
        (self.success, payload)
    }
}

impl From<Result<Vec<Row>, CollectionError>> for QueryResponse {
    fn from(collected: Result<Vec<Row>, CollectionError>) -> Self {
        match collected {
            Ok(rows) => Self::rows(rows),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}
