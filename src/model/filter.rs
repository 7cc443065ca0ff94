use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOp {
    Equals,
    /// Substring match on the value's text form
    Like,
    In,
}

/// How a single-valued parameter becomes a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// List/search endpoints: substring match
    Search,
    /// Identifier-addressed endpoints: equality
    Exact,
}

/// A single filter condition on one storage column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub column: String,
    pub op: FilterOp,
    pub values: Vec<Value>,
}

impl FilterPredicate {
    pub fn equals(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Equals,
            values: vec![value],
        }
    }

    pub fn like(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Like,
            values: vec![Value::String(needle.into())],
        }
    }

    pub fn in_list(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::In,
            values,
        }
    }

    /// The substring of a LIKE predicate
    pub fn needle(&self) -> &str {
        self.values.first().and_then(Value::as_str).unwrap_or_default()
    }
}
