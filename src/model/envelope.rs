use serde::{Deserialize, Serialize};

use crate::model::query::Query;

/// Uniform list response: the echoed query plus counts and payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(flatten)]
    pub query: Query,
    /// Number of items in `result`
    pub count: usize,
    /// Rows matching the active predicates, ignoring pagination
    pub total: u64,
    pub result: Vec<T>,
}

/// Records produced by a create request, mirroring the request body shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Created<T> {
    Many(Vec<T>),
    One(T),
}
