use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Request information handed to hooks that ask for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub method: String,
    pub path: String,
    /// Caller identity from the `X-User-Id` header, if any
    pub user_id: Option<String>,
    /// Headers with textual values, lowercase names
    pub headers: BTreeMap<String, String>,
    pub received_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method: method.into(),
            path: path.into(),
            user_id: None,
            headers: BTreeMap::new(),
            received_at: Utc::now(),
        }
    }

    /// Context for operations not driven by an HTTP request
    pub fn system() -> Self {
        Self {
            user_id: Some("system".to_string()),
            ..Self::new("INTERNAL", "/")
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
