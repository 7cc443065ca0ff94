use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{CrudError, Result};
use crate::model::schema::Schema;

/// Parameter names that are never turned into filter predicates
pub const RESERVED_PARAMS: [&str; 8] = [
    "sort", "omit", "select", "page", "size", "count", "total", "result",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_PARAMS.contains(&name)
}

/// Structural part of a list request, echoed back in the envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub omit: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

/// Columns to load for a read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    /// Storage names, in schema order. May be empty.
    Fields(Vec<String>),
}

impl Projection {
    pub fn includes(&self, column: &str) -> bool {
        match self {
            Projection::All => true,
            Projection::Fields(columns) => columns.iter().any(|c| c == column),
        }
    }
}

impl Query {
    /// Effective projection. `select` seeds the set; when `omit` is given
    /// without `select` the set defaults to every field, then `omit` is
    /// removed. Names that resolve to no field are dropped.
    pub fn projection(&self, schema: &Schema) -> Projection {
        let mut selected: HashSet<&str> = self
            .select
            .iter()
            .filter_map(|name| schema.resolve(name))
            .map(|field| field.column.as_str())
            .collect();

        if self.omit.is_empty() {
            if selected.is_empty() {
                return Projection::All;
            }
        } else {
            if selected.is_empty() {
                selected = schema.fields().iter().map(|f| f.column.as_str()).collect();
            }
            for name in &self.omit {
                if let Some(field) = schema.resolve(name) {
                    selected.remove(field.column.as_str());
                }
            }
        }

        Projection::Fields(
            schema
                .fields()
                .iter()
                .filter(|f| selected.contains(f.column.as_str()))
                .map(|f| f.column.clone())
                .collect(),
        )
    }

    /// Row limit; `size <= 0` disables it
    pub fn limit(&self) -> Option<u64> {
        self.size.filter(|size| *size > 0).map(|size| size as u64)
    }

    /// Row offset, only meaningful with a limit. `page <= 1` starts at the top.
    pub fn offset(&self) -> Option<u64> {
        let size = self.limit()?;
        match self.page {
            Some(page) if page > 1 => Some((page as u64 - 1).saturating_mul(size)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

impl SortKey {
    /// Parse a raw `sort` token into validated keys.
    ///
    /// Accepts comma separated terms of the form `field`, `field asc`,
    /// `field desc` or `-field`. Every field must resolve against the schema,
    /// which is what keeps the token out of generated SQL verbatim.
    pub fn parse(token: &str, schema: &Schema) -> Result<Vec<SortKey>> {
        let mut keys = Vec::new();
        for term in token.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (name, direction) = if let Some(name) = term.strip_prefix('-') {
                (name.trim(), SortDirection::Desc)
            } else {
                let mut parts = term.split_whitespace();
                let name = parts.next().unwrap_or_default();
                let direction = match parts.next().map(|d| d.to_ascii_lowercase()) {
                    None => SortDirection::Asc,
                    Some(d) if d == "asc" => SortDirection::Asc,
                    Some(d) if d == "desc" => SortDirection::Desc,
                    Some(d) => {
                        return Err(CrudError::bind(format!("invalid sort direction '{}'", d)))
                    }
                };
                if parts.next().is_some() {
                    return Err(CrudError::bind(format!("invalid sort term '{}'", term)));
                }
                (name, direction)
            };

            let field = schema
                .resolve(name)
                .ok_or_else(|| CrudError::bind(format!("unknown sort field '{}'", name)))?;
            keys.push(SortKey {
                column: field.column.clone(),
                direction,
            });
        }
        Ok(keys)
    }
}
