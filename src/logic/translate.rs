use log::debug;
use std::collections::BTreeMap;

use crate::error::{CrudError, Result};
use crate::model::{is_reserved, FieldDescriptor, FilterPredicate, MatchMode, Query, Schema};

/// Request parameters grouped by name, in a stable order
pub type ParamMap = BTreeMap<String, Vec<String>>;

pub fn group_params(params: &[(String, String)]) -> ParamMap {
    let mut grouped = ParamMap::new();
    for (key, value) in params {
        grouped.entry(key.clone()).or_default().push(value.clone());
    }
    grouped
}

/// Translate request parameters into the structural query and the filter
/// predicates. Reserved names never become predicates; names that resolve
/// to no field are ignored.
pub fn translate(
    params: &[(String, String)],
    schema: &Schema,
    mode: MatchMode,
) -> Result<(Query, Vec<FilterPredicate>)> {
    let grouped = group_params(params);
    let query = bind_query(&grouped)?;

    let mut predicates = Vec::new();
    for (key, values) in &grouped {
        if is_reserved(key) {
            continue;
        }
        let Some(field) = schema.resolve(key) else {
            debug!("Ignoring parameter '{}': not a field of {}", key, schema.type_name);
            continue;
        };
        if let Some(predicate) = predicate_for(field, values, mode)? {
            predicates.push(predicate);
        }
    }

    debug!(
        "Translated {} parameter(s) for {} into {} predicate(s)",
        grouped.len(),
        schema.type_name,
        predicates.len()
    );
    Ok((query, predicates))
}

fn predicate_for(
    field: &FieldDescriptor,
    values: &[String],
    mode: MatchMode,
) -> Result<Option<FilterPredicate>> {
    match (values, mode) {
        ([], _) => Ok(None),
        ([value], MatchMode::Search) => {
            Ok(Some(FilterPredicate::like(&field.column, value.as_str())))
        }
        ([value], MatchMode::Exact) => address_predicate(field, value).map(Some),
        (values, _) => {
            let coerced = values
                .iter()
                .map(|value| coerce(field, value))
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(FilterPredicate::in_list(&field.column, coerced)))
        }
    }
}

fn coerce(field: &FieldDescriptor, raw: &str) -> Result<serde_json::Value> {
    field
        .field_type
        .coerce(raw)
        .map_err(|e| CrudError::bind(format!("parameter '{}': {}", field.name, e)))
}

/// Equality predicate addressing records by one field's value
pub fn address_predicate(field: &FieldDescriptor, raw: &str) -> Result<FilterPredicate> {
    Ok(FilterPredicate::equals(&field.column, coerce(field, raw)?))
}

fn bind_query(grouped: &ParamMap) -> Result<Query> {
    let all = |key: &str| grouped.get(key).cloned().unwrap_or_default();
    let last = |key: &str| grouped.get(key).and_then(|values| values.last()).cloned();

    let query = Query {
        sort: last("sort").filter(|s| !s.trim().is_empty()),
        omit: all("omit"),
        select: all("select"),
        page: parse_int("page", last("page"))?,
        size: parse_int("size", last("size"))?,
    };

    // Stores take the offset as a signed 64-bit value
    if let (Some(page), Some(size)) = (query.page, query.size) {
        if page > 1 && size > 0 && (page - 1).checked_mul(size).is_none() {
            return Err(CrudError::bind(format!(
                "page {} of size {} is out of range",
                page, size
            )));
        }
    }
    Ok(query)
}

fn parse_int(key: &str, raw: Option<String>) -> Result<Option<i64>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<i64>()
            .map(Some)
            .map_err(|_| {
                CrudError::bind(format!("'{}' must be an integer, got '{}'", key, value))
            }),
    }
}
