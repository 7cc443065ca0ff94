use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::{CrudError, Result};

/// A record as a JSON object. Keyed by logical names when it comes from or
/// goes to the wire, by storage names when it is handed to a store.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
    Json,
}

impl FieldType {
    /// Coerce an untyped request string into a value of this type
    pub fn coerce(&self, raw: &str) -> Result<Value, String> {
        match self {
            FieldType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("'{}' is not an integer", raw)),
            FieldType::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("'{}' is not a number", raw)),
            FieldType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("'{}' is not a boolean", raw)),
            },
            FieldType::Timestamp => chrono::DateTime::parse_from_rfc3339(raw.trim())
                .map(|_| Value::String(raw.trim().to_string()))
                .map_err(|_| format!("'{}' is not an RFC 3339 timestamp", raw)),
            FieldType::Text => Ok(Value::String(raw.to_string())),
            FieldType::Json => {
                Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
            }
        }
    }

    /// Coerce a value taken from a JSON body. Strings go through [`FieldType::coerce`].
    pub fn coerce_value(&self, value: &Value) -> Result<Value, String> {
        match (self, value) {
            (_, Value::String(raw)) if *self != FieldType::Text && *self != FieldType::Json => {
                self.coerce(raw)
            }
            (FieldType::Integer, Value::Number(n)) if n.is_i64() => Ok(value.clone()),
            (FieldType::Float, Value::Number(_)) => Ok(value.clone()),
            (FieldType::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (FieldType::Text, Value::String(_)) => Ok(value.clone()),
            (FieldType::Text, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (FieldType::Json, _) => Ok(value.clone()),
            (field_type, other) => Err(format!(
                "{} cannot be used as a {:?} value",
                value_kind(other),
                field_type
            )),
        }
    }

    /// Whether `value` is the zero value for this type. Stores assign
    /// identifiers to rows whose identifier is zero.
    pub fn is_zero(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Number(n) => n.as_f64() == Some(0.0),
            Value::String(s) => s.is_empty(),
            Value::Bool(b) => !b,
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
        }
    }
}

/// Name of a JSON value's kind, for error messages
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One addressable field of a record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    /// Logical name, as the record (de)serializes it
    pub name: String,
    /// Storage name
    pub column: String,
    pub field_type: FieldType,
    pub identifier: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            field_type,
            identifier: false,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn identifier(mut self) -> Self {
        self.identifier = true;
        self
    }
}

/// Field layout of a record type, derived once per type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub type_name: &'static str,
    /// Storage collection (table) name
    pub collection: String,
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    pub fn new(
        type_name: &'static str,
        collection: impl Into<String>,
        fields: Vec<FieldDescriptor>,
    ) -> Result<Self> {
        let invalid = |message: String| CrudError::Schema { type_name, message };

        let mut names = HashSet::new();
        let mut columns = HashSet::new();
        for field in &fields {
            if !names.insert(field.name.as_str()) {
                return Err(invalid(format!("field '{}' is declared twice", field.name)));
            }
            if !columns.insert(field.column.as_str()) {
                return Err(invalid(format!(
                    "storage name '{}' is used by more than one field",
                    field.column
                )));
            }
        }
        if fields.iter().filter(|f| f.identifier).count() > 1 {
            return Err(invalid("more than one identifier field".to_string()));
        }

        Ok(Self {
            type_name,
            collection: collection.into(),
            fields,
        })
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Resolve a field reference by logical name, then by storage name
    pub fn resolve(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.by_column(name))
    }

    pub fn by_column(&self, column: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub fn identifier(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.identifier)
    }

    /// Path segments addressing each field: logical and storage names,
    /// deduplicated when identical.
    pub fn address_paths(&self) -> Vec<String> {
        self.fields
            .iter()
            .flat_map(|f| [f.name.clone(), f.column.clone()])
            .unique()
            .collect()
    }

    /// Re-key an object from field references to storage names.
    /// Keys that resolve to no field are dropped.
    pub fn to_row(&self, object: &Row) -> Row {
        object
            .iter()
            .filter_map(|(key, value)| {
                self.resolve(key)
                    .map(|field| (field.column.clone(), value.clone()))
            })
            .collect()
    }

    /// Re-key a stored row to logical names
    pub fn from_row(&self, row: &Row) -> Row {
        self.fields
            .iter()
            .filter_map(|field| {
                row.get(&field.column)
                    .map(|value| (field.name.clone(), value.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn people() -> Schema {
        Schema::new(
            "Person",
            "people",
            vec![
                FieldDescriptor::new("id", FieldType::Integer).identifier(),
                FieldDescriptor::new("name", FieldType::Text).column("full_name"),
                FieldDescriptor::new("age", FieldType::Integer),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_by_logical_or_storage_name() {
        let schema = people();
        assert_eq!(schema.resolve("name").unwrap().column, "full_name");
        assert_eq!(schema.resolve("full_name").unwrap().name, "name");
        assert!(schema.resolve("nickname").is_none());
        assert_eq!(schema.identifier().unwrap().name, "id");
    }

    #[test]
    fn test_duplicate_storage_names_rejected() {
        let result = Schema::new(
            "Broken",
            "broken",
            vec![
                FieldDescriptor::new("a", FieldType::Text).column("x"),
                FieldDescriptor::new("b", FieldType::Text).column("x"),
            ],
        );
        assert!(matches!(result, Err(CrudError::Schema { .. })));
    }

    #[test]
    fn test_address_paths_deduplicated() {
        assert_eq!(people().address_paths(), vec!["id", "name", "full_name", "age"]);
    }

    #[test]
    fn test_row_rekeying() {
        let schema = people();
        let object = json!({"name": "a", "age": 1, "unknown": true});
        let row = schema.to_row(object.as_object().unwrap());
        assert_eq!(Value::Object(row.clone()), json!({"full_name": "a", "age": 1}));
        assert_eq!(Value::Object(schema.from_row(&row)), json!({"name": "a", "age": 1}));
    }

    #[test]
    fn test_coercion() {
        assert_eq!(FieldType::Integer.coerce("42").unwrap(), json!(42));
        assert!(FieldType::Integer.coerce("forty").is_err());
        assert_eq!(FieldType::Boolean.coerce("TRUE").unwrap(), json!(true));
        assert_eq!(FieldType::Integer.coerce_value(&json!("7")).unwrap(), json!(7));
        assert!(FieldType::Integer.coerce_value(&json!(1.5)).is_err());
        assert_eq!(FieldType::Text.coerce_value(&json!(3)).unwrap(), json!("3"));
        assert!(FieldType::Timestamp.coerce("2024-05-01T10:00:00Z").is_ok());
    }
}
