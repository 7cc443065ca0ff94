use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{CrudError, Result};
use crate::logic::hooks::HookSet;
use crate::model::schema::{value_kind, FieldDescriptor, Row, Schema};

/// Capability a type needs to get a CRUD surface.
///
/// The serde representation must be a JSON object keyed by the logical field
/// names listed in [`Record::fields`]. Marking the struct `#[serde(default)]`
/// lets projected reads (`select`/`omit`) decode rows that lack columns.
pub trait Record: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Storage collection (table) name
    const COLLECTION: &'static str;

    /// Ordered list of addressable fields
    fn fields() -> Vec<FieldDescriptor>;

    /// Register per-operation customization hooks. None by default.
    fn hooks(_hooks: &mut HookSet<Self>) {}
}

/// Serialize any value that must be record-shaped into an object
pub fn to_object<T: Serialize>(value: &T) -> Result<Row> {
    let type_name = std::any::type_name::<T>();
    match serde_json::to_value(value) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(CrudError::Schema {
            type_name,
            message: format!("serializes to {}, expected an object", value_kind(&other)),
        }),
        Err(e) => Err(CrudError::Schema {
            type_name,
            message: e.to_string(),
        }),
    }
}

/// Decode a stored row into a record. Columns missing from the row keep the
/// record's default value.
pub fn decode_row<T: Record>(schema: &Schema, row: &Row) -> Result<T> {
    let mut object = to_object(&T::default())?;
    object.extend(schema.from_row(row));
    serde_json::from_value(Value::Object(object)).map_err(|e| {
        CrudError::Persistence(anyhow::anyhow!(
            "stored row does not decode into {}: {}",
            schema.type_name,
            e
        ))
    })
}

/// Keep only the entries that differ from the zero-valued record.
/// Mutation hooks on update only change the fields they set.
pub fn strip_defaults<T: Record>(object: Row) -> Result<Row> {
    let defaults = to_object(&T::default())?;
    Ok(object
        .into_iter()
        .filter(|(key, value)| defaults.get(key) != Some(value))
        .collect())
}
