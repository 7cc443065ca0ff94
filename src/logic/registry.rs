use log::debug;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use crate::error::{CrudError, Result};
use crate::logic::hooks::HookSet;
use crate::model::{Record, Schema};

/// Everything derived from a record type, computed once per type
#[derive(Clone)]
struct Entry {
    schema: Arc<Schema>,
    hooks: Arc<dyn Any + Send + Sync>,
}

/// Process-wide cache keyed by type identity. Populated at most once per
/// type, read concurrently afterwards.
static REGISTRY: LazyLock<RwLock<HashMap<TypeId, Entry>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn entry<T: Record>() -> Result<Entry> {
    let key = TypeId::of::<T>();
    if let Some(entry) = REGISTRY.read().get(&key) {
        return Ok(entry.clone());
    }

    // Built outside the lock: `Record::hooks` is user code and may itself
    // describe other record types.
    let schema = Schema::new(std::any::type_name::<T>(), T::COLLECTION, T::fields())?;
    let mut hooks = HookSet::<T>::new();
    T::hooks(&mut hooks);
    debug!(
        "Registered record type {} ({} fields, {} hooks)",
        schema.type_name,
        schema.fields().len(),
        hooks.len()
    );

    let built = Entry {
        schema: Arc::new(schema),
        hooks: Arc::new(hooks),
    };
    Ok(REGISTRY.write().entry(key).or_insert(built).clone())
}

/// Schema of a record type
pub fn describe<T: Record>() -> Result<Arc<Schema>> {
    Ok(entry::<T>()?.schema)
}

/// Hooks registered by a record type
pub fn hook_set<T: Record>() -> Result<Arc<HookSet<T>>> {
    entry::<T>()?
        .hooks
        .downcast::<HookSet<T>>()
        .map_err(|_| CrudError::Schema {
            type_name: std::any::type_name::<T>(),
            message: "hook registry entry has an unexpected type".to_string(),
        })
}
