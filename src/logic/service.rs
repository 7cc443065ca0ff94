use log::debug;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{CrudError, Result};
use crate::logic::batch::{run_batch, WriteOp};
use crate::logic::envelope;
use crate::logic::hooks::{
    self, decode_elements, invoke_element, payload_elements, peek_is_array, Operation,
};
use crate::logic::registry::describe;
use crate::logic::translate::{address_predicate, translate};
use crate::model::{
    decode_row, Created, Envelope, FieldDescriptor, FilterPredicate, MatchMode, Record,
    RequestContext, Row, Schema,
};
use crate::store::traits::{FindSpec, Store};

/// The generic CRUD surface of one record type over one store
pub struct CrudService<T, S: ?Sized> {
    store: Arc<S>,
    schema: Arc<Schema>,
    _record: PhantomData<fn() -> T>,
}

impl<T, S: ?Sized> Clone for CrudService<T, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            schema: Arc::clone(&self.schema),
            _record: PhantomData,
        }
    }
}

impl<T: Record, S: Store + ?Sized> CrudService<T, S> {
    pub fn new(store: Arc<S>) -> Result<Self> {
        Ok(Self {
            store,
            schema: describe::<T>()?,
            _record: PhantomData,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn field(&self, name: &str) -> Result<&FieldDescriptor> {
        self.schema.resolve(name).ok_or_else(|| {
            CrudError::resolution(format!("{} has no field '{}'", self.schema.type_name, name))
        })
    }

    /// Changes to persist, keyed by storage name and coerced to each
    /// field's type. Neither the addressing field nor the identifier is
    /// ever updated.
    fn changes(&self, object: &Row, address: &FieldDescriptor) -> Result<Row> {
        let mut changes = Row::new();
        for (key, value) in object {
            let Some(field) = self.schema.resolve(key) else {
                continue;
            };
            if field.column == address.column || field.identifier {
                continue;
            }
            let value = field
                .field_type
                .coerce_value(value)
                .map_err(|e| CrudError::bind(format!("field '{}': {}", field.name, e)))?;
            changes.insert(field.column.clone(), value);
        }
        Ok(changes)
    }

    fn decode_all(&self, rows: &[Row]) -> Result<Vec<T>> {
        rows.iter().map(|row| decode_row(&self.schema, row)).collect()
    }

    /// First record whose `field` equals `value`. No match is not an error.
    pub async fn read_one(&self, field: &str, value: &str) -> Result<Option<T>> {
        let field = self.field(field)?;
        let spec = FindSpec {
            predicates: vec![address_predicate(field, value)?],
            limit: Some(1),
            ..Default::default()
        };
        let rows = self.store.find(&self.schema, &spec).await?;
        rows.first()
            .map(|row| decode_row(&self.schema, row))
            .transpose()
    }

    /// Filtered, projected, sorted and paginated list. `total` counts every
    /// row matching the filters, before pagination.
    pub async fn list(&self, params: &[(String, String)]) -> Result<Envelope<T>> {
        let (query, predicates) = translate(params, &self.schema, MatchMode::Search)?;
        let spec = FindSpec {
            projection: query.projection(&self.schema),
            sort: query.sort.clone(),
            limit: query.limit(),
            offset: query.offset(),
            predicates,
        };

        let total = self.store.count(&self.schema, &spec.predicates).await?;
        let rows = self.store.find(&self.schema, &spec).await?;
        let items = self.decode_all(&rows)?;
        Ok(envelope::build(query, items, total))
    }

    /// Create one record from an object body, or many from an array body
    pub async fn create(&self, ctx: &RequestContext, body: &[u8]) -> Result<Created<T>> {
        let batch = peek_is_array(body);
        let binding = hooks::bind::<T>(Operation::Create)?;
        let elements = payload_elements(binding.as_ref(), body, batch)?;
        debug!(
            "Creating {} {} record(s)",
            elements.len(),
            self.schema.type_name
        );

        let schema = &self.schema;
        let ops = elements.into_iter().map(|element| {
            invoke_element(binding.as_ref(), Operation::Create, ctx, element)
                .map(|object| WriteOp::Insert(schema.to_row(&object)))
        });
        let outcome = run_batch(&*self.store, schema, ops).await?;

        let mut records = self.decode_all(&outcome.inserted)?;
        if batch {
            Ok(Created::Many(records))
        } else {
            records.pop().map(Created::One).ok_or_else(|| {
                CrudError::Persistence(anyhow::anyhow!("insert returned no row"))
            })
        }
    }

    /// Update the records whose `field` equals `value`
    pub async fn update_one(
        &self,
        ctx: &RequestContext,
        field: &str,
        value: &str,
        body: &[u8],
    ) -> Result<u64> {
        let field = self.field(field)?;
        let address = address_predicate(field, value)?;
        let binding = hooks::bind::<T>(Operation::Update)?;
        let element = payload_elements(binding.as_ref(), body, false)?
            .into_iter()
            .next()
            .unwrap_or(Value::Null);

        let object = invoke_element(binding.as_ref(), Operation::Update, ctx, element)?;
        let op = WriteOp::Update {
            predicates: vec![address],
            changes: self.changes(&object, field)?,
        };
        Ok(run_batch(&*self.store, &self.schema, [Ok(op)]).await?.affected)
    }

    /// Update many records from an array body. Each element addresses its
    /// records by the value it carries for `field`.
    pub async fn update_many(
        &self,
        ctx: &RequestContext,
        field: &str,
        body: &[u8],
    ) -> Result<u64> {
        let field = self.field(field)?;
        let binding = hooks::bind::<T>(Operation::Update)?;
        let addressed = decode_elements(body, true)?
            .into_iter()
            .enumerate()
            .map(|(index, element)| {
                Ok((element_address(field, &element, index)?, element))
            })
            .collect::<Result<Vec<_>>>()?;

        let ops = addressed.into_iter().map(|(address, element)| -> Result<WriteOp> {
            let object = invoke_element(binding.as_ref(), Operation::Update, ctx, element)?;
            Ok(WriteOp::Update {
                predicates: vec![address],
                changes: self.changes(&object, field)?,
            })
        });
        Ok(run_batch(&*self.store, &self.schema, ops).await?.affected)
    }

    /// Delete the records whose `field` equals `value`
    pub async fn delete_one(&self, field: &str, value: &str) -> Result<u64> {
        let field = self.field(field)?;
        let op = WriteOp::Delete {
            predicates: vec![address_predicate(field, value)?],
        };
        Ok(run_batch(&*self.store, &self.schema, [Ok(op)]).await?.affected)
    }

    /// Delete the records whose `field` is any of the values in an array body
    pub async fn delete_many(&self, field: &str, body: &[u8]) -> Result<u64> {
        let field = self.field(field)?;
        let values = decode_elements(body, true)?
            .iter()
            .enumerate()
            .map(|(index, value)| {
                field
                    .field_type
                    .coerce_value(value)
                    .map_err(|e| CrudError::bind(format!("element {}: {}", index, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let op = (!values.is_empty()).then(|| {
            Ok(WriteOp::Delete {
                predicates: vec![FilterPredicate::in_list(&field.column, values)],
            })
        });
        Ok(run_batch(&*self.store, &self.schema, op).await?.affected)
    }
}

fn element_address(
    field: &FieldDescriptor,
    element: &Value,
    index: usize,
) -> Result<FilterPredicate> {
    let raw = element
        .get(&field.name)
        .or_else(|| element.get(&field.column))
        .ok_or_else(|| {
            CrudError::bind(format!("element {} has no '{}' value", index, field.name))
        })?;
    let value = field
        .field_type
        .coerce_value(raw)
        .map_err(|e| CrudError::bind(format!("element {}: {}", index, e)))?;
    Ok(FilterPredicate::equals(&field.column, value))
}
