use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::{
    FieldType, FilterOp, FilterPredicate, Projection, Row, Schema, SortDirection, SortKey,
};
use crate::store::traits::{FindSpec, Store, Transaction};

#[derive(Debug, Clone, Default)]
struct Table {
    rows: Vec<Row>,
    last_id: i64,
}

type Tables = HashMap<String, Table>;

/// In-process store. Transactions work on a private copy of the tables and
/// publish it on commit; writers are serialized.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows of a collection, in insertion order
    pub fn rows(&self, collection: &str) -> Vec<Row> {
        self.tables
            .read()
            .get(collection)
            .map(|table| table.rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn find(&self, schema: &Schema, spec: &FindSpec) -> Result<Vec<Row>> {
        let sort = match spec.sort.as_deref() {
            Some(token) => SortKey::parse(token, schema)?,
            None => Vec::new(),
        };

        let mut rows: Vec<Row> = self
            .tables
            .read()
            .get(&schema.collection)
            .map(|table| {
                table
                    .rows
                    .iter()
                    .filter(|row| matches_all(row, &spec.predicates))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if !sort.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, &sort));
        }

        let offset = spec.offset.unwrap_or(0) as usize;
        let limit = spec.limit.map_or(usize::MAX, |limit| limit as usize);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| project(row, &spec.projection))
            .collect())
    }

    async fn count(&self, schema: &Schema, predicates: &[FilterPredicate]) -> Result<u64> {
        Ok(self
            .tables
            .read()
            .get(&schema.collection)
            .map_or(0, |table| {
                table
                    .rows
                    .iter()
                    .filter(|row| matches_all(row, predicates))
                    .count() as u64
            }))
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let guard = Arc::clone(&self.writer).lock_owned().await;
        let staged = self.tables.read().clone();
        Ok(Box::new(MemoryTransaction {
            tables: Arc::clone(&self.tables),
            staged,
            _writer: guard,
        }))
    }
}

struct MemoryTransaction {
    tables: Arc<RwLock<Tables>>,
    staged: Tables,
    _writer: OwnedMutexGuard<()>,
}

#[async_trait::async_trait]
impl Transaction for MemoryTransaction {
    async fn insert(&mut self, schema: &Schema, mut row: Row) -> Result<Row> {
        let table = self.staged.entry(schema.collection.clone()).or_default();

        if let Some(id) = schema.identifier() {
            let current = row.get(&id.column).cloned().unwrap_or(Value::Null);
            if id.field_type.is_zero(&current) {
                let assigned = match id.field_type {
                    FieldType::Integer => {
                        table.last_id += 1;
                        Value::from(table.last_id)
                    }
                    FieldType::Text => Value::String(uuid::Uuid::new_v4().to_string()),
                    other => {
                        return Err(anyhow!(
                            "cannot assign a {:?} identifier for {}",
                            other,
                            schema.collection
                        ))
                    }
                };
                row.insert(id.column.clone(), assigned);
            } else {
                let taken = table.rows.iter().any(|existing| {
                    existing
                        .get(&id.column)
                        .is_some_and(|v| values_equal(v, &current))
                });
                if taken {
                    return Err(anyhow!(
                        "duplicate key {} = {} in {}",
                        id.column,
                        current,
                        schema.collection
                    ));
                }
                if let Some(explicit) = current.as_i64() {
                    table.last_id = table.last_id.max(explicit);
                }
            }
        }

        for field in schema.fields() {
            row.entry(field.column.clone()).or_insert(Value::Null);
        }
        table.rows.push(row.clone());
        Ok(row)
    }

    async fn update(
        &mut self,
        schema: &Schema,
        predicates: &[FilterPredicate],
        changes: &Row,
    ) -> Result<u64> {
        let Some(table) = self.staged.get_mut(&schema.collection) else {
            return Ok(0);
        };
        let mut affected = 0;
        for row in table.rows.iter_mut().filter(|row| matches_all(row, predicates)) {
            for (column, value) in changes {
                row.insert(column.clone(), value.clone());
            }
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete(&mut self, schema: &Schema, predicates: &[FilterPredicate]) -> Result<u64> {
        let Some(table) = self.staged.get_mut(&schema.collection) else {
            return Ok(0);
        };
        let before = table.rows.len();
        table.rows.retain(|row| !matches_all(row, predicates));
        Ok((before - table.rows.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { tables, staged, _writer } = *self;
        *tables.write() = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

fn matches_all(row: &Row, predicates: &[FilterPredicate]) -> bool {
    predicates.iter().all(|predicate| matches(row, predicate))
}

fn matches(row: &Row, predicate: &FilterPredicate) -> bool {
    let value = row.get(&predicate.column).unwrap_or(&Value::Null);
    match predicate.op {
        FilterOp::Equals | FilterOp::In => predicate
            .values
            .iter()
            .any(|candidate| values_equal(value, candidate)),
        FilterOp::Like => text_of(value).contains(predicate.needle()),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => text_of(a).cmp(&text_of(b)),
    }
}

fn compare_rows(a: &Row, b: &Row, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = a.get(&key.column).unwrap_or(&Value::Null);
        let right = b.get(&key.column).unwrap_or(&Value::Null);
        let ordering = match key.direction {
            SortDirection::Asc => compare_values(left, right),
            SortDirection::Desc => compare_values(right, left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn project(row: Row, projection: &Projection) -> Row {
    match projection {
        Projection::All => row,
        Projection::Fields(_) => row
            .into_iter()
            .filter(|(column, _)| projection.includes(column))
            .collect(),
    }
}
