use anyhow::{anyhow, Context, Result};
use itertools::Itertools;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};

use crate::model::{
    FieldType, FilterOp, FilterPredicate, Projection, Row, Schema, SortDirection, SortKey,
};
use crate::store::traits::{FindSpec, Store, Transaction};

/// PostgreSQL adapter. Tables must already exist, one column per storage
/// name; schema migration is left to the deployment.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn into_row(value: Value) -> Result<Row> {
    match value {
        Value::Object(row) => Ok(row),
        other => Err(anyhow!("expected a row object, got {}", other)),
    }
}

fn push_value(
    qb: &mut QueryBuilder<'_, Postgres>,
    field_type: FieldType,
    value: &Value,
) -> Result<()> {
    if value.is_null() {
        qb.push("NULL");
        return Ok(());
    }
    let mismatch = || anyhow!("{} is not a valid {:?} value", value, field_type);
    match field_type {
        FieldType::Integer => {
            qb.push_bind(value.as_i64().ok_or_else(mismatch)?);
        }
        FieldType::Float => {
            qb.push_bind(value.as_f64().ok_or_else(mismatch)?);
        }
        FieldType::Boolean => {
            qb.push_bind(value.as_bool().ok_or_else(mismatch)?);
        }
        FieldType::Text => {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            qb.push_bind(text);
        }
        FieldType::Timestamp => {
            qb.push_bind(value.as_str().ok_or_else(mismatch)?.to_string());
            qb.push("::timestamptz");
        }
        FieldType::Json => {
            qb.push_bind(sqlx::types::Json(value.clone()));
        }
    }
    Ok(())
}

fn column_type(schema: &Schema, column: &str) -> Result<FieldType> {
    schema
        .by_column(column)
        .map(|field| field.field_type)
        .ok_or_else(|| anyhow!("{} has no column {}", schema.collection, column))
}

fn push_where(
    qb: &mut QueryBuilder<'_, Postgres>,
    schema: &Schema,
    predicates: &[FilterPredicate],
) -> Result<()> {
    for (i, predicate) in predicates.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        let field_type = column_type(schema, &predicate.column)?;
        let column = quote(&predicate.column);
        match predicate.op {
            FilterOp::Equals => {
                qb.push(column).push(" = ");
                let value = predicate.values.first().unwrap_or(&Value::Null);
                push_value(qb, field_type, value)?;
            }
            FilterOp::Like => {
                qb.push("CAST(").push(column).push(" AS TEXT) LIKE ");
                qb.push_bind(format!("%{}%", escape_like(predicate.needle())));
                qb.push(" ESCAPE '\\'");
            }
            FilterOp::In if predicate.values.is_empty() => {
                qb.push("FALSE");
            }
            FilterOp::In => {
                qb.push(column).push(" IN (");
                for (j, value) in predicate.values.iter().enumerate() {
                    if j > 0 {
                        qb.push(", ");
                    }
                    push_value(qb, field_type, value)?;
                }
                qb.push(")");
            }
        }
    }
    Ok(())
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    async fn find(&self, schema: &Schema, spec: &FindSpec) -> Result<Vec<Row>> {
        let sort = match spec.sort.as_deref() {
            Some(token) => SortKey::parse(token, schema)?,
            None => Vec::new(),
        };

        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        match &spec.projection {
            Projection::All => {
                qb.push("to_jsonb(t)");
            }
            Projection::Fields(columns) if columns.is_empty() => {
                qb.push("'{}'::jsonb");
            }
            Projection::Fields(columns) => {
                let pairs = columns
                    .iter()
                    .map(|c| format!("{}, t.{}", literal(c), quote(c)))
                    .join(", ");
                qb.push("jsonb_build_object(").push(pairs).push(")");
            }
        }
        qb.push(" FROM ").push(quote(&schema.collection)).push(" AS t");
        push_where(&mut qb, schema, &spec.predicates)?;

        if !sort.is_empty() {
            let order = sort
                .iter()
                .map(|key| {
                    let direction = match key.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{} {}", quote(&key.column), direction)
                })
                .join(", ");
            qb.push(" ORDER BY ").push(order);
        }
        if let Some(limit) = spec.limit {
            qb.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(offset) = spec.offset {
            qb.push(" OFFSET ").push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }

        let values: Vec<Value> = qb
            .build_query_scalar::<Value>()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to list {}", schema.collection))?;

        values.into_iter().map(into_row).collect()
    }

    async fn count(&self, schema: &Schema, predicates: &[FilterPredicate]) -> Result<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ");
        qb.push(quote(&schema.collection));
        push_where(&mut qb, schema, predicates)?;

        let total: i64 = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {}", schema.collection))?;

        Ok(total as u64)
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to open transaction")?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl Transaction for PostgresTransaction {
    async fn insert(&mut self, schema: &Schema, row: Row) -> Result<Row> {
        // Zero identifiers are left to the column default (serial/identity)
        let fields: Vec<_> = schema
            .fields()
            .iter()
            .filter(|field| match row.get(&field.column) {
                Some(value) => !(field.identifier && field.field_type.is_zero(value)),
                None => false,
            })
            .collect();

        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO ");
        qb.push(quote(&schema.collection)).push(" AS t");
        if fields.is_empty() {
            qb.push(" DEFAULT VALUES");
        } else {
            let columns = fields.iter().map(|field| quote(&field.column)).join(", ");
            qb.push(" (").push(columns).push(") VALUES (");
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(&mut qb, field.field_type, &row[&field.column])?;
            }
            qb.push(")");
        }
        qb.push(" RETURNING to_jsonb(t)");

        let inserted: Value = qb
            .build_query_scalar::<Value>()
            .fetch_one(&mut *self.tx)
            .await
            .with_context(|| format!("Failed to insert into {}", schema.collection))?;

        into_row(inserted)
    }

    async fn update(
        &mut self,
        schema: &Schema,
        predicates: &[FilterPredicate],
        changes: &Row,
    ) -> Result<u64> {
        if changes.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
        qb.push(quote(&schema.collection)).push(" SET ");
        for (i, (column, value)) in changes.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            let field_type = column_type(schema, column)?;
            qb.push(quote(column)).push(" = ");
            push_value(&mut qb, field_type, value)?;
        }
        push_where(&mut qb, schema, predicates)?;

        let result = qb
            .build()
            .execute(&mut *self.tx)
            .await
            .with_context(|| format!("Failed to update {}", schema.collection))?;

        Ok(result.rows_affected())
    }

    async fn delete(&mut self, schema: &Schema, predicates: &[FilterPredicate]) -> Result<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM ");
        qb.push(quote(&schema.collection));
        push_where(&mut qb, schema, predicates)?;

        let result = qb
            .build()
            .execute(&mut *self.tx)
            .await
            .with_context(|| format!("Failed to delete from {}", schema.collection))?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.context("Failed to commit transaction")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("Failed to roll back transaction")
    }
}
