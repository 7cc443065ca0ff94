use anyhow::Result;

use crate::model::{FilterPredicate, Projection, Row, Schema};

/// Read request handed to a store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    pub predicates: Vec<FilterPredicate>,
    pub projection: Projection,
    /// Raw `sort` token from the request. Stores must validate it, for
    /// instance with [`crate::model::SortKey::parse`], before use.
    pub sort: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Persistence collaborator. Rows are keyed by storage names.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Rows matching every predicate
    async fn find(&self, schema: &Schema, spec: &FindSpec) -> Result<Vec<Row>>;
    /// Number of rows matching every predicate
    async fn count(&self, schema: &Schema, predicates: &[FilterPredicate]) -> Result<u64>;
    /// Open a transactional scope
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

/// A transactional scope opened by [`Store::begin`].
///
/// Changes become visible to other readers only on commit. Dropping a
/// transaction without committing must discard its changes.
#[async_trait::async_trait]
pub trait Transaction: Send {
    /// Insert a row and return it as stored, server-assigned identifier included
    async fn insert(&mut self, schema: &Schema, row: Row) -> Result<Row>;
    /// Apply `changes` to every matching row, returning the affected count
    async fn update(
        &mut self,
        schema: &Schema,
        predicates: &[FilterPredicate],
        changes: &Row,
    ) -> Result<u64>;
    /// Delete every matching row, returning the affected count
    async fn delete(&mut self, schema: &Schema, predicates: &[FilterPredicate]) -> Result<u64>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}
