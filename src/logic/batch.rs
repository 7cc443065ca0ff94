use log::{debug, warn};

use crate::error::{CrudError, Result};
use crate::model::{FilterPredicate, Row, Schema};
use crate::store::traits::{Store, Transaction};

/// One write applied inside a batch
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert(Row),
    Update {
        predicates: Vec<FilterPredicate>,
        changes: Row,
    },
    Delete {
        predicates: Vec<FilterPredicate>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Open,
    Applying,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// Rows inserted, updated or deleted
    pub affected: u64,
    /// Inserted rows as stored, in input order
    pub inserted: Vec<Row>,
    pub state: BatchState,
}

impl BatchOutcome {
    fn empty() -> Self {
        Self {
            affected: 0,
            inserted: Vec::new(),
            state: BatchState::Idle,
        }
    }
}

/// A single transactional scope. Ends committed or rolled back; if it is
/// dropped on an abnormal exit the store transaction is dropped with it,
/// which discards its changes.
pub struct TxScope<'a> {
    tx: Option<Box<dyn Transaction>>,
    schema: &'a Schema,
    state: BatchState,
    affected: u64,
    inserted: Vec<Row>,
}

impl<'a> TxScope<'a> {
    pub async fn open<S: Store + ?Sized>(store: &S, schema: &'a Schema) -> Result<TxScope<'a>> {
        let tx = store.begin().await?;
        debug!("Transaction opened for {}", schema.collection);
        Ok(Self {
            tx: Some(tx),
            schema,
            state: BatchState::Open,
            affected: 0,
            inserted: Vec::new(),
        })
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub async fn apply(&mut self, op: WriteOp) -> Result<()> {
        let tx = self
            .tx
            .as_mut()
            .ok_or_else(|| CrudError::Persistence(anyhow::anyhow!("transaction already closed")))?;
        self.state = BatchState::Applying;

        match op {
            WriteOp::Insert(row) => {
                let stored = tx.insert(self.schema, row).await?;
                self.inserted.push(stored);
                self.affected += 1;
            }
            WriteOp::Update { changes, .. } if changes.is_empty() => {
                debug!("Skipping update of {} with no changes", self.schema.collection);
            }
            WriteOp::Update {
                predicates,
                changes,
            } => {
                self.affected += tx.update(self.schema, &predicates, &changes).await?;
            }
            WriteOp::Delete { predicates } => {
                self.affected += tx.delete(self.schema, &predicates).await?;
            }
        }
        Ok(())
    }

    pub async fn commit(mut self) -> Result<BatchOutcome> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        self.state = BatchState::Committed;
        debug!(
            "Transaction committed for {} ({} affected)",
            self.schema.collection, self.affected
        );
        Ok(BatchOutcome {
            affected: self.affected,
            inserted: std::mem::take(&mut self.inserted),
            state: self.state,
        })
    }

    pub async fn rollback(&mut self) {
        if let Some(tx) = self.tx.take() {
            if let Err(e) = tx.rollback().await {
                warn!("Rollback of {} failed: {:#}", self.schema.collection, e);
            }
        }
        self.state = BatchState::RolledBack;
        debug!("Transaction rolled back for {}", self.schema.collection);
    }
}

/// Apply `ops` in order as one atomic unit.
///
/// Ops are pulled lazily, so work that produces them (hook invocation)
/// happens inside the scope and its failure rolls back earlier items too.
/// An empty input opens no transaction.
pub async fn run_batch<S, I>(store: &S, schema: &Schema, ops: I) -> Result<BatchOutcome>
where
    S: Store + ?Sized,
    I: IntoIterator<Item = Result<WriteOp>>,
    I::IntoIter: Send,
{
    let mut ops = ops.into_iter().peekable();
    if ops.peek().is_none() {
        return Ok(BatchOutcome::empty());
    }

    let mut scope = TxScope::open(store, schema).await?;
    let mut applied = 0usize;
    for op in ops {
        let result = match op {
            Ok(op) => scope.apply(op).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            debug!(
                "Batch on {} failed after {} item(s): {}",
                schema.collection, applied, e
            );
            scope.rollback().await;
            return Err(e);
        }
        applied += 1;
    }
    scope.commit().await
}
