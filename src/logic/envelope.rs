use crate::model::{Envelope, Query};

/// Assemble the list response
pub fn build<T>(query: Query, items: Vec<T>, total: u64) -> Envelope<T> {
    Envelope {
        query,
        count: items.len(),
        total,
        result: items,
    }
}
