//! Row-count oracle: where table cardinalities come from.
//!
//! The real server answers from already-loaded index statistics; lookups are
//! in-memory and side-effect free for the lifetime of one cost model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::TableId;
use crate::schema::Table;

pub trait RowCountOracle: Send + Sync {
    fn row_count(&self, table: &Table) -> u64;
}

/// Map-backed oracle. Tables that were never analyzed count as one row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticRowCounts {
    counts: HashMap<TableId, u64>,
    unanalyzed: u64,
}

impl Default for StaticRowCounts {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
            unanalyzed: 1,
        }
    }
}

impl StaticRowCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, table: TableId, rows: u64) -> Self {
        self.counts.insert(table, rows);
        self
    }

    pub fn set(&mut self, table: TableId, rows: u64) {
        self.counts.insert(table, rows);
    }

    pub fn get(&self, table: TableId) -> Option<u64> {
        self.counts.get(&table).copied()
    }
}

impl RowCountOracle for StaticRowCounts {
    fn row_count(&self, table: &Table) -> u64 {
        self.get(table.id).unwrap_or(self.unanalyzed)
    }
}

impl<T: RowCountOracle + ?Sized> RowCountOracle for std::sync::Arc<T> {
    fn row_count(&self, table: &Table) -> u64 {
        (**self).row_count(table)
    }
}
