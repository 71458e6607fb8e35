//! Per-row-shape statistics: how many rows, and how wide each one is.
//!
//! Widths are calibration inputs, not exact byte counts. Variable-length
//! columns are assumed to be sparsely used; blob-like columns are assumed to be
//! large no matter what the catalog claims.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use costwise_core::error::{Error, Result};
use costwise_core::id::RowTypeId;
use costwise_core::oracle::RowCountOracle;
use costwise_core::schema::{Column, Index, Schema, Table};

/// Assumed width of a `text`/`blob` value.
pub const PLAUSIBLE_AVERAGE_BLOB_SIZE: u32 = 100_000;

/// Fraction of a bounded variable-length column's declared storage actually used.
pub const PLAUSIBLE_AVERAGE_VAR_USAGE: f64 = 0.3;

/// Legacy integers are encoded as 8 bytes whatever their declared size.
const LEGACY_NUMERIC_WIDTH: u32 = 8;

/// Ordinal byte written in front of each hkey segment.
const HKEY_ORDINAL_WIDTH: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStatistics {
    row_type: RowTypeId,
    row_count: u64,
    row_width: u32,
}

impl TreeStatistics {
    pub fn new(row_type: RowTypeId, row_count: u64, row_width: u32) -> Self {
        Self {
            row_type,
            row_count,
            row_width,
        }
    }

    /// Table rows: every column plus the encoded hkey leading to the row.
    pub fn for_table(table: &Table, schema: &Schema, oracle: &dyn RowCountOracle) -> Self {
        let mut width: u32 = table.columns.iter().map(field_width).sum();
        for segment in schema.hkey_path(table) {
            width += HKEY_ORDINAL_WIDTH;
            width += segment.primary_key_columns().map(field_width).sum::<u32>();
        }
        Self::new(table.row_type, oracle.row_count(table), width)
    }

    /// Index rows: the key columns. Cardinality follows the leaf-most table.
    pub fn for_index(index: &Index, schema: &Schema, oracle: &dyn RowCountOracle) -> Result<Self> {
        let mut width = 0u32;
        for column in &index.columns {
            width += field_width(schema.column(*column)?);
        }
        let leaf = schema.table(index.leaf_most_table())?;
        Ok(Self::new(index.row_type, oracle.row_count(leaf), width))
    }

    pub fn row_type(&self) -> RowTypeId {
        self.row_type
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn row_width(&self) -> u32 {
        self.row_width
    }
}

/// Calibrated width of one column.
pub fn field_width(column: &Column) -> u32 {
    let ty = column.data_type;
    if let Some(size) = ty.fixed_size() {
        if ty.is_legacy_numeric() {
            LEGACY_NUMERIC_WIDTH
        } else {
            size
        }
    } else if ty.is_variable_length() {
        if ty.is_unbounded() {
            PLAUSIBLE_AVERAGE_BLOB_SIZE
        } else {
            (f64::from(column.average_storage_size) * PLAUSIBLE_AVERAGE_VAR_USAGE) as u32
        }
    } else {
        column.average_storage_size
    }
}

/// Statistics for every table and index row shape of one schema snapshot.
///
/// Populated completely in `build` and never touched afterwards, so it can be
/// read from any number of estimators without locking.
#[derive(Debug, Clone, Default)]
pub struct StatisticsCache {
    by_row_type: HashMap<RowTypeId, TreeStatistics>,
}

impl StatisticsCache {
    pub fn build(schema: &Schema, oracle: &dyn RowCountOracle) -> Result<Self> {
        let mut by_row_type =
            HashMap::with_capacity(schema.tables().len() + schema.indexes().len());
        for table in schema.tables() {
            let stats = TreeStatistics::for_table(table, schema, oracle);
            #[cfg(feature = "tracing")]
            tracing::trace!(
                table = %table.name,
                rows = stats.row_count(),
                width = stats.row_width(),
                "table statistics"
            );
            by_row_type.insert(table.row_type, stats);
        }
        for index in schema.indexes() {
            let stats = TreeStatistics::for_index(index, schema, oracle)?;
            #[cfg(feature = "tracing")]
            tracing::trace!(
                index = %index.name,
                rows = stats.row_count(),
                width = stats.row_width(),
                "index statistics"
            );
            by_row_type.insert(index.row_type, stats);
        }
        Ok(Self { by_row_type })
    }

    pub fn len(&self) -> usize {
        self.by_row_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_row_type.is_empty()
    }

    /// Statistics for `row_type`; `schema` only names the row shape in the error.
    pub fn get(&self, row_type: RowTypeId, schema: &Schema) -> Result<&TreeStatistics> {
        self.by_row_type
            .get(&row_type)
            .ok_or_else(|| Error::MissingStatistics {
                row_type,
                name: schema.row_type_name(row_type),
            })
    }
}
