//! Cost formulas, one per physical primitive.
//!
//! Every formula is built on `tree_scan`, the cost of one ordered-tree access
//! returning `n_rows` rows of a given width, plus linear per-row constants from
//! `OperatorCosts`. Concrete models only supply `tree_scan` (and optionally
//! `adjust_cost_estimate`); the rest is shared.

use std::sync::Arc;

use costwise_core::config::OperatorCosts;
use costwise_core::error::Result;
use costwise_core::estimate::CostEstimate;
use costwise_core::oracle::RowCountOracle;
use costwise_core::schema::{Index, Schema, Table};

use crate::stats::{StatisticsCache, TreeStatistics};

/// State shared by every model: the schema snapshot, its statistics, and the
/// calibration constants. Immutable after construction.
#[derive(Debug, Clone)]
pub struct ModelBase {
    schema: Arc<Schema>,
    stats: StatisticsCache,
    costs: OperatorCosts,
}

impl ModelBase {
    /// Computes statistics for every table and index row shape up front.
    pub fn new(
        schema: Arc<Schema>,
        oracle: &dyn RowCountOracle,
        costs: OperatorCosts,
    ) -> Result<Self> {
        let stats = StatisticsCache::build(&schema, oracle)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            tables = schema.tables().len(),
            indexes = schema.indexes().len(),
            "cost model statistics ready"
        );
        Ok(Self {
            schema,
            stats,
            costs,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn statistics(&self) -> &StatisticsCache {
        &self.stats
    }

    pub fn costs(&self) -> &OperatorCosts {
        &self.costs
    }
}

pub trait CostModel: Send + Sync {
    fn base(&self) -> &ModelBase;

    /// One ordered-tree access yielding `n_rows` rows of `row_width` bytes.
    /// Must be non-decreasing in `n_rows`.
    fn tree_scan(&self, row_width: u32, n_rows: u64) -> f64;

    /// Hook for perturbing final estimates; identity unless overridden.
    fn adjust_cost_estimate(&self, estimate: CostEstimate) -> CostEstimate {
        estimate
    }

    fn schema(&self) -> &Schema {
        self.base().schema()
    }

    fn costs(&self) -> &OperatorCosts {
        self.base().costs()
    }

    fn table_statistics(&self, table: &Table) -> Result<&TreeStatistics> {
        self.base().statistics().get(table.row_type, self.schema())
    }

    fn index_statistics(&self, index: &Index) -> Result<&TreeStatistics> {
        self.base().statistics().get(index.row_type, self.schema())
    }

    fn index_scan(&self, index: &Index, n_rows: u64) -> Result<f64> {
        let stats = self.index_statistics(index)?;
        Ok(self.tree_scan(stats.row_width(), n_rows))
    }

    fn full_index_scan(&self, index: &Index) -> Result<f64> {
        let stats = self.index_statistics(index)?;
        Ok(self.tree_scan(stats.row_width(), stats.row_count()))
    }

    /// Scan of `root` and all its descendants. Only the root pays for the
    /// initial probe, so each table contributes its sequential part.
    fn full_group_scan(&self, root: &Table) -> Result<f64> {
        let mut cost = 0.0;
        for table in self.schema().subtree(root) {
            let stats = self.table_statistics(table)?;
            cost += self.tree_scan(stats.row_width(), stats.row_count())
                - self.tree_scan(stats.row_width(), 0);
        }
        Ok(cost)
    }

    fn partial_group_scan(&self, table: &Table, n_rows: u64) -> Result<f64> {
        let stats = self.table_statistics(table)?;
        Ok(self.tree_scan(stats.row_width(), n_rows) - self.tree_scan(stats.row_width(), 0))
    }

    /// One probe per ancestor row fetched by hkey.
    fn ancestor_lookup(&self, ancestors: &[&Table]) -> Result<f64> {
        let mut cost = 0.0;
        for table in ancestors {
            let stats = self.table_statistics(table)?;
            cost += self.tree_scan(stats.row_width(), 1);
        }
        Ok(cost)
    }

    /// Probe for the branch root plus an average branch's share of a full
    /// group scan below it.
    fn branch_lookup(&self, root: &Table) -> Result<f64> {
        let stats = self.table_statistics(root)?;
        let probe = self.tree_scan(stats.row_width(), 1);
        let branch = self.full_group_scan(root)? / stats.row_count().max(1) as f64;
        Ok(probe + branch)
    }

    fn sort(&self, n_rows: u64, mixed_mode: bool) -> f64 {
        let c = &self.costs().sort;
        let factor = if mixed_mode { 1.0 } else { c.mixed_mode_factor };
        c.setup + c.per_row * n_rows as f64 * factor
    }

    fn sort_with_limit(&self, n_rows: u64, sort_fields: usize) -> f64 {
        let c = &self.costs().sort_limit;
        c.per_row * n_rows as f64 * (1.0 + sort_fields as f64 * c.per_field_factor)
    }

    fn select(&self, n_rows: u64) -> f64 {
        self.costs().select.per_row * n_rows as f64
    }

    fn project(&self, n_fields: usize, n_rows: u64) -> f64 {
        let c = &self.costs().project;
        (c.per_row + n_fields as f64 * c.per_field) * n_rows as f64
    }

    fn distinct(&self, n_rows: u64) -> f64 {
        self.costs().distinct.per_row * n_rows as f64
    }

    fn product(&self, n_rows: u64) -> f64 {
        self.costs().product.per_row * n_rows as f64
    }

    /// Nested loop: every outer row plus every inner row it drives.
    fn map(&self, outer_rows: u64, inner_rows_per_outer: u64) -> f64 {
        let outer = outer_rows as f64;
        (outer * inner_rows_per_outer as f64 + outer) * self.costs().map.per_row
    }

    fn flatten(&self, n_rows: u64) -> f64 {
        let c = &self.costs().flatten;
        c.overhead + c.per_row * n_rows as f64
    }

    fn intersect(&self, left_rows: u64, right_rows: u64) -> f64 {
        self.costs().intersect.per_row * (left_rows as f64 + right_rows as f64)
    }

    fn union(&self, left_rows: u64, right_rows: u64) -> f64 {
        self.costs().union.per_row * (left_rows as f64 + right_rows as f64)
    }

    fn hkey_union(&self, left_rows: u64, right_rows: u64) -> f64 {
        self.costs().hkey_union.per_row * (left_rows as f64 + right_rows as f64)
    }

    /// Load `filter_rows` into a bloom filter, then probe it once per input row.
    fn select_with_filter(&self, input_rows: u64, filter_rows: u64, selectivity: f64) -> f64 {
        let c = &self.costs().bloom_filter;
        filter_rows as f64 * c.load_per_row
            + input_rows as f64 * (c.scan_per_row + selectivity * c.scan_selectivity_coefficient)
    }

    /// Load `hashed_rows` into a hash table, then probe it once per input row.
    fn select_with_hash_table(&self, input_rows: u64, hashed_rows: u64, selectivity: f64) -> f64 {
        let c = &self.costs().hash_table;
        hashed_rows as f64 * c.load_per_row
            + input_rows as f64 * (c.probe_per_row + selectivity * c.probe_selectivity_coefficient)
    }

    fn load_hash_table(&self, n_rows: u64, join_fields: usize, fields: usize) -> f64 {
        let c = &self.costs().hash_table;
        n_rows as f64
            * (c.load_per_row
                + join_fields as f64 * c.hash_per_join_field
                + fields as f64 * c.load_per_field)
    }

    fn unload_hash_table(&self, n_rows: u64, join_fields: usize, fields: usize) -> f64 {
        let c = &self.costs().hash_table;
        n_rows as f64
            * (c.probe_per_row
                + join_fields as f64 * c.hash_per_join_field
                + fields as f64 * c.unload_per_field)
    }
}

/// Calibrated against the ordered key-value store: the first row of a scan is
/// a random access, every following row a sequential one.
#[derive(Debug, Clone)]
pub struct StoreCostModel {
    base: ModelBase,
}

impl StoreCostModel {
    pub fn new(
        schema: Arc<Schema>,
        oracle: &dyn RowCountOracle,
        costs: OperatorCosts,
    ) -> Result<Self> {
        Ok(Self {
            base: ModelBase::new(schema, oracle, costs)?,
        })
    }
}

impl CostModel for StoreCostModel {
    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn tree_scan(&self, row_width: u32, n_rows: u64) -> f64 {
        let c = &self.base.costs().tree_scan;
        let width = f64::from(row_width);
        let random = c.random_access_per_row + c.random_access_per_byte * width;
        let sequential = c.sequential_access_per_row + c.sequential_access_per_byte * width;
        random + n_rows.saturating_sub(1) as f64 * sequential
    }
}
