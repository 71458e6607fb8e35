//! Plan-level cost arithmetic on top of a `CostModel`.
//!
//! `CostEstimator` turns plan-shape descriptors (index comparands, join
//! trees, required tables) into `CostEstimate`s. It knows table cardinalities
//! through the row-count oracle and prices every primitive through the model.

use std::collections::BTreeMap;
use std::sync::Arc;

use costwise_core::config::EstimatorConfig;
use costwise_core::error::{Error, Result};
use costwise_core::estimate::CostEstimate;
use costwise_core::id::{GroupId, TableId};
use costwise_core::oracle::RowCountOracle;
use costwise_core::schema::{Index, Schema, Table};
use costwise_model::CostModel;

use crate::plan::{
    Bound, Condition, Expr, IndexScan, MultiIndexIntersectScan, RequiredTables, SingleIndexScan,
    TableGroupJoinTree,
};

/// Rounds `n / d` to nearest.
pub fn simple_round(n: u64, d: u64) -> u64 {
    if d == 0 {
        return n;
    }
    ((u128::from(n) + u128::from(d / 2)) / u128::from(d)) as u64
}

/// Estimates how many rows a single index scan returns.
///
/// Real selectivity comes from index histograms, which live with the
/// statistics service. The default sizer only applies structural rules.
pub trait IndexScanSizer: Send + Sync {
    fn size_index_scan(
        &self,
        estimator: &CostEstimator,
        index: &Index,
        equality: &[Expr],
        low: Option<&Bound>,
        high: Option<&Bound>,
    ) -> Result<u64>;
}

/// Sizes scans without histograms: every equality column, and the range
/// column if any, is assumed to keep `missing_stats_selectivity` of the rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScanSizer;

impl IndexScanSizer for DefaultScanSizer {
    fn size_index_scan(
        &self,
        estimator: &CostEstimator,
        index: &Index,
        equality: &[Expr],
        low: Option<&Bound>,
        high: Option<&Bound>,
    ) -> Result<u64> {
        if index.unique && !equality.is_empty() && equality.len() >= index.columns.len() {
            // Exact match on a unique key.
            return Ok(1);
        }
        let leaf = estimator.schema().table(index.leaf_most_table())?;
        let row_count = estimator.table_row_count(leaf);
        let ranged = low.is_some() || high.is_some();
        if equality.is_empty() && !ranged {
            // Ordering only.
            return Ok(row_count);
        }
        let missing = estimator.config().missing_stats_selectivity;
        let mut selectivity = missing.powi(equality.len() as i32);
        if ranged {
            selectivity *= missing;
        }
        Ok(((selectivity * row_count as f64).round() as u64).max(1))
    }
}

// Join-tree node state while covering branches.
const REQUIRED: u64 = 1;
const ANCESTOR: u64 = 2;
const ANCESTOR_BRANCH: u32 = 1;
const BRANCH_MASK: u64 = !1;
const SIDE_BRANCH_MASK: u64 = !3;
const MAX_BRANCHES: u32 = 64;

/// Which join-tree tables are required and which branch each lies on.
///
/// Branch 1 is the path from the start table up to the root; each side
/// branch gets its own bit. A table where two branches meet becomes required
/// when it has to be fetched to join them.
struct Coverage<'a> {
    tree: &'a TableGroupJoinTree,
    state: Vec<u64>,
}

impl<'a> Coverage<'a> {
    fn new(tree: &'a TableGroupJoinTree, start: usize, required: &RequiredTables) -> Result<Self> {
        let state = tree
            .nodes()
            .map(|n| {
                if required.contains(&tree.table(n)) {
                    REQUIRED
                } else {
                    0
                }
            })
            .collect();
        let mut cov = Self { tree, state };

        let mut any_ancestor_required = false;
        let mut cur = Some(start);
        while let Some(node) = cur {
            cov.set_branch(node, ANCESTOR_BRANCH);
            any_ancestor_required |= cov.is_required(node);
            cur = tree.parent(node);
        }

        let mut nbranches = ANCESTOR_BRANCH + 1;
        for leaf in tree.nodes() {
            if !cov.is_side_branch_leaf(leaf) {
                continue;
            }
            if nbranches >= MAX_BRANCHES {
                return Err(Error::Invariant(format!(
                    "join tree has more than {} side branches",
                    MAX_BRANCHES - 2
                )));
            }
            let mut node = leaf;
            loop {
                let on_branch_already = cov.branches(node) != 0;
                cov.set_branch(node, nbranches);
                if on_branch_already {
                    let joined = if any_ancestor_required {
                        cov.branches(node)
                    } else {
                        cov.side_branches(node)
                    };
                    if !cov.is_required(node) && joined.count_ones() > 1 {
                        cov.state[node] |= REQUIRED;
                    }
                    break;
                }
                match tree.parent(node) {
                    Some(p) => node = p,
                    None => break,
                }
            }
            nbranches += 1;
        }
        Ok(cov)
    }

    fn is_required(&self, node: usize) -> bool {
        self.state[node] & REQUIRED != 0
    }

    fn is_ancestor(&self, node: usize) -> bool {
        self.state[node] & ANCESTOR != 0
    }

    fn branches(&self, node: usize) -> u64 {
        self.state[node] & BRANCH_MASK
    }

    fn side_branches(&self, node: usize) -> u64 {
        self.state[node] & SIDE_BRANCH_MASK
    }

    fn on_branch(&self, node: usize, branch: u32) -> bool {
        self.state[node] & (1u64 << branch) != 0
    }

    fn set_branch(&mut self, node: usize, branch: u32) {
        self.state[node] |= 1u64 << branch;
    }

    /// Required, off the main branch, and nothing below it is required.
    fn is_side_branch_leaf(&self, node: usize) -> bool {
        if !self.is_required(node) || self.is_ancestor(node) {
            return false;
        }
        !self.tree.descendants(node).any(|d| self.is_required(d))
    }

    /// Required with some required ancestor to flatten against.
    fn is_flattenable(&self, node: usize) -> bool {
        if !self.is_required(node) {
            return false;
        }
        let mut cur = self.tree.parent(node);
        while let Some(p) = cur {
            if self.is_required(p) {
                return true;
            }
            cur = self.tree.parent(p);
        }
        false
    }

    /// Nearest main-branch node at or above `node`.
    fn main_branch_ancestor(&self, node: usize) -> Option<usize> {
        let mut cur = self.tree.parent(node);
        while let Some(p) = cur {
            if self.is_ancestor(p) {
                return Some(p);
            }
            cur = self.tree.parent(p);
        }
        None
    }
}

pub struct CostEstimator {
    model: Arc<dyn CostModel>,
    oracle: Arc<dyn RowCountOracle>,
    sizer: Arc<dyn IndexScanSizer>,
    config: EstimatorConfig,
}

impl std::fmt::Debug for CostEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostEstimator")
            .field("tables", &self.schema().tables().len())
            .field("indexes", &self.schema().indexes().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CostEstimator {
    pub fn new(
        model: Arc<dyn CostModel>,
        oracle: Arc<dyn RowCountOracle>,
        config: EstimatorConfig,
    ) -> Self {
        Self {
            model,
            oracle,
            sizer: Arc::new(DefaultScanSizer),
            config,
        }
    }

    /// Replace the structural sizer, e.g. with one backed by histograms.
    pub fn with_sizer(mut self, sizer: Arc<dyn IndexScanSizer>) -> Self {
        self.sizer = sizer;
        self
    }

    pub fn schema(&self) -> &Schema {
        self.model.schema()
    }

    pub fn model(&self) -> &dyn CostModel {
        self.model.as_ref()
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn adjust_cost_estimate(&self, estimate: CostEstimate) -> CostEstimate {
        self.model.adjust_cost_estimate(estimate)
    }

    pub fn table_row_count(&self, table: &Table) -> u64 {
        self.oracle.row_count(table)
    }

    fn row_count_of(&self, table: TableId) -> Result<u64> {
        Ok(self.table_row_count(self.schema().table(table)?))
    }

    pub fn size_index_scan(
        &self,
        index: &Index,
        equality: &[Expr],
        low: Option<&Bound>,
        high: Option<&Bound>,
    ) -> Result<u64> {
        self.sizer.size_index_scan(self, index, equality, low, high)
    }

    /// Scan restricted by comparands; sized first, then priced.
    pub fn cost_index_scan(
        &self,
        index: &Index,
        equality: &[Expr],
        low: Option<&Bound>,
        high: Option<&Bound>,
    ) -> Result<CostEstimate> {
        let rows = self.size_index_scan(index, equality, low, high)?;
        self.cost_index_scan_rows(index, rows)
    }

    /// One random access to get there, then `n_rows - 1` sequential ones.
    pub fn cost_index_scan_rows(&self, index: &Index, n_rows: u64) -> Result<CostEstimate> {
        Ok(CostEstimate::new(n_rows, self.model.index_scan(index, n_rows)?))
    }

    /// Left-deep intersection. The first (output) scan sets the row count;
    /// each further scan adds its own cost plus the merge, and filters the
    /// running row count by its selectivity.
    pub fn cost_index_intersection<F>(
        &self,
        intersection: &MultiIndexIntersectScan,
        mut single_scan_cost: F,
    ) -> Result<CostEstimate>
    where
        F: FnMut(&SingleIndexScan) -> Result<CostEstimate>,
    {
        let mut acc: Option<CostEstimate> = None;
        self.intersect_into(&intersection.output, &mut single_scan_cost, &mut acc)?;
        self.intersect_into(&intersection.selector, &mut single_scan_cost, &mut acc)?;
        Ok(acc.unwrap_or_default())
    }

    fn intersect_into(
        &self,
        scan: &IndexScan,
        single_scan_cost: &mut dyn FnMut(&SingleIndexScan) -> Result<CostEstimate>,
        acc: &mut Option<CostEstimate>,
    ) -> Result<()> {
        match scan {
            IndexScan::Single(single) => {
                let single_est = single_scan_cost(single)?;
                let next = match acc {
                    None => single_est,
                    Some(so_far) => {
                        let mut rows = so_far.row_count();
                        let cost = so_far.cost()
                            + single_est.cost()
                            + self.model.intersect(rows, single_est.row_count());
                        let index = self.schema().index(single.index)?;
                        let total = self.row_count_of(index.leaf_most_table())?;
                        if total > single_est.row_count() {
                            rows = simple_round(rows.saturating_mul(single_est.row_count()), total);
                        }
                        CostEstimate::new(rows, cost)
                    }
                };
                *acc = Some(CostEstimate::new(next.row_count().max(1), next.cost()));
                Ok(())
            }
            IndexScan::Intersection(multi) => {
                self.intersect_into(&multi.output, single_scan_cost, acc)?;
                self.intersect_into(&multi.selector, single_scan_cost, acc)
            }
            IndexScan::Spatial(_) => Err(Error::UnsupportedIndexScan(format!(
                "cannot intersect {}",
                scan.describe()
            ))),
        }
    }

    /// Start from an index on `index_table` and fetch the other required
    /// tables: ancestors by hkey, side branches by branch lookup, all joined
    /// with flattens and a product across branches.
    pub fn cost_flatten(
        &self,
        tree: &TableGroupJoinTree,
        index_table: TableId,
        required: &RequiredTables,
    ) -> Result<CostEstimate> {
        let start = self.find(tree, index_table)?;
        let cov = Coverage::new(tree, start, required)?;
        let mut row_count: u64 = 1;
        let mut cost = 0.0;

        let mut ancestors = Vec::new();
        let mut cur = Some(start);
        while let Some(node) = cur {
            cur = tree.parent(node);
            if !cov.is_required(node) {
                continue;
            }
            if node == start && cov.side_branches(node) != 0 {
                // Fetched as a branch, not as an ancestor.
                continue;
            }
            ancestors.push(self.schema().table(tree.table(node))?);
        }
        cost += self.model.ancestor_lookup(&ancestors)?;

        for leaf in tree.nodes() {
            if !cov.is_side_branch_leaf(leaf) {
                continue;
            }
            let branch = cov.branches(leaf).trailing_zeros();
            let mut branch_root = leaf;
            let mut next_to_root = None;
            while let Some(parent) = tree.parent(branch_root) {
                if parent == start {
                    branch_root = parent;
                    next_to_root = Some(parent);
                    break;
                }
                if !cov.on_branch(parent, branch) {
                    break;
                }
                next_to_root = Some(branch_root);
                branch_root = parent;
            }
            let next_to_root = next_to_root.unwrap_or(branch_root);
            row_count = row_count
                .saturating_mul(self.descendant_cardinality(tree.table(leaf), tree.table(branch_root))?);
            cost += self
                .model
                .branch_lookup(self.schema().table(tree.table(next_to_root))?)?;
        }

        for node in tree.nodes() {
            if cov.is_flattenable(node) {
                cost += self.model.flatten(self.table_cardinality(&cov, node)?);
            }
        }
        if row_count > 1 {
            cost += self.model.product(row_count);
        }
        Ok(CostEstimate::new(row_count, cost))
    }

    /// Flatten after a full group scan; every required table's rows are in
    /// the scan already.
    pub fn cost_flatten_group(
        &self,
        tree: &TableGroupJoinTree,
        required: &RequiredTables,
    ) -> Result<CostEstimate> {
        let cov = Coverage::new(tree, tree.root(), required)?;
        self.flatten_branches(tree, &cov, 1, 0.0, |node| self.row_count_of(tree.table(node)))
    }

    /// A group scan stopped early, with `table_counts` rows read from each
    /// table, and the flatten of what was read.
    pub fn cost_partial_group_scan_and_flatten(
        &self,
        tree: &TableGroupJoinTree,
        required: &RequiredTables,
        table_counts: &BTreeMap<TableId, u64>,
    ) -> Result<CostEstimate> {
        let cov = Coverage::new(tree, tree.root(), required)?;
        let mut cost = 0.0;
        for (table, rows) in table_counts {
            cost += self
                .model
                .partial_group_scan(self.schema().table(*table)?, *rows)?;
        }
        self.flatten_branches(tree, &cov, 1, cost, |node| {
            let table = tree.table(node);
            table_counts.get(&table).copied().ok_or_else(|| {
                Error::Invariant(format!("no partial scan count for {table}"))
            })
        })
    }

    /// Nested loop within a group: for each `outside` row, fetch `inside`
    /// (its parent by hkey, or a child branch) and flatten.
    pub fn cost_flatten_nested(
        &self,
        tree: &TableGroupJoinTree,
        outside: TableId,
        inside: TableId,
        inside_is_parent: bool,
        required: &RequiredTables,
    ) -> Result<CostEstimate> {
        let start = self.find(tree, inside)?;
        let cov = Coverage::new(tree, start, required)?;
        let inside_table = self.schema().table(inside)?;
        let (row_count, cost) = if inside_is_parent {
            (1, self.model.ancestor_lookup(&[inside_table])?)
        } else {
            (
                self.descendant_cardinality(inside, outside)?,
                self.model.branch_lookup(inside_table)?,
            )
        };
        self.flatten_branches(tree, &cov, row_count, cost, |node| {
            self.table_cardinality(&cov, node)
        })
    }

    // Shared tail of the group and nested flatten costs.
    fn flatten_branches<F>(
        &self,
        tree: &TableGroupJoinTree,
        cov: &Coverage<'_>,
        mut row_count: u64,
        mut cost: f64,
        rows_of: F,
    ) -> Result<CostEstimate>
    where
        F: Fn(usize) -> Result<u64>,
    {
        let mut branch_count = 0;
        for node in tree.nodes() {
            if !cov.is_flattenable(node) {
                continue;
            }
            let nrows = rows_of(node)?;
            cost += self.model.flatten(nrows);
            if cov.is_side_branch_leaf(node) {
                branch_count += 1;
                row_count = row_count.saturating_mul(nrows);
            }
        }
        if branch_count > 1 {
            cost += self.model.product(row_count);
        }
        Ok(CostEstimate::new(row_count, cost))
    }

    /// Rows of `node` per index row.
    fn table_cardinality(&self, cov: &Coverage<'_>, node: usize) -> Result<u64> {
        if cov.is_ancestor(node) {
            return Ok(1);
        }
        match cov.main_branch_ancestor(node) {
            Some(anc) => self.descendant_cardinality(cov.tree.table(node), cov.tree.table(anc)),
            None => Ok(1),
        }
    }

    /// Child rows per ancestor row. Never zero, so products stay meaningful.
    pub fn descendant_cardinality(&self, child: TableId, ancestor: TableId) -> Result<u64> {
        let child_count = self.row_count_of(child)?;
        let ancestor_count = self.row_count_of(ancestor)?;
        if ancestor_count == 0 {
            return Ok(1);
        }
        Ok(simple_round(child_count, ancestor_count).max(1))
    }

    fn find(&self, tree: &TableGroupJoinTree, table: TableId) -> Result<usize> {
        tree.find(table).ok_or_else(|| {
            Error::Catalog(format!("{table} is not part of the join tree"))
        })
    }

    /// Each condition is one test per row; an IN list is one per value.
    pub fn cost_select(
        &self,
        conditions: &[Condition],
        selectivity: f64,
        size: u64,
    ) -> CostEstimate {
        let ntests: usize = conditions.iter().map(Condition::test_count).sum();
        CostEstimate::new(
            ((size as f64 * selectivity).round() as u64).max(1),
            self.model.select(size) * ntests as f64,
        )
    }

    pub fn cost_sort(&self, size: u64) -> CostEstimate {
        CostEstimate::new(size, self.model.sort(size, false))
    }

    pub fn cost_sort_with_limit(&self, size: u64, limit: u64, sort_fields: usize) -> CostEstimate {
        CostEstimate::new(size.min(limit), self.model.sort_with_limit(size, sort_fields))
    }

    /// Every table of the group is read.
    pub fn cost_group_scan(&self, group: GroupId) -> Result<CostEstimate> {
        let group = self.schema().group(group)?;
        let rows: u64 = self
            .schema()
            .group_tables(group.id)
            .map(|t| self.table_row_count(t))
            .sum();
        let root = self.schema().table(group.root)?;
        Ok(CostEstimate::new(rows, self.model.full_group_scan(root)?))
    }

    /// A row built from hkey values alone.
    pub fn cost_hkey_row(&self, key_count: usize) -> CostEstimate {
        CostEstimate::new(1, self.model.project(key_count, 1))
    }

    /// A VALUES list, optionally filtered.
    pub fn cost_values(&self, n_fields: usize, n_rows: u64, select_too: bool) -> CostEstimate {
        let mut cost = self.model.project(n_fields, n_rows);
        if select_too {
            cost += self.model.select(n_rows);
        }
        self.adjust_cost_estimate(CostEstimate::new(n_rows, cost))
    }

    pub fn cost_bound_row(&self) -> CostEstimate {
        CostEstimate::new(1, 0.0)
    }

    /// Load a bloom filter from `loader`, then pass `input` through it.
    pub fn cost_bloom_filter(
        &self,
        loader: &CostEstimate,
        input: &CostEstimate,
        check_selectivity: f64,
    ) -> CostEstimate {
        let check_count = ((input.row_count() as f64 * check_selectivity).round() as u64).max(1);
        let cost = loader.cost()
            + input.cost()
            + self
                .model
                .select_with_filter(input.row_count(), loader.row_count(), check_selectivity);
        self.adjust_cost_estimate(CostEstimate::new(check_count, cost))
    }

    /// Read back the rows a hash table produces for one probe.
    pub fn cost_hash_lookup(
        &self,
        equivalent: &CostEstimate,
        join_fields: usize,
        fields: usize,
    ) -> CostEstimate {
        let rows = equivalent.row_count();
        self.adjust_cost_estimate(CostEstimate::new(
            rows,
            self.model.unload_hash_table(rows, join_fields, fields),
        ))
    }

    /// Build a hash table from `loader`, then probe it with `lookup` once per
    /// `outer` row.
    pub fn cost_hash_join(
        &self,
        loader: &CostEstimate,
        outer: &CostEstimate,
        lookup: &CostEstimate,
        join_fields: usize,
        outer_fields: usize,
    ) -> CostEstimate {
        let probed = outer.nest(lookup);
        let cost = loader.cost()
            + self
                .model
                .load_hash_table(loader.row_count(), join_fields, outer_fields)
            + probed.cost();
        self.adjust_cost_estimate(CostEstimate::new(probed.row_count(), cost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costwise_core::config::OperatorCosts;
    use costwise_core::oracle::StaticRowCounts;
    use costwise_core::schema::{Column, DataType, SchemaBuilder};
    use costwise_model::StoreCostModel;

    struct Fixture {
        schema: Arc<Schema>,
        estimator: CostEstimator,
    }

    // customers(10) -> orders(100) -> items(1000); customers -> addresses(20)
    fn fixture() -> Fixture {
        let id = |n: &str| Column::new(n, DataType::Int);
        let mut b = SchemaBuilder::new();
        b.table("customers", None, vec![id("cid"), Column::new("name", DataType::Varchar(32))], &["cid"])
            .table("orders", Some("customers"), vec![id("oid"), id("cid")], &["oid"])
            .table("items", Some("orders"), vec![id("iid"), id("oid")], &["iid"])
            .table("addresses", Some("customers"), vec![id("aid"), id("cid")], &["aid"])
            .table_index("customers", "pk_customers", &["cid"], true)
            .table_index("customers", "name", &["name"], false)
            .table_index("orders", "order_cid", &["cid"], false);
        let schema = Arc::new(b.build().unwrap());
        let t = |n: &str| schema.table_named(n).unwrap().id;
        let oracle = Arc::new(
            StaticRowCounts::new()
                .with(t("customers"), 10)
                .with(t("orders"), 100)
                .with(t("items"), 1000)
                .with(t("addresses"), 20),
        );
        let model = Arc::new(
            StoreCostModel::new(schema.clone(), oracle.as_ref(), OperatorCosts::default()).unwrap(),
        );
        let estimator = CostEstimator::new(model, oracle, EstimatorConfig::default());
        Fixture { schema, estimator }
    }

    impl Fixture {
        fn t(&self, n: &str) -> TableId {
            self.schema.table_named(n).unwrap().id
        }

        fn required(&self, names: &[&str]) -> RequiredTables {
            names.iter().map(|n| self.t(n)).collect()
        }

        fn tree(&self) -> TableGroupJoinTree {
            TableGroupJoinTree::for_group(&self.schema, self.schema.groups()[0].id).unwrap()
        }
    }

    #[test]
    fn simple_round_rounds_half_up() {
        assert_eq!(simple_round(15, 10), 2);
        assert_eq!(simple_round(14, 10), 1);
        assert_eq!(simple_round(7, 0), 7);
    }

    #[test]
    fn unique_full_equality_is_one_row() {
        let f = fixture();
        let pk = f.schema.index_named("pk_customers").unwrap();
        let rows = f
            .estimator
            .size_index_scan(pk, &[Expr::number(3)], None, None)
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn unrestricted_scan_returns_whole_table() {
        let f = fixture();
        let idx = f.schema.index_named("order_cid").unwrap();
        assert_eq!(f.estimator.size_index_scan(idx, &[], None, None).unwrap(), 100);
    }

    #[test]
    fn missing_stats_selectivity_per_column() {
        let f = fixture();
        let idx = f.schema.index_named("order_cid").unwrap();
        let eq = f
            .estimator
            .size_index_scan(idx, &[Expr::number(1)], None, None)
            .unwrap();
        assert_eq!(eq, 85);
        let low = Bound::inclusive(Expr::number(1));
        let both = f
            .estimator
            .size_index_scan(idx, &[Expr::number(1)], Some(&low), None)
            .unwrap();
        assert_eq!(both, (0.85f64 * 0.85 * 100.0).round() as u64);
    }

    #[test]
    fn intersection_filters_by_selector() {
        let f = fixture();
        let name = f.schema.index_named("name").unwrap().id;
        let scan = MultiIndexIntersectScan {
            output: Box::new(IndexScan::Single(SingleIndexScan::full(name))),
            selector: Box::new(IndexScan::Single(SingleIndexScan::full(name))),
        };
        let first = CostEstimate::new(8, 3.0);
        let second = CostEstimate::new(5, 2.0);
        let mut calls = 0;
        let e = f
            .estimator
            .cost_index_intersection(&scan, |_| {
                calls += 1;
                Ok(if calls == 1 { first } else { second })
            })
            .unwrap();
        assert_eq!(calls, 2);
        // 8 * 5 / 10 customers
        assert_eq!(e.row_count(), 4);
        let merge = f.estimator.model().intersect(8, 5);
        assert_eq!(e.cost(), 3.0 + 2.0 + merge);
    }

    #[test]
    fn group_flatten_of_root_only_is_free() {
        let f = fixture();
        let e = f
            .estimator
            .cost_flatten_group(&f.tree(), &f.required(&["customers"]))
            .unwrap();
        assert_eq!(e.row_count(), 1);
        assert_eq!(e.cost(), 0.0);
    }

    #[test]
    fn group_flatten_of_two_branches_adds_product() {
        let f = fixture();
        let m = f.estimator.model();
        let e = f
            .estimator
            .cost_flatten_group(&f.tree(), &f.required(&["customers", "orders", "addresses"]))
            .unwrap();
        assert_eq!(e.row_count(), 100 * 20);
        let expected = m.flatten(100) + m.flatten(20) + m.product(2000);
        assert!((e.cost() - expected).abs() < 1e-9);
    }

    #[test]
    fn flatten_from_child_index_looks_up_parent() {
        let f = fixture();
        let m = f.estimator.model();
        let e = f
            .estimator
            .cost_flatten(&f.tree(), f.t("orders"), &f.required(&["customers", "orders"]))
            .unwrap();
        assert_eq!(e.row_count(), 1);
        let customers = f.schema.table_named("customers").unwrap();
        let orders = f.schema.table_named("orders").unwrap();
        let expected = m.ancestor_lookup(&[orders, customers]).unwrap() + m.flatten(1);
        assert!((e.cost() - expected).abs() < 1e-9);
    }

    #[test]
    fn flatten_from_root_index_fetches_branch() {
        let f = fixture();
        let m = f.estimator.model();
        let e = f
            .estimator
            .cost_flatten(&f.tree(), f.t("customers"), &f.required(&["customers", "orders"]))
            .unwrap();
        // Ten orders per customer.
        assert_eq!(e.row_count(), 10);
        let customers = f.schema.table_named("customers").unwrap();
        let expected = m.branch_lookup(customers).unwrap() + m.flatten(10) + m.product(10);
        assert!((e.cost() - expected).abs() < 1e-9);
    }

    #[test]
    fn nested_child_lookup_scales_by_cardinality() {
        let f = fixture();
        let e = f
            .estimator
            .cost_flatten_nested(
                &f.tree(),
                f.t("customers"),
                f.t("orders"),
                false,
                &f.required(&["orders"]),
            )
            .unwrap();
        assert_eq!(e.row_count(), 10);
        let orders = f.schema.table_named("orders").unwrap();
        assert_eq!(e.cost(), f.estimator.model().branch_lookup(orders).unwrap());
    }

    #[test]
    fn select_counts_in_list_values() {
        let f = fixture();
        let conds = vec![
            Condition::Other(Expr::Null),
            Condition::InList {
                operand: Expr::Parameter(0),
                values: vec![Expr::number(1), Expr::number(2)],
            },
        ];
        let e = f.estimator.cost_select(&conds, 0.1, 50);
        assert_eq!(e.row_count(), 5);
        assert_eq!(e.cost(), f.estimator.model().select(50) * 3.0);
        assert_eq!(f.estimator.cost_select(&conds, 0.0, 50).row_count(), 1);
    }

    #[test]
    fn group_scan_counts_every_table() {
        let f = fixture();
        let e = f.estimator.cost_group_scan(f.schema.groups()[0].id).unwrap();
        assert_eq!(e.row_count(), 10 + 100 + 1000 + 20);
        let root = f.schema.table_named("customers").unwrap();
        assert_eq!(e.cost(), f.estimator.model().full_group_scan(root).unwrap());
    }

    #[test]
    fn hash_join_nests_lookup_under_outer() {
        let f = fixture();
        let loader = CostEstimate::new(100, 10.0);
        let outer = CostEstimate::new(4, 1.0);
        let lookup = f.estimator.cost_hash_lookup(&CostEstimate::new(3, 0.0), 1, 2);
        let e = f.estimator.cost_hash_join(&loader, &outer, &lookup, 1, 2);
        assert_eq!(e.row_count(), 12);
        let load = f.estimator.model().load_hash_table(100, 1, 2);
        assert!((e.cost() - (10.0 + load + 1.0 + 4.0 * lookup.cost())).abs() < 1e-9);
    }

    #[test]
    fn bloom_filter_keeps_at_least_one_row() {
        let f = fixture();
        let e = f.estimator.cost_bloom_filter(
            &CostEstimate::new(10, 1.0),
            &CostEstimate::new(3, 2.0),
            0.01,
        );
        assert_eq!(e.row_count(), 1);
        assert!(e.cost() > 3.0);
        assert_eq!(f.estimator.cost_bound_row(), CostEstimate::new(1, 0.0));
    }
}
