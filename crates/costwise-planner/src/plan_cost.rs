//! Estimator chain mirroring a physical plan.
//!
//! The optimizer appends one node per operator, bottom-up, optionally sets a
//! limit on the top node, and reads the estimate. Evaluation is pulled from
//! the top: each node turns its own limit into a limit on its input, reads
//! the input's estimate, and adds its own cost. Every node memoizes its
//! estimate; a node with a different limit is a new node value with an empty
//! memo.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::unsync::OnceCell;

use costwise_core::error::{Error, Result};
use costwise_core::estimate::CostEstimate;
use costwise_core::id::TableId;
use costwise_core::schema::Table;

use crate::cost::{simple_round, CostEstimator};
use crate::plan::{
    Bound, Expr, FullTextScan, GroupLoopScan, GroupScan, IndexScan, RequiredTables,
    SingleIndexScan, TableGroupJoinTree,
};
use crate::spatial::{z_hi, z_lo, BoxLatLon, Space, MAX_Z};

/// Spatial predicate forms a spatial index scan may carry as its low comparand.
const CENTER: &str = "_center";
const CENTER_RADIUS: &str = "_center_radius";

#[derive(Debug)]
enum NodeKind {
    IndexScan {
        scan: IndexScan,
        /// Unlimited cost of the scan itself; survives limit changes.
        scan_only: OnceCell<CostEstimate>,
    },
    SpatialIndexScan {
        scan: SingleIndexScan,
        scan_only: OnceCell<(CostEstimate, u64)>,
    },
    Flatten {
        tree: Arc<TableGroupJoinTree>,
        index_table: TableId,
        required: Arc<RequiredTables>,
    },
    GroupScan {
        scan: GroupScan,
        tree: Arc<TableGroupJoinTree>,
        required: Arc<RequiredTables>,
    },
    GroupLoop {
        scan: GroupLoopScan,
        tree: Arc<TableGroupJoinTree>,
        required: Arc<RequiredTables>,
    },
    HKeyRow {
        key_count: usize,
    },
    FullTextScan {
        scan: FullTextScan,
    },
    Select {
        conditions: Vec<crate::plan::Condition>,
        selectivity: f64,
    },
    Sort {
        fields: usize,
    },
}

impl NodeKind {
    fn name(&self) -> &'static str {
        match self {
            NodeKind::IndexScan { .. } => "index scan",
            NodeKind::SpatialIndexScan { .. } => "spatial index scan",
            NodeKind::Flatten { .. } => "flatten",
            NodeKind::GroupScan { .. } => "group scan",
            NodeKind::GroupLoop { .. } => "group loop",
            NodeKind::HKeyRow { .. } => "hkey row",
            NodeKind::FullTextScan { .. } => "full text scan",
            NodeKind::Select { .. } => "select",
            NodeKind::Sort { .. } => "sort",
        }
    }
}

#[derive(Debug)]
struct PlanNode {
    kind: NodeKind,
    input: Option<Box<PlanNode>>,
    limit: Option<u64>,
    memo: OnceCell<CostEstimate>,
}

impl PlanNode {
    fn leaf(kind: NodeKind) -> Self {
        Self {
            kind,
            input: None,
            limit: None,
            memo: OnceCell::new(),
        }
    }

    fn wrap(kind: NodeKind, input: PlanNode) -> Self {
        Self {
            kind,
            input: Some(Box::new(input)),
            limit: None,
            memo: OnceCell::new(),
        }
    }

    /// Same node under a new limit, with nothing memoized.
    fn with_limit(self, limit: Option<u64>) -> Self {
        Self {
            limit,
            memo: OnceCell::new(),
            ..self
        }
    }

    fn cost_estimate(&mut self, estimator: &CostEstimator) -> Result<CostEstimate> {
        if let Some(memo) = self.memo.get() {
            return Ok(*memo);
        }
        let estimate = self.estimate_cost(estimator)?;
        #[cfg(feature = "tracing")]
        tracing::trace!(
            node = self.kind.name(),
            limit = ?self.limit,
            rows = estimate.row_count(),
            cost = estimate.cost(),
            "estimated"
        );
        let _ = self.memo.set(estimate);
        Ok(estimate)
    }

    fn estimate_cost(&mut self, estimator: &CostEstimator) -> Result<CostEstimate> {
        let limit = self.limit;
        let name = self.kind.name();
        match &self.kind {
            NodeKind::IndexScan { scan, scan_only } => {
                let full = *scan_only.get_or_try_init(|| scan_only_cost(estimator, scan))?;
                let total = full.row_count();
                match limit {
                    Some(limit) if limit < total => {
                        if let IndexScan::Single(single) = scan {
                            if single.condition_range.is_none() {
                                let index = estimator.schema().index(single.index)?;
                                return estimator.cost_index_scan_rows(index, limit);
                            }
                        }
                        // Several scans; assume the rows come evenly.
                        let setup = scan_setup_cost(estimator, scan)?;
                        let scan_cost = full.cost() - setup;
                        Ok(CostEstimate::new(
                            limit,
                            setup + scan_cost * limit as f64 / total as f64,
                        ))
                    }
                    _ => Ok(full),
                }
            }
            NodeKind::SpatialIndexScan { scan, scan_only } => {
                let (full, nscans) =
                    *scan_only.get_or_try_init(|| spatial_scan_only_cost(estimator, scan))?;
                let total = full.row_count();
                let nrows = match limit {
                    Some(limit) if limit < total => limit,
                    _ => total,
                };
                let index = estimator.schema().index(scan.index)?;
                if nscans == 1 {
                    if nrows == total {
                        return Ok(full);
                    }
                    return estimator.cost_index_scan_rows(index, nrows);
                }
                let setup = estimator.cost_index_scan_rows(index, 0)?.cost();
                let scan_cost = (full.cost() - setup).max(0.0);
                let fraction = if total == 0 {
                    0.0
                } else {
                    nrows as f64 / total as f64
                };
                Ok(CostEstimate::new(
                    nrows,
                    setup * nscans as f64 + scan_cost * fraction,
                ))
            }
            NodeKind::Flatten {
                tree,
                index_table,
                required,
            } => {
                let flatten = estimator.cost_flatten(tree, *index_table, required)?;
                let scale = flatten.row_count().max(1);
                // Enough input rows to produce `limit` flattened ones.
                let input_limit = limit.map(|limit| limit.div_ceil(scale));
                let input = limit_input(&mut self.input, input_limit, name)?;
                Ok(input.cost_estimate(estimator)?.nest(&flatten))
            }
            NodeKind::GroupScan {
                scan,
                tree,
                required,
            } => {
                if let Some(limit) = limit {
                    if let Some(counts) =
                        group_scan_table_counts_to_limit(estimator, required, limit)?
                    {
                        return estimator
                            .cost_partial_group_scan_and_flatten(tree, required, &counts);
                    }
                    #[cfg(feature = "tracing")]
                    tracing::debug!(limit, "limit reaches past the group; costing a full scan");
                }
                let scan_cost = estimator.cost_group_scan(scan.group)?;
                let flatten = estimator.cost_flatten_group(tree, required)?;
                Ok(scan_cost.sequence(&flatten))
            }
            NodeKind::GroupLoop {
                scan,
                tree,
                required,
            } => estimator.cost_flatten_nested(
                tree,
                scan.outside,
                scan.inside,
                scan.inside_is_parent,
                required,
            ),
            NodeKind::HKeyRow { key_count } => Ok(estimator.cost_hkey_row(*key_count)),
            NodeKind::FullTextScan { scan } => Ok(CostEstimate::new(
                scan.limit.max(1),
                estimator.config().full_text_scan_cost,
            )),
            NodeKind::Select {
                conditions,
                selectivity,
            } => {
                let selectivity = *selectivity;
                // Enough input rows that `limit` survive the filter.
                let input_limit = if selectivity > 0.0 {
                    limit.map(|limit| ((limit as f64 / selectivity).round() as u64).max(1))
                } else {
                    None
                };
                let input = limit_input(&mut self.input, input_limit, name)?;
                let input_cost = input.cost_estimate(estimator)?;
                let select = estimator.cost_select(conditions, selectivity, input_cost.row_count());
                Ok(input_cost.sequence(&select))
            }
            NodeKind::Sort { fields } => {
                let fields = *fields;
                let input = limit_input(&mut self.input, None, name)?;
                let input_cost = input.cost_estimate(estimator)?;
                let rows = input_cost.row_count();
                let sort = match limit {
                    Some(limit) if limit <= estimator.config().insertion_sort_max_limit => {
                        estimator.cost_sort_with_limit(rows, limit.min(rows), fields)
                    }
                    _ => estimator.cost_sort(rows),
                };
                Ok(input_cost.sequence(&sort))
            }
        }
    }
}

/// Puts `limit` on the input, replacing it with a fresh node only when the
/// limit actually changes.
fn limit_input<'a>(
    input: &'a mut Option<Box<PlanNode>>,
    limit: Option<u64>,
    kind: &'static str,
) -> Result<&'a mut PlanNode> {
    let node = input.take().ok_or(Error::MissingInput(kind))?;
    let node = if node.limit == limit {
        node
    } else {
        Box::new(node.with_limit(limit))
    };
    Ok(input.insert(node))
}

fn scan_only_cost(estimator: &CostEstimator, scan: &IndexScan) -> Result<CostEstimate> {
    match scan {
        IndexScan::Single(single) => single_scan_only_cost(estimator, single),
        IndexScan::Intersection(multi) => {
            estimator.cost_index_intersection(multi, |s| single_scan_only_cost(estimator, s))
        }
        IndexScan::Spatial(_) => Err(Error::UnsupportedIndexScan(format!(
            "{} needs the spatial estimator",
            scan.describe()
        ))),
    }
}

fn single_scan_only_cost(
    estimator: &CostEstimator,
    single: &SingleIndexScan,
) -> Result<CostEstimate> {
    let index = estimator.schema().index(single.index)?;
    let Some(segments) = &single.condition_range else {
        return estimator.cost_index_scan(
            index,
            &single.equality,
            single.low.as_ref(),
            single.high.as_ref(),
        );
    };
    let mut total: Option<CostEstimate> = None;
    for segment in segments {
        let part = estimator.cost_index_scan(
            index,
            &single.equality,
            segment.start.as_ref(),
            segment.end.as_ref(),
        )?;
        total = Some(match total {
            None => part,
            Some(so_far) => so_far.union(&part),
        });
    }
    // No segments, no scan.
    Ok(total.unwrap_or_default())
}

/// Probe cost paid once per underlying scan.
fn scan_setup_cost(estimator: &CostEstimator, scan: &IndexScan) -> Result<f64> {
    match scan {
        IndexScan::Single(single) => {
            let index = estimator.schema().index(single.index)?;
            let setup = estimator.cost_index_scan_rows(index, 0)?.cost();
            Ok(match &single.condition_range {
                None => setup,
                Some(segments) => setup * segments.len() as f64,
            })
        }
        IndexScan::Intersection(multi) => Ok(scan_setup_cost(estimator, &multi.output)?
            + scan_setup_cost(estimator, &multi.selector)?),
        IndexScan::Spatial(_) => Ok(0.0),
    }
}

/// Unlimited cost of a spatial scan and the number of index scans it takes.
fn spatial_scan_only_cost(
    estimator: &CostEstimator,
    scan: &SingleIndexScan,
) -> Result<(CostEstimate, u64)> {
    let index = estimator.schema().index(scan.index)?;
    if !index.spatial {
        return Err(Error::UnsupportedIndexScan(format!(
            "spatial scan of non-spatial index {}",
            index.name
        )));
    }
    let function = scan.low.as_ref().map(|b| &b.value);
    let Some(Expr::Function { name, operands }) = function else {
        return Err(Error::UnexpectedSpatialFunction(format!(
            "{} on index {}",
            function.map_or_else(|| "no comparand".to_string(), Expr::to_string),
            index.name
        )));
    };
    match name.as_str() {
        // One scan in each direction from the center.
        CENTER => Ok((
            estimator.cost_index_scan(index, &scan.equality, None, None)?,
            2,
        )),
        CENTER_RADIUS if operands.len() == 3 => {
            let constant = |e: &Expr| {
                e.numeric_constant().ok_or_else(|| {
                    Error::NonConstantSpatialOperand(format!(
                        "{} in {}",
                        e,
                        function.map(Expr::to_string).unwrap_or_default()
                    ))
                })
            };
            let lat = constant(&operands[0])?;
            let lon = constant(&operands[1])?;
            let radius = constant(&operands[2])?;
            let space = Space::lat_lon(estimator.config().spatial_bits_per_dimension);
            let cells = space.decompose(&BoxLatLon::around(lat, lon, radius), MAX_Z);
            let mut total: Option<CostEstimate> = None;
            for z in cells {
                let lo = Bound::inclusive(Expr::Integer(z_lo(z)));
                let hi = Bound::inclusive(Expr::Integer(z_hi(z)));
                let part = estimator.cost_index_scan(index, &scan.equality, Some(&lo), Some(&hi))?;
                total = Some(match total {
                    None => part,
                    Some(so_far) => so_far.union(&part),
                });
            }
            Ok((total.unwrap_or_default(), 1))
        }
        _ => Err(Error::UnexpectedSpatialFunction(format!(
            "{} on index {}",
            function.map(Expr::to_string).unwrap_or_default(),
            index.name
        ))),
    }
}

/// Rows read from each table of the group before `limit` rows of the last
/// required table (in storage order) have gone by.
///
/// `None` when that table has no more than `limit` rows, i.e. the whole group
/// is read anyway. Assumes every parent has the same number of children, so
/// the counts are an approximation.
pub fn group_scan_table_counts_to_limit(
    estimator: &CostEstimator,
    required: &RequiredTables,
    limit: u64,
) -> Result<Option<BTreeMap<TableId, u64>>> {
    let schema = estimator.schema();
    let mut last_required: Option<&Table> = None;
    for id in required {
        let table = schema.table(*id)?;
        if last_required.map_or(true, |last| last.ordinal < table.ordinal) {
            last_required = Some(table);
        }
    }
    let Some(last_required) = last_required else {
        return Ok(None);
    };
    let child_count = estimator.table_row_count(last_required);
    if child_count <= limit {
        return Ok(None);
    }

    let mut counts = BTreeMap::new();
    counts.insert(last_required.id, limit);
    let mut ancestor = schema.parent(last_required);
    while let Some(table) = ancestor {
        let ancestor_count = u128::from(estimator.table_row_count(table));
        let needed = (u128::from(limit) * ancestor_count + u128::from(child_count - 1))
            / u128::from(child_count);
        counts.insert(table.id, needed as u64);
        ancestor = schema.parent(table);
    }

    let mut more = BTreeMap::new();
    for table in schema.group_tables(last_required.group) {
        let mut common = Some(table);
        while let Some(t) = common {
            if counts.contains_key(&t.id) {
                break;
            }
            common = schema.parent(t);
        }
        let Some(common) = common else { continue };
        if common.id == table.id {
            continue;
        }
        let mut ancestor_count = counts[&common.id];
        if table.ordinal > last_required.ordinal {
            // Not required; scan order decides how many get skipped.
            ancestor_count = ancestor_count.saturating_sub(1);
        }
        more.insert(
            table.id,
            simple_round(
                estimator.table_row_count(table).saturating_mul(ancestor_count),
                estimator.table_row_count(common),
            ),
        );
    }
    counts.extend(more);
    Ok(Some(counts))
}

/// Builds the estimator chain for one candidate plan and reads its cost.
///
/// ```ignore
/// let mut plan = PlanCostEstimator::new(&estimator);
/// plan.index_scan(scan)
///     .flatten(tree, orders, required)?
///     .sort(1)?
///     .set_limit(10)?;
/// let estimate = plan.cost_estimate()?;
/// ```
#[derive(Debug)]
pub struct PlanCostEstimator<'e> {
    estimator: &'e CostEstimator,
    plan: Option<PlanNode>,
}

impl<'e> PlanCostEstimator<'e> {
    pub fn new(estimator: &'e CostEstimator) -> Self {
        Self {
            estimator,
            plan: None,
        }
    }

    /// Final estimate, through the model's adjust hook.
    pub fn cost_estimate(&mut self) -> Result<CostEstimate> {
        let plan = self
            .plan
            .as_mut()
            .ok_or(Error::MissingInput("plan cost"))?;
        let estimate = plan.cost_estimate(self.estimator)?;
        Ok(self.estimator.adjust_cost_estimate(estimate))
    }

    /// Row limit on the output of the last operator. Zero means no limit.
    pub fn set_limit(&mut self, limit: u64) -> Result<&mut Self> {
        let plan = self.plan.take().ok_or(Error::MissingInput("limit"))?;
        self.plan = Some(plan.with_limit((limit > 0).then_some(limit)));
        Ok(self)
    }

    pub fn limit(&self) -> Option<u64> {
        self.plan.as_ref().and_then(|p| p.limit)
    }

    pub fn index_scan(&mut self, scan: IndexScan) -> &mut Self {
        self.plan = Some(PlanNode::leaf(NodeKind::IndexScan {
            scan,
            scan_only: OnceCell::new(),
        }));
        self
    }

    pub fn spatial_index(&mut self, scan: SingleIndexScan) -> &mut Self {
        self.plan = Some(PlanNode::leaf(NodeKind::SpatialIndexScan {
            scan,
            scan_only: OnceCell::new(),
        }));
        self
    }

    /// Flatten the rows of the index on `index_table` with the other
    /// required tables of the group.
    pub fn flatten(
        &mut self,
        tree: impl Into<Arc<TableGroupJoinTree>>,
        index_table: TableId,
        required: impl Into<Arc<RequiredTables>>,
    ) -> Result<&mut Self> {
        self.wrap(NodeKind::Flatten {
            tree: tree.into(),
            index_table,
            required: required.into(),
        })
    }

    pub fn group_scan(
        &mut self,
        scan: GroupScan,
        tree: impl Into<Arc<TableGroupJoinTree>>,
        required: impl Into<Arc<RequiredTables>>,
    ) -> &mut Self {
        self.plan = Some(PlanNode::leaf(NodeKind::GroupScan {
            scan,
            tree: tree.into(),
            required: required.into(),
        }));
        self
    }

    pub fn group_loop(
        &mut self,
        scan: GroupLoopScan,
        tree: impl Into<Arc<TableGroupJoinTree>>,
        required: impl Into<Arc<RequiredTables>>,
    ) -> &mut Self {
        self.plan = Some(PlanNode::leaf(NodeKind::GroupLoop {
            scan,
            tree: tree.into(),
            required: required.into(),
        }));
        self
    }

    /// A row built from `key_count` hkey expressions.
    pub fn hkey_row(&mut self, key_count: usize) -> &mut Self {
        self.plan = Some(PlanNode::leaf(NodeKind::HKeyRow { key_count }));
        self
    }

    pub fn full_text_scan(&mut self, scan: FullTextScan) -> &mut Self {
        self.plan = Some(PlanNode::leaf(NodeKind::FullTextScan { scan }));
        self
    }

    /// Filter with `conditions`, of which `selectivity` of the input passes.
    pub fn select(
        &mut self,
        conditions: Vec<crate::plan::Condition>,
        selectivity: f64,
    ) -> Result<&mut Self> {
        self.wrap(NodeKind::Select {
            conditions,
            selectivity,
        })
    }

    pub fn sort(&mut self, fields: usize) -> Result<&mut Self> {
        self.wrap(NodeKind::Sort { fields })
    }

    fn wrap(&mut self, kind: NodeKind) -> Result<&mut Self> {
        let input = self.plan.take().ok_or(Error::MissingInput(kind.name()))?;
        self.plan = Some(PlanNode::wrap(kind, input));
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use costwise_core::config::{EstimatorConfig, OperatorCosts};
    use costwise_core::oracle::StaticRowCounts;
    use costwise_core::schema::{Column, DataType, Schema, SchemaBuilder};
    use costwise_model::{CostModel, ModelBase, StoreCostModel};

    use crate::plan::{Condition, RangeSegment};

    fn schema() -> Arc<Schema> {
        let id = |n: &str| Column::new(n, DataType::Int);
        let mut b = SchemaBuilder::new();
        b.table("customers", None, vec![id("cid"), Column::new("name", DataType::Varchar(32))], &["cid"])
            .table("orders", Some("customers"), vec![id("oid"), id("cid"), id("total")], &["oid"])
            .table("items", Some("orders"), vec![id("iid"), id("oid")], &["iid"])
            .table_index("orders", "order_total", &["total"], false)
            .table_index("customers", "customer_name", &["name"], false)
            .spatial_index("customers", "customer_location", &["cid", "name"]);
        Arc::new(b.build().unwrap())
    }

    fn counts(schema: &Schema) -> StaticRowCounts {
        let t = |n: &str| schema.table_named(n).unwrap().id;
        StaticRowCounts::new()
            .with(t("customers"), 10)
            .with(t("orders"), 100)
            .with(t("items"), 1000)
    }

    fn estimator() -> (Arc<Schema>, CostEstimator) {
        let schema = schema();
        let oracle = Arc::new(counts(&schema));
        let model =
            StoreCostModel::new(schema.clone(), oracle.as_ref(), OperatorCosts::default()).unwrap();
        let estimator = CostEstimator::new(Arc::new(model), oracle, EstimatorConfig::default());
        (schema, estimator)
    }

    fn tid(schema: &Schema, name: &str) -> TableId {
        schema.table_named(name).unwrap().id
    }

    fn total_scan(schema: &Schema) -> IndexScan {
        IndexScan::Single(SingleIndexScan::full(
            schema.index_named("order_total").unwrap().id,
        ))
    }

    fn cost_with_limit(p: &mut PlanCostEstimator<'_>, limit: u64) -> CostEstimate {
        p.set_limit(limit).unwrap();
        p.cost_estimate().unwrap()
    }

    #[test]
    fn index_scan_limit_recosts_bounded_scan() {
        let (schema, est) = estimator();
        let mut p = PlanCostEstimator::new(&est);
        p.index_scan(total_scan(&schema));
        let full = p.cost_estimate().unwrap();
        assert_eq!(full.row_count(), 100);

        let limited = cost_with_limit(&mut p, 10);
        let index = schema.index_named("order_total").unwrap();
        assert_eq!(limited, est.cost_index_scan_rows(index, 10).unwrap());
        assert!(limited.cost() < full.cost());

        // At or past the full count the limit changes nothing.
        assert_eq!(cost_with_limit(&mut p, 100), full);
        assert_eq!(cost_with_limit(&mut p, 0), full);
    }

    #[test]
    fn range_list_scan_scales_proportionally() {
        let (schema, est) = estimator();
        let index = schema.index_named("order_total").unwrap();
        let segment = |lo: f64, hi: f64| RangeSegment {
            start: Some(Bound::inclusive(Expr::number(lo))),
            end: Some(Bound::exclusive(Expr::number(hi))),
        };
        let scan = SingleIndexScan::full(index.id)
            .with_condition_range(vec![segment(0.0, 5.0), segment(10.0, 20.0)]);
        let mut p = PlanCostEstimator::new(&est);
        p.index_scan(IndexScan::Single(scan));
        let full = p.cost_estimate().unwrap();
        // Two segments of 85 rows each.
        assert_eq!(full.row_count(), 170);

        let limited = cost_with_limit(&mut p, 17);
        let setup = est.cost_index_scan_rows(index, 0).unwrap().cost() * 2.0;
        let expected = setup + (full.cost() - setup) * 17.0 / 170.0;
        assert_eq!(limited.row_count(), 17);
        assert!((limited.cost() - expected).abs() < 1e-9);
    }

    #[test]
    fn empty_range_list_costs_nothing() {
        let (schema, est) = estimator();
        let scan = SingleIndexScan::full(schema.index_named("order_total").unwrap().id)
            .with_condition_range(Vec::new());
        let mut p = PlanCostEstimator::new(&est);
        p.index_scan(IndexScan::Single(scan));
        assert_eq!(p.cost_estimate().unwrap(), CostEstimate::new(0, 0.0));
    }

    #[test]
    fn spatial_scan_cannot_be_costed_as_plain_index_scan() {
        let (schema, est) = estimator();
        let scan = SingleIndexScan::full(schema.index_named("customer_location").unwrap().id);
        let mut p = PlanCostEstimator::new(&est);
        p.index_scan(IndexScan::Spatial(scan));
        assert!(matches!(p.cost_estimate(), Err(Error::UnsupportedIndexScan(_))));
    }

    fn spatial(schema: &Schema, function: Expr) -> SingleIndexScan {
        SingleIndexScan::full(schema.index_named("customer_location").unwrap().id)
            .with_range(Some(Bound::inclusive(function)), None)
    }

    #[test]
    fn center_radius_unions_cell_scans() {
        let (schema, est) = estimator();
        let f = Expr::function(
            CENTER_RADIUS,
            vec![
                Expr::number(42.0),
                Expr::Cast(Box::new(Expr::number(-71.0))),
                Expr::number(0.5),
            ],
        );
        let mut p = PlanCostEstimator::new(&est);
        p.spatial_index(spatial(&schema, f));
        let full = p.cost_estimate().unwrap();
        let index = schema.index_named("customer_location").unwrap();
        let one_cell = est
            .cost_index_scan(
                index,
                &[],
                Some(&Bound::inclusive(Expr::number(0))),
                Some(&Bound::inclusive(Expr::number(1))),
            )
            .unwrap();
        assert_eq!(full.row_count() % one_cell.row_count(), 0);
        let cells = full.row_count() / one_cell.row_count();
        assert!((1..=MAX_Z as u64).contains(&cells));

        let limited = cost_with_limit(&mut p, 1);
        assert_eq!(limited, est.cost_index_scan_rows(index, 1).unwrap());
    }

    #[test]
    fn center_splits_setup_across_two_scans() {
        let (schema, est) = estimator();
        let f = Expr::function(CENTER, vec![Expr::number(0), Expr::number(0)]);
        let mut p = PlanCostEstimator::new(&est);
        p.spatial_index(spatial(&schema, f));
        let full = p.cost_estimate().unwrap();
        let index = schema.index_named("customer_location").unwrap();
        let setup = est.cost_index_scan_rows(index, 0).unwrap().cost();
        assert_eq!(full.row_count(), 10);
        assert!((full.cost() - (setup + full_scan_cost(&est, index))).abs() < 1e-9);

        let limited = cost_with_limit(&mut p, 5);
        assert_eq!(limited.row_count(), 5);
        let scan = full_scan_cost(&est, index) - setup;
        assert!((limited.cost() - (2.0 * setup + scan * 0.5)).abs() < 1e-9);
    }

    /// Records the range bounds each sized scan receives.
    #[derive(Default)]
    struct RecordingSizer {
        bounds: Mutex<Vec<(i64, i64)>>,
    }

    impl crate::cost::IndexScanSizer for RecordingSizer {
        fn size_index_scan(
            &self,
            estimator: &CostEstimator,
            index: &costwise_core::schema::Index,
            equality: &[Expr],
            low: Option<&Bound>,
            high: Option<&Bound>,
        ) -> Result<u64> {
            let exact = |b: Option<&Bound>| b.and_then(|b| b.value.integer_constant());
            if let (Some(lo), Some(hi)) = (exact(low), exact(high)) {
                self.bounds.lock().unwrap().push((lo, hi));
            }
            crate::cost::DefaultScanSizer.size_index_scan(estimator, index, equality, low, high)
        }
    }

    #[test]
    fn center_radius_passes_exact_cell_bounds() {
        let schema = schema();
        let oracle = Arc::new(counts(&schema));
        let model =
            StoreCostModel::new(schema.clone(), oracle.as_ref(), OperatorCosts::default()).unwrap();
        let sizer = Arc::new(RecordingSizer::default());
        let config = EstimatorConfig::default();
        let bits = config.spatial_bits_per_dimension;
        let est = CostEstimator::new(Arc::new(model), oracle, config).with_sizer(sizer.clone());

        let (lat, lon, radius) = (42.0, -71.0, 0.5);
        let f = Expr::function(
            CENTER_RADIUS,
            vec![Expr::number(lat), Expr::number(lon), Expr::number(radius)],
        );
        let mut p = PlanCostEstimator::new(&est);
        p.spatial_index(spatial(&schema, f));
        p.cost_estimate().unwrap();

        let expected: Vec<(i64, i64)> = Space::lat_lon(bits)
            .decompose(&BoxLatLon::around(lat, lon, radius), MAX_Z)
            .into_iter()
            .map(|z| (z_lo(z), z_hi(z)))
            .collect();
        assert!(!expected.is_empty());
        assert_eq!(*sizer.bounds.lock().unwrap(), expected);
    }

    fn full_scan_cost(est: &CostEstimator, index: &costwise_core::schema::Index) -> f64 {
        est.cost_index_scan(index, &[], None, None).unwrap().cost()
    }

    #[test]
    fn spatial_shape_errors() {
        let (schema, est) = estimator();
        let cases = [
            (
                Expr::function("_nearest", vec![Expr::number(1)]),
                "function",
            ),
            (
                Expr::function(
                    CENTER_RADIUS,
                    vec![Expr::number(1), Expr::Parameter(0), Expr::number(2)],
                ),
                "operand",
            ),
            (Expr::number(3), "function"),
        ];
        for (f, expected) in cases {
            let mut p = PlanCostEstimator::new(&est);
            p.spatial_index(spatial(&schema, f));
            match (p.cost_estimate(), expected) {
                (Err(Error::UnexpectedSpatialFunction(_)), "function") => {}
                (Err(Error::NonConstantSpatialOperand(_)), "operand") => {}
                (other, _) => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn flatten_limits_input_by_scale() {
        let (schema, est) = estimator();
        let tree = TableGroupJoinTree::for_group(&schema, schema.groups()[0].id).unwrap();
        let customers = tid(&schema, "customers");
        let required: RequiredTables = [customers, tid(&schema, "orders")].into();
        let name_scan = IndexScan::Single(SingleIndexScan::full(
            schema.index_named("customer_name").unwrap().id,
        ));
        let mut p = PlanCostEstimator::new(&est);
        p.index_scan(name_scan.clone())
            .flatten(tree.clone(), customers, required.clone())
            .unwrap();
        let full = p.cost_estimate().unwrap();
        // Each customer flattens into ten order rows.
        assert_eq!(full.row_count(), 100);

        let limited = cost_with_limit(&mut p, 25);
        let flatten = est.cost_flatten(&tree, customers, &required).unwrap();
        let mut input = PlanCostEstimator::new(&est);
        input.index_scan(name_scan);
        let three = cost_with_limit(&mut input, 3);
        assert_eq!(limited, three.nest(&flatten));
    }

    #[test]
    fn partial_group_counts_follow_chain() {
        // Uniform branching is an approximation; these are the counts the
        // heuristic must produce, not exact row counts.
        let (schema, est) = estimator();
        let required: RequiredTables = [tid(&schema, "items")].into();
        let counts = group_scan_table_counts_to_limit(&est, &required, 50)
            .unwrap()
            .unwrap();
        assert_eq!(counts[&tid(&schema, "items")], 50);
        assert_eq!(counts[&tid(&schema, "orders")], 5);
        assert_eq!(counts[&tid(&schema, "customers")], 1);
        assert_eq!(counts.len(), 3);

        assert!(group_scan_table_counts_to_limit(&est, &required, 1000)
            .unwrap()
            .is_none());
        assert!(group_scan_table_counts_to_limit(&est, &RequiredTables::new(), 5)
            .unwrap()
            .is_none());
    }

    #[test]
    fn partial_group_scales_later_siblings_down() {
        let id = |n: &str| Column::new(n, DataType::Int);
        let mut b = SchemaBuilder::new();
        b.table("c", None, vec![id("cid")], &["cid"])
            .table("o", Some("c"), vec![id("oid")], &["oid"])
            .table("a", Some("c"), vec![id("aid")], &["aid"]);
        let schema = Arc::new(b.build().unwrap());
        let oracle = Arc::new(
            StaticRowCounts::new()
                .with(tid(&schema, "c"), 10)
                .with(tid(&schema, "o"), 100)
                .with(tid(&schema, "a"), 40),
        );
        let model =
            StoreCostModel::new(schema.clone(), oracle.as_ref(), OperatorCosts::default()).unwrap();
        let est = CostEstimator::new(Arc::new(model), oracle, EstimatorConfig::default());
        let required: RequiredTables = [tid(&schema, "o")].into();
        let counts = group_scan_table_counts_to_limit(&est, &required, 50)
            .unwrap()
            .unwrap();
        assert_eq!(counts[&tid(&schema, "c")], 5);
        // Ordered after the last required table: one fewer customer's worth.
        assert_eq!(counts[&tid(&schema, "a")], simple_round(40 * 4, 10));
    }

    #[test]
    fn group_scan_without_limit_is_full_scan_and_flatten() {
        let (schema, est) = estimator();
        let group = schema.groups()[0].id;
        let tree = TableGroupJoinTree::for_group(&schema, group).unwrap();
        let required: RequiredTables = [tid(&schema, "customers")].into();
        let mut p = PlanCostEstimator::new(&est);
        p.group_scan(GroupScan { group }, tree.clone(), required.clone());
        let full = p.cost_estimate().unwrap();
        let expected = est
            .cost_group_scan(group)
            .unwrap()
            .sequence(&est.cost_flatten_group(&tree, &required).unwrap());
        assert_eq!(full, expected);

        // Ten customers fit under the limit; the whole group is read.
        assert_eq!(cost_with_limit(&mut p, 20), full);
        let partial = cost_with_limit(&mut p, 5);
        assert!(partial.cost() < full.cost());
    }

    #[test]
    fn select_asks_input_for_more_rows() {
        let (schema, est) = estimator();
        let conditions = vec![Condition::Comparison {
            left: Expr::Parameter(0),
            right: Expr::number(3),
        }];
        let mut p = PlanCostEstimator::new(&est);
        p.index_scan(total_scan(&schema))
            .select(conditions.clone(), 0.5)
            .unwrap();
        let limited = cost_with_limit(&mut p, 10);

        let mut input = PlanCostEstimator::new(&est);
        input.index_scan(total_scan(&schema));
        let twenty = cost_with_limit(&mut input, 20);
        let expected = twenty.sequence(&est.cost_select(&conditions, 0.5, 20));
        assert_eq!(limited, expected);
        assert_eq!(limited.row_count(), 10);
    }

    #[test]
    fn sort_uses_limit_law_only_under_threshold() {
        let (schema, est) = estimator();
        let threshold = est.config().insertion_sort_max_limit;
        let mut p = PlanCostEstimator::new(&est);
        p.index_scan(total_scan(&schema)).sort(2).unwrap();
        let input = est
            .cost_index_scan(schema.index_named("order_total").unwrap(), &[], None, None)
            .unwrap();

        let small = cost_with_limit(&mut p, 7);
        assert_eq!(small, input.sequence(&est.cost_sort_with_limit(100, 7, 2)));
        assert_eq!(small.row_count(), 7);

        let at = cost_with_limit(&mut p, threshold);
        assert_eq!(at, input.sequence(&est.cost_sort_with_limit(100, 100, 2)));

        let over = cost_with_limit(&mut p, threshold + 1);
        assert_eq!(over, input.sequence(&est.cost_sort(100)));
        assert_eq!(cost_with_limit(&mut p, 0), over);
    }

    #[test]
    fn fixed_formula_nodes() {
        let (_, est) = estimator();
        let mut p = PlanCostEstimator::new(&est);
        p.full_text_scan(FullTextScan { limit: 0 });
        assert_eq!(p.cost_estimate().unwrap(), CostEstimate::new(1, 1.0));
        p.full_text_scan(FullTextScan { limit: 30 });
        assert_eq!(p.cost_estimate().unwrap(), CostEstimate::new(30, 1.0));
        p.hkey_row(2);
        assert_eq!(p.cost_estimate().unwrap(), est.cost_hkey_row(2));
    }

    #[test]
    fn combinators_need_input() {
        let (_, est) = estimator();
        let mut p = PlanCostEstimator::new(&est);
        assert!(matches!(p.sort(1), Err(Error::MissingInput("sort"))));
        assert!(matches!(p.cost_estimate(), Err(Error::MissingInput(_))));
        assert!(p.set_limit(3).is_err());
    }

    /// Store model that counts tree-scan evaluations.
    struct CountingModel {
        inner: StoreCostModel,
        calls: AtomicUsize,
    }

    impl CostModel for CountingModel {
        fn base(&self) -> &ModelBase {
            self.inner.base()
        }

        fn tree_scan(&self, row_width: u32, n_rows: u64) -> f64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.tree_scan(row_width, n_rows)
        }
    }

    #[test]
    fn estimate_is_computed_once_per_limit() {
        let schema = schema();
        let oracle = Arc::new(counts(&schema));
        let model = Arc::new(CountingModel {
            inner: StoreCostModel::new(schema.clone(), oracle.as_ref(), OperatorCosts::default())
                .unwrap(),
            calls: AtomicUsize::new(0),
        });
        let est = CostEstimator::new(model.clone(), oracle, EstimatorConfig::default());
        let mut p = PlanCostEstimator::new(&est);
        p.index_scan(total_scan(&schema)).sort(1).unwrap();

        let first = p.cost_estimate().unwrap();
        let after_first = model.calls.load(Ordering::SeqCst);
        assert!(after_first > 0);
        let second = p.cost_estimate().unwrap();
        assert_eq!(first.cost().to_bits(), second.cost().to_bits());
        assert_eq!(first, second);
        assert_eq!(model.calls.load(Ordering::SeqCst), after_first);

        // A new limit on the sort re-evaluates the sort only; its input keeps
        // its unlimited estimate.
        p.set_limit(5).unwrap();
        p.cost_estimate().unwrap();
        assert_eq!(model.calls.load(Ordering::SeqCst), after_first);
    }
}
