#![forbid(unsafe_code)]
//! costwise-planner: plan shapes → `CostEstimate`.
//!
//! Design:
//! - `plan` holds the thin plan-shape descriptors the optimizer hands over
//!   (index comparands, group join trees, required tables, conditions).
//! - `cost::CostEstimator` prices those shapes with a shared `CostModel`:
//!   sized index scans, intersections, flattens, group scans, selects, sorts.
//! - `plan_cost::PlanCostEstimator` chains one node per physical operator and
//!   pushes a row limit down through the chain before reading costs.
//! - `spatial` decomposes lat/lon boxes into z-order cells for spatial scans.
//! - `dsl::yaml` loads catalog fixtures for tests and benchmarks.

pub mod cost;
pub mod dsl;
pub mod plan;
pub mod plan_cost;
pub mod spatial;

pub use cost::{simple_round, CostEstimator, DefaultScanSizer, IndexScanSizer};
pub use dsl::yaml::{parse_yaml_catalog, CatalogFixture};
pub use plan::{
    Bound, Condition, Expr, FullTextScan, GroupLoopScan, GroupScan, IndexScan,
    MultiIndexIntersectScan, RangeSegment, RequiredTables, SingleIndexScan, TableGroupJoinTree,
};
pub use plan_cost::{group_scan_table_counts_to_limit, PlanCostEstimator};
