#![forbid(unsafe_code)]
//! costwise-model: statistics and cost formulas (structure → numbers).
//!
//! Responsibilities:
//! - Derive row count and calibrated row width for every table and index shape.
//! - Cache them once per schema snapshot.
//! - Price each physical primitive (scans, lookups, sort, select, flatten, ...).
//! - Offer a seeded randomized variant for plan-selection robustness tests.
//!
//! **No plan shapes** here. The planner crate decides which primitives a plan uses.

pub mod model;
pub mod random;
pub mod stats;

pub use model::{CostModel, ModelBase, StoreCostModel};
pub use random::{RandomCostModel, SharedRng};
pub use stats::{field_width, StatisticsCache, TreeStatistics};
