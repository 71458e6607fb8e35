#![forbid(unsafe_code)]
//! costwise-core: shared vocabulary for the plan cost estimator.
//!
//! Responsibilities:
//! - Strongly-typed ids for groups, tables, indexes, and row types.
//! - The catalog slice the estimator reads (`Schema`) and the row-count oracle.
//! - `CostEstimate` and its composition operators.
//! - Errors and configuration (calibration constants, thresholds).
//!
//! **No formulas, no plan shapes** here. `costwise-model` prices primitives,
//! `costwise-planner` walks plans.

pub mod config;
pub mod error;
pub mod estimate;
pub mod id;
pub mod oracle;
pub mod prelude;
pub mod schema;

pub use error::{Error, Result};
pub use estimate::CostEstimate;
