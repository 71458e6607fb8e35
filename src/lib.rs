#![forbid(unsafe_code)]
//! costwise: physical-plan cost estimation for a SQL optimizer.
//!
//! The workspace is split the same way the estimate is built:
//! - `costwise-core`: catalog slice, row-count oracle, `CostEstimate`, config, errors.
//! - `costwise-model`: per-row-shape statistics and one formula per physical primitive.
//! - `costwise-planner`: plan-shape descriptors, the cost estimator service, and
//!   the limit-propagating plan estimator chain.
//!
//! This crate wires them together: pick a model from the config and hand it
//! to a `CostEstimator`.

use std::sync::Arc;

pub use costwise_core::{CostEstimate, Error, Result};
pub use costwise_planner::{CostEstimator, PlanCostEstimator};

use costwise_core::config::EstimatorConfig;
use costwise_core::oracle::RowCountOracle;
use costwise_core::schema::Schema;
use costwise_model::{CostModel, RandomCostModel, SharedRng, StoreCostModel};

/// The calibrated store model, or the randomized one when `config` carries a
/// seed. The randomized model serializes draws on one generator; callers
/// costing plans on several threads share that lock.
pub fn new_cost_model(
    schema: Arc<Schema>,
    oracle: &dyn RowCountOracle,
    config: &EstimatorConfig,
) -> Result<Arc<dyn CostModel>> {
    let costs = config.costs;
    Ok(match config.random_seed {
        Some(seed) => Arc::new(RandomCostModel::new(
            schema,
            oracle,
            costs,
            SharedRng::seeded(seed),
        )?),
        None => Arc::new(StoreCostModel::new(schema, oracle, costs)?),
    })
}

/// Model plus estimator service for one schema snapshot.
pub fn new_cost_estimator(
    schema: Arc<Schema>,
    oracle: Arc<dyn RowCountOracle>,
    config: EstimatorConfig,
) -> Result<CostEstimator> {
    let model = new_cost_model(schema, oracle.as_ref(), &config)?;
    Ok(CostEstimator::new(model, oracle, config))
}
