//! Convenient re-exports for downstream crates.

pub use crate::config::{EstimatorConfig, OperatorCosts};
pub use crate::error::{Error, Result};
pub use crate::estimate::CostEstimate;
pub use crate::id::{GroupId, IndexId, RowTypeId, TableId};
pub use crate::oracle::{RowCountOracle, StaticRowCounts};
pub use crate::schema::{
    Column, ColumnRef, DataType, Group, Index, IndexKind, Schema, SchemaBuilder, Table,
};
