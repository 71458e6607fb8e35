use thiserror::Error;

use crate::id::RowTypeId;

/// Canonical result for costwise.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The plan handed an index scan shape the estimator cannot cost.
    #[error("unsupported index scan: {0}")]
    UnsupportedIndexScan(String),

    #[error("unexpected function for spatial index: {0}")]
    UnexpectedSpatialFunction(String),

    #[error("operands for spatial index must all be constant numbers: {0}")]
    NonConstantSpatialOperand(String),

    /// The cost model was built from a schema snapshot that lacks this row type.
    #[error("no statistics for row type {row_type} ({name})")]
    MissingStatistics { row_type: RowTypeId, name: String },

    #[error("{0} estimator requires an input estimator")]
    MissingInput(&'static str),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
