//! Data handling for the dx display formatter: size estimation, sampling,
//! reduction and the query-engine connectors

pub mod memory;
pub mod query;
pub mod reduce;
pub mod sampling;
pub mod schema;
pub mod sources;

use arrow::error::ArrowError;
use dx_core::FrameError;
use thiserror::Error;

// Re-exports
pub use memory::estimate;
pub use query::{build_resample_query, QueryConnector};
pub use reduce::{reduce, reduce_with_report, Axis, ReduceError, ReductionLimits, ReductionReport};
pub use sampling::{seed_from_slot, SamplingStrategy};
pub use schema::{restore_column_types, SchemaDetector};
pub use sources::{CsvOptions, CsvSource, SqliteConnector};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("SQLite error: {0}")]
    Sqlite(String),

    #[error("Schema detection error: {0}")]
    SchemaDetection(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<csv::Error> for DataError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => DataError::Io(std::io::Error::new(io_err.kind(), error.to_string())),
            _ => DataError::Csv(error.to_string()),
        }
    }
}
