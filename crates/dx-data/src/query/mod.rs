//! Push-down filtering through an SQL query engine

pub mod sql;

use arrow::record_batch::RecordBatch;
use dx_core::Frame;

use crate::DataError;

pub use sql::{build_resample_query, quote_identifier, quote_literal};

/// SQL engine that holds registered frames as tables
pub trait QueryConnector: Send + Sync {
    /// Store `frame` as table `name`, index included, replacing any table
    /// of the same name
    fn register_table(&self, name: &str, frame: &Frame) -> Result<(), DataError>;

    /// Whether a table of that name is registered
    fn has_table(&self, name: &str) -> Result<bool, DataError>;

    /// Run a query and collect the result in engine-native types
    fn execute(&self, sql: &str) -> Result<RecordBatch, DataError>;

    /// Engine name used in logs
    fn engine_name(&self) -> &str;
}
