//! Canonical tabular form
//!
//! Every object that reaches the display pipeline is converted into a
//! [`Frame`]: an Arrow record batch plus a row index. Row selections go through
//! `take`, so row labels travel with their rows and the memory footprint of a
//! selection shrinks with it.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, UInt64Array};
use arrow::compute::{concat_batches, take};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved column name the index is stored under outside of a [`Frame`]
pub const INDEX_COLUMN: &str = "__index__";

/// Reserved column query engines store the original row order under
pub const ROW_ORDER_COLUMN: &str = "__row_order__";

/// Errors that can occur while building or slicing frames
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Index has {actual} labels but the frame has {expected} rows")]
    IndexLength { expected: usize, actual: usize },

    #[error("Column '{0}' not found")]
    MissingColumn(String),
}

/// Row/column counts and estimated in-memory size of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub size_bytes: usize,
    pub num_rows: usize,
    pub num_cols: usize,
}

/// A record batch with a row index
#[derive(Debug, Clone)]
pub struct Frame {
    batch: RecordBatch,
    index: ArrayRef,
    index_name: Option<String>,
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.batch == other.batch
            && self.index.as_ref() == other.index.as_ref()
            && self.index_name == other.index_name
    }
}

impl Frame {
    /// Wrap a record batch with a positional `0..n` index
    pub fn new(batch: RecordBatch) -> Self {
        let index = positional_index(batch.num_rows());
        Self {
            batch,
            index,
            index_name: None,
        }
    }

    /// Wrap a record batch with explicit row labels
    pub fn with_index(
        batch: RecordBatch,
        index: ArrayRef,
        index_name: Option<String>,
    ) -> Result<Self, FrameError> {
        if index.len() != batch.num_rows() {
            return Err(FrameError::IndexLength {
                expected: batch.num_rows(),
                actual: index.len(),
            });
        }
        Ok(Self {
            batch,
            index,
            index_name,
        })
    }

    /// A frame with the given schema and no rows
    pub fn empty(schema: SchemaRef) -> Self {
        Self::new(RecordBatch::new_empty(schema))
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn index(&self) -> &ArrayRef {
        &self.index
    }

    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Get a column by name
    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    /// Column name to data type, in column order
    pub fn column_types(&self) -> IndexMap<String, DataType> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| (f.name().clone(), f.data_type().clone()))
            .collect()
    }

    /// Select rows by position, keeping their labels
    pub fn take_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        let indices = UInt64Array::from_iter_values(positions.iter().map(|&p| p as u64));
        let columns = self
            .batch
            .columns()
            .iter()
            .map(|c| take(c.as_ref(), &indices, None))
            .collect::<Result<Vec<_>, _>>()?;
        let options = RecordBatchOptions::new().with_row_count(Some(positions.len()));
        let batch = RecordBatch::try_new_with_options(self.batch.schema(), columns, &options)?;
        let index = take(self.index.as_ref(), &indices, None)?;

        Ok(Self {
            batch,
            index,
            index_name: self.index_name.clone(),
        })
    }

    /// Select columns by position; the index is unaffected
    pub fn select_columns(&self, positions: &[usize]) -> Result<Self, FrameError> {
        Ok(Self {
            batch: self.batch.project(positions)?,
            index: self.index.clone(),
            index_name: self.index_name.clone(),
        })
    }

    /// Replace the array of one column, updating its field type to match
    pub fn replace_column(&self, name: &str, array: ArrayRef) -> Result<Self, FrameError> {
        let schema = self.batch.schema();
        let position = schema
            .index_of(name)
            .map_err(|_| FrameError::MissingColumn(name.to_string()))?;

        let fields: Vec<Field> = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| {
                if i == position {
                    f.as_ref()
                        .clone()
                        .with_data_type(array.data_type().clone())
                        .with_nullable(true)
                } else {
                    f.as_ref().clone()
                }
            })
            .collect();
        let mut columns = self.batch.columns().to_vec();
        columns[position] = array;

        let options = RecordBatchOptions::new().with_row_count(Some(self.num_rows()));
        let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
        let batch = RecordBatch::try_new_with_options(schema, columns, &options)?;

        Ok(Self {
            batch,
            index: self.index.clone(),
            index_name: self.index_name.clone(),
        })
    }

    /// Replace the index labels and name
    pub fn replace_index(
        &self,
        index: ArrayRef,
        index_name: Option<String>,
    ) -> Result<Self, FrameError> {
        Self::with_index(self.batch.clone(), index, index_name)
    }

    /// Promote a column to be the index
    pub fn set_index(&self, column: &str) -> Result<Self, FrameError> {
        let position = self
            .batch
            .schema()
            .index_of(column)
            .map_err(|_| FrameError::MissingColumn(column.to_string()))?;
        let mut batch = self.batch.clone();
        let index = batch.remove_column(position);
        Self::with_index(batch, index, Some(column.to_string()))
    }

    /// Flatten to a record batch with the index stored as [`INDEX_COLUMN`]
    pub fn to_batch_with_index(&self) -> Result<RecordBatch, FrameError> {
        let schema = self.batch.schema();
        let mut fields = Vec::with_capacity(schema.fields().len() + 1);
        fields.push(Field::new(INDEX_COLUMN, self.index.data_type().clone(), true));
        fields.extend(schema.fields().iter().map(|f| f.as_ref().clone()));

        let mut columns = Vec::with_capacity(fields.len());
        columns.push(self.index.clone());
        columns.extend(self.batch.columns().iter().cloned());

        let options = RecordBatchOptions::new().with_row_count(Some(self.num_rows()));
        Ok(RecordBatch::try_new_with_options(
            Arc::new(Schema::new(fields)),
            columns,
            &options,
        )?)
    }

    /// Inverse of [`Frame::to_batch_with_index`]. Batches without an
    /// [`INDEX_COLUMN`] get a positional index; a [`ROW_ORDER_COLUMN`] is
    /// dropped.
    pub fn from_batch_with_index(
        batch: RecordBatch,
        index_name: Option<String>,
    ) -> Result<Self, FrameError> {
        let mut batch = batch;
        if let Ok(position) = batch.schema().index_of(ROW_ORDER_COLUMN) {
            batch.remove_column(position);
        }
        match batch.schema().index_of(INDEX_COLUMN) {
            Ok(position) => {
                let index = batch.remove_column(position);
                Self::with_index(batch, index, index_name)
            }
            Err(_) => Ok(Self::new(batch)),
        }
    }
}

fn positional_index(num_rows: usize) -> ArrayRef {
    Arc::new(Int64Array::from_iter_values(0..num_rows as i64))
}

/// Conversion of displayable objects into the canonical tabular form
pub trait IntoFrame {
    fn into_frame(self) -> Result<Frame, FrameError>;
}

impl IntoFrame for Frame {
    fn into_frame(self) -> Result<Frame, FrameError> {
        Ok(self)
    }
}

impl IntoFrame for RecordBatch {
    fn into_frame(self) -> Result<Frame, FrameError> {
        Ok(Frame::new(self))
    }
}

impl IntoFrame for Vec<RecordBatch> {
    fn into_frame(self) -> Result<Frame, FrameError> {
        match self.first() {
            Some(first) => {
                let schema = first.schema();
                Ok(Frame::new(concat_batches(&schema, &self)?))
            }
            None => Ok(Frame::empty(Arc::new(Schema::empty()))),
        }
    }
}
