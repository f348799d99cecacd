//! Column type handling: detection from text samples and restoration of
//! original types after sampling or a query-engine round trip

use arrow::array::Array;
use arrow::compute::{can_cast_types, cast_with_options, CastOptions};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use tracing::warn;

use dx_core::{Frame, FrameError};

/// Timestamp layouts recognised in text data
pub const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Date layout recognised in text data
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Schema detector for analyzing text samples and determining column types
pub struct SchemaDetector {
    sample_size: usize,
    null_patterns: Vec<String>,
}

impl SchemaDetector {
    /// Create a new schema detector
    pub fn new() -> Self {
        Self {
            sample_size: 1000,
            null_patterns: ["", "-", "n/a", "na", "null", "none", "nan"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Set the sample size for detection
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size;
        self
    }

    /// Check if a value should be treated as null
    pub fn is_null(&self, value: &str) -> bool {
        let value = value.trim();
        self.null_patterns.iter().any(|p| value.eq_ignore_ascii_case(p))
    }

    /// Detect a schema from sample rows
    pub fn detect_from_samples(&self, headers: &[String], samples: &[Vec<String>]) -> Schema {
        let fields: Vec<Field> = headers
            .iter()
            .enumerate()
            .map(|(col_idx, header)| Field::new(header, self.detect_column_type(samples, col_idx), true))
            .collect();
        Schema::new(fields)
    }

    /// Detect the type of a single column
    pub fn detect_column_type(&self, samples: &[Vec<String>], col_idx: usize) -> DataType {
        let mut is_bool = true;
        let mut is_int = true;
        let mut is_float = true;
        let mut is_date = true;
        let mut is_timestamp = true;
        let mut seen = 0usize;

        for row in samples.iter().take(self.sample_size) {
            let Some(value) = row.get(col_idx) else {
                continue;
            };
            if self.is_null(value) {
                continue;
            }
            seen += 1;
            let value = value.trim();

            if is_bool && parse_bool(value).is_none() {
                is_bool = false;
            }
            if is_int && value.parse::<i64>().is_err() {
                is_int = false;
            }
            if is_float && value.parse::<f64>().is_err() {
                is_float = false;
            }
            if is_date && NaiveDate::parse_from_str(value, DATE_FORMAT).is_err() {
                is_date = false;
            }
            if is_timestamp && parse_timestamp(value).is_none() {
                is_timestamp = false;
            }
        }

        if seen == 0 {
            DataType::Utf8
        } else if is_bool {
            DataType::Boolean
        } else if is_int {
            DataType::Int64
        } else if is_float {
            DataType::Float64
        } else if is_date {
            DataType::Date32
        } else if is_timestamp {
            DataType::Timestamp(TimeUnit::Millisecond, None)
        } else {
            DataType::Utf8
        }
    }
}

impl Default for SchemaDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// `true`/`false` in any case
pub fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Parse any of [`TIMESTAMP_FORMATS`]
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Cast every column of `frame` whose type differs from `original` back to
/// its original type.
///
/// Columns missing from `original` or from the frame are left alone. A column
/// that cannot be cast keeps its current type and is reported in the returned
/// list instead of failing the whole frame.
pub fn restore_column_types(
    frame: &Frame,
    original: &IndexMap<String, DataType>,
) -> Result<(Frame, Vec<(String, ArrowError)>), FrameError> {
    let mut restored = frame.clone();
    let mut failures = Vec::new();

    for (name, current_type) in frame.column_types() {
        let Some(target) = original.get(&name) else {
            continue;
        };
        if &current_type == target {
            continue;
        }
        let Some(column) = frame.column(&name) else {
            continue;
        };

        match cast_strict(column.as_ref(), target) {
            Ok(array) => restored = restored.replace_column(&name, array)?,
            Err(e) => {
                warn!("Could not restore column '{}' from {} to {}: {}", name, current_type, target, e);
                failures.push((name, e));
            }
        }
    }

    Ok((restored, failures))
}

/// Cast that fails instead of silently nulling unconvertible values
pub fn cast_strict(array: &dyn Array, target: &DataType) -> Result<arrow::array::ArrayRef, ArrowError> {
    if !can_cast_types(array.data_type(), target) {
        return Err(ArrowError::CastError(format!(
            "unsupported cast from {} to {}",
            array.data_type(),
            target
        )));
    }
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    cast_with_options(array, target, &options)
}
