//! CSV loading into frames

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use arrow::array::*;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use csv::ReaderBuilder;
use tracing::info;

use dx_core::Frame;

use crate::schema::{parse_bool, parse_timestamp, SchemaDetector, DATE_FORMAT};
use crate::DataError;

/// Options for reading a CSV file
#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub has_headers: bool,
    pub delimiter: u8,
    /// Column promoted to the frame index
    pub index_column: Option<String>,
    /// Rows sampled for type detection
    pub sample_size: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            has_headers: true,
            delimiter: b',',
            index_column: None,
            sample_size: 5000,
        }
    }
}

/// Reads CSV data into a [`Frame`]
pub struct CsvSource;

impl CsvSource {
    /// Load a CSV file
    pub fn load<P: AsRef<Path>>(path: P, options: &CsvOptions) -> Result<Frame, DataError> {
        let path = path.as_ref();
        info!("Loading CSV {:?}", path);
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), options)
    }

    /// Load CSV data from any reader
    pub fn from_reader<R: Read>(reader: R, options: &CsvOptions) -> Result<Frame, DataError> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(options.has_headers)
            .delimiter(options.delimiter)
            .flexible(true)
            .from_reader(reader);

        let mut row_data: Vec<Vec<String>> = Vec::new();
        for result in csv_reader.records() {
            let record = result?;
            row_data.push(record.iter().map(|s| s.to_string()).collect());
        }

        let headers: Vec<String> = if options.has_headers {
            csv_reader.headers()?.iter().map(|h| h.to_string()).collect()
        } else {
            let width = row_data.iter().map(Vec::len).max().unwrap_or(0);
            (0..width).map(|i| format!("column_{}", i)).collect()
        };

        let detector = SchemaDetector::new().with_sample_size(options.sample_size);
        let schema = Arc::new(detector.detect_from_samples(&headers, &row_data));

        let columns = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(col_idx, field)| Self::build_column(&detector, &row_data, col_idx, field.data_type()))
            .collect::<Vec<_>>();

        let batch = RecordBatch::try_new(schema.clone(), columns)?;
        let frame = Frame::new(batch);

        match &options.index_column {
            Some(column) => Ok(frame.set_index(column)?),
            None => Ok(frame),
        }
    }

    /// Build one Arrow column from text cells; unparseable cells become null
    fn build_column(
        detector: &SchemaDetector,
        row_data: &[Vec<String>],
        col_idx: usize,
        data_type: &DataType,
    ) -> ArrayRef {
        let cells = row_data.iter().map(|row| {
            row.get(col_idx)
                .map(|v| v.trim())
                .filter(|v| !detector.is_null(v))
        });

        match data_type {
            DataType::Int64 => Arc::new(
                cells
                    .map(|v| v.and_then(|v| v.parse::<i64>().ok()))
                    .collect::<Int64Array>(),
            ),
            DataType::Float64 => Arc::new(
                cells
                    .map(|v| v.and_then(|v| v.parse::<f64>().ok()))
                    .collect::<Float64Array>(),
            ),
            DataType::Boolean => Arc::new(
                cells
                    .map(|v| v.and_then(parse_bool))
                    .collect::<BooleanArray>(),
            ),
            DataType::Date32 => {
                let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
                Arc::new(
                    cells
                        .map(|v| {
                            v.and_then(|v| NaiveDate::parse_from_str(v, DATE_FORMAT).ok())
                                .map(|d| (d - epoch).num_days() as i32)
                        })
                        .collect::<Date32Array>(),
                )
            }
            DataType::Timestamp(_, _) => Arc::new(
                cells
                    .map(|v| {
                        v.and_then(parse_timestamp)
                            .map(|ts| ts.and_utc().timestamp_millis())
                    })
                    .collect::<TimestampMillisecondArray>(),
            ),
            _ => Arc::new(cells.collect::<StringArray>()),
        }
    }
}
