//! Payload and metadata construction
//!
//! A payload is keyed by its media type and carries a table schema, the
//! data, and a `datalink` naming the display slot:
//!
//! ```text
//! { "<media type>": { "schema": {...}, "data": ..., "datalink": {"display_id": "..."} } }
//! ```
//!
//! Simple mode sends row-major records with a synthetic index field. Enhanced
//! mode sends one array per column, index first.

use arrow::array::{Array, AsArray};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Number, Value};

use dx_core::{DisplayMode, FilterSpec, Frame, FrameDimensions, SampleSnapshot, TrackedDataset};
use dx_data::ReductionReport;

use crate::DisplayError;

/// Converts one cell into a JSON value
pub trait ValueNormalizer: Send + Sync {
    fn normalize(&self, array: &dyn Array, row: usize) -> Value;
}

/// [`value_to_json`] as a [`ValueNormalizer`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNormalizer;

impl ValueNormalizer for DefaultNormalizer {
    fn normalize(&self, array: &dyn Array, row: usize) -> Value {
        value_to_json(array, row)
    }
}

/// Native JSON for numbers, booleans and strings; non-finite floats become
/// null. Everything else, dates and timestamps included, goes through Arrow's
/// display formatter, which renders temporal values as ISO-8601.
pub fn value_to_json(array: &dyn Array, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    match array.data_type() {
        DataType::Boolean => Value::Bool(array.as_boolean().value(row)),
        DataType::Int8 => Value::from(array.as_primitive::<Int8Type>().value(row)),
        DataType::Int16 => Value::from(array.as_primitive::<Int16Type>().value(row)),
        DataType::Int32 => Value::from(array.as_primitive::<Int32Type>().value(row)),
        DataType::Int64 => Value::from(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Value::from(array.as_primitive::<UInt8Type>().value(row)),
        DataType::UInt16 => Value::from(array.as_primitive::<UInt16Type>().value(row)),
        DataType::UInt32 => Value::from(array.as_primitive::<UInt32Type>().value(row)),
        DataType::UInt64 => Value::from(array.as_primitive::<UInt64Type>().value(row)),
        DataType::Float32 => float(array.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => float(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => Value::String(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::String(array.as_string::<i64>().value(row).to_string()),
        _ => formatted(array, row),
    }
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn formatted(array: &dyn Array, row: usize) -> Value {
    match ArrayFormatter::try_new(array, &FormatOptions::default()) {
        Ok(formatter) => Value::String(formatter.value(row).to_string()),
        Err(_) => Value::Null,
    }
}

/// Name of the synthetic index field, `level_0` when a column already
/// uses `index`
pub fn index_field_name(frame: &Frame) -> &'static str {
    if frame.column("index").is_some() {
        "level_0"
    } else {
        "index"
    }
}

/// Table-schema type name for an Arrow type
fn field_type(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Boolean => "boolean",
        dt if dt.is_integer() => "integer",
        dt if dt.is_floating() || matches!(dt, DataType::Decimal128(_, _) | DataType::Decimal256(_, _)) => {
            "number"
        }
        DataType::Date32 | DataType::Date64 => "date",
        DataType::Timestamp(_, _) => "datetime",
        DataType::Time32(_) | DataType::Time64(_) => "time",
        DataType::Duration(_) | DataType::Interval(_) => "duration",
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => "string",
        _ => "any",
    }
}

/// Table schema of `frame`, the index field first
pub fn table_schema(frame: &Frame) -> Value {
    let index_field = index_field_name(frame);
    let mut fields = vec![json!({
        "name": index_field,
        "type": field_type(frame.index().data_type()),
        "arrow_type": frame.index().data_type().to_string(),
    })];
    for field in frame.schema().fields() {
        fields.push(json!({
            "name": field.name(),
            "type": field_type(field.data_type()),
            "arrow_type": field.data_type().to_string(),
        }));
    }

    json!({
        "fields": fields,
        "primaryKey": [index_field],
        "index_name": frame.index_name(),
    })
}

fn records(frame: &Frame, normalizer: &dyn ValueNormalizer) -> Value {
    let index_field = index_field_name(frame);
    let names = frame.column_names();
    let columns = frame.batch().columns();

    let rows = (0..frame.num_rows())
        .map(|row| {
            let mut record = Map::with_capacity(names.len() + 1);
            record.insert(index_field.to_string(), normalizer.normalize(frame.index().as_ref(), row));
            for (name, column) in names.iter().zip(columns) {
                record.insert(name.clone(), normalizer.normalize(column.as_ref(), row));
            }
            Value::Object(record)
        })
        .collect();
    Value::Array(rows)
}

fn column_arrays(frame: &Frame, normalizer: &dyn ValueNormalizer) -> Value {
    let column = |array: &dyn Array| -> Value {
        Value::Array((0..array.len()).map(|row| normalizer.normalize(array, row)).collect())
    };

    let mut arrays = Vec::with_capacity(frame.num_columns() + 1);
    arrays.push(column(frame.index().as_ref()));
    arrays.extend(frame.batch().columns().iter().map(|c| column(c.as_ref())));
    Value::Array(arrays)
}

/// Payload for `frame` keyed by `media_type`
pub fn build_payload(
    frame: &Frame,
    mode: DisplayMode,
    media_type: &str,
    display_slot: &str,
    normalizer: &dyn ValueNormalizer,
) -> Value {
    let data = match mode {
        DisplayMode::Simple => records(frame, normalizer),
        DisplayMode::Enhanced => column_arrays(frame, normalizer),
    };

    let mut body = Map::new();
    body.insert("schema".to_string(), table_schema(frame));
    body.insert("data".to_string(), data);
    body.insert("datalink".to_string(), json!({ "display_id": display_slot }));

    let mut payload = Map::new();
    payload.insert(media_type.to_string(), Value::Object(body));
    Value::Object(payload)
}

/// Sizes of the displayed frame before and after reduction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DataFrameInfo {
    pub orig_size_bytes: usize,
    pub orig_num_rows: usize,
    pub orig_num_cols: usize,
    pub truncated_size_bytes: usize,
    pub truncated_num_rows: usize,
    pub truncated_num_cols: usize,
    pub truncated: bool,
}

impl From<&ReductionReport> for DataFrameInfo {
    fn from(report: &ReductionReport) -> Self {
        Self {
            orig_size_bytes: report.before.size_bytes,
            orig_num_rows: report.before.num_rows,
            orig_num_cols: report.before.num_cols,
            truncated_size_bytes: report.after.size_bytes,
            truncated_num_rows: report.after.num_rows,
            truncated_num_cols: report.after.num_cols,
            truncated: report.is_truncated(),
        }
    }
}

/// Metadata sent alongside a payload under the `datalink` key
#[derive(Debug, Clone, Serialize)]
pub struct DisplayMetadata {
    pub display_id: String,
    pub variable_name: Option<String>,
    pub dataframe_info: DataFrameInfo,
    /// Dimensions of the full tracked dataset
    pub dataset_dimensions: Option<FrameDimensions>,
    pub applied_filters: Vec<FilterSpec>,
    pub sample_history: Vec<SampleSnapshot>,
    pub sampling_time: DateTime<Utc>,
    pub sampling_duration_ms: f64,
    pub display_mode: DisplayMode,
    pub tracked: bool,
}

impl DisplayMetadata {
    pub fn new(
        display_slot: &str,
        dataset: Option<&TrackedDataset>,
        report: &ReductionReport,
        mode: DisplayMode,
    ) -> Self {
        Self {
            display_id: display_slot.to_string(),
            variable_name: dataset.map(|d| d.variable_name.clone()),
            dataframe_info: DataFrameInfo::from(report),
            dataset_dimensions: dataset.map(|d| d.original_dimensions),
            applied_filters: dataset.map(|d| d.applied_filters.clone()).unwrap_or_default(),
            sample_history: dataset
                .map(|d| d.sample_history.iter().cloned().collect())
                .unwrap_or_default(),
            sampling_time: Utc::now(),
            sampling_duration_ms: report.sampling_time.as_secs_f64() * 1000.0,
            display_mode: mode,
            tracked: dataset.is_some(),
        }
    }
}

/// Metadata envelope for a rendered payload
pub fn build_metadata(
    display_slot: &str,
    dataset: Option<&TrackedDataset>,
    report: &ReductionReport,
    mode: DisplayMode,
) -> Result<Value, DisplayError> {
    let metadata = DisplayMetadata::new(display_slot, dataset, report, mode);
    Ok(json!({ "datalink": serde_json::to_value(metadata)? }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{BooleanArray, Date32Array, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;
    use std::time::Duration;

    fn frame() -> Frame {
        let schema = Arc::new(Schema::new(vec![
            Field::new("n", DataType::Int64, true),
            Field::new("x", DataType::Float64, true),
            Field::new("s", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(1), None])),
                Arc::new(Float64Array::from(vec![1.5, f64::NAN])),
                Arc::new(StringArray::from(vec!["a", "b"])),
            ],
        )
        .unwrap();
        Frame::new(batch)
    }

    #[test]
    fn test_value_normalization() {
        let dates = Date32Array::from(vec![18628]);
        assert_eq!(value_to_json(&dates, 0), json!("2021-01-01"));

        let flags = BooleanArray::from(vec![Some(true), None]);
        assert_eq!(value_to_json(&flags, 0), json!(true));
        assert_eq!(value_to_json(&flags, 1), Value::Null);

        let floats = Float64Array::from(vec![f64::INFINITY, 2.25]);
        assert_eq!(value_to_json(&floats, 0), Value::Null);
        assert_eq!(value_to_json(&floats, 1), json!(2.25));
    }

    #[test]
    fn test_simple_payload() {
        let payload = build_payload(&frame(), DisplayMode::Simple, "x/simple", "slot-1", &DefaultNormalizer);
        let body = &payload["x/simple"];

        assert_eq!(body["datalink"]["display_id"], "slot-1");
        assert_eq!(body["schema"]["primaryKey"], json!(["index"]));
        assert_eq!(body["schema"]["fields"][0]["name"], "index");
        assert_eq!(body["schema"]["fields"][2]["type"], "number");
        assert_eq!(body["data"][0], json!({"index": 0, "n": 1, "x": 1.5, "s": "a"}));
        assert_eq!(body["data"][1], json!({"index": 1, "n": null, "x": null, "s": "b"}));
    }

    #[test]
    fn test_enhanced_payload_is_column_major() {
        let payload = build_payload(&frame(), DisplayMode::Enhanced, "x/enh", "slot-1", &DefaultNormalizer);
        let data = &payload["x/enh"]["data"];
        assert_eq!(data, &json!([[0, 1], [1, null], [1.5, null], ["a", "b"]]));
    }

    #[test]
    fn test_index_name_collision() {
        let schema = Arc::new(Schema::new(vec![Field::new("index", DataType::Int64, false)]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![9]))]).unwrap();
        let payload = build_payload(&Frame::new(batch), DisplayMode::Simple, "m", "s", &DefaultNormalizer);
        assert_eq!(payload["m"]["data"][0], json!({"level_0": 0, "index": 9}));
    }

    #[test]
    fn test_untracked_metadata() {
        let dims = FrameDimensions { size_bytes: 100, num_rows: 10, num_cols: 2 };
        let report = ReductionReport {
            before: dims,
            after: FrameDimensions { num_rows: 5, ..dims },
            byte_steps: 0,
            sampling_time: Duration::from_millis(3),
        };
        let metadata = build_metadata("s", None, &report, DisplayMode::Simple).unwrap();
        let link = &metadata["datalink"];
        assert_eq!(link["display_id"], "s");
        assert_eq!(link["tracked"], false);
        assert_eq!(link["variable_name"], Value::Null);
        assert_eq!(link["dataframe_info"]["truncated_num_rows"], 5);
        assert_eq!(link["dataframe_info"]["truncated"], true);
        assert_eq!(link["display_mode"], "simple");
    }
}
