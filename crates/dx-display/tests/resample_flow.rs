use std::sync::Arc;

use arrow::array::{Array, AsArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Int64Type, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use serde_json::json;

use dx_core::{Bindings, DisplayMode, DisplaySettings, FilterSpec, Frame, Resolution};
use dx_data::{CsvOptions, CsvSource, DataError, QueryConnector};
use dx_display::{DisplayError, DisplaySession, MemoryRenderer, ResampleRequest};

const SALES: &str = "\
city,price,sold,day,ts
Oslo,1.5,true,2021-01-01,2021-01-01 10:00:00
Paris,2.5,false,2021-01-02,2021-01-02 11:00:00
Oslo,3.5,true,2021-01-03,2021-01-03 12:00:00
Rome,4.5,false,2021-01-04,2021-01-04 13:00:00
Paris,5.5,true,2021-01-05,2021-01-05 14:00:00
";

fn sales() -> Frame {
    CsvSource::from_reader(SALES.as_bytes(), &CsvOptions::default()).unwrap()
}

fn session(settings: DisplaySettings) -> (DisplaySession, Arc<MemoryRenderer>) {
    let renderer = Arc::new(MemoryRenderer::new());
    let session = DisplaySession::in_memory(settings, renderer.clone()).unwrap();
    (session, renderer)
}

#[test]
fn resample_filters_and_updates_slot() {
    let (session, renderer) = session(DisplaySettings::default());
    let frame = Arc::new(sales());
    let mut bindings = Bindings::new();
    bindings.bind("sales", frame.clone());

    let shown = session.dispatcher().display(frame.as_ref().clone(), &bindings).unwrap();
    let slot = shown.display_slot.clone();
    assert_eq!(session.registry.get(&slot).unwrap().variable_name, "sales");

    let request = ResampleRequest::new(slot.clone(), vec![FilterSpec::metric("price", 2.0, 4.0)]);
    let result = session.resampler().resample(&request).unwrap();

    assert_eq!(result.num_rows(), 2);
    let labels = result.index().as_primitive::<Int64Type>();
    assert_eq!(labels.values().to_vec(), vec![1, 2]);

    let rendered = renderer.last().unwrap();
    assert!(rendered.is_update);
    assert_eq!(rendered.display_slot, slot);
    let link = &rendered.metadata["datalink"];
    assert_eq!(link["variable_name"], "sales");
    assert_eq!(link["applied_filters"][0]["type"], "METRIC_FILTER");
    assert_eq!(link["sample_history"].as_array().unwrap().len(), 1);
}

#[test]
fn column_types_survive_the_round_trip() {
    let (session, _renderer) = session(DisplaySettings::default());
    let shown = session.dispatcher().display(sales(), &Bindings::new()).unwrap();

    let request = ResampleRequest::new(
        shown.display_slot,
        vec![FilterSpec::date("ts", "2021-01-02", "2021-01-04T23:59:59")],
    );
    let result = session.resampler().resample(&request).unwrap();

    let types = result.column_types();
    assert_eq!(types["city"], DataType::Utf8);
    assert_eq!(types["price"], DataType::Float64);
    assert_eq!(types["sold"], DataType::Boolean);
    assert_eq!(types["day"], DataType::Date32);
    assert_eq!(types["ts"], DataType::Timestamp(TimeUnit::Millisecond, None));
    assert_eq!(result.index().data_type(), &DataType::Int64);
    assert_eq!(result.num_rows(), 3);
}

#[test]
fn displayed_subset_resolves_to_parent_slot() {
    let (session, renderer) = session(DisplaySettings::default());
    let dispatcher = session.dispatcher();
    let parent = dispatcher.display(sales(), &Bindings::new()).unwrap();

    let request = ResampleRequest {
        cell_id: Some("cell-7".to_string()),
        ..ResampleRequest::new(parent.display_slot.clone(), vec![FilterSpec::dimension("city", vec![json!("Oslo")])])
    };
    let subset = session.resampler().resample(&request).unwrap();
    assert_eq!(subset.num_rows(), 2);

    let shown = dispatcher.display(subset, &Bindings::new()).unwrap();
    let registration = shown.registration.unwrap();
    assert_eq!(registration.resolution, Resolution::Subset);
    assert_eq!(shown.display_slot, parent.display_slot);
    assert!(shown.is_update);
    assert_eq!(session.registry.len(), 1);
    assert_eq!(
        session.registry.parent_of_subset(&registration.content_hash),
        Some((parent.display_slot.clone(), Some("cell-7".to_string())))
    );
    assert_eq!(renderer.len(), 3);
}

#[test]
fn unfiltered_resample_does_not_link() {
    let (session, _renderer) = session(DisplaySettings::default());
    let shown = session.dispatcher().display(sales(), &Bindings::new()).unwrap();
    let dataset = session.registry.get(&shown.display_slot).unwrap();

    let result = session
        .resampler()
        .resample(&ResampleRequest::new(shown.display_slot.clone(), Vec::new()))
        .unwrap();
    let hash = dx_core::content_hash(&result).unwrap();

    assert_eq!(hash, dataset.content_hash);
    assert_eq!(session.registry.parent_of_subset(&hash), None);
}

#[test]
fn nan_subset_resolves_to_parent_slot() {
    let schema = Arc::new(Schema::new(vec![
        Field::new("city", DataType::Utf8, true),
        Field::new("price", DataType::Float64, true),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(vec!["Oslo", "Paris", "Oslo", "Rome"])),
            Arc::new(Float64Array::from(vec![f64::NAN, 2.0, 3.0, f64::NAN])),
        ],
    )
    .unwrap();
    let frame = Frame::new(batch);

    let (session, _renderer) = session(DisplaySettings::default());
    let dispatcher = session.dispatcher();
    let parent = dispatcher.display(frame.clone(), &Bindings::new()).unwrap();

    let request = ResampleRequest::new(
        parent.display_slot.clone(),
        vec![FilterSpec::dimension("city", vec![json!("Oslo")])],
    );
    let resampled = session.resampler().resample(&request).unwrap();
    assert_eq!(resampled.num_rows(), 2);

    let host_subset = frame.take_rows(&[0, 2]).unwrap();
    let shown = dispatcher.display(host_subset, &Bindings::new()).unwrap();
    assert_eq!(shown.registration.unwrap().resolution, Resolution::Subset);
    assert_eq!(shown.display_slot, parent.display_slot);
    assert_eq!(session.registry.len(), 1);
}

#[test]
fn history_depth_follows_settings() {
    let (session, _renderer) = session(DisplaySettings::default());
    let slot = session.dispatcher().display(sales(), &Bindings::new()).unwrap().display_slot;
    let resampler = session.resampler();
    for max in [2.0, 3.0, 4.0] {
        let request = ResampleRequest::new(slot.clone(), vec![FilterSpec::metric("price", 0.0, max)]);
        resampler.resample(&request).unwrap();
    }

    session.update_settings(|s| s.sample_history_depth = 1);
    let request = ResampleRequest::new(slot.clone(), vec![FilterSpec::metric("price", 0.0, 5.0)]);
    resampler.resample(&request).unwrap();

    let dataset = session.registry.get(&slot).unwrap();
    assert_eq!(dataset.sample_history.len(), 1);
    assert_eq!(session.registry.history_depth(), 1);
}

#[test]
fn sample_history_is_bounded() {
    let settings = DisplaySettings {
        sample_history_depth: 2,
        ..Default::default()
    };
    let (session, _renderer) = session(settings);
    let slot = session.dispatcher().display(sales(), &Bindings::new()).unwrap().display_slot;

    let resampler = session.resampler();
    for max in [2.0, 3.0, 4.0] {
        let request = ResampleRequest::new(slot.clone(), vec![FilterSpec::metric("price", 0.0, max)]);
        resampler.resample(&request).unwrap();
    }

    let dataset = session.registry.get(&slot).unwrap();
    assert_eq!(dataset.sample_history.len(), 2);
    let rows: Vec<usize> = dataset.sample_history.iter().map(|s| s.dimensions.num_rows).collect();
    assert_eq!(rows, vec![2, 3]);
    assert_eq!(dataset.applied_filters, vec![FilterSpec::metric("price", 0.0, 4.0)]);
}

#[test]
fn limit_and_reduction_apply_to_results() {
    let settings = DisplaySettings {
        max_rows: 2,
        row_sampling_strategy: "first".to_string(),
        display_mode: DisplayMode::Enhanced,
        ..Default::default()
    };
    let (session, renderer) = session(settings);
    let shown = session.dispatcher().display(sales(), &Bindings::new()).unwrap();
    assert_eq!(shown.frame.num_rows(), 2);
    assert!(shown.report.is_truncated());

    let request = ResampleRequest {
        limit: Some(4),
        ..ResampleRequest::new(shown.display_slot.clone(), Vec::new())
    };
    let result = session.resampler().resample(&request).unwrap();
    assert_eq!(result.num_rows(), 2);

    let rendered = renderer.last().unwrap();
    let body = &rendered.payload["application/vnd.dex.v1+json"];
    assert_eq!(body["data"][0], json!([0, 1]));
    assert_eq!(rendered.metadata["datalink"]["dataframe_info"]["orig_num_rows"], 4);
}

#[test]
fn unknown_slot_is_surfaced() {
    let (session, _renderer) = session(DisplaySettings::default());
    let request = ResampleRequest::new("nope", Vec::new());
    assert!(matches!(
        session.resampler().resample(&request),
        Err(DisplayError::UnknownDisplaySlot(slot)) if slot == "nope"
    ));
}

#[test]
fn malformed_message_is_dropped() {
    let (session, renderer) = session(DisplaySettings::default());
    let resampler = session.resampler();
    assert!(resampler.handle_message("{not json").unwrap().is_none());
    assert!(resampler
        .handle_message(r#"{"display_id": "x", "filters": [{"type": "NOPE"}]}"#)
        .unwrap()
        .is_none());
    assert!(renderer.is_empty());
}

#[test]
fn message_round_trip() {
    let (session, _renderer) = session(DisplaySettings::default());
    let slot = session.dispatcher().display(sales(), &Bindings::new()).unwrap().display_slot;

    let message = json!({
        "display_id": slot,
        "filters": [{"type": "DIMENSION_FILTER", "column": "city", "predicate": "in", "value": ["Rome", "Paris"]}]
    });
    let frame = session.resampler().handle_message(&message.to_string()).unwrap().unwrap();
    let cities = frame.column("city").unwrap().as_string::<i32>();
    assert_eq!(cities.iter().flatten().collect::<Vec<_>>(), vec!["Paris", "Rome", "Paris"]);
}

/// Connector that accepts tables and answers every query with a fixed batch
struct CannedConnector {
    result: Option<RecordBatch>,
    accept_tables: bool,
}

impl QueryConnector for CannedConnector {
    fn register_table(&self, name: &str, _frame: &Frame) -> Result<(), DataError> {
        if self.accept_tables {
            Ok(())
        } else {
            Err(DataError::Sqlite(format!("cannot create {}", name)))
        }
    }

    fn has_table(&self, _name: &str) -> Result<bool, DataError> {
        Ok(self.accept_tables)
    }

    fn execute(&self, _sql: &str) -> Result<RecordBatch, DataError> {
        self.result
            .clone()
            .ok_or_else(|| DataError::Sqlite("no such table".to_string()))
    }

    fn engine_name(&self) -> &str {
        "canned"
    }
}

fn numbers() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("n", DataType::Int64, false),
        Field::new("x", DataType::Float64, false),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3])),
            Arc::new(Float64Array::from(vec![0.5, 1.5, 2.5])),
        ],
    )
    .unwrap()
}

fn canned_session(connector: CannedConnector) -> (DisplaySession, Arc<MemoryRenderer>) {
    let renderer = Arc::new(MemoryRenderer::new());
    let session = DisplaySession::new(DisplaySettings::default(), Arc::new(connector), renderer.clone());
    (session, renderer)
}

#[test]
fn query_failure_is_surfaced_with_source() {
    let (session, renderer) = canned_session(CannedConnector {
        result: None,
        accept_tables: true,
    });
    let slot = session.dispatcher().display(numbers(), &Bindings::new()).unwrap().display_slot;

    let err = session
        .resampler()
        .resample(&ResampleRequest::new(slot.clone(), Vec::new()))
        .unwrap_err();
    match err {
        DisplayError::ResampleQueryFailed { slot: failed, source } => {
            assert_eq!(failed, slot);
            assert!(source.to_string().contains("no such table"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(session.registry.get(&slot).unwrap().sample_history.is_empty());
    assert_eq!(renderer.len(), 1);
}

#[test]
fn failed_table_registration_falls_back_to_untracked() {
    let (session, renderer) = canned_session(CannedConnector {
        result: None,
        accept_tables: false,
    });
    let outcome = session.dispatcher().display(numbers(), &Bindings::new()).unwrap();

    assert!(!outcome.is_tracked());
    assert!(session.registry.is_empty());
    assert_eq!(outcome.frame.num_rows(), 3);
    assert_eq!(renderer.last().unwrap().metadata["datalink"]["tracked"], false);
}

#[test]
fn uncastable_column_keeps_engine_type() {
    let index = Arc::new(Int64Array::from(vec![0, 1]));
    let n = Arc::new(StringArray::from(vec!["one", "two"]));
    let x = Arc::new(Float64Array::from(vec![0.5, 1.5]));
    let schema = Arc::new(Schema::new(vec![
        Field::new(dx_core::INDEX_COLUMN, DataType::Int64, true),
        Field::new("n", DataType::Utf8, true),
        Field::new("x", DataType::Float64, true),
    ]));
    let result = RecordBatch::try_new(schema, vec![index, n, x]).unwrap();

    let (session, _renderer) = canned_session(CannedConnector {
        result: Some(result),
        accept_tables: true,
    });
    let slot = session.dispatcher().display(numbers(), &Bindings::new()).unwrap().display_slot;
    let frame = session
        .resampler()
        .resample(&ResampleRequest::new(slot, vec![FilterSpec::metric("x", 0.0, 2.0)]))
        .unwrap();

    let types = frame.column_types();
    assert_eq!(types["n"], DataType::Utf8);
    assert_eq!(types["x"], DataType::Float64);
    assert!(frame.column("n").unwrap().is_valid(0));
}
