//! Filter specifications sent by the front end with resample requests

use serde::{Deserialize, Serialize};

/// A single typed predicate. Filters in a list are combined with AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FilterSpec {
    #[serde(rename = "DATE_FILTER")]
    Date(DateFilter),

    #[serde(rename = "DIMENSION_FILTER")]
    Dimension(DimensionFilter),

    #[serde(rename = "METRIC_FILTER")]
    Metric(MetricFilter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangePredicate {
    Between,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipPredicate {
    In,
}

/// Inclusive date/time range on one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateFilter {
    pub column: String,
    pub predicate: RangePredicate,
    pub start: String,
    pub end: String,
}

/// Categorical membership on one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionFilter {
    pub column: String,
    pub predicate: MembershipPredicate,
    pub value: Vec<serde_json::Value>,
}

/// Inclusive numeric range on one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFilter {
    pub column: String,
    pub predicate: RangePredicate,
    pub value: [f64; 2],
}

impl FilterSpec {
    /// Column the predicate applies to
    pub fn column(&self) -> &str {
        match self {
            FilterSpec::Date(f) => &f.column,
            FilterSpec::Dimension(f) => &f.column,
            FilterSpec::Metric(f) => &f.column,
        }
    }

    pub fn date(column: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        FilterSpec::Date(DateFilter {
            column: column.into(),
            predicate: RangePredicate::Between,
            start: start.into(),
            end: end.into(),
        })
    }

    pub fn dimension(column: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        FilterSpec::Dimension(DimensionFilter {
            column: column.into(),
            predicate: MembershipPredicate::In,
            value: values,
        })
    }

    pub fn metric(column: impl Into<String>, min: f64, max: f64) -> Self {
        FilterSpec::Metric(MetricFilter {
            column: column.into(),
            predicate: RangePredicate::Between,
            value: [min, max],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_filter_list() {
        let raw = json!([
            {"type": "DATE_FILTER", "column": "ts", "predicate": "between",
             "start": "2021-01-01", "end": "2021-02-01"},
            {"type": "DIMENSION_FILTER", "column": "city", "predicate": "in",
             "value": ["Paris", "Oslo"]},
            {"type": "METRIC_FILTER", "column": "price", "predicate": "between",
             "value": [1, 9.5]}
        ]);

        let filters: Vec<FilterSpec> = serde_json::from_value(raw).unwrap();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0], FilterSpec::date("ts", "2021-01-01", "2021-02-01"));
        assert_eq!(filters[1].column(), "city");
        assert_eq!(filters[2], FilterSpec::metric("price", 1.0, 9.5));
    }

    #[test]
    fn test_unknown_filter_type_is_rejected() {
        let raw = json!({"type": "GEO_FILTER", "column": "loc", "predicate": "within"});
        assert!(serde_json::from_value::<FilterSpec>(raw).is_err());
    }

    #[test]
    fn test_serialized_tag() {
        let value = serde_json::to_value(FilterSpec::dimension("city", vec![json!("Oslo")])).unwrap();
        assert_eq!(value["type"], "DIMENSION_FILTER");
        assert_eq!(value["predicate"], "in");
    }
}
