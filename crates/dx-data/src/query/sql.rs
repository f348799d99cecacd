//! Translation of front-end filters into SQL

use dx_core::filter::{DateFilter, DimensionFilter, MetricFilter};
use dx_core::{FilterSpec, ROW_ORDER_COLUMN};
use serde_json::Value;

/// `SELECT * FROM "<table>" [WHERE p1 AND p2 ...] ORDER BY "__row_order__" [LIMIT n]`.
///
/// Ranges are inclusive on both ends.
pub fn build_resample_query(table: &str, filters: &[FilterSpec], limit: Option<usize>) -> String {
    let mut query = format!("SELECT * FROM {}", quote_identifier(table));

    let predicates: Vec<String> = filters.iter().map(predicate).collect();
    if !predicates.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&predicates.join(" AND "));
    }

    // Keep the original row order
    query.push_str(&format!(" ORDER BY {}", quote_identifier(ROW_ORDER_COLUMN)));

    if let Some(limit) = limit {
        query.push_str(&format!(" LIMIT {}", limit));
    }
    query
}

fn predicate(filter: &FilterSpec) -> String {
    match filter {
        FilterSpec::Date(f) => date_predicate(f),
        FilterSpec::Dimension(f) => dimension_predicate(f),
        FilterSpec::Metric(f) => metric_predicate(f),
    }
}

// Dates are stored as ISO-8601 text; julianday compares them as instants
// regardless of separator or fractional-second width.
fn date_predicate(filter: &DateFilter) -> String {
    format!(
        "julianday({}) BETWEEN julianday({}) AND julianday({})",
        quote_identifier(&filter.column),
        quote_literal(&filter.start),
        quote_literal(&filter.end)
    )
}

fn dimension_predicate(filter: &DimensionFilter) -> String {
    let column = quote_identifier(&filter.column);
    let has_null = filter.value.iter().any(Value::is_null);
    let values: Vec<String> = filter
        .value
        .iter()
        .filter(|v| !v.is_null())
        .map(sql_value)
        .collect();

    let membership = if values.is_empty() {
        "0 = 1".to_string()
    } else {
        format!("{} IN ({})", column, values.join(", "))
    };

    if has_null {
        format!("({} OR {} IS NULL)", membership, column)
    } else {
        membership
    }
}

fn metric_predicate(filter: &MetricFilter) -> String {
    let [min, max] = filter.value;
    format!(
        "{} BETWEEN {} AND {}",
        quote_identifier(&filter.column),
        sql_number(min),
        sql_number(max)
    )
}

fn sql_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => sql_number(f),
            _ => n.to_string(),
        },
        Value::String(s) => quote_literal(s),
        other => quote_literal(&other.to_string()),
    }
}

fn sql_number(value: f64) -> String {
    if value.is_nan() {
        "NULL".to_string()
    } else if value == f64::INFINITY {
        "9e999".to_string()
    } else if value == f64::NEG_INFINITY {
        "-9e999".to_string()
    } else {
        format!("{:?}", value)
    }
}

/// Double-quoted SQL identifier
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quoted SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
