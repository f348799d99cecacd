//! SQLite query connector
//!
//! Frames are written into SQLite tables, the index as
//! [`dx_core::INDEX_COLUMN`] and the row position as
//! [`dx_core::ROW_ORDER_COLUMN`]. Query results are read back with column
//! types inferred from the values SQLite returns.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Float64Array, Int64Array, StringArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use dx_core::{Frame, ROW_ORDER_COLUMN};

use crate::query::{quote_identifier, QueryConnector};
use crate::DataError;

/// In-process SQLite database holding registered frames
pub struct SqliteConnector {
    conn: Mutex<Connection>,
}

/// How one Arrow column is written into SQLite
enum ColumnWriter {
    Integer(Int64Array),
    Real(Float64Array),
    Boolean(BooleanArray),
    Text(StringArray),
}

impl ColumnWriter {
    fn new(array: &ArrayRef) -> Result<Self, DataError> {
        let data_type = array.data_type();
        let writer = if data_type.is_integer() {
            ColumnWriter::Integer(cast(array.as_ref(), &DataType::Int64)?.as_primitive::<Int64Type>().clone())
        } else if data_type.is_floating() {
            ColumnWriter::Real(cast(array.as_ref(), &DataType::Float64)?.as_primitive::<Float64Type>().clone())
        } else if data_type == &DataType::Boolean {
            ColumnWriter::Boolean(array.as_boolean().clone())
        } else {
            // Text, dates, timestamps and everything else go in as display text
            let options = FormatOptions::default();
            let formatter = ArrayFormatter::try_new(array.as_ref(), &options)?;
            let text: StringArray = (0..array.len())
                .map(|i| (!array.is_null(i)).then(|| formatter.value(i).to_string()))
                .collect();
            ColumnWriter::Text(text)
        };
        Ok(writer)
    }

    fn sql_type(&self) -> &'static str {
        match self {
            ColumnWriter::Integer(_) => "INTEGER",
            ColumnWriter::Real(_) => "REAL",
            ColumnWriter::Boolean(_) => "BOOLEAN",
            ColumnWriter::Text(_) => "TEXT",
        }
    }

    fn value(&self, row: usize) -> Value {
        match self {
            ColumnWriter::Integer(a) if a.is_valid(row) => Value::Integer(a.value(row)),
            ColumnWriter::Real(a) if a.is_valid(row) => Value::Real(a.value(row)),
            ColumnWriter::Boolean(a) if a.is_valid(row) => Value::Integer(a.value(row) as i64),
            ColumnWriter::Text(a) if a.is_valid(row) => Value::Text(a.value(row).to_string()),
            _ => Value::Null,
        }
    }
}

impl SqliteConnector {
    /// Create a connector backed by a private in-memory database
    pub fn open_in_memory() -> Result<Self, DataError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DataError::Sqlite(format!("Failed to open in-memory database: {}", e)))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Create a connector backed by a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| DataError::Sqlite(format!("Failed to open SQLite database: {}", e)))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Map declared SQLite column types to Arrow types
    fn declared_type(decl: Option<&str>) -> DataType {
        match decl.map(|d| d.to_uppercase()).as_deref() {
            Some("INTEGER") | Some("BOOLEAN") => DataType::Int64,
            Some("REAL") | Some("FLOAT") | Some("DOUBLE") => DataType::Float64,
            _ => DataType::Utf8,
        }
    }

    /// Infer an Arrow type from the values SQLite returned for one column
    fn infer_type(values: &[Value], declared: DataType) -> DataType {
        let mut has_int = false;
        let mut has_real = false;
        let mut has_text = false;
        let mut has_blob = false;

        for value in values {
            match value {
                Value::Integer(_) => has_int = true,
                Value::Real(_) => has_real = true,
                Value::Text(_) => has_text = true,
                Value::Blob(_) => has_blob = true,
                Value::Null => {}
            }
        }

        if has_text {
            DataType::Utf8
        } else if has_blob {
            DataType::Binary
        } else if has_real {
            DataType::Float64
        } else if has_int {
            DataType::Int64
        } else {
            declared
        }
    }

    /// Build an Arrow array from one column of SQLite values
    fn build_array(values: &[Value], data_type: &DataType) -> ArrayRef {
        match data_type {
            DataType::Int64 => Arc::new(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Integer(i) => Some(*i),
                        _ => None,
                    })
                    .collect::<Int64Array>(),
            ),
            DataType::Float64 => Arc::new(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Real(f) => Some(*f),
                        Value::Integer(i) => Some(*i as f64),
                        _ => None,
                    })
                    .collect::<Float64Array>(),
            ),
            DataType::Binary => Arc::new(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Blob(b) => Some(b.as_slice()),
                        _ => None,
                    })
                    .collect::<BinaryArray>(),
            ),
            _ => Arc::new(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Text(s) => Some(s.clone()),
                        Value::Integer(i) => Some(i.to_string()),
                        Value::Real(f) => Some(f.to_string()),
                        Value::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
                        Value::Null => None,
                    })
                    .collect::<StringArray>(),
            ),
        }
    }
}

impl QueryConnector for SqliteConnector {
    fn register_table(&self, name: &str, frame: &Frame) -> Result<(), DataError> {
        let batch = frame.to_batch_with_index()?;
        let writers = batch
            .columns()
            .iter()
            .map(ColumnWriter::new)
            .collect::<Result<Vec<_>, _>>()?;

        let table = quote_identifier(name);
        let mut column_defs: Vec<String> = batch
            .schema()
            .fields()
            .iter()
            .zip(&writers)
            .map(|(field, writer)| format!("{} {}", quote_identifier(field.name()), writer.sql_type()))
            .collect();
        column_defs.push(format!("{} INTEGER PRIMARY KEY", quote_identifier(ROW_ORDER_COLUMN)));
        let placeholders = vec!["?"; writers.len() + 1].join(", ");

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| DataError::Sqlite(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(&format!("DROP TABLE IF EXISTS {}", table), [])
            .map_err(|e| DataError::Sqlite(format!("Failed to drop table: {}", e)))?;
        tx.execute(&format!("CREATE TABLE {} ({})", table, column_defs.join(", ")), [])
            .map_err(|e| DataError::Sqlite(format!("Failed to create table: {}", e)))?;

        {
            let mut stmt = tx
                .prepare(&format!("INSERT INTO {} VALUES ({})", table, placeholders))
                .map_err(|e| DataError::Sqlite(format!("Failed to prepare insert: {}", e)))?;
            for row in 0..batch.num_rows() {
                let mut values: Vec<Value> = writers.iter().map(|w| w.value(row)).collect();
                values.push(Value::Integer(row as i64));
                stmt.execute(params_from_iter(values.iter()))
                    .map_err(|e| DataError::Sqlite(format!("Failed to insert row {}: {}", row, e)))?;
            }
        }

        tx.commit()
            .map_err(|e| DataError::Sqlite(format!("Failed to commit table: {}", e)))?;

        debug!("Registered table {} ({} rows)", name, batch.num_rows());
        Ok(())
    }

    fn has_table(&self, name: &str) -> Result<bool, DataError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .map_err(|e| DataError::Sqlite(format!("Failed to look up table: {}", e)))?;
        Ok(count > 0)
    }

    fn execute(&self, sql: &str) -> Result<RecordBatch, DataError> {
        debug!("Executing query: {}", sql);
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| DataError::Sqlite(format!("Failed to prepare query: {}", e)))?;

        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
        let declared: Vec<DataType> = stmt
            .columns()
            .iter()
            .map(|c| Self::declared_type(c.decl_type()))
            .collect();

        let mut columns: Vec<Vec<Value>> = vec![Vec::new(); names.len()];
        let mut rows = stmt
            .query([])
            .map_err(|e| DataError::Sqlite(format!("Failed to execute query: {}", e)))?;

        while let Some(row) = rows
            .next()
            .map_err(|e| DataError::Sqlite(format!("Failed to fetch row: {}", e)))?
        {
            for (col_idx, column) in columns.iter_mut().enumerate() {
                let value: Value = row
                    .get(col_idx)
                    .map_err(|e| DataError::Sqlite(format!("Failed to get column value: {}", e)))?;
                column.push(value);
            }
        }

        let num_rows = columns.first().map(Vec::len).unwrap_or(0);
        let mut fields = Vec::with_capacity(names.len());
        let mut arrays = Vec::with_capacity(names.len());
        for ((name, values), declared) in names.iter().zip(&columns).zip(declared) {
            let data_type = Self::infer_type(values, declared);
            arrays.push(Self::build_array(values, &data_type));
            fields.push(Field::new(name, data_type, true));
        }

        let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
        Ok(RecordBatch::try_new_with_options(
            Arc::new(Schema::new(fields)),
            arrays,
            &options,
        )?)
    }

    fn engine_name(&self) -> &str {
        "sqlite"
    }
}
