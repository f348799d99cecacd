pub mod csv_source;
pub mod sqlite_source;

pub use csv_source::{CsvOptions, CsvSource};
pub use sqlite_source::SqliteConnector;
