pub mod logging;

pub use logging::{init, LogQuery, LogRecord, SqliteLogLayer, SqliteLogSink};
