//! Backend-agnostic row layout shared by the SQL backends
//!
//! Consumers of the persisted stores depend on these column names and their
//! order, so both backends build their statements from [`LogRow::COLUMNS`].

use crate::LogRecord;

/// One persisted record in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRow {
    /// Unix timestamp in microseconds
    pub time: i64,
    /// Numeric level
    pub level: u8,
    /// Level name
    pub level_name: &'static str,
    /// Logger name
    pub logger: String,
    /// Host name
    pub hostname: String,
    /// Process id
    pub pid: u32,
    /// Source file of the call
    pub source: Option<String>,
    /// Source line of the call
    pub line: Option<u32>,
    /// Source column of the call
    pub column: Option<u32>,
    /// Tags as a JSON array
    pub tags: String,
    /// Rendered message
    pub message: String,
    /// Arguments as a JSON array
    pub arguments: String,
}

impl LogRow {
    /// Column names in insert order. `id` is assigned by the store.
    pub const COLUMNS: [&'static str; 12] = [
        "time",
        "level",
        "level_name",
        "logger",
        "hostname",
        "pid",
        "source",
        "line",
        "column",
        "tags",
        "message",
        "arguments",
    ];

    /// Name of the log table for a prefix.
    #[must_use]
    pub fn table_name(prefix: &str) -> String {
        format!("{prefix}_log")
    }

    /// Comma separated, quoted column list for INSERT statements.
    #[must_use]
    pub fn column_list() -> String {
        Self::COLUMNS
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// INSERT statement with placeholders produced by `placeholder(index)`,
    /// where index starts at 1.
    #[must_use]
    pub fn insert_sql(prefix: &str, placeholder: impl Fn(usize) -> String) -> String {
        let values = (1..=Self::COLUMNS.len())
            .map(placeholder)
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO \"{}\" ({}) VALUES ({values})",
            Self::table_name(prefix),
            Self::column_list()
        )
    }
}

impl From<&LogRecord> for LogRow {
    fn from(record: &LogRecord) -> Self {
        Self {
            time: record.timestamp.timestamp_micros(),
            level: record.level.as_u8(),
            level_name: record.level.as_str(),
            logger: record.logger.to_string(),
            hostname: record.hostname.to_string(),
            pid: record.pid,
            source: record.location.as_ref().map(|l| l.file.to_string()),
            line: record.location.as_ref().map(|l| l.line),
            column: record.location.as_ref().map(|l| l.column),
            tags: record.tags.to_json(),
            message: record.message.clone(),
            arguments: record.arguments_json(),
        }
    }
}
