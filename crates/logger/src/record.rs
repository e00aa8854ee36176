//! The unit of data flowing from a logger to a backend

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{LogLevel, ProcessInfo, TagContext, Value, format_message};

/// Source position of a log call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Source file
    pub file: Cow<'static, str>,
    /// Line number
    pub line: u32,
    /// Column number
    pub column: u32,
}

impl Location {
    /// Location of the caller of a `#[track_caller]` function.
    #[track_caller]
    #[must_use]
    pub fn caller() -> Self {
        std::panic::Location::caller().into()
    }
}

impl From<&'static std::panic::Location<'static>> for Location {
    fn from(location: &'static std::panic::Location<'static>) -> Self {
        Self {
            file: Cow::Borrowed(location.file()),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A single log record. Built once per emitted call and never modified.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// When the call was made
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: LogLevel,
    /// Name of the logger tree that produced the record
    pub logger: Arc<str>,
    /// Host name of the producing process
    pub hostname: Arc<str>,
    /// Process id of the producing process
    pub pid: u32,
    /// Call site, if known
    pub location: Option<Location>,
    /// Tag context of the emitting logger
    pub tags: TagContext,
    /// Arguments rendered into text
    pub message: String,
    /// Arguments as passed
    pub arguments: Vec<Value>,
}

impl LogRecord {
    /// Builds a record stamped with the current time and process identity.
    #[must_use]
    pub fn new(
        level: LogLevel,
        logger: Arc<str>,
        tags: TagContext,
        arguments: Vec<Value>,
        location: Option<Location>,
    ) -> Self {
        let process = ProcessInfo::current();
        Self {
            timestamp: Utc::now(),
            level,
            logger,
            hostname: process.hostname,
            pid: process.pid,
            location,
            tags,
            message: format_message(&arguments),
            arguments,
        }
    }

    /// Serialized argument list as stored by the SQL backends.
    #[must_use]
    pub fn arguments_json(&self) -> String {
        serde_json::to_string(&self.arguments).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_rendered_at_construction() {
        let record = LogRecord::new(
            LogLevel::Info,
            "app".into(),
            TagContext::new().extend(["db"]),
            vec!["rows".into(), Value::Int(3)],
            Some(Location::caller()),
        );

        assert_eq!(record.message, "rows 3");
        assert_eq!(record.arguments_json(), r#"["rows",3]"#);
        assert_eq!(record.pid, std::process::id());
        assert!(!record.hostname.is_empty());
        assert!(record.location.unwrap().file.ends_with("record.rs"));
    }
}
