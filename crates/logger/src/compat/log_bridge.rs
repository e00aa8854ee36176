//! Bridge from the `log` crate

use std::borrow::Cow;

use log::{Log, Metadata, Record};

use crate::{Location, LogLevel, Logger, Value};

/// Implements [`log::Log`] by forwarding to a [`Logger`]. The record target
/// becomes a tag.
#[derive(Debug, Clone)]
pub struct LogBridge {
    logger: Logger,
}

impl LogBridge {
    /// Bridge into `logger`.
    #[must_use]
    pub const fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl Log for LogBridge {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.logger.is_enabled(map_level(metadata.level()))
    }

    fn log(&self, record: &Record) {
        let level = map_level(record.level());
        if !self.logger.is_enabled(level) {
            return;
        }

        let location = record.file_static().map(Cow::Borrowed).or_else(|| {
            record.file().map(|file| Cow::Owned(file.to_string()))
        });
        let location = location.map(|file| Location {
            file,
            line: record.line().unwrap_or(0),
            column: 0,
        });
        let arguments = vec![Value::String(record.args().to_string())];

        let target = record.target();
        if target.is_empty() {
            self.logger.log_with_location(level, arguments, location);
        } else {
            self.logger
                .tag([target])
                .log_with_location(level, arguments, location);
        }
    }

    // Durability is only reachable through the async `Logger::flush`.
    fn flush(&self) {}
}

const fn map_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

const fn max_level(level: LogLevel) -> log::LevelFilter {
    match level {
        LogLevel::Trace => log::LevelFilter::Trace,
        LogLevel::Debug => log::LevelFilter::Debug,
        LogLevel::Info => log::LevelFilter::Info,
        LogLevel::Warn => log::LevelFilter::Warn,
        LogLevel::Error | LogLevel::Fatal => log::LevelFilter::Error,
    }
}

/// Installs a [`LogBridge`] as the global `log` logger, with the maximum
/// level taken from `logger`'s threshold.
///
/// # Errors
///
/// Fails if a global `log` logger is already set.
pub fn init_log_bridge(logger: Logger) -> Result<(), log::SetLoggerError> {
    let level = max_level(logger.level());
    // `log::set_logger` requires a `'static` logger.
    let bridge = Box::leak(Box::new(LogBridge::new(logger)));
    log::set_logger(bridge)?;
    log::set_max_level(level);
    Ok(())
}
