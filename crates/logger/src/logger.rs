//! Cheap, cloneable logging façade over a shared dispatcher

use std::fmt;
use std::sync::Arc;

use crate::{
    Dispatcher, DispatcherStats, Enqueued, Error, IntoArgs, LevelFilter, Location, LogLevel,
    LogRecord, TagContext, Value,
};

/// A named, leveled, tagged handle onto a [`Dispatcher`].
///
/// Loggers derived through [`tag`](Self::tag) or
/// [`with_level`](Self::with_level) share the dispatcher, and with it the
/// backend, of the logger they came from. Level methods never fail and never
/// wait on backend I/O.
///
/// ```ignore
/// let db = logger.tag(["db"]);
/// db.info(("connected in", 12, "ms"));
/// db.tag(["query"]).debug("select 1");
/// ```
#[derive(Clone)]
pub struct Logger {
    dispatcher: Arc<Dispatcher>,
    name: Arc<str>,
    filter: LevelFilter,
    tags: TagContext,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.filter.threshold())
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Root logger of a new tree writing through `dispatcher`.
    pub fn new(dispatcher: Arc<Dispatcher>, name: impl Into<Arc<str>>, level: LogLevel) -> Self {
        Self {
            dispatcher,
            name: name.into(),
            filter: LevelFilter::new(level),
            tags: TagContext::new(),
        }
    }

    /// Logs at `Trace`.
    #[track_caller]
    pub fn trace(&self, args: impl IntoArgs) {
        self.log_at(LogLevel::Trace, args);
    }

    /// Logs at `Debug`.
    #[track_caller]
    pub fn debug(&self, args: impl IntoArgs) {
        self.log_at(LogLevel::Debug, args);
    }

    /// Logs at `Info`.
    #[track_caller]
    pub fn info(&self, args: impl IntoArgs) {
        self.log_at(LogLevel::Info, args);
    }

    /// Logs at [`LogLevel::LOG`], the same severity as `info`.
    #[track_caller]
    pub fn log(&self, args: impl IntoArgs) {
        self.log_at(LogLevel::LOG, args);
    }

    /// Logs at `Warn`.
    #[track_caller]
    pub fn warn(&self, args: impl IntoArgs) {
        self.log_at(LogLevel::Warn, args);
    }

    /// Logs at `Error`.
    #[track_caller]
    pub fn error(&self, args: impl IntoArgs) {
        self.log_at(LogLevel::Error, args);
    }

    /// Logs at `Fatal`. Does not terminate the process.
    #[track_caller]
    pub fn fatal(&self, args: impl IntoArgs) {
        self.log_at(LogLevel::Fatal, args);
    }

    /// Logs at `level`, recording the caller's source position.
    #[track_caller]
    pub fn log_at(&self, level: LogLevel, args: impl IntoArgs) {
        if !self.filter.should_log(level) {
            return;
        }
        let location = Location::caller();
        self.emit(level, args.into_args(), Some(location));
    }

    /// Logs already converted arguments with an explicit call site. Used by
    /// bridges that forward records from other logging facades.
    pub fn log_with_location(
        &self,
        level: LogLevel,
        arguments: Vec<Value>,
        location: Option<Location>,
    ) {
        if self.filter.should_log(level) {
            self.emit(level, arguments, location);
        }
    }

    fn emit(&self, level: LogLevel, arguments: Vec<Value>, location: Option<Location>) {
        let record = LogRecord::new(
            level,
            self.name.clone(),
            self.tags.clone(),
            arguments,
            location,
        );
        if self.dispatcher.enqueue(record) == Enqueued::Closed {
            tracing::debug!(target: "dblogger", logger = %self.name, "record dropped after shutdown");
        }
    }

    /// Child logger with `tags` appended to this logger's tags. The receiver
    /// is unchanged; repeated tags are kept.
    #[must_use]
    pub fn tag<I, S>(&self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: self.tags.extend(tags),
            ..self.clone()
        }
    }

    /// Logger sharing this one's dispatcher and tags with another threshold.
    #[must_use]
    pub fn with_level(&self, level: LogLevel) -> Self {
        Self {
            filter: LevelFilter::new(level),
            ..self.clone()
        }
    }

    /// True if a record at `level` would be emitted.
    #[must_use]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.filter.should_log(level)
    }

    /// Rotates the shared backend's sink.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::rotate`].
    pub async fn rotate(&self) -> Result<(), Error> {
        self.dispatcher.rotate().await
    }

    /// Waits until everything logged so far reached the backend.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::flush`].
    pub async fn flush(&self) -> Result<(), Error> {
        self.dispatcher.flush().await
    }

    /// Shuts down the shared dispatcher. Affects every logger in the tree.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }

    /// Logger name recorded on every record.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags attached to every record.
    #[must_use]
    pub const fn tags(&self) -> &TagContext {
        &self.tags
    }

    /// Level threshold.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.filter.threshold()
    }

    /// Dispatcher shared by the tree.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Counters of the shared dispatcher.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }
}
