//! Bridge from `tracing` events

use std::borrow::Cow;
use std::fmt;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::{Location, LogLevel, Logger, Value};

/// Target of the engine's own diagnostics. Never forwarded, or a failing
/// backend would feed its error reports back into itself.
const ENGINE_TARGET: &str = "dblogger";

/// A [`Layer`] forwarding events into a [`Logger`].
///
/// Records are tagged with the names of the enclosing spans, root first,
/// followed by the event target. The event message is the first argument and
/// any other fields follow as one mapping.
#[derive(Debug, Clone)]
pub struct TracingBridge {
    logger: Logger,
}

impl TracingBridge {
    /// Bridge into `logger`.
    #[must_use]
    pub const fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for TracingBridge
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        if target == ENGINE_TARGET || target.starts_with("dblogger::") {
            return;
        }

        let level = map_level(*metadata.level());
        if !self.logger.is_enabled(level) {
            return;
        }

        let mut fields = FieldVisitor::default();
        event.record(&mut fields);

        let mut tags: Vec<String> = ctx
            .event_scope(event)
            .map(|scope| scope.from_root().map(|span| span.name().to_string()).collect())
            .unwrap_or_default();
        tags.push(target.to_string());

        let location = metadata.file().map(|file| Location {
            file: Cow::Owned(file.to_string()),
            line: metadata.line().unwrap_or(0),
            column: 0,
        });

        self.logger
            .tag(tags)
            .log_with_location(level, fields.into_arguments(), location);
    }
}

const fn map_level(level: tracing::Level) -> LogLevel {
    match level {
        tracing::Level::ERROR => LogLevel::Error,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::TRACE => LogLevel::Trace,
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, Value)>,
}

impl FieldVisitor {
    fn into_arguments(self) -> Vec<Value> {
        let mut arguments = Vec::with_capacity(2);
        if let Some(message) = self.message {
            arguments.push(Value::String(message));
        }
        if !self.fields.is_empty() {
            arguments.push(Value::Mapping(self.fields));
        }
        arguments
    }

    fn push(&mut self, field: &Field, value: Value) {
        self.fields.push((field.name().to_string(), value));
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.push(field, value.into());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.push(field, Value::String(rendered));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::Int(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, Value::Float(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::Bool(value));
    }
}

/// Installs a registry with a [`TracingBridge`] as the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn init_tracing_bridge(logger: Logger) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(TracingBridge::new(logger))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dispatcher, DispatcherConfig, MemoryBackend, MemoryHandle};

    fn bridged(level: LogLevel) -> (Logger, MemoryHandle) {
        let (backend, handle) = MemoryBackend::new();
        let dispatcher = Dispatcher::spawn(Box::new(backend), None, DispatcherConfig::default());
        (Logger::new(dispatcher, "tracing", level), handle)
    }

    #[tokio::test]
    async fn forwards_events_with_span_tags_and_fields() {
        let (logger, handle) = bridged(LogLevel::Info);
        let subscriber = tracing_subscriber::registry().with(TracingBridge::new(logger.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("request");
            let _enter = span.enter();
            tracing::info!(target: "api", count = 42, ok = true, "handled");
            tracing::debug!(target: "api", "suppressed");
        });
        logger.flush().await.unwrap();

        let records = handle.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tags.as_slice(), ["request", "api"]);
        assert_eq!(records[0].message, r#"handled {"count":42,"ok":true}"#);
    }

    #[tokio::test]
    async fn engine_diagnostics_are_not_forwarded() {
        let (logger, handle) = bridged(LogLevel::Trace);
        let subscriber = tracing_subscriber::registry().with(TracingBridge::new(logger.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: "dblogger", "backend write failed");
            tracing::warn!(target: "app", "kept");
        });
        logger.flush().await.unwrap();

        assert_eq!(handle.messages(), ["kept"]);
    }
}
