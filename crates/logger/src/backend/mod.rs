//! Persistence targets for log records

#[cfg(any(test, feature = "test-support"))]
pub(crate) mod memory;
mod null;

pub use null::NullBackend;

use async_trait::async_trait;
use thiserror::Error;

use crate::LogRecord;

/// Boxed error carried by [`BackendError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures reported by a [`Backend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// A record could not be persisted.
    #[error("{context}: {source}")]
    Write {
        /// What was being done
        context: &'static str,
        /// Underlying failure
        #[source]
        source: BoxError,
    },

    /// The store stayed unreachable after the reconnect budget was spent.
    #[error("store unreachable after {attempts} attempt(s): {source}")]
    Connect {
        /// Connection attempts made
        attempts: u32,
        /// Last connection failure
        #[source]
        source: BoxError,
    },

    /// The sink could not be swapped; the previous one is still in use.
    #[error("{context}: {source}")]
    Rotation {
        /// What was being done
        context: &'static str,
        /// Underlying failure
        #[source]
        source: BoxError,
    },

    /// The backend has been closed.
    #[error("backend is closed")]
    Closed,
}

impl BackendError {
    /// Write failure with context.
    pub fn write(context: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Write {
            context,
            source: source.into(),
        }
    }

    /// Connection failure after `attempts` tries.
    pub fn connect(attempts: u32, source: impl Into<BoxError>) -> Self {
        Self::Connect {
            attempts,
            source: source.into(),
        }
    }

    /// Rotation failure with context.
    pub fn rotation(context: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Rotation {
            context,
            source: source.into(),
        }
    }
}

/// A persistence target. Owned exclusively by a dispatcher's flush task, so
/// every method takes `&mut self` and is never called concurrently.
#[async_trait]
pub trait Backend: Send + 'static {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Persist one record.
    async fn write(&mut self, record: &LogRecord) -> Result<(), BackendError>;

    /// Persist records in order, reporting an outcome per record.
    async fn write_batch(&mut self, records: &[LogRecord]) -> Vec<Result<(), BackendError>> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            outcomes.push(self.write(record).await);
        }
        outcomes
    }

    /// Make previously written records durable.
    async fn flush(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Swap the underlying sink. On error the previous sink stays active.
    async fn rotate(&mut self) -> Result<(), BackendError>;

    /// Release the sink. Called once, at dispatcher teardown.
    async fn close(&mut self) -> Result<(), BackendError>;
}
