use std::time::Duration;

use dblogger_core::backend::BoxError;
use thiserror::Error;

/// Errors connecting to or talking to a network store.
#[derive(Debug, Error)]
pub enum Error {
    /// The server stayed unreachable for the whole reconnect budget.
    #[error("failed to connect to {host}:{port} after {attempts} attempt(s)")]
    Connect {
        /// Server host
        host: String,
        /// Server port
        port: u16,
        /// Connection attempts made
        attempts: u32,
        /// Last connection failure
        #[source]
        source: BoxError,
    },

    /// The server or the connection failed a statement.
    #[error("{message}")]
    Database {
        /// Server message when there is one, otherwise the client's
        message: String,
        /// Underlying failure
        #[source]
        source: tokio_postgres::Error,
    },

    /// The server did not answer in time.
    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        /// What was waiting
        operation: &'static str,
        /// Configured limit
        limit: Duration,
    },
}

impl From<tokio_postgres::Error> for Error {
    fn from(source: tokio_postgres::Error) -> Self {
        let message = source.as_db_error().map_or_else(
            || source.to_string(),
            |db| format!("{} ({})", db.message(), db.code().code()),
        );
        Self::Database { message, source }
    }
}
