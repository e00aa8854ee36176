//! Network store backend.
//!
//! Records become rows in a remote `PostgreSQL` table using the shared column
//! layout. Every round trip to the server is bounded by the configured
//! operation timeout. A lost connection is re-established within the
//! reconnect budget; rotation opens a fresh session and swaps to it.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod session;

pub use error::Error;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dblogger_core::backend::BoxError;
use dblogger_core::{
    Backend, BackendError, DEFAULT_PORT, DEFAULT_TABLE_PREFIX, LogRecord, NetworkOptions,
    ReconnectPolicy,
};
use tracing::{debug, info, warn};

use crate::session::{Connector, PgConnector, Session};

/// Time allowed for a single connect or insert when none is configured.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`PostgresBackend`].
#[derive(Clone)]
pub struct PostgresConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Login role
    pub user: String,
    /// Password, if required
    pub password: Option<String>,
    /// Database name
    pub database: String,
    /// Prefix of the log table
    pub table_prefix: String,
    /// How lost connections are retried
    pub reconnect: ReconnectPolicy,
    /// Upper bound for one connect attempt or one insert
    pub operation_timeout: Duration,
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("table_prefix", &self.table_prefix)
            .field("reconnect", &self.reconnect)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

impl PostgresConfig {
    /// Settings with the default port, table prefix, reconnect policy and
    /// operation timeout.
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: None,
            database: database.into(),
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            reconnect: ReconnectPolicy::default(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    fn client_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(&self.database)
            .application_name("dblogger")
            .connect_timeout(self.operation_timeout);
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }
}

impl From<&NetworkOptions> for PostgresConfig {
    fn from(options: &NetworkOptions) -> Self {
        Self {
            host: options.host.clone(),
            port: options.port,
            user: options.user.clone(),
            password: options.password.clone(),
            database: options.database.clone(),
            table_prefix: options.table_prefix.clone(),
            reconnect: ReconnectPolicy::default(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// Connects within the reconnect budget, bounding every attempt by the
/// operation timeout.
async fn open_session(
    connector: &dyn Connector,
    config: &PostgresConfig,
) -> Result<Box<dyn Session>, (u32, BoxError)> {
    let limit = config.operation_timeout;
    config
        .reconnect
        .retry("postgres connect", || async move {
            tokio::time::timeout(limit, connector.connect())
                .await
                .unwrap_or_else(|_| {
                    Err(Error::Timeout {
                        operation: "connect",
                        limit,
                    }
                    .into())
                })
        })
        .await
}

/// Why an insert did not go through.
enum Failure {
    /// The session broke or stopped answering; a fresh one may succeed.
    Lost(BoxError),
    /// The server refused the statement on a healthy session.
    Rejected(BoxError),
    /// No session could be established.
    Unavailable(BackendError),
}

impl Failure {
    fn into_backend_error(self, context: &'static str) -> BackendError {
        match self {
            Self::Lost(e) | Self::Rejected(e) => BackendError::write(context, e),
            Self::Unavailable(e) => e,
        }
    }
}

/// The same failure for every record of a batch, keeping its source chain.
fn fail_all(
    records: &[LogRecord],
    context: &'static str,
    source: impl Into<BoxError>,
) -> Vec<Result<(), BackendError>> {
    let shared: Arc<dyn std::error::Error + Send + Sync> = Arc::from(source.into());
    records
        .iter()
        .map(|_| Err(BackendError::write(context, shared.clone())))
        .collect()
}

/// Network backend writing to a `PostgreSQL` table.
pub struct PostgresBackend {
    config: PostgresConfig,
    connector: Box<dyn Connector>,
    session: Option<Box<dyn Session>>,
    closed: bool,
}

impl fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("config", &self.config)
            .field(
                "connected",
                &self.session.as_ref().is_some_and(|s| !s.is_closed()),
            )
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl PostgresBackend {
    /// Connects, creates the log table and prepares the insert statement,
    /// retrying per the configured reconnect policy.
    ///
    /// # Errors
    ///
    /// [`Error::Connect`] once the reconnect budget is spent.
    pub async fn connect(config: PostgresConfig) -> Result<Self, Error> {
        let connector = PgConnector::new(config.clone());
        Self::with_connector(config, Box::new(connector)).await
    }

    /// Connects with the settings from `options`.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn from_options(options: &NetworkOptions) -> Result<Self, Error> {
        Self::connect(options.into()).await
    }

    async fn with_connector(
        config: PostgresConfig,
        connector: Box<dyn Connector>,
    ) -> Result<Self, Error> {
        let session = open_session(connector.as_ref(), &config)
            .await
            .map_err(|(attempts, source)| Error::Connect {
                host: config.host.clone(),
                port: config.port,
                attempts,
                source,
            })?;
        debug!(
            target: "dblogger",
            host = %config.host,
            port = config.port,
            database = %config.database,
            "connected to network store"
        );

        Ok(Self {
            config,
            connector,
            session: Some(session),
            closed: false,
        })
    }

    /// Connection settings.
    #[must_use]
    pub const fn config(&self) -> &PostgresConfig {
        &self.config
    }

    /// Live session, reconnecting first if the previous one was lost.
    async fn session(&mut self) -> Result<&mut dyn Session, BackendError> {
        if self.closed {
            return Err(BackendError::Closed);
        }
        if self.session.as_ref().is_none_or(|s| s.is_closed()) {
            self.session = None;
            let session = open_session(self.connector.as_ref(), &self.config)
                .await
                .map_err(|(attempts, e)| BackendError::connect(attempts, e))?;
            info!(target: "dblogger", host = %self.config.host, "reconnected to network store");
            self.session = Some(session);
        }
        self.session
            .as_deref_mut()
            .map(|s| s as &mut dyn Session)
            .ok_or(BackendError::Closed)
    }

    /// One insert attempt: a single row on its own, several in one
    /// transaction. A broken or silent session is dropped.
    async fn run(&mut self, records: &[LogRecord]) -> Result<(), Failure> {
        let limit = self.config.operation_timeout;
        let session = self.session().await.map_err(Failure::Unavailable)?;

        let operation = match records {
            [record] => session.insert(record),
            _ => session.insert_all(records),
        };
        let failure = match tokio::time::timeout(limit, operation).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) if !session.is_closed() => return Err(Failure::Rejected(e)),
            Ok(Err(e)) => e,
            Err(_) => Error::Timeout {
                operation: "insert",
                limit,
            }
            .into(),
        };

        warn!(target: "dblogger", "network store connection lost, reconnecting: {failure}");
        self.session = None;
        Err(Failure::Lost(failure))
    }

    /// Runs an insert, retrying once on a fresh session if the connection
    /// was lost.
    async fn insert(&mut self, records: &[LogRecord]) -> Result<(), Failure> {
        match self.run(records).await {
            Err(Failure::Lost(_)) => self.run(records).await,
            outcome => outcome,
        }
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    fn name(&self) -> &'static str {
        "network"
    }

    async fn write(&mut self, record: &LogRecord) -> Result<(), BackendError> {
        self.insert(std::slice::from_ref(record))
            .await
            .map_err(|failure| failure.into_backend_error("failed to insert log row"))
    }

    /// Inserts the batch in one transaction. If the server rejects it, the
    /// records are retried one by one so only the offending ones fail.
    async fn write_batch(&mut self, records: &[LogRecord]) -> Vec<Result<(), BackendError>> {
        if records.len() > 1 {
            match self.insert(records).await {
                Ok(()) => return records.iter().map(|_| Ok(())).collect(),
                Err(Failure::Rejected(e)) => {
                    debug!(
                        target: "dblogger",
                        "batch of {} rejected ({e}), inserting rows one by one",
                        records.len()
                    );
                }
                Err(Failure::Unavailable(BackendError::Closed)) => {
                    return records.iter().map(|_| Err(BackendError::Closed)).collect();
                }
                Err(Failure::Unavailable(e)) => {
                    return fail_all(records, "network store unavailable", e);
                }
                Err(Failure::Lost(e)) => {
                    return fail_all(records, "failed to insert log batch", e);
                }
            }
        }

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            outcomes.push(self.write(record).await);
        }
        outcomes
    }

    /// Connects a fresh session and swaps to it; the old one stays in use if
    /// the new one cannot be established.
    async fn rotate(&mut self) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::Closed);
        }
        let fresh = open_session(self.connector.as_ref(), &self.config)
            .await
            .map_err(|(_, e)| BackendError::rotation("failed to open a fresh session", e))?;
        self.session = Some(fresh);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.closed = true;
        self.session = None;
        Ok(())
    }
}
