//! Leveled, tagged logging into an embedded file store or a remote database.
//!
//! [`open`] builds a [`Logger`] from a [`LoggerSpec`]: either a bare
//! [`LogLevel`] (filter only, nothing persisted) or full [`Options`] naming
//! the backend. Derived loggers created with [`Logger::tag`] share the
//! backend of the logger they came from.
//!
//! ```ignore
//! let logger = dblogger::open(FileOptions::new("logs/app.db")).await?;
//! logger.info(("listening on", 8080));
//! logger.tag(["db"]).warn("slow query");
//!
//! // Rotation is triggered by the host, for example on SIGHUP.
//! let rotating = logger.clone();
//! tokio::spawn(async move {
//!     let mut hangup = signal(SignalKind::hangup())?;
//!     while hangup.recv().await.is_some() {
//!         let _ = rotating.rotate().await;
//!     }
//! });
//! ```
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub use dblogger_core::{
    Backend, BackendError, CommonOptions, ConfigError, DEFAULT_LOGGER_NAME, DEFAULT_PORT,
    DEFAULT_TABLE_PREFIX, Dispatcher, DispatcherConfig, DispatcherStats, Enqueued, Error,
    FileOptions, IntoArgs, LevelFilter, Location, LogLevel, LogRecord, Logger, LoggerSpec,
    NetworkOptions, NullBackend, Options, ReconnectPolicy, RotationState, StdoutMirror,
    TagContext, Value, compat,
};
pub use dblogger_libsql::LibsqlBackend;
pub use dblogger_postgres::{PostgresBackend, PostgresConfig};

use tracing::info;

/// Opens a logger tree with the default dispatcher settings.
///
/// # Errors
///
/// [`Error::Open`] if the backend cannot be opened or reached.
pub async fn open(spec: impl Into<LoggerSpec>) -> Result<Logger, Error> {
    open_with(spec, DispatcherConfig::default()).await
}

/// Opens a logger tree from JSON: a level (`"info"`, `30`) or an options
/// object.
///
/// # Errors
///
/// [`Error::Configuration`] for invalid JSON or options, otherwise as
/// [`open`].
pub async fn open_json(json: &str) -> Result<Logger, Error> {
    open(LoggerSpec::from_json(json)?).await
}

/// Opens a logger tree with explicit dispatcher settings.
///
/// # Errors
///
/// [`Error::Open`] if the backend cannot be opened or reached.
pub async fn open_with(
    spec: impl Into<LoggerSpec>,
    config: DispatcherConfig,
) -> Result<Logger, Error> {
    let options = spec.into().into_options();
    let backend = open_backend(&options).await?;
    let common = options.common();
    let mirror = common.stdout.then(StdoutMirror::console);

    let dispatcher = Dispatcher::spawn(backend, mirror, config);
    info!(
        target: "dblogger",
        backend = options.kind(),
        logger = %common.logger,
        level = %common.level,
        "logger opened"
    );
    Ok(Logger::new(dispatcher, common.logger.as_str(), common.level))
}

/// Opens the backend selected by `options`.
///
/// # Errors
///
/// [`Error::Open`] if the backend cannot be opened or reached.
pub async fn open_backend(options: &Options) -> Result<Box<dyn Backend>, Error> {
    let backend: Box<dyn Backend> = match options {
        Options::None(_) => Box::new(NullBackend),
        Options::File(file) => Box::new(
            LibsqlBackend::from_options(file)
                .await
                .map_err(|e| Error::Open {
                    backend: "file",
                    source: e.into(),
                })?,
        ),
        Options::Network(network) => Box::new(
            PostgresBackend::from_options(network)
                .await
                .map_err(|e| Error::Open {
                    backend: "network",
                    source: e.into(),
                })?,
        ),
    };
    Ok(backend)
}
