//! Structured, leveled logging engine with pluggable persistence.
//!
//! A [`Logger`] filters records by level, attaches its tag context and hands
//! them to a shared [`Dispatcher`]. The dispatcher buffers records and a
//! single background task writes them to the active [`Backend`], optionally
//! mirroring each one to stdout. Log files can be rotated at runtime through
//! [`Logger::rotate`] without losing in-flight records.
//!
//! Backends for concrete stores live in their own crates; this crate ships
//! the [`NullBackend`] used when persistence is disabled.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod compat;
mod dispatcher;
mod error;
mod level;
mod logger;
mod mirror;
mod options;
mod process;
mod reconnect;
mod record;
mod rotation;
mod schema;
mod tags;
mod value;

pub use backend::{Backend, BackendError, NullBackend};
pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherStats, Enqueued};
pub use error::{ConfigError, Error, Result};
pub use level::{LevelFilter, LogLevel, should_log};
pub use logger::Logger;
pub use mirror::StdoutMirror;
pub use options::{
    CommonOptions, DEFAULT_LOGGER_NAME, DEFAULT_PORT, DEFAULT_TABLE_PREFIX, FileOptions, LoggerSpec,
    NetworkOptions, Options,
};
pub use process::ProcessInfo;
pub use reconnect::ReconnectPolicy;
pub use record::{Location, LogRecord};
pub use rotation::{RotationController, RotationState};
pub use schema::LogRow;
pub use tags::TagContext;
pub use value::{IntoArgs, Value, format_message};

#[cfg(any(test, feature = "test-support"))]
pub use backend::memory::{MemoryBackend, MemoryHandle};
#[cfg(any(test, feature = "test-support"))]
pub use mirror::MirrorCapture;
