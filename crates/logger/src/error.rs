use thiserror::Error;

use crate::BackendError;
use crate::backend::BoxError;

/// Result type for engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Invalid or incomplete logger options. Always fatal at construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Options did not name a backend type.
    #[error("options must name a backend `type` (none, file or network)")]
    MissingType,

    /// Unknown backend type.
    #[error("unknown backend type `{0}`")]
    UnknownType(String),

    /// A field required by the backend type is missing or empty.
    #[error("`{field}` is required for {kind} backends")]
    MissingField {
        /// Backend type
        kind: &'static str,
        /// Missing field
        field: &'static str,
    },

    /// A field does not apply to the backend type.
    #[error("`{field}` is not valid for {kind} backends")]
    UnexpectedField {
        /// Backend type
        kind: &'static str,
        /// Offending field
        field: &'static str,
    },

    /// Unparseable log level.
    #[error("invalid log level `{0}`")]
    InvalidLevel(String),

    /// Table prefix is not a plain identifier.
    #[error("invalid table prefix `{0}`: only ASCII letters, digits and `_` are allowed")]
    InvalidTablePrefix(String),

    /// Options could not be parsed.
    #[error("malformed options: {0}")]
    Malformed(String),
}

/// Errors surfaced by the engine. Level methods never return these.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration rejected at construction.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// The backend could not be opened or connected at construction.
    #[error("failed to open {backend} backend: {source}")]
    Open {
        /// Backend kind
        backend: &'static str,
        /// Underlying failure
        #[source]
        source: BoxError,
    },

    /// Backend failure during an explicit operation.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Rotation failed; the previous sink is still active.
    #[error("rotation failed: {0}")]
    Rotation(#[source] BackendError),

    /// The dispatcher has shut down.
    #[error("dispatcher is shut down")]
    Closed,
}
