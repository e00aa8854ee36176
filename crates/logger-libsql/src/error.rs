use thiserror::Error;

/// Errors opening or preparing a file store.
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem failure.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// Store failure.
    #[error(transparent)]
    Libsql(#[from] libsql::Error),
}
