//! Embedded file store backend.
//!
//! Records are written to a local `SQLite` file through libsql, one row per
//! record in the shared column layout. Rotation renames the current file and
//! starts a fresh one at the configured path.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dblogger_core::backend::BoxError;
use dblogger_core::{Backend, BackendError, FileOptions, LogRecord, LogRow};
use libsql::{Builder, Connection, Database, Value};
use tracing::{debug, error, info};

fn create_table_sql(prefix: &str) -> String {
    let table = LogRow::table_name(prefix);
    format!(
        r#"
CREATE TABLE IF NOT EXISTS "{table}" (
    "id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "time" INTEGER NOT NULL,
    "level" INTEGER NOT NULL,
    "level_name" TEXT NOT NULL,
    "logger" TEXT NOT NULL,
    "hostname" TEXT NOT NULL,
    "pid" INTEGER NOT NULL,
    "source" TEXT,
    "line" INTEGER,
    "column" INTEGER,
    "tags" TEXT NOT NULL,
    "message" TEXT NOT NULL,
    "arguments" TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS "{table}_time" ON "{table}" ("time");
CREATE INDEX IF NOT EXISTS "{table}_level" ON "{table}" ("level");
CREATE INDEX IF NOT EXISTS "{table}_logger" ON "{table}" ("logger");
"#
    )
}

fn row_params(record: &LogRecord) -> Vec<Value> {
    let row = LogRow::from(record);
    vec![
        Value::Integer(row.time),
        Value::Integer(row.level.into()),
        Value::Text(row.level_name.to_string()),
        Value::Text(row.logger),
        Value::Text(row.hostname),
        Value::Integer(row.pid.into()),
        row.source.map_or(Value::Null, Value::Text),
        row.line.map_or(Value::Null, |line| Value::Integer(line.into())),
        row.column.map_or(Value::Null, |c| Value::Integer(c.into())),
        Value::Text(row.tags),
        Value::Text(row.message),
        Value::Text(row.arguments),
    ]
}

/// Rotated paths remembered by [`LibsqlBackend::rotated_files`].
const ROTATION_HISTORY: usize = 16;

/// Same failure for every record of a batch, sharing one source.
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

/// An open database file.
struct Store {
    // Keeps the database alive for as long as the connection is used.
    _database: Database,
    connection: Connection,
}

impl Store {
    async fn open(path: &Path, prefix: &str) -> Result<Self, Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Io("failed to create log directory", e))?;
        }

        let database = Builder::new_local(path).build().await?;
        let connection = database.connect()?;
        connection.execute_batch(&create_table_sql(prefix)).await?;

        Ok(Self {
            _database: database,
            connection,
        })
    }
}

/// File backend writing to a local libsql database.
pub struct LibsqlBackend {
    path: PathBuf,
    table_prefix: String,
    insert_sql: String,
    store: Option<Store>,
    rotated: Vec<PathBuf>,
}

impl std::fmt::Debug for LibsqlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibsqlBackend")
            .field("path", &self.path)
            .field("table_prefix", &self.table_prefix)
            .field("open", &self.store.is_some())
            .field("rotated", &self.rotated)
            .finish()
    }
}

impl LibsqlBackend {
    /// Opens (or creates) the store at `path`, creating parent directories
    /// and the log table as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub async fn open(
        path: impl Into<PathBuf>,
        table_prefix: impl Into<String>,
    ) -> Result<Self, Error> {
        let path = path.into();
        let table_prefix = table_prefix.into();
        let store = Store::open(&path, &table_prefix).await?;
        debug!(target: "dblogger", path = %path.display(), "opened file store");

        Ok(Self {
            insert_sql: LogRow::insert_sql(&table_prefix, |i| format!("?{i}")),
            path,
            table_prefix,
            store: Some(store),
            rotated: Vec::new(),
        })
    }

    /// Opens the store described by `options`.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub async fn from_options(options: &FileOptions) -> Result<Self, Error> {
        Self::open(options.path.clone(), options.table_prefix.clone()).await
    }

    /// Path records are written to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Files the store was moved to by the most recent rotations, oldest
    /// first. Only the last 16 are remembered.
    #[must_use]
    pub fn rotated_files(&self) -> &[PathBuf] {
        &self.rotated
    }

    fn connection(&self) -> Result<&Connection, BackendError> {
        self.store
            .as_ref()
            .map(|store| &store.connection)
            .ok_or(BackendError::Closed)
    }

    /// Free path next to the current file, named after the current UTC time.
    async fn rotation_target(&self) -> PathBuf {
        let mut base = OsString::from(self.path.as_os_str());
        base.push(format!(".{}", Utc::now().format("%Y%m%dT%H%M%S")));

        let mut candidate = PathBuf::from(&base);
        let mut n = 1;
        while tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            let mut name = base.clone();
            name.push(format!(".{n}"));
            candidate = PathBuf::from(name);
            n += 1;
        }
        candidate
    }
}

#[async_trait]
impl Backend for LibsqlBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn write(&mut self, record: &LogRecord) -> Result<(), BackendError> {
        self.connection()?
            .execute(&self.insert_sql, row_params(record))
            .await
            .map_err(|e| BackendError::write("failed to insert log row", e))?;
        Ok(())
    }

    async fn write_batch(&mut self, records: &[LogRecord]) -> Vec<Result<(), BackendError>> {
        let Ok(connection) = self.connection() else {
            return records.iter().map(|_| Err(BackendError::Closed)).collect();
        };

        let transaction = match connection.transaction().await {
            Ok(transaction) => transaction,
            Err(e) => return fail_all(records, "failed to begin log batch", e),
        };

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let outcome = transaction
                .execute(&self.insert_sql, row_params(record))
                .await
                .map(|_| ())
                .map_err(|e| BackendError::write("failed to insert log row", e));
            outcomes.push(outcome);
        }

        if let Err(e) = transaction.commit().await {
            return fail_all(records, "failed to commit log batch", e);
        }
        outcomes
    }

    async fn rotate(&mut self) -> Result<(), BackendError> {
        let moved_to = if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            let target = self.rotation_target().await;
            tokio::fs::rename(&self.path, &target)
                .await
                .map_err(|e| BackendError::rotation("failed to move log file aside", e))?;
            Some(target)
        } else {
            // Already moved away by an external tool; just reopen.
            None
        };

        match Store::open(&self.path, &self.table_prefix).await {
            Ok(store) => {
                // The previous handle is released only once its successor is ready.
                let previous = self.store.replace(store);
                drop(previous);
                info!(
                    target: "dblogger",
                    path = %self.path.display(),
                    moved_to = ?moved_to,
                    "rotated file store"
                );
                self.rotated.extend(moved_to);
                let excess = self.rotated.len().saturating_sub(ROTATION_HISTORY);
                self.rotated.drain(..excess);
                Ok(())
            }
            Err(e) => {
                if let Some(target) = &moved_to {
                    if let Err(undo) = tokio::fs::rename(target, &self.path).await {
                        error!(
                            target: "dblogger",
                            "failed to move {} back after a failed rotation: {undo}",
                            target.display()
                        );
                    }
                }
                Err(BackendError::rotation("failed to open new log file", e))
            }
        }
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.store = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dblogger_core::{DEFAULT_TABLE_PREFIX, Location, LogLevel, TagContext};
    use tempfile::tempdir;

    fn record(level: LogLevel, tags: &[&str], message: &str) -> LogRecord {
        LogRecord::new(
            level,
            "test".into(),
            TagContext::new().extend(tags.iter().copied()),
            vec![message.into()],
            Some(Location::caller()),
        )
    }

    async fn rows(path: &Path, prefix: &str) -> Vec<(i64, String, String)> {
        let database = Builder::new_local(path).build().await.unwrap();
        let connection = database.connect().unwrap();
        let mut rows = connection
            .query(
                &format!(
                    "SELECT level, tags, message FROM \"{}\" ORDER BY id",
                    LogRow::table_name(prefix)
                ),
                (),
            )
            .await
            .unwrap();

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            out.push((
                row.get::<i64>(0).unwrap(),
                row.get::<String>(1).unwrap(),
                row.get::<String>(2).unwrap(),
            ));
        }
        out
    }

    #[tokio::test]
    async fn writes_rows_in_shared_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/logs/app.db");
        let mut backend = LibsqlBackend::open(&path, DEFAULT_TABLE_PREFIX).await.unwrap();

        backend
            .write(&record(LogLevel::Info, &[], "a"))
            .await
            .unwrap();
        let outcomes = backend
            .write_batch(&[
                record(LogLevel::Warn, &["x"], "b"),
                record(LogLevel::Error, &["x", "x"], "c"),
            ])
            .await;
        assert!(outcomes.iter().all(Result::is_ok));
        backend.close().await.unwrap();

        assert_eq!(
            rows(&path, DEFAULT_TABLE_PREFIX).await,
            [
                (30, "[]".to_string(), "a".to_string()),
                (40, r#"["x"]"#.to_string(), "b".to_string()),
                (50, r#"["x","x"]"#.to_string(), "c".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn rotation_moves_file_aside_and_starts_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.db");
        let mut backend = LibsqlBackend::open(&path, "svc").await.unwrap();

        backend.write(&record(LogLevel::Info, &[], "old")).await.unwrap();
        backend.rotate().await.unwrap();
        backend.write(&record(LogLevel::Info, &[], "new")).await.unwrap();
        backend.rotate().await.unwrap();
        backend.close().await.unwrap();

        let rotated = backend.rotated_files().to_vec();
        assert_eq!(rotated.len(), 2);
        assert_ne!(rotated[0], rotated[1]);
        assert_eq!(rows(&rotated[0], "svc").await[0].2, "old");
        assert_eq!(rows(&rotated[1], "svc").await[0].2, "new");
        assert!(rows(&path, "svc").await.is_empty());
    }

    #[tokio::test]
    async fn rotation_history_keeps_the_newest_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.db");
        let mut backend = LibsqlBackend::open(&path, "svc").await.unwrap();

        for n in 0..ROTATION_HISTORY + 2 {
            backend
                .write(&record(LogLevel::Info, &[], &n.to_string()))
                .await
                .unwrap();
            backend.rotate().await.unwrap();
        }
        backend.close().await.unwrap();

        let rotated = backend.rotated_files();
        assert_eq!(rotated.len(), ROTATION_HISTORY);
        assert_eq!(rows(&rotated[0], "svc").await[0].2, "2");
        let newest = rotated.last().unwrap();
        assert_eq!(rows(newest, "svc").await[0].2, (ROTATION_HISTORY + 1).to_string());
    }

    #[test]
    fn batch_failure_keeps_the_source_chain() {
        let cause = BackendError::write(
            "flushing pages",
            std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full"),
        );
        let records = [
            record(LogLevel::Info, &[], "a"),
            record(LogLevel::Info, &[], "b"),
        ];

        let outcomes = fail_all(&records, "failed to commit log batch", cause);

        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            let error = outcome.as_ref().unwrap_err();
            let source = std::error::Error::source(error).unwrap();
            assert_eq!(source.to_string(), "flushing pages: disk full");
            assert_eq!(source.source().unwrap().to_string(), "disk full");
        }
    }

    #[tokio::test]
    async fn rotation_after_external_move_reopens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.db");
        let moved = dir.path().join("app.db.1");
        let mut backend = LibsqlBackend::open(&path, DEFAULT_TABLE_PREFIX).await.unwrap();
        backend.write(&record(LogLevel::Info, &[], "before")).await.unwrap();

        std::fs::rename(&path, &moved).unwrap();
        backend.rotate().await.unwrap();
        backend.write(&record(LogLevel::Info, &[], "after")).await.unwrap();
        backend.close().await.unwrap();

        assert!(backend.rotated_files().is_empty());
        assert_eq!(rows(&path, DEFAULT_TABLE_PREFIX).await[0].2, "after");
        assert_eq!(rows(&moved, DEFAULT_TABLE_PREFIX).await[0].2, "before");
    }

    #[tokio::test]
    async fn writes_after_close_fail() {
        let dir = tempdir().unwrap();
        let mut backend = LibsqlBackend::open(dir.path().join("app.db"), DEFAULT_TABLE_PREFIX)
            .await
            .unwrap();
        backend.close().await.unwrap();

        let result = backend.write(&record(LogLevel::Info, &[], "late")).await;
        assert!(matches!(result, Err(BackendError::Closed)));
    }
}
