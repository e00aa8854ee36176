//! Connection seam between the backend and the server

use async_trait::async_trait;
use dblogger_core::backend::BoxError;
use dblogger_core::{LogRecord, LogRow};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Statement};
use tracing::warn;

use crate::{Error, PostgresConfig};

/// An open connection able to insert log rows.
#[async_trait]
pub(crate) trait Session: Send {
    /// Inserts one record.
    async fn insert(&mut self, record: &LogRecord) -> Result<(), BoxError>;

    /// Inserts every record or none of them.
    async fn insert_all(&mut self, records: &[LogRecord]) -> Result<(), BoxError>;

    /// True once the connection is gone.
    fn is_closed(&self) -> bool;
}

/// Opens [`Session`]s.
#[async_trait]
pub(crate) trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Session>, BoxError>;
}

pub(crate) fn create_table_sql(prefix: &str) -> String {
    let table = LogRow::table_name(prefix);
    format!(
        r#"
CREATE TABLE IF NOT EXISTS "{table}" (
    "id" BIGSERIAL PRIMARY KEY,
    "time" BIGINT NOT NULL,
    "level" SMALLINT NOT NULL,
    "level_name" TEXT NOT NULL,
    "logger" TEXT NOT NULL,
    "hostname" TEXT NOT NULL,
    "pid" BIGINT NOT NULL,
    "source" TEXT,
    "line" BIGINT,
    "column" BIGINT,
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

/// [`LogRow`] converted to the column types of the table.
pub(crate) struct SqlRow {
    time: i64,
    pub(crate) level: i16,
    level_name: &'static str,
    logger: String,
    hostname: String,
    pub(crate) pid: i64,
    source: Option<String>,
    line: Option<i64>,
    column: Option<i64>,
    pub(crate) tags: String,
    message: String,
    arguments: String,
}

impl From<&LogRecord> for SqlRow {
    fn from(record: &LogRecord) -> Self {
        let row = LogRow::from(record);
        Self {
            time: row.time,
            level: row.level.into(),
            level_name: row.level_name,
            logger: row.logger,
            hostname: row.hostname,
            pid: row.pid.into(),
            source: row.source,
            line: row.line.map(i64::from),
            column: row.column.map(i64::from),
            tags: row.tags,
            message: row.message,
            arguments: row.arguments,
        }
    }
}

impl SqlRow {
    pub(crate) fn params(&self) -> [&(dyn ToSql + Sync); 12] {
        [
            &self.time,
            &self.level,
            &self.level_name,
            &self.logger,
            &self.hostname,
            &self.pid,
            &self.source,
            &self.line,
            &self.column,
            &self.tags,
            &self.message,
            &self.arguments,
        ]
    }
}

fn database(e: tokio_postgres::Error) -> BoxError {
    Error::from(e).into()
}

/// Session on a real server, with its prepared insert.
struct PgSession {
    client: Client,
    insert: Statement,
}

#[async_trait]
impl Session for PgSession {
    async fn insert(&mut self, record: &LogRecord) -> Result<(), BoxError> {
        let row = SqlRow::from(record);
        self.client
            .execute(&self.insert, &row.params())
            .await
            .map_err(database)?;
        Ok(())
    }

    async fn insert_all(&mut self, records: &[LogRecord]) -> Result<(), BoxError> {
        let transaction = self.client.transaction().await.map_err(database)?;
        for record in records {
            let row = SqlRow::from(record);
            transaction
                .execute(&self.insert, &row.params())
                .await
                .map_err(database)?;
        }
        transaction.commit().await.map_err(database)
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

/// Connects to the server described by a [`PostgresConfig`].
pub(crate) struct PgConnector {
    config: PostgresConfig,
}

impl PgConnector {
    pub(crate) const fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    async fn open(&self) -> Result<PgSession, tokio_postgres::Error> {
        let (client, connection) = self.config.client_config().connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(target: "dblogger", "postgres connection ended: {e}");
            }
        });

        client
            .batch_execute(&create_table_sql(&self.config.table_prefix))
            .await?;
        let insert = client
            .prepare(&LogRow::insert_sql(&self.config.table_prefix, |i| {
                format!("${i}")
            }))
            .await?;

        Ok(PgSession { client, insert })
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, BoxError> {
        let session = self.open().await.map_err(database)?;
        Ok(Box::new(session))
    }
}
