//! Logger configuration: which backend, what threshold, where to write

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::{ConfigError, LogLevel};

/// Logger name used when the options do not name one.
pub const DEFAULT_LOGGER_NAME: &str = "default";

/// Table prefix used by the SQL backends when none is configured.
pub const DEFAULT_TABLE_PREFIX: &str = "logger";

/// Port used for network backends when none is configured.
pub const DEFAULT_PORT: u16 = 5432;

/// Settings shared by every backend kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonOptions {
    /// Threshold; records below it are suppressed
    pub level: LogLevel,
    /// Mirror records to stdout/stderr
    pub stdout: bool,
    /// Name recorded on every record
    pub logger: String,
}

impl Default for CommonOptions {
    fn default() -> Self {
        Self::new(LogLevel::Trace)
    }
}

impl CommonOptions {
    /// Defaults with the given threshold.
    #[must_use]
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            stdout: false,
            logger: DEFAULT_LOGGER_NAME.to_string(),
        }
    }
}

/// Embedded file store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOptions {
    /// Shared settings
    pub common: CommonOptions,
    /// Database file
    pub path: PathBuf,
    /// Prefix of the log table
    pub table_prefix: String,
}

impl FileOptions {
    /// File store at `path` with default settings.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            common: CommonOptions::default(),
            path: path.into(),
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
        }
    }
}

/// Remote relational store.
#[derive(Clone, PartialEq, Eq)]
pub struct NetworkOptions {
    /// Shared settings
    pub common: CommonOptions,
    /// Database name
    pub database: String,
    /// Login role
    pub user: String,
    /// Password, if the server requires one
    pub password: Option<String>,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Prefix of the log table
    pub table_prefix: String,
}

impl NetworkOptions {
    /// Network store with default port and settings.
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            common: CommonOptions::default(),
            database: database.into(),
            user: user.into(),
            password: None,
            host: host.into(),
            port: DEFAULT_PORT,
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
        }
    }
}

impl fmt::Debug for NetworkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkOptions")
            .field("common", &self.common)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("table_prefix", &self.table_prefix)
            .finish()
    }
}

/// Validated configuration. Exactly one backend kind is active.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawOptions")]
pub enum Options {
    /// Records are filtered and optionally mirrored but not persisted.
    None(CommonOptions),
    /// Records go to an embedded file store.
    File(FileOptions),
    /// Records go to a remote relational store.
    Network(NetworkOptions),
}

impl Default for Options {
    fn default() -> Self {
        Self::None(CommonOptions::default())
    }
}

impl Options {
    /// Settings shared by every kind.
    #[must_use]
    pub const fn common(&self) -> &CommonOptions {
        match self {
            Self::None(common) => common,
            Self::File(file) => &file.common,
            Self::Network(network) => &network.common,
        }
    }

    /// Mutable access to the shared settings.
    pub fn common_mut(&mut self) -> &mut CommonOptions {
        match self {
            Self::None(common) => common,
            Self::File(file) => &mut file.common,
            Self::Network(network) => &mut network.common,
        }
    }

    /// Backend kind as written in configuration.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::None(_) => "none",
            Self::File(_) => "file",
            Self::Network(_) => "network",
        }
    }

    /// Parses and validates a JSON options object.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] describing the first problem found.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawOptions =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        raw.try_into()
    }

    /// Validates an already parsed JSON value.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] describing the first problem found.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let raw: RawOptions =
            serde_json::from_value(value).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        raw.try_into()
    }
}

impl From<FileOptions> for Options {
    fn from(options: FileOptions) -> Self {
        Self::File(options)
    }
}

impl From<NetworkOptions> for Options {
    fn from(options: NetworkOptions) -> Self {
        Self::Network(options)
    }
}

/// What a logger tree is built from: a bare level or full options.
///
/// A bare level is shorthand for `{ type: "none", level, stdout: false }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LoggerSpec {
    /// Threshold only; nothing is persisted
    Level(LogLevel),
    /// Full options
    Options(Options),
}

impl LoggerSpec {
    /// Expands the shorthand form.
    #[must_use]
    pub fn into_options(self) -> Options {
        match self {
            Self::Level(level) => Options::None(CommonOptions::new(level)),
            Self::Options(options) => options,
        }
    }

    /// Parses either a level (`"info"`, `30`) or an options object.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] for an invalid level or invalid options.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        if value.is_object() {
            return Options::from_value(value).map(Self::Options);
        }
        serde_json::from_value(value)
            .map(Self::Level)
            .map_err(|e| ConfigError::InvalidLevel(e.to_string()))
    }
}

impl From<LogLevel> for LoggerSpec {
    fn from(level: LogLevel) -> Self {
        Self::Level(level)
    }
}

impl From<Options> for LoggerSpec {
    fn from(options: Options) -> Self {
        Self::Options(options)
    }
}

impl From<FileOptions> for LoggerSpec {
    fn from(options: FileOptions) -> Self {
        Self::Options(options.into())
    }
}

impl From<NetworkOptions> for LoggerSpec {
    fn from(options: NetworkOptions) -> Self {
        Self::Options(options.into())
    }
}

/// Options as written by users, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawOptions {
    #[serde(rename = "type")]
    kind: Option<String>,
    level: Option<LogLevel>,
    stdout: Option<bool>,
    logger: Option<String>,
    name: Option<String>,
    user: Option<String>,
    password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    table_prefix: Option<String>,
}

impl RawOptions {
    fn common(&self) -> CommonOptions {
        CommonOptions {
            level: self.level.unwrap_or_default(),
            stdout: self.stdout.unwrap_or(false),
            logger: self
                .logger
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_LOGGER_NAME.to_string()),
        }
    }

    fn reject(&self, kind: &'static str, fields: &[&'static str]) -> Result<(), ConfigError> {
        for &field in fields {
            let present = match field {
                "name" => self.name.is_some(),
                "user" => self.user.is_some(),
                "password" => self.password.is_some(),
                "host" => self.host.is_some(),
                "port" => self.port.is_some(),
                "tablePrefix" => self.table_prefix.is_some(),
                _ => false,
            };
            if present {
                return Err(ConfigError::UnexpectedField { kind, field });
            }
        }
        Ok(())
    }

    fn table_prefix(&mut self) -> Result<String, ConfigError> {
        let prefix = self
            .table_prefix
            .take()
            .unwrap_or_else(|| DEFAULT_TABLE_PREFIX.to_string());
        let valid = prefix
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid {
            Ok(prefix)
        } else {
            Err(ConfigError::InvalidTablePrefix(prefix))
        }
    }
}

fn required(
    value: Option<String>,
    kind: &'static str,
    field: &'static str,
) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingField { kind, field })
}

impl TryFrom<RawOptions> for Options {
    type Error = ConfigError;

    fn try_from(mut raw: RawOptions) -> Result<Self, Self::Error> {
        let kind = raw.kind.take().ok_or(ConfigError::MissingType)?;
        let common = raw.common();

        match kind.to_ascii_lowercase().as_str() {
            "none" => {
                raw.reject(
                    "none",
                    &["name", "user", "password", "host", "port", "tablePrefix"],
                )?;
                Ok(Self::None(common))
            }
            "file" | "sqlite" => {
                raw.reject("file", &["user", "password", "host", "port"])?;
                let path = required(raw.name.take(), "file", "name")?;
                Ok(Self::File(FileOptions {
                    common,
                    path: PathBuf::from(path),
                    table_prefix: raw.table_prefix()?,
                }))
            }
            "network" | "postgres" | "postgresql" => {
                let host = required(raw.host.take(), "network", "host")?;
                let database = required(raw.name.take(), "network", "name")?;
                let user = required(raw.user.take(), "network", "user")?;
                Ok(Self::Network(NetworkOptions {
                    common,
                    database,
                    user,
                    password: raw.password.take(),
                    host,
                    port: raw.port.unwrap_or(DEFAULT_PORT),
                    table_prefix: raw.table_prefix()?,
                }))
            }
            _ => Err(ConfigError::UnknownType(kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_options_from_json() {
        let options =
            Options::from_json(r#"{"type":"file","name":"./t.db","stdout":true,"level":"info"}"#)
                .unwrap();

        let Options::File(file) = options else {
            panic!("expected file options, got {options:?}");
        };
        assert_eq!(file.path, PathBuf::from("./t.db"));
        assert_eq!(file.common.level, LogLevel::Info);
        assert!(file.common.stdout);
        assert_eq!(file.common.logger, DEFAULT_LOGGER_NAME);
        assert_eq!(file.table_prefix, DEFAULT_TABLE_PREFIX);
    }

    #[test]
    fn network_options_default_port_and_accept_alias() {
        let options = Options::from_json(
            r#"{"type":"postgres","name":"logs","user":"app","password":"hunter2","host":"db","level":40,"logger":"api","tablePrefix":"svc"}"#,
        )
        .unwrap();

        let Options::Network(network) = options else {
            panic!("expected network options, got {options:?}");
        };
        assert_eq!(network.port, DEFAULT_PORT);
        assert_eq!(network.common.level, LogLevel::Warn);
        assert_eq!(network.common.logger, "api");
        assert_eq!(network.table_prefix, "svc");
        assert_eq!(network.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn password_is_redacted_from_debug() {
        let mut network = NetworkOptions::new("db", "logs", "app");
        network.password = Some("hunter2".into());

        let debug = format!("{network:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn invalid_combinations_are_errors() {
        let cases = [
            (r#"{"level":"info"}"#, ConfigError::MissingType),
            (
                r#"{"type":"syslog"}"#,
                ConfigError::UnknownType("syslog".into()),
            ),
            (
                r#"{"type":"network","name":"logs","user":"app"}"#,
                ConfigError::MissingField {
                    kind: "network",
                    field: "host",
                },
            ),
            (
                r#"{"type":"file"}"#,
                ConfigError::MissingField {
                    kind: "file",
                    field: "name",
                },
            ),
            (
                r#"{"type":"file","name":"t.db","host":"db"}"#,
                ConfigError::UnexpectedField {
                    kind: "file",
                    field: "host",
                },
            ),
            (
                r#"{"type":"none","name":"t.db"}"#,
                ConfigError::UnexpectedField {
                    kind: "none",
                    field: "name",
                },
            ),
            (
                r#"{"type":"file","name":"t.db","tablePrefix":"x; drop table"}"#,
                ConfigError::InvalidTablePrefix("x; drop table".into()),
            ),
        ];

        for (json, expected) in cases {
            assert_eq!(Options::from_json(json), Err(expected), "{json}");
        }
    }

    #[test]
    fn unknown_keys_and_bad_levels_are_malformed() {
        assert!(matches!(
            Options::from_json(r#"{"type":"none","colour":true}"#),
            Err(ConfigError::Malformed(_))
        ));
        assert!(matches!(
            Options::from_json(r#"{"type":"none","level":"loud"}"#),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn bare_level_is_shorthand_for_none() {
        for json in [r#""warn""#, "40"] {
            let spec = LoggerSpec::from_json(json).unwrap();
            assert_eq!(
                spec.into_options(),
                Options::None(CommonOptions::new(LogLevel::Warn))
            );
        }
        assert!(matches!(
            LoggerSpec::from_json("true"),
            Err(ConfigError::InvalidLevel(_))
        ));
    }

    #[test]
    fn logger_spec_deserializes_untagged() {
        let spec: LoggerSpec = serde_json::from_str(r#"{"type":"none","stdout":true}"#).unwrap();
        let options = spec.into_options();
        assert_eq!(options.kind(), "none");
        assert!(options.common().stdout);
        assert_eq!(options.common().level, LogLevel::Trace);
    }
}
