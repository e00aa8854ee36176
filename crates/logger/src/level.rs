//! Log levels and threshold filtering

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

/// Severity of a log record. Ordering follows the numeric value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    /// Very fine grained diagnostics
    #[default]
    Trace = 10,
    /// Debugging information
    Debug = 20,
    /// Normal operational messages
    Info = 30,
    /// Something unexpected that the process recovered from
    Warn = 40,
    /// A failed operation
    Error = 50,
    /// The process cannot continue
    Fatal = 60,
}

impl LogLevel {
    /// `log` is a distinct call name for the `Info` level.
    pub const LOG: Self = Self::Info;

    /// All levels in ascending order.
    pub const ALL: [Self; 6] = [
        Self::Trace,
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Fatal,
    ];

    /// Numeric value of the level.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Upper-case name of the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    /// Level with exactly this numeric value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            10 => Some(Self::Trace),
            20 => Some(Self::Debug),
            30 => Some(Self::Info),
            40 => Some(Self::Warn),
            50 => Some(Self::Error),
            60 => Some(Self::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" | "log" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(Self::from_u8)
                .ok_or_else(|| ConfigError::InvalidLevel(s.to_string())),
        }
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LevelVisitor;

        impl Visitor<'_> for LevelVisitor {
            type Value = LogLevel;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a log level number (10..=60) or name")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<LogLevel, E> {
                u8::try_from(v)
                    .ok()
                    .and_then(LogLevel::from_u8)
                    .ok_or_else(|| E::custom(format!("invalid log level {v}")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<LogLevel, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom(format!("invalid log level {v}")))
                    .and_then(|v| self.visit_u64(v))
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            fn visit_f64<E: de::Error>(self, v: f64) -> Result<LogLevel, E> {
                if v.fract() == 0.0 && (0.0..=255.0).contains(&v) {
                    self.visit_u64(v as u64)
                } else {
                    Err(E::custom(format!("invalid log level {v}")))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<LogLevel, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(LevelVisitor)
    }
}

/// True iff a record at `level` passes `threshold`.
#[inline]
#[must_use]
pub fn should_log(level: LogLevel, threshold: LogLevel) -> bool {
    level >= threshold
}

/// Threshold gate evaluated before a record is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LevelFilter {
    threshold: LogLevel,
}

impl LevelFilter {
    /// Filter that passes `threshold` and everything above it.
    #[must_use]
    pub const fn new(threshold: LogLevel) -> Self {
        Self { threshold }
    }

    /// The configured threshold.
    #[must_use]
    pub const fn threshold(self) -> LogLevel {
        self.threshold
    }

    /// See [`should_log`].
    #[inline]
    #[must_use]
    pub fn should_log(self, level: LogLevel) -> bool {
        should_log(level, self.threshold)
    }
}
