//! Driver statement logging.
//!
//! sqlx logs every statement it runs and, separately, statements slower than
//! a threshold. [`LogLevel`] is the level configured for a client; it is
//! translated into the driver's filters here and nowhere else.

use crate::error::PqError;
use clap::ValueEnum;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use sqlx::ConnectOptions;
use sqlx::postgres::PgConnectOptions;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// No driver logging at all
    Off,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Off => "off",
        }
    }

    /// Level at which the driver logs each executed statement.
    ///
    /// Routine statement logs never go above debug.
    pub fn statement_filter(&self) -> LevelFilter {
        match self {
            Self::Trace | Self::Debug | Self::Info => LevelFilter::Debug,
            Self::Warn => LevelFilter::Warn,
            Self::Error => LevelFilter::Error,
            Self::Off => LevelFilter::Off,
        }
    }

    /// Configure statement logging on `options`. Statements slower than
    /// `slow_threshold` are logged at warn unless logging is off.
    pub fn apply(
        &self,
        options: PgConnectOptions,
        slow_threshold: Option<Duration>,
    ) -> PgConnectOptions {
        if *self == Self::Off {
            return options.disable_statement_logging();
        }
        let options = options.log_statements(self.statement_filter());
        match slow_threshold {
            Some(threshold) if !threshold.is_zero() => {
                options.log_slow_statements(LevelFilter::Warn, threshold)
            }
            _ => options.log_slow_statements(LevelFilter::Off, Duration::ZERO),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = PqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "off" | "none" => Ok(Self::Off),
            other => Err(PqError::config(format!("unknown log level '{other}'"))),
        }
    }
}
