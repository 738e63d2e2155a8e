//! Shared option types that replace boolean flag parameters in the Rust API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Controls what the issue tracker does with errors.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IssuePolicy {
    /// Raise the first error immediately; used by validation and negative-test paths.
    Throw,
    /// Accumulate every issue so a complete report can be produced.
    #[default]
    Collect,
}

impl IssuePolicy {
    pub fn throws(self) -> bool {
        matches!(self, IssuePolicy::Throw)
    }
}

impl From<bool> for IssuePolicy {
    fn from(value: bool) -> Self {
        if value {
            IssuePolicy::Throw
        } else {
            IssuePolicy::Collect
        }
    }
}

impl From<IssuePolicy> for bool {
    fn from(value: IssuePolicy) -> Self {
        value.throws()
    }
}

/// Verbosity of the conversion; also decides which issues are recorded.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Debug,
}

impl LogLevel {
    pub fn records_warnings(self) -> bool {
        self >= LogLevel::Warn
    }

    pub fn is_debug(self) -> bool {
        matches!(self, LogLevel::Debug)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Debug => write!(f, "debug"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "debug" => Ok(LogLevel::Debug),
            other => Err(anyhow::anyhow!("Unknown log level: {other}")),
        }
    }
}
