//! Centralised collection of errors and warnings produced while normalising descriptors and
//! converting data. The tracker is shared between concurrently converted tables, so all of
//! its methods take `&self`.

use crate::errors::IssueError;
use crate::options::{IssuePolicy, LogLevel};
use anyhow::{Error, Result};
use log::{error, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Error,
    Warning,
}

/// Position in the input a diagnostic refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![];
        if let Some(table) = &self.table {
            parts.push(format!("table {table}"));
        }
        if let Some(row) = self.row {
            parts.push(format!("row {row}"));
        }
        if let Some(column) = self.column {
            parts.push(format!("column {column}"));
        }
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: IssueType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            IssueType::Error => "error",
            IssueType::Warning => "warning",
        };
        match &self.location {
            Some(loc) if *loc != Location::default() => {
                write!(f, "{kind}: {} ({loc})", self.message)
            }
            _ => write!(f, "{kind}: {}", self.message),
        }
    }
}

/// Mutable cursor (table/row/column) attached to issues. Each table conversion owns one.
#[derive(Debug, Clone, Default)]
pub struct LocationTracker {
    current: Location,
}

impl LocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_table(table: &str) -> Self {
        Self {
            current: Location {
                table: Some(table.to_string()),
                row: None,
                column: None,
            },
        }
    }

    pub fn set_table(&mut self, table: Option<String>) {
        self.current.table = table;
        self.current.row = None;
        self.current.column = None;
    }

    pub fn set_row(&mut self, row: Option<u64>) {
        self.current.row = row;
        self.current.column = None;
    }

    pub fn set_column(&mut self, column: Option<usize>) {
        self.current.column = column;
    }

    pub fn location(&self) -> Location {
        self.current.clone()
    }
}

#[derive(Debug, Default)]
struct IssueLog {
    errors: Vec<Issue>,
    warnings: Vec<Issue>,
    all: Vec<Issue>,
    // index into `all` up to which `drain_new` has handed out issues
    drained: usize,
}

#[derive(Debug)]
pub struct IssueTracker {
    policy: IssuePolicy,
    level: LogLevel,
    log: Mutex<IssueLog>,
}

impl Default for IssueTracker {
    fn default() -> Self {
        Self::new(IssuePolicy::Collect, LogLevel::Warn)
    }
}

impl IssueTracker {
    pub fn new(policy: IssuePolicy, level: LogLevel) -> Self {
        Self {
            policy,
            level,
            log: Mutex::new(IssueLog::default()),
        }
    }

    pub fn throwing() -> Self {
        Self::new(IssuePolicy::Throw, LogLevel::Warn)
    }

    pub fn collecting() -> Self {
        Self::new(IssuePolicy::Collect, LogLevel::Warn)
    }

    pub fn policy(&self) -> IssuePolicy {
        self.policy
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Records an error. In `Throw` policy the error is returned so callers can propagate it
    /// with `?`; in `Collect` policy it is stored and `Ok(())` is returned.
    pub fn error(&self, message: impl Into<String>, location: Option<Location>) -> Result<()> {
        let issue = Issue {
            kind: IssueType::Error,
            message: message.into(),
            location,
        };
        error!("{}", issue);
        if self.policy.throws() {
            return Err(Error::new(IssueError { issue }));
        }
        self.push(issue);
        Ok(())
    }

    /// Records a warning. Warnings never interrupt processing.
    pub fn warning(&self, message: impl Into<String>, location: Option<Location>) {
        if !self.level.records_warnings() {
            return;
        }
        let issue = Issue {
            kind: IssueType::Warning,
            message: message.into(),
            location,
        };
        warn!("{}", issue);
        self.push(issue);
    }

    fn push(&self, issue: Issue) {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        match issue.kind {
            IssueType::Error => log.errors.push(issue.clone()),
            IssueType::Warning => log.warnings.push(issue.clone()),
        }
        log.all.push(issue);
    }

    pub fn get_errors(&self) -> Vec<Issue> {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.errors.clone()
    }

    pub fn get_warnings(&self) -> Vec<Issue> {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.warnings.clone()
    }

    pub fn has_errors(&self) -> bool {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        !log.errors.is_empty()
    }

    /// Returns the issues recorded since the previous call, in the order they were recorded.
    pub fn drain_new(&self) -> Vec<Issue> {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        let start = log.drained;
        log.drained = log.all.len();
        log.all[start..].to_vec()
    }
}
