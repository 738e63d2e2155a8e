// Errors raised by the conversion engine

use crate::issues::Issue;
use std::fmt;

/// Raised by the issue tracker when its policy is to throw on errors.
#[derive(Debug, Clone)]
pub struct IssueError {
    pub issue: Issue,
}

impl fmt::Display for IssueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.issue)
    }
}

impl std::error::Error for IssueError {}

/// Convertors are single use; a second `convert` call fails with this error.
#[derive(Debug)]
pub struct ConvertorUsedError;

impl fmt::Display for ConvertorUsedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Convertor instance was already used, create a new one")
    }
}

impl std::error::Error for ConvertorUsedError {}

#[derive(Debug)]
pub struct RetrievalError {
    pub url: String,
    pub reason: String,
}

impl fmt::Display for RetrievalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Failed to retrieve {}: {}", self.url, self.reason)
    }
}

impl std::error::Error for RetrievalError {}
