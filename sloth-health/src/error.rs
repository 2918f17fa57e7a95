//! Terminal errors returned by the readiness gate and the validation runner
//!
//! Each wait or run yields exactly one of these (or success). Per-node and
//! per-check detail stays queryable afterwards through the status surfaces.

use std::time::Duration;

use crate::status::ReadinessSummary;

/// Why a readiness wait did not succeed
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReadinessError {
    #[error("no nodes supplied")]
    NoNodes,

    #[error("no required services supplied")]
    NoServices,

    #[error("invalid readiness request: {0}")]
    InvalidRequest(String),

    #[error("node {node} health check failed: {message}")]
    Fatal { node: String, message: String },

    #[error("timeout after {timeout:?} waiting for nodes to be ready: {summary}")]
    Timeout {
        timeout: Duration,
        summary: ReadinessSummary,
    },

    #[error("readiness wait cancelled")]
    Cancelled,
}

impl ReadinessError {
    /// Store snapshot attached to a timeout
    pub fn summary(&self) -> Option<&ReadinessSummary> {
        match self {
            ReadinessError::Timeout { summary, .. } => Some(summary),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ReadinessError::Timeout { .. })
    }
}

/// One failed prerequisite check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedValidation {
    pub name: String,
    pub message: String,
}

impl std::fmt::Display for FailedValidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.name, self.message)
    }
}

/// Why a prerequisite validation run did not succeed
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("no validations supplied")]
    NoValidations,

    #[error("duplicate validation name: {0}")]
    DuplicateName(String),

    #[error("validation failed: {}", join_failures(.failures))]
    Failed { failures: Vec<FailedValidation> },
}

impl ValidationError {
    /// Names of every failed check, in submission order
    pub fn failed_names(&self) -> Vec<&str> {
        match self {
            ValidationError::Failed { failures } => {
                failures.iter().map(|f| f.name.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn join_failures(failures: &[FailedValidation]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
