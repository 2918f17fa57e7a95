//! Remote check execution boundary
//!
//! The readiness gate and the remote prerequisite checks only ever talk to a
//! node through [`RemoteCheckExecutor`]. Implementations decide how a failure
//! is classified; callers never re-classify.

use async_trait::async_trait;
use sloth_common::NodeDescriptor;
use std::fmt;

/// Opaque check script handed to the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckPayload(String);

impl CheckPayload {
    pub fn new(script: impl Into<String>) -> Self {
        Self(script.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CheckPayload {
    fn from(script: &str) -> Self {
        Self::new(script)
    }
}

impl From<String> for CheckPayload {
    fn from(script: String) -> Self {
        Self(script)
    }
}

/// How a failed check should be handled by the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckErrorKind {
    /// Retry on the next poll tick
    Transient,
    /// Abort the wait
    Fatal,
}

impl fmt::Display for CheckErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckErrorKind::Transient => write!(f, "transient"),
            CheckErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// A classified check failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} check error: {message}")]
pub struct CheckError {
    pub kind: CheckErrorKind,
    pub message: String,
}

impl CheckError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: CheckErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: CheckErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == CheckErrorKind::Fatal
    }
}

/// Executes a check payload on a node and returns its raw output
#[async_trait]
pub trait RemoteCheckExecutor: Send + Sync {
    async fn execute(
        &self,
        node: &NodeDescriptor,
        payload: &CheckPayload,
    ) -> Result<String, CheckError>;
}
