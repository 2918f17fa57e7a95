//! Prerequisite validation runner
//!
//! Runs a list of independent named checks in parallel before a major
//! operation. There is no fail-fast: every check runs to completion or to the
//! shared deadline, and all failures come back as one aggregated error.

pub mod suites;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sloth_common::NodeDescriptor;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::{FailedValidation, ValidationError};

/// What a check reports back; the runner stamps name and time on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckVerdict {
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
}

impl CheckVerdict {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Recorded result of one check in one run. Written once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationOutcome {
    pub name: String,
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ValidationOutcome {
    fn from_verdict(name: String, verdict: CheckVerdict) -> Self {
        Self {
            name,
            success: verdict.success,
            message: verdict.message,
            error: verdict.error,
            timestamp: Utc::now(),
        }
    }

    fn failed(name: String, message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name,
            success: false,
            message: message.into(),
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// A named prerequisite check
#[async_trait]
pub trait PrerequisiteCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, nodes: &[NodeDescriptor]) -> CheckVerdict;
}

pub type SharedCheck = Arc<dyn PrerequisiteCheck>;

/// Check backed by a plain function over the node list
pub struct FnCheck<F> {
    name: String,
    f: F,
}

impl<F> FnCheck<F>
where
    F: Fn(&[NodeDescriptor]) -> CheckVerdict + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    pub fn shared(name: impl Into<String>, f: F) -> SharedCheck {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F> PrerequisiteCheck for FnCheck<F>
where
    F: Fn(&[NodeDescriptor]) -> CheckVerdict + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, nodes: &[NodeDescriptor]) -> CheckVerdict {
        (self.f)(nodes)
    }
}

/// Runs prerequisite checks concurrently and keeps the last run's outcomes
#[derive(Debug, Clone, Default)]
pub struct PrerequisiteValidationRunner {
    results: Arc<RwLock<HashMap<String, ValidationOutcome>>>,
}

impl PrerequisiteValidationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every check in parallel against `nodes`.
    ///
    /// A check still running when `timeout` elapses is aborted and recorded
    /// as failed. Returns one error naming every failed check, in the order
    /// the checks were given.
    pub async fn run_all(
        &self,
        checks: Vec<SharedCheck>,
        nodes: &[NodeDescriptor],
        timeout: Duration,
    ) -> Result<(), ValidationError> {
        if checks.is_empty() {
            return Err(ValidationError::NoValidations);
        }
        let mut names = HashSet::new();
        for check in &checks {
            if !names.insert(check.name()) {
                return Err(ValidationError::DuplicateName(check.name().to_string()));
            }
        }

        self.results.write().await.clear();
        info!(checks = checks.len(), nodes = nodes.len(), "Running prerequisite validations");

        let nodes: Arc<[NodeDescriptor]> = Arc::from(nodes);
        let deadline = Instant::now() + timeout;

        // Checks run as JoinSet tasks, so dropping this future aborts them all
        let mut join_set = JoinSet::new();
        let mut index_of = HashMap::new();
        for (index, check) in checks.iter().enumerate() {
            let check = check.clone();
            let nodes = nodes.clone();
            let handle = join_set.spawn(async move {
                tokio::time::timeout_at(deadline, check.check(&nodes)).await
            });
            index_of.insert(handle.id(), index);
        }

        let mut outcomes: Vec<Option<ValidationOutcome>> = vec![None; checks.len()];
        while let Some(joined) = join_set.join_next_with_id().await {
            let (id, finished) = match joined {
                Ok((id, finished)) => (id, Ok(finished)),
                Err(e) => (e.id(), Err(e)),
            };
            let Some(&index) = index_of.get(&id) else {
                error!(task = %id, "Validation task with unknown id");
                continue;
            };

            let name = checks[index].name().to_string();
            let outcome = match finished {
                Ok(Ok(verdict)) => ValidationOutcome::from_verdict(name, verdict),
                Ok(Err(_)) => ValidationOutcome::failed(
                    name,
                    format!("timed out after {:?}", timeout),
                    "validation timeout",
                ),
                Err(e) => {
                    ValidationOutcome::failed(name, "validation check panicked", e.to_string())
                }
            };

            if outcome.success {
                info!(validation = %outcome.name, "Validation passed: {}", outcome.message);
            } else {
                warn!(validation = %outcome.name, "Validation failed: {}", outcome.message);
            }
            self.results
                .write()
                .await
                .insert(outcome.name.clone(), outcome.clone());
            outcomes[index] = Some(outcome);
        }

        let mut failures = Vec::new();
        for (check, outcome) in checks.iter().zip(outcomes) {
            let outcome = match outcome {
                Some(outcome) => outcome,
                None => {
                    // Task lost (runtime shutting down); record it as failed
                    let outcome = ValidationOutcome::failed(
                        check.name().to_string(),
                        "validation task did not complete",
                        "task error",
                    );
                    self.results
                        .write()
                        .await
                        .insert(outcome.name.clone(), outcome.clone());
                    outcome
                }
            };

            if !outcome.success {
                failures.push(FailedValidation {
                    name: outcome.name,
                    message: outcome.message,
                });
            }
        }

        if failures.is_empty() {
            info!("All validations passed!");
            Ok(())
        } else {
            Err(ValidationError::Failed { failures })
        }
    }

    /// Outcomes of the last run, keyed by check name
    pub async fn results(&self) -> HashMap<String, ValidationOutcome> {
        self.results.read().await.clone()
    }

    pub async fn summary(&self) -> ValidationSummary {
        let mut outcomes: Vec<ValidationOutcome> =
            self.results.read().await.values().cloned().collect();
        outcomes.sort_by(|a, b| a.name.cmp(&b.name));

        ValidationSummary {
            passed: outcomes.iter().filter(|o| o.success).count(),
            failed: outcomes.iter().filter(|o| !o.success).count(),
            outcomes,
        }
    }

    /// Log one line per outcome followed by the totals
    pub async fn log_summary(&self) {
        let summary = self.summary().await;
        info!("Validation Summary");
        for outcome in &summary.outcomes {
            if outcome.success {
                info!("✓ {}: {}", outcome.name, outcome.message);
            } else {
                warn!("✗ {}: {}", outcome.name, outcome.message);
            }
        }
        info!("Total: {} passed, {} failed", summary.passed, summary.failed);
    }
}

/// Totals and per-check lines of the last run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub passed: usize,
    pub failed: usize,
    pub outcomes: Vec<ValidationOutcome>,
}

impl fmt::Display for ValidationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            let mark = if outcome.success { "✓" } else { "✗" };
            writeln!(f, "{} {}: {}", mark, outcome.name, outcome.message)?;
        }
        write!(f, "Total: {} passed, {} failed", self.passed, self.failed)
    }
}
