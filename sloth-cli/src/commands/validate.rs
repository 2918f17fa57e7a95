use crate::output::{self, OutputFormat};
use crate::Suite;
use anyhow::Result;
use serde::Serialize;
use sloth_health::validation::suites::{ingress_suite, rke_suite, wireguard_suite, SuiteOptions};
use sloth_health::{
    PrerequisiteValidationRunner, RemoteCheckExecutor, SharedCheck, SlothConfig, SshExecutor,
    ValidationOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;

#[derive(Tabled, Serialize)]
struct OutcomeRow {
    #[tabled(rename = "CHECK")]
    check: String,
    #[tabled(rename = "OK")]
    ok: String,
    #[tabled(rename = "MESSAGE")]
    message: String,
}

impl OutcomeRow {
    fn from_outcome(outcome: ValidationOutcome, format: OutputFormat) -> Self {
        Self {
            check: outcome.name,
            ok: match format {
                OutputFormat::Table => output::mark(outcome.success),
                _ => outcome.success.to_string(),
            },
            message: match outcome.error {
                Some(error) if format == OutputFormat::Table => {
                    format!("{} ({})", outcome.message, output::truncate(&error, 60))
                }
                _ => outcome.message,
            },
        }
    }
}

fn checks_for(suite: Suite, config: &SlothConfig) -> Vec<SharedCheck> {
    let executor: Arc<dyn RemoteCheckExecutor> = Arc::new(SshExecutor::new(&config.ssh));
    match suite {
        Suite::Rke => rke_suite(executor, &SuiteOptions::from(&config.validation)),
        Suite::Ingress => ingress_suite(executor),
        Suite::Wireguard => wireguard_suite(executor),
    }
}

pub async fn handle_validate(
    suite: Suite,
    timeout: Option<u64>,
    config: &SlothConfig,
    format: OutputFormat,
) -> Result<()> {
    let timeout = timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.validation.timeout());

    let runner = PrerequisiteValidationRunner::new();
    let result = runner
        .run_all(checks_for(suite, config), &config.nodes, timeout)
        .await;

    let summary = runner.summary().await;
    let rows: Vec<OutcomeRow> = summary
        .outcomes
        .into_iter()
        .map(|o| OutcomeRow::from_outcome(o, format))
        .collect();
    output::print_output(rows, format)?;

    match result {
        Ok(()) => {
            if format == OutputFormat::Table {
                output::print_success(&format!("{} checks passed", summary.passed));
            }
            Ok(())
        }
        Err(e) => {
            output::print_error(&format!(
                "{} passed, {} failed",
                summary.passed, summary.failed
            ));
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_sizes() {
        let config = SlothConfig::default();
        assert_eq!(checks_for(Suite::Rke, &config).len(), 10);
        assert_eq!(checks_for(Suite::Ingress, &config).len(), 3);
        assert_eq!(checks_for(Suite::Wireguard, &config).len(), 4);
    }

    #[test]
    fn test_outcome_row_keeps_error_in_table() {
        let outcome = ValidationOutcome {
            name: "Disk Space".to_string(),
            success: false,
            message: "insufficient disk space on worker-2".to_string(),
            error: Some("df failed".to_string()),
            timestamp: chrono::Utc::now(),
        };

        let row = OutcomeRow::from_outcome(outcome.clone(), OutputFormat::Table);
        assert_eq!(row.message, "insufficient disk space on worker-2 (df failed)");

        let row = OutcomeRow::from_outcome(outcome, OutputFormat::Yaml);
        assert_eq!(row.ok, "false");
        assert_eq!(row.message, "insufficient disk space on worker-2");
    }
}
