use crate::output::{self, OutputFormat};
use crate::WaitArgs;
use anyhow::Result;
use serde::Serialize;
use sloth_health::{
    wait_for_signal, DoneSignal, NodeHealthRecord, NodeReadinessGate, SlothConfig, SshExecutor,
    INGRESS_SERVICES, KUBERNETES_SERVICES,
};
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;
use tracing::warn;

/// What a wait command waits for
#[derive(Debug, Clone)]
pub enum WaitTarget {
    Services(Vec<String>),
    Kubernetes,
    Ingress,
}

impl WaitTarget {
    fn services(&self) -> Vec<String> {
        match self {
            WaitTarget::Services(services) => services.clone(),
            WaitTarget::Kubernetes => KUBERNETES_SERVICES.iter().map(|s| s.to_string()).collect(),
            WaitTarget::Ingress => INGRESS_SERVICES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Tabled, Serialize)]
struct NodeStatusRow {
    #[tabled(rename = "NODE")]
    node: String,
    #[tabled(rename = "READY")]
    ready: String,
    #[tabled(rename = "PHASE")]
    phase: String,
    #[tabled(rename = "UNHEALTHY SERVICES")]
    unhealthy: String,
    #[tabled(rename = "LAST CHECK")]
    last_check: String,
    #[tabled(rename = "LAST ERROR")]
    last_error: String,
}

impl NodeStatusRow {
    fn from_record(record: NodeHealthRecord, format: OutputFormat) -> Self {
        let last_error = record.last_error.clone().unwrap_or_default();
        Self {
            ready: match format {
                OutputFormat::Table => output::mark(record.is_healthy),
                _ => record.is_healthy.to_string(),
            },
            phase: record.phase.to_string(),
            unhealthy: record.failing_services().join(", "),
            last_check: record
                .last_check
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            last_error: match format {
                OutputFormat::Table => output::truncate(&last_error, 48),
                _ => last_error,
            },
            node: record.node_name,
        }
    }
}

pub async fn handle_wait(
    target: WaitTarget,
    args: &WaitArgs,
    config: &SlothConfig,
    format: OutputFormat,
) -> Result<()> {
    let nodes = super::select_nodes(config, &args.nodes)?;

    let mut request = config.readiness.request(target.services());
    if let Some(secs) = args.timeout {
        request = request.with_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = args.interval {
        request = request.with_poll_interval(Duration::from_secs(secs));
    }

    let executor = Arc::new(SshExecutor::new(&config.ssh));
    let gate = NodeReadinessGate::new(executor).with_grace_period(config.readiness.grace_period());

    // Ctrl-C ends the wait cleanly instead of killing in-flight ssh sessions
    let cancel = DoneSignal::new();
    let listener = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = wait_for_signal(cancel).await {
                warn!("Failed to install signal handlers: {}", e);
            }
        })
    };

    if format == OutputFormat::Table {
        output::print_info(&format!(
            "Waiting up to {} for {} on {} nodes",
            output::format_duration(request.timeout.as_secs()),
            target.services().join(", "),
            nodes.len()
        ));
    }

    let result = gate.wait_for_ready_until(&nodes, &request, cancel).await;
    listener.abort();

    let mut records: Vec<NodeHealthRecord> = gate.all_statuses().await.into_values().collect();
    records.sort_by(|a, b| a.node_name.cmp(&b.node_name));
    if !records.is_empty() {
        let rows = records
            .into_iter()
            .map(|r| NodeStatusRow::from_record(r, format))
            .collect();
        output::print_output::<NodeStatusRow>(rows, format)?;
    }

    match result {
        Ok(()) => {
            if format == OutputFormat::Table {
                output::print_success(&format!("All {} nodes are ready", nodes.len()));
            }
            Ok(())
        }
        Err(e) => {
            output::print_error(&e.to_string());
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sloth_health::NodePhase;

    #[test]
    fn test_preset_services() {
        assert_eq!(
            WaitTarget::Kubernetes.services(),
            vec!["docker", "kubelet", "kubernetes", "etcd"]
        );
        assert_eq!(WaitTarget::Ingress.services(), vec!["nginx", "kubernetes"]);
    }

    #[test]
    fn test_status_row_for_json() {
        let mut record = NodeHealthRecord::new("worker-1");
        record.phase = NodePhase::Polling;
        record.services.insert("docker".to_string(), false);
        record.services.insert("kubelet".to_string(), true);
        record.last_error = Some("connection refused".to_string());

        let row = NodeStatusRow::from_record(record, OutputFormat::Json);
        assert_eq!(row.node, "worker-1");
        assert_eq!(row.ready, "false");
        assert_eq!(row.phase, "polling");
        assert_eq!(row.unhealthy, "docker");
        assert_eq!(row.last_check, "-");
        assert_eq!(row.last_error, "connection refused");
    }
}
