//! Node readiness gate
//!
//! Polls every node concurrently until all of them report every required
//! service healthy, a poller hits a fatal error, the deadline passes, or the
//! caller cancels.
//!
//! ```text
//!  poller(node-1) ──┐ execute → evaluate → StatusStore
//!  poller(node-2) ──┼──▶ PollEvent ──▶ aggregator ──▶ Ok / Fatal / Timeout / Cancelled
//!  poller(node-N) ──┘                      │
//!                                          └──▶ DoneSignal ──▶ every poller exits
//! ```

use sloth_common::NodeDescriptor;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::ReadinessError;
use crate::executor::{CheckError, CheckPayload, RemoteCheckExecutor};
use crate::log_node_check;
use crate::predicate::{CheckOutput, ServiceRegistry};
use crate::script::{CheckScriptBuilder, ShellScriptBuilder};
use crate::signal::{DoneSignal, TaskGroup};
use crate::status::{NodeHealthRecord, ReadinessSummary, StatusStore};

/// Services a Kubernetes node needs before the cluster is usable
pub const KUBERNETES_SERVICES: [&str; 4] = ["docker", "kubelet", "kubernetes", "etcd"];

/// Services the ingress controller needs
pub const INGRESS_SERVICES: [&str; 2] = ["nginx", "kubernetes"];

/// What to wait for and how long
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessRequest {
    pub required_services: BTreeSet<String>,
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// How often a status summary is logged while waiting
    pub report_interval: Duration,
}

impl ReadinessRequest {
    pub fn new<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_services: services.into_iter().map(Into::into).collect(),
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(300),
            report_interval: Duration::from_secs(30),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Same timings, different services
    pub fn with_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_services = services.into_iter().map(Into::into).collect();
        self
    }

    fn validate(&self, nodes: &[NodeDescriptor]) -> Result<(), ReadinessError> {
        if nodes.is_empty() {
            return Err(ReadinessError::NoNodes);
        }
        if self.required_services.is_empty() {
            return Err(ReadinessError::NoServices);
        }
        if self.timeout.is_zero() {
            return Err(ReadinessError::InvalidRequest(
                "timeout must be positive".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ReadinessError::InvalidRequest(
                "poll interval must be positive".to_string(),
            ));
        }

        sloth_common::ensure_unique_names(nodes)
            .map_err(|e| ReadinessError::InvalidRequest(e.to_string()))?;
        Ok(())
    }
}

/// Message from a poller to the aggregator
#[derive(Debug)]
enum PollEvent {
    Polled { healthy: bool },
    Fatal { node: String, message: String },
}

/// Concurrent readiness gate over a set of nodes
pub struct NodeReadinessGate {
    executor: Arc<dyn RemoteCheckExecutor>,
    scripts: Arc<dyn CheckScriptBuilder>,
    registry: Arc<ServiceRegistry>,
    /// Store of the most recent wait; each wait builds its own
    current: RwLock<StatusStore>,
    grace_period: Duration,
}

impl NodeReadinessGate {
    pub fn new(executor: Arc<dyn RemoteCheckExecutor>) -> Self {
        Self {
            executor,
            scripts: Arc::new(ShellScriptBuilder::new()),
            registry: Arc::new(ServiceRegistry::default()),
            current: RwLock::new(StatusStore::new()),
            grace_period: Duration::from_secs(2),
        }
    }

    pub fn with_script_builder(mut self, scripts: Arc<dyn CheckScriptBuilder>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_registry(mut self, registry: ServiceRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// How long pollers get to exit once the wait is over
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Store of the most recently started wait
    pub async fn store(&self) -> StatusStore {
        self.current.read().await.clone()
    }

    pub async fn node_status(&self, node_name: &str) -> Option<NodeHealthRecord> {
        self.store().await.get(node_name).await
    }

    pub async fn all_statuses(&self) -> HashMap<String, NodeHealthRecord> {
        self.store().await.snapshot().await
    }

    pub async fn summary(&self) -> ReadinessSummary {
        self.store().await.summary().await
    }

    /// Wait until every node reports every required service healthy
    pub async fn wait_for_ready(
        &self,
        nodes: &[NodeDescriptor],
        request: &ReadinessRequest,
    ) -> Result<(), ReadinessError> {
        self.wait_for_ready_until(nodes, request, DoneSignal::new())
            .await
    }

    /// Wait for the Kubernetes control plane services, using the timings of
    /// `timing`
    pub async fn wait_for_kubernetes_ready(
        &self,
        nodes: &[NodeDescriptor],
        timing: &ReadinessRequest,
    ) -> Result<(), ReadinessError> {
        info!("Waiting for Kubernetes cluster to be ready");
        let request = timing.clone().with_services(KUBERNETES_SERVICES);
        self.wait_for_ready(nodes, &request).await
    }

    /// Wait for the ingress controller, using the timings of `timing`
    pub async fn wait_for_ingress_ready(
        &self,
        nodes: &[NodeDescriptor],
        timing: &ReadinessRequest,
    ) -> Result<(), ReadinessError> {
        info!("Waiting for NGINX Ingress to be ready");
        let request = timing.clone().with_services(INGRESS_SERVICES);
        self.wait_for_ready(nodes, &request).await
    }

    /// Like [`wait_for_ready`](Self::wait_for_ready), but also stops with
    /// [`ReadinessError::Cancelled`] when `cancel` fires
    pub async fn wait_for_ready_until(
        &self,
        nodes: &[NodeDescriptor],
        request: &ReadinessRequest,
        cancel: DoneSignal,
    ) -> Result<(), ReadinessError> {
        request.validate(nodes)?;

        // Concurrent waits on one gate never share records
        let store = StatusStore::new();
        for node in nodes {
            store.register(&node.name).await;
        }
        *self.current.write().await = store.clone();

        info!(
            nodes = nodes.len(),
            services = ?request.required_services,
            timeout = ?request.timeout,
            "Starting health checks for all nodes"
        );

        let payload = Arc::new(self.scripts.build(&request.required_services));
        let services = Arc::new(request.required_services.clone());
        let done = DoneSignal::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let mut pollers = TaskGroup::new();
        for node in nodes {
            let poller = NodePoller {
                node: node.clone(),
                executor: self.executor.clone(),
                registry: self.registry.clone(),
                store: store.clone(),
                payload: payload.clone(),
                services: services.clone(),
                interval: request.poll_interval,
                done: done.clone(),
                events: events_tx.clone(),
            };
            pollers.spawn(format!("poller-{}", node.name), poller.run());
        }
        drop(events_tx);

        let result = Self::aggregate(&store, &mut events_rx, request, &cancel).await;

        done.fire();
        let aborted = pollers.join_all(self.grace_period).await;
        if aborted > 0 {
            warn!(aborted, "Pollers had to be aborted after the wait ended");
        }

        match result {
            Ok(()) => info!("All nodes are ready!"),
            Err(ref e) => warn!(error = %e, "Readiness wait ended"),
        }
        result
    }

    async fn aggregate(
        store: &StatusStore,
        events: &mut mpsc::UnboundedReceiver<PollEvent>,
        request: &ReadinessRequest,
        cancel: &DoneSignal,
    ) -> Result<(), ReadinessError> {
        let deadline = tokio::time::sleep(request.timeout);
        tokio::pin!(deadline);

        let report_period = if request.report_interval.is_zero() {
            request.timeout
        } else {
            request.report_interval
        };
        let mut report = tokio::time::interval_at(Instant::now() + report_period, report_period);
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;

                _ = cancel.wait() => return Err(ReadinessError::Cancelled),

                event = events.recv(), if events_open => match event {
                    Some(PollEvent::Fatal { node, message }) => {
                        return Err(ReadinessError::Fatal { node, message });
                    }
                    Some(PollEvent::Polled { healthy: true }) => {
                        if store.all_healthy().await {
                            return Ok(());
                        }
                    }
                    Some(PollEvent::Polled { healthy: false }) => {}
                    None => {
                        // Every poller is gone; only the deadline or a cancel can end the wait
                        warn!("All pollers exited before readiness was reached");
                        events_open = false;
                    }
                },

                _ = &mut deadline => {
                    let summary = store.summary().await;
                    return Err(ReadinessError::Timeout {
                        timeout: request.timeout,
                        summary,
                    });
                }

                _ = report.tick() => {
                    let summary = store.summary().await;
                    info!(
                        ready = summary.ready,
                        total = summary.total,
                        "Health check status\n{}",
                        summary
                    );
                }
            }
        }
    }
}

/// Poll loop owning one node's record
struct NodePoller {
    node: NodeDescriptor,
    executor: Arc<dyn RemoteCheckExecutor>,
    registry: Arc<ServiceRegistry>,
    store: StatusStore,
    payload: Arc<CheckPayload>,
    services: Arc<BTreeSet<String>>,
    interval: Duration,
    done: DoneSignal,
    events: mpsc::UnboundedSender<PollEvent>,
}

impl NodePoller {
    async fn run(self) {
        let name = self.node.name.clone();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.store.mark_polling(&name).await;
        let mut was_healthy = false;

        loop {
            tokio::select! {
                biased;
                _ = self.done.wait() => break,
                _ = ticker.tick() => {}
            }

            // The remote call is dropped (and its process killed) on cancellation
            let result = tokio::select! {
                biased;
                _ = self.done.wait() => break,
                result = self.executor.execute(&self.node, &self.payload) => result,
            };

            match result.and_then(|raw| self.evaluate(&raw)) {
                Ok(services) => {
                    let healthy = self.store.apply_poll(&name, services).await.unwrap_or(false);
                    log_node_check!(name, healthy = healthy);
                    if healthy && !was_healthy {
                        info!(node = %name, "Node is ready");
                    } else if !healthy && was_healthy {
                        warn!(node = %name, "Node regressed to unhealthy");
                    }
                    was_healthy = healthy;
                    let _ = self.events.send(PollEvent::Polled { healthy });
                }
                Err(err) if err.is_fatal() => {
                    error!(node = %name, error = %err.message, "Fatal health check error");
                    self.store.mark_failed(&name, &err.message).await;
                    let _ = self.events.send(PollEvent::Fatal {
                        node: name.clone(),
                        message: err.message,
                    });
                    break;
                }
                Err(err) => {
                    log_node_check!(name, error = err);
                    self.store.record_transient(&name, &err.message).await;
                }
            }
        }
    }

    fn evaluate(&self, raw: &str) -> Result<std::collections::BTreeMap<String, bool>, CheckError> {
        let output = CheckOutput::new(raw);
        if let Some(detail) = output.fatal_marker() {
            return Err(CheckError::fatal(detail));
        }
        Ok(self.registry.evaluate(&output, &self.services))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticExecutor(&'static str);

    #[async_trait]
    impl RemoteCheckExecutor for StaticExecutor {
        async fn execute(
            &self,
            _node: &NodeDescriptor,
            _payload: &CheckPayload,
        ) -> Result<String, CheckError> {
            Ok(self.0.to_string())
        }
    }

    fn gate(output: &'static str) -> NodeReadinessGate {
        NodeReadinessGate::new(Arc::new(StaticExecutor(output)))
            .with_grace_period(Duration::from_millis(200))
    }

    fn request() -> ReadinessRequest {
        ReadinessRequest::new(["docker"])
            .with_poll_interval(Duration::from_millis(20))
            .with_timeout(Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_rejects_invalid_requests() {
        let g = gate("");
        let nodes = vec![NodeDescriptor::new("n1", "10.0.0.1")];

        assert!(matches!(
            g.wait_for_ready(&[], &request()).await,
            Err(ReadinessError::NoNodes)
        ));
        assert!(matches!(
            g.wait_for_ready(&nodes, &request().with_services(Vec::<String>::new()))
                .await,
            Err(ReadinessError::NoServices)
        ));
        assert!(matches!(
            g.wait_for_ready(&nodes, &request().with_timeout(Duration::ZERO)).await,
            Err(ReadinessError::InvalidRequest(_))
        ));

        let dup = vec![
            NodeDescriptor::new("n1", "10.0.0.1"),
            NodeDescriptor::new("n1", "10.0.0.2"),
        ];
        assert!(matches!(
            g.wait_for_ready(&dup, &request()).await,
            Err(ReadinessError::InvalidRequest(_))
        ));
        assert!(g.store().await.is_empty().await);
    }

    #[tokio::test]
    async fn test_fatal_marker_aborts() {
        let g = gate("FATAL:KERNEL:unsupported kernel 3.10");
        let nodes = vec![NodeDescriptor::new("n1", "10.0.0.1")];

        match g.wait_for_ready(&nodes, &request()).await {
            Err(ReadinessError::Fatal { node, message }) => {
                assert_eq!(node, "n1");
                assert!(message.contains("unsupported kernel"));
            }
            other => panic!("expected fatal error, got {:?}", other),
        }
        let record = g.node_status("n1").await.unwrap();
        assert_eq!(record.phase, crate::status::NodePhase::Failed);
    }

    #[tokio::test]
    async fn test_preset_services() {
        let g = gate("NGINX:SERVICE:OK\nNGINX:PODS:OK\nKUBERNETES:API:OK");
        let nodes = vec![NodeDescriptor::new("n1", "10.0.0.1")];

        g.wait_for_ingress_ready(&nodes, &request()).await.unwrap();
        let record = g.node_status("n1").await.unwrap();
        let names: Vec<&str> = record.services.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["kubernetes", "nginx"]);

        let err = g.wait_for_kubernetes_ready(&nodes, &request()).await.unwrap_err();
        assert!(err.is_timeout());
        let summary = err.summary().unwrap();
        assert_eq!(summary.ready, 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_wait() {
        let g = gate("SERVICE:docker:STOPPED");
        let nodes = vec![NodeDescriptor::new("n1", "10.0.0.1")];
        let cancel = DoneSignal::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.fire();
        });

        let started = std::time::Instant::now();
        let result = g
            .wait_for_ready_until(&nodes, &request().with_timeout(Duration::from_secs(10)), cancel)
            .await;
        assert!(matches!(result, Err(ReadinessError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
