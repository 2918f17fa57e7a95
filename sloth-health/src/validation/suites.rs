//! Prerequisite suites run before provisioning steps
//!
//! Topology checks look only at the node list. Remote checks run a short
//! script on the nodes and look for a marker line in its output.

use async_trait::async_trait;
use futures::future::join_all;
use sloth_common::{NodeDescriptor, NodeRole};
use std::sync::Arc;

use super::{CheckVerdict, FnCheck, PrerequisiteCheck, SharedCheck};
use crate::config::ValidationConfig;
use crate::executor::{CheckPayload, RemoteCheckExecutor};

/// Kernel modules a Kubernetes node needs loaded
const REQUIRED_MODULES: &[&str] = &["br_netfilter", "overlay"];

/// API server, etcd and kubelet ports that must be free before install
const REQUIRED_PORTS: &[u16] = &[6443, 2379, 2380, 10250];

/// Thresholds used by the suites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuiteOptions {
    pub min_nodes: usize,
    pub min_disk_gb: u64,
    pub min_memory_mb: u64,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        Self::from(&ValidationConfig::default())
    }
}

impl From<&ValidationConfig> for SuiteOptions {
    fn from(config: &ValidationConfig) -> Self {
        Self {
            min_nodes: config.min_nodes,
            min_disk_gb: config.min_disk_gb,
            min_memory_mb: config.min_memory_mb,
        }
    }
}

/// Which nodes a remote check runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeScope {
    All,
    Masters,
}

/// Runs a payload on every node in scope and passes iff each one prints
/// the expected marker
pub struct RemoteMarkerCheck {
    name: String,
    payload: CheckPayload,
    marker: String,
    scope: NodeScope,
    pass_message: String,
    failure_message: String,
    executor: Arc<dyn RemoteCheckExecutor>,
}

impl RemoteMarkerCheck {
    pub fn new(
        name: impl Into<String>,
        payload: impl Into<CheckPayload>,
        marker: impl Into<String>,
        executor: Arc<dyn RemoteCheckExecutor>,
    ) -> Self {
        let name = name.into();
        Self {
            pass_message: format!("{} passed", name),
            failure_message: format!("{} failed", name),
            name,
            payload: payload.into(),
            marker: marker.into(),
            scope: NodeScope::All,
            executor,
        }
    }

    pub fn masters_only(mut self) -> Self {
        self.scope = NodeScope::Masters;
        self
    }

    pub fn with_messages(mut self, pass: impl Into<String>, failure: impl Into<String>) -> Self {
        self.pass_message = pass.into();
        self.failure_message = failure.into();
        self
    }

    pub fn shared(self) -> SharedCheck {
        Arc::new(self)
    }

    fn in_scope<'a>(&self, nodes: &'a [NodeDescriptor]) -> Vec<&'a NodeDescriptor> {
        nodes
            .iter()
            .filter(|n| self.scope == NodeScope::All || n.role() == NodeRole::Master)
            .collect()
    }
}

#[async_trait]
impl PrerequisiteCheck for RemoteMarkerCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, nodes: &[NodeDescriptor]) -> CheckVerdict {
        let targets = self.in_scope(nodes);
        if targets.is_empty() {
            return CheckVerdict::fail(match self.scope {
                NodeScope::All => "no nodes to check",
                NodeScope::Masters => "no master nodes to check",
            });
        }

        let results = join_all(
            targets
                .iter()
                .map(|node| self.executor.execute(node, &self.payload)),
        )
        .await;

        let mut failed = Vec::new();
        let mut errors = Vec::new();
        for (node, result) in targets.iter().zip(results) {
            match result {
                Ok(output) if output.contains(&self.marker) => {}
                Ok(_) => failed.push(node.name.clone()),
                Err(e) => {
                    errors.push(format!("{}: {}", node.name, e));
                    failed.push(node.name.clone());
                }
            }
        }

        if failed.is_empty() {
            return CheckVerdict::pass(format!("{} on {} nodes", self.pass_message, targets.len()));
        }

        let verdict = CheckVerdict::fail(format!("{} on {}", self.failure_message, failed.join(", ")));
        if errors.is_empty() {
            verdict
        } else {
            verdict.with_error(errors.join("; "))
        }
    }
}

/// Cluster has at least `min` nodes
pub fn node_count_check(min: usize) -> SharedCheck {
    FnCheck::shared("Node Count", move |nodes: &[NodeDescriptor]| {
        if nodes.len() >= min {
            CheckVerdict::pass(format!("{} nodes available", nodes.len()))
        } else {
            CheckVerdict::fail(format!("need at least {} nodes, have {}", min, nodes.len()))
        }
    })
}

/// An odd, non-zero number of masters keeps etcd quorum sane
pub fn master_nodes_check() -> SharedCheck {
    FnCheck::shared("Master Nodes", |nodes: &[NodeDescriptor]| {
        let masters = count_role(nodes, NodeRole::Master);
        if masters == 0 {
            CheckVerdict::fail("no master nodes found")
        } else if masters % 2 == 0 {
            CheckVerdict::fail(format!("even number of master nodes ({})", masters))
        } else {
            CheckVerdict::pass(format!("{} master nodes", masters))
        }
    })
}

pub fn worker_nodes_check() -> SharedCheck {
    FnCheck::shared("Worker Nodes", |nodes: &[NodeDescriptor]| {
        let workers = count_role(nodes, NodeRole::Worker);
        if workers == 0 {
            CheckVerdict::fail("no worker nodes found")
        } else {
            CheckVerdict::pass(format!("{} worker nodes", workers))
        }
    })
}

fn count_role(nodes: &[NodeDescriptor], role: NodeRole) -> usize {
    nodes.iter().filter(|n| n.role() == role).count()
}

/// Payload that prints `ok` when `test` succeeds and `bad` otherwise
fn probe(test: &str, ok: &str, bad: &str) -> String {
    format!("if {}; then echo \"{}\"; else echo \"{}\"; fi\n", test, ok, bad)
}

pub fn connectivity_check(executor: Arc<dyn RemoteCheckExecutor>) -> SharedCheck {
    RemoteMarkerCheck::new(
        "Node Connectivity",
        "echo \"CONNECTIVITY:OK\"\n",
        "CONNECTIVITY:OK",
        executor,
    )
    .with_messages("reachable", "unreachable")
    .shared()
}

pub fn docker_check(executor: Arc<dyn RemoteCheckExecutor>) -> SharedCheck {
    RemoteMarkerCheck::new(
        "Docker Installation",
        probe(
            "command -v docker >/dev/null 2>&1",
            "DOCKER:INSTALLED:OK",
            "DOCKER:INSTALLED:MISSING",
        ),
        "DOCKER:INSTALLED:OK",
        executor,
    )
    .with_messages("docker installed", "docker missing")
    .shared()
}

pub fn swap_check(executor: Arc<dyn RemoteCheckExecutor>) -> SharedCheck {
    RemoteMarkerCheck::new(
        "Swap Disabled",
        probe(
            "[ \"$(swapon --show --noheadings 2>/dev/null | wc -l)\" -eq 0 ]",
            "SWAP:DISABLED:OK",
            "SWAP:DISABLED:FAIL",
        ),
        "SWAP:DISABLED:OK",
        executor,
    )
    .with_messages("swap disabled", "swap enabled")
    .shared()
}

pub fn kernel_modules_check(executor: Arc<dyn RemoteCheckExecutor>) -> SharedCheck {
    let test = REQUIRED_MODULES
        .iter()
        .map(|m| format!("lsmod | grep -q '^{} '", m))
        .collect::<Vec<_>>()
        .join(" && ");
    RemoteMarkerCheck::new(
        "Kernel Modules",
        probe(&test, "KERNEL:MODULES:OK", "KERNEL:MODULES:MISSING"),
        "KERNEL:MODULES:OK",
        executor,
    )
    .with_messages(
        format!("{} loaded", REQUIRED_MODULES.join(", ")),
        "required kernel modules missing",
    )
    .shared()
}

pub fn ports_check(executor: Arc<dyn RemoteCheckExecutor>) -> SharedCheck {
    let test = REQUIRED_PORTS
        .iter()
        .map(|p| format!("! ss -tln | grep -q ':{} '", p))
        .collect::<Vec<_>>()
        .join(" && ");
    RemoteMarkerCheck::new(
        "Required Ports",
        probe(&test, "PORTS:FREE:OK", "PORTS:FREE:BUSY"),
        "PORTS:FREE:OK",
        executor,
    )
    .with_messages("required ports free", "required ports in use")
    .shared()
}

pub fn disk_space_check(min_gb: u64, executor: Arc<dyn RemoteCheckExecutor>) -> SharedCheck {
    let test = format!(
        "[ \"$(df -BG --output=avail / | tail -1 | tr -dc '0-9')\" -ge {} ]",
        min_gb
    );
    RemoteMarkerCheck::new(
        "Disk Space",
        probe(&test, "DISK:SPACE:OK", "DISK:SPACE:LOW"),
        "DISK:SPACE:OK",
        executor,
    )
    .with_messages(format!("at least {} GB free", min_gb), "insufficient disk space")
    .shared()
}

pub fn memory_check(min_mb: u64, executor: Arc<dyn RemoteCheckExecutor>) -> SharedCheck {
    let test = format!(
        "[ \"$(awk '/MemTotal/ {{print int($2/1024)}}' /proc/meminfo)\" -ge {} ]",
        min_mb
    );
    RemoteMarkerCheck::new(
        "Memory",
        probe(&test, "MEMORY:TOTAL:OK", "MEMORY:TOTAL:LOW"),
        "MEMORY:TOTAL:OK",
        executor,
    )
    .with_messages(format!("at least {} MB memory", min_mb), "insufficient memory")
    .shared()
}

pub fn kubernetes_api_check(executor: Arc<dyn RemoteCheckExecutor>) -> SharedCheck {
    RemoteMarkerCheck::new(
        "Kubernetes Cluster",
        probe(
            "kubectl get nodes >/dev/null 2>&1",
            "KUBERNETES:API:OK",
            "KUBERNETES:API:FAIL",
        ),
        "KUBERNETES:API:OK",
        executor,
    )
    .masters_only()
    .with_messages("API server reachable", "API server unreachable")
    .shared()
}

pub fn system_pods_check(executor: Arc<dyn RemoteCheckExecutor>) -> SharedCheck {
    RemoteMarkerCheck::new(
        "Kubernetes Pods",
        probe(
            "! kubectl get pods -n kube-system --no-headers 2>/dev/null | grep -qvE 'Running|Completed'",
            "KUBERNETES:PODS:OK",
            "KUBERNETES:PODS:PENDING",
        ),
        "KUBERNETES:PODS:OK",
        executor,
    )
    .masters_only()
    .with_messages("system pods running", "system pods not running")
    .shared()
}

pub fn helm_check(executor: Arc<dyn RemoteCheckExecutor>) -> SharedCheck {
    RemoteMarkerCheck::new(
        "Helm",
        probe(
            "command -v helm >/dev/null 2>&1",
            "HELM:INSTALLED:OK",
            "HELM:INSTALLED:MISSING",
        ),
        "HELM:INSTALLED:OK",
        executor,
    )
    .masters_only()
    .with_messages("helm installed", "helm missing")
    .shared()
}

pub fn wireguard_installed_check(executor: Arc<dyn RemoteCheckExecutor>) -> SharedCheck {
    RemoteMarkerCheck::new(
        "WireGuard Installation",
        probe(
            "command -v wg >/dev/null 2>&1",
            "WIREGUARD:INSTALLED:OK",
            "WIREGUARD:INSTALLED:MISSING",
        ),
        "WIREGUARD:INSTALLED:OK",
        executor,
    )
    .with_messages("wireguard tools installed", "wireguard tools missing")
    .shared()
}

pub fn kernel_support_check(executor: Arc<dyn RemoteCheckExecutor>) -> SharedCheck {
    RemoteMarkerCheck::new(
        "Kernel Support",
        probe(
            "modprobe -n wireguard >/dev/null 2>&1",
            "WIREGUARD:KERNEL:OK",
            "WIREGUARD:KERNEL:MISSING",
        ),
        "WIREGUARD:KERNEL:OK",
        executor,
    )
    .with_messages("kernel supports wireguard", "kernel lacks wireguard support")
    .shared()
}

pub fn ip_forwarding_check(executor: Arc<dyn RemoteCheckExecutor>) -> SharedCheck {
    RemoteMarkerCheck::new(
        "IP Forwarding",
        probe(
            "[ \"$(cat /proc/sys/net/ipv4/ip_forward 2>/dev/null)\" = 1 ]",
            "NETWORK:IP_FORWARD:OK",
            "NETWORK:IP_FORWARD:OFF",
        ),
        "NETWORK:IP_FORWARD:OK",
        executor,
    )
    .with_messages("ip forwarding enabled", "ip forwarding disabled")
    .shared()
}

/// Checks run before an RKE cluster install
pub fn rke_suite(executor: Arc<dyn RemoteCheckExecutor>, options: &SuiteOptions) -> Vec<SharedCheck> {
    vec![
        node_count_check(options.min_nodes),
        master_nodes_check(),
        worker_nodes_check(),
        connectivity_check(executor.clone()),
        docker_check(executor.clone()),
        swap_check(executor.clone()),
        kernel_modules_check(executor.clone()),
        ports_check(executor.clone()),
        disk_space_check(options.min_disk_gb, executor.clone()),
        memory_check(options.min_memory_mb, executor),
    ]
}

/// Checks run before installing the ingress controller
pub fn ingress_suite(executor: Arc<dyn RemoteCheckExecutor>) -> Vec<SharedCheck> {
    vec![
        kubernetes_api_check(executor.clone()),
        system_pods_check(executor.clone()),
        helm_check(executor),
    ]
}

/// Checks run before building the WireGuard mesh
pub fn wireguard_suite(executor: Arc<dyn RemoteCheckExecutor>) -> Vec<SharedCheck> {
    vec![
        connectivity_check(executor.clone()),
        wireguard_installed_check(executor.clone()),
        kernel_support_check(executor.clone()),
        ip_forwarding_check(executor),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CheckError;

    /// Answers every payload with a fixed output, except for listed nodes
    struct MarkerExecutor {
        output: String,
        broken: Vec<&'static str>,
        unreachable: Vec<&'static str>,
    }

    #[async_trait]
    impl RemoteCheckExecutor for MarkerExecutor {
        async fn execute(
            &self,
            node: &NodeDescriptor,
            _payload: &CheckPayload,
        ) -> Result<String, CheckError> {
            if self.unreachable.contains(&node.name.as_str()) {
                return Err(CheckError::transient("connection refused"));
            }
            if self.broken.contains(&node.name.as_str()) {
                return Ok(String::new());
            }
            Ok(self.output.clone())
        }
    }

    fn cluster() -> Vec<NodeDescriptor> {
        vec![
            NodeDescriptor::new("master-1", "10.0.0.1").with_label("role", "master"),
            NodeDescriptor::new("worker-1", "10.0.0.2").with_label("role", "worker"),
            NodeDescriptor::new("worker-2", "10.0.0.3").with_label("role", "worker"),
        ]
    }

    #[tokio::test]
    async fn test_topology_checks() {
        let nodes = cluster();
        assert!(node_count_check(3).check(&nodes).await.success);
        assert!(!node_count_check(5).check(&nodes).await.success);
        assert!(master_nodes_check().check(&nodes).await.success);
        assert!(worker_nodes_check().check(&nodes).await.success);

        let two_masters = vec![
            NodeDescriptor::new("m1", "10.0.0.1").with_label("role", "master"),
            NodeDescriptor::new("m2", "10.0.0.2").with_label("role", "controlplane"),
        ];
        let verdict = master_nodes_check().check(&two_masters).await;
        assert!(!verdict.success);
        assert!(verdict.message.contains("even"));
        assert!(!worker_nodes_check().check(&two_masters).await.success);
    }

    #[tokio::test]
    async fn test_remote_check_names_failing_nodes() {
        let executor = Arc::new(MarkerExecutor {
            output: "DISK:SPACE:OK\n".to_string(),
            broken: vec!["worker-2"],
            unreachable: vec![],
        });
        let verdict = disk_space_check(20, executor).check(&cluster()).await;
        assert!(!verdict.success);
        assert_eq!(verdict.message, "insufficient disk space on worker-2");
        assert!(verdict.error.is_none());
    }

    #[tokio::test]
    async fn test_remote_check_records_executor_errors() {
        let executor = Arc::new(MarkerExecutor {
            output: "CONNECTIVITY:OK\n".to_string(),
            broken: vec![],
            unreachable: vec!["worker-1"],
        });
        let verdict = connectivity_check(executor).check(&cluster()).await;
        assert!(!verdict.success);
        assert_eq!(verdict.message, "unreachable on worker-1");
        assert!(verdict.error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_masters_only_scope() {
        let executor = Arc::new(MarkerExecutor {
            output: "HELM:INSTALLED:OK\n".to_string(),
            broken: vec!["worker-1", "worker-2"],
            unreachable: vec![],
        });
        let verdict = helm_check(executor.clone()).check(&cluster()).await;
        assert!(verdict.success);
        assert_eq!(verdict.message, "helm installed on 1 nodes");

        let workers: Vec<_> = cluster().into_iter().skip(1).collect();
        let verdict = helm_check(executor).check(&workers).await;
        assert!(!verdict.success);
        assert_eq!(verdict.message, "no master nodes to check");
    }

    #[test]
    fn test_suite_contents() {
        let executor: Arc<dyn RemoteCheckExecutor> = Arc::new(MarkerExecutor {
            output: String::new(),
            broken: vec![],
            unreachable: vec![],
        });
        let rke = rke_suite(executor.clone(), &SuiteOptions::default());
        let names: Vec<&str> = rke.iter().map(|c| c.name()).collect();
        assert_eq!(names.len(), 10);
        assert_eq!(names[0], "Node Count");
        assert!(names.contains(&"Disk Space"));

        assert_eq!(ingress_suite(executor.clone()).len(), 3);
        assert_eq!(wireguard_suite(executor).len(), 4);
    }
}
