//! Shared node health store
//!
//! One [`NodeHealthRecord`] per registered node, guarded by a single
//! `RwLock`. Each record has exactly one writer (its poller); the aggregator
//! and status queries only read. Every mutation replaces a whole record under
//! one write guard, so readers never observe a half-updated record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Lifecycle of a node within one readiness wait
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodePhase {
    /// Registered, not polled yet
    Unknown,
    /// At least one required service not healthy yet
    Polling,
    /// Every required service healthy on the last poll
    Healthy,
    /// Fatal check error; terminal
    Failed,
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodePhase::Unknown => write!(f, "unknown"),
            NodePhase::Polling => write!(f, "polling"),
            NodePhase::Healthy => write!(f, "healthy"),
            NodePhase::Failed => write!(f, "failed"),
        }
    }
}

/// Current health of one node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeHealthRecord {
    pub node_name: String,
    pub is_healthy: bool,
    pub phase: NodePhase,
    pub last_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub services: BTreeMap<String, bool>,
}

impl NodeHealthRecord {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            is_healthy: false,
            phase: NodePhase::Unknown,
            last_check: None,
            last_error: None,
            services: BTreeMap::new(),
        }
    }

    /// Services that reported unhealthy on the last successful poll
    pub fn failing_services(&self) -> Vec<String> {
        self.services
            .iter()
            .filter(|(_, healthy)| !**healthy)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Shared store of node health records
#[derive(Debug, Clone, Default)]
pub struct StatusStore {
    records: Arc<RwLock<HashMap<String, NodeHealthRecord>>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node with a fresh `Unknown` record
    pub async fn register(&self, node_name: &str) {
        self.records
            .write()
            .await
            .insert(node_name.to_string(), NodeHealthRecord::new(node_name));
    }

    /// Move an `Unknown` node to `Polling` before its first check
    pub async fn mark_polling(&self, node_name: &str) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(node_name) {
            if record.phase == NodePhase::Unknown {
                record.phase = NodePhase::Polling;
            }
        }
    }

    /// Apply a successful poll. `services` must hold an entry for every
    /// required service; the node is healthy iff all of them are true.
    ///
    /// Returns the resulting health, or `None` if the node is not registered.
    pub async fn apply_poll(
        &self,
        node_name: &str,
        services: BTreeMap<String, bool>,
    ) -> Option<bool> {
        let is_healthy = !services.is_empty() && services.values().all(|healthy| *healthy);

        let mut records = self.records.write().await;
        let record = records.get_mut(node_name)?;
        if record.phase == NodePhase::Failed {
            return Some(false);
        }

        *record = NodeHealthRecord {
            node_name: record.node_name.clone(),
            is_healthy,
            phase: if is_healthy {
                NodePhase::Healthy
            } else {
                NodePhase::Polling
            },
            last_check: Some(Utc::now()),
            last_error: None,
            services,
        };
        Some(is_healthy)
    }

    /// Record a transient failure; health and service map stay as they were
    pub async fn record_transient(&self, node_name: &str, error: &str) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(node_name) {
            record.last_check = Some(Utc::now());
            record.last_error = Some(error.to_string());
        }
    }

    /// Mark a node failed after a fatal check error
    pub async fn mark_failed(&self, node_name: &str, error: &str) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(node_name) {
            record.is_healthy = false;
            record.phase = NodePhase::Failed;
            record.last_check = Some(Utc::now());
            record.last_error = Some(error.to_string());
        }
    }

    /// True iff the store is non-empty and every record is healthy.
    /// Evaluated under a single read guard.
    pub async fn all_healthy(&self) -> bool {
        let records = self.records.read().await;
        !records.is_empty() && records.values().all(|r| r.is_healthy)
    }

    pub async fn get(&self, node_name: &str) -> Option<NodeHealthRecord> {
        self.records.read().await.get(node_name).cloned()
    }

    /// Copy of every record
    pub async fn snapshot(&self) -> HashMap<String, NodeHealthRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Consistent summary of every node
    pub async fn summary(&self) -> ReadinessSummary {
        let records = self.records.read().await;
        ReadinessSummary::from_records(records.values())
    }
}

/// One node's line in a readiness summary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSummary {
    pub node_name: String,
    pub phase: NodePhase,
    pub is_healthy: bool,
    pub failing_services: Vec<String>,
    pub last_error: Option<String>,
}

/// Point-in-time summary of the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadinessSummary {
    pub total: usize,
    pub ready: usize,
    pub nodes: Vec<NodeSummary>,
}

impl ReadinessSummary {
    fn from_records<'a>(records: impl Iterator<Item = &'a NodeHealthRecord>) -> Self {
        let mut nodes: Vec<NodeSummary> = records
            .map(|r| NodeSummary {
                node_name: r.node_name.clone(),
                phase: r.phase,
                is_healthy: r.is_healthy,
                failing_services: r.failing_services(),
                last_error: r.last_error.clone(),
            })
            .collect();
        nodes.sort_by(|a, b| a.node_name.cmp(&b.node_name));

        Self {
            total: nodes.len(),
            ready: nodes.iter().filter(|n| n.is_healthy).count(),
            nodes,
        }
    }

    /// Nodes that are not healthy
    pub fn unhealthy(&self) -> Vec<&NodeSummary> {
        self.nodes.iter().filter(|n| !n.is_healthy).collect()
    }

    pub fn is_ready(&self) -> bool {
        self.total > 0 && self.ready == self.total
    }
}

impl fmt::Display for ReadinessSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} nodes ready", self.ready, self.total)?;
        for node in &self.nodes {
            if node.is_healthy {
                write!(f, "\n  ✓ {}", node.node_name)?;
                continue;
            }
            write!(f, "\n  ✗ {} ({})", node.node_name, node.phase)?;
            if !node.failing_services.is_empty() {
                write!(f, " unhealthy services: {}", node.failing_services.join(", "))?;
            }
            if let Some(ref err) = node.last_error {
                write!(f, " last error: {}", err)?;
            }
        }
        Ok(())
    }
}
