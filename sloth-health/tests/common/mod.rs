//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use sloth_common::NodeDescriptor;
use sloth_health::{CheckError, CheckPayload, RemoteCheckExecutor};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DOCKER_HEALTHY: &str = "DOCKER:PS:OK\nSERVICE:docker:RUNNING\n";

/// What a scripted node answers on each poll
#[derive(Debug, Clone)]
pub enum Reply {
    Output(String),
    Transient(String),
    Fatal(String),
}

impl Reply {
    pub fn output(text: &str) -> Self {
        Reply::Output(text.to_string())
    }

    pub fn transient(message: &str) -> Self {
        Reply::Transient(message.to_string())
    }
}

/// Executor that replays a per-node sequence of replies. The last reply of
/// a sequence repeats forever.
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Vec<Reply>>>,
    calls: Mutex<HashMap<String, usize>>,
    total_calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn script(self, node: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(node.to_string(), replies);
        self
    }

    pub fn always(self, node: &str, reply: Reply) -> Self {
        self.script(node, vec![reply])
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self, node: &str) -> usize {
        self.calls.lock().unwrap().get(node).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteCheckExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        node: &NodeDescriptor,
        _payload: &CheckPayload,
    ) -> Result<String, CheckError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(node.name.clone()).or_insert(0);
            *count += 1;
            *count - 1
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = {
            let scripts = self.scripts.lock().unwrap();
            match scripts.get(&node.name) {
                Some(replies) if !replies.is_empty() => {
                    replies[attempt.min(replies.len() - 1)].clone()
                }
                _ => Reply::Transient(format!("no script for {}", node.name)),
            }
        };

        match reply {
            Reply::Output(text) => Ok(text),
            Reply::Transient(message) => Err(CheckError::transient(message)),
            Reply::Fatal(message) => Err(CheckError::fatal(message)),
        }
    }
}

/// `count` nodes named `node-1..=count`
pub fn nodes(count: usize) -> Vec<NodeDescriptor> {
    (1..=count)
        .map(|i| NodeDescriptor::new(format!("node-{}", i), format!("10.0.0.{}", i)))
        .collect()
}

/// A small cluster with one master and two workers
pub fn rke_cluster() -> Vec<NodeDescriptor> {
    vec![
        NodeDescriptor::new("master-1", "10.0.1.1").with_label("role", "master"),
        NodeDescriptor::new("worker-1", "10.0.1.2").with_label("role", "worker"),
        NodeDescriptor::new("worker-2", "10.0.1.3").with_label("role", "worker"),
    ]
}
