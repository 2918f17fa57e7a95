//! Common types shared between sloth-health and sloth-cli

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role a node plays in the cluster, read from its `role` label
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Worker,
    Unknown,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Master => write!(f, "master"),
            Self::Worker => write!(f, "worker"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A provisioned cluster member.
///
/// Owned by the provisioning layer; everything in this workspace only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub name: String,
    pub public_ip: String,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    /// Credential reference (path to a private key). Falls back to the
    /// configured default key when absent.
    #[serde(default)]
    pub ssh_key_path: Option<String>,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_ssh_user() -> String {
    "root".to_string()
}

impl NodeDescriptor {
    pub fn new(name: impl Into<String>, public_ip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public_ip: public_ip.into(),
            private_ip: None,
            ssh_user: default_ssh_user(),
            ssh_key_path: None,
            provider: String::new(),
            region: String::new(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_ssh_user(mut self, user: impl Into<String>) -> Self {
        self.ssh_user = user.into();
        self
    }

    pub fn with_ssh_key(mut self, path: impl Into<String>) -> Self {
        self.ssh_key_path = Some(path.into());
        self
    }

    /// Role derived from the `role` label (`master`/`controlplane` or `worker`)
    pub fn role(&self) -> NodeRole {
        match self.labels.get("role").map(String::as_str) {
            Some("master") | Some("controlplane") => NodeRole::Master,
            Some("worker") => NodeRole::Worker,
            _ => NodeRole::Unknown,
        }
    }

    /// `user@address` target for the remote shell
    pub fn ssh_target(&self) -> String {
        format!("{}@{}", self.ssh_user, self.public_ip)
    }
}

/// Look up a node by name
pub fn find_node<'a>(nodes: &'a [NodeDescriptor], name: &str) -> Result<&'a NodeDescriptor> {
    nodes
        .iter()
        .find(|n| n.name == name)
        .ok_or_else(|| Error::NodeNotFound(name.to_string()))
}

/// Node names key every per-node record, so they must be unique and non-empty
pub fn ensure_unique_names(nodes: &[NodeDescriptor]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for node in nodes {
        if node.name.is_empty() {
            return Err(Error::EmptyNodeName);
        }
        if !seen.insert(node.name.as_str()) {
            return Err(Error::DuplicateNode(node.name.clone()));
        }
    }
    Ok(())
}

/// Shared error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("node name cannot be empty")]
    EmptyNodeName,
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_labels() {
        let master = NodeDescriptor::new("m1", "10.0.0.1").with_label("role", "master");
        let cp = NodeDescriptor::new("m2", "10.0.0.2").with_label("role", "controlplane");
        let worker = NodeDescriptor::new("w1", "10.0.0.3").with_label("role", "worker");
        let bare = NodeDescriptor::new("x", "10.0.0.4");

        assert_eq!(master.role(), NodeRole::Master);
        assert_eq!(cp.role(), NodeRole::Master);
        assert_eq!(worker.role(), NodeRole::Worker);
        assert_eq!(bare.role(), NodeRole::Unknown);
    }

    #[test]
    fn test_ssh_target() {
        let node = NodeDescriptor::new("n1", "203.0.113.7").with_ssh_user("ubuntu");
        assert_eq!(node.ssh_target(), "ubuntu@203.0.113.7");
    }

    #[test]
    fn test_descriptor_defaults_from_json() {
        let node: NodeDescriptor =
            serde_json::from_str(r#"{"name":"n1","public_ip":"10.1.1.1"}"#).unwrap();
        assert_eq!(node.ssh_user, "root");
        assert!(node.ssh_key_path.is_none());
        assert!(node.labels.is_empty());
    }

    #[test]
    fn test_find_node() {
        let nodes = vec![
            NodeDescriptor::new("n1", "10.0.0.1"),
            NodeDescriptor::new("n2", "10.0.0.2"),
        ];
        assert_eq!(find_node(&nodes, "n2").unwrap().public_ip, "10.0.0.2");
        assert_eq!(
            find_node(&nodes, "ghost").unwrap_err(),
            Error::NodeNotFound("ghost".to_string())
        );
    }

    #[test]
    fn test_ensure_unique_names() {
        let mut nodes = vec![
            NodeDescriptor::new("n1", "10.0.0.1"),
            NodeDescriptor::new("n2", "10.0.0.2"),
        ];
        assert!(ensure_unique_names(&nodes).is_ok());

        nodes.push(NodeDescriptor::new("n1", "10.0.0.3"));
        assert_eq!(
            ensure_unique_names(&nodes).unwrap_err().to_string(),
            "duplicate node name: n1"
        );

        let unnamed = vec![NodeDescriptor::new("", "10.0.0.9")];
        assert_eq!(ensure_unique_names(&unnamed), Err(Error::EmptyNodeName));
    }
}
