pub mod config;
pub mod validate;
pub mod wait;

use anyhow::{Context, Result};
use sloth_common::NodeDescriptor;
use sloth_health::SlothConfig;

/// Configured nodes, narrowed to `only` when it is non-empty
pub fn select_nodes(config: &SlothConfig, only: &[String]) -> Result<Vec<NodeDescriptor>> {
    if only.is_empty() {
        return Ok(config.nodes.clone());
    }

    only.iter()
        .map(|name| {
            sloth_common::find_node(&config.nodes, name)
                .cloned()
                .with_context(|| format!("'{}' is not in the configuration", name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SlothConfig {
        let mut config = SlothConfig::default();
        config.nodes.push(NodeDescriptor::new("master-1", "10.0.0.1"));
        config.nodes.push(NodeDescriptor::new("worker-1", "10.0.0.2"));
        config
    }

    #[test]
    fn test_select_all_nodes() {
        assert_eq!(select_nodes(&config(), &[]).unwrap().len(), 2);
    }

    #[test]
    fn test_select_subset() {
        let nodes = select_nodes(&config(), &["worker-1".to_string()]).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name, "worker-1");
    }

    #[test]
    fn test_select_unknown_node() {
        let err = select_nodes(&config(), &["ghost".to_string()]).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
