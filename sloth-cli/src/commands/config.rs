use crate::output::{self, OutputFormat};
use crate::ConfigCommands;
use anyhow::Result;
use serde::Serialize;
use sloth_common::NodeDescriptor;
use sloth_health::SlothConfig;
use tabled::Tabled;

#[derive(Tabled, Serialize)]
struct NodeRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ROLE")]
    role: String,
    #[tabled(rename = "TARGET")]
    target: String,
    #[tabled(rename = "PROVIDER")]
    provider: String,
    #[tabled(rename = "REGION")]
    region: String,
}

impl From<&NodeDescriptor> for NodeRow {
    fn from(node: &NodeDescriptor) -> Self {
        Self {
            name: node.name.clone(),
            role: node.role().to_string(),
            target: node.ssh_target(),
            provider: node.provider.clone(),
            region: node.region.clone(),
        }
    }
}

pub fn handle_config_command(
    command: ConfigCommands,
    config: &SlothConfig,
    format: OutputFormat,
) -> Result<()> {
    match command {
        ConfigCommands::Sample => {
            print!("{}", SlothConfig::generate_sample());
        }
        ConfigCommands::Show => match format {
            OutputFormat::Table => print!("{}", toml::to_string_pretty(config)?),
            OutputFormat::Json => output::print_json(config)?,
            OutputFormat::Yaml => output::print_yaml(config)?,
        },
        ConfigCommands::Nodes => {
            let rows: Vec<NodeRow> = config.nodes.iter().map(NodeRow::from).collect();
            output::print_output(rows, format)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_row() {
        let node = NodeDescriptor::new("master-1", "203.0.113.10")
            .with_label("role", "master")
            .with_ssh_user("ubuntu");
        let row = NodeRow::from(&node);
        assert_eq!(row.role, "master");
        assert_eq!(row.target, "ubuntu@203.0.113.10");
    }
}
