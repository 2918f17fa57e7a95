//! Sloth CLI
//!
//! Waits for freshly provisioned nodes to become ready and runs prerequisite
//! suites before the next provisioning step.

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sloth_health::logging::LoggingConfig;
use sloth_health::SlothConfig;
use std::path::PathBuf;

use output::OutputFormat;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (defaults to $SLOTH_CONFIG, /etc/sloth/config.toml, ./sloth.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Timing overrides shared by the wait commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct WaitArgs {
    /// Overall deadline in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Seconds between polls of a node
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Only wait for these nodes (repeatable)
    #[arg(short, long = "node")]
    pub nodes: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait until every node reports the given services healthy
    Wait {
        /// Required services, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        services: Vec<String>,

        #[command(flatten)]
        args: WaitArgs,
    },
    /// Wait for docker, kubelet, the API server and etcd
    WaitKubernetes {
        #[command(flatten)]
        args: WaitArgs,
    },
    /// Wait for the NGINX ingress controller
    WaitIngress {
        #[command(flatten)]
        args: WaitArgs,
    },
    /// Run a prerequisite suite against the configured nodes
    Validate {
        /// Suite to run
        #[arg(value_enum)]
        suite: Suite,

        /// Shared deadline in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Prerequisite suites
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Suite {
    /// Before installing RKE
    Rke,
    /// Before installing the ingress controller
    Ingress,
    /// Before building the WireGuard mesh
    Wireguard,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print a sample configuration file
    Sample,
    /// Print the effective configuration
    Show,
    /// List the configured nodes
    Nodes,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;

    let _log_guard = LoggingConfig::from(&config.logging)
        .init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    match cli.command {
        Commands::Wait { services, args } => {
            commands::wait::handle_wait(
                commands::wait::WaitTarget::Services(services),
                &args,
                &config,
                cli.output,
            )
            .await?
        }
        Commands::WaitKubernetes { args } => {
            commands::wait::handle_wait(
                commands::wait::WaitTarget::Kubernetes,
                &args,
                &config,
                cli.output,
            )
            .await?
        }
        Commands::WaitIngress { args } => {
            commands::wait::handle_wait(
                commands::wait::WaitTarget::Ingress,
                &args,
                &config,
                cli.output,
            )
            .await?
        }
        Commands::Validate { suite, timeout } => {
            commands::validate::handle_validate(suite, timeout, &config, cli.output).await?
        }
        Commands::Config { command } => {
            commands::config::handle_config_command(command, &config, cli.output)?
        }
        Commands::Completions { shell } => {
            generate_completions(shell);
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<SlothConfig> {
    let config = match path {
        Some(path) => {
            let mut config = SlothConfig::load_from_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => SlothConfig::load()?,
    };
    config.validate()?;
    Ok(config)
}

/// Generate shell completions
fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();

    generate(shell, &mut cmd, name, &mut io::stdout());
}
