//! Configuration management for sloth
//!
//! Settings are resolved from:
//! 1. Environment variables (highest priority)
//! 2. Configuration file (TOML format)
//! 3. Default values (lowest priority)

use serde::{Deserialize, Serialize};
use sloth_common::NodeDescriptor;
use std::path::PathBuf;
use std::time::Duration;

use crate::gate::ReadinessRequest;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlothConfig {
    /// Readiness polling
    pub readiness: ReadinessConfig,
    /// Prerequisite validation
    pub validation: ValidationConfig,
    /// Remote shell transport
    pub ssh: SshConfig,
    /// Logging
    pub logging: LoggingConfig,
    /// Nodes to check, as handed over by the provisioning layer
    pub nodes: Vec<NodeDescriptor>,
}

/// Readiness polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Seconds between polls of a node
    pub poll_interval_secs: u64,
    /// Overall deadline in seconds
    pub timeout_secs: u64,
    /// Seconds between status summaries in the log
    pub report_interval_secs: u64,
    /// Milliseconds pollers get to exit after cancellation
    pub grace_period_ms: u64,
}

/// Prerequisite validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Shared deadline for one validation run, in seconds
    pub timeout_secs: u64,
    /// Minimum number of nodes in a cluster
    pub min_nodes: usize,
    /// Minimum free disk space on `/`, in GB
    pub min_disk_gb: u64,
    /// Minimum total memory, in MB
    pub min_memory_mb: u64,
}

/// SSH transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// ssh client binary
    pub binary: String,
    pub port: u16,
    /// Private key used when a node has none of its own
    pub default_key_path: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    /// Upper bound for a single remote command
    pub command_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Enable file logging
    pub file_logging_enabled: bool,
    /// JSON console output
    pub json: bool,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            timeout_secs: 300,
            report_interval_secs: 30,
            grace_period_ms: 2000,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            min_nodes: 3,
            min_disk_gb: 20,
            min_memory_mb: 2048,
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            port: 22,
            default_key_path: None,
            connect_timeout_secs: 10,
            command_timeout_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("/var/log/sloth"),
            file_logging_enabled: false,
            json: false,
        }
    }
}

impl ReadinessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Readiness request for `services` with these timings
    pub fn request<I, S>(&self, services: I) -> ReadinessRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ReadinessRequest::new(services)
            .with_poll_interval(self.poll_interval())
            .with_timeout(self.timeout())
            .with_report_interval(self.report_interval())
    }
}

impl ValidationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SshConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl SlothConfig {
    /// Load configuration from environment variables and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.clone(), e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            std::env::var("SLOTH_CONFIG").ok().map(PathBuf::from),
            Some(PathBuf::from("/etc/sloth/config.toml")),
            Some(PathBuf::from("./sloth.toml")),
        ];

        paths.into_iter().flatten().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.parse().ok())
        }

        // Readiness
        if let Some(v) = parsed(lookup("SLOTH_POLL_INTERVAL_SECS")) {
            self.readiness.poll_interval_secs = v;
        }
        if let Some(v) = parsed(lookup("SLOTH_READINESS_TIMEOUT_SECS")) {
            self.readiness.timeout_secs = v;
        }
        if let Some(v) = parsed(lookup("SLOTH_REPORT_INTERVAL_SECS")) {
            self.readiness.report_interval_secs = v;
        }

        // Validation
        if let Some(v) = parsed(lookup("SLOTH_VALIDATION_TIMEOUT_SECS")) {
            self.validation.timeout_secs = v;
        }
        if let Some(v) = parsed(lookup("SLOTH_MIN_NODES")) {
            self.validation.min_nodes = v;
        }

        // SSH
        if let Some(v) = lookup("SLOTH_SSH_KEY") {
            self.ssh.default_key_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SLOTH_SSH_BINARY") {
            self.ssh.binary = v;
        }
        if let Some(v) = parsed(lookup("SLOTH_SSH_PORT")) {
            self.ssh.port = v;
        }

        // Logging
        if let Some(v) = lookup("SLOTH_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("SLOTH_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SLOTH_FILE_LOGGING") {
            self.logging.file_logging_enabled = v.parse().unwrap_or(false);
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let mut config = Self::default();
        config.nodes.push(
            NodeDescriptor::new("master-1", "203.0.113.10")
                .with_label("role", "master")
                .with_ssh_key("~/.ssh/id_ed25519"),
        );
        config.nodes.push(NodeDescriptor::new("worker-1", "203.0.113.20").with_label("role", "worker"));
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.readiness.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "Poll interval cannot be 0".to_string(),
            ));
        }

        if self.readiness.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Readiness timeout cannot be 0".to_string(),
            ));
        }

        if self.validation.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Validation timeout cannot be 0".to_string(),
            ));
        }

        sloth_common::ensure_unique_names(&self.nodes)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Failed to read configuration file
    FileRead(PathBuf, String),
    /// Failed to parse configuration
    Parse(String),
    /// Configuration validation failed
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, err) => {
                write!(f, "Failed to read config file {:?}: {}", path, err)
            }
            ConfigError::Parse(err) => write!(f, "Failed to parse config: {}", err),
            ConfigError::Validation(err) => write!(f, "Config validation failed: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}
