//! Logging setup
//!
//! Console output plus an optional JSON file layer with daily rotation.

use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,             // trace, debug, info, warn, error
    pub file_dir: Option<String>,  // directory for sloth.log
    pub rotation: LogRotation,
    pub json_console: bool,
}

/// Log rotation policy
#[derive(Debug, Clone)]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_dir: None,
            rotation: LogRotation::Daily,
            json_console: false,
        }
    }
}

impl From<&config::LoggingConfig> for LoggingConfig {
    fn from(cfg: &config::LoggingConfig) -> Self {
        Self {
            level: cfg.level.clone(),
            file_dir: cfg
                .file_logging_enabled
                .then(|| cfg.log_dir.to_string_lossy().into_owned()),
            rotation: LogRotation::Daily,
            json_console: cfg.json,
        }
    }
}

impl LoggingConfig {
    /// `RUST_LOG` wins over the configured level
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }

    /// Install the global subscriber.
    ///
    /// The returned guard flushes the file writer on drop and must be kept
    /// alive for the lifetime of the program.
    pub fn init(&self) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
        let console_layer = if self.json_console {
            fmt::layer()
                .with_target(true)
                .json()
                .with_writer(io::stderr)
                .boxed()
        } else {
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_ansi(true)
                .with_writer(io::stderr)
                .boxed()
        };

        let (file_layer, guard) = match self.file_dir {
            Some(ref dir) => {
                let appender = match self.rotation {
                    LogRotation::Hourly => rolling::hourly(dir, "sloth.log"),
                    LogRotation::Daily => rolling::daily(dir, "sloth.log"),
                    LogRotation::Never => rolling::never(dir, "sloth.log"),
                };
                let (writer, guard) = non_blocking(appender);
                let layer = fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_ansi(false)
                    .json()
                    .with_writer(writer)
                    .boxed();
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(self.env_filter())
            .with(console_layer)
            .with(file_layer)
            .try_init()?;

        tracing::debug!(level = %self.level, "Logging initialized");
        Ok(guard)
    }
}

/// Log the outcome of one node poll with a uniform shape
#[macro_export]
macro_rules! log_node_check {
    ($node:expr, healthy = $healthy:expr) => {
        tracing::debug!(node = %$node, healthy = $healthy, "Node poll completed")
    };
    ($node:expr, error = $err:expr) => {
        tracing::debug!(node = %$node, error = %$err, "Node poll failed")
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.file_dir.is_none());
        assert!(matches!(config.rotation, LogRotation::Daily));
    }

    #[test]
    fn test_from_file_config() {
        let file_cfg = config::LoggingConfig {
            level: "debug".to_string(),
            log_dir: PathBuf::from("/tmp/sloth-logs"),
            file_logging_enabled: true,
            json: true,
        };
        let config = LoggingConfig::from(&file_cfg);
        assert_eq!(config.level, "debug");
        assert_eq!(config.file_dir.as_deref(), Some("/tmp/sloth-logs"));
        assert!(config.json_console);

        let disabled = config::LoggingConfig {
            file_logging_enabled: false,
            ..file_cfg
        };
        assert!(LoggingConfig::from(&disabled).file_dir.is_none());
    }
}
