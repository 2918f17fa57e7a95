//! SSH transport for remote checks
//!
//! Runs the system `ssh` client; the payload is piped to `bash -s` on the
//! remote side. Failure classification:
//! - exit status 255 (connection level) or a per-attempt timeout: transient
//! - missing `ssh` binary or missing key file: fatal
//! - any other exit status: output returned as-is, the markers carry state

use async_trait::async_trait;
use sloth_common::NodeDescriptor;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::SshConfig;
use crate::executor::{CheckError, CheckPayload, RemoteCheckExecutor};

/// Exit status the OpenSSH client uses for its own errors
const SSH_CONNECTION_ERROR: i32 = 255;

/// `RemoteCheckExecutor` backed by the OpenSSH client
#[derive(Debug, Clone)]
pub struct SshExecutor {
    binary: String,
    port: u16,
    default_key: Option<PathBuf>,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SshExecutor {
    pub fn new(config: &SshConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            port: config.port,
            default_key: config.default_key_path.clone(),
            connect_timeout: config.connect_timeout(),
            command_timeout: config.command_timeout(),
        }
    }

    fn key_for(&self, node: &NodeDescriptor) -> Option<PathBuf> {
        node.ssh_key_path
            .as_ref()
            .map(|p| expand_home(p))
            .or_else(|| self.default_key.clone())
    }

    /// Arguments passed to the ssh client for `node`
    pub fn command_args(&self, node: &NodeDescriptor) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ];
        if let Some(key) = self.key_for(node) {
            args.push("-i".to_string());
            args.push(key.to_string_lossy().into_owned());
        }
        args.push(node.ssh_target());
        args.push("bash -s".to_string());
        args
    }

    async fn run(&self, node: &NodeDescriptor, payload: &CheckPayload) -> Result<String, CheckError> {
        if let Some(key) = self.key_for(node) {
            if !key.exists() {
                return Err(CheckError::fatal(format!(
                    "ssh key {} for node {} does not exist",
                    key.display(),
                    node.name
                )));
            }
        }

        let mut child = Command::new(&self.binary)
            .args(self.command_args(node))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    CheckError::fatal(format!("ssh client '{}' not found", self.binary))
                }
                _ => CheckError::transient(format!("failed to spawn ssh: {}", e)),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.as_str().as_bytes())
                .await
                .map_err(|e| CheckError::transient(format!("failed to send check script: {}", e)))?;
            // Dropping stdin closes it so `bash -s` sees EOF
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CheckError::transient(format!("ssh failed: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        match output.status.code() {
            Some(SSH_CONNECTION_ERROR) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(CheckError::transient(format!(
                    "ssh connection to {} failed: {}",
                    node.ssh_target(),
                    stderr.trim()
                )))
            }
            None => Err(CheckError::transient("ssh terminated by signal")),
            Some(code) => {
                debug!(node = %node.name, exit_code = code, "Remote check finished");
                Ok(stdout)
            }
        }
    }
}

#[async_trait]
impl RemoteCheckExecutor for SshExecutor {
    async fn execute(
        &self,
        node: &NodeDescriptor,
        payload: &CheckPayload,
    ) -> Result<String, CheckError> {
        match tokio::time::timeout(self.command_timeout, self.run(node, payload)).await {
            Ok(result) => result,
            Err(_) => Err(CheckError::transient(format!(
                "remote check on {} timed out after {:?}",
                node.name, self.command_timeout
            ))),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
