//! Shell command execution tool.

use crate::tools::Tool;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Executes shell commands in the runtime's working directory.
pub struct ShellTool {
    workdir: PathBuf,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ShellParams {
    command: String,
    /// Timeout in seconds, overriding the tool default.
    #[serde(default)]
    timeout: u64,
}

#[derive(Debug, Serialize)]
struct ShellOutput {
    success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    stderr: String,
    exit_code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

impl ShellTool {
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: if timeout.is_zero() {
                DEFAULT_TIMEOUT
            } else {
                timeout
            },
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute shell commands. Use this tool to run commands in the shell."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default: 60)",
                    "minimum": 1,
                    "maximum": 300
                }
            },
            "required": ["command"]
        })
    }

    async fn invoke(&self, cancel: &CancellationToken, args: &[u8]) -> Result<serde_json::Value> {
        let params: ShellParams = serde_json::from_slice(args).context("invalid parameters")?;
        if params.command.trim().is_empty() {
            bail!("command cannot be empty");
        }

        let timeout = if params.timeout > 0 {
            Duration::from_secs(params.timeout)
        } else {
            self.timeout
        };

        debug!(command = %params.command, "running shell command");

        let mut command = tokio::process::Command::new("sh");
        command
            .arg("-c")
            .arg(&params.command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if self.workdir.as_os_str().is_empty() {
            // Inherit the process working directory.
        } else {
            command.current_dir(&self.workdir);
        }

        let child = command.spawn().context("failed to spawn command")?;

        let output = tokio::select! {
            () = cancel.cancelled() => {
                return Ok(serde_json::to_value(ShellOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: -1,
                    error: "command cancelled".to_string(),
                })?);
            }
            result = tokio::time::timeout(timeout, child.wait_with_output()) => {
                match result {
                    Ok(output) => output.context("failed to collect command output")?,
                    Err(_) => {
                        return Ok(serde_json::to_value(ShellOutput {
                            success: false,
                            stdout: String::new(),
                            stderr: String::new(),
                            exit_code: -1,
                            error: "command timed out".to_string(),
                        })?);
                    }
                }
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let result = ShellOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
            error: String::new(),
        };
        Ok(serde_json::to_value(result)?)
    }
}
