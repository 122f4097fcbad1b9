//! Command execution over SSH
//!
//! Provides the `CommandOutput` struct and `exec_command` for running a
//! command on an established connection with timeout support.

use std::time::Duration;

use russh::ChannelMsg;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::connection::SshConnectionManager;
use super::sanitize::escape_for_shell;
use crate::error::{PollerError, Result};

/// Output from a command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output from the command
    pub stdout: String,

    /// Standard error from the command
    pub stderr: String,

    /// Exit code of the command (if available)
    pub exit_code: Option<u32>,

    /// Signal that terminated the command, if any
    pub exit_signal: Option<String>,
}

impl CommandOutput {
    /// Create a new empty CommandOutput
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Non-blank, trimmed stdout lines
    pub fn lines(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Turn an unsuccessful run into an error
    ///
    /// A non-zero status or a terminating signal is a command error. Output
    /// that ends without either means the channel was lost mid-command, so
    /// it is reported as a connection error and never treated as complete.
    pub fn into_checked(self, command: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let stderr = self.stderr.trim();
        let detail = if stderr.is_empty() {
            String::new()
        } else {
            format!(": {}", stderr)
        };
        match (self.exit_code, &self.exit_signal) {
            (Some(code), _) => Err(PollerError::command(format!(
                "`{}` exited with status {}{}",
                command, code, detail
            ))),
            (None, Some(signal)) => Err(PollerError::command(format!(
                "`{}` killed by signal {}{}",
                command, signal, detail
            ))),
            (None, None) => Err(PollerError::connection(format!(
                "channel closed before `{}` reported an exit status",
                command
            ))),
        }
    }
}

impl SshConnectionManager {
    /// Execute a command over SSH
    ///
    /// Requires an established connection; this never connects. On timeout
    /// the remote process is killed on a best-effort basis.
    ///
    /// # Returns
    /// * `Ok(CommandOutput)` - Command output with stdout, stderr, and exit code
    /// * `Err(PollerError::Timeout)` - If command times out
    /// * `Err(PollerError::Connection)` - If the session is missing or broken
    pub async fn exec_command(
        &self,
        command: &str,
        timeout_duration: Duration,
    ) -> Result<CommandOutput> {
        let channel = self.open_channel().await?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| PollerError::connection(format!("Failed to exec command: {}", e)))?;

        let result = timeout(timeout_duration, self.collect_channel_output(channel)).await;

        match result {
            Ok(output) => output,
            Err(_) => {
                warn!(
                    "Command timed out after {}ms, attempting abort",
                    timeout_duration.as_millis()
                );
                self.abort_command(command).await;
                Err(PollerError::Timeout(timeout_duration.as_millis() as u64))
            }
        }
    }

    /// Collect output from a channel until it closes
    async fn collect_channel_output(
        &self,
        mut channel: russh::Channel<russh::client::Msg>,
    ) -> Result<CommandOutput> {
        let mut output = CommandOutput::new();

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => {
                    output.stdout.push_str(&String::from_utf8_lossy(&data));
                }
                ChannelMsg::ExtendedData { data, ext } => {
                    // ext == 1 is stderr
                    if ext == 1 {
                        output.stderr.push_str(&String::from_utf8_lossy(&data));
                    } else {
                        output.stdout.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    output.exit_code = Some(exit_status);
                }
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    output.exit_signal = Some(format!("{:?}", signal_name));
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        debug!(
            "Command completed: exit_code={:?}, stdout_len={}, stderr_len={}",
            output.exit_code,
            output.stdout.len(),
            output.stderr.len()
        );

        Ok(output)
    }

    /// Attempt to abort a running command by killing matching processes
    async fn abort_command(&self, command: &str) {
        let channel = match self.open_channel().await {
            Ok(ch) => ch,
            Err(e) => {
                error!("Failed to open channel for abort: {}", e);
                return;
            }
        };

        let abort_cmd = format!(
            "timeout 3s pkill -f '{}' 2>/dev/null || true",
            escape_for_shell(command)
        );

        debug!("Sending abort command: {}", abort_cmd);

        if let Err(e) = channel.exec(true, abort_cmd.as_str()).await {
            error!("Failed to exec abort command: {}", e);
            return;
        }

        let _ = timeout(Duration::from_secs(5), async {
            let mut channel = channel;
            while let Some(msg) = channel.wait().await {
                if matches!(msg, ChannelMsg::Close | ChannelMsg::Eof) {
                    break;
                }
            }
        })
        .await;

        debug!("Abort command completed");
    }
}
