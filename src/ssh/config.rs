//! SSH configuration types
//!
//! Connection parameters for one remote host, including authentication and
//! host key verification.

use std::path::PathBuf;
use std::time::Duration;

/// Default command timeout
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// SSH connection configuration
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Remote hostname or IP address
    pub host: String,

    /// SSH port (default: 22)
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Password for password authentication
    pub password: Option<String>,

    /// Private key content (not path!) for key authentication
    pub private_key: Option<String>,

    /// known_hosts-format file the server key must be listed in
    pub host_keys_file: Option<PathBuf>,

    /// Timeout applied to every remote command
    pub command_timeout: Duration,
}

impl SshConfig {
    /// Create a new SSH configuration with minimal required fields
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            password: None,
            private_key: None,
            host_keys_file: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set password authentication
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set private key authentication (key content, not path)
    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    /// Verify server keys against a known_hosts-format file
    pub fn with_host_keys_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_keys_file = Some(path.into());
        self
    }

    /// Set the remote command timeout
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// `host:port` string used for connecting and in diagnostics
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
