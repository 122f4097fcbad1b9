//! Error types for the SSH poller

use thiserror::Error;

/// Main error type for the SSH poller
#[derive(Debug, Error)]
pub enum PollerError {
    /// SSH connection failed or dropped
    #[error("SSH connection error: {0}")]
    Connection(String),

    /// Authentication failed (password or key rejected)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The server presented a host key not present in the host keys file
    #[error("Unknown host key for {host}: {fingerprint}")]
    HostKeyUnknown { host: String, fingerprint: String },

    /// A remote command failed (non-zero exit or unparsable output)
    #[error("Command failed: {0}")]
    Command(String),

    /// Command execution timed out
    #[error("Command timeout after {0}ms")]
    Timeout(u64),

    /// A value could not be written to a sensor
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The operation is disabled for this host or sensor
    #[error("Not allowed: {0}")]
    NotAllowed(String),

    /// No sensor is registered under the key
    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Wake-on-LAN failure
    #[error("Wake-on-LAN error: {0}")]
    Wol(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH key parsing error
    #[error("SSH key error: {0}")]
    SshKey(String),
}

/// Result type alias using PollerError
pub type Result<T> = std::result::Result<T, PollerError>;

/// How a failure affects polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Stops polling; the host key must be accepted by the user
    ConfigFatal,
    /// Stops polling; new credentials are required
    AuthFatal,
    /// Remote-side command failure, absorbed by the command poller
    CommandTransient,
    /// Anything else: the tick fails, polling continues
    Unexpected,
}

impl PollerError {
    /// Create a connection error from a string
    pub fn connection(msg: impl Into<String>) -> Self {
        PollerError::Connection(msg.into())
    }

    /// Create an authentication error from a string
    pub fn auth(msg: impl Into<String>) -> Self {
        PollerError::Authentication(msg.into())
    }

    /// Create a command error from a string
    pub fn command(msg: impl Into<String>) -> Self {
        PollerError::Command(msg.into())
    }

    /// Create an invalid value error from a string
    pub fn invalid_value(msg: impl Into<String>) -> Self {
        PollerError::InvalidValue(msg.into())
    }

    /// Create a not allowed error from a string
    pub fn not_allowed(msg: impl Into<String>) -> Self {
        PollerError::NotAllowed(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        PollerError::Config(msg.into())
    }

    /// Classify the error for the pollers
    pub fn class(&self) -> FailureClass {
        match self {
            PollerError::HostKeyUnknown { .. } => FailureClass::ConfigFatal,
            PollerError::Authentication(_) => FailureClass::AuthFatal,
            PollerError::Command(_) | PollerError::Timeout(_) => FailureClass::CommandTransient,
            _ => FailureClass::Unexpected,
        }
    }

    /// Whether the error means the SSH session can no longer be used
    pub fn is_transport(&self) -> bool {
        matches!(self, PollerError::Connection(_) | PollerError::Io(_))
    }
}
