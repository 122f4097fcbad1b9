//! SSH connection management module
//!
//! This module provides the SSH session handling used by the host manager:
//! host key verification, authentication and command execution.

pub mod command;
pub mod config;
pub mod connection;
pub mod handler;
pub mod sanitize;

// Re-exports
pub use command::CommandOutput;
pub use config::SshConfig;
pub use connection::SshConnectionManager;
pub use handler::SshHandler;
pub use sanitize::{escape_for_shell, quote_for_shell, render_template};
