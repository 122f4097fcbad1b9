//! SSH poller - keep sensors of remote machines current over SSH
//!
//! This crate polls remote Linux hosts over SSH. For every configured host it
//! keeps one session, refreshes sensors by running shell commands at their
//! own intervals and presents the results as typed entities (sensors, binary
//! sensors, switches, numbers and a power switch).
//!
//! # Features
//!
//! - Password and key authentication, host keys checked against a known_hosts file
//! - One State Poller per host, one Command-Group Poller per command interval
//! - Dynamic sensors whose children (disks, interfaces, ...) come and go at runtime
//! - Writable sensors through `command_set` templates
//! - Wake-on-LAN and remote shutdown
//!
//! # Example Usage (CLI)
//!
//! ```bash
//! ssh-poller --config hosts.toml
//! ssh-poller --config hosts.toml --print-entities --log-level ssh_poller=debug
//! ```

pub mod config;
pub mod coordinator;
pub mod entity;
pub mod entry;
pub mod error;
pub mod manager;
pub mod sensor;
pub mod service;
pub mod ssh;
pub mod wol;

#[cfg(test)]
mod test_utils;

// Re-exports for convenience
pub use config::{Args, Config, HostConfig};
pub use coordinator::{EntrySignal, PollerHandle, PollerStatus, UpdateError};
pub use entry::{Entry, EntryRegistry, EntryState};
pub use error::{FailureClass, PollerError, Result};
pub use manager::{Manager, SshManager};
pub use sensor::{Sensor, SensorCommand, SensorKind, SensorRegistry, SensorValue};
pub use service::Service;
pub use ssh::{CommandOutput, SshConfig, SshConnectionManager, SshHandler};
pub use wol::MacAddress;
