//! SSH client handler implementation
//!
//! Implements the `russh::client::Handler` trait to verify server host keys.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use russh::keys::{HashAlg, PublicKey};
use tracing::{debug, warn};

/// SSH client handler for russh
///
/// When a host keys file is configured, the server key must be listed in it
/// for the handshake to continue. A rejected key's fingerprint is recorded
/// so the connection manager can report it as an unknown host key instead
/// of a generic connection failure.
#[derive(Debug, Clone)]
pub struct SshHandler {
    host: String,
    port: u16,
    host_keys_file: Option<PathBuf>,
    rejected: Arc<Mutex<Option<String>>>,
}

impl SshHandler {
    /// Create a new SSH handler
    pub fn new(host: impl Into<String>, port: u16, host_keys_file: Option<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port,
            host_keys_file,
            rejected: Arc::new(Mutex::new(None)),
        }
    }

    /// Shared slot holding the fingerprint of a rejected server key
    pub fn rejected_key(&self) -> Arc<Mutex<Option<String>>> {
        Arc::clone(&self.rejected)
    }

    fn reject(&self, key: &PublicKey) {
        let fingerprint = key.fingerprint(HashAlg::Sha256).to_string();
        warn!(
            "Host key {} for {}:{} is not trusted",
            fingerprint, self.host, self.port
        );
        *self.rejected.lock() = Some(fingerprint);
    }
}

impl russh::client::Handler for SshHandler {
    type Error = anyhow::Error;

    /// Verify the server's host key
    ///
    /// Without a host keys file every key is accepted.
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let Some(path) = self.host_keys_file.as_ref() else {
            return Ok(true);
        };

        match russh::keys::check_known_hosts_path(&self.host, self.port, server_public_key, path) {
            Ok(true) => {
                debug!("Host key for {}:{} verified", self.host, self.port);
                Ok(true)
            }
            Ok(false) => {
                self.reject(server_public_key);
                Ok(false)
            }
            Err(e) => {
                // Changed keys and unreadable files are both untrusted
                debug!("Host key check failed: {}", e);
                self.reject(server_public_key);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh::client::Handler;
    use std::io::Write;

    const NAS_KEY: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIBERERERERERERERERERERERERERERERERERERERERER";
    const OTHER_KEY: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAICIiIiIiIiIiIiIiIiIiIiIiIiIiIiIiIiIiIiIiIiIi";

    fn known_hosts(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn key(openssh: &str) -> PublicKey {
        PublicKey::from_openssh(openssh).unwrap()
    }

    #[test]
    fn test_handler_creation() {
        let handler = SshHandler::new("nas", 22, None);
        assert!(format!("{:?}", handler).contains("SshHandler"));
        assert!(handler.rejected_key().lock().is_none());
    }

    #[test]
    fn test_rejected_slot_is_shared() {
        let handler = SshHandler::new("nas", 22, Some(PathBuf::from("/tmp/known_hosts")));
        let slot = handler.rejected_key();
        *handler.rejected.lock() = Some("SHA256:test".to_string());
        assert_eq!(slot.lock().as_deref(), Some("SHA256:test"));
    }

    #[tokio::test]
    async fn test_listed_key_is_accepted() {
        let file = known_hosts(&[&format!("nas {}", NAS_KEY)]);
        let mut handler = SshHandler::new("nas", 22, Some(file.path().to_path_buf()));

        assert!(handler.check_server_key(&key(NAS_KEY)).await.unwrap());
        assert!(handler.rejected_key().lock().is_none());
    }

    #[tokio::test]
    async fn test_unlisted_key_is_rejected() {
        let file = known_hosts(&[&format!("backup {}", NAS_KEY)]);
        let mut handler = SshHandler::new("nas", 22, Some(file.path().to_path_buf()));
        let server_key = key(OTHER_KEY);

        assert!(!handler.check_server_key(&server_key).await.unwrap());
        let expected = server_key.fingerprint(HashAlg::Sha256).to_string();
        assert!(expected.starts_with("SHA256:"));
        assert_eq!(handler.rejected_key().lock().as_deref(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_changed_key_is_rejected() {
        let file = known_hosts(&[&format!("nas {}", NAS_KEY)]);
        let mut handler = SshHandler::new("nas", 22, Some(file.path().to_path_buf()));
        let server_key = key(OTHER_KEY);

        assert!(!handler.check_server_key(&server_key).await.unwrap());
        assert_eq!(
            handler.rejected_key().lock().clone(),
            Some(server_key.fingerprint(HashAlg::Sha256).to_string())
        );
    }

    #[tokio::test]
    async fn test_non_default_port_uses_bracketed_host() {
        let file = known_hosts(&[&format!("[nas]:2222 {}", NAS_KEY)]);
        let mut handler = SshHandler::new("nas", 2222, Some(file.path().to_path_buf()));

        assert!(handler.check_server_key(&key(NAS_KEY)).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_host_keys_file_accepts_any_key() {
        let mut handler = SshHandler::new("nas", 22, None);
        assert!(handler.check_server_key(&key(OTHER_KEY)).await.unwrap());
        assert!(handler.rejected_key().lock().is_none());
    }
}
