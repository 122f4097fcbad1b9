//! SSH Connection Manager
//!
//! Holds the SSH session of one host: connecting with host key verification,
//! authenticating, checking liveness and closing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use russh::Channel;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info};

use super::config::SshConfig;
use super::handler::SshHandler;
use crate::error::{PollerError, Result};

/// Connection timeout in seconds
pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// SSH Connection Manager
///
/// Manages the SSH session of a single host. It never reconnects on its
/// own; callers decide when a connection attempt is made.
pub struct SshConnectionManager {
    /// SSH configuration
    config: SshConfig,

    /// Active SSH session handle
    session: Arc<Mutex<Option<Handle<SshHandler>>>>,

    /// Flag to prevent concurrent connection attempts
    is_connecting: AtomicBool,
}

impl SshConnectionManager {
    /// Create a new SSH Connection Manager
    ///
    /// Does not establish connection immediately; call `connect()`.
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            session: Arc::new(Mutex::new(None)),
            is_connecting: AtomicBool::new(false),
        }
    }

    /// The configuration this manager connects with
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Establish SSH connection
    ///
    /// If already connected, returns immediately. A concurrent attempt fails
    /// fast instead of waiting.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected().await {
            debug!("Already connected to SSH server");
            return Ok(());
        }

        if self
            .is_connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PollerError::connection(
                "Another connection attempt is in progress",
            ));
        }

        let result = self.do_connect().await;

        self.is_connecting.store(false, Ordering::SeqCst);

        result
    }

    /// Internal connection logic
    async fn do_connect(&self) -> Result<()> {
        let addr = self.config.address();
        info!("Connecting to SSH server {}...", addr);

        let connection_timeout = Duration::from_secs(CONNECTION_TIMEOUT_SECS);
        let ssh_config = Arc::new(client::Config::default());

        let handler = SshHandler::new(
            &self.config.host,
            self.config.port,
            self.config.host_keys_file.clone(),
        );
        let rejected_key = handler.rejected_key();

        let connect_result = timeout(
            connection_timeout,
            client::connect(ssh_config, addr.as_str(), handler),
        )
        .await;

        let mut session = match connect_result {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                if let Some(fingerprint) = rejected_key.lock().take() {
                    error!("SSH host key for {} is unknown: {}", addr, fingerprint);
                    return Err(PollerError::HostKeyUnknown {
                        host: addr,
                        fingerprint,
                    });
                }
                debug!("SSH connection to {} failed: {}", addr, e);
                return Err(PollerError::connection(e.to_string()));
            }
            Err(_) => {
                debug!("SSH connection timeout after {}s", CONNECTION_TIMEOUT_SECS);
                return Err(PollerError::connection(format!(
                    "Connection timeout after {}s",
                    CONNECTION_TIMEOUT_SECS
                )));
            }
        };

        self.authenticate(&mut session).await?;

        {
            let mut session_guard = self.session.lock().await;
            *session_guard = Some(session);
        }

        info!(
            "Successfully connected to {}@{}",
            self.config.username, addr
        );

        Ok(())
    }

    /// Authenticate with the SSH server
    ///
    /// Tries the password first, then the private key.
    async fn authenticate(&self, session: &mut Handle<SshHandler>) -> Result<()> {
        if let Some(ref password) = self.config.password {
            debug!(
                "Attempting password authentication for user '{}'",
                self.config.username
            );
            let auth_result = session
                .authenticate_password(&self.config.username, password)
                .await
                .map_err(|e| PollerError::connection(e.to_string()))?;

            if auth_result.success() {
                info!("Password authentication successful");
                return Ok(());
            }
            if self.config.private_key.is_none() {
                return Err(PollerError::auth("Password authentication rejected"));
            }
            debug!("Password rejected, falling back to key authentication");
        }

        if let Some(ref key_content) = self.config.private_key {
            debug!(
                "Attempting key authentication for user '{}'",
                self.config.username
            );

            let key = russh::keys::PrivateKey::from_openssh(key_content.as_bytes())
                .map_err(|e| PollerError::SshKey(format!("Failed to parse private key: {}", e)))?;

            let key_with_alg = PrivateKeyWithHashAlg::new(Arc::new(key), None);

            let auth_result = session
                .authenticate_publickey(&self.config.username, key_with_alg)
                .await
                .map_err(|e| PollerError::connection(e.to_string()))?;

            if auth_result.success() {
                info!("Key authentication successful");
                return Ok(());
            }
            return Err(PollerError::auth("Key authentication rejected"));
        }

        Err(PollerError::auth(
            "No authentication method available (require password or private_key)",
        ))
    }

    /// Check if the connection is active
    ///
    /// A session whose transport has closed is dropped here.
    pub async fn is_connected(&self) -> bool {
        let mut session_guard = self.session.lock().await;
        match session_guard.as_ref() {
            Some(session) if session.is_closed() => {
                debug!("SSH session to {} has closed", self.config.address());
                *session_guard = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Open a new session channel
    pub async fn open_channel(&self) -> Result<Channel<client::Msg>> {
        let session_guard = self.session.lock().await;
        let session = session_guard
            .as_ref()
            .ok_or_else(|| PollerError::connection("SSH connection not established"))?;

        let channel = session
            .channel_open_session()
            .await
            .map_err(|e| PollerError::connection(format!("Failed to open channel: {}", e)))?;

        Ok(channel)
    }

    /// Close the SSH connection
    pub async fn close(&self) {
        let mut session_guard = self.session.lock().await;
        if let Some(session) = session_guard.take() {
            let _ = session
                .disconnect(russh::Disconnect::ByApplication, "", "")
                .await;
            info!("SSH connection to {} closed", self.config.address());
        }
    }
}

impl std::fmt::Debug for SshConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConnectionManager")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("username", &self.config.username)
            .field("is_connecting", &self.is_connecting.load(Ordering::SeqCst))
            .finish()
    }
}
