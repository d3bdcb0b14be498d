//! SSH/SFTP transport backend built on `russh`.
//!
//! One [`SshTransport`] wraps one authenticated SSH connection. Commands run
//! on a fresh session channel per invocation; file writes go through the
//! SFTP subsystem as temp-write + rename so a half-transferred script is
//! never left at the final path.
//!
//! Host-key verification is delegated to deployment configuration
//! (known-hosts management sits outside the core); the handler accepts the
//! server key and the fingerprint is logged at dial time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config as ClientConfig, Handler};
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use remedy_core::Asset;

use crate::error::{Result, TransportError};
use crate::secrets::Credential;
use crate::transport::{Connector, RawOutput, Transport};

/// Suffix used for the temporary file during atomic writes.
const TMP_SUFFIX: &str = ".remedy-tmp";

struct AcceptingHandler;

impl Handler for AcceptingHandler {
    type Error = russh::Error;

    fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> impl std::future::Future<Output = std::result::Result<bool, Self::Error>> + Send {
        debug!(
            fingerprint = %server_public_key.fingerprint(Default::default()),
            "accepting server host key"
        );
        async { Ok(true) }
    }
}

/// Dials SSH connections to assets.
pub struct SshConnector {
    config: Arc<ClientConfig>,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl SshConnector {
    /// Creates a connector with sane client defaults.
    #[must_use]
    pub fn new() -> Self {
        let mut config = ClientConfig::default();
        config.inactivity_timeout = Some(Duration::from_secs(600));
        config.window_size = 4 * 1024 * 1024;
        config.channel_buffer_size = 4 * 1024 * 1024;
        config.maximum_packet_size = 65535;
        Self {
            config: Arc::new(config),
        }
    }

    async fn authenticate(
        handle: &mut client::Handle<AcceptingHandler>,
        asset: &Asset,
        credential: &Credential,
    ) -> Result<()> {
        let user = asset.connection.user.as_str();
        let authenticated = match credential {
            Credential::Password(password) => handle
                .authenticate_password(user, password)
                .await
                .map_err(|e| {
                    TransportError::connection_lost(asset.id.to_string(), e.to_string())
                })?
                .success(),
            Credential::KeyFile { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_deref()).map_err(|_| {
                    TransportError::CredentialResolution {
                        host: asset.id.to_string(),
                        reason: "private key could not be loaded".to_string(),
                    }
                })?;
                handle
                    .authenticate_publickey(
                        user,
                        PrivateKeyWithHashAlg::new(Arc::new(key), None),
                    )
                    .await
                    .map_err(|e| {
                        TransportError::connection_lost(asset.id.to_string(), e.to_string())
                    })?
                    .success()
            }
        };

        if !authenticated {
            return Err(TransportError::auth_failed(asset.id.to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SshConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SshConnector")
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, asset: &Asset, credential: &Credential) -> Result<Arc<dyn Transport>> {
        let address = (asset.address.as_str(), asset.connection.port);
        debug!(host = %asset.id, address = %asset.address, port = asset.connection.port, "opening ssh connection");

        let mut handle = client::connect(Arc::clone(&self.config), address, AcceptingHandler)
            .await
            .map_err(|e| TransportError::connection_lost(asset.id.to_string(), e.to_string()))?;

        Self::authenticate(&mut handle, asset, credential).await?;

        info!(host = %asset.id, user = %asset.connection.user, "ssh session authenticated");
        Ok(Arc::new(SshTransport {
            host: asset.id.to_string(),
            handle: Mutex::new(handle),
        }))
    }
}

/// One authenticated SSH connection to one host.
pub struct SshTransport {
    host: String,
    handle: Mutex<client::Handle<AcceptingHandler>>,
}

impl SshTransport {
    fn lost(&self, reason: impl std::fmt::Display) -> TransportError {
        TransportError::connection_lost(self.host.clone(), reason.to_string())
    }

    fn transfer(&self, reason: impl std::fmt::Display) -> TransportError {
        TransportError::Transfer {
            host: self.host.clone(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport").field("host", &self.host).finish()
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<RawOutput> {
        let mut handle = self.handle.lock().await;
        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| self.lost(e))?;
        drop(handle);

        channel.exec(true, command).await.map_err(|e| self.lost(e))?;

        if let Some(stdin) = stdin {
            channel.data(stdin).await.map_err(|e| self.lost(e))?;
            channel.eof().await.map_err(|e| self.lost(e))?;
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code: Option<i32> = None;

        loop {
            let Some(msg) = channel.wait().await else {
                break;
            };
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status as i32),
                _ => {}
            }
        }

        if exit_code.is_none() {
            warn!(host = %self.host, "channel closed without exit status");
        }

        Ok(RawOutput {
            exit_code: exit_code.unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    async fn write_file(&self, path: &str, content: &[u8], mode: u32) -> Result<()> {
        let mut handle = self.handle.lock().await;
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| self.lost(e))?;
        drop(handle);

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| self.lost(e))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| self.transfer(e))?;

        let tmp_path = format!("{path}{TMP_SUFFIX}");
        let mut file = sftp.create(&tmp_path).await.map_err(|e| self.transfer(e))?;
        file.write_all(content).await.map_err(|e| self.transfer(e))?;
        file.shutdown().await.map_err(|e| self.transfer(e))?;

        let mut attrs = FileAttributes::default();
        attrs.permissions = Some(mode);
        sftp.set_metadata(&tmp_path, attrs)
            .await
            .map_err(|e| self.transfer(e))?;
        sftp.rename(&tmp_path, path)
            .await
            .map_err(|e| self.transfer(e))?;

        debug!(host = %self.host, path, bytes = content.len(), "file written atomically");
        Ok(())
    }

    async fn close(&self) {
        let mut handle = self.handle.lock().await;
        let _ = handle
            .disconnect(Disconnect::ByApplication, "session closed", "en")
            .await;
    }
}
