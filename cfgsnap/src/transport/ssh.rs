//! SSH transport implementation using russh.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use russh::client::{self, Handle};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::ChannelMsg;
use secrecy::ExposeSecret;

use super::config::{AuthMethod, HostKeyVerification, SshConfig};
use super::sftp::SftpClient;
use super::{Connector, ExecOutput, Session};
use crate::channel::PtyChannel;
use crate::error::{Result, TransportError};

/// Connector producing russh-backed sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl Connector for SshConnector {
    type Session = SshTransport;

    async fn connect(&self, config: &SshConfig) -> Result<SshTransport> {
        SshTransport::connect(config.clone()).await
    }
}

/// SSH transport wrapping a russh client session.
pub struct SshTransport {
    /// The russh session handle (None once closed or aborted).
    session: Option<Handle<SshHandler>>,

    /// Lazily opened SFTP subsystem.
    sftp: Option<SftpClient>,

    /// Configuration used for this connection.
    config: SshConfig,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(config.timeout),
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification,
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        debug!("connecting to {}", config.socket_addr());

        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|e| {
            // Prefer the detailed host-key error over russh's generic UnknownKey
            match host_key_error.lock().ok().and_then(|mut slot| slot.take()) {
                Some(hk_err) => hk_err,
                None => TransportError::Ssh(e),
            }
        })?;

        tokio::time::timeout(config.timeout, Self::authenticate(&mut session, &config))
            .await
            .map_err(|_| TransportError::Timeout(config.timeout))??;

        Ok(Self {
            session: Some(session),
            sftp: None,
            config,
        })
    }

    /// Authenticate with the server.
    async fn authenticate(session: &mut Handle<SshHandler>, config: &SshConfig) -> Result<()> {
        let success = match &config.auth {
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password.expose_secret())
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                    .map_err(|e| TransportError::Key(e.to_string()))?;

                // Get the best RSA hash algorithm supported by the server
                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();

                session
                    .authenticate_publickey(
                        &config.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(TransportError::Ssh)?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        Ok(())
    }

    fn handle(&self) -> Result<&Handle<SshHandler>> {
        self.session
            .as_ref()
            .ok_or_else(|| TransportError::Disconnected.into())
    }

    /// Run `fut` under the per-operation timeout.
    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.op_timeout();
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    fn op_timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn sftp(&mut self) -> Result<&mut SftpClient> {
        if self.sftp.is_none() {
            let channel = self
                .handle()?
                .channel_open_session()
                .await
                .map_err(TransportError::Ssh)?;
            self.sftp = Some(SftpClient::open(channel).await?);
        }
        self.sftp
            .as_mut()
            .ok_or_else(|| TransportError::Disconnected.into())
    }
}

impl Session for SshTransport {
    type Shell = PtyChannel;

    async fn run(&mut self, command: &str) -> Result<ExecOutput> {
        let handle = self.handle()?;
        let fut = async {
            let mut channel = handle
                .channel_open_session()
                .await
                .map_err(TransportError::Ssh)?;
            channel
                .exec(true, command)
                .await
                .map_err(|e| TransportError::Exec {
                    command: command.to_string(),
                    message: e.to_string(),
                })?;

            let mut stdout = Vec::new();
            let mut exit_status = None;
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                    ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                    _ => {}
                }
            }

            Ok(ExecOutput {
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                exit_status,
            })
        };
        let output = self.bounded(fut).await?;
        debug!(
            "{}: exec {:?} -> {} bytes, status {:?}",
            self.config.host,
            command,
            output.stdout.len(),
            output.exit_status
        );
        Ok(output)
    }

    async fn open_shell(&mut self) -> Result<PtyChannel> {
        let handle = self.handle()?;
        let channel = handle
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_shell(true)
            .await
            .map_err(TransportError::Ssh)?;

        Ok(PtyChannel::new(channel))
    }

    async fn copy_down(&mut self, remote: &str, local: &Path) -> Result<u64> {
        let timeout = self.op_timeout();
        let sftp = self.sftp().await?;
        let copied = tokio::time::timeout(timeout, sftp.download(remote, local))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;
        debug!("{}: downloaded {} ({} bytes)", self.config.host, remote, copied);
        Ok(copied)
    }

    async fn copy_up(&mut self, local: &Path, remote: &str) -> Result<u64> {
        let timeout = self.op_timeout();
        let sftp = self.sftp().await?;
        let copied = tokio::time::timeout(timeout, sftp.upload(local, remote))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;
        debug!("{}: uploaded {} ({} bytes)", self.config.host, remote, copied);
        Ok(copied)
    }

    async fn remove(&mut self, remote: &str) -> Result<()> {
        let timeout = self.op_timeout();
        let sftp = self.sftp().await?;
        tokio::time::timeout(timeout, sftp.remove(remote))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    async fn list_dir(&mut self, remote: &str) -> Result<Vec<String>> {
        let timeout = self.op_timeout();
        let sftp = self.sftp().await?;
        tokio::time::timeout(timeout, sftp.list_files(remote))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(sftp) = self.sftp.take() {
            sftp.close().await;
        }
        if let Some(session) = self.session.take() {
            session
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
                .map_err(TransportError::Ssh)?;
        }
        Ok(())
    }

    fn abort(&mut self) {
        // Dropping the handle stops the session task and the TCP stream with it.
        self.sftp = None;
        self.session = None;
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Stores a detailed host-key error so connect() can surface it
    /// instead of the generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found,
    /// `Err(TransportError::HostKeyChanged)` if key changed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, err: TransportError) {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(err);
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.host_key_verification {
            HostKeyVerification::Disabled => Ok(true),

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    info!("{}:{}: first contact, trusting host key", self.host, self.port);
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key: {}", e);
                    }
                    Ok(true)
                }
                Err(e) => {
                    self.reject(e);
                    Ok(false)
                }
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    self.reject(TransportError::HostKeyUnknown {
                        host: self.host.clone(),
                        port: self.port,
                    });
                    Ok(false)
                }
                Err(e) => {
                    self.reject(e);
                    Ok(false)
                }
            },
        }
    }
}
