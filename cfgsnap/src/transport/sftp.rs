//! SFTP subsystem helpers on top of russh-sftp.

use std::path::Path;

use log::{debug, warn};
use russh::Channel;
use russh::client::Msg;
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, TransportError};

/// An open SFTP subsystem on one SSH connection.
pub(super) struct SftpClient {
    session: SftpSession,
}

fn transfer_error(path: &str, err: impl std::fmt::Display) -> TransportError {
    TransportError::Transfer {
        path: path.to_string(),
        message: err.to_string(),
    }
}

impl SftpClient {
    /// Request the `sftp` subsystem on a fresh session channel.
    pub(super) async fn open(channel: Channel<Msg>) -> Result<Self> {
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(TransportError::Ssh)?;
        let session = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| transfer_error("sftp", e))?;
        debug!("sftp subsystem ready");
        Ok(Self { session })
    }

    pub(super) async fn download(&self, remote: &str, local: &Path) -> Result<u64> {
        let mut source = self
            .session
            .open(remote)
            .await
            .map_err(|e| transfer_error(remote, e))?;
        let mut target = tokio::fs::File::create(local)
            .await
            .map_err(|e| transfer_error(&local.display().to_string(), e))?;
        let copied = tokio::io::copy(&mut source, &mut target)
            .await
            .map_err(|e| transfer_error(remote, e))?;
        target
            .flush()
            .await
            .map_err(|e| transfer_error(&local.display().to_string(), e))?;
        Ok(copied)
    }

    pub(super) async fn upload(&self, local: &Path, remote: &str) -> Result<u64> {
        let mut source = tokio::fs::File::open(local)
            .await
            .map_err(|e| transfer_error(&local.display().to_string(), e))?;
        let mut target = self
            .session
            .create(remote)
            .await
            .map_err(|e| transfer_error(remote, e))?;
        let copied = tokio::io::copy(&mut source, &mut target)
            .await
            .map_err(|e| transfer_error(remote, e))?;
        target
            .shutdown()
            .await
            .map_err(|e| transfer_error(remote, e))?;
        Ok(copied)
    }

    pub(super) async fn remove(&self, remote: &str) -> Result<()> {
        self.session
            .remove_file(remote)
            .await
            .map_err(|e| transfer_error(remote, e).into())
    }

    /// Names of the regular files in `dir`, sorted.
    pub(super) async fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let entries = self
            .session
            .read_dir(dir)
            .await
            .map_err(|e| transfer_error(dir, e))?;
        let mut names: Vec<String> = entries
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.file_name())
            .collect();
        names.sort();
        Ok(names)
    }

    pub(super) async fn close(self) {
        if let Err(e) = self.session.close().await {
            warn!("sftp close failed: {}", e);
        }
    }
}
