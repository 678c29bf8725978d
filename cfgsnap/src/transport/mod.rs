//! SSH transport layer wrapping russh.
//!
//! This module provides connection setup and authentication, single-shot
//! command execution, SFTP file transfer, and the interactive shell channel
//! that the prompt engine drives. Drivers only see the [`Session`] and
//! [`Connector`] traits, so they can be exercised against scripted sessions.

pub mod config;
mod sftp;
mod ssh;

pub use config::{AuthMethod, HostKeyVerification, SshConfig};
pub use ssh::{SshConnector, SshTransport};

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::path::Path;

use log::{debug, warn};

use crate::channel::ShellIo;
use crate::error::Result;

/// Output of a single-shot remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,

    /// Exit status, if the server reported one.
    pub exit_status: Option<u32>,
}

impl ExecOutput {
    /// Whether the command exited with status 0 (or reported none).
    pub fn success(&self) -> bool {
        self.exit_status.is_none_or(|s| s == 0)
    }
}

/// One authenticated connection to one device.
///
/// Every operation is blocking from the caller's point of view: it resolves
/// when the remote side has finished, or fails. Nothing is retried here.
pub trait Session: Send {
    /// Interactive shell channel type.
    type Shell: ShellIo;

    /// Run a command on a fresh exec channel and collect its stdout.
    fn run(&mut self, command: &str) -> impl Future<Output = Result<ExecOutput>> + Send;

    /// Open a PTY shell channel for prompt-driven interaction.
    fn open_shell(&mut self) -> impl Future<Output = Result<Self::Shell>> + Send;

    /// Copy a remote file to a local path, returning the bytes copied.
    fn copy_down(
        &mut self,
        remote: &str,
        local: &Path,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Copy a local file to a remote path, returning the bytes copied.
    fn copy_up(&mut self, local: &Path, remote: &str)
    -> impl Future<Output = Result<u64>> + Send;

    /// Delete a remote file.
    fn remove(&mut self, remote: &str) -> impl Future<Output = Result<()>> + Send;

    /// List the regular files in a remote directory.
    fn list_dir(&mut self, remote: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Close the connection. Idempotent.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Tear the connection down without a graceful disconnect.
    ///
    /// Used when the owning future is dropped before it could call
    /// [`close`](Session::close). Idempotent.
    fn abort(&mut self);
}

/// Opens [`Session`]s.
pub trait Connector: Send + Sync {
    /// Session type produced by this connector.
    type Session: Session + 'static;

    /// Connect and authenticate.
    fn connect(&self, config: &SshConfig) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// Scoped ownership of a [`Session`].
///
/// [`release`](SessionGuard::release) closes the session gracefully. If the
/// guard is dropped without being released (an early return through `?` that
/// skipped release, or the owning task being cancelled) the session is
/// aborted instead. Either way the session is released exactly once.
pub struct SessionGuard<S: Session> {
    session: S,
    host: String,
    released: bool,
}

impl<S: Session> SessionGuard<S> {
    /// Take ownership of an open session.
    pub fn new(session: S, host: impl Into<String>) -> Self {
        Self {
            session,
            host: host.into(),
            released: false,
        }
    }

    /// Close the session. Close errors are logged, not returned: the work
    /// done over the session is already complete at this point.
    pub async fn release(mut self) {
        self.released = true;
        match self.session.close().await {
            Ok(()) => debug!("{}: session closed", self.host),
            Err(e) => warn!("{}: error while closing session: {}", self.host, e),
        }
    }
}

impl<S: Session> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: Session> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if !self.released {
            warn!("{}: session dropped before close, aborting", self.host);
            self.session.abort();
        }
    }
}
