//! PTY shell channel over russh.

use log::trace;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use super::ShellIo;
use crate::error::{ChannelError, Result};

/// Interactive shell channel on an SSH connection.
pub struct PtyChannel {
    channel: Channel<Msg>,
    eof: bool,
}

impl PtyChannel {
    /// Wrap a channel that already has a PTY and shell.
    pub fn new(channel: Channel<Msg>) -> Self {
        Self {
            channel,
            eof: false,
        }
    }
}

impl ShellIo for PtyChannel {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.channel
            .data(data)
            .await
            .map_err(|e| ChannelError::Ssh(e).into())
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        if self.eof {
            return Ok(None);
        }
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { ref data }) => {
                    trace!("pty read {} bytes", data.len());
                    return Ok(Some(data.to_vec()));
                }
                Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                    return Ok(Some(data.to_vec()));
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    self.eof = true;
                    return Ok(None);
                }
                Some(_) => continue,
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.eof = true;
        self.channel
            .close()
            .await
            .map_err(|e| ChannelError::Ssh(e).into())
    }
}
