//! Channel layer for prompt-driven interaction.
//!
//! This module handles the interactive session management: pattern-based
//! prompt detection, ANSI stripping, and the expect/send engine that drivers
//! build their state machines on.

mod buffer;
mod engine;
mod patterns;
mod pty;

pub use buffer::PatternBuffer;
pub use engine::Interaction;
pub use patterns::{PromptPattern, PromptRole, first_match, host_prompt};
pub use pty::PtyChannel;

use std::future::Future;

use crate::error::Result;

/// Byte-level access to an interactive shell.
pub trait ShellIo: Send {
    /// Write raw bytes to the remote shell.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next chunk of output. `None` means the remote side
    /// closed the channel.
    fn read(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Close the channel.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
