//! Expect-style interaction on top of a [`ShellIo`].
//!
//! One [`Interaction`] drives one shell: send a line, wait for one of several
//! prompts, read back what the device printed in between. There is never more
//! than one outstanding expectation; each `expect` call blocks on channel
//! reads until a prompt matches, the channel closes, or the per-call timeout
//! elapses.

use std::time::Duration;

use log::{debug, trace};
use memchr::memchr;

use super::buffer::PatternBuffer;
use super::patterns::{PromptPattern, PromptRole, first_match};
use super::ShellIo;
use crate::error::{ChannelError, Result};

/// Search window for prompt detection, in bytes.
const SEARCH_DEPTH: usize = 1000;

/// Prompt-driven interaction engine.
pub struct Interaction<S: ShellIo> {
    shell: S,
    buffer: PatternBuffer,
    timeout: Duration,
    /// Last visible input, used to strip the echo from output.
    last_sent: Option<String>,
    /// Output between the last send and the matched prompt.
    last_output: String,
    /// The matched prompt text.
    last_prompt: String,
}

impl<S: ShellIo> Interaction<S> {
    /// Create an engine over `shell` with a default per-expect timeout.
    pub fn new(shell: S, timeout: Duration) -> Self {
        Self {
            shell,
            buffer: PatternBuffer::new(SEARCH_DEPTH),
            timeout,
            last_sent: None,
            last_output: String::new(),
            last_prompt: String::new(),
        }
    }

    /// Current per-expect timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the per-expect timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send a line of input.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        debug!("send {:?}", text);
        self.last_sent = Some(text.to_string());
        self.write_line(text).await
    }

    /// Send a line of input that must not be logged (passwords).
    pub async fn send_hidden(&mut self, text: &str) -> Result<()> {
        debug!("send <hidden>");
        self.last_sent = None;
        self.write_line(text).await
    }

    async fn write_line(&mut self, text: &str) -> Result<()> {
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');
        self.shell.write(&line).await
    }

    /// Wait until one of `patterns` matches the tail of the output.
    ///
    /// When several patterns match, the first in `patterns` wins. Returns the
    /// role of the pattern that matched.
    pub async fn expect(&mut self, patterns: &[&PromptPattern]) -> Result<PromptRole> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.read_until(patterns)).await {
            Ok(result) => result,
            Err(_) => {
                let expected = patterns
                    .iter()
                    .map(|p| p.role().as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                debug!(
                    "expect timed out after {:?}; tail: {:?}",
                    timeout,
                    String::from_utf8_lossy(self.tail())
                );
                Err(ChannelError::PatternTimeout { expected, timeout }.into())
            }
        }
    }

    /// Wait for exactly one prompt.
    pub async fn expect_one(&mut self, pattern: &PromptPattern) -> Result<()> {
        self.expect(&[pattern]).await.map(|_| ())
    }

    async fn read_until(&mut self, patterns: &[&PromptPattern]) -> Result<PromptRole> {
        loop {
            if let Some(role) = self.try_match(patterns) {
                return Ok(role);
            }
            match self.shell.read().await? {
                Some(chunk) => {
                    trace!("read {} bytes", chunk.len());
                    self.buffer.extend(&chunk);
                }
                None => return Err(ChannelError::Closed.into()),
            }
        }
    }

    fn try_match(&mut self, patterns: &[&PromptPattern]) -> Option<PromptRole> {
        let (window_start, tail) = self.buffer.tail();
        let (idx, (start, end)) = first_match(patterns, tail)?;
        let role = patterns[idx].role();

        let consumed = self.buffer.split_to(window_start + end);
        let prompt_start = window_start + start;
        self.last_output = String::from_utf8_lossy(&consumed[..prompt_start]).into_owned();
        self.last_prompt = String::from_utf8_lossy(&consumed[prompt_start..])
            .trim()
            .to_string();
        debug!("matched {} prompt {:?}", role, self.last_prompt);
        Some(role)
    }

    fn tail(&self) -> &[u8] {
        let data = self.buffer.as_slice();
        &data[data.len().saturating_sub(200)..]
    }

    /// Output of the last exchange with the echoed command and the trailing
    /// prompt removed, and line endings normalised to `\n`.
    pub fn cleaned_output(&self) -> String {
        let mut text = self.last_output.replace("\r\n", "\n").replace('\r', "");

        if let Some(sent) = self.last_sent.as_deref() {
            let first_line_end = memchr(b'\n', text.as_bytes()).unwrap_or(text.len());
            if text[..first_line_end].trim_end().ends_with(sent.trim()) {
                text.drain(..(first_line_end + 1).min(text.len()));
            }
        }

        let trimmed_len = text.trim_end_matches([' ', '\t']).len();
        text.truncate(trimmed_len);
        text
    }

    /// The prompt text matched by the last `expect`.
    pub fn last_prompt(&self) -> &str {
        &self.last_prompt
    }

    /// Close the underlying shell.
    pub async fn close(mut self) -> Result<()> {
        self.shell.close().await
    }
}
