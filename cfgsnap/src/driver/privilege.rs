//! Privilege escalation on IOS-style CLIs.

use secrecy::{ExposeSecret, SecretString};

use crate::channel::{Interaction, PromptPattern, PromptRole, ShellIo};
use crate::error::{ChannelError, Result};

/// Reach the privileged prompt.
///
/// Waits for either prompt. From the unprivileged one, sends `command`,
/// expects the password prompt, sends `secret` (never logged) and requires
/// the privileged prompt. Any other prompt along the way ends the attempt.
pub async fn escalate<S: ShellIo>(
    io: &mut Interaction<S>,
    unprivileged: &PromptPattern,
    privileged: &PromptPattern,
    password: &PromptPattern,
    command: &str,
    secret: &SecretString,
) -> Result<()> {
    if io.expect(&[unprivileged, privileged]).await? == PromptRole::Privileged {
        return Ok(());
    }

    io.send(command).await?;
    io.expect_one(password).await?;
    io.send_hidden(secret.expose_secret()).await?;

    match io.expect(&[privileged, unprivileged]).await? {
        PromptRole::Privileged => Ok(()),
        _ => Err(ChannelError::UnexpectedPrompt {
            expected: PromptRole::Privileged.to_string(),
            got: io.last_prompt().to_string(),
        }
        .into()),
    }
}
