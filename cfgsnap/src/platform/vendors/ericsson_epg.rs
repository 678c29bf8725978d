//! Ericsson EPG (SEOS CLI).
//!
//! ```text
//! [local]EPG1#                 start shell
//! bash-4.2$                    show_epg_version |grep -v +
//! bash-4.2$                    exit
//! [local]EPG1#                 config
//! [local]EPG1(config)#         save EPG1_<version>.xml   (may ask [yes,no])
//! [local]EPG1(config)#         exit
//! ```
//!
//! The saved file is downloaded from `/flash/` and deleted from the CLI
//! (`delete`, which may ask for confirmation).

use std::time::Duration;

use log::warn;

use crate::channel::{Interaction, PromptPattern, PromptRole, ShellIo, host_prompt};
use crate::driver::{self, Artifact, DeviceDriver, RetrieveContext, Snapshot, send_command};
use crate::error::{ChannelError, DriverError, Result};
use crate::naming;
use crate::platform::{DeviceFamily, PlatformDefinition};
use crate::reconcile::IgnoreRule;
use crate::transport::Session;

const VERSION_TOKEN: usize = 4;

/// Create the EPG platform definition.
pub fn platform() -> PlatformDefinition {
    PlatformDefinition::new("ericsson_epg", DeviceFamily::EricssonEpg)
        .with_extension("xml")
        .with_versioned(true)
        .with_timeout(Duration::from_secs(60))
        .with_remote_dir("/flash/")
        .with_ignore(IgnoreRule::containing(["!", "+"]))
        .with_failure_pattern("% Unknown command")
        .with_failure_pattern("% Invalid")
        .with_failure_pattern("ERROR:")
}

/// Version token from `show_epg_version` output: token 4 of the last line
/// mentioning `version`.
pub fn extract_version(output: &str) -> Result<String> {
    let line = output
        .lines()
        .rev()
        .find(|line| line.contains("version"))
        .ok_or_else(|| DriverError::parse("version", "no version line in show_epg_version"))?;
    let token = line.split_whitespace().nth(VERSION_TOKEN).ok_or_else(|| {
        DriverError::parse("version", format!("version line too short: {line:?}"))
    })?;
    Ok(naming::sanitize_version(token)?)
}

/// Prompts of one EPG.
#[derive(Debug, Clone)]
pub struct EpgPrompts {
    pub exec: PromptPattern,
    pub config: PromptPattern,
    pub shell: PromptPattern,
    pub confirm: PromptPattern,
}

impl EpgPrompts {
    pub fn new(hostname: &str) -> Result<Self> {
        let build = |role, pattern: &str| {
            PromptPattern::new(role, pattern).map_err(ChannelError::InvalidPattern)
        };
        Ok(Self {
            exec: build(PromptRole::Privileged, &host_prompt(r"\[local\]", hostname, "#"))?,
            config: build(
                PromptRole::Config,
                &host_prompt(r"(?:\[local\])?", hostname, r"\(config\)#"),
            )?,
            shell: build(PromptRole::Shell, r"(?m)^bash-[^\n]*\$\s*\z")?,
            confirm: build(
                PromptRole::Confirmation,
                r"(?i)(?:\[yes,no\]|\[y/n\]|\(y/n\))[^\n]*\z",
            )?,
        })
    }
}

/// EPG driver.
#[derive(Debug, Clone)]
pub struct EricssonEpgDriver {
    platform: PlatformDefinition,
}

impl EricssonEpgDriver {
    pub fn new(platform: PlatformDefinition) -> Self {
        Self { platform }
    }

    async fn read_version<S: ShellIo>(
        &self,
        io: &mut Interaction<S>,
        prompts: &EpgPrompts,
    ) -> Result<String> {
        io.expect_one(&prompts.exec).await?;
        send_command(io, &self.platform, "start shell", &prompts.shell).await?;
        let output =
            send_command(io, &self.platform, "show_epg_version |grep -v +", &prompts.shell)
                .await?;
        send_command(io, &self.platform, "exit", &prompts.exec).await?;
        extract_version(&output)
    }

    async fn save<S: ShellIo>(
        &self,
        io: &mut Interaction<S>,
        prompts: &EpgPrompts,
        name: &str,
    ) -> Result<()> {
        send_command(io, &self.platform, "config", &prompts.config).await?;

        let command = format!("save {name}");
        io.send(&command).await?;
        if io.expect(&[&prompts.confirm, &prompts.config]).await? == PromptRole::Confirmation {
            send_command(io, &self.platform, "yes", &prompts.config).await?;
        } else if let Some(pattern) = self.platform.detect_failure(&io.cleaned_output()) {
            return Err(DriverError::CommandFailed {
                command,
                message: format!("output contains {pattern:?}"),
            }
            .into());
        }

        send_command(io, &self.platform, "exit", &prompts.exec).await?;
        Ok(())
    }

    async fn delete<S: ShellIo>(
        &self,
        io: &mut Interaction<S>,
        prompts: &EpgPrompts,
        name: &str,
    ) -> Result<()> {
        io.send(&format!("delete {name}")).await?;
        if io.expect(&[&prompts.confirm, &prompts.exec]).await? == PromptRole::Confirmation {
            io.send("y").await?;
            io.expect_one(&prompts.exec).await?;
        }
        Ok(())
    }

    async fn run<S: Session>(
        &self,
        session: &mut S,
        io: &mut Interaction<S::Shell>,
        prompts: &EpgPrompts,
        ctx: &RetrieveContext<'_>,
    ) -> Result<Artifact> {
        let version = self.read_version(io, prompts).await?;
        let name = naming::artifact_name(ctx.hostname, Some(&version), &self.platform.extension);
        self.save(io, prompts, &name).await?;

        let path = ctx.staging_dir.join(&name);
        session
            .copy_down(&self.platform.remote_path(&name), &path)
            .await?;

        if let Err(e) = self.delete(io, prompts, &name).await {
            warn!("{}: could not delete {}: {}", ctx.hostname, name, e);
        }

        Ok(Artifact {
            name,
            path,
            version: Some(version),
        })
    }
}

impl Default for EricssonEpgDriver {
    fn default() -> Self {
        Self::new(platform())
    }
}

impl DeviceDriver for EricssonEpgDriver {
    fn platform(&self) -> &PlatformDefinition {
        &self.platform
    }

    async fn retrieve<S: Session>(
        &self,
        session: &mut S,
        ctx: &RetrieveContext<'_>,
    ) -> Result<Snapshot> {
        let prompts = EpgPrompts::new(ctx.hostname)?;
        let shell = session.open_shell().await?;
        let mut io = Interaction::new(shell, self.platform.timeout);

        let artifact = self.run(session, &mut io, &prompts, ctx).await;
        driver::close_shell(io, ctx.hostname).await;
        Ok(Snapshot::Single(artifact?))
    }
}
