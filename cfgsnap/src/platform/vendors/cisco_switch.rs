//! Cisco IOS-style switches.
//!
//! The running configuration is read straight from the interactive shell:
//!
//! ```text
//! SW1>  enable / Password: / SW1#
//! SW1#  terminal length 0
//! SW1#  show running-config
//! ```
//!
//! Artifacts are unversioned: `SW1.cfg`.

use std::time::Duration;

use crate::channel::{Interaction, PromptPattern, PromptRole, ShellIo, host_prompt};
use crate::driver::{
    self, Artifact, DeviceDriver, RetrieveContext, Snapshot, escalate, send_command,
};
use crate::error::{ChannelError, Result};
use crate::naming;
use crate::platform::{DeviceFamily, PlatformDefinition};
use crate::reconcile::IgnoreRule;
use crate::transport::Session;

/// Create the switch platform definition.
pub fn platform() -> PlatformDefinition {
    PlatformDefinition::new("cisco_switch", DeviceFamily::CiscoSwitch)
        .with_extension("cfg")
        .with_timeout(Duration::from_secs(30))
        .with_ignore(IgnoreRule::containing(["+"]))
        .with_failure_pattern("% Invalid input")
        .with_failure_pattern("% Incomplete command")
        .with_failure_pattern("% Unknown command")
}

/// Prompts of one switch.
#[derive(Debug, Clone)]
pub struct SwitchPrompts {
    pub unprivileged: PromptPattern,
    pub privileged: PromptPattern,
    pub password: PromptPattern,
}

impl SwitchPrompts {
    pub fn new(hostname: &str) -> Result<Self> {
        let build = |role, pattern: &str| {
            PromptPattern::new(role, pattern).map_err(ChannelError::InvalidPattern)
        };
        Ok(Self {
            unprivileged: build(PromptRole::Unprivileged, &host_prompt("", hostname, ">"))?,
            privileged: build(PromptRole::Privileged, &host_prompt("", hostname, "#"))?,
            password: build(PromptRole::Password, r"(?m)^\s*[Pp]assword:\s*\z")?,
        })
    }
}

/// Switch driver.
#[derive(Debug, Clone)]
pub struct CiscoSwitchDriver {
    platform: PlatformDefinition,
}

impl CiscoSwitchDriver {
    pub fn new(platform: PlatformDefinition) -> Self {
        Self { platform }
    }

    async fn capture<S: ShellIo>(
        &self,
        io: &mut Interaction<S>,
        prompts: &SwitchPrompts,
        ctx: &RetrieveContext<'_>,
    ) -> Result<String> {
        escalate(
            io,
            &prompts.unprivileged,
            &prompts.privileged,
            &prompts.password,
            "enable",
            ctx.password,
        )
        .await?;
        send_command(io, &self.platform, "terminal length 0", &prompts.privileged).await?;
        send_command(io, &self.platform, "show running-config", &prompts.privileged).await
    }
}

impl Default for CiscoSwitchDriver {
    fn default() -> Self {
        Self::new(platform())
    }
}

impl DeviceDriver for CiscoSwitchDriver {
    fn platform(&self) -> &PlatformDefinition {
        &self.platform
    }

    async fn retrieve<S: Session>(
        &self,
        session: &mut S,
        ctx: &RetrieveContext<'_>,
    ) -> Result<Snapshot> {
        let prompts = SwitchPrompts::new(ctx.hostname)?;
        let shell = session.open_shell().await?;
        let mut io = Interaction::new(shell, self.platform.timeout);

        let config = self.capture(&mut io, &prompts, ctx).await;
        driver::close_shell(io, ctx.hostname).await;
        let config = config?;

        let name = naming::artifact_name(ctx.hostname, None, &self.platform.extension);
        let path = driver::write_staged(ctx.staging_dir, &name, &config)?;
        Ok(Snapshot::Single(Artifact {
            name,
            path,
            version: None,
        }))
    }
}
