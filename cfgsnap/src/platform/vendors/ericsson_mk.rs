//! Ericsson MK core nodes, driven from the ANCB shell.
//!
//! `gsh get_ne` reports the software level, `gsh export_config_active`
//! writes the active configuration to a fixed file in the login user's home,
//! which is downloaded and then removed with `rm`.

use std::time::Duration;

use log::warn;
use regex::escape;

use crate::channel::{Interaction, PromptPattern, PromptRole, ShellIo};
use crate::driver::{self, Artifact, DeviceDriver, RetrieveContext, Snapshot, send_command};
use crate::error::{ChannelError, DriverError, Result};
use crate::naming;
use crate::platform::{DeviceFamily, PlatformDefinition};
use crate::reconcile::IgnoreRule;
use crate::transport::Session;

/// File written by `gsh export_config_active`.
pub const EXPORT_FILE: &str = "ConfigFile_from_export";

/// Placeholder in `remote_dir` replaced by the login user.
const USER_PLACEHOLDER: &str = "{user}";

/// Create the MK platform definition.
pub fn platform() -> PlatformDefinition {
    PlatformDefinition::new("ericsson_mk", DeviceFamily::EricssonMk)
        .with_extension("cfg")
        .with_versioned(true)
        .with_timeout(Duration::from_secs(60))
        .with_remote_dir("/Core/home/{user}/")
        .with_ignore(IgnoreRule::containing(["#"]))
        .with_failure_pattern("command not found")
        .with_failure_pattern("No such file or directory")
        .with_failure_pattern("Permission denied")
}

/// Version from the `SoftwareLevel` line of `gsh get_ne`.
///
/// ```text
/// SoftwareLevel : MK_R12(R12A05)
/// ```
/// yields `R12A05`.
pub fn extract_version(output: &str) -> Result<String> {
    let line = output
        .lines()
        .find(|line| line.contains("SoftwareLevel"))
        .ok_or_else(|| DriverError::parse("version", "no SoftwareLevel in gsh get_ne"))?;
    let level = line.split_whitespace().nth(2).ok_or_else(|| {
        DriverError::parse("version", format!("SoftwareLevel line too short: {line:?}"))
    })?;
    let version = level
        .split_once('(')
        .and_then(|(_, rest)| rest.strip_suffix(')'))
        .ok_or_else(|| {
            DriverError::parse("version", format!("no (version) in {level:?}"))
        })?;
    Ok(naming::sanitize_version(version)?)
}

/// The ANCB shell prompt of `hostname`.
pub fn prompt(hostname: &str) -> Result<PromptPattern> {
    let pattern = format!(r"(?m)^=== {} [^\n]*ANCB ~ #\s*\z", escape(hostname));
    PromptPattern::new(PromptRole::Shell, &pattern)
        .map_err(|e| ChannelError::InvalidPattern(e).into())
}

/// MK driver.
#[derive(Debug, Clone)]
pub struct EricssonMkDriver {
    platform: PlatformDefinition,
}

impl EricssonMkDriver {
    pub fn new(platform: PlatformDefinition) -> Self {
        Self { platform }
    }

    fn export_path(&self, username: &str) -> String {
        let dir = self.platform.remote_dir.replace(USER_PLACEHOLDER, username);
        if dir.is_empty() || dir.ends_with('/') {
            format!("{dir}{EXPORT_FILE}")
        } else {
            format!("{dir}/{EXPORT_FILE}")
        }
    }

    async fn export<S: ShellIo>(
        &self,
        io: &mut Interaction<S>,
        prompt: &PromptPattern,
    ) -> Result<String> {
        io.expect_one(prompt).await?;
        let output = send_command(io, &self.platform, "gsh get_ne", prompt).await?;
        let version = extract_version(&output)?;
        send_command(io, &self.platform, "gsh export_config_active", prompt).await?;
        Ok(version)
    }

    async fn run<S: Session>(
        &self,
        session: &mut S,
        io: &mut Interaction<S::Shell>,
        prompt: &PromptPattern,
        ctx: &RetrieveContext<'_>,
    ) -> Result<Artifact> {
        let version = self.export(io, prompt).await?;
        let name = naming::artifact_name(ctx.hostname, Some(&version), &self.platform.extension);

        let path = ctx.staging_dir.join(&name);
        session
            .copy_down(&self.export_path(ctx.username), &path)
            .await?;

        let remove = format!("rm {EXPORT_FILE}");
        if let Err(e) = send_command(io, &self.platform, &remove, prompt).await {
            warn!("{}: could not remove {}: {}", ctx.hostname, EXPORT_FILE, e);
        }

        Ok(Artifact {
            name,
            path,
            version: Some(version),
        })
    }
}

impl Default for EricssonMkDriver {
    fn default() -> Self {
        Self::new(platform())
    }
}

impl DeviceDriver for EricssonMkDriver {
    fn platform(&self) -> &PlatformDefinition {
        &self.platform
    }

    async fn retrieve<S: Session>(
        &self,
        session: &mut S,
        ctx: &RetrieveContext<'_>,
    ) -> Result<Snapshot> {
        let prompt = prompt(ctx.hostname)?;
        let shell = session.open_shell().await?;
        let mut io = Interaction::new(shell, self.platform.timeout);

        let artifact = self.run(session, &mut io, &prompt, ctx).await;
        driver::close_shell(io, ctx.hostname).await;
        Ok(Snapshot::Single(artifact?))
    }
}
