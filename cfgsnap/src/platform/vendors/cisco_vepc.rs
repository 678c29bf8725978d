//! Cisco virtual packet core (StarOS) nodes.
//!
//! Everything runs over exec channels, no interactive shell:
//! `show version` for the version token, `save configuration` into the SFTP
//! area, download, then `delete`. These nodes also carry a license that is
//! checked with `show license information`.

use std::time::Duration;

use log::warn;

use crate::driver::{
    self, Artifact, DeviceDriver, LicenseContext, LicenseStatus, RetrieveContext, Snapshot,
    license,
};
use crate::error::{DriverError, Result};
use crate::naming;
use crate::platform::{DeviceFamily, PlatformDefinition};
use crate::reconcile::IgnoreRule;
use crate::transport::Session;

/// Position of the version among the whitespace-separated tokens of
/// `show version`.
const VERSION_TOKEN: usize = 4;

/// Create the vEPC platform definition.
pub fn platform() -> PlatformDefinition {
    PlatformDefinition::new("cisco_vepc", DeviceFamily::CiscoVepc)
        .with_extension("cfg")
        .with_versioned(true)
        .with_timeout(Duration::from_secs(60))
        .with_remote_dir("/sftp/")
        .with_license_command("show license information")
        .with_ignore(IgnoreRule::containing(["+"]))
        .with_failure_pattern("Failure:")
        .with_failure_pattern("Invalid syntax")
}

/// Version token from `show version` output.
pub fn extract_version(output: &str) -> Result<String> {
    let token = output.split_whitespace().nth(VERSION_TOKEN).ok_or_else(|| {
        DriverError::parse("version", "show version output has fewer than 5 tokens")
    })?;
    Ok(naming::sanitize_version(token)?)
}

/// vEPC driver.
#[derive(Debug, Clone)]
pub struct CiscoVepcDriver {
    platform: PlatformDefinition,
}

impl CiscoVepcDriver {
    pub fn new(platform: PlatformDefinition) -> Self {
        Self { platform }
    }
}

impl Default for CiscoVepcDriver {
    fn default() -> Self {
        Self::new(platform())
    }
}

impl DeviceDriver for CiscoVepcDriver {
    fn platform(&self) -> &PlatformDefinition {
        &self.platform
    }

    async fn retrieve<S: Session>(
        &self,
        session: &mut S,
        ctx: &RetrieveContext<'_>,
    ) -> Result<Snapshot> {
        let output = driver::exec(session, &self.platform, "show version").await?;
        let version = extract_version(&output)?;

        let name = naming::artifact_name(ctx.hostname, Some(&version), &self.platform.extension);
        let remote = self.platform.remote_path(&name);
        driver::exec(
            session,
            &self.platform,
            &format!("save configuration {remote}"),
        )
        .await?;

        let path = ctx.staging_dir.join(&name);
        session.copy_down(&remote, &path).await?;

        if let Err(e) = driver::exec(session, &self.platform, &format!("delete {remote}")).await {
            warn!("{}: could not delete {}: {}", ctx.hostname, remote, e);
        }

        Ok(Snapshot::Single(Artifact {
            name,
            path,
            version: Some(version),
        }))
    }

    async fn check_license<S: Session>(
        &self,
        session: &mut S,
        ctx: &RetrieveContext<'_>,
        license: &LicenseContext<'_>,
    ) -> Result<LicenseStatus> {
        let Some(command) = self.platform.license_command.as_deref() else {
            return Ok(LicenseStatus::NotApplicable);
        };
        let text = driver::exec(session, &self.platform, command).await?;
        Ok(license::assess(
            ctx.hostname,
            &text,
            license.today,
            license.staging_root,
            license.policy,
        )?)
    }
}
