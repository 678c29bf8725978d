//! Device drivers.
//!
//! A driver knows how to get a configuration snapshot out of one device
//! family. The state machines live next to their platform definitions in
//! [`crate::platform::vendors`]; this module holds the capability trait they
//! implement, the snapshot types they produce, and [`fetch`], which wraps a
//! retrieval with session ownership and error-sentinel handling.

pub mod license;
mod privilege;

pub use license::{LicensePolicy, LicenseStatus};
pub use privilege::escalate;

use std::collections::BTreeSet;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{debug, info, warn};
use secrecy::SecretString;

use crate::channel::{Interaction, PromptPattern, ShellIo};
use crate::error::{DriverError, Error, FailureKind, ReconcileError, Result};
use crate::platform::PlatformDefinition;
use crate::reconcile::{self, ArtifactReport, IgnoreRule, Outcome};
use crate::repository::Repository;
use crate::transport::{Connector, Session, SessionGuard, SshConfig};

/// One retrieved file in the staging area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Final artifact name (see [`crate::naming`]).
    pub name: String,
    /// Where the retrieved copy sits in staging.
    pub path: PathBuf,
    /// Version token embedded in `name`, if any.
    pub version: Option<String>,
}

/// One group of DNS zone files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneSet {
    /// Group label, e.g. `zones` or `Priv1`.
    pub label: String,
    /// Staging directory holding the retrieved files.
    pub staged_dir: PathBuf,
    /// Repository directory, relative to the host directory.
    pub repo_dir: PathBuf,
    /// Archive directory, relative to the host directory.
    pub archive_dir: PathBuf,
    /// Only stored files starting with this prefix belong to the set.
    pub prefix: Option<String>,
    /// Names retrieved from the device.
    pub names: BTreeSet<String>,
}

/// Everything retrieved from one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// Single-file families.
    Single(Artifact),
    /// Zone-based DNS: primary config plus zone file sets.
    Zoned(ZoneSnapshot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneSnapshot {
    pub primary: Artifact,
    pub sets: Vec<ZoneSet>,
}

/// Result of [`fetch`].
#[derive(Debug)]
pub enum Retrieval {
    /// Retrieved and staged, ready for reconciliation.
    Snapshot(Snapshot),
    /// Abandoned; the failure was written to the host's error sentinel.
    Failed {
        kind: FailureKind,
        message: String,
        error_log: Option<PathBuf>,
    },
}

/// Per-host inputs to a retrieval.
#[derive(Debug, Clone, Copy)]
pub struct RetrieveContext<'a> {
    pub hostname: &'a str,
    pub username: &'a str,
    /// Used for privilege escalation; never logged.
    pub password: &'a SecretString,
    /// Host-private staging directory. Exists when `retrieve` is called.
    pub staging_dir: &'a Path,
}

/// Per-run inputs to a license check.
#[derive(Debug, Clone, Copy)]
pub struct LicenseContext<'a> {
    pub today: NaiveDate,
    /// Where license texts and the notification fragment are written.
    pub staging_root: &'a Path,
    pub policy: &'a LicensePolicy,
}

/// Capabilities shared by every device family.
pub trait DeviceDriver: Send + Sync {
    /// Static description of the family.
    fn platform(&self) -> &PlatformDefinition;

    /// Produce a snapshot over an open session.
    ///
    /// Retrieved files are written under `ctx.staging_dir`. The session is
    /// owned by the caller and closed by it.
    fn retrieve<S: Session>(
        &self,
        session: &mut S,
        ctx: &RetrieveContext<'_>,
    ) -> impl Future<Output = Result<Snapshot>> + Send;

    /// Reconcile one staged artifact against the stored one.
    fn compare(
        &self,
        staged: &Path,
        repo_dir: &Path,
        stored: Option<&str>,
    ) -> std::result::Result<Outcome, ReconcileError> {
        reconcile::compare_artifact(staged, repo_dir, stored, self.ignore())
    }

    /// Reconcile everything in `snapshot` for `hostname`.
    fn reconcile(
        &self,
        repository: &Repository,
        hostname: &str,
        snapshot: &Snapshot,
    ) -> std::result::Result<Vec<ArtifactReport>, ReconcileError> {
        reconcile::reconcile_snapshot(repository, hostname, snapshot, self.ignore())
    }

    /// Check the device license. Families without licenses report
    /// [`LicenseStatus::NotApplicable`] without touching the session.
    fn check_license<S: Session>(
        &self,
        _session: &mut S,
        _ctx: &RetrieveContext<'_>,
        _license: &LicenseContext<'_>,
    ) -> impl Future<Output = Result<LicenseStatus>> + Send {
        async { Ok(LicenseStatus::NotApplicable) }
    }

    /// Whether [`check_license`](Self::check_license) does anything.
    fn has_license(&self) -> bool {
        self.platform().license_command.is_some()
    }

    fn ignore(&self) -> &IgnoreRule {
        &self.platform().ignore
    }
}

/// Connect, retrieve and release the session.
///
/// On failure the host's staging directory is removed, the failure is
/// appended to the host's error sentinel in `repository`, and
/// [`Retrieval::Failed`] is returned. The session is closed exactly once on
/// every path; if this future is dropped mid-retrieval the session is
/// aborted instead.
pub async fn fetch<C, D>(
    connector: &C,
    driver: &D,
    ssh: &SshConfig,
    ctx: &RetrieveContext<'_>,
    repository: &Repository,
) -> Retrieval
where
    C: Connector,
    D: DeviceDriver,
{
    let result = async {
        fs::create_dir_all(ctx.staging_dir).map_err(|source| DriverError::Staging {
            path: ctx.staging_dir.to_path_buf(),
            source,
        })?;

        let session = connector.connect(ssh).await?;
        let mut guard = SessionGuard::new(session, ctx.hostname);
        let snapshot = driver.retrieve(&mut *guard, ctx).await;
        guard.release().await;
        snapshot
    }
    .await;

    match result {
        Ok(snapshot) => {
            debug!("{}: snapshot staged", ctx.hostname);
            Retrieval::Snapshot(snapshot)
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(ctx.staging_dir) {
                debug!(
                    "{}: staging cleanup of {} failed: {}",
                    ctx.hostname,
                    ctx.staging_dir.display(),
                    cleanup
                );
            }
            record_failure(repository, ctx.hostname, &e)
        }
    }
}

/// Connect, check the license and release the session.
pub async fn fetch_license<C, D>(
    connector: &C,
    driver: &D,
    ssh: &SshConfig,
    ctx: &RetrieveContext<'_>,
    license: &LicenseContext<'_>,
) -> Result<LicenseStatus>
where
    C: Connector,
    D: DeviceDriver,
{
    if !driver.has_license() {
        return Ok(LicenseStatus::NotApplicable);
    }
    let session = connector.connect(ssh).await?;
    let mut guard = SessionGuard::new(session, ctx.hostname);
    let status = driver.check_license(&mut *guard, ctx, license).await;
    guard.release().await;
    status
}

fn record_failure(repository: &Repository, hostname: &str, error: &Error) -> Retrieval {
    let kind = error.kind().unwrap_or(FailureKind::ConnectionFailure);
    let message = format!("{kind}: {error}");
    warn!("{}: retrieval failed: {}", hostname, message);

    let error_log = match repository.append_error(hostname, &message) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("{}: could not write error log: {}", hostname, e);
            None
        }
    };
    Retrieval::Failed {
        kind,
        message,
        error_log,
    }
}

/// Send one line in an interactive shell, wait for `prompt` and return the
/// cleaned output, failing if it contains one of the platform's failure
/// patterns.
pub async fn send_command<S: ShellIo>(
    io: &mut Interaction<S>,
    platform: &PlatformDefinition,
    command: &str,
    prompt: &PromptPattern,
) -> Result<String> {
    io.send(command).await?;
    io.expect_one(prompt).await?;
    let output = io.cleaned_output();
    check_output(platform, command, &output)?;
    Ok(output)
}

/// Run a command on an exec channel, failing on a non-zero exit status or a
/// failure pattern in the output.
pub async fn exec<S: Session>(
    session: &mut S,
    platform: &PlatformDefinition,
    command: &str,
) -> Result<String> {
    debug!("exec {:?}", command);
    let output = session.run(command).await?;
    if !output.success() {
        return Err(DriverError::CommandFailed {
            command: command.to_string(),
            message: format!("exit status {:?}", output.exit_status),
        }
        .into());
    }
    check_output(platform, command, &output.stdout)?;
    Ok(output.stdout)
}

fn check_output(platform: &PlatformDefinition, command: &str, output: &str) -> Result<()> {
    match platform.detect_failure(output) {
        Some(pattern) => Err(DriverError::CommandFailed {
            command: command.to_string(),
            message: format!("output contains {pattern:?}"),
        }
        .into()),
        None => Ok(()),
    }
}

/// Write retrieved text into the staging directory.
pub fn write_staged(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, content).map_err(|source| DriverError::Staging {
        path: path.clone(),
        source,
    })?;
    info!("staged {}", path.display());
    Ok(path)
}

/// Close an interactive shell, logging instead of failing: by the time the
/// shell is closed its output has been captured.
pub async fn close_shell<S: ShellIo>(io: Interaction<S>, hostname: &str) {
    if let Err(e) = io.close().await {
        debug!("{}: shell close failed: {}", hostname, e);
    }
}
