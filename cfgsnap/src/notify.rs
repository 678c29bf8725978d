//! Hooks run once at the end of a run.
//!
//! Publishing repository changes and delivering license notices are left to
//! the deployment: a run calls [`RepositorySync::commit`] after every host
//! has been reconciled and [`NotificationSink::notify`] after the license
//! sweep. The defaults only log.

use std::path::{Path, PathBuf};

use log::info;

/// A device whose license falls inside the warning window.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LicenseNotice {
    pub hostname: String,
    pub expires: chrono::NaiveDate,
    pub days_remaining: i64,
    /// Saved license text.
    pub artifact: PathBuf,
}

/// Delivers license notices.
pub trait NotificationSink: Send + Sync {
    /// Called once per run, only if at least one license is expiring.
    ///
    /// `fragment` is the HTML table-row fragment written during the sweep.
    fn notify(&self, notices: &[LicenseNotice], fragment: &Path) -> std::io::Result<()>;
}

/// Publishes the repository after reconciliation.
pub trait RepositorySync: Send + Sync {
    /// Called once per run with the hostnames whose directory was touched.
    fn commit(&self, repository: &Path, hosts: &[String]) -> std::io::Result<()>;
}

/// Logs notices instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, notices: &[LicenseNotice], fragment: &Path) -> std::io::Result<()> {
        for notice in notices {
            info!(
                "license of {} expires {} ({} days left), text in {}",
                notice.hostname,
                notice.expires,
                notice.days_remaining,
                notice.artifact.display()
            );
        }
        info!("notification body fragment: {}", fragment.display());
        Ok(())
    }
}

/// Leaves the working tree as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSync;

impl RepositorySync for LogSync {
    fn commit(&self, repository: &Path, hosts: &[String]) -> std::io::Result<()> {
        info!(
            "{} host directories updated under {}",
            hosts.len(),
            repository.display()
        );
        Ok(())
    }
}
