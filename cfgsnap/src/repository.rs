//! File-level view of the configuration repository.
//!
//! One directory per hostname. The repository's version control is somebody
//! else's job; this module only reads and writes files in the working tree.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::debug;

use crate::error::ReconcileError;
use crate::naming;

/// Timestamp format of error log entries.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Repository working tree rooted at one directory.
#[derive(Debug, Clone)]
pub struct Repository {
    root: PathBuf,
}

impl Repository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `hostname`'s artifacts.
    pub fn host_dir(&self, hostname: &str) -> PathBuf {
        self.root.join(hostname)
    }

    /// Create the host directory if missing and return it.
    pub fn ensure_host_dir(&self, hostname: &str) -> Result<PathBuf, ReconcileError> {
        let dir = self.host_dir(hostname);
        create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Create `relative` under the host directory if missing.
    pub fn ensure_dir(&self, hostname: &str, relative: &Path) -> Result<PathBuf, ReconcileError> {
        let dir = self.host_dir(hostname).join(relative);
        create_dir_all(&dir)?;
        Ok(dir)
    }

    /// The stored artifact for a single-file host.
    ///
    /// Candidates are files named after the host's artifact convention with
    /// `extension`; the greatest by natural version order wins, and a
    /// version-qualified name beats the bare one. The error sentinel is never
    /// a candidate. A missing host directory means nothing is stored.
    pub fn latest_artifact(
        &self,
        hostname: &str,
        extension: &str,
    ) -> Result<Option<String>, ReconcileError> {
        let dir = self.host_dir(hostname);
        if !dir.is_dir() {
            return Ok(None);
        }

        let names = self.list_files(&dir, Some(hostname))?;
        let latest = names
            .iter()
            .filter(|name| !naming::is_error_log(hostname, name))
            .filter_map(|name| {
                naming::parse_artifact_name(hostname, name, extension).map(|v| (v, name))
            })
            .max_by(|(a, _), (b, _)| match (a, b) {
                (Some(a), Some(b)) => naming::compare_versions(a, b),
                (a, b) => a.is_some().cmp(&b.is_some()),
            })
            .map(|(_, name)| name.clone());
        Ok(latest)
    }

    /// Names of the regular files directly in `dir`, optionally only those
    /// starting with `prefix`.
    pub fn list_files(
        &self,
        dir: &Path,
        prefix: Option<&str>,
    ) -> Result<BTreeSet<String>, ReconcileError> {
        let directory_error = |source| ReconcileError::Directory {
            path: dir.to_path_buf(),
            source,
        };

        let mut names = BTreeSet::new();
        for entry in fs::read_dir(dir).map_err(directory_error)? {
            let entry = entry.map_err(directory_error)?;
            if !entry.file_type().map_err(directory_error)?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if prefix.is_none_or(|p| name.starts_with(p)) {
                names.insert(name);
            }
        }
        Ok(names)
    }

    /// Append `<timestamp> : <message>` to the host's error sentinel.
    ///
    /// Returns the sentinel path.
    pub fn append_error(&self, hostname: &str, message: &str) -> Result<PathBuf, ReconcileError> {
        let dir = self.ensure_host_dir(hostname)?;
        let path = dir.join(naming::error_log_name(hostname));
        let line = format!("{} : {}\n", Local::now().format(TIMESTAMP_FORMAT), message);

        let log_error = |source| ReconcileError::ErrorLog {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(log_error)?;
        file.write_all(line.as_bytes()).map_err(log_error)?;
        debug!("{}: error logged to {}", hostname, path.display());
        Ok(path)
    }
}

fn create_dir_all(dir: &Path) -> Result<(), ReconcileError> {
    fs::create_dir_all(dir).map_err(|source| ReconcileError::Directory {
        path: dir.to_path_buf(),
        source,
    })
}
