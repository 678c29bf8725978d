//! Classify retrieved artifacts against the repository and apply the result.
//!
//! Every mutation is a single rename into place, so an interrupted run leaves
//! each artifact either fully old or fully new.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;
use tempfile::NamedTempFile;

use super::diff::IgnoreRule;
use crate::driver::{Artifact, Snapshot, ZoneSet};
use crate::error::ReconcileError;
use crate::repository::Repository;

/// What happened to one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Same content as the stored copy; the retrieved copy was discarded.
    Unchanged,
    /// Content differed; the stored copy was overwritten.
    Replaced,
    /// No stored copy under this name; the artifact was added.
    Added,
    /// No longer present on the device; the stored copy was archived.
    Archived,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Unchanged => "unchanged",
            Outcome::Replaced => "replaced",
            Outcome::Added => "added",
            Outcome::Archived => "archived",
        };
        f.write_str(name)
    }
}

/// Reconcile one retrieved artifact against the stored one.
///
/// * `stored` is `None`: added.
/// * `stored` names a different file (version changed): added, the stored
///   file stays where it is. If a file of the staged name is already in
///   `repo_dir` (a rollback to an earlier version) it is compared instead.
/// * same name: compared with `ignore` applied; unchanged discards the
///   staged copy, otherwise it replaces the stored one.
pub fn compare_artifact(
    staged: &Path,
    repo_dir: &Path,
    stored: Option<&str>,
    ignore: &IgnoreRule,
) -> Result<Outcome, ReconcileError> {
    let name = file_name(staged)?;
    let target = repo_dir.join(name);

    let same_name = stored.is_some_and(|stored| stored == name);
    if !same_name && !target.is_file() {
        move_atomic(staged, &target)?;
        return Ok(Outcome::Added);
    }

    let new = read_text(staged)?;
    let old = read_text(&target)?;
    if ignore.equivalent(&new, &old) {
        fs::remove_file(staged).map_err(|source| ReconcileError::Remove {
            path: staged.to_path_buf(),
            source,
        })?;
        Ok(Outcome::Unchanged)
    } else {
        move_atomic(staged, &target)?;
        Ok(Outcome::Replaced)
    }
}

/// How a name was classified within a file set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetClass {
    /// Only in the new set.
    Added,
    /// In both sets.
    Compared,
    /// Only in the old set.
    Archived,
}

/// One name of a reconciled file set and what happened to it.
#[derive(Debug)]
pub struct FileSetEntry {
    pub name: String,
    pub class: SetClass,
    pub result: Result<Outcome, ReconcileError>,
}

/// Result of [`reconcile_file_set`]. Every name of `new ∪ old` appears
/// exactly once.
#[derive(Debug, Default)]
pub struct FileSetReport {
    pub entries: Vec<FileSetEntry>,
}

impl FileSetReport {
    /// Names classified as `class`.
    pub fn names(&self, class: SetClass) -> BTreeSet<&str> {
        self.entries
            .iter()
            .filter(|e| e.class == class)
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Entries whose mutation failed.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ReconcileError)> {
        self.entries
            .iter()
            .filter_map(|e| e.result.as_ref().err().map(|err| (e.name.as_str(), err)))
    }
}

/// Reconcile a set of same-kind files (DNS zones) by exact name.
///
/// Names in both sets are compared pairwise, new-only names are added and
/// old-only names are moved to `archive_dir`. A failing file does not stop
/// its siblings.
pub fn reconcile_file_set(
    new: &BTreeSet<String>,
    old: &BTreeSet<String>,
    staged_dir: &Path,
    repo_dir: &Path,
    archive_dir: &Path,
    ignore: &IgnoreRule,
) -> FileSetReport {
    let mut report = FileSetReport::default();

    for name in new {
        let staged = staged_dir.join(name);
        let (class, result) = if old.contains(name) {
            (
                SetClass::Compared,
                compare_artifact(&staged, repo_dir, Some(name), ignore),
            )
        } else {
            (
                SetClass::Added,
                compare_artifact(&staged, repo_dir, None, ignore),
            )
        };
        report.entries.push(FileSetEntry {
            name: name.clone(),
            class,
            result,
        });
    }

    for name in old.difference(new) {
        let result = move_atomic(&repo_dir.join(name), &archive_dir.join(name))
            .map(|()| Outcome::Archived);
        report.entries.push(FileSetEntry {
            name: name.clone(),
            class: SetClass::Archived,
            result,
        });
    }

    report
}

/// Per-artifact result, as reported for a host.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactReport {
    /// Path relative to the host directory.
    pub artifact: String,
    #[serde(flatten)]
    pub status: ArtifactStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactStatus {
    Done { outcome: Outcome },
    Failed { message: String },
}

impl ArtifactReport {
    fn new(artifact: String, result: Result<Outcome, ReconcileError>) -> Self {
        let status = match result {
            Ok(outcome) => ArtifactStatus::Done { outcome },
            Err(e) => ArtifactStatus::Failed {
                message: e.to_string(),
            },
        };
        Self { artifact, status }
    }

    /// The outcome, if the mutation succeeded.
    pub fn outcome(&self) -> Option<Outcome> {
        match self.status {
            ArtifactStatus::Done { outcome } => Some(outcome),
            ArtifactStatus::Failed { .. } => None,
        }
    }
}

/// Reconcile everything a driver retrieved for `hostname`.
///
/// Fails only if the host's repository directories cannot be prepared or
/// listed; per-artifact failures are reported in the returned list.
pub fn reconcile_snapshot(
    repository: &Repository,
    hostname: &str,
    snapshot: &Snapshot,
    ignore: &IgnoreRule,
) -> Result<Vec<ArtifactReport>, ReconcileError> {
    let host_dir = repository.ensure_host_dir(hostname)?;
    let mut reports = Vec::new();

    match snapshot {
        Snapshot::Single(artifact) => {
            let extension = extension_of(artifact);
            let stored = repository.latest_artifact(hostname, extension)?;
            debug!("{}: stored artifact {:?}", hostname, stored);
            let result = compare_artifact(&artifact.path, &host_dir, stored.as_deref(), ignore);
            reports.push(report(hostname, artifact.name.clone(), result));
        }
        Snapshot::Zoned(zoned) => {
            for set in &zoned.sets {
                repository.ensure_dir(hostname, &set.repo_dir)?;
                repository.ensure_dir(hostname, &set.archive_dir)?;
            }

            let primary = &zoned.primary;
            let stored = host_dir
                .join(&primary.name)
                .is_file()
                .then_some(primary.name.as_str());
            let result = compare_artifact(&primary.path, &host_dir, stored, ignore);
            reports.push(report(hostname, primary.name.clone(), result));

            for set in &zoned.sets {
                reports.extend(reconcile_zone_set(repository, hostname, set, ignore)?);
            }
        }
    }

    Ok(reports)
}

fn reconcile_zone_set(
    repository: &Repository,
    hostname: &str,
    set: &ZoneSet,
    ignore: &IgnoreRule,
) -> Result<Vec<ArtifactReport>, ReconcileError> {
    let host_dir = repository.host_dir(hostname);
    let repo_dir = host_dir.join(&set.repo_dir);
    let archive_dir = host_dir.join(&set.archive_dir);
    let old = repository.list_files(&repo_dir, set.prefix.as_deref())?;

    let file_report =
        reconcile_file_set(&set.names, &old, &set.staged_dir, &repo_dir, &archive_dir, ignore);

    Ok(file_report
        .entries
        .into_iter()
        .map(|entry| {
            let dir = match entry.class {
                SetClass::Archived => &set.archive_dir,
                SetClass::Added | SetClass::Compared => &set.repo_dir,
            };
            let artifact = dir.join(&entry.name).to_string_lossy().into_owned();
            report(hostname, artifact, entry.result)
        })
        .collect())
}

fn report(
    hostname: &str,
    artifact: String,
    result: Result<Outcome, ReconcileError>,
) -> ArtifactReport {
    match &result {
        Ok(outcome) => info!("{}: {} {}", hostname, artifact, outcome),
        Err(e) => warn!("{}: {} not reconciled: {}", hostname, artifact, e),
    }
    ArtifactReport::new(artifact, result)
}

fn extension_of(artifact: &Artifact) -> &str {
    Path::new(&artifact.name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> Result<&str, ReconcileError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ReconcileError::Read {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
        })
}

fn read_text(path: &Path) -> Result<String, ReconcileError> {
    let bytes = fs::read(path).map_err(|source| ReconcileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Move `from` to `to`, replacing `to` if it exists.
///
/// A plain rename where possible. Across filesystems the content is copied
/// into a temporary file next to `to` and that file is renamed into place.
pub fn move_atomic(from: &Path, to: &Path) -> Result<(), ReconcileError> {
    let move_error = |source: io::Error| ReconcileError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    match fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!("{} is on another filesystem, copying", from.display());
        }
        Err(e) => return Err(move_error(e)),
    }

    let dir = to.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let mut tmp = NamedTempFile::new_in(&dir).map_err(move_error)?;
    let mut src = File::open(from).map_err(move_error)?;
    io::copy(&mut src, tmp.as_file_mut()).map_err(move_error)?;
    tmp.as_file().sync_all().map_err(move_error)?;
    tmp.persist(to).map_err(|e| move_error(e.error))?;
    fs::remove_file(from).map_err(move_error)
}
