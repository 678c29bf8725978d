//! Reconciliation of retrieved artifacts against the repository.

mod diff;
mod engine;

pub use diff::IgnoreRule;
pub use engine::{
    ArtifactReport, ArtifactStatus, FileSetEntry, FileSetReport, Outcome, SetClass,
    compare_artifact, move_atomic, reconcile_file_set, reconcile_snapshot,
};
