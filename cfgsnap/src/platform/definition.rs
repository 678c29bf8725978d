//! Per-family platform definition.

use std::time::Duration;

use super::DeviceFamily;
use crate::reconcile::IgnoreRule;

/// Everything about a device family that is data rather than behavior.
///
/// The state machines live in the vendor modules; they read their
/// timeouts, paths and naming from here so a run configuration can
/// override them.
#[derive(Debug, Clone)]
pub struct PlatformDefinition {
    /// Platform name (e.g. "cisco_switch").
    pub name: String,

    /// Family this definition belongs to.
    pub family: DeviceFamily,

    /// Artifact file extension, without the dot.
    pub extension: String,

    /// Whether artifact names carry the device's software version.
    pub versioned: bool,

    /// Lines excluded when comparing against the stored artifact.
    pub ignore: IgnoreRule,

    /// Per-expect and per-remote-operation timeout.
    pub timeout: Duration,

    /// Remote directory the device saves to / is read from.
    pub remote_dir: String,

    /// Command printing license text, for license-bearing families.
    pub license_command: Option<String>,

    /// Output fragments that mean a device command failed.
    pub failed_when_contains: Vec<String>,
}

impl PlatformDefinition {
    /// Create a definition with the defaults shared by most families.
    pub fn new(name: impl Into<String>, family: DeviceFamily) -> Self {
        Self {
            name: name.into(),
            family,
            extension: "cfg".to_string(),
            versioned: false,
            ignore: IgnoreRule::none(),
            timeout: Duration::from_secs(60),
            remote_dir: String::new(),
            license_command: None,
            failed_when_contains: vec![],
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_versioned(mut self, versioned: bool) -> Self {
        self.versioned = versioned;
        self
    }

    pub fn with_ignore(mut self, ignore: IgnoreRule) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_remote_dir(mut self, dir: impl Into<String>) -> Self {
        self.remote_dir = dir.into();
        self
    }

    pub fn with_license_command(mut self, command: impl Into<String>) -> Self {
        self.license_command = Some(command.into());
        self
    }

    /// Add a failure pattern.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    /// First failure pattern contained in `output`, if any.
    pub fn detect_failure(&self, output: &str) -> Option<&str> {
        self.failed_when_contains
            .iter()
            .map(String::as_str)
            .find(|pattern| output.contains(pattern))
    }

    /// Remote path of `name` inside [`remote_dir`](Self::remote_dir).
    pub fn remote_path(&self, name: &str) -> String {
        if self.remote_dir.is_empty() || self.remote_dir.ends_with('/') {
            format!("{}{}", self.remote_dir, name)
        } else {
            format!("{}/{}", self.remote_dir, name)
        }
    }
}
