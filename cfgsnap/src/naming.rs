//! Artifact naming.
//!
//! The repository identifies artifacts purely by filename, so every name the
//! crate produces or parses goes through this module:
//!
//! ```text
//! SW1.cfg              hostname + extension (unversioned families)
//! CORE1_21.9.0.cfg     hostname + "_" + version token + extension
//! SW1-errors.log       error sentinel, never a config artifact
//! CORE1.txt            license text awaiting notification
//! ```

use std::cmp::Ordering;

use crate::error::DriverError;

/// Suffix of the per-host error sentinel.
pub const ERROR_LOG_SUFFIX: &str = "-errors.log";

/// Name of a config artifact.
///
/// `version` is expected to have passed [`sanitize_version`].
pub fn artifact_name(hostname: &str, version: Option<&str>, extension: &str) -> String {
    match version {
        Some(version) => format!("{hostname}_{version}.{extension}"),
        None => format!("{hostname}.{extension}"),
    }
}

/// Name of the error sentinel for `hostname`.
pub fn error_log_name(hostname: &str) -> String {
    format!("{hostname}{ERROR_LOG_SUFFIX}")
}

/// Whether `name` is the error sentinel of `hostname`.
pub fn is_error_log(hostname: &str, name: &str) -> bool {
    name == error_log_name(hostname)
}

/// Name of the license artifact for `hostname`.
pub fn license_name(hostname: &str, extension: &str) -> String {
    format!("{hostname}.{extension}")
}

/// Parse an artifact name back into its version token.
///
/// Returns `None` if `name` is not an artifact of `hostname` with the given
/// extension, `Some(None)` for the unversioned name and `Some(Some(v))` for a
/// version-qualified one.
pub fn parse_artifact_name<'a>(
    hostname: &str,
    name: &'a str,
    extension: &str,
) -> Option<Option<&'a str>> {
    let rest = name.strip_prefix(hostname)?;
    let stem = rest.strip_suffix(extension)?.strip_suffix('.')?;
    if stem.is_empty() {
        return Some(None);
    }
    let version = stem.strip_prefix('_')?;
    if version.is_empty() || !version.chars().all(is_version_char) {
        return None;
    }
    Some(Some(version))
}

fn is_version_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')
}

/// Validate a version token parsed out of device output.
///
/// Tokens end up in filenames, so anything outside `[A-Za-z0-9._-]` is
/// rejected rather than rewritten.
pub fn sanitize_version(token: &str) -> Result<String, DriverError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(DriverError::parse("version", "empty version token"));
    }
    if token.starts_with('.') || !token.chars().all(is_version_char) {
        return Err(DriverError::parse(
            "version",
            format!("unusable version token {token:?}"),
        ));
    }
    Ok(token.to_string())
}

/// Natural ordering of version tokens: digit runs compare numerically.
///
/// `v9 < v10`, `21.9.0 < 21.10.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = Chunks(a);
    let mut right = Chunks(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(n), Ok(m)) => n.cmp(&m),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Splits a string into alternating digit / non-digit runs.
struct Chunks<'a>(&'a str);

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.0.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .0
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.0.len());
        let (chunk, rest) = self.0.split_at(end);
        self.0 = rest;
        Some(chunk)
    }
}
