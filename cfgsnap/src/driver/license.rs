//! License expiry evaluation.
//!
//! License-bearing devices print a block of text with one line containing
//! `Expire`, e.g.
//!
//! ```text
//! Expires: Tue Oct 15 23:59:59 UTC 2026
//! ```
//!
//! The expiry date is read from fixed whitespace-separated positions on that
//! line: day at 3, month at 2, year at 6.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{debug, info};
use serde::Serialize;

use crate::error::DriverError;
use crate::naming;

const DAY: usize = 3;
const MONTH: usize = 2;
const YEAR: usize = 6;

/// What to do with licenses close to expiry.
#[derive(Debug, Clone)]
pub struct LicensePolicy {
    /// Licenses expiring within this many days are reported.
    pub warn_days: i64,
    /// Extension of the saved license text.
    pub extension: String,
    /// Name of the accumulating notification fragment.
    pub fragment: String,
}

impl Default for LicensePolicy {
    fn default() -> Self {
        Self {
            warn_days: 30,
            extension: "txt".to_string(),
            fragment: "body_table.txt".to_string(),
        }
    }
}

/// Result of evaluating one device's license text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseEvaluation {
    pub hostname: String,
    pub expires: NaiveDate,
    pub days_remaining: i64,
    pub expiring: bool,
}

/// License state of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LicenseStatus {
    /// The family has no license semantics.
    NotApplicable,
    /// Not within the warning window.
    Valid {
        expires: NaiveDate,
        days_remaining: i64,
    },
    /// Within the warning window; the license text was saved to `artifact`.
    Expiring {
        expires: NaiveDate,
        days_remaining: i64,
        artifact: PathBuf,
    },
}

/// Find the expiry date in license text.
pub fn parse_expiry(text: &str) -> Result<NaiveDate, DriverError> {
    let line = text
        .lines()
        .find(|line| line.contains("Expire"))
        .ok_or_else(|| DriverError::parse("license", "no Expire line in license output"))?;

    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() <= YEAR {
        return Err(DriverError::parse(
            "license",
            format!("Expire line too short: {line:?}"),
        ));
    }

    let date = format!("{} {} {}", tokens[DAY], tokens[MONTH], tokens[YEAR]);
    NaiveDate::parse_from_str(&date, "%d %B %Y").map_err(|e| {
        DriverError::parse("license", format!("bad expiry date {date:?}: {e}"))
    })
}

/// Evaluate license text against `today`.
pub fn evaluate(
    hostname: &str,
    text: &str,
    today: NaiveDate,
    warn_days: i64,
) -> Result<LicenseEvaluation, DriverError> {
    let expires = parse_expiry(text)?;
    let days_remaining = (expires - today).num_days();
    debug!("{}: license expires {} ({} days)", hostname, expires, days_remaining);
    Ok(LicenseEvaluation {
        hostname: hostname.to_string(),
        expires,
        days_remaining,
        expiring: days_remaining <= warn_days,
    })
}

/// Save the license text of an expiring device and add its row to the
/// notification fragment, both in `staging_root`.
pub fn record_expiring(
    staging_root: &Path,
    evaluation: &LicenseEvaluation,
    text: &str,
    policy: &LicensePolicy,
) -> Result<PathBuf, DriverError> {
    let artifact = staging_root.join(naming::license_name(&evaluation.hostname, &policy.extension));
    fs::write(&artifact, text).map_err(|source| staging_error(&artifact, source))?;

    let fragment = staging_root.join(&policy.fragment);
    let row = format!(
        "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
        evaluation.hostname, evaluation.expires, evaluation.days_remaining
    );
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&fragment)
        .and_then(|mut f| f.write_all(row.as_bytes()))
        .map_err(|source| staging_error(&fragment, source))?;

    info!(
        "{}: license expires {} ({} days left)",
        evaluation.hostname, evaluation.expires, evaluation.days_remaining
    );
    Ok(artifact)
}

/// Evaluate and, if expiring, record.
pub fn assess(
    hostname: &str,
    text: &str,
    today: NaiveDate,
    staging_root: &Path,
    policy: &LicensePolicy,
) -> Result<LicenseStatus, DriverError> {
    let evaluation = evaluate(hostname, text, today, policy.warn_days)?;
    if !evaluation.expiring {
        return Ok(LicenseStatus::Valid {
            expires: evaluation.expires,
            days_remaining: evaluation.days_remaining,
        });
    }
    let artifact = record_expiring(staging_root, &evaluation, text, policy)?;
    Ok(LicenseStatus::Expiring {
        expires: evaluation.expires,
        days_remaining: evaluation.days_remaining,
        artifact,
    })
}

/// Remove license texts and the fragment from `staging_root`.
///
/// Returns how many files were removed.
pub fn clear_temporary_files(staging_root: &Path, policy: &LicensePolicy) -> io::Result<usize> {
    let suffix = format!(".{}", policy.extension);
    let mut removed = 0;
    for entry in fs::read_dir(staging_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(&suffix) || name == policy.fragment.as_str() {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn staging_error(path: &Path, source: io::Error) -> DriverError {
    DriverError::Staging {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LICENSE: &str = "\
Key Information:
  Issued: Mon Oct 16 10:00:00 UTC 2023
  Expires: Sun Nov 08 23:59:59 UTC 2026
  Issued By: Cisco Systems
";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    #[test]
    fn test_parse_expiry() {
        assert_eq!(
            parse_expiry(LICENSE).unwrap(),
            NaiveDate::from_ymd_opt(2026, 11, 8).unwrap()
        );
    }

    #[test]
    fn test_full_month_name() {
        let text = "Expire: Tue January 05 00:00:00 UTC 2027";
        assert_eq!(
            parse_expiry(text).unwrap(),
            NaiveDate::from_ymd_opt(2027, 1, 5).unwrap()
        );
    }

    #[test]
    fn test_missing_or_malformed_expire_line() {
        let err = parse_expiry("Issued: today").unwrap_err();
        assert!(matches!(err, DriverError::Parse { .. }));
        let err = parse_expiry("Expires: never").unwrap_err();
        assert!(matches!(err, DriverError::Parse { .. }));
        let err = parse_expiry("Expires: Sun Foo 08 23:59:59 UTC 2026").unwrap_err();
        assert!(matches!(err, DriverError::Parse { .. }));
    }

    #[test]
    fn test_threshold() {
        let e = evaluate("vEPC-1", LICENSE, today(), 30).unwrap();
        assert_eq!(e.days_remaining, 21);
        assert!(e.expiring);

        let e = evaluate("vEPC-1", LICENSE, today(), 21).unwrap();
        assert!(e.expiring);

        let e = evaluate("vEPC-1", LICENSE, today(), 20).unwrap();
        assert!(!e.expiring);
    }

    #[test]
    fn test_assess_records_artifact_and_fragment() {
        let staging = tempfile::tempdir().unwrap();
        let policy = LicensePolicy::default();

        let status = assess("vEPC-1", LICENSE, today(), staging.path(), &policy).unwrap();
        let LicenseStatus::Expiring { artifact, days_remaining, .. } = status else {
            panic!("expected expiring, got {status:?}");
        };
        assert_eq!(days_remaining, 21);
        assert_eq!(artifact, staging.path().join("vEPC-1.txt"));
        assert_eq!(fs::read_to_string(&artifact).unwrap(), LICENSE);

        assess("vEPC-2", LICENSE, today(), staging.path(), &policy).unwrap();
        let fragment = fs::read_to_string(staging.path().join("body_table.txt")).unwrap();
        assert_eq!(
            fragment,
            "<tr><td>vEPC-1</td><td>2026-11-08</td><td>21</td></tr>\n\
             <tr><td>vEPC-2</td><td>2026-11-08</td><td>21</td></tr>\n"
        );

        assert_eq!(clear_temporary_files(staging.path(), &policy).unwrap(), 3);
        assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_valid_license_writes_nothing() {
        let staging = tempfile::tempdir().unwrap();
        let policy = LicensePolicy {
            warn_days: 7,
            ..LicensePolicy::default()
        };
        let status = assess("vEPC-1", LICENSE, today(), staging.path(), &policy).unwrap();
        assert!(matches!(status, LicenseStatus::Valid { days_remaining: 21, .. }));
        assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
    }
}
