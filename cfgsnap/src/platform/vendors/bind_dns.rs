//! BIND name servers.
//!
//! Retrieval is file based: the primary `named.conf`, the public zone files
//! and each private zone group are listed and downloaded over SFTP. The
//! resulting snapshot is reconciled file set by file set.
//!
//! ```text
//! device                              repository (per host)
//! /var/named/named.conf               named.conf
//! /var/named/zones/zone.*             zones/            archive: zones/archive/
//! /var/named/zones/private/priv1/*    zones/private/Priv1/   archive: .../Priv1/archive/
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, info};
use serde::Deserialize;

use crate::driver::{Artifact, DeviceDriver, RetrieveContext, Snapshot, ZoneSet, ZoneSnapshot};
use crate::error::{DriverError, Result};
use crate::platform::{DeviceFamily, PlatformDefinition};
use crate::transport::Session;

/// Create the BIND platform definition.
pub fn platform() -> PlatformDefinition {
    PlatformDefinition::new("bind_dns", DeviceFamily::BindDns)
        .with_extension("conf")
        .with_timeout(Duration::from_secs(60))
        .with_remote_dir("/var/named/")
}

/// Where zone files live, on the server and in the repository.
///
/// Directory values are relative: remote ones to the platform's remote
/// directory, repository ones to the host directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ZoneLayout {
    /// Primary configuration file name.
    pub primary: String,
    /// Public zone directory, same relative path on both sides.
    pub zones_dir: String,
    /// Only files starting with this are public zones.
    pub zone_prefix: String,
    /// Parent of the private group directories, same on both sides.
    pub private_dir: String,
    /// Archive subdirectory name inside each zone directory.
    pub archive_dir: String,
    /// Repository label to remote directory name, e.g. `Priv1 = "priv1"`.
    pub groups: IndexMap<String, String>,
}

impl Default for ZoneLayout {
    fn default() -> Self {
        Self {
            primary: "named.conf".to_string(),
            zones_dir: "zones".to_string(),
            zone_prefix: "zone.".to_string(),
            private_dir: "zones/private".to_string(),
            archive_dir: "archive".to_string(),
            groups: IndexMap::from([
                ("Priv1".to_string(), "priv1".to_string()),
                ("Priv2".to_string(), "priv2".to_string()),
            ]),
        }
    }
}

/// One zone set to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SetPlan {
    label: String,
    remote_dir: String,
    repo_dir: PathBuf,
    prefix: Option<String>,
}

impl ZoneLayout {
    fn plans(&self, remote_root: &str) -> Vec<SetPlan> {
        let mut plans = vec![SetPlan {
            label: self.zones_dir.clone(),
            remote_dir: remote_join(remote_root, &self.zones_dir),
            repo_dir: PathBuf::from(&self.zones_dir),
            prefix: Some(self.zone_prefix.clone()),
        }];
        let private_remote = remote_join(remote_root, &self.private_dir);
        for (label, remote) in &self.groups {
            plans.push(SetPlan {
                label: label.clone(),
                remote_dir: remote_join(&private_remote, remote),
                repo_dir: Path::new(&self.private_dir).join(label),
                prefix: None,
            });
        }
        plans
    }
}

fn remote_join(dir: &str, name: &str) -> String {
    if dir.is_empty() || dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// BIND driver.
#[derive(Debug, Clone)]
pub struct BindDnsDriver {
    platform: PlatformDefinition,
    layout: ZoneLayout,
}

impl BindDnsDriver {
    pub fn new(platform: PlatformDefinition, layout: ZoneLayout) -> Self {
        Self { platform, layout }
    }
}

impl Default for BindDnsDriver {
    fn default() -> Self {
        Self::new(platform(), ZoneLayout::default())
    }
}

impl DeviceDriver for BindDnsDriver {
    fn platform(&self) -> &PlatformDefinition {
        &self.platform
    }

    async fn retrieve<S: Session>(
        &self,
        session: &mut S,
        ctx: &RetrieveContext<'_>,
    ) -> Result<Snapshot> {
        let root = self.platform.remote_dir.as_str();
        let plans = self.layout.plans(root);

        // List everything first: a listing failure aborts before any download.
        let mut listed = Vec::with_capacity(plans.len());
        for plan in plans {
            let names: BTreeSet<String> = session
                .list_dir(&plan.remote_dir)
                .await?
                .into_iter()
                .filter(|name| plan.prefix.as_deref().is_none_or(|p| name.starts_with(p)))
                .collect();
            debug!(
                "{}: {} files in {}",
                ctx.hostname,
                names.len(),
                plan.remote_dir
            );
            listed.push((plan, names));
        }

        let primary_path = ctx.staging_dir.join(&self.layout.primary);
        session
            .copy_down(&remote_join(root, &self.layout.primary), &primary_path)
            .await?;

        let mut sets = Vec::with_capacity(listed.len());
        for (plan, names) in listed {
            let staged_dir = ctx.staging_dir.join(&plan.repo_dir);
            fs::create_dir_all(&staged_dir).map_err(|source| DriverError::Staging {
                path: staged_dir.clone(),
                source,
            })?;
            for name in &names {
                session
                    .copy_down(&remote_join(&plan.remote_dir, name), &staged_dir.join(name))
                    .await?;
            }
            info!(
                "{}: staged {} files of {}",
                ctx.hostname,
                names.len(),
                plan.label
            );
            sets.push(ZoneSet {
                archive_dir: plan.repo_dir.join(&self.layout.archive_dir),
                label: plan.label,
                staged_dir,
                repo_dir: plan.repo_dir,
                prefix: plan.prefix,
                names,
            });
        }

        Ok(Snapshot::Zoned(ZoneSnapshot {
            primary: Artifact {
                name: self.layout.primary.clone(),
                path: primary_path,
                version: None,
            },
            sets,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_plans() {
        let plans = ZoneLayout::default().plans("/var/named/");
        assert_eq!(plans.len(), 3);

        assert_eq!(plans[0].remote_dir, "/var/named/zones");
        assert_eq!(plans[0].repo_dir, PathBuf::from("zones"));
        assert_eq!(plans[0].prefix.as_deref(), Some("zone."));

        assert_eq!(plans[1].label, "Priv1");
        assert_eq!(plans[1].remote_dir, "/var/named/zones/private/priv1");
        assert_eq!(plans[1].repo_dir, PathBuf::from("zones/private/Priv1"));
        assert_eq!(plans[1].prefix, None);

        assert_eq!(plans[2].remote_dir, "/var/named/zones/private/priv2");
    }

    #[test]
    fn test_layout_from_toml() {
        let layout: ZoneLayout = toml::from_str(
            r#"
            zone_prefix = "db."
            [groups]
            Internal = "internal"
            "#,
        )
        .unwrap();
        assert_eq!(layout.primary, "named.conf");
        assert_eq!(layout.zone_prefix, "db.");
        assert_eq!(layout.groups.len(), 1);
    }

    #[test]
    fn test_no_ignore_rule() {
        assert!(!platform().ignore.is_ignored("; serial 2026101801"));
    }
}
