//! Whole-run driver: every host through fetch and reconcile, then the
//! license sweep, then the repository hook.
//!
//! Hosts run concurrently on spawned tasks, bounded by a semaphore. Each
//! task owns its host from connect to staging cleanup, so a failure stays
//! on its host. A host whose task dies without a report is recorded as
//! failed. [`Orchestrator::run_until`] aborts and drains the tasks when
//! its stop future completes; their session guards abort the open sessions.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::pin::{Pin, pin};
use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::StreamExt;
use futures_util::stream;
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{Credentials, RunConfig};
use crate::driver::license::clear_temporary_files;
use crate::driver::{
    self, DeviceDriver, LicenseContext, LicensePolicy, LicenseStatus, RetrieveContext, Retrieval,
};
use crate::error::{ConfigError, Error, FailureKind};
use crate::inventory::{DeviceDescriptor, Inventory};
use crate::notify::{LicenseNotice, LogNotifier, LogSync, NotificationSink, RepositorySync};
use crate::platform::{AnyDriver, DeviceFamily, PlatformRegistry};
use crate::reconcile::{ArtifactReport, ArtifactStatus, Outcome};
use crate::repository::Repository;
use crate::transport::{AuthMethod, Connector, HostKeyVerification, SshConfig};

/// What happened to one host.
#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub hostname: String,
    pub family: DeviceFamily,
    #[serde(flatten)]
    pub status: HostStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HostStatus {
    /// Retrieved and reconciled. Individual artifacts may still have failed.
    Reconciled { artifacts: Vec<ArtifactReport> },
    /// Retrieval or repository preparation failed.
    Failed { kind: FailureKind, message: String },
    /// Not attempted.
    Skipped { reason: String },
}

/// License sweep result of one host.
#[derive(Debug, Clone, Serialize)]
pub struct LicenseReport {
    pub hostname: String,
    #[serde(flatten)]
    pub status: LicenseOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LicenseOutcome {
    Checked(LicenseStatus),
    Failed { kind: FailureKind, message: String },
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// In inventory order.
    pub hosts: Vec<HostReport>,
    pub licenses: Vec<LicenseReport>,
}

impl RunSummary {
    pub fn reconciled(&self) -> usize {
        self.hosts
            .iter()
            .filter(|h| matches!(h.status, HostStatus::Reconciled { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.hosts
            .iter()
            .filter(|h| matches!(h.status, HostStatus::Failed { .. }))
            .count()
    }

    pub fn host(&self, hostname: &str) -> Option<&HostReport> {
        self.hosts.iter().find(|h| h.hostname == hostname)
    }

    /// Hosts whose repository directory was written to: a non-unchanged
    /// outcome, a failed artifact, or an error log entry from the backup or
    /// the license sweep.
    pub fn touched_hosts(&self) -> Vec<String> {
        let mut touched: Vec<String> = self
            .hosts
            .iter()
            .filter(|h| match &h.status {
                HostStatus::Reconciled { artifacts } => artifacts
                    .iter()
                    .any(|a| a.outcome() != Some(Outcome::Unchanged)),
                HostStatus::Failed { .. } => true,
                HostStatus::Skipped { .. } => false,
            })
            .map(|h| h.hostname.clone())
            .collect();
        for report in &self.licenses {
            if matches!(report.status, LicenseOutcome::Failed { .. })
                && !touched.contains(&report.hostname)
            {
                touched.push(report.hostname.clone());
            }
        }
        touched
    }

    /// Devices whose license is inside the warning window.
    pub fn license_notices(&self) -> Vec<LicenseNotice> {
        self.licenses
            .iter()
            .filter_map(|report| match &report.status {
                LicenseOutcome::Checked(LicenseStatus::Expiring {
                    expires,
                    days_remaining,
                    artifact,
                }) => Some(LicenseNotice {
                    hostname: report.hostname.clone(),
                    expires: *expires,
                    days_remaining: *days_remaining,
                    artifact: artifact.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

/// State shared by every host task.
struct Shared<C> {
    connector: C,
    repository: Repository,
    staging: PathBuf,
}

/// Everything needed to process one host.
struct HostJob {
    device: DeviceDescriptor,
    driver: Arc<AnyDriver>,
    credentials: Credentials,
    ssh: SshConfig,
}

impl HostJob {
    fn context<'a>(&'a self, staging_dir: &'a Path) -> RetrieveContext<'a> {
        RetrieveContext {
            hostname: &self.device.hostname,
            username: &self.credentials.username,
            password: &self.credentials.password,
            staging_dir,
        }
    }
}

/// Runs the inventory.
pub struct Orchestrator<C: Connector> {
    shared: Arc<Shared<C>>,
    inventory: Inventory,
    registry: PlatformRegistry,
    credentials: IndexMap<String, Credentials>,
    workers: usize,
    known_hosts: Option<PathBuf>,
    host_key_verification: HostKeyVerification,
    license: Option<LicensePolicy>,
    today: Option<NaiveDate>,
    sync: Arc<dyn RepositorySync>,
    notifier: Arc<dyn NotificationSink>,
}

impl<C: Connector + 'static> Orchestrator<C> {
    /// An orchestrator with four workers, the license sweep disabled and
    /// logging-only hooks.
    pub fn new(
        connector: C,
        inventory: Inventory,
        registry: PlatformRegistry,
        credentials: IndexMap<String, Credentials>,
        repository: Repository,
        staging: impl Into<PathBuf>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector,
                repository,
                staging: staging.into(),
            }),
            inventory,
            registry,
            credentials,
            workers: 4,
            known_hosts: None,
            host_key_verification: HostKeyVerification::default(),
            license: None,
            today: None,
            sync: Arc::new(LogSync),
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Everything from a loaded config, with the license sweep enabled.
    pub fn from_config(
        connector: C,
        config: &RunConfig,
        credentials: IndexMap<String, Credentials>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            connector,
            config.inventory()?,
            config.registry()?,
            credentials,
            Repository::new(&config.repository),
            &config.staging,
        )
        .with_workers(config.workers)
        .with_host_keys(config.host_key_verification, config.known_hosts.clone())
        .with_license_policy(Some(config.license_policy())))
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_host_keys(
        mut self,
        verification: HostKeyVerification,
        known_hosts: Option<PathBuf>,
    ) -> Self {
        self.host_key_verification = verification;
        self.known_hosts = known_hosts;
        self
    }

    /// Enable (`Some`) or disable the license sweep.
    pub fn with_license_policy(mut self, policy: Option<LicensePolicy>) -> Self {
        self.license = policy;
        self
    }

    /// Evaluate licenses against `today` instead of the local date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn with_sync(mut self, sync: Arc<dyn RepositorySync>) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }

    /// Process every host, sweep licenses, then commit.
    pub async fn run(&self) -> RunSummary {
        self.run_until(std::future::pending())
            .await
            .unwrap_or_default()
    }

    /// [`run`](Self::run), abandoned once `stop` completes.
    ///
    /// A stopped run aborts the host tasks and waits for them to finish, so
    /// every open session has been aborted when this returns `None`. The
    /// commit hook only runs for a complete run.
    pub async fn run_until<F>(&self, stop: F) -> Option<RunSummary>
    where
        F: Future<Output = ()>,
    {
        let mut stop = pin!(stop);
        info!(
            "backing up {} hosts with {} workers",
            self.inventory.len(),
            self.workers
        );
        let hosts = self.run_hosts(stop.as_mut()).await?;
        let mut summary = RunSummary {
            hosts,
            licenses: Vec::new(),
        };
        info!(
            "{} hosts reconciled, {} failed",
            summary.reconciled(),
            summary.failed()
        );

        if let Some(policy) = &self.license {
            summary.licenses = tokio::select! {
                licenses = self.sweep_licenses(policy) => licenses,
                () = stop.as_mut() => {
                    warn!("stopped during the license sweep");
                    return None;
                }
            };
            self.publish_licenses(&summary, policy);
        }

        let touched = summary.touched_hosts();
        if let Err(e) = self.sync.commit(self.shared.repository.root(), &touched) {
            warn!("repository commit hook failed: {}", e);
        }
        Some(summary)
    }

    /// Driver, credentials and SSH settings of `device`, or why it cannot
    /// be processed.
    fn prepare(&self, device: &DeviceDescriptor) -> Result<HostJob, String> {
        let driver = self
            .registry
            .get(device.family)
            .ok_or_else(|| format!("no driver for family {}", device.family))?;
        let credentials = self
            .credentials
            .get(&device.credentials)
            .cloned()
            .ok_or_else(|| format!("credentials '{}' not loaded", device.credentials))?;

        let mut ssh = SshConfig::new(
            device.address.clone(),
            credentials.username.clone(),
            AuthMethod::Password(Arc::clone(&credentials.password)),
        );
        ssh.port = device.port;
        ssh.timeout = driver.platform().timeout;
        ssh.host_key_verification = self.host_key_verification;
        ssh.known_hosts_path = self.known_hosts.clone();

        Ok(HostJob {
            device: device.clone(),
            driver,
            credentials,
            ssh,
        })
    }

    /// One report per inventory entry, in inventory order, or `None` if
    /// `stop` completed first.
    async fn run_hosts<F>(&self, mut stop: Pin<&mut F>) -> Option<Vec<HostReport>>
    where
        F: Future<Output = ()>,
    {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut slots: Vec<Option<HostReport>> = vec![None; self.inventory.len()];

        for (index, device) in self.inventory.iter().enumerate() {
            let job = match self.prepare(device) {
                Ok(job) => job,
                Err(reason) => {
                    slots[index] = Some(skipped(device.clone(), &reason));
                    continue;
                }
            };
            let shared = Arc::clone(&self.shared);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, skipped(job.device, "worker pool closed"));
                };
                (index, process_host(shared, job).await)
            });
        }

        loop {
            let joined = tokio::select! {
                joined = tasks.join_next() => joined,
                () = stop.as_mut() => {
                    warn!("stopped, aborting {} host tasks", tasks.len());
                    tasks.shutdown().await;
                    return None;
                }
            };
            match joined {
                Some(Ok((index, report))) => slots[index] = Some(report),
                Some(Err(e)) => warn!("host task failed: {}", e),
                None => break,
            }
        }

        let reports = self
            .inventory
            .iter()
            .zip(slots)
            .map(|(device, slot)| slot.unwrap_or_else(|| lost(&self.shared.repository, device)))
            .collect();
        Some(reports)
    }

    async fn sweep_licenses(&self, policy: &LicensePolicy) -> Vec<LicenseReport> {
        let shared = &*self.shared;
        if let Err(e) = fs::create_dir_all(&shared.staging) {
            warn!(
                "cannot create staging directory {}: {}",
                shared.staging.display(),
                e
            );
        }
        let today = self
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let license = LicenseContext {
            today,
            staging_root: &shared.staging,
            policy,
        };

        let jobs: Vec<HostJob> = self
            .inventory
            .iter()
            .filter_map(|device| match self.prepare(device) {
                Ok(job) => job.driver.has_license().then_some(job),
                Err(reason) => {
                    debug!("{}: license check skipped: {}", device.hostname, reason);
                    None
                }
            })
            .collect();
        debug!("checking licenses of {} hosts", jobs.len());

        stream::iter(&jobs)
            .map(|job| check_license(shared, job, &license))
            .buffered(self.workers)
            .collect()
            .await
    }

    fn publish_licenses(&self, summary: &RunSummary, policy: &LicensePolicy) {
        let notices = summary.license_notices();
        if !notices.is_empty() {
            let fragment = self.shared.staging.join(&policy.fragment);
            if let Err(e) = self.notifier.notify(&notices, &fragment) {
                warn!("license notification failed: {}", e);
            }
        }
        match clear_temporary_files(&self.shared.staging, policy) {
            Ok(removed) => debug!("removed {} temporary license files", removed),
            Err(e) => warn!("could not clear temporary license files: {}", e),
        }
    }
}

/// Fetch, reconcile and clean up one host.
async fn process_host<C: Connector>(shared: Arc<Shared<C>>, job: HostJob) -> HostReport {
    let staging_dir = shared.staging.join(&job.device.hostname);
    let ctx = job.context(&staging_dir);

    info!("{}: retrieving ({})", job.device.hostname, job.device.family);
    let retrieval = driver::fetch(
        &shared.connector,
        &*job.driver,
        &job.ssh,
        &ctx,
        &shared.repository,
    )
    .await;
    let snapshot = match retrieval {
        Retrieval::Snapshot(snapshot) => snapshot,
        Retrieval::Failed { kind, message, .. } => {
            return HostReport {
                hostname: job.device.hostname,
                family: job.device.family,
                status: HostStatus::Failed { kind, message },
            };
        }
    };

    let HostJob { device, driver, .. } = job;
    let repository = shared.repository.clone();
    let hostname = device.hostname.clone();
    let reconciled = tokio::task::spawn_blocking(move || {
        let result = driver.reconcile(&repository, &hostname, &snapshot);
        if let Err(e) = fs::remove_dir_all(&staging_dir) {
            debug!("{}: staging cleanup failed: {}", hostname, e);
        }
        result
    })
    .await;

    let status = match reconciled {
        Ok(Ok(artifacts)) => {
            for report in &artifacts {
                if let ArtifactStatus::Failed { message } = &report.status {
                    let line = format!(
                        "{}: {}: {}",
                        FailureKind::TransferFailure,
                        report.artifact,
                        message
                    );
                    log_failure(&shared.repository, &device.hostname, &line);
                }
            }
            HostStatus::Reconciled { artifacts }
        }
        Ok(Err(e)) => {
            let error = Error::from(e);
            let kind = error.kind().unwrap_or(FailureKind::TransferFailure);
            let message = format!("{kind}: {error}");
            warn!("{}: reconciliation failed: {}", device.hostname, message);
            log_failure(&shared.repository, &device.hostname, &message);
            HostStatus::Failed { kind, message }
        }
        Err(e) => HostStatus::Failed {
            kind: FailureKind::TransferFailure,
            message: format!("reconcile task failed: {e}"),
        },
    };

    HostReport {
        hostname: device.hostname,
        family: device.family,
        status,
    }
}

async fn check_license<C: Connector>(
    shared: &Shared<C>,
    job: &HostJob,
    license: &LicenseContext<'_>,
) -> LicenseReport {
    let ctx = job.context(license.staging_root);
    let hostname = &job.device.hostname;

    let status =
        match driver::fetch_license(&shared.connector, &*job.driver, &job.ssh, &ctx, license).await
        {
            Ok(status) => LicenseOutcome::Checked(status),
            Err(e) => {
                let kind = e.kind().unwrap_or(FailureKind::ConnectionFailure);
                let message = format!("{kind}: license check: {e}");
                warn!("{}: {}", hostname, message);
                log_failure(&shared.repository, hostname, &message);
                LicenseOutcome::Failed { kind, message }
            }
        };
    LicenseReport {
        hostname: hostname.clone(),
        status,
    }
}

fn log_failure(repository: &Repository, hostname: &str, message: &str) {
    if let Err(e) = repository.append_error(hostname, message) {
        warn!("{}: could not write error log: {}", hostname, e);
    }
}

/// Report for a host whose task ended without one (it panicked).
fn lost(repository: &Repository, device: &DeviceDescriptor) -> HostReport {
    let kind = FailureKind::ConnectionFailure;
    let message = format!("{kind}: host task ended without a report");
    log_failure(repository, &device.hostname, &message);
    HostReport {
        hostname: device.hostname.clone(),
        family: device.family,
        status: HostStatus::Failed { kind, message },
    }
}

fn skipped(device: DeviceDescriptor, reason: &str) -> HostReport {
    warn!("{}: skipped: {}", device.hostname, reason);
    HostReport {
        hostname: device.hostname,
        family: device.family,
        status: HostStatus::Skipped {
            reason: reason.to_string(),
        },
    }
}

/// Hostnames of `summary` grouped by status name, for log output.
pub fn status_overview(summary: &RunSummary) -> IndexMap<&'static str, BTreeSet<&str>> {
    let mut overview: IndexMap<&'static str, BTreeSet<&str>> = IndexMap::new();
    for host in &summary.hosts {
        let key = match host.status {
            HostStatus::Reconciled { .. } => "reconciled",
            HostStatus::Failed { .. } => "failed",
            HostStatus::Skipped { .. } => "skipped",
        };
        overview.entry(key).or_default().insert(&host.hostname);
    }
    overview
}
