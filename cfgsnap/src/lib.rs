//! # cfgsnap
//!
//! Configuration snapshots of network devices over SSH, reconciled into a
//! per-host repository tree.
//!
//! Each run connects to every device in the inventory, drives the family's
//! CLI to produce a configuration file, downloads it, and compares it with
//! the last stored copy. Only real changes replace the stored copy; lines
//! the family marks as noise (timestamps, comment banners) are ignored.
//!
//! ## Features
//!
//! - Async SSH via russh, file transfer via russh-sftp
//! - Prompt-driven interaction engine (tail search over ANSI-stripped output)
//! - Cisco switch, Cisco vEPC, Ericsson EPG, Ericsson MK and BIND drivers
//! - Atomic, per-artifact repository updates with an error log per host
//! - License expiry sweep for license-bearing families
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use cfgsnap::{Orchestrator, RunConfig, SshConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cfgsnap::Error> {
//!     let config = RunConfig::load(Path::new("cfgsnap.toml"))?;
//!     let credentials = config.resolve_credentials()?;
//!     let orchestrator = Orchestrator::from_config(SshConnector, &config, credentials)?;
//!
//!     let summary = orchestrator.run().await;
//!     println!("{} reconciled, {} failed", summary.reconciled(), summary.failed());
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod inventory;
pub mod naming;
pub mod notify;
pub mod orchestrator;
pub mod platform;
pub mod reconcile;
pub mod repository;
pub mod transport;

// Re-export main types for convenience
pub use config::RunConfig;
pub use driver::{DeviceDriver, Retrieval, Snapshot};
pub use error::{Error, FailureKind, Result};
pub use inventory::{DeviceDescriptor, Inventory};
pub use orchestrator::{Orchestrator, RunSummary};
pub use platform::{DeviceFamily, PlatformDefinition, PlatformRegistry};
pub use reconcile::Outcome;
pub use repository::Repository;
pub use transport::{AuthMethod, SshConfig, SshConnector};
