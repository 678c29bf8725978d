//! Run configuration loading.
//!
//! One TOML file describes a run: where the repository and staging area
//! are, the hosts of each family, which credentials they use and any
//! per-family overrides.
//!
//! ```toml
//! repository = "/srv/config-backup"
//! staging = "/var/tmp/cfgsnap"
//! workers = 4
//!
//! [credentials.default]
//! username = "kubebot"
//! password_env = "CFGSNAP_PASSWORD"
//!
//! [families.cisco_switch]
//! credentials = "default"
//! hosts = { SWITCH_1 = "192.168.0.10", SWITCH_2 = "192.168.0.12" }
//!
//! [families.bind_dns]
//! credentials = "default"
//! hosts = { DNS = { address = "192.168.0.240", port = 2222 } }
//! ```
//!
//! Passwords are never stored in the file itself: each credentials entry
//! names an environment variable or a file to read the secret from.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use log::debug;
use secrecy::SecretString;
use serde::Deserialize;

use crate::driver::LicensePolicy;
use crate::error::ConfigError;
use crate::inventory::{DeviceDescriptor, Inventory};
use crate::platform::vendors::bind_dns::ZoneLayout;
use crate::platform::{AnyDriver, DeviceFamily, PlatformRegistry, vendors};
use crate::reconcile::IgnoreRule;
use crate::transport::HostKeyVerification;

/// The config file name looked for when none is given.
pub const CONFIG_FILE_NAME: &str = "cfgsnap.toml";

/// Top-level configuration from cfgsnap.toml.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Repository working tree, one directory per host.
    pub repository: PathBuf,

    /// Scratch area for retrieved files and license texts.
    pub staging: PathBuf,

    /// Hosts processed concurrently.
    pub workers: usize,

    /// known_hosts file; `~/.ssh/known_hosts` when unset.
    pub known_hosts: Option<PathBuf>,

    /// Host key policy.
    pub host_key_verification: HostKeyVerification,

    /// License expiry reporting.
    pub license: LicenseConfig,

    /// DNS zone layout.
    pub dns: ZoneLayout,

    /// Named credentials.
    pub credentials: IndexMap<String, CredentialsConfig>,

    /// Hosts and overrides per family name.
    pub families: IndexMap<String, FamilyConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            repository: PathBuf::from("repository"),
            staging: std::env::temp_dir().join("cfgsnap"),
            workers: 4,
            known_hosts: None,
            host_key_verification: HostKeyVerification::default(),
            license: LicenseConfig::default(),
            dns: ZoneLayout::default(),
            credentials: IndexMap::new(),
            families: IndexMap::new(),
        }
    }
}

/// License section of the config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Report licenses expiring within this many days.
    pub warn_days: i64,

    /// Extension of saved license texts.
    pub extension: String,

    /// Name of the notification-body fragment.
    pub fragment: String,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        let policy = LicensePolicy::default();
        Self {
            warn_days: policy.warn_days,
            extension: policy.extension,
            fragment: policy.fragment,
        }
    }
}

/// Where to find one login.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    pub username: String,

    /// Environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,

    /// File holding the password (trailing newline stripped).
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

/// A resolved login.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Arc<SecretString>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One family's hosts and overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FamilyConfig {
    /// Credentials used by hosts that do not name their own.
    pub credentials: Option<String>,

    /// Per-operation timeout override, in seconds.
    pub timeout_secs: Option<u64>,

    /// Ignore-rule override: regexes of lines to leave out of comparisons.
    pub ignore: Option<Vec<String>>,

    /// Remote directory override.
    pub remote_dir: Option<String>,

    /// Default SSH port for this family.
    pub port: Option<u16>,

    /// Hostname to address (or detailed entry).
    pub hosts: IndexMap<String, HostEntry>,
}

/// A host, either just its address or a detailed table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HostEntry {
    Address(String),
    Detailed {
        address: String,
        #[serde(default)]
        port: Option<u16>,
        #[serde(default)]
        credentials: Option<String>,
    },
}

/// Find the config file: `explicit` if given, else `cfgsnap.toml` in the
/// current directory.
pub fn discover_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let path = PathBuf::from(CONFIG_FILE_NAME);
    if path.exists() {
        debug!("found config file at {}", path.display());
        Some(path)
    } else {
        debug!("no config file found at {}", path.display());
        None
    }
}

impl RunConfig {
    /// Load, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    /// Parse and validate config text. `path` is only used in errors.
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without touching the network
    /// or the secret sources.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(invalid("workers must be at least 1"));
        }
        if self.license.warn_days < 0 {
            return Err(invalid("license.warn_days must not be negative"));
        }
        for (name, creds) in &self.credentials {
            if creds.password_env.is_some() == creds.password_file.is_some() {
                return Err(invalid(format!(
                    "credentials '{name}' needs exactly one of password_env or password_file"
                )));
            }
        }
        for (name, family) in &self.families {
            let parsed = family_from_name(name)?;
            if let Some(ignore) = &family.ignore {
                IgnoreRule::new(ignore).map_err(|e| {
                    invalid(format!("families.{name}.ignore: {e}"))
                })?;
            }
            if family.timeout_secs == Some(0) {
                return Err(invalid(format!("families.{name}.timeout_secs must be positive")));
            }
            for (hostname, entry) in &family.hosts {
                let credentials = entry
                    .credentials()
                    .or(family.credentials.as_deref())
                    .ok_or_else(|| {
                        invalid(format!("host {hostname} ({parsed}) has no credentials"))
                    })?;
                if !self.credentials.contains_key(credentials) {
                    return Err(ConfigError::UnknownCredentials {
                        name: credentials.to_string(),
                        referenced_by: hostname.clone(),
                    });
                }
            }
        }
        self.inventory().map(|_| ())
    }

    /// All configured devices.
    pub fn inventory(&self) -> Result<Inventory, ConfigError> {
        let mut devices = Vec::new();
        for (name, family_config) in &self.families {
            let family = family_from_name(name)?;
            for (hostname, entry) in &family_config.hosts {
                let credentials = entry
                    .credentials()
                    .or(family_config.credentials.as_deref())
                    .unwrap_or_default()
                    .to_string();
                devices.push(DeviceDescriptor {
                    hostname: hostname.clone(),
                    address: entry.address().to_string(),
                    port: entry.port().or(family_config.port).unwrap_or(22),
                    family,
                    credentials,
                });
            }
        }
        Inventory::new(devices)
    }

    /// Drivers with this config's overrides applied.
    pub fn registry(&self) -> Result<PlatformRegistry, ConfigError> {
        let mut registry = PlatformRegistry::builtin();
        for family in DeviceFamily::ALL {
            let mut platform = vendors::platform(family);
            if let Some(overrides) = self.families.get(family.as_str()) {
                if let Some(secs) = overrides.timeout_secs {
                    platform.timeout = Duration::from_secs(secs);
                }
                if let Some(ignore) = &overrides.ignore {
                    platform.ignore = IgnoreRule::new(ignore).map_err(|e| {
                        invalid(format!("families.{family}.ignore: {e}"))
                    })?;
                }
                if let Some(dir) = &overrides.remote_dir {
                    platform.remote_dir = dir.clone();
                }
            }
            registry.register(AnyDriver::new(platform, &self.dns));
        }
        Ok(registry)
    }

    /// License policy from the `[license]` section.
    pub fn license_policy(&self) -> LicensePolicy {
        LicensePolicy {
            warn_days: self.license.warn_days,
            extension: self.license.extension.clone(),
            fragment: self.license.fragment.clone(),
        }
    }

    /// Load every credentials entry from its secret source.
    pub fn resolve_credentials(&self) -> Result<IndexMap<String, Credentials>, ConfigError> {
        self.resolve_credentials_with(|var| std::env::var(var).ok())
    }

    /// [`resolve_credentials`](Self::resolve_credentials) with an explicit
    /// environment lookup.
    pub fn resolve_credentials_with<F>(
        &self,
        env: F,
    ) -> Result<IndexMap<String, Credentials>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut resolved = IndexMap::new();
        for (name, creds) in &self.credentials {
            let secret_error = |message: String| ConfigError::Secret {
                name: name.clone(),
                message,
            };
            let password = match (&creds.password_env, &creds.password_file) {
                (Some(var), _) => env(var)
                    .ok_or_else(|| secret_error(format!("environment variable {var} is not set")))?,
                (None, Some(path)) => fs::read_to_string(path)
                    .map(|s| s.trim_end_matches(['\r', '\n']).to_string())
                    .map_err(|e| secret_error(format!("{}: {e}", path.display())))?,
                (None, None) => return Err(secret_error("no secret source".to_string())),
            };
            resolved.insert(
                name.clone(),
                Credentials {
                    username: creds.username.clone(),
                    password: Arc::new(SecretString::from(password)),
                },
            );
        }
        Ok(resolved)
    }
}

impl HostEntry {
    pub fn address(&self) -> &str {
        match self {
            HostEntry::Address(address) => address,
            HostEntry::Detailed { address, .. } => address,
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            HostEntry::Address(_) => None,
            HostEntry::Detailed { port, .. } => *port,
        }
    }

    pub fn credentials(&self) -> Option<&str> {
        match self {
            HostEntry::Address(_) => None,
            HostEntry::Detailed { credentials, .. } => credentials.as_deref(),
        }
    }
}

fn family_from_name(name: &str) -> Result<DeviceFamily, ConfigError> {
    name.parse()
        .map_err(|_| invalid(format!("unknown device family '{name}'")))
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}
