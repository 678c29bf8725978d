//! Error types for cfgsnap.
//!
//! Errors are layered the same way the code is: transport, channel (prompt
//! interaction), driver, reconciliation and configuration. Every host-scoped
//! error maps onto one of four [`FailureKind`]s, which is what ends up in a
//! host's error log and in the run summary.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Main error type for cfgsnap operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Interactive channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Driver-level errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Repository mutation errors
    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Run configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// The four host-scoped failure kinds.
///
/// All of them are non-fatal to a run: the failing host gets an error log
/// entry and the run moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Authentication, timeout, unreachable host, channel reset.
    ConnectionFailure,
    /// The expected CLI state was never reached.
    PromptTimeout,
    /// A file copy or delete failed.
    TransferFailure,
    /// Version or license text did not have the expected shape.
    ParseFailure,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::ConnectionFailure => "ConnectionFailure",
            FailureKind::PromptTimeout => "PromptTimeout",
            FailureKind::TransferFailure => "TransferFailure",
            FailureKind::ParseFailure => "ParseFailure",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Classify this error into the host-scoped failure taxonomy.
    ///
    /// Configuration errors are not host-scoped and return `None`, as does
    /// an unknown family name.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Error::Transport(TransportError::Transfer { .. }) => Some(FailureKind::TransferFailure),
            Error::Transport(_) => Some(FailureKind::ConnectionFailure),
            Error::Channel(ChannelError::PatternTimeout { .. }) => Some(FailureKind::PromptTimeout),
            Error::Channel(ChannelError::UnexpectedPrompt { .. }) => {
                Some(FailureKind::PromptTimeout)
            }
            Error::Channel(_) => Some(FailureKind::ConnectionFailure),
            Error::Driver(DriverError::Parse { .. }) => Some(FailureKind::ParseFailure),
            Error::Driver(DriverError::CommandFailed { .. }) => Some(FailureKind::PromptTimeout),
            Error::Driver(DriverError::Staging { .. }) => Some(FailureKind::TransferFailure),
            Error::Reconcile(_) => Some(FailureKind::TransferFailure),
            Error::Driver(DriverError::UnknownFamily { .. }) | Error::Config(_) => None,
        }
    }
}

/// Transport layer errors (SSH connection, authentication, SFTP).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host is not in known_hosts and strict checking is on
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Remote command could not be executed
    #[error("Exec of '{command}' failed: {message}")]
    Exec { command: String, message: String },

    /// File copy, listing or delete failed
    #[error("Transfer of '{path}' failed: {message}")]
    Transfer { path: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors (prompt matching, PTY operations).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to open PTY channel
    #[error("Failed to open PTY channel")]
    PtyOpenFailed,

    /// Prompt matching timed out
    #[error("None of [{expected}] seen within {timeout:?}")]
    PatternTimeout { expected: String, timeout: Duration },

    /// A prompt matched, but not one the state machine can continue from
    #[error("Expected prompt '{expected}', got '{got}'")]
    UnexpectedPrompt { expected: String, got: String },

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Driver layer errors (state machines, parsing).
#[derive(Error, Debug)]
pub enum DriverError {
    /// A device command reported a failure in its output
    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    /// Version or license output did not have the expected shape
    #[error("Could not parse {what}: {message}")]
    Parse { what: String, message: String },

    /// Local staging area could not be prepared or written
    #[error("Staging error at {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Unknown device family name
    #[error("Unknown device family '{name}'")]
    UnknownFamily { name: String },
}

impl DriverError {
    /// Build a parse error.
    pub fn parse(what: impl Into<String>, message: impl Into<String>) -> Self {
        DriverError::Parse {
            what: what.into(),
            message: message.into(),
        }
    }
}

/// Repository mutation errors, scoped to one artifact.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Reading an artifact for comparison failed
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Moving an artifact into place failed
    #[error("Failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Removing a discarded staged copy failed
    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Creating or listing a repository directory failed
    #[error("Repository directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Appending to the error sentinel failed
    #[error("Failed to write error log {path}: {source}")]
    ErrorLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Run configuration errors. These are fatal to the whole run.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Config file is not valid TOML for the expected shape
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A hostname appears more than once in the inventory
    #[error("Duplicate hostname '{hostname}' in inventory")]
    DuplicateHost { hostname: String },

    /// A family references credentials that are not defined
    #[error("Unknown credentials '{name}' referenced by {referenced_by}")]
    UnknownCredentials { name: String, referenced_by: String },

    /// A secret could not be loaded from its source
    #[error("Secret for credentials '{name}' unavailable: {message}")]
    Secret { name: String, message: String },

    /// Any other invalid setting
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Result type alias using cfgsnap's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let err: Error = TransportError::Timeout(Duration::from_secs(30)).into();
        assert_eq!(err.kind(), Some(FailureKind::ConnectionFailure));

        let err: Error = TransportError::AuthenticationFailed {
            user: "kubebot".into(),
        }
        .into();
        assert_eq!(err.kind(), Some(FailureKind::ConnectionFailure));

        let err: Error = ChannelError::PatternTimeout {
            expected: "privileged".into(),
            timeout: Duration::from_secs(30),
        }
        .into();
        assert_eq!(err.kind(), Some(FailureKind::PromptTimeout));

        let err: Error = TransportError::Transfer {
            path: "/sftp/x.cfg".into(),
            message: "no such file".into(),
        }
        .into();
        assert_eq!(err.kind(), Some(FailureKind::TransferFailure));

        let err: Error = DriverError::parse("version", "no token").into();
        assert_eq!(err.kind(), Some(FailureKind::ParseFailure));

        let err: Error = ConfigError::Invalid {
            message: "workers = 0".into(),
        }
        .into();
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::PromptTimeout.to_string(), "PromptTimeout");
        assert_eq!(FailureKind::ParseFailure.to_string(), "ParseFailure");
    }
}
