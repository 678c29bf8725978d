//! Prompt patterns and their logical roles.

use std::fmt;

use regex::bytes::Regex;

/// What a matched prompt means to a driver's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptRole {
    /// Logged in without privileges (e.g. `SW1>`).
    Unprivileged,
    /// Privileged exec (e.g. `SW1#`, `[local]EPG1#`).
    Privileged,
    /// Password prompt during escalation.
    Password,
    /// A yes/no or `[confirm]` question.
    Confirmation,
    /// A Unix shell reached from the device CLI.
    Shell,
    /// Configuration mode.
    Config,
}

impl PromptRole {
    /// Stable lowercase name, used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptRole::Unprivileged => "unprivileged",
            PromptRole::Privileged => "privileged",
            PromptRole::Password => "password",
            PromptRole::Confirmation => "confirmation",
            PromptRole::Shell => "shell",
            PromptRole::Config => "config",
        }
    }
}

impl fmt::Display for PromptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled prompt pattern with its role and optional negative matches.
#[derive(Debug, Clone)]
pub struct PromptPattern {
    role: PromptRole,

    /// The main pattern to match.
    pattern: Regex,

    /// Strings that must NOT appear in the matched text.
    /// Used for disambiguation (e.g. `#` matches both privileged and config).
    not_contains: Vec<String>,
}

impl PromptPattern {
    /// Create a prompt pattern from a regex string.
    pub fn new(role: PromptRole, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            role,
            pattern: Regex::new(pattern)?,
            not_contains: Vec::new(),
        })
    }

    /// Add a not_contains string.
    pub fn with_not_contains(mut self, text: impl Into<String>) -> Self {
        self.not_contains.push(text.into());
        self
    }

    /// The role of this prompt.
    pub fn role(&self) -> PromptRole {
        self.role
    }

    /// Get a reference to the underlying regex.
    pub fn regex(&self) -> &Regex {
        &self.pattern
    }

    /// Find this prompt in `data`, returning `(start, end)` of the match.
    pub fn find(&self, data: &[u8]) -> Option<(usize, usize)> {
        let m = self.pattern.find(data)?;
        let matched = String::from_utf8_lossy(m.as_bytes());
        if self.not_contains.iter().any(|nc| matched.contains(nc.as_str())) {
            return None;
        }
        Some((m.start(), m.end()))
    }

    /// Check if the data matches the pattern.
    pub fn is_match(&self, data: &[u8]) -> bool {
        self.find(data).is_some()
    }
}

/// Build a line-anchored prompt regex for a literal prompt text.
///
/// `hostname` is escaped; `suffix` is a regex fragment such as `[>#]`.
/// The prompt must start a line and may be followed only by whitespace.
pub fn host_prompt(prefix: &str, hostname: &str, suffix: &str) -> String {
    format!(r"(?m)^{}{}{}\s*\z", prefix, regex::escape(hostname), suffix)
}

/// Pick the first pattern (in caller order) found in `data`.
///
/// Returns the index into `patterns` and the match span.
pub fn first_match(patterns: &[&PromptPattern], data: &[u8]) -> Option<(usize, (usize, usize))> {
    patterns
        .iter()
        .enumerate()
        .find_map(|(idx, p)| p.find(data).map(|span| (idx, span)))
}
