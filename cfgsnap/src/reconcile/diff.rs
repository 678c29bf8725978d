//! Filtered textual comparison.

use log::debug;
use regex::Regex;

#[derive(Debug, Clone)]
enum LineMatcher {
    Contains(String),
    Pattern(Regex),
}

impl LineMatcher {
    fn matches(&self, line: &str) -> bool {
        match self {
            LineMatcher::Contains(needle) => line.contains(needle.as_str()),
            LineMatcher::Pattern(re) => re.is_match(line),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            LineMatcher::Contains(needle) => needle,
            LineMatcher::Pattern(re) => re.as_str(),
        }
    }
}

/// Lines matching any of these matchers are left out of a comparison.
///
/// Typical use is volatile content that changes on every save without being
/// a configuration change: password hashes, generation timestamps, comments.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRule {
    matchers: Vec<LineMatcher>,
}

impl IgnoreRule {
    /// Build a rule from regex strings.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let matchers = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()).map(LineMatcher::Pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { matchers })
    }

    /// Build a rule ignoring lines that contain any of `needles` literally.
    pub fn containing<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            matchers: needles
                .into_iter()
                .map(|n| LineMatcher::Contains(n.into()))
                .collect(),
        }
    }

    /// A rule that ignores nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// The source needles and patterns, in order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.matchers.iter().map(LineMatcher::as_str)
    }

    /// Whether `line` is excluded from comparison.
    pub fn is_ignored(&self, line: &str) -> bool {
        self.matchers.iter().any(|m| m.matches(line))
    }

    /// `text` with every ignored line removed.
    pub fn filter(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for line in text.lines().filter(|line| !self.is_ignored(line)) {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Whether `new` and `old` are the same once ignored lines are removed.
    ///
    /// Line endings are normalised, so a file re-saved with `\r\n` compares
    /// equal to its `\n` twin.
    pub fn equivalent(&self, new: &str, old: &str) -> bool {
        let new = self.filter(new);
        let old = self.filter(old);
        if new == old {
            return true;
        }
        if log::log_enabled!(log::Level::Debug) {
            let patch = diffy::create_patch(&old, &new);
            debug!("filtered diff:\n{}", patch);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_compares_everything() {
        let rule = IgnoreRule::none();
        assert!(rule.equivalent("a\nb\n", "a\nb\n"));
        assert!(!rule.equivalent("a\nb\n", "a\nc\n"));
    }

    #[test]
    fn test_ignored_lines_do_not_count() {
        let rule = IgnoreRule::containing(["+", "!"]);
        let old = "hostname SW1\n username admin secret 5 +abc\n! generated Mon\n";
        let new = "hostname SW1\n username admin secret 5 +xyz\n! generated Tue\n";
        assert!(rule.equivalent(new, old));
    }

    #[test]
    fn test_changes_outside_ignored_lines_count() {
        let rule = IgnoreRule::new(["^! Last configuration change"]).unwrap();
        let old = "! Last configuration change at 10:00\nvlan 10\n";
        let new = "! Last configuration change at 11:00\nvlan 20\n";
        assert!(!rule.equivalent(new, old));
    }

    #[test]
    fn test_line_endings_are_normalised() {
        let rule = IgnoreRule::none();
        assert!(rule.equivalent("a\r\nb\r\n", "a\nb\n"));
        assert!(rule.equivalent("a\nb", "a\nb\n"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(IgnoreRule::new(["("]).is_err());
    }

    #[test]
    fn test_patterns_round_trip() {
        let rule = IgnoreRule::new(["#", r"\+"]).unwrap();
        assert_eq!(rule.patterns().collect::<Vec<_>>(), vec!["#", r"\+"]);
    }
}
