//! Always-deny command blacklist: catastrophic commands with no legitimate
//! use case, checked independently of (and before) the allowlist. Matches
//! the whole command set in one `RegexSet` pass, case-insensitively, since
//! weird casing like `RM -RF /` is itself a signal of injected text.

use regex::RegexSet;

/// `(regex, human-readable reason)` pairs. Each pattern has no legitimate
/// assistant use case; matching one is a terminal deny regardless of the
/// command allowlist.
pub const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    (
        r"(?i)\brm\s+(?:-[^\s]*r[^\s]*f[^\s]*|-[^\s]*f[^\s]*r[^\s]*|--recursive\s+--force|--force\s+--recursive)\s+(?:--\s+)?/(?:\s|$)",
        "attempting to delete the root filesystem",
    ),
    (
        r"(?i)\brm\s+(?:-[^\s]*r[^\s]*|--recursive)\s+(?:--\s+)?(?:~|\$HOME|\$\{HOME\})(?:\s|$|/)",
        "attempting to delete the home directory",
    ),
    (r":\(\)\s*\{\s*:\|:&\s*\}\s*;:", "fork bomb"),
    (
        r"(?i)dd\s+.*of=/dev/(?:sd|hd|nvme|vd|xvd|loop)\w*",
        "attempting to overwrite a disk device",
    ),
    (
        r"(?i)mkfs(?:\.\w+)?\s+/dev/(?:sd|hd|nvme|vd|xvd)\w*",
        "attempting to format a disk device",
    ),
    (
        r"(?i)chmod\s+-R\s+\d+\s+/(?:\s|$)",
        "recursive permission change on the root filesystem",
    ),
    (
        r"(?i)mkfifo\s+.*\|\s*/bin/(?:ba)?sh",
        "reverse-shell named-pipe pattern",
    ),
];

#[derive(Debug, Clone)]
pub struct CommandBlacklist {
    regex_set: RegexSet,
    reasons: Vec<&'static str>,
}

impl CommandBlacklist {
    /// # Panics
    /// Panics if `DEFAULT_PATTERNS` contains an invalid regex; these are
    /// compile-time constants, so this can only fail during development.
    #[must_use]
    pub fn with_defaults() -> Self {
        let patterns: Vec<&str> = DEFAULT_PATTERNS.iter().map(|(p, _)| *p).collect();
        let reasons: Vec<&'static str> = DEFAULT_PATTERNS.iter().map(|(_, r)| *r).collect();
        Self {
            regex_set: RegexSet::new(patterns).expect("DEFAULT_PATTERNS must all be valid regex"),
            reasons,
        }
    }

    /// Returns the human-readable reason for the first matching pattern, if
    /// any.
    #[must_use]
    pub fn check(&self, command: &str) -> Option<&'static str> {
        self.regex_set
            .matches(command)
            .into_iter()
            .next()
            .map(|index| self.reasons[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_root_wipe() {
        let blacklist = CommandBlacklist::with_defaults();
        assert!(blacklist.check("rm -rf /").is_some());
        assert!(blacklist.check("RM -RF /").is_some());
    }

    #[test]
    fn blocks_fork_bomb() {
        let blacklist = CommandBlacklist::with_defaults();
        assert!(blacklist.check(":(){ :|:& };:").is_some());
    }

    #[test]
    fn allows_benign_command() {
        let blacklist = CommandBlacklist::with_defaults();
        assert!(blacklist.check("rm -rf ./build").is_none());
        assert!(blacklist.check("ls -la /workspace").is_none());
    }
}
