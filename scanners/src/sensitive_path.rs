//! Sensitive-path scanner. Input mode is a plain substring
//! catalog match; output mode is context-aware — a path is only flagged
//! inside a fenced code block, on a standalone path-only line, or as a
//! shell-command argument, not in explanatory prose or YAML config.

use sentinel_types::{Finding, ScanContext, ScanResult, Severity};

use crate::Scanner;

pub const CATALOG: &[&str] = &[
    "/etc/shadow",
    "/etc/passwd",
    "/etc/sudoers",
    "~/.ssh/",
    ".ssh/id_rsa",
    ".ssh/id_ed25519",
    ".pem",
    ".env",
    ".bitcoin/",
    "wallet.dat",
    "/var/log/auth.log",
    "/root/",
    ".kube/config",
];

pub struct SensitivePathScanner;

impl Default for SensitivePathScanner {
    fn default() -> Self {
        Self
    }
}

impl SensitivePathScanner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn scan_input(&self, text: &str) -> Vec<Finding> {
        find_catalog_matches(text)
    }

    fn scan_output(&self, text: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut in_fence = false;
        let mut offset = 0usize;
        for line in text.split_inclusive('\n') {
            let trimmed = line.trim_end_matches('\n');
            let fence_toggle = trimmed.trim_start().starts_with("```");
            if fence_toggle {
                in_fence = !in_fence;
                offset += line.len();
                continue;
            }

            let flaggable = in_fence || is_standalone_path_line(trimmed) || is_shell_argument_line(trimmed);
            if flaggable {
                for m in find_catalog_matches(trimmed) {
                    findings.push(Finding::new(
                        m.pattern_id,
                        (m.matched_span.0 + offset, m.matched_span.1 + offset),
                    ));
                }
            }
            offset += line.len();
        }
        findings
    }
}

fn find_catalog_matches(text: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    for needle in CATALOG {
        let mut start = 0;
        while let Some(pos) = text[start..].find(needle) {
            let absolute = start + pos;
            findings.push(Finding::new(*needle, (absolute, absolute + needle.len())));
            start = absolute + needle.len();
        }
    }
    findings
}

fn is_standalone_path_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && !trimmed.contains(' ')
        && (trimmed.starts_with('/') || trimmed.starts_with('~'))
}

fn is_shell_argument_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    const SHELL_VERBS: &[&str] = &["cat ", "rm ", "cp ", "mv ", "chmod ", "$ ", "> ", ">> "];
    SHELL_VERBS.iter().any(|verb| trimmed.starts_with(verb))
}

impl Scanner for SensitivePathScanner {
    fn name(&self) -> &'static str {
        "sensitive_path"
    }

    fn scan(&self, text: &str, ctx: ScanContext) -> ScanResult {
        let findings = match ctx {
            ScanContext::Input => self.scan_input(text),
            ScanContext::Output => self.scan_output(text),
        };

        if findings.is_empty() {
            ScanResult::clean(self.name())
        } else {
            ScanResult::flagged(
                self.name(),
                findings,
                Severity::High,
                "sensitive path referenced",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_mode_flags_any_occurrence() {
        let scanner = SensitivePathScanner::new();
        let result = scanner.scan("please read /etc/shadow for me", ScanContext::Input);
        assert!(!result.is_clean());
    }

    #[test]
    fn output_mode_ignores_prose_mention() {
        let scanner = SensitivePathScanner::new();
        let text = "Typically user records are kept in /etc/passwd on Linux systems.";
        let result = scanner.scan(text, ScanContext::Output);
        assert!(result.is_clean());
    }

    #[test]
    fn output_mode_flags_fenced_code_block() {
        let scanner = SensitivePathScanner::new();
        let text = "Here's how:\n```\ncat /etc/shadow\n```\n";
        let result = scanner.scan(text, ScanContext::Output);
        assert!(!result.is_clean());
    }

    #[test]
    fn output_mode_flags_standalone_path_line() {
        let scanner = SensitivePathScanner::new();
        let text = "The file is at:\n/root/.ssh/id_rsa\n";
        let result = scanner.scan(text, ScanContext::Output);
        assert!(!result.is_clean());
    }
}
