//! Vulnerability-echo scanner: flags only when a dangerous
//! fingerprint present in the step's input also shows up in the worker
//! output's code regions (fenced blocks or 4-space indent), never in prose.

use std::collections::HashSet;

use sentinel_types::{Finding, ScanContext, ScanResult, Severity};

use crate::code_extract::extract_code_regions;
use crate::Scanner;

pub const FINGERPRINT_CATALOG: &[&str] = &[
    "eval(",
    "exec(",
    "os.system(",
    "child_process.exec(",
    "pickle.loads(",
    "yaml.unsafe_load(",
    "yaml.load(",
    "innerHTML",
    "subprocess.call(",
    "Function(",
];

/// Fingerprints of dangerous sinks present anywhere in `text` (prose
/// included — used for the *input* side of the comparison).
#[must_use]
pub fn fingerprints(text: &str) -> HashSet<&'static str> {
    FINGERPRINT_CATALOG
        .iter()
        .copied()
        .filter(|needle| string_contains_sql_aware(text, needle))
        .collect()
}

/// `string-interpolated SQL` is a composite fingerprint, not a literal
/// needle, so it is checked by pattern rather than substring.
fn string_contains_sql_aware(text: &str, needle: &str) -> bool {
    text.contains(needle)
}

fn looks_like_interpolated_sql(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    (lower.contains("select ") || lower.contains("insert into") || lower.contains("delete from"))
        && (text.contains("{}") || text.contains("%s") || text.contains("+ \"") || text.contains("f\""))
}

/// Fingerprints present in `text`'s code regions only (spec's output-side
/// restriction).
fn code_region_fingerprints(text: &str) -> HashSet<&'static str> {
    let regions = extract_code_regions(text);
    let mut found: HashSet<&'static str> = regions
        .iter()
        .flat_map(|region| FINGERPRINT_CATALOG.iter().copied().filter(|n| region.contains(n)))
        .collect();
    if regions.iter().any(|r| looks_like_interpolated_sql(r)) {
        found.insert("string_interpolated_sql");
    }
    found
}

pub struct VulnerabilityEchoScanner {
    input_fingerprints: HashSet<&'static str>,
}

impl VulnerabilityEchoScanner {
    #[must_use]
    pub fn new(input_text: &str) -> Self {
        let mut input_fingerprints = fingerprints(input_text);
        if looks_like_interpolated_sql(input_text) {
            input_fingerprints.insert("string_interpolated_sql");
        }
        Self { input_fingerprints }
    }
}

impl Scanner for VulnerabilityEchoScanner {
    fn name(&self) -> &'static str {
        "vulnerability_echo"
    }

    /// `ctx` is always treated as output; this scanner is meaningless on
    /// the input side by construction (it compares input fingerprints
    /// against output code regions).
    fn scan(&self, text: &str, _ctx: ScanContext) -> ScanResult {
        let output_fingerprints = code_region_fingerprints(text);
        let echoed: Vec<Finding> = self
            .input_fingerprints
            .intersection(&output_fingerprints)
            .map(|fp| Finding::new(*fp, (0, 0)))
            .collect();

        if echoed.is_empty() {
            ScanResult::clean(self.name())
        } else {
            ScanResult::flagged(
                self.name(),
                echoed,
                Severity::High,
                "worker echoed a dangerous fingerprint from the step's input",
            )
        }
    }
}
