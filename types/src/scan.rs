//! Scan results produced by scanners and the pipeline.

use serde::{Deserialize, Serialize};

/// Which side of a worker call text was captured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanContext {
    Input,
    Output,
}

/// Severity of a scanner finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One matched pattern within a scanned text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub pattern_id: String,
    /// Byte range of the match within the scanned text.
    pub matched_span: (usize, usize),
    /// Present when the scanner decoded an encoded payload to find this match.
    pub decoded_preview: Option<String>,
}

impl Finding {
    #[must_use]
    pub fn new(pattern_id: impl Into<String>, span: (usize, usize)) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            matched_span: span,
            decoded_preview: None,
        }
    }

    #[must_use]
    pub fn with_decoded_preview(mut self, preview: impl Into<String>) -> Self {
        self.decoded_preview = Some(preview.into());
        self
    }
}

/// Outcome of running one scanner over one piece of text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub scanner: String,
    pub findings: Vec<Finding>,
    pub severity: Severity,
    pub advisory: String,
}

impl ScanResult {
    #[must_use]
    pub fn clean(scanner: impl Into<String>) -> Self {
        Self {
            scanner: scanner.into(),
            findings: Vec::new(),
            severity: Severity::Low,
            advisory: String::new(),
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    #[must_use]
    pub fn flagged(
        scanner: impl Into<String>,
        findings: Vec<Finding>,
        severity: Severity,
        advisory: impl Into<String>,
    ) -> Self {
        Self {
            scanner: scanner.into(),
            findings,
            severity,
            advisory: advisory.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_result_has_no_findings() {
        let result = ScanResult::clean("credential");
        assert!(result.is_clean());
    }

    #[test]
    fn flagged_result_is_not_clean() {
        let result = ScanResult::flagged(
            "credential",
            vec![Finding::new("aws_access_key", (0, 20))],
            Severity::High,
            "AWS access key detected",
        );
        assert!(!result.is_clean());
    }
}
