//! Prompt-injection classifier.
//!
//! No ML runtime is available here, so this ships as a deterministic
//! keyword/pattern-scoring stand-in behind a lazily-initialized `OnceLock`.
//! A real classifier can replace `InjectionClassifier::score` later without
//! touching callers.

use std::sync::OnceLock;

use regex::RegexSet;
use sentinel_types::{Finding, ScanContext, ScanResult, Severity};

use crate::Scanner;

const CHUNK_CHARS: usize = 2000;

/// Phrase/pattern set scored per 2000-character chunk; each match adds to
/// the chunk's injection score, capped at 1.0.
const INJECTION_PATTERNS: &[(&str, f64)] = &[
    (r"(?i)\bignore\s+(?:the\s+)?(?:previous|prior|above)\s+instructions?\b", 0.6),
    (r"(?i)\bdisregard\s+(?:all\s+)?(?:previous|prior)\s+(?:instructions?|rules?)\b", 0.6),
    (r"(?i)\bsafety\s+mode\s+(?:is\s+)?off\b", 0.6),
    (r"(?i)\bsystem\s+override\b", 0.6),
    (r"(?i)\byou\s+are\s+now\s+(?:in\s+)?(?:developer|debug|unrestricted|dan)\s+mode\b", 0.6),
    (r"(?i)\bact\s+as\s+(?:if\s+you\s+(?:have|had)\s+no\s+restrictions|an?\s+unfiltered)\b", 0.5),
    (r"(?i)\bjailbreak\b", 0.5),
    (r"(?i)\b(?:dan|stan|dude)\s+mode\b", 0.5),
    (r"(?i)\bpretend\s+(?:you\s+)?(?:have\s+no|there\s+are\s+no)\s+(?:rules|restrictions|guidelines)\b", 0.5),
    (r"(?i)\breveal\s+your\s+(?:system\s+prompt|instructions)\b", 0.4),
    (r"(?i)\bthis\s+is\s+(?:not\s+)?a\s+test,?\s+(?:real\s+)?rules\s+do\s+not\s+apply\b", 0.4),
];

struct CompiledPatterns {
    set: RegexSet,
    weights: Vec<f64>,
}

fn patterns() -> &'static CompiledPatterns {
    static PATTERNS: OnceLock<CompiledPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let regexes: Vec<&str> = INJECTION_PATTERNS.iter().map(|(p, _)| *p).collect();
        let weights: Vec<f64> = INJECTION_PATTERNS.iter().map(|(_, w)| *w).collect();
        CompiledPatterns {
            set: RegexSet::new(regexes).expect("INJECTION_PATTERNS must all be valid regex"),
            weights,
        }
    })
}

fn chunk_score(chunk: &str) -> f64 {
    let compiled = patterns();
    let mut score = 0.0;
    for index in compiled.set.matches(chunk).into_iter() {
        score += compiled.weights[index];
    }
    score.min(1.0)
}

/// Deterministic stand-in for a pretrained injection classifier: scores
/// 512-token (approximated here as 2000-character) chunks and reports the
/// maximum chunk score as the overall injection score. A caller marking
/// this required must fail closed if construction ever becomes fallible.
pub struct InjectionClassifier {
    threshold: f64,
}

impl InjectionClassifier {
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Returns the maximum per-chunk injection score across the whole text.
    #[must_use]
    pub fn score(&self, text: &str) -> f64 {
        if text.is_empty() {
            return 0.0;
        }
        text.as_bytes()
            .chunks(CHUNK_CHARS)
            .map(|bytes| chunk_score(&String::from_utf8_lossy(bytes)))
            .fold(0.0_f64, f64::max)
    }
}

impl Scanner for InjectionClassifier {
    fn name(&self) -> &'static str {
        "prompt_injection_classifier"
    }

    fn scan(&self, text: &str, _ctx: ScanContext) -> ScanResult {
        let score = self.score(text);
        if score < self.threshold {
            return ScanResult::clean(self.name());
        }

        let compiled = patterns();
        let findings: Vec<Finding> = compiled
            .set
            .matches(text)
            .into_iter()
            .map(|index| Finding::new(format!("injection_pattern_{index}"), (0, text.len().min(1))))
            .collect();

        ScanResult::flagged(
            self.name(),
            findings,
            Severity::Critical,
            format!("injection score {score:.2} exceeds threshold {:.2}", self.threshold),
        )
    }
}
