//! Ten-layer scan pipeline building blocks: the `Scanner`
//! trait and its implementations, spotlighting, and fenced-code extraction.
//! Pipeline composition (`process_with_worker`) lives in `sentinel-engine`,
//! which owns the `WorkerClient` call these scanners surround.

pub mod code_extract;
pub mod command_pattern;
pub mod credential;
pub mod encoding;
pub mod injection_classifier;
pub mod script_gate;
pub mod sensitive_path;
pub mod spotlight;
pub mod static_analysis;
pub mod vulnerability_echo;

use sentinel_types::{ScanContext, ScanResult};

/// Common contract every scan layer implements.
pub trait Scanner: Send + Sync {
    fn name(&self) -> &'static str;
    fn scan(&self, text: &str, ctx: ScanContext) -> ScanResult;
}

pub use code_extract::{CodeBlock, extract_code_blocks, strip_emoji};
pub use command_pattern::CommandPatternScanner;
pub use credential::CredentialScanner;
pub use encoding::EncodingScanner;
pub use injection_classifier::InjectionClassifier;
pub use script_gate::script_gate_violation;
pub use sensitive_path::SensitivePathScanner;
pub use spotlight::{Spotlight, spotlight_untrusted_data};
pub use static_analysis::{StaticFinding, analyze_blocks};
pub use vulnerability_echo::{VulnerabilityEchoScanner, fingerprints};
