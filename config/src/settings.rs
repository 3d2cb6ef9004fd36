//! `SENTINEL_*` environment variable settings.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalMode {
    Auto,
    Full,
}

impl ApprovalMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "full" => Some(Self::Full),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Full => "full",
        }
    }
}

/// Which scanners are required to initialize successfully, i.e. fail the
/// whole request closed if unavailable.
#[derive(Debug, Clone)]
pub struct RequiredScanners {
    pub credential: bool,
    pub sensitive_path: bool,
    pub command_pattern: bool,
    pub encoding: bool,
    pub injection: bool,
    pub vulnerability_echo: bool,
}

impl Default for RequiredScanners {
    fn default() -> Self {
        Self {
            credential: true,
            sensitive_path: true,
            command_pattern: true,
            encoding: true,
            injection: true,
            vulnerability_echo: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationThresholds {
    pub warn_at: f64,
    pub block_at: f64,
}

impl Default for ConversationThresholds {
    fn default() -> Self {
        Self {
            warn_at: 3.0,
            block_at: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentinelSettings {
    pub approval_mode: ApprovalMode,
    pub required_scanners: RequiredScanners,
    pub conversation_thresholds: ConversationThresholds,
    pub session_ttl: Duration,
    pub session_capacity: usize,
    pub provenance_capacity: usize,
    pub worker_url: String,
    pub worker_timeout: Duration,
    pub planner_url: String,
    pub planner_timeout: Duration,
    pub pin_required: bool,
    pub pin_file_path: Option<PathBuf>,
    pub csrf_allowed_origins: Vec<String>,
    pub policy_file_path: PathBuf,
    pub prompt_length_ceiling: usize,
    pub injection_score_threshold: f64,
    pub workspace_root: PathBuf,
    pub data_dir: PathBuf,
    pub bind_addr: String,
    pub approval_ttl: Duration,
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|raw| matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

impl Default for SentinelSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

impl SentinelSettings {
    /// Load settings from `SENTINEL_*` environment variables, falling back
    /// to conservative (fail-safe) defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let approval_mode = std::env::var("SENTINEL_APPROVAL_MODE")
            .ok()
            .and_then(|raw| ApprovalMode::parse(&raw))
            .unwrap_or(ApprovalMode::Full);

        let required_scanners = RequiredScanners {
            credential: env_bool("SENTINEL_REQUIRE_CREDENTIAL_SCANNER", true),
            sensitive_path: env_bool("SENTINEL_REQUIRE_SENSITIVE_PATH_SCANNER", true),
            command_pattern: env_bool("SENTINEL_REQUIRE_COMMAND_PATTERN_SCANNER", true),
            encoding: env_bool("SENTINEL_REQUIRE_ENCODING_SCANNER", true),
            injection: env_bool("SENTINEL_REQUIRE_INJECTION_SCANNER", true),
            vulnerability_echo: env_bool("SENTINEL_REQUIRE_VULN_ECHO_SCANNER", false),
        };

        let conversation_thresholds = ConversationThresholds {
            warn_at: env_parsed("SENTINEL_CONVERSATION_WARN_AT", 3.0),
            block_at: env_parsed("SENTINEL_CONVERSATION_BLOCK_AT", 5.0),
        };

        Self {
            approval_mode,
            required_scanners,
            conversation_thresholds,
            session_ttl: Duration::from_secs(env_parsed("SENTINEL_SESSION_TTL_SECS", 3600)),
            session_capacity: env_parsed("SENTINEL_SESSION_CAPACITY", 1000),
            provenance_capacity: env_parsed("SENTINEL_PROVENANCE_CAPACITY", 100_000),
            worker_url: env_string("SENTINEL_WORKER_URL", "http://127.0.0.1:8081"),
            worker_timeout: Duration::from_secs(env_parsed("SENTINEL_WORKER_TIMEOUT_SECS", 1800)),
            planner_url: env_string("SENTINEL_PLANNER_URL", "https://planner.internal/v1/generate"),
            planner_timeout: Duration::from_secs(env_parsed("SENTINEL_PLANNER_TIMEOUT_SECS", 60)),
            pin_required: env_bool("SENTINEL_PIN_REQUIRED", true),
            pin_file_path: std::env::var("SENTINEL_PIN_FILE_PATH").ok().map(PathBuf::from),
            csrf_allowed_origins: std::env::var("SENTINEL_CSRF_ALLOWED_ORIGINS")
                .map(|raw| raw.split(',').map(str::trim).map(str::to_string).collect())
                .unwrap_or_default(),
            policy_file_path: PathBuf::from(env_string(
                "SENTINEL_POLICY_FILE_PATH",
                "./sentinel-policy.yaml",
            )),
            prompt_length_ceiling: env_parsed("SENTINEL_PROMPT_LENGTH_CEILING", 100_000),
            injection_score_threshold: env_parsed("SENTINEL_INJECTION_SCORE_THRESHOLD", 0.5),
            workspace_root: PathBuf::from(env_string("SENTINEL_WORKSPACE_ROOT", "./sentinel-workspace")),
            data_dir: PathBuf::from(env_string("SENTINEL_DATA_DIR", "./sentinel-data")),
            bind_addr: env_string("SENTINEL_BIND_ADDR", "127.0.0.1:8443"),
            approval_ttl: Duration::from_secs(env_parsed("SENTINEL_APPROVAL_TTL_SECS", 900)),
        }
    }
}

/// Default location for Sentinel's own config directory, deferring to the
/// OS config directory via `dirs`.
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sentinel"))
}
