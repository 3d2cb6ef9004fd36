//! Conversation analyzer: eight weighted heuristic rules over
//! a session's turn history, producing a `ConversationAction` for one new
//! request. Pure function over `Session`/`Turn`, no I/O.

use sentinel_config::ConversationThresholds;
use sentinel_types::{ConversationAction, RiskBreakdown, Session, TurnOutcome};

const RULE_CAP: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CapabilityTier {
    Observe,
    Read,
    Write,
    Execute,
    Persist,
    Exfiltrate,
}

const TIER_KEYWORDS: &[(CapabilityTier, &[&str])] = &[
    (CapabilityTier::Exfiltrate, &["upload", "send to", "email this", "post to", "exfiltrate", "curl -T", "scp "]),
    (CapabilityTier::Persist, &["cron", "crontab", "systemd", "startup script", "persist", "autostart", "install service"]),
    (CapabilityTier::Execute, &["run ", "execute", "sh -c", "bash -c", "eval(", "subprocess", "chmod +x"]),
    (CapabilityTier::Write, &["write", "create", "edit", "modify", "delete", "overwrite", "append to"]),
    (CapabilityTier::Read, &["read", "cat ", "show me", "open ", "contents of", "what's in"]),
];

/// Highest tier whose keyword set appears in `text`; defaults to `Observe`.
fn classify_tier(text: &str) -> CapabilityTier {
    let lower = text.to_ascii_lowercase();
    for (tier, keywords) in TIER_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return *tier;
        }
    }
    CapabilityTier::Observe
}

fn tier_distance(from: CapabilityTier, to: CapabilityTier) -> i32 {
    to as i32 - from as i32
}

const SENSITIVE_KEYWORDS: &[&str] = &[
    "/etc/shadow", "/etc/passwd", "/etc/sudoers", "password", "credential", "secret",
    "private key", "ssh", ".bash_history", "/root/", "wallet", "api key", "access token",
];

fn is_sensitive(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    SENSITIVE_KEYWORDS.iter().any(|k| lower.contains(k))
}

const INSTRUCTION_OVERRIDE_PHRASES: &[&str] = &[
    "ignore previous instructions",
    "ignore the previous instructions",
    "disregard previous instructions",
    "safety mode off",
    "system override",
    "jailbreak",
    "dan mode",
    "developer mode",
    "you are now unrestricted",
];

fn matches_instruction_override(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    INSTRUCTION_OVERRIDE_PHRASES.iter().any(|p| lower.contains(p))
}

const CONTEXT_REFERENCE_PHRASES: &[&str] =
    &["as i mentioned", "like before", "like we discussed", "following up on", "continuing from", "as we talked about"];

fn has_context_reference(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    CONTEXT_REFERENCE_PHRASES.iter().any(|p| lower.contains(p))
}

const RECON_KEYWORDS: &[&str] = &["list files", "ls ", "dir ", "show me the directory", "contents of", "what's in", "find all"];

fn is_reconnaissance(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    RECON_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Longest-common-subsequence length via classic O(n*m) dynamic
/// programming, then the ratio against the longer of the two strings.
fn lcs_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            dp[i][j] = if a[i - 1] == b[j - 1] {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i - 1][j].max(dp[i][j - 1])
            };
        }
    }
    let lcs_len = dp[a.len()][b.len()] as f64;
    lcs_len / (a.len().max(b.len()) as f64)
}

fn rule_retry_after_block(session: &Session, request_text: &str) -> f64 {
    let similar = session
        .turns
        .iter()
        .filter(|t| t.outcome == TurnOutcome::Blocked)
        .any(|t| lcs_similarity(request_text, &t.request_text) > 0.45);
    if similar { 3.0 } else { 0.0 }
}

fn rule_capability_escalation(session: &Session, request_text: &str) -> f64 {
    let current_tier = classify_tier(request_text);

    // Escalation is relative to this session's own history; a session's
    // first turn has nothing to escalate from, so only the first-high-risk
    // check below applies to it.
    let jumped_two_tiers = session.turns.iter().map(|t| classify_tier(&t.request_text)).max().is_some_and(
        |max_prior_tier| tier_distance(max_prior_tier, current_tier) >= 2,
    );
    let first_high_risk_tier = matches!(current_tier, CapabilityTier::Persist | CapabilityTier::Exfiltrate)
        && !session.turns.iter().any(|t| {
            matches!(classify_tier(&t.request_text), CapabilityTier::Persist | CapabilityTier::Exfiltrate)
        });

    if jumped_two_tiers || first_high_risk_tier { 3.0 } else { 0.0 }
}

fn rule_sensitive_topic_acceleration(session: &Session, request_text: &str) -> f64 {
    let has_prior_benign = session.turns.iter().any(|t| !is_sensitive(&t.request_text));
    let already_sensitive = session.turns.iter().any(|t| is_sensitive(&t.request_text));
    if is_sensitive(request_text) && has_prior_benign && !already_sensitive { 2.5 } else { 0.0 }
}

fn rule_instruction_override(request_text: &str) -> f64 {
    if matches_instruction_override(request_text) { 4.0 } else { 0.0 }
}

fn rule_violation_accumulation(session: &Session) -> f64 {
    f64::from(session.violation_count) * 1.5
}

fn rule_context_building(request_text: &str) -> f64 {
    if has_context_reference(request_text) && is_sensitive(request_text) { 2.5 } else { 0.0 }
}

fn rule_reconnaissance(session: &Session, request_text: &str) -> f64 {
    let mut count = usize::from(is_reconnaissance(request_text));
    count += session.turns.iter().filter(|t| is_reconnaissance(&t.request_text)).count();
    if count >= 3 {
        3.5
    } else if count >= 2 {
        2.0
    } else {
        0.0
    }
}

fn rule_topic_shift(session: &Session, request_text: &str) -> f64 {
    let previous_was_benign = session.turns.last().is_some_and(|t| !is_sensitive(&t.request_text));
    if previous_was_benign && is_sensitive(request_text) { 2.0 } else { 0.0 }
}

/// Scores `request_text` against `session`'s history under the eight rules
/// and returns the action, the per-rule breakdown, and the aggregate score
/// (the sum the caller should pass as `added_risk` to
/// `SessionStore::append_turn`).
#[must_use]
pub fn analyze(
    session: &Session,
    request_text: &str,
    thresholds: &ConversationThresholds,
) -> (ConversationAction, RiskBreakdown, f64) {
    let breakdown: RiskBreakdown = vec![
        ("retry_after_block".to_string(), rule_retry_after_block(session, request_text).min(RULE_CAP)),
        ("capability_escalation".to_string(), rule_capability_escalation(session, request_text).min(RULE_CAP)),
        (
            "sensitive_topic_acceleration".to_string(),
            rule_sensitive_topic_acceleration(session, request_text).min(RULE_CAP),
        ),
        ("instruction_override".to_string(), rule_instruction_override(request_text).min(RULE_CAP)),
        ("violation_accumulation".to_string(), rule_violation_accumulation(session).min(RULE_CAP)),
        ("context_building".to_string(), rule_context_building(request_text).min(RULE_CAP)),
        ("reconnaissance".to_string(), rule_reconnaissance(session, request_text).min(RULE_CAP)),
        ("topic_shift".to_string(), rule_topic_shift(session, request_text).min(RULE_CAP)),
    ];

    let aggregate: f64 = breakdown.iter().map(|(_, score)| score).sum();

    let action = if aggregate >= thresholds.block_at {
        ConversationAction::Block
    } else if aggregate >= thresholds.warn_at {
        ConversationAction::Warn
    } else {
        ConversationAction::Allow
    };

    (action, breakdown, aggregate)
}
