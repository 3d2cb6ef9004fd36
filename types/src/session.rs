//! Session and turn history.

use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// Outcome recorded for one [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Allowed,
    Warned,
    Blocked,
    Refused,
    Executed,
    Failed,
}

/// Per-rule risk contribution from the conversation analyzer, keyed by rule
/// name (e.g. `"retry_after_block"`).
pub type RiskBreakdown = Vec<(String, f64)>;

/// One user request plus the outcome the gateway reached for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub request_text: String,
    pub outcome: TurnOutcome,
    pub risk_breakdown: RiskBreakdown,
    pub timestamp_unix_ms: i64,
}

/// Decision the conversation analyzer returns for one new request (spec
/// §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationAction {
    Allow,
    Warn,
    Block,
}

/// Per-source rolling turn history used for multi-turn risk scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub source_key: String,
    pub turns: Vec<Turn>,
    pub cumulative_risk: f64,
    pub violation_count: u32,
    pub locked: bool,
    pub last_seen_unix_ms: i64,
}

impl Session {
    #[must_use]
    pub fn new(session_id: SessionId, source_key: impl Into<String>, now_unix_ms: i64) -> Self {
        Self {
            session_id,
            source_key: source_key.into(),
            turns: Vec::new(),
            cumulative_risk: 0.0,
            violation_count: 0,
            locked: false,
            last_seen_unix_ms: now_unix_ms,
        }
    }

    /// Append a turn, updating `last_seen`, `violation_count`, and
    /// `cumulative_risk` (monotonically non-decreasing).
    pub fn record_turn(&mut self, turn: Turn, added_risk: f64, now_unix_ms: i64) {
        if matches!(turn.outcome, TurnOutcome::Blocked) {
            self.violation_count += 1;
        }
        self.cumulative_risk += added_risk.max(0.0);
        self.last_seen_unix_ms = now_unix_ms;
        self.turns.push(turn);
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_a_block_increments_violations_and_never_decreases_risk() {
        let mut session = Session::new(SessionId::generate(), "src", 0);
        session.record_turn(
            Turn {
                request_text: "hi".into(),
                outcome: TurnOutcome::Allowed,
                risk_breakdown: vec![],
                timestamp_unix_ms: 1,
            },
            1.0,
            1,
        );
        session.record_turn(
            Turn {
                request_text: "bad".into(),
                outcome: TurnOutcome::Blocked,
                risk_breakdown: vec![],
                timestamp_unix_ms: 2,
            },
            5.0,
            2,
        );
        assert_eq!(session.violation_count, 1);
        assert!((session.cumulative_risk - 6.0).abs() < f64::EPSILON);
    }
}
