//! Planner client: sends `{system_prompt,
//! conversation_history_summary, user_request}` to the remote planner and
//! parses the JSON [`Plan`] it returns, or detects a refusal.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sentinel_core::digest_hex;
use sentinel_types::Plan;

use crate::http::shared_http_client;
use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("planner transport error: {0}")]
    Transport(String),
    #[error("planner response was not valid JSON: {0}")]
    InvalidJson(String),
    #[error("planner plan failed validation: {0}")]
    Invalid(#[from] sentinel_types::PlanValidationError),
}

/// What came back from the planner: a usable plan, or a detected refusal.
#[derive(Debug, Clone)]
pub enum PlannerOutcome {
    Plan(Plan),
    Refused(String),
}

#[derive(Debug, Clone, Serialize)]
struct PlannerRequestBody<'a> {
    system_prompt: &'a str,
    /// Stable digest of `system_prompt`, unchanged across calls that reuse
    /// the same prompt text. A transport that caches by this key can skip
    /// re-processing the system prompt instead of resending it in full.
    system_prompt_cache_key: &'a str,
    conversation_history_summary: &'a str,
    user_request: &'a str,
}

#[derive(Debug, Deserialize)]
struct PlannerRawResponse {
    text: String,
}

/// Phrases that mark a planner refusal rather than a plan, checked
/// case-insensitively against the whole response.
const REFUSAL_MARKERS: &[&str] = &[
    "i cannot help with that",
    "i can't help with that",
    "i cannot assist with this request",
    "i will not generate a plan for this",
    "this request violates",
    "refuse to plan",
];

#[async_trait]
pub trait PlannerClient: Send + Sync {
    async fn plan(
        &self,
        system_prompt: &str,
        conversation_history_summary: &str,
        user_request: &str,
        known_tools: &HashSet<String>,
    ) -> Result<PlannerOutcome, PlannerError>;
}

/// Strips a single leading/trailing markdown code fence (``` or ```json)
/// if present; returns the input unchanged otherwise.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let after_open = after_open
        .strip_prefix("json")
        .unwrap_or(after_open)
        .trim_start_matches('\n');
    after_open.strip_suffix("```").unwrap_or(after_open).trim()
}

fn detect_refusal(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some("empty planner response".to_string());
    }
    let lower = trimmed.to_ascii_lowercase();
    REFUSAL_MARKERS
        .iter()
        .find(|marker| lower.contains(*marker))
        .map(|marker| format!("planner refusal marker matched: {marker}"))
}

pub struct RemotePlannerClient {
    client: Client,
    url: String,
    timeout: Duration,
    retry_config: RetryConfig,
    /// Cache of the last system prompt seen and its digest, so repeated
    /// calls with the unchanged prompt (the common case: the planner's
    /// system prompt is a fixed constant) don't recompute the digest.
    system_prompt_cache: Mutex<Option<(String, String)>>,
}

impl RemotePlannerClient {
    #[must_use]
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: shared_http_client(),
            url: url.into(),
            timeout,
            retry_config: RetryConfig::default(),
            system_prompt_cache: Mutex::new(None),
        }
    }

    fn system_prompt_cache_key(&self, system_prompt: &str) -> String {
        let mut cache = self.system_prompt_cache.lock().unwrap();
        if let Some((cached_prompt, key)) = cache.as_ref()
            && cached_prompt == system_prompt
        {
            return key.clone();
        }
        let key = digest_hex(system_prompt);
        *cache = Some((system_prompt.to_string(), key.clone()));
        key
    }
}

#[async_trait]
impl PlannerClient for RemotePlannerClient {
    async fn plan(
        &self,
        system_prompt: &str,
        conversation_history_summary: &str,
        user_request: &str,
        known_tools: &HashSet<String>,
    ) -> Result<PlannerOutcome, PlannerError> {
        let cache_key = self.system_prompt_cache_key(system_prompt);
        let body = PlannerRequestBody {
            system_prompt,
            system_prompt_cache_key: &cache_key,
            conversation_history_summary,
            user_request,
        };

        let outcome = send_with_retry(
            || {
                self.client
                    .post(&self.url)
                    .timeout(self.timeout)
                    .json(&body)
            },
            &self.retry_config,
        )
        .await;

        let response = match outcome {
            RetryOutcome::Success(response) => response,
            RetryOutcome::HttpError(response) => {
                return Err(PlannerError::Transport(format!(
                    "planner returned HTTP {}",
                    response.status()
                )));
            }
            RetryOutcome::ConnectionError { attempts, source } => {
                return Err(PlannerError::Transport(format!(
                    "connection failed after {attempts} attempts: {source}"
                )));
            }
            RetryOutcome::NonRetryable(source) => {
                return Err(PlannerError::Transport(source.to_string()));
            }
        };

        let raw: PlannerRawResponse = response
            .json()
            .await
            .map_err(|e| PlannerError::InvalidJson(e.to_string()))?;

        let stripped = strip_code_fence(&raw.text);

        if let Some(reason) = detect_refusal(stripped) {
            return Ok(PlannerOutcome::Refused(reason));
        }

        let plan: Plan =
            serde_json::from_str(stripped).map_err(|e| PlannerError::InvalidJson(e.to_string()))?;
        plan.validate(known_tools)?;

        Ok(PlannerOutcome::Plan(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_plain_fence() {
        let input = "```\n{\"summary\":\"x\",\"steps\":[]}\n```";
        assert_eq!(strip_code_fence(input), "{\"summary\":\"x\",\"steps\":[]}");
    }

    #[test]
    fn strips_json_tagged_fence() {
        let input = "```json\n{\"a\":1}\n```";
        assert_eq!(strip_code_fence(input), "{\"a\":1}");
    }

    #[test]
    fn leaves_unfenced_text_unchanged() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn empty_response_is_a_refusal() {
        assert!(detect_refusal("   ").is_some());
    }

    #[test]
    fn refusal_marker_is_detected_case_insensitively() {
        assert!(detect_refusal("I CANNOT HELP WITH THAT request").is_some());
    }

    #[test]
    fn system_prompt_cache_key_is_stable_across_repeated_calls() {
        let planner = RemotePlannerClient::new("http://unused.invalid", Duration::from_secs(1));
        let first = planner.system_prompt_cache_key("you are a planner");
        let second = planner.system_prompt_cache_key("you are a planner");
        assert_eq!(first, second);
    }

    #[test]
    fn system_prompt_cache_key_changes_with_the_prompt() {
        let planner = RemotePlannerClient::new("http://unused.invalid", Duration::from_secs(1));
        let first = planner.system_prompt_cache_key("you are a planner");
        let second = planner.system_prompt_cache_key("you are a different planner");
        assert_ne!(first, second);
    }

    #[test]
    fn plan_json_is_not_flagged_as_refusal() {
        assert!(detect_refusal("{\"summary\": \"ok\", \"steps\": []}").is_none());
    }

    #[tokio::test]
    async fn parses_valid_plan_from_fenced_response() {
        let server = wiremock::MockServer::start().await;
        let plan_json = serde_json::json!({
            "summary": "noop",
            "steps": [{
                "kind": "llm_task",
                "prompt_template": "say hi",
                "input_variables": [],
                "output_variable": null,
                "output_format": "none",
                "expects_code": false
            }]
        })
        .to_string();
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": format!("```json\n{plan_json}\n```")
            })))
            .mount(&server)
            .await;

        let planner = RemotePlannerClient::new(server.uri(), Duration::from_secs(5));
        let result = planner
            .plan("sys", "history", "do nothing", &HashSet::new())
            .await
            .unwrap();

        match result {
            PlannerOutcome::Refused(reason) => panic!("expected a plan, got refusal: {reason}"),
            PlannerOutcome::Plan(plan) => assert_eq!(plan.summary, "noop"),
        }
    }

    #[tokio::test]
    async fn refusal_marker_surfaces_as_refused_outcome() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "I cannot help with that request."
            })))
            .mount(&server)
            .await;

        let planner = RemotePlannerClient::new(server.uri(), Duration::from_secs(5));
        let result = planner
            .plan("sys", "history", "do something bad", &HashSet::new())
            .await
            .unwrap();

        assert!(matches!(result, PlannerOutcome::Refused(_)));
    }
}
