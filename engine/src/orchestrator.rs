//! The CaMeL loop: `handle_task` and `execute_approved_plan`,
//! wiring the conversation analyzer, the planner, the scan pipeline, the
//! tool executor, and the trust gate into one sequential, per-task flow.

use std::collections::HashMap;
use std::time::Duration;

use sentinel_clients::{PlannerClient, PlannerOutcome, WorkerClient};
use sentinel_config::{ApprovalMode, ConversationThresholds, RequiredScanners};
use sentinel_core::now_unix_ms;
use sentinel_policy::PolicyEngine;
use sentinel_store::{ApprovalQueue, EventBus, ProvenanceStore, SessionStore};
use sentinel_types::{
    ApprovalId, ApprovalStatus, ConversationAction, ConversationSnapshot, DataId, DataSource,
    OutputFormat, PendingApproval, Plan, PlanStep, StepResult, TaskId, TaskResult, TaskStatus,
    TrustLevel, Turn, TurnOutcome,
};
use serde_json::Value;

use crate::analyzer;
use crate::error::SentinelError;
use crate::pipeline::{self, PipelineError, PipelineOptions};
use crate::tools::{ToolExecutor, ToolOutcome, known_tool_names};

/// The planner's system prompt encodes the hard constraints enforced
/// upstream: workspace boundaries, credential prohibition, a
/// language-safety rule, and a preference for single-step plans for pure
/// text generation. The planner is trusted but advisory; none of its
/// instructions weaken the gates downstream.
const PLANNER_SYSTEM_PROMPT: &str = "\
You are the planning component of a defence-in-depth agent gateway. Produce a JSON plan only. \
Never reference paths outside the configured workspace. Never request, generate, or echo \
credentials, private keys, or tokens. Translate any non-English request to English before \
building worker prompts. Do not volunteer sensitive categories beyond what was asked. Prefer a \
single LLMTask step for pure text generation over multiple steps.";

pub struct OrchestratorConfig {
    pub approval_mode: ApprovalMode,
    pub required_scanners: RequiredScanners,
    pub conversation_thresholds: ConversationThresholds,
    pub injection_score_threshold: f64,
    pub prompt_length_ceiling: usize,
    pub approval_ttl: Duration,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    session_store: SessionStore,
    approval_queue: ApprovalQueue,
    provenance: ProvenanceStore,
    event_bus: EventBus,
    policy: PolicyEngine,
    planner: Box<dyn PlannerClient>,
    worker: Box<dyn WorkerClient>,
}

struct BoundValue {
    data_id: DataId,
    text: String,
}

type ExecutionContext = HashMap<String, BoundValue>;

impl Orchestrator {
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        session_store: SessionStore,
        approval_queue: ApprovalQueue,
        provenance: ProvenanceStore,
        event_bus: EventBus,
        policy: PolicyEngine,
        planner: Box<dyn PlannerClient>,
        worker: Box<dyn WorkerClient>,
    ) -> Self {
        Self {
            config,
            session_store,
            approval_queue,
            provenance,
            event_bus,
            policy,
            planner,
            worker,
        }
    }

    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    #[must_use]
    pub fn session_store(&self) -> &SessionStore {
        &self.session_store
    }

    #[must_use]
    pub fn approval_queue(&self) -> &ApprovalQueue {
        &self.approval_queue
    }

    #[must_use]
    pub fn approval_mode(&self) -> ApprovalMode {
        self.config.approval_mode
    }

    #[must_use]
    pub fn credential_scanner(&self) -> &sentinel_scanners::CredentialScanner {
        self.policy.credential_scanner()
    }

    /// Probes the session and provenance stores with a lightweight,
    /// side-effect-free lookup so `/health` reports real backend
    /// reachability instead of a hardcoded constant.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.session_store.get("__health_check__").is_ok()
            && self.provenance.get(DataId::generate()).is_ok()
    }

    /// Runs one request end to end: scan, analyze, plan, validate, gate
    /// each step's execution on policy and provenance, and either return a
    /// result or hand off to the approval queue.
    pub async fn handle_task(&self, user_request: &str, source_key: &str) -> TaskResult {
        let task_id = TaskId::generate();
        let now = now_unix_ms();

        // 1-2. Resolve the session, bail out immediately if locked.
        let session = match self.session_store.get_or_create(source_key, now) {
            Ok(session) => session,
            Err(error) => return self.error_result(task_id, None, format!("session store unavailable: {error}")),
        };
        if session.locked {
            return TaskResult {
                task_id: task_id.to_string(),
                status: TaskStatus::Blocked,
                plan_summary: None,
                step_results: vec![],
                conversation: ConversationSnapshot {
                    action: ConversationAction::Block,
                    warnings: vec!["session is locked".to_string()],
                    risk_score: session.cumulative_risk,
                },
                approval_id: None,
                reason: Some("session_locked".to_string()),
            };
        }

        self.publish(&task_id, "started", serde_json::json!({ "source_key": source_key }));

        // 3. Conversation analyzer.
        let (action, breakdown, aggregate) =
            analyzer::analyze(&session, user_request, &self.config.conversation_thresholds);
        let warnings: Vec<String> = breakdown
            .iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(rule, score)| format!("{rule}: {score:.1}"))
            .collect();
        let conversation = ConversationSnapshot { action, warnings, risk_score: session.cumulative_risk + aggregate };

        if action == ConversationAction::Block {
            self.record_turn(source_key, user_request, TurnOutcome::Blocked, breakdown, aggregate, now);
            let _ = self.session_store.mark_locked(source_key);
            self.publish(&task_id, "failed", serde_json::json!({ "reason": "conversation_analyzer_block" }));
            return TaskResult {
                task_id: task_id.to_string(),
                status: TaskStatus::Blocked,
                plan_summary: None,
                step_results: vec![],
                conversation,
                approval_id: None,
                reason: Some("conversation analyzer: aggregate risk exceeded block threshold".to_string()),
            };
        }

        // 4. Input scan on the raw user request, full scanner set.
        if let Err(reason) = pipeline::run_scan_set(
            user_request,
            sentinel_types::ScanContext::Input,
            &self.config.required_scanners,
            self.config.injection_score_threshold,
            self.policy.credential_scanner(),
        ) {
            self.record_turn(source_key, user_request, TurnOutcome::Blocked, vec![], aggregate, now);
            self.publish(&task_id, "failed", serde_json::json!({ "reason": reason.to_string() }));
            return TaskResult {
                task_id: task_id.to_string(),
                status: TaskStatus::Blocked,
                plan_summary: None,
                step_results: vec![],
                conversation,
                approval_id: None,
                reason: Some(reason.to_string()),
            };
        }

        // 5. Call the planner.
        let history_summary = summarize_history(&session);
        let known_tools = known_tool_names();
        let plan = match self.planner.plan(PLANNER_SYSTEM_PROMPT, &history_summary, user_request, &known_tools).await {
            Ok(PlannerOutcome::Plan(plan)) => plan,
            Ok(PlannerOutcome::Refused(detail)) => {
                self.record_turn(source_key, user_request, TurnOutcome::Refused, vec![], aggregate, now);
                self.publish(&task_id, "failed", serde_json::json!({ "reason": "planner_refused" }));
                return TaskResult {
                    task_id: task_id.to_string(),
                    status: TaskStatus::Refused,
                    plan_summary: None,
                    step_results: vec![],
                    conversation,
                    approval_id: None,
                    reason: Some(detail),
                };
            }
            Err(error) => {
                self.record_turn(source_key, user_request, TurnOutcome::Failed, vec![], aggregate, now);
                self.publish(&task_id, "failed", serde_json::json!({ "reason": error.to_string() }));
                return TaskResult {
                    task_id: task_id.to_string(),
                    status: TaskStatus::Error,
                    plan_summary: None,
                    step_results: vec![],
                    conversation,
                    approval_id: None,
                    reason: Some(error.to_string()),
                };
            }
        };

        if let Err(error) = plan.validate(&known_tools) {
            self.record_turn(source_key, user_request, TurnOutcome::Failed, vec![], aggregate, now);
            self.publish(&task_id, "failed", serde_json::json!({ "reason": error.to_string() }));
            return TaskResult {
                task_id: task_id.to_string(),
                status: TaskStatus::Error,
                plan_summary: Some(plan.summary),
                step_results: vec![],
                conversation,
                approval_id: None,
                reason: Some(error.to_string()),
            };
        }

        self.publish(&task_id, "planned", serde_json::json!({ "summary": plan.summary }));

        // 7. Approval gate.
        if self.config.approval_mode == ApprovalMode::Full {
            let approval = PendingApproval::new(
                plan.clone(),
                source_key,
                user_request,
                session.session_id,
                now,
                self.config.approval_ttl,
            );
            let approval_id = match self.approval_queue.create(approval) {
                Ok(id) => id,
                Err(error) => return self.error_result(task_id, Some(plan.summary), error.to_string()),
            };
            self.publish(&task_id, "approval_requested", serde_json::json!({ "approval_id": approval_id.to_string() }));
            return TaskResult {
                task_id: task_id.to_string(),
                status: TaskStatus::AwaitingApproval,
                plan_summary: Some(plan.summary),
                step_results: vec![],
                conversation,
                approval_id: Some(approval_id),
                reason: None,
            };
        }

        // 8-10. Auto mode: execute immediately.
        let (step_results, status, reason) = self.execute_plan_steps(&task_id, &plan).await;
        self.record_turn(source_key, user_request, status_to_outcome(status), breakdown, aggregate, now);
        TaskResult {
            task_id: task_id.to_string(),
            status,
            plan_summary: Some(plan.summary),
            step_results,
            conversation,
            approval_id: None,
            reason,
        }
    }

    /// Resumes execution from step 8 for a previously `AwaitingApproval`
    /// task whose approval has since been granted.
    pub async fn execute_approved_plan(&self, approval_id: ApprovalId) -> TaskResult {
        let task_id = TaskId::generate();
        let now = now_unix_ms();

        let checked = match self.approval_queue.check(approval_id, now) {
            Ok(checked) => checked,
            Err(error) => return self.error_result(task_id, None, error.to_string()),
        };

        if checked.status != ApprovalStatus::Granted {
            return TaskResult {
                task_id: task_id.to_string(),
                status: TaskStatus::Error,
                plan_summary: None,
                step_results: vec![],
                conversation: ConversationSnapshot { action: ConversationAction::Allow, warnings: vec![], risk_score: 0.0 },
                approval_id: Some(approval_id),
                reason: Some(format!("approval is not granted: {:?}", checked.status)),
            };
        }
        let Some(approval) = checked.approval else {
            return self.error_result(task_id, None, "granted approval record vanished".to_string());
        };

        let (step_results, status, reason) = self.execute_plan_steps(&task_id, &approval.plan).await;
        self.record_turn(
            &approval.source_key,
            &approval.user_request,
            status_to_outcome(status),
            vec![],
            0.0,
            now,
        );

        TaskResult {
            task_id: task_id.to_string(),
            status,
            plan_summary: Some(approval.plan.summary),
            step_results,
            conversation: ConversationSnapshot { action: ConversationAction::Allow, warnings: vec![], risk_score: 0.0 },
            approval_id: Some(approval_id),
            reason,
        }
    }

    async fn execute_plan_steps(&self, task_id: &TaskId, plan: &Plan) -> (Vec<StepResult>, TaskStatus, Option<String>) {
        let mut ctx: ExecutionContext = HashMap::new();
        let mut step_results = Vec::new();

        for (index, step) in plan.steps.iter().enumerate() {
            let (description, result) = match step {
                PlanStep::LlmTask { .. } => ("llm_task".to_string(), self.run_llm_task(step, &mut ctx).await),
                PlanStep::ToolCall { tool_name, .. } => (format!("tool_call:{tool_name}"), self.run_tool_call(step, &mut ctx)),
            };

            match result {
                Ok(detail) => {
                    step_results.push(StepResult { step_index: index, description, succeeded: true, detail: Some(detail) });
                    self.publish(task_id, "step_completed", serde_json::json!({ "step_index": index }));
                }
                Err((status, reason)) => {
                    step_results.push(StepResult { step_index: index, description, succeeded: false, detail: Some(reason.clone()) });
                    self.publish(task_id, "failed", serde_json::json!({ "step_index": index, "reason": reason }));
                    return (step_results, status, Some(reason));
                }
            }
        }

        self.publish(task_id, "completed", serde_json::json!({}));
        (step_results, TaskStatus::Success, None)
    }

    async fn run_llm_task(&self, step: &PlanStep, ctx: &mut ExecutionContext) -> Result<String, (TaskStatus, String)> {
        let PlanStep::LlmTask { prompt_template, input_variables, output_variable, output_format, .. } = step else {
            unreachable!("run_llm_task called with a non-LlmTask step")
        };

        let mut input_data_ids = Vec::new();
        let mut resolved_prompt = prompt_template.clone();
        let mut substituted_data = String::new();
        for name in input_variables {
            if let Some(bound) = ctx.get(name) {
                input_data_ids.push(bound.data_id);
                substituted_data.push_str(&bound.text);
                substituted_data.push_str("\n\n---\n\n");
                resolved_prompt = resolved_prompt.replace(&format!("${{{name}}}"), "(see tagged data below)");
            }
        }

        let options = PipelineOptions {
            skip_input_scan: !input_variables.is_empty(),
            required_scanners: self.config.required_scanners.clone(),
            injection_score_threshold: self.config.injection_score_threshold,
            prompt_length_ceiling: self.config.prompt_length_ceiling,
        };
        let untrusted_data = if input_variables.is_empty() { None } else { Some(substituted_data.as_str()) };

        let output = pipeline::process_with_worker(
            self.worker.as_ref(),
            &resolved_prompt,
            untrusted_data,
            &input_data_ids,
            &self.provenance,
            &options,
            self.policy.credential_scanner(),
        )
        .await
        .map_err(pipeline_error_to_status)?;

        let validated_text = validate_output_format(&output.response_text, *output_format)?;

        if let Some(name) = output_variable {
            ctx.insert(name.clone(), BoundValue { data_id: output.response_data_id, text: validated_text.clone() });
        }
        Ok(validated_text)
    }

    fn run_tool_call(&self, step: &PlanStep, ctx: &mut ExecutionContext) -> Result<String, (TaskStatus, String)> {
        let PlanStep::ToolCall { tool_name, arguments, output_variable } = step else {
            unreachable!("run_tool_call called with a non-ToolCall step")
        };

        let (resolved_args, contributing_ids) = resolve_arguments(arguments, ctx);

        // file_write's `content` is untrusted data quarantined to disk, not
        // executed; the write itself is gated on every other argument, and
        // the file it produces is tagged with the content's trust level so
        // a later step that reads or runs it still hits the gate.
        let mut gate_ids = if tool_name == "file_write" {
            contributing_ids_excluding(arguments, ctx, &["content"])
        } else {
            contributing_ids.clone()
        };

        // Pull in the provenance of any workspace path the call mentions
        // directly (not just `${variable}` references), so a tool call
        // that reads back a just-written file by its literal path still
        // hits the trust gate. Skip this for file_write itself: it only
        // ever mentions its own destination path, which it is about to
        // overwrite, not read.
        if tool_name != "file_write" {
            for path in crate::tools::referenced_paths(tool_name, &resolved_args) {
                if let Ok(Some(writer_id)) = self.provenance.get_file_writer(&path) {
                    gate_ids.push(writer_id);
                }
            }
        }

        let safe = match self.provenance.is_trust_safe_for_execution(&gate_ids) {
            Ok(safe) => safe,
            Err(sentinel_store::ProvenanceStoreError::UnknownDataId) => {
                return Err((
                    TaskStatus::Blocked,
                    "provenance_unknown_ancestor: trust gate could not verify every derivation ancestor".to_string(),
                ));
            }
            Err(error) => return Err((TaskStatus::Error, error.to_string())),
        };
        if !safe {
            return Err((
                TaskStatus::Blocked,
                "provenance_trust_gate: one or more arguments derive from untrusted data".to_string(),
            ));
        }

        let executor = ToolExecutor::new(&self.policy, &self.provenance);
        let input_data_id = contributing_ids.first().copied();
        let outcome = executor
            .execute(tool_name, &resolved_args, input_data_id)
            .map_err(sentinel_error_to_status)?;

        let (text, data_id) = match outcome {
            ToolOutcome::FileRead { content, data_id, .. } => (content, data_id),
            ToolOutcome::FileWritten { path } => {
                let text = format!("wrote {path}");
                let id = self
                    .provenance
                    .create_tagged_data(DataSource::Tool, TrustLevel::Trusted, text.clone(), contributing_ids.clone())
                    .map_err(|error| (TaskStatus::Error, error.to_string()))?;
                (text, id)
            }
            ToolOutcome::DirectoryCreated { path } => {
                let text = format!("created {path}");
                let id = self
                    .provenance
                    .create_tagged_data(DataSource::Tool, TrustLevel::Trusted, text.clone(), contributing_ids.clone())
                    .map_err(|error| (TaskStatus::Error, error.to_string()))?;
                (text, id)
            }
            ToolOutcome::DirectoryListed { entries, .. } => {
                let text = entries.join("\n");
                let id = self
                    .provenance
                    .create_tagged_data(DataSource::Tool, TrustLevel::Trusted, text.clone(), contributing_ids.clone())
                    .map_err(|error| (TaskStatus::Error, error.to_string()))?;
                (text, id)
            }
            ToolOutcome::CommandOutput { stdout, .. } => {
                let id = self
                    .provenance
                    .create_tagged_data(DataSource::Tool, TrustLevel::Trusted, stdout.clone(), contributing_ids.clone())
                    .map_err(|error| (TaskStatus::Error, error.to_string()))?;
                (stdout, id)
            }
        };

        if let Some(name) = output_variable {
            ctx.insert(name.clone(), BoundValue { data_id, text: text.clone() });
        }
        Ok(text)
    }

    fn record_turn(
        &self,
        source_key: &str,
        request_text: &str,
        outcome: TurnOutcome,
        risk_breakdown: sentinel_types::RiskBreakdown,
        added_risk: f64,
        now: i64,
    ) {
        let turn = Turn { request_text: request_text.to_string(), outcome, risk_breakdown, timestamp_unix_ms: now };
        let _ = self.session_store.append_turn(source_key, turn, added_risk, now);
    }

    fn publish(&self, task_id: &TaskId, event: &str, payload: Value) {
        self.event_bus.publish(&format!("task.{task_id}.{event}"), payload);
    }

    fn error_result(&self, task_id: TaskId, plan_summary: Option<String>, reason: String) -> TaskResult {
        TaskResult {
            task_id: task_id.to_string(),
            status: TaskStatus::Error,
            plan_summary,
            step_results: vec![],
            conversation: ConversationSnapshot { action: ConversationAction::Allow, warnings: vec![], risk_score: 0.0 },
            approval_id: None,
            reason: Some(reason),
        }
    }
}

fn status_to_outcome(status: TaskStatus) -> TurnOutcome {
    match status {
        TaskStatus::Success => TurnOutcome::Executed,
        TaskStatus::Blocked => TurnOutcome::Blocked,
        TaskStatus::Refused => TurnOutcome::Refused,
        TaskStatus::AwaitingApproval => TurnOutcome::Allowed,
        TaskStatus::Error => TurnOutcome::Failed,
    }
}

/// Routes any leaf error through the unified [`SentinelError`] surface so
/// the block-vs-error split is decided in one place rather than once per
/// call site.
fn sentinel_error_to_status<E: Into<SentinelError>>(error: E) -> (TaskStatus, String) {
    let error = error.into();
    let message = error.to_string();
    match error {
        SentinelError::Blocked(_) => (TaskStatus::Blocked, message),
        _ => (TaskStatus::Error, message),
    }
}

fn pipeline_error_to_status(error: PipelineError) -> (TaskStatus, String) {
    sentinel_error_to_status(error)
}

fn validate_output_format(text: &str, format: OutputFormat) -> Result<String, (TaskStatus, String)> {
    match format {
        OutputFormat::None => Ok(text.to_string()),
        OutputFormat::Json => {
            serde_json::from_str::<Value>(text)
                .map(|_| text.to_string())
                .map_err(|error| (TaskStatus::Error, format!("worker response was not valid JSON: {error}")))
        }
        OutputFormat::Tagged => {
            let start = text.find("<RESPONSE>").map(|i| i + "<RESPONSE>".len());
            let end = text.find("</RESPONSE>");
            match (start, end) {
                (Some(start), Some(end)) if start <= end => Ok(text[start..end].trim().to_string()),
                _ => Err((TaskStatus::Error, "worker response missing <RESPONSE> tags".to_string())),
            }
        }
    }
}

/// Substitutes whole-string `${name}` references in a JSON argument tree
/// with the bound variable's text, collecting every contributing data id
/// along the way so the caller can run the trust gate over them.
fn resolve_arguments(arguments: &Value, ctx: &ExecutionContext) -> (Value, Vec<DataId>) {
    let mut ids = Vec::new();
    let resolved = resolve_value(arguments, ctx, &mut ids);
    (resolved, ids)
}

/// Like [`resolve_arguments`], but only collects contributing data ids from
/// top-level object keys not in `exclude_keys`; used to keep a tool's
/// inert data argument (e.g. `file_write`'s `content`) out of the trust
/// gate while still tracking it for provenance tagging.
fn contributing_ids_excluding(arguments: &Value, ctx: &ExecutionContext, exclude_keys: &[&str]) -> Vec<DataId> {
    let mut ids = Vec::new();
    if let Some(map) = arguments.as_object() {
        for (key, value) in map {
            if exclude_keys.contains(&key.as_str()) {
                continue;
            }
            resolve_value(value, ctx, &mut ids);
        }
    }
    ids
}

fn resolve_value(value: &Value, ctx: &ExecutionContext, ids: &mut Vec<DataId>) -> Value {
    match value {
        Value::String(s) => {
            if let Some(name) = sentinel_types::variable_ref_name(s) {
                if let Some(bound) = ctx.get(name) {
                    ids.push(bound.data_id);
                    return Value::String(bound.text.clone());
                }
            }
            value.clone()
        }
        Value::Array(items) => Value::Array(items.iter().map(|item| resolve_value(item, ctx, ids)).collect()),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, value) in map {
                out.insert(key.clone(), resolve_value(value, ctx, ids));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn summarize_history(session: &sentinel_types::Session) -> String {
    session
        .turns
        .iter()
        .rev()
        .take(5)
        .map(|turn| format!("{:?}: {}", turn.outcome, turn.request_text))
        .collect::<Vec<_>>()
        .join("\n")
}
