//! The planner's output: an ordered list of typed steps.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output-format constraint the orchestrator validates an `LLMTask`'s
/// response against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    None,
    Json,
    Tagged,
}

/// One step of a [`Plan`]. A tagged union instead of virtual dispatch, so
/// every step kind a plan can contain is enumerable at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanStep {
    LlmTask {
        prompt_template: String,
        /// Names of prior steps' output variables this step reads.
        #[serde(default)]
        input_variables: Vec<String>,
        #[serde(default)]
        output_variable: Option<String>,
        #[serde(default)]
        output_format: OutputFormat,
        #[serde(default)]
        expects_code: bool,
    },
    ToolCall {
        tool_name: String,
        /// Structured arguments; string values of the form `${step_name}`
        /// are variable references resolved against prior steps' outputs.
        arguments: Value,
        #[serde(default)]
        output_variable: Option<String>,
    },
}

impl PlanStep {
    #[must_use]
    pub fn output_variable(&self) -> Option<&str> {
        match self {
            Self::LlmTask { output_variable, .. } | Self::ToolCall { output_variable, .. } => {
                output_variable.as_deref()
            }
        }
    }
}

/// An ordered sequence of steps plus a human-readable summary, as returned
/// by the planner client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub summary: String,
    pub steps: Vec<PlanStep>,
}

/// Why a [`Plan`] failed validation.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PlanValidationError {
    #[error("step {step_index} references undeclared variable `{name}`")]
    UndeclaredVariable { step_index: usize, name: String },
    #[error("step {step_index} references unknown tool `{tool_name}`")]
    UnknownTool { step_index: usize, tool_name: String },
    #[error("plan has no steps")]
    Empty,
}

impl Plan {
    /// Validate that every variable reference resolves to a prior step's
    /// declared output, and every referenced tool is in `known_tools`.
    pub fn validate(&self, known_tools: &HashSet<String>) -> Result<(), PlanValidationError> {
        if self.steps.is_empty() {
            return Err(PlanValidationError::Empty);
        }

        let mut declared: HashSet<&str> = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            let referenced: Vec<&str> = match step {
                PlanStep::LlmTask { input_variables, .. } => {
                    input_variables.iter().map(String::as_str).collect()
                }
                PlanStep::ToolCall {
                    tool_name,
                    arguments,
                    ..
                } => {
                    if !known_tools.contains(tool_name.as_str()) {
                        return Err(PlanValidationError::UnknownTool {
                            step_index: index,
                            tool_name: tool_name.clone(),
                        });
                    }
                    collect_variable_refs(arguments)
                }
            };

            for name in referenced {
                if !declared.contains(name) {
                    return Err(PlanValidationError::UndeclaredVariable {
                        step_index: index,
                        name: name.to_string(),
                    });
                }
            }

            if let Some(out) = step.output_variable() {
                declared.insert(out);
            }
        }

        Ok(())
    }
}

/// Extract `${name}` style variable references from a JSON argument tree.
fn collect_variable_refs(value: &Value) -> Vec<&str> {
    let mut refs = Vec::new();
    collect_variable_refs_into(value, &mut refs);
    refs
}

fn collect_variable_refs_into<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => {
            if let Some(name) = variable_ref_name(s) {
                out.push(name);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_variable_refs_into(item, out);
            }
        }
        Value::Object(map) => {
            for value in map.values() {
                collect_variable_refs_into(value, out);
            }
        }
        _ => {}
    }
}

/// A whole-string argument of the form `${step_name}` is a variable
/// reference; anything else (including text that merely contains `${...}`
/// as a substring) is treated as literal content.
#[must_use]
pub fn variable_ref_name(s: &str) -> Option<&str> {
    s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}'))
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::None
    }
}
