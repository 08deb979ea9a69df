//! Bounded agent-to-agent delegation.
//!
//! A running agent may spawn one constrained sub-agent per call: query
//! and non-destructive write tools only, a fixed wall-clock budget, and
//! a depth counter that stops the delegation tool from being offered at
//! all once the cap is reached. Sub-agent failures and timeouts are
//! converted into structured results — they never abort the parent's
//! turn as errors.

use crate::agent::AgentRunner;
use bd_core::board::BoardStore;
use bd_core::models::{AccessLevel, ActionContext, DelegationContext};
use bd_tools::factory::{build_toolset, CapabilityProfile};
use bd_tools::proposal::ProposalStore;
use bd_tools::traits::{BoardTool, ToolCategory, ToolExecution, ToolSpec};
use bd_tools::{Result, ToolError};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const MAX_DELEGATION_DEPTH: u8 = 2;
pub const DELEGATE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DELEGATE_RESPONSE_MAX_CHARS: usize = 4000;

const PERSONAS: &[(&str, &str)] = &[
    (
        "triage",
        "You triage incoming work: inspect the board, group related tasks, and file what is missing.",
    ),
    (
        "summarizer",
        "You summarize board state: read, never write unless explicitly instructed.",
    ),
    (
        "planner",
        "You break a goal into concrete tasks on the board.",
    ),
];

fn persona_prompt(name: &str) -> Option<&'static str> {
    PERSONAS
        .iter()
        .find(|(persona, _)| *persona == name)
        .map(|(_, prompt)| *prompt)
}

/// Returns the delegation tool for this context, or `None` at the depth
/// cap — the agent loop must simply omit the tool, not error.
pub fn delegation_tool(
    runner: Arc<AgentRunner>,
    board: Arc<dyn BoardStore>,
    proposals: Arc<ProposalStore>,
    context: &DelegationContext,
) -> Option<Arc<dyn BoardTool>> {
    if context.depth >= MAX_DELEGATION_DEPTH {
        return None;
    }
    Some(Arc::new(DelegateTool {
        runner,
        board,
        proposals,
        context: context.clone(),
    }))
}

struct DelegateTool {
    runner: Arc<AgentRunner>,
    board: Arc<dyn BoardStore>,
    proposals: Arc<ProposalStore>,
    context: DelegationContext,
}

#[async_trait]
impl BoardTool for DelegateTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "delegate".to_string(),
            description: format!(
                "Hand a sub-task to a specialist sub-agent. Personas: {}.",
                PERSONAS
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "persona": { "type": "string" },
                    "instruction": { "type": "string" }
                },
                "required": ["persona", "instruction"]
            }),
            category: ToolCategory::Delegation,
            required_level: AccessLevel::Member,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _context: &ActionContext,
    ) -> Result<ToolExecution> {
        let persona = arguments
            .get("persona")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing key: persona".to_string()))?;
        let instruction = arguments
            .get("instruction")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                ToolError::InvalidArguments("missing or empty key: instruction".to_string())
            })?;
        let Some(persona_text) = persona_prompt(persona) else {
            return Err(ToolError::InvalidArguments(format!(
                "unknown persona {persona:?}"
            )));
        };

        let child = self.context.child(persona);
        let mut tools = build_toolset(
            CapabilityProfile::delegate(),
            self.board.clone(),
            self.proposals.clone(),
        );
        // Recursion happens only through the depth counter; at the cap
        // the child simply has no delegate tool.
        if let Some(tool) = delegation_tool(
            self.runner.clone(),
            self.board.clone(),
            self.proposals.clone(),
            &child,
        ) {
            tools.push(tool);
        }

        // Explicit markers so the sub-agent cannot mistake surrounding
        // text for its instruction.
        let framed = format!(
            "{persona_text}\n\n=== BEGIN DELEGATED INSTRUCTION ===\n{instruction}\n=== END DELEGATED INSTRUCTION ===\n\nCarry out only the instruction between the markers."
        );

        tracing::info!(persona, depth = child.depth, "delegating to sub-agent");
        let run = tokio::time::timeout(
            DELEGATE_TIMEOUT,
            self.runner.run(&tools, &child.action, &framed, None),
        )
        .await;

        let output = match run {
            Err(_) => {
                tracing::warn!(persona, "delegate timed out");
                json!({
                    "status": "timeout",
                    "persona": persona,
                    "message": format!("delegate timed out after {}s", DELEGATE_TIMEOUT.as_secs()),
                })
            }
            Ok(Err(e)) => {
                tracing::warn!(persona, error = %e, "delegate failed");
                json!({
                    "status": "failed",
                    "persona": persona,
                    "error": e.to_string(),
                })
            }
            Ok(Ok(result)) => {
                let response = truncate_chars(&result.text, DELEGATE_RESPONSE_MAX_CHARS);
                json!({
                    "status": "completed",
                    "persona": persona,
                    "response": response,
                    "executed_tools": result
                        .steps
                        .iter()
                        .map(|s| json!({ "tool": s.tool_name, "status": s.status }))
                        .collect::<Vec<_>>(),
                })
            }
        };

        Ok(ToolExecution::query(output))
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}\n...[delegate response truncated]")
}
