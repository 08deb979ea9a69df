use crate::error::{Result, ToolError};
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use bd_core::models::{AccessLevel, ActionContext};
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ToolCategory {
    Query,
    Write,
    Destructive,
    Delegation,
}

impl ToolCategory {
    pub fn is_destructive(self) -> bool {
        matches!(self, ToolCategory::Destructive)
    }
}

pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
    pub category: ToolCategory,
    /// Minimum access level the permission gate requires on untrusted
    /// dispatches.
    pub required_level: AccessLevel,
}

/// Result of one tool execution. Mutating tools must have built their
/// [`Snapshot`] from pre-mutation state; query tools leave it `None`.
#[derive(Debug)]
pub struct ToolExecution {
    pub output: serde_json::Value,
    pub snapshot: Option<Snapshot>,
    pub affected_entity_ids: Vec<String>,
}

impl ToolExecution {
    pub fn query(output: serde_json::Value) -> Self {
        Self {
            output,
            snapshot: None,
            affected_entity_ids: Vec::new(),
        }
    }
}

#[async_trait]
pub trait BoardTool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution>;
}

pub fn to_llm_tool_def(tool: &dyn BoardTool) -> bd_llm::ToolDefinition {
    let spec = tool.spec();
    bd_llm::ToolDefinition {
        name: spec.name,
        description: spec.description,
        parameters: spec.parameters_schema,
    }
}

pub(crate) fn require_string(args: &serde_json::Value, key: &str) -> Result<String> {
    let Some(v) = args.get(key) else {
        return Err(ToolError::InvalidArguments(format!("missing key: {key}")));
    };
    match v {
        serde_json::Value::String(s) => Ok(s.clone()),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

pub(crate) fn optional_string(args: &serde_json::Value, key: &str) -> Result<Option<String>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s.clone())),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

pub(crate) fn require_uuid(args: &serde_json::Value, key: &str) -> Result<Uuid> {
    let raw = require_string(args, key)?;
    Uuid::parse_str(raw.trim())
        .map_err(|_| ToolError::InvalidArguments(format!("key {key} must be a uuid, got {raw:?}")))
}

pub(crate) fn optional_i64(args: &serde_json::Value, key: &str) -> Result<Option<i64>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => n.as_i64().map(Some).ok_or_else(|| {
            ToolError::InvalidArguments(format!("key {key} must be an integer"))
        }),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be an integer, got {other:?}"
        ))),
    }
}

pub(crate) fn require_i64(args: &serde_json::Value, key: &str) -> Result<i64> {
    optional_i64(args, key)?
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing key: {key}")))
}
