//! LLM invocation interface for BoardPilot.
//!
//! The orchestration layer is written against the [`ChatModel`] trait;
//! concrete provider adapters live outside this workspace. A scripted
//! model is included for dev runtimes and tests.

mod client;
mod error;
mod types;

pub use client::{ChatModel, ChunkStream, ScriptedModel, scripted_tool_call, validate_tool_name};
pub use error::{LlmError, Result};
pub use types::{
    AgentStep, ChatMessage, ChatResponse, Role, StreamChunk, StepStatus, ToolCall, ToolDefinition,
    Usage,
};
