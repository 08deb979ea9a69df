use crate::error::{LlmError, Result};
use crate::types::{ChatMessage, ChatResponse, StreamChunk, ToolDefinition, Usage};
use async_trait::async_trait;
use futures_util::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Object-safe chat interface the agent loop runs against. Provider
/// adapters implement this outside the workspace; the dev runtime and
/// tests use [`ScriptedModel`].
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model(&self) -> &str;

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse>;

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChunkStream>;
}

/// Tool names must satisfy the strictest provider constraint so one
/// toolset works everywhere: `^[a-zA-Z0-9_-]+$`, non-empty.
pub fn validate_tool_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LlmError::InvalidInput("tool name is empty".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(LlmError::InvalidInput(format!(
            "tool name {name:?} contains characters outside [a-zA-Z0-9_-]"
        )));
    }
    Ok(())
}

/// Deterministic model that replays a queue of canned responses, then
/// answers any further turn with a plain "done" message. Streaming
/// replays the same response as chunks.
pub struct ScriptedModel {
    model: String,
    responses: Mutex<VecDeque<ChatResponse>>,
}

impl ScriptedModel {
    pub fn new(responses: impl IntoIterator<Item = ChatResponse>) -> Self {
        Self {
            model: "scripted".to_string(),
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }

    pub fn empty() -> Self {
        Self::new([])
    }

    fn next_response(&self) -> ChatResponse {
        let mut queue = self.responses.lock().expect("scripted model lock");
        let remaining = queue.len();
        tracing::debug!(remaining, "scripted model serving response");
        queue.pop_front().unwrap_or_else(|| ChatResponse {
            message: ChatMessage::assistant("done"),
            usage: Usage::default(),
            finish_reason: "stop".to_string(),
        })
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        Ok(self.next_response())
    }

    async fn chat_stream(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ChunkStream> {
        let response = self.next_response();
        let mut chunks = Vec::new();
        if !response.message.content.is_empty() {
            chunks.push(Ok(StreamChunk::Delta {
                content: response.message.content.clone(),
            }));
        }
        for call in &response.message.tool_calls {
            chunks.push(Ok(StreamChunk::ToolCallStart {
                id: call.id.clone(),
                name: call.name.clone(),
            }));
            chunks.push(Ok(StreamChunk::ToolCallDelta {
                arguments: call.arguments.clone(),
            }));
        }
        chunks.push(Ok(StreamChunk::Done {
            usage: response.usage,
        }));
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }
}

/// Builds a tool-calling response for scripted conversations.
pub fn scripted_tool_call(
    call_id: impl Into<String>,
    tool_name: impl Into<String>,
    arguments: serde_json::Value,
) -> ChatResponse {
    ChatResponse {
        message: ChatMessage {
            role: crate::types::Role::Assistant,
            content: String::new(),
            tool_calls: vec![crate::types::ToolCall {
                id: call_id.into(),
                name: tool_name.into(),
                arguments: arguments.to_string(),
            }],
            tool_call_id: None,
        },
        usage: Usage::default(),
        finish_reason: "tool_calls".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn tool_names_are_validated() {
        assert!(validate_tool_name("create_task").is_ok());
        assert!(validate_tool_name("board.create").is_err());
        assert!(validate_tool_name("").is_err());
    }

    #[tokio::test]
    async fn scripted_model_replays_then_stops() {
        let model = ScriptedModel::new([scripted_tool_call(
            "tc1",
            "list_tasks",
            serde_json::json!({}),
        )]);

        let first = model.chat(&[], &[]).await.unwrap();
        assert_eq!(first.message.tool_calls.len(), 1);
        assert_eq!(first.message.tool_calls[0].name, "list_tasks");

        let second = model.chat(&[], &[]).await.unwrap();
        assert!(second.message.tool_calls.is_empty());
        assert_eq!(second.message.content, "done");
    }

    #[tokio::test]
    async fn scripted_stream_ends_with_done() {
        let model = ScriptedModel::empty();
        let mut stream = model.chat_stream(&[], &[]).await.unwrap();
        let mut last = None;
        while let Some(chunk) = stream.next().await {
            last = Some(chunk.unwrap());
        }
        assert!(matches!(last, Some(StreamChunk::Done { .. })));
    }
}
