use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

// ── Chat messages ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Must match a registered tool name.
    pub name: String,
    /// Structured arguments as the model produced them.
    #[serde(default)]
    pub args: Value,
}

/// What came back from executing one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOutcome {
    Payload(Value),
    Error(String),
}

/// Result paired one-to-one with a [`ToolCall`], in call order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub name: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn payload(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            outcome: ToolOutcome::Payload(payload),
        }
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: ToolOutcome::Error(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error(_))
    }

    /// Wire text fed back to the model as the tool-role message body.
    pub fn render(&self) -> String {
        match &self.outcome {
            ToolOutcome::Payload(value) => value.to_string(),
            ToolOutcome::Error(message) => {
                serde_json::json!({ "error": message }).to_string()
            }
        }
    }
}

/// One message in a provider conversation.  Tool-call requests and their
/// results travel as dedicated messages so the transcript the model sees
/// matches what actually happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    /// Assistant message carrying tool-call requests instead of text.
    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: String::new(),
            tool_calls: calls,
            tool_results: Vec::new(),
        }
    }

    /// Tool-role message carrying one batch of results, in call order.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: String::new(),
            tool_calls: Vec::new(),
            tool_results: results,
        }
    }
}

// ── Completion request / response ─────────────────────────────────────────────

/// Sampling knobs forwarded to the provider when set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system_instruction: String,
    pub messages: Vec<ChatMessage>,
    /// Tool catalog in the provider's wire format, already serialized.
    /// `None` forces a plain text reply.
    pub tool_catalog: Option<Value>,
    pub generation: Option<GenerationConfig>,
}

/// Either text, tool calls, or (from a misbehaving model) neither.
/// Callers treat an empty response as "nothing useful came back".
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl CompletionResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls: calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ── Provider trait ────────────────────────────────────────────────────────────

/// One blocking round trip to a generation backend.  Implementations map
/// their failure modes onto [`ProviderError`] so the retry policy can
/// classify them.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;
}

// ── Tests ────────────────────────────────────────────────────────────────────
