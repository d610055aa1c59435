//! OpenAI-compatible chat-completions client.
//!
//! Talks to any endpoint speaking the `/chat/completions` dialect and maps
//! HTTP failures onto the [`ProviderError`] taxonomy so the retry policy can
//! make the right call.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::ProviderError;
use crate::message::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, GenerationProvider, ToolCall,
};

#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl HttpProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::Other(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn encode_request(&self, request: &CompletionRequest) -> Value {
        let mut messages: Vec<Value> = Vec::new();
        if !request.system_instruction.is_empty() {
            messages.push(json!({
                "role": "system",
                "content": request.system_instruction,
            }));
        }
        for message in &request.messages {
            encode_message(message, &mut messages);
        }

        let mut payload = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(catalog) = &request.tool_catalog {
            payload["tools"] = catalog.clone();
        }
        if let Some(generation) = &request.generation {
            if let Some(temperature) = generation.temperature {
                payload["temperature"] = json!(temperature);
            }
            if let Some(max_tokens) = generation.max_output_tokens {
                payload["max_tokens"] = json!(max_tokens);
            }
        }
        payload
    }
}

/// Tool-call ids are synthesized positionally; the engine pairs calls and
/// results by order, so `call_0`, `call_1`, … line up on both sides.
fn encode_message(message: &ChatMessage, out: &mut Vec<Value>) {
    match message.role {
        ChatRole::System => out.push(json!({ "role": "system", "content": message.content })),
        ChatRole::User => out.push(json!({ "role": "user", "content": message.content })),
        ChatRole::Assistant if message.tool_calls.is_empty() => {
            out.push(json!({ "role": "assistant", "content": message.content }));
        }
        ChatRole::Assistant => {
            let calls: Vec<Value> = message
                .tool_calls
                .iter()
                .enumerate()
                .map(|(index, call)| {
                    json!({
                        "id": format!("call_{index}"),
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.args.to_string(),
                        },
                    })
                })
                .collect();
            out.push(json!({
                "role": "assistant",
                "content": Value::Null,
                "tool_calls": calls,
            }));
        }
        ChatRole::Tool => {
            for (index, result) in message.tool_results.iter().enumerate() {
                out.push(json!({
                    "role": "tool",
                    "tool_call_id": format!("call_{index}"),
                    "name": result.name,
                    "content": result.render(),
                }));
            }
        }
    }
}

fn decode_response(body: &Value) -> Result<CompletionResponse, ProviderError> {
    let Some(message) = body.pointer("/choices/0/message") else {
        return Err(ProviderError::Other(format!(
            "malformed completion response: {body}"
        )));
    };

    let mut calls: Vec<ToolCall> = Vec::new();
    if let Some(raw_calls) = message.get("tool_calls").and_then(Value::as_array) {
        for raw in raw_calls {
            let Some(name) = raw.pointer("/function/name").and_then(Value::as_str) else {
                continue;
            };
            // Arguments usually arrive as a JSON string; keep them verbatim
            // when they don't parse.
            let args = match raw.pointer("/function/arguments") {
                Some(Value::String(text)) => serde_json::from_str(text)
                    .unwrap_or_else(|_| Value::String(text.clone())),
                Some(other) => other.clone(),
                None => Value::Null,
            };
            calls.push(ToolCall {
                name: name.to_string(),
                args,
            });
        }
    }
    if !calls.is_empty() {
        return Ok(CompletionResponse::tool_calls(calls));
    }

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToString::to_string);
    Ok(CompletionResponse {
        text,
        tool_calls: Vec::new(),
    })
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[async_trait]
impl GenerationProvider for HttpProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let endpoint = self.endpoint();
        let payload = self.encode_request(&request);
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tool_catalog.is_some(),
            "sending completion request"
        );

        let mut call = self.client.post(&endpoint).json(&payload);
        if !self.api_key.is_empty() {
            call = call.bearer_auth(&self.api_key);
        }

        let response = call.send().await.map_err(|err| {
            if err.is_timeout() || err.is_connect() {
                ProviderError::Transient(format!("request to {endpoint} failed: {err}"))
            } else {
                ProviderError::Other(format!("request to {endpoint} failed: {err}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                &clip(&body, 300),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| ProviderError::Other(format!("invalid completion body: {err}")))?;
        decode_response(&body)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
