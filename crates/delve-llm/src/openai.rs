//! OpenAI-compatible chat-completions backend.
//!
//! Serves OpenAI, Groq, Ollama and anything else that speaks
//! `/chat/completions`. Requests are translated from the Messages shape:
//! the system prompt becomes a leading message, assistant tool calls become
//! `tool_calls`, and every tool result becomes its own `tool` message.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

use crate::backend::{LlmBackend, http_client, send_json, with_retry};
use crate::error::{LlmError, Result};
use crate::types::{
    CompletionRequest, CompletionResponse, ContentBlock, Role, StopReason, ToolChoice, Usage,
};

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const GROQ_BASE: &str = "https://api.groq.com/openai/v1";
const OLLAMA_BASE: &str = "http://localhost:11434/v1";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Local servers such as Ollama take no key.
    pub api_key: Option<String>,
    pub base_url: String,
    /// Overrides the model named in each request.
    pub model: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// Reported by [`LlmBackend::name`] and in retry logs.
    pub name: String,
}

impl OpenAiConfig {
    fn hosted(name: &str, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            model: None,
            timeout: Duration::from_secs(300),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            name: name.into(),
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::hosted("openai", OPENAI_BASE, Some(api_key.into()))
    }

    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::hosted("groq", GROQ_BASE, Some(api_key.into()))
    }

    pub fn ollama() -> Self {
        Self {
            // local inference is slow on modest hardware
            timeout: Duration::from_secs(600),
            ..Self::hosted("ollama", OLLAMA_BASE, None)
        }
    }

    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..self
        }
    }

    pub fn with_model(self, model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..self
        }
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    pub fn with_retry_backoff(self, retry_backoff: Duration) -> Self {
        Self {
            retry_backoff,
            ..self
        }
    }
}

pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            config,
        })
    }

    fn completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    async fn send(&self, body: &ChatRequest) -> Result<CompletionResponse> {
        let mut builder = self
            .client
            .post(self.completions_url())
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let reply: ChatResponse = send_json(builder.json(body)).await?;
        reply.try_into()
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = self.config.model.as_deref().unwrap_or(&request.model);
        let body = ChatRequest::translate(&request, model)?;

        tracing::debug!(
            backend = %self.config.name,
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Sending OpenAI-compatible request"
        );
        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            &self.config.name,
            || self.send(&body),
        )
        .await
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn supports_native_tools(&self) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Debug, Default, Serialize)]
struct ChatMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON text, not an object.
    arguments: String,
}

fn function_kind() -> String {
    "function".into()
}

impl ChatRequest {
    fn translate(request: &CompletionRequest, model: &str) -> Result<Self> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: Some(system.clone()),
                ..Default::default()
            });
        }

        for message in &request.messages {
            let mut turn = ChatMessage {
                role: match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                ..Default::default()
            };
            let mut text = String::new();

            for block in message.content.blocks() {
                match block {
                    ContentBlock::Text { text: t } => text.push_str(&t),
                    ContentBlock::ToolUse { id, name, input } => {
                        turn.tool_calls.push(WireToolCall {
                            id,
                            kind: function_kind(),
                            function: WireFunctionCall {
                                name,
                                arguments: serde_json::to_string(&input)?,
                            },
                        })
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => messages.push(ChatMessage {
                        role: "tool",
                        content: Some(content),
                        tool_call_id: Some(tool_use_id),
                        ..Default::default()
                    }),
                }
            }

            if !text.is_empty() {
                turn.content = Some(text);
            }
            // a turn made only of tool results has already been emitted
            if turn.content.is_some() || !turn.tool_calls.is_empty() {
                messages.push(turn);
            }
        }

        let tools = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.input_schema,
                    }
                })
            })
            .collect();

        let tool_choice = request.tool_choice.as_ref().map(|choice| match choice {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::Any => json!("required"),
            ToolChoice::None => json!("none"),
            ToolChoice::Tool { name } => json!({"type": "function", "function": {"name": name}}),
        });

        Ok(Self {
            model: model.to_string(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools,
            tool_choice,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    id: String,
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl TryFrom<ChatResponse> for CompletionResponse {
    type Error = LlmError;

    fn try_from(response: ChatResponse) -> Result<Self> {
        let Some(choice) = response.choices.into_iter().next() else {
            return Err(LlmError::Backend("response contained no choices".into()));
        };

        let mut content: Vec<ContentBlock> = choice
            .message
            .content
            .filter(|text| !text.is_empty())
            .map(ContentBlock::text)
            .into_iter()
            .collect();
        for call in choice.message.tool_calls {
            // unparseable arguments arrive as null and fail tool validation
            let input = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
            content.push(ContentBlock::tool_use(call.id, call.function.name, input));
        }

        let stop_reason = match choice.finish_reason.as_deref() {
            Some("tool_calls") => StopReason::ToolUse,
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        };
        let usage = response
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(CompletionResponse::new(
            response.id,
            response.model,
            content,
            stop_reason,
            usage,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, ToolDefinition, ToolResultBlock};

    #[test]
    fn test_provider_presets() {
        let openai = OpenAiConfig::openai("test-key");
        assert_eq!(openai.base_url, OPENAI_BASE);
        assert_eq!(openai.name, "openai");

        let groq = OpenAiConfig::groq("test-key");
        assert_eq!(groq.base_url, GROQ_BASE);
        assert_eq!(groq.api_key.as_deref(), Some("test-key"));

        let ollama = OpenAiConfig::ollama();
        assert!(ollama.api_key.is_none());
        assert_eq!(ollama.timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_completions_url_trims_slash() {
        let config = OpenAiConfig::openai("k").with_base_url("http://local/v1/");
        let backend = OpenAiBackend::new(config).unwrap();
        assert_eq!(backend.completions_url(), "http://local/v1/chat/completions");
    }

    #[test]
    fn test_forced_tool_choice() {
        let request = CompletionRequest::new("gpt-4o", vec![Message::user("hi")], 100)
            .with_system("persona")
            .with_tools(vec![ToolDefinition::new(
                "queries",
                "Return queries",
                json!({"type": "object"}),
            )])
            .with_tool_choice(ToolChoice::Tool {
                name: "queries".into(),
            });

        let wire = ChatRequest::translate(&request, "gpt-4o").unwrap();
        assert_eq!(wire.messages[0].role, "system");
        assert_eq!(wire.messages[1].role, "user");
        assert_eq!(wire.tools[0]["function"]["name"], "queries");
        assert_eq!(
            wire.tool_choice,
            Some(json!({"type": "function", "function": {"name": "queries"}}))
        );
    }

    #[test]
    fn test_tool_turns_translate() {
        let request = CompletionRequest::new(
            "ignored",
            vec![
                Message::user("research rust"),
                Message::assistant_blocks(vec![ContentBlock::tool_use(
                    "call_1",
                    "search",
                    json!({"query": "rust"}),
                )]),
                Message::tool_results(vec![ToolResultBlock::success("call_1", "[]")]),
            ],
            100,
        );

        let wire = ChatRequest::translate(&request, "gpt-4o-mini").unwrap();
        assert_eq!(wire.model, "gpt-4o-mini");
        assert_eq!(wire.messages.len(), 3);
        assert_eq!(wire.messages[1].role, "assistant");
        assert!(wire.messages[1].content.is_none());
        assert_eq!(wire.messages[1].tool_calls[0].function.arguments, r#"{"query":"rust"}"#);
        assert_eq!(wire.messages[2].role, "tool");
        assert_eq!(wire.messages[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_response_with_tool_calls() {
        let body = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "evaluate", "arguments": "{}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        });

        let wire: ChatResponse = serde_json::from_value(body).unwrap();
        let response = CompletionResponse::try_from(wire).unwrap();
        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(response.tool_uses()[0].name, "evaluate");
        assert_eq!(response.usage, Usage::new(12, 3));
    }

    #[test]
    fn test_response_without_choices_is_error() {
        let wire: ChatResponse =
            serde_json::from_value(json!({"id": "x", "model": "m", "choices": []})).unwrap();
        assert!(CompletionResponse::try_from(wire).is_err());
    }
}
