//! Anthropic Messages API backend.
//!
//! [`CompletionRequest`] already has the Messages API shape, so requests go
//! out as-is. Responses drop block types we do not model (thinking, etc).

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::Deserialize;
use std::time::Duration;

use crate::backend::{LlmBackend, http_client, send_json, with_retry};
use crate::error::Result;
use crate::types::{CompletionRequest, CompletionResponse, ContentBlock, StopReason, Usage};

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const DEFAULT_API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    /// Sent as the `anthropic-version` header.
    pub api_version: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.into(),
            api_version: DEFAULT_API_VERSION.into(),
            // report synthesis on large models can run for minutes
            timeout: Duration::from_secs(300),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
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

pub struct AnthropicBackend {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            config,
        })
    }

    fn messages_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/v1/messages")
    }

    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let builder = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .header(header::CONTENT_TYPE, "application/json")
            .json(request);
        let message: WireMessage = send_json(builder).await?;
        Ok(message.into())
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending Anthropic request"
        );
        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            self.name(),
            || self.send(&request),
        )
        .await
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn supports_native_tools(&self) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct WireMessage {
    id: String,
    model: String,
    content: Vec<WireBlock>,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unsupported,
}

impl From<WireMessage> for CompletionResponse {
    fn from(message: WireMessage) -> Self {
        let mut content = Vec::with_capacity(message.content.len());
        for block in message.content {
            match block {
                WireBlock::Text { text } => content.push(ContentBlock::text(text)),
                WireBlock::ToolUse { id, name, input } => {
                    content.push(ContentBlock::tool_use(id, name, input))
                }
                WireBlock::Unsupported => {}
            }
        }

        let stop_reason = message.stop_reason.map(|reason| match reason.as_str() {
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        });

        CompletionResponse {
            id: message.id,
            content,
            model: message.model,
            stop_reason,
            usage: message.usage,
        }
    }
}
