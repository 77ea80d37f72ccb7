//! Backend trait, the HTTP plumbing and retry policy shared by providers,
//! and a scriptable mock.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, header};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{LlmError, RateLimitInfo, Result};
use crate::types::{CompletionRequest, CompletionResponse, ContentBlock, StopReason, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// HTTP + Retry
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Both Anthropic and OpenAI wrap failures as `{"error": {"message": ...}}`.
#[derive(serde::Deserialize)]
struct ErrorEnvelope {
    error: ErrorMessage,
}

#[derive(serde::Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Send a prepared request and decode a successful JSON body.
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        let body = response.text().await?;
        return serde_json::from_str(&body).map_err(|e| LlmError::Serialization(e.to_string()));
    }

    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => envelope.error.message,
        Err(_) => format!("HTTP {}: {}", status, body),
    };

    Err(match status.as_u16() {
        401 | 403 => LlmError::Auth(format!("Authentication failed: {}", message)),
        429 => LlmError::RateLimit(RateLimitInfo::from_response(&message, retry_after.as_deref())),
        // includes Anthropic's 529 "overloaded"
        500..=599 => LlmError::Network(format!("Server error: {}", message)),
        _ => LlmError::Backend(message),
    })
}

/// Run `f` until it succeeds, fails for good, or `max_retries` is spent.
///
/// Backoff doubles from `initial_backoff`; a provider's `retry_after` takes
/// its place for that attempt.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let err = match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt > max_retries => return Err(e),
            Err(e) => e,
        };
        let wait = err.retry_after().unwrap_or(backoff);
        tracing::warn!(
            backend = backend_name,
            attempt,
            max_retries,
            backoff_ms = wait.as_millis() as u64,
            error = %err,
            "Request failed, retrying"
        );
        tokio::time::sleep(wait).await;
        backoff *= 2;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A text-generation provider.
///
/// Structured output and the research tool loop are both built on native
/// tool calling, so every backend used for research must support it.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    fn name(&self) -> &str;

    fn supports_native_tools(&self) -> bool {
        false
    }
}

pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

type Handler = Box<dyn Fn(&CompletionRequest) -> Result<CompletionResponse> + Send + Sync>;

enum Script {
    Queue(VecDeque<CompletionResponse>),
    Handler(Handler),
}

/// A mock backend for testing.
///
/// Either replays a fixed queue of responses in order, or answers each
/// request through a handler closure. The handler form is what research
/// tests use, since the order of calls depends on the recursion.
pub struct MockBackend {
    name: String,
    script: Mutex<Script>,
    request_log: Mutex<Vec<CompletionRequest>>,
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("name", &self.name)
            .field("requests", &self.request_count())
            .finish()
    }
}

impl MockBackend {
    /// Create a new mock backend with the given responses.
    ///
    /// Responses are returned in order. If more requests are made than
    /// responses available, an error is returned.
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            script: Mutex::new(Script::Queue(responses.into())),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock backend that answers every request with `handler`.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<CompletionResponse> + Send + Sync + 'static,
    {
        Self {
            name: "mock".to_string(),
            script: Mutex::new(Script::Handler(Box::new(handler))),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock backend with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![text_response(text)])
    }

    /// Get all requests that were made to this backend.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().map(|log| log.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| LlmError::Internal("MockBackend: script lock poisoned".to_string()))?;

        let response = match &mut *script {
            Script::Queue(queue) => queue.pop_front().ok_or_else(|| {
                LlmError::Backend("MockBackend: no more responses available".to_string())
            }),
            Script::Handler(handler) => handler(&request),
        };

        if let Ok(mut log) = self.request_log.lock() {
            log.push(request);
        }

        response
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_native_tools(&self) -> bool {
        true
    }
}

/// A plain text response, for scripting mocks.
pub fn text_response(text: impl Into<String>) -> CompletionResponse {
    CompletionResponse::new(
        "mock_msg",
        "mock-model",
        vec![ContentBlock::text(text)],
        StopReason::EndTurn,
        Usage::new(10, 20),
    )
}

/// A response carrying a single tool call, for scripting mocks.
pub fn tool_call_response(
    id: impl Into<String>,
    name: impl Into<String>,
    input: serde_json::Value,
) -> CompletionResponse {
    CompletionResponse::new(
        "mock_msg",
        "mock-model",
        vec![ContentBlock::tool_use(id, name, input)],
        StopReason::ToolUse,
        Usage::new(10, 20),
    )
}
