//! Text-generation client for Delve.
//!
//! Every provider implements [`LlmBackend`]. On top of it, [`Generator`]
//! binds a model and offers the single-call generation modes research needs:
//! free text, schema-conformant objects, and enumerated choices.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  Generator                               │
//! │  text() / object::<T>() / choice()       │
//! └──────────────────────────────────────────┘
//!                    │
//! ┌──────────────────────────────────────────┐
//! │  LlmBackend trait: complete()            │
//! └──────────────────────────────────────────┘
//!                    │
//!     ┌──────────────┼──────────────┐
//!     ▼              ▼              ▼
//! ┌─────────┐  ┌──────────┐  ┌────────────┐
//! │Anthropic│  │  OpenAI  │  │ Groq/Ollama│
//! └─────────┘  └──────────┘  └────────────┘
//! ```

pub mod backend;
pub mod error;
pub mod generate;
pub mod interaction_log;
pub mod types;

// Provider implementations
pub mod anthropic;
pub mod openai;

pub use backend::{
    LlmBackend, MockBackend, SharedBackend, text_response, tool_call_response, with_retry,
};
pub use error::{LlmError, RateLimitInfo, Result};
pub use generate::{Generator, ObjectSchema};
pub use interaction_log::{InteractionLogConfig, InteractionLogger, InteractionRecord};
pub use types::{
    CompletionRequest, CompletionResponse, Content, ContentBlock, Message, Role, StopReason,
    ToolChoice, ToolDefinition, ToolResultBlock, ToolUseBlock, Usage,
};

pub use anthropic::{AnthropicBackend, AnthropicConfig};
pub use openai::{OpenAiBackend, OpenAiConfig};
