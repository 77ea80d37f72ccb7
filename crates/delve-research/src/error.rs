//! Error types for the research crate.

use thiserror::Error;

/// Result type alias using the research error type.
pub type Result<T> = std::result::Result<T, ResearchError>;

/// Error type for research operations.
#[derive(Debug, Error)]
pub enum ResearchError {
    /// Text-generation failure, including non-conformant structured output.
    #[error("LLM error: {0}")]
    Llm(#[from] delve_llm::LlmError),

    /// The search provider failed or answered with something unreadable.
    #[error("Search error ({provider}): {message}")]
    Search { provider: String, message: String },

    /// Tool execution error.
    #[error("Tool error: {0}")]
    Tool(String),

    /// The model asked for a tool that is not registered.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The model called a tool with arguments that do not validate.
    #[error("Invalid tool parameters: {0}")]
    InvalidToolParams(String),

    /// `evaluate` was called with nothing left to evaluate.
    #[error("No pending search results to evaluate")]
    EmptyPending,

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Writing the report failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResearchError {
    /// Create a search error attributed to a provider.
    pub fn search(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Search {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a tool error.
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a failure inside a tool call must abort the tool loop.
    ///
    /// Non-fatal errors are the model's own mistakes (bad arguments, an
    /// unknown tool name); they are reported back to it as a tool error so it
    /// can correct itself within the step budget.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Tool(_) | Self::ToolNotFound(_) | Self::InvalidToolParams(_)
        )
    }
}
