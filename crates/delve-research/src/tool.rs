//! Tools the model may call inside a [`ToolLoop`](crate::ToolLoop).
//!
//! A [`Tool`] advertises a name, a description and a JSON Schema for its
//! arguments. A [`ToolRegistry`] holds the set offered in one loop, renders
//! it as request [`ToolDefinition`]s and dispatches calls by name.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use delve_llm::ToolDefinition;

use crate::error::{ResearchError, Result};

/// Ceiling on what one tool result may feed back to the model.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 100_000;

/// Decode tool arguments into `T`.
///
/// Failures become [`ResearchError::InvalidToolParams`], which the loop
/// hands back to the model instead of aborting.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| ResearchError::InvalidToolParams(format!("{tool}: {e}")))
}

/// Arguments of the `search` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    pub query: String,
}

impl SearchParams {
    pub fn parse(args: Value) -> Result<Self> {
        let Self { query } = parse_args("search", args)?;
        let query = query.trim();
        if query.is_empty() {
            return Err(ResearchError::InvalidToolParams(
                "search: query must not be blank".into(),
            ));
        }
        Ok(Self {
            query: query.to_string(),
        })
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the arguments.
    fn parameters(&self) -> Value;

    /// `Ok(ToolResult::error(..))` is shown to the model, which may retry.
    /// `Err` goes to the loop, which aborts when [`ResearchError::is_fatal`].
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult>;
}

/// Where in a loop a call happens.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// 1-based generation step that produced the call.
    pub step: u32,
    pub call_id: Option<String>,
}

impl ToolContext {
    pub fn new(step: u32) -> Self {
        Self {
            step,
            call_id: None,
        }
    }

    pub fn with_call_id(self, id: impl Into<String>) -> Self {
        Self {
            call_id: Some(id.into()),
            ..self
        }
    }
}

/// What a tool hands back, before rendering for the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum ToolResult {
    Text(String),
    Json(Value),
    Error(String),
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn json(value: Value) -> Self {
        Self::Json(value)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// The text the model sees, at most `max_bytes` plus a truncation marker.
    pub fn render(&self, max_bytes: usize) -> String {
        let mut out = match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            Self::Error(message) => format!("Error: {message}"),
        };
        if out.len() > max_bytes {
            let cut = (0..=max_bytes)
                .rev()
                .find(|&i| out.is_char_boundary(i))
                .unwrap_or(0);
            out.truncate(cut);
            out.push_str("\n[output truncated]");
        }
        out
    }
}

/// Tools offered to the model in one loop, keyed and listed by name.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    max_output_bytes: usize,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output_bytes(self, max_output_bytes: usize) -> Self {
        Self {
            max_output_bytes,
            ..self
        }
    }

    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }

    /// Replaces any tool already registered under the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_owned(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(Arc::clone)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = Vec::with_capacity(self.tools.len());
        for tool in self.tools.values() {
            defs.push(ToolDefinition::new(
                tool.name(),
                tool.description(),
                tool.parameters(),
            ));
        }
        defs
    }

    pub async fn execute(&self, name: &str, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        match self.tools.get(name) {
            Some(tool) => tool.execute(params, ctx).await,
            None => Err(ResearchError::ToolNotFound(name.to_owned())),
        }
    }
}
