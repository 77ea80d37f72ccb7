//! The three single-call generation modes used by research: free text,
//! schema-bound objects, and a choice from a fixed label set.
//!
//! Structured output rides on native tool calling. The schema is offered as
//! the only tool and the model is forced to call it; the call's input is the
//! object.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::SharedBackend;
use crate::error::{LlmError, Result};
use crate::interaction_log::{InteractionLogger, InteractionRecord};
use crate::types::{CompletionRequest, CompletionResponse, Message, ToolChoice, ToolDefinition};

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Name of the forced tool used by [`Generator::choice`].
const CHOICE_SCHEMA: &str = "classify";

/// A named JSON schema the model must fill in.
#[derive(Debug, Clone)]
pub struct ObjectSchema {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
}

impl ObjectSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }

    fn to_tool(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name, &self.description, self.schema.clone())
    }
}

/// A backend bound to a model and sampling settings.
#[derive(Clone)]
pub struct Generator {
    backend: SharedBackend,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    logger: Option<Arc<InteractionLogger>>,
}

impl Generator {
    pub fn new(backend: SharedBackend, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            logger: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Record every exchange made through this generator.
    pub fn with_interaction_log(mut self, logger: Arc<InteractionLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// A request pre-filled with this generator's model and sampling settings.
    pub fn request(&self, messages: Vec<Message>) -> CompletionRequest {
        let request = CompletionRequest::new(&self.model, messages, self.max_tokens);
        match self.temperature {
            Some(t) => request.with_temperature(t),
            None => request,
        }
    }

    /// Send a raw request, timing it and recording it under `tag`.
    pub async fn complete(&self, request: CompletionRequest, tag: &str) -> Result<CompletionResponse> {
        let started = Instant::now();
        let response = match &self.logger {
            Some(logger) => {
                let response = self.backend.complete(request.clone()).await?;
                let record = InteractionRecord::from_exchange(
                    &request,
                    &response,
                    started.elapsed().as_millis() as u64,
                )
                .with_tag(tag);
                if let Err(e) = logger.log(&record) {
                    tracing::warn!(error = %e, "failed to write interaction log");
                }
                response
            }
            None => self.backend.complete(request).await?,
        };

        tracing::debug!(
            backend = self.backend.name(),
            tag,
            elapsed_ms = started.elapsed().as_millis() as u64,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "generation complete"
        );

        Ok(response)
    }

    /// Free-text generation with an optional system persona.
    pub async fn text(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let mut request = self.request(vec![Message::user(prompt)]);
        if let Some(system) = system {
            request = request.with_system(system);
        }

        let response = self.complete(request, "text").await?;
        Ok(response.text())
    }

    /// Generate a value conforming to `schema` and deserialize it as `T`.
    pub async fn object<T: DeserializeOwned>(&self, prompt: &str, schema: &ObjectSchema) -> Result<T> {
        if !self.backend.supports_native_tools() {
            return Err(LlmError::Config(format!(
                "backend '{}' cannot produce structured output",
                self.backend.name()
            )));
        }

        let request = self
            .request(vec![Message::user(prompt)])
            .with_tools(vec![schema.to_tool()])
            .with_tool_choice(ToolChoice::Tool {
                name: schema.name.clone(),
            });

        let response = self.complete(request, &schema.name).await?;
        let value = extract_object(&response, &schema.name)?;

        serde_json::from_value(value).map_err(|e| LlmError::schema(&schema.name, e.to_string()))
    }

    /// Pick exactly one of `labels`.
    pub async fn choice(&self, prompt: &str, labels: &[&str]) -> Result<String> {
        let schema = ObjectSchema::new(
            CHOICE_SCHEMA,
            "Record the single label that applies.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "label": { "type": "string", "enum": labels }
                },
                "required": ["label"]
            }),
        );

        #[derive(serde::Deserialize)]
        struct Picked {
            label: String,
        }

        let picked: Picked = self.object(prompt, &schema).await?;
        let label = picked.label.trim().to_lowercase();

        labels
            .iter()
            .find(|l| l.eq_ignore_ascii_case(&label))
            .map(|l| l.to_string())
            .ok_or_else(|| {
                LlmError::schema(
                    CHOICE_SCHEMA,
                    format!("'{}' is not one of {:?}", picked.label, labels),
                )
            })
    }
}

/// Pull the forced tool call's input out of a response.
///
/// Some OpenAI-compatible servers ignore `tool_choice` and answer in text;
/// a text body that parses as a JSON object is accepted in that case.
fn extract_object(response: &CompletionResponse, schema: &str) -> Result<serde_json::Value> {
    let uses = response.tool_uses();
    if let Some(call) = uses.iter().find(|u| u.name == schema).or(uses.first()) {
        return Ok(call.input.clone());
    }

    let text = response.text();
    let trimmed = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) if value.is_object() => Ok(value),
        _ => Err(LlmError::schema(schema, "model returned no structured output")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, text_response, tool_call_response};

    #[derive(Debug, serde::Deserialize)]
    struct Queries {
        queries: Vec<String>,
    }

    fn queries_schema() -> ObjectSchema {
        ObjectSchema::new(
            "queries",
            "Search queries",
            serde_json::json!({
                "type": "object",
                "properties": { "queries": { "type": "array", "items": { "type": "string" } } },
                "required": ["queries"]
            }),
        )
    }

    #[tokio::test]
    async fn test_object_forces_schema_tool() {
        let backend = Arc::new(MockBackend::new(vec![tool_call_response(
            "c1",
            "queries",
            serde_json::json!({"queries": ["a", "b"]}),
        )]));
        let generator = Generator::new(backend.clone(), "m");

        let out: Queries = generator.object("find things", &queries_schema()).await.unwrap();
        assert_eq!(out.queries, vec!["a", "b"]);

        let request = &backend.requests()[0];
        assert_eq!(
            request.tool_choice,
            Some(ToolChoice::Tool {
                name: "queries".into()
            })
        );
        assert_eq!(request.tools[0].name, "queries");
    }

    #[tokio::test]
    async fn test_object_accepts_fenced_json_text() {
        let backend = Arc::new(MockBackend::with_text("```json\n{\"queries\": [\"x\"]}\n```"));
        let generator = Generator::new(backend, "m");

        let out: Queries = generator.object("p", &queries_schema()).await.unwrap();
        assert_eq!(out.queries, vec!["x"]);
    }

    #[tokio::test]
    async fn test_object_schema_mismatch() {
        let backend = Arc::new(MockBackend::new(vec![tool_call_response(
            "c1",
            "queries",
            serde_json::json!({"wrong": true}),
        )]));
        let generator = Generator::new(backend, "m");

        let err = generator
            .object::<Queries>("p", &queries_schema())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::SchemaConformance { .. }));
    }

    #[tokio::test]
    async fn test_object_without_output() {
        let backend = Arc::new(MockBackend::with_text("I'd rather not."));
        let generator = Generator::new(backend, "m");

        let err = generator
            .object::<Queries>("p", &queries_schema())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::SchemaConformance { .. }));
    }

    #[tokio::test]
    async fn test_choice() {
        let backend = Arc::new(MockBackend::new(vec![
            tool_call_response("c1", CHOICE_SCHEMA, serde_json::json!({"label": "Relevant"})),
            tool_call_response("c2", CHOICE_SCHEMA, serde_json::json!({"label": "maybe"})),
        ]));
        let generator = Generator::new(backend.clone(), "m");
        let labels = ["relevant", "irrelevant"];

        assert_eq!(generator.choice("p", &labels).await.unwrap(), "relevant");
        assert!(matches!(
            generator.choice("p", &labels).await,
            Err(LlmError::SchemaConformance { .. })
        ));

        let schema = &backend.requests()[0].tools[0].input_schema;
        assert_eq!(
            schema["properties"]["label"]["enum"],
            serde_json::json!(["relevant", "irrelevant"])
        );
    }

    #[tokio::test]
    async fn test_text_with_system() {
        let backend = Arc::new(MockBackend::new(vec![text_response("# Report")]));
        let generator = Generator::new(backend.clone(), "m").with_temperature(0.3);

        let out = generator.text("write it", Some("persona")).await.unwrap();
        assert_eq!(out, "# Report");

        let request = &backend.requests()[0];
        assert_eq!(request.system.as_deref(), Some("persona"));
        assert_eq!(request.temperature, Some(0.3));
        assert!(request.tools.is_empty());
    }
}
