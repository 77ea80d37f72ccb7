//! Multi-step generation with tool calling.
//!
//! One step is one model generation. A step that calls tools has every call
//! executed, in order, before the next step; the results are appended to the
//! conversation as a tool-results message. The loop ends when the model
//! answers without calling a tool or when the step ceiling is reached. Tool
//! calls made in the final allowed step are still executed.

use serde::Serialize;

use delve_llm::{Generator, Message, ToolChoice, ToolResultBlock, ToolUseBlock, Usage};

use crate::error::Result;
use crate::tool::{ToolContext, ToolRegistry, ToolResult};

/// One executed tool call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub step: u32,
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    pub result: ToolResult,
}

/// Everything a loop did, for callers and tests.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopTrace {
    /// Generations performed.
    pub steps: u32,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Text of the last generation.
    pub text: String,
    /// The loop stopped because it ran out of steps, not because the model
    /// finished.
    pub hit_step_limit: bool,
    pub usage: Usage,
}

impl LoopTrace {
    /// Calls made to the named tool.
    pub fn calls_to<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ToolCallRecord> {
        self.tool_calls.iter().filter(move |c| c.name == name)
    }
}

/// Bounded tool-calling conversation driven by a [`Generator`].
pub struct ToolLoop {
    generator: Generator,
    system: Option<String>,
    max_steps: u32,
    tag: String,
}

impl ToolLoop {
    pub fn new(generator: Generator, max_steps: u32) -> Self {
        Self {
            generator,
            system: None,
            max_steps: max_steps.max(1),
            tag: "tool_loop".to_string(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Tag used for interaction logging.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Run the loop from a single user prompt.
    ///
    /// A tool that fails with a fatal error aborts the loop with that error.
    /// Other failures are handed back to the model as error results.
    pub async fn run(&self, prompt: &str, tools: &ToolRegistry) -> Result<LoopTrace> {
        let mut messages = vec![Message::user(prompt)];
        let mut trace = LoopTrace::default();
        let definitions = tools.definitions();

        loop {
            trace.steps += 1;
            let step = trace.steps;

            let mut request = self
                .generator
                .request(messages.clone())
                .with_tools(definitions.clone())
                .with_tool_choice(ToolChoice::Auto);
            if let Some(system) = &self.system {
                request = request.with_system(system);
            }

            tracing::debug!(
                step,
                messages = messages.len(),
                tools = definitions.len(),
                model = %request.model,
                "Calling LLM"
            );

            let response = self.generator.complete(request, &self.tag).await?;
            trace.usage.add(&response.usage);
            trace.text = response.text();

            if !response.has_tool_use() {
                tracing::debug!(step, "Loop finished without tool calls");
                return Ok(trace);
            }

            let tool_uses = response.tool_uses();
            tracing::debug!(
                step,
                tool_count = tool_uses.len(),
                tools = %tool_uses.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", "),
                "Executing tools"
            );

            let mut blocks = Vec::with_capacity(tool_uses.len());
            for tool_use in tool_uses {
                let result = self.execute_one(tools, &tool_use, step).await?;
                let content = result.render(tools.max_output_bytes());
                blocks.push(if result.is_error() {
                    ToolResultBlock::error(&tool_use.id, content)
                } else {
                    ToolResultBlock::success(&tool_use.id, content)
                });
                trace.tool_calls.push(ToolCallRecord {
                    step,
                    id: tool_use.id,
                    name: tool_use.name,
                    arguments: tool_use.input,
                    result,
                });
            }

            messages.push(Message::assistant_blocks(response.content));
            messages.push(Message::tool_results(blocks));

            if step >= self.max_steps {
                tracing::debug!(step, "Step limit reached");
                trace.hit_step_limit = true;
                return Ok(trace);
            }
        }
    }

    async fn execute_one(
        &self,
        tools: &ToolRegistry,
        tool_use: &ToolUseBlock,
        step: u32,
    ) -> Result<ToolResult> {
        let ctx = ToolContext::new(step).with_call_id(&tool_use.id);

        match tools
            .execute(&tool_use.name, tool_use.input.clone(), &ctx)
            .await
        {
            Ok(result) => Ok(result),
            Err(e) if e.is_fatal() => {
                tracing::warn!(tool = %tool_use.name, error = %e, "Tool failed, aborting loop");
                Err(e)
            }
            Err(e) => {
                tracing::debug!(tool = %tool_use.name, error = %e, "Tool call rejected");
                if let crate::error::ResearchError::ToolNotFound(_) = e {
                    return Ok(ToolResult::error(format!(
                        "{}. Available tools are: {}",
                        e,
                        tools.names().join(", ")
                    )));
                }
                Ok(ToolResult::error(e.to_string()))
            }
        }
    }
}
