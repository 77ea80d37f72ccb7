//! The per-query search-and-evaluate loop.
//!
//! The model drives two tools. `search` runs a web search and queues every
//! hit as pending. `evaluate` takes the most recently queued hit, asks the
//! relevance filter about it, and either accepts it or tells the model to
//! search again. The loop is bounded by the step ceiling and by a per-query
//! search budget.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use delve_llm::Generator;

use crate::error::{ResearchError, Result};
use crate::relevance::{RelevanceFilter, Verdict};
use crate::search::{SearchOptions, SharedSearch};
use crate::tool::{SearchParams, Tool, ToolContext, ToolRegistry, ToolResult};
use crate::tool_loop::{LoopTrace, ToolLoop};
use crate::types::SearchResult;

pub const DEFAULT_MAX_STEPS: u32 = 5;
pub const DEFAULT_MAX_REQUERIES: u32 = 2;

const SYSTEM_PROMPT: &str = "You are a researcher. For each query, search the web and then evaluate if the results are relevant and will help answer the following query";

const RELEVANT_REPLY: &str = "Search results are relevant. End research for this query.";
const IRRELEVANT_REPLY: &str =
    "Search results are irrelevant. Please search again with a more specific query.";
const EXHAUSTED_REPLY: &str =
    "Search results are irrelevant and no searches remain for this query. End research for this query.";

pub fn search_prompt(query: &str) -> String {
    format!("Search the web for information about {}", query)
}

/// Mutable state shared by the two tools for one query.
#[derive(Debug, Default)]
struct LoopState {
    pending: Vec<SearchResult>,
    accepted: Vec<SearchResult>,
    searches: u32,
}

/// Runs one query through search and relevance evaluation.
#[derive(Clone)]
pub struct SearchAndEvaluate {
    generator: Generator,
    search: SharedSearch,
    filter: RelevanceFilter,
    options: SearchOptions,
    max_steps: u32,
    max_requeries: u32,
}

impl SearchAndEvaluate {
    pub fn new(generator: Generator, search: SharedSearch, filter: RelevanceFilter) -> Self {
        Self {
            generator,
            search,
            filter,
            options: SearchOptions::default(),
            max_steps: DEFAULT_MAX_STEPS,
            max_requeries: DEFAULT_MAX_REQUERIES,
        }
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Searches allowed after the first one.
    pub fn with_max_requeries(mut self, max_requeries: u32) -> Self {
        self.max_requeries = max_requeries;
        self
    }

    /// Search for `query` and return the results judged relevant.
    ///
    /// `known_urls` are URLs already accepted elsewhere in the run; a result
    /// at one of those URLs is treated as a duplicate.
    pub async fn run(&self, query: &str, known_urls: &[String]) -> Result<Vec<SearchResult>> {
        let (results, trace) = self.run_traced(query, known_urls).await?;
        tracing::debug!(
            query,
            steps = trace.steps,
            tool_calls = trace.tool_calls.len(),
            hit_step_limit = trace.hit_step_limit,
            accepted = results.len(),
            "Search loop finished"
        );
        Ok(results)
    }

    /// Like [`run`](Self::run), also returning the loop trace.
    pub async fn run_traced(
        &self,
        query: &str,
        known_urls: &[String],
    ) -> Result<(Vec<SearchResult>, LoopTrace)> {
        let state = Arc::new(Mutex::new(LoopState::default()));

        let mut tools = ToolRegistry::new();
        tools.register(SearchTool {
            search: self.search.clone(),
            options: self.options,
            max_searches: self.max_requeries + 1,
            state: state.clone(),
        });
        tools.register(EvaluateTool {
            filter: self.filter.clone(),
            query: query.to_string(),
            known_urls: known_urls.to_vec(),
            max_searches: self.max_requeries + 1,
            state: state.clone(),
        });

        let tool_loop = ToolLoop::new(self.generator.clone(), self.max_steps)
            .with_system(SYSTEM_PROMPT)
            .with_tag("search");
        let trace = tool_loop.run(&search_prompt(query), &tools).await?;

        let accepted = std::mem::take(&mut state.lock().accepted);
        Ok((accepted, trace))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────────────────

struct SearchTool {
    search: SharedSearch,
    options: SearchOptions,
    max_searches: u32,
    state: Arc<Mutex<LoopState>>,
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web for information about a given query"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: serde_json::Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let params = SearchParams::parse(params)?;

        {
            let mut state = self.state.lock();
            if state.searches >= self.max_searches {
                return Ok(ToolResult::error(
                    "No searches remain for this query. End research for this query.",
                ));
            }
            state.searches += 1;
        }

        let results = self.search.search(&params.query, &self.options).await?;
        for result in &results {
            tracing::info!(url = %result.url, "Found: {}", result.url);
        }

        self.state.lock().pending.extend(results.iter().cloned());
        Ok(ToolResult::json(serde_json::to_value(&results)?))
    }
}

struct EvaluateTool {
    filter: RelevanceFilter,
    query: String,
    known_urls: Vec<String>,
    max_searches: u32,
    state: Arc<Mutex<LoopState>>,
}

#[async_trait]
impl Tool for EvaluateTool {
    fn name(&self) -> &str {
        "evaluate"
    }

    fn description(&self) -> &str {
        "Evaluate the search results"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: serde_json::Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let (candidate, existing) = {
            let mut state = self.state.lock();
            let candidate = state.pending.pop().ok_or(ResearchError::EmptyPending)?;
            let existing: Vec<String> = state
                .accepted
                .iter()
                .map(|r| r.url.clone())
                .chain(self.known_urls.iter().cloned())
                .collect();
            (candidate, existing)
        };

        let verdict = self.filter.classify(&self.query, &candidate, &existing).await?;
        tracing::info!(url = %candidate.url, %verdict, "Evaluation completed: {}", verdict);

        let mut state = self.state.lock();
        Ok(ToolResult::text(match verdict {
            Verdict::Relevant => {
                state.accepted.push(candidate);
                RELEVANT_REPLY
            }
            Verdict::Irrelevant if state.searches < self.max_searches => IRRELEVANT_REPLY,
            Verdict::Irrelevant => EXHAUSTED_REPLY,
        }))
    }
}
