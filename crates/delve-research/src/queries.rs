//! Expanding a research goal into search queries.

use serde::Deserialize;
use std::collections::HashSet;

use delve_llm::{Generator, LlmError, ObjectSchema};

use crate::error::Result;

/// Upper bound on queries per generation.
pub const MAX_QUERIES: usize = 5;

const SCHEMA_NAME: &str = "queries";

#[derive(Debug, Deserialize)]
struct QueryList {
    queries: Vec<String>,
}

fn schema() -> ObjectSchema {
    ObjectSchema::new(
        SCHEMA_NAME,
        "Record the generated search queries.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "queries": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "maxItems": MAX_QUERIES
                }
            },
            "required": ["queries"]
        }),
    )
}

pub fn query_prompt(goal: &str, n: usize) -> String {
    format!("Generate {} search queries for the following query: {}", n, goal)
}

/// Turns a goal into a short list of distinct search queries.
#[derive(Clone)]
pub struct QueryGenerator {
    generator: Generator,
}

impl QueryGenerator {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }

    /// Ask for `n` queries. `n` is clamped to `1..=MAX_QUERIES`.
    ///
    /// The model decides the final count; anything outside `1..=MAX_QUERIES`
    /// after blank and duplicate entries are dropped is a schema violation.
    pub async fn generate(&self, goal: &str, n: usize) -> Result<Vec<String>> {
        let n = n.clamp(1, MAX_QUERIES);
        let list: QueryList = self
            .generator
            .object(&query_prompt(goal, n), &schema())
            .await?;

        let mut seen = HashSet::new();
        let queries: Vec<String> = list
            .queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty() && seen.insert(q.to_lowercase()))
            .collect();

        if queries.is_empty() || queries.len() > MAX_QUERIES {
            return Err(LlmError::schema(
                SCHEMA_NAME,
                format!("expected 1 to {} queries, got {}", MAX_QUERIES, queries.len()),
            )
            .into());
        }

        tracing::debug!(requested = n, generated = queries.len(), "Generated queries");
        Ok(queries)
    }
}
