//! The recursive research driver.
//!
//! Each level expands its prompt into queries, runs every query through the
//! search-and-evaluate loop, extracts a learning from each accepted result,
//! and recurses into that learning's follow-up questions with one less level
//! of depth and half the breadth (rounded up). Work is strictly sequential
//! and depth-first; a follow-up subtree finishes before the next result is
//! looked at.

use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::str::FromStr;

use crate::error::{ResearchError, Result};
use crate::evaluate::SearchAndEvaluate;
use crate::learnings::LearningExtractor;
use crate::queries::QueryGenerator;
use crate::types::{Learning, Research};

pub const DEFAULT_DEPTH: u32 = 2;
pub const DEFAULT_BREADTH: usize = 2;

/// What a failed query iteration does to the rest of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and move on to the next query.
    #[default]
    Continue,
    /// Stop the whole run with the error.
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            other => Err(ResearchError::internal(format!(
                "unknown failure policy '{}', expected 'continue' or 'abort'",
                other
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Continue => "continue",
            Self::Abort => "abort",
        })
    }
}

/// Breadth for the level below one with `breadth` queries.
pub fn next_breadth(breadth: usize) -> usize {
    breadth.div_ceil(2)
}

/// Prompt for the level that follows up on `learning`.
pub fn follow_up_prompt(goal: &str, completed_queries: &[String], learning: &Learning) -> String {
    format!(
        "Overall research goal: {}\nPrevious search queries: {}\n\nFollow-up questions: {}",
        goal,
        completed_queries.join(", "),
        learning.follow_up_questions.join(", ")
    )
}

pub struct DeepResearch {
    queries: QueryGenerator,
    search: SearchAndEvaluate,
    learnings: LearningExtractor,
    policy: FailurePolicy,
}

impl DeepResearch {
    pub fn new(queries: QueryGenerator, search: SearchAndEvaluate, learnings: LearningExtractor) -> Self {
        Self {
            queries,
            search,
            learnings,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Research `prompt` into a fresh record.
    pub async fn run(&self, prompt: &str, depth: u32, breadth: usize) -> Result<Research> {
        let mut record = Research::new();
        self.research(prompt, depth, breadth, &mut record).await?;
        Ok(record)
    }

    /// Research `prompt`, accumulating into `record`.
    pub async fn research(
        &self,
        prompt: &str,
        depth: u32,
        breadth: usize,
        record: &mut Research,
    ) -> Result<()> {
        self.level(prompt, depth, breadth, 0, record).await
    }

    fn level<'a>(
        &'a self,
        prompt: &'a str,
        depth: u32,
        breadth: usize,
        level: u32,
        record: &'a mut Research,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            record.set_query_once(prompt);

            if depth == 0 || breadth == 0 {
                return Ok(());
            }

            let queries = match self.queries.generate(prompt, breadth).await {
                Ok(queries) => queries,
                // A run that cannot even start has nothing to fall back on
                Err(e) if level > 0 && self.policy == FailurePolicy::Continue => {
                    tracing::warn!(level, error = %e, "Query generation failed, skipping follow-ups");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            tracing::debug!(level, depth, breadth, queries = ?queries, "Expanded prompt");
            record.queries = queries.clone();

            for query in &queries {
                if let Err(e) = self.query(prompt, query, depth, breadth, level, record).await {
                    match self.policy {
                        FailurePolicy::Continue => {
                            tracing::warn!(%query, level, error = %e, "Query failed, continuing");
                        }
                        FailurePolicy::Abort => return Err(e),
                    }
                }
            }

            Ok(())
        }
        .boxed()
    }

    /// One query iteration: search, record, learn, recurse.
    async fn query(
        &self,
        prompt: &str,
        query: &str,
        depth: u32,
        breadth: usize,
        level: u32,
        record: &mut Research,
    ) -> Result<()> {
        tracing::info!(level, "Searching the web for: {}", query);
        let results = self.search.run(query, &record.urls()).await?;
        let start = record.push_results(&results);

        let mut processed = 0;
        let outcome: Result<()> = async {
            for result in &results {
                tracing::info!(level, "Processing search result: {}", result.url);
                let learning = self.learnings.extract(query, result).await?;
                record.push_learning(query, learning.clone());
                processed += 1;

                let goal = record.query.clone().unwrap_or_else(|| prompt.to_string());
                let follow_up = follow_up_prompt(&goal, &record.completed_queries, &learning);
                self.level(&follow_up, depth - 1, next_breadth(breadth), level + 1, record)
                    .await?;
            }
            Ok(())
        }
        .await;

        if outcome.is_err() {
            record.withdraw(start, &results[processed..]);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_breadth() {
        assert_eq!(next_breadth(5), 3);
        assert_eq!(next_breadth(4), 2);
        assert_eq!(next_breadth(1), 1);
        assert_eq!(next_breadth(0), 0);
    }

    #[test]
    fn test_follow_up_prompt() {
        let learning = Learning {
            learning: "l".into(),
            follow_up_questions: vec!["Why?".into(), "How?".into()],
        };
        let prompt = follow_up_prompt("goal", &["a".into(), "b".into()], &learning);
        assert_eq!(
            prompt,
            "Overall research goal: goal\nPrevious search queries: a, b\n\nFollow-up questions: Why?, How?"
        );
    }

    #[test]
    fn test_failure_policy_parse() {
        assert_eq!("Continue".parse::<FailurePolicy>().unwrap(), FailurePolicy::Continue);
        assert_eq!("abort".parse::<FailurePolicy>().unwrap(), FailurePolicy::Abort);
        assert!("retry".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::Abort.to_string(), "abort");
    }
}
