//! The research record and the items it accumulates.
//!
//! Field names serialize in camelCase; the report prompt embeds the record
//! as JSON in that shape.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One page returned by a search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    /// Extracted page text.
    pub content: String,
}

impl SearchResult {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: content.into(),
        }
    }
}

/// A finding distilled from one relevant result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Learning {
    pub learning: String,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
}

/// Everything a research run has gathered.
///
/// One record is shared by every level of the recursion. `search_results`
/// and `learnings` grow together: each accepted result gets exactly one
/// learning, appended at the same position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Research {
    /// The user's prompt. Set once, by the top-level call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Queries generated at the most recent level.
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub search_results: Vec<SearchResult>,
    #[serde(default)]
    pub learnings: Vec<Learning>,
    /// Originating query of each accepted result, in acceptance order. A
    /// query repeats once per result it produced.
    #[serde(default)]
    pub completed_queries: Vec<String>,
}

impl Research {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the user prompt unless one is already recorded.
    pub fn set_query_once(&mut self, prompt: &str) -> bool {
        if self.query.is_some() {
            return false;
        }
        self.query = Some(prompt.to_string());
        true
    }

    /// URLs of every accepted result, in order.
    pub fn urls(&self) -> Vec<String> {
        self.search_results.iter().map(|r| r.url.clone()).collect()
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.search_results.iter().any(|r| r.url == url)
    }

    /// Append a batch of accepted results; returns the index of the first.
    pub fn push_results(&mut self, results: &[SearchResult]) -> usize {
        let start = self.search_results.len();
        self.search_results.extend_from_slice(results);
        start
    }

    /// Append the learning for an accepted result and note its query.
    pub fn push_learning(&mut self, query: &str, learning: Learning) {
        self.learnings.push(learning);
        self.completed_queries.push(query.to_string());
    }

    /// Remove results of a batch pushed at `start` that never got a learning.
    ///
    /// Results appended after the batch (by deeper levels) are left alone.
    pub fn withdraw(&mut self, start: usize, results: &[SearchResult]) {
        for result in results {
            if let Some(pos) = self.search_results[start..].iter().position(|r| r == result) {
                self.search_results.remove(start + pos);
            }
        }
    }

    pub fn summary(&self) -> ResearchSummary {
        let unique: HashSet<&str> = self.search_results.iter().map(|r| r.url.as_str()).collect();
        ResearchSummary {
            completed_queries: self.completed_queries.len(),
            search_results: self.search_results.len(),
            unique_urls: unique.len(),
            learnings: self.learnings.len(),
            follow_up_questions: self
                .learnings
                .iter()
                .map(|l| l.follow_up_questions.len())
                .sum(),
        }
    }
}

/// Counts describing a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchSummary {
    pub completed_queries: usize,
    pub search_results: usize,
    pub unique_urls: usize,
    pub learnings: usize,
    pub follow_up_questions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn learning(text: &str, follow_ups: &[&str]) -> Learning {
        Learning {
            learning: text.to_string(),
            follow_up_questions: follow_ups.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_query_set_once() {
        let mut research = Research::new();
        assert!(research.set_query_once("first"));
        assert!(!research.set_query_once("second"));
        assert_eq!(research.query.as_deref(), Some("first"));
    }

    #[test]
    fn test_push_and_summary() {
        let mut research = Research::new();
        let start = research.push_results(&[
            SearchResult::new("A", "https://a", "x"),
            SearchResult::new("B", "https://b", "y"),
        ]);
        assert_eq!(start, 0);
        research.push_learning("qa", learning("la", &["q1"]));
        research.push_learning("qa", learning("lb", &["q2", "q3"]));

        assert_eq!(research.search_results.len(), research.learnings.len());
        assert!(research.contains_url("https://b"));
        assert_eq!(research.urls(), vec!["https://a", "https://b"]);
        assert_eq!(research.completed_queries, vec!["qa", "qa"]);

        let summary = research.summary();
        assert_eq!(summary.learnings, 2);
        assert_eq!(summary.unique_urls, 2);
        assert_eq!(summary.follow_up_questions, 3);
    }

    #[test]
    fn test_withdraw_leaves_later_results() {
        let mut research = Research::new();
        research.push_results(&[SearchResult::new("Old", "https://old", "")]);

        let batch = vec![
            SearchResult::new("A", "https://a", ""),
            SearchResult::new("B", "https://b", ""),
        ];
        let start = research.push_results(&batch);
        // a deeper level appended while A was being processed
        research.push_results(&[SearchResult::new("Deep", "https://deep", "")]);

        research.withdraw(start, &batch[1..]);
        assert_eq!(
            research.urls(),
            vec!["https://old", "https://a", "https://deep"]
        );
    }

    #[test]
    fn test_camel_case_wire_shape() {
        let mut research = Research::new();
        research.push_results(&[SearchResult::new("A", "https://a", "x")]);
        research.push_learning("q", learning("l", &["f"]));

        let value = serde_json::to_value(&research).unwrap();
        assert!(value.get("query").is_none());
        assert_eq!(value["completedQueries"][0], "q");
        assert_eq!(value["searchResults"][0]["url"], "https://a");
        assert_eq!(value["learnings"][0]["followUpQuestions"][0], "f");

        let parsed: Learning =
            serde_json::from_value(serde_json::json!({"learning": "only"})).unwrap();
        assert!(parsed.follow_up_questions.is_empty());
    }
}
