use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use super::{SearchOptions, SearchProvider};
use crate::error::{ResearchError, Result};
use crate::types::SearchResult;

/// Scripted search provider for tests.
///
/// Answers from a query table, falling back to a default list. Every call is
/// recorded.
#[derive(Default)]
pub struct MockSearch {
    table: HashMap<String, Vec<SearchResult>>,
    fallback: Vec<SearchResult>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results for an exact query.
    pub fn with_results(mut self, query: impl Into<String>, results: Vec<SearchResult>) -> Self {
        self.table.insert(query.into(), results);
        self
    }

    /// Results for any query not in the table.
    pub fn with_fallback(mut self, results: Vec<SearchResult>) -> Self {
        self.fallback = results;
        self
    }

    /// Make a query fail with a search error.
    pub fn failing(mut self, query: impl Into<String>) -> Self {
        self.failing.insert(query.into());
        self
    }

    /// Queries received, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        self.calls.lock().push(query.to_string());

        if self.failing.contains(query) {
            return Err(ResearchError::search("mock", format!("no route for '{}'", query)));
        }

        let results = self.table.get(query).unwrap_or(&self.fallback);
        Ok(results.iter().take(options.max_results).cloned().collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_table_and_fallback() {
        let search = MockSearch::new()
            .with_results("rust", vec![SearchResult::new("R", "https://r", "r")])
            .with_fallback(vec![
                SearchResult::new("F1", "https://f1", "f"),
                SearchResult::new("F2", "https://f2", "f"),
            ])
            .failing("boom");
        let options = SearchOptions::default();

        let hits = search.search("rust", &options).await.unwrap();
        assert_eq!(hits[0].url, "https://r");

        let hits = search.search("other", &options).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://f1");

        assert!(search.search("boom", &options).await.is_err());
        assert_eq!(search.calls(), vec!["rust", "other", "boom"]);
    }
}
