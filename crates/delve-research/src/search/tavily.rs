//! Tavily search. Raw page content is requested so hits carry full text.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{SearchOptions, SearchProvider, build_client, check_status};
use crate::error::{ResearchError, Result};
use crate::types::SearchResult;

const DEFAULT_API_BASE: &str = "https://api.tavily.com";

pub struct TavilySearch {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client("tavily", timeout)?,
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Debug, Deserialize)]
struct TavilyHit {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    raw_content: Option<String>,
}

impl From<TavilyHit> for SearchResult {
    fn from(hit: TavilyHit) -> Self {
        // raw_content is the page; content is only a snippet
        let content = match hit.raw_content {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => hit.content,
        };
        SearchResult {
            title: hit.title,
            url: hit.url,
            content,
        }
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        tracing::debug!(query, max_results = options.max_results, "Tavily search");

        let response = self
            .client
            .post(format!("{}/search", self.base_url.trim_end_matches('/')))
            .json(&json!({
                "api_key": self.api_key,
                "query": query,
                "max_results": options.max_results.max(1),
                "include_raw_content": true,
                "search_depth": if options.live_crawl { "advanced" } else { "basic" },
            }))
            .send()
            .await
            .map_err(|e| ResearchError::search("tavily", e.to_string()))?;

        let data: TavilyResponse = check_status("tavily", response)
            .await?
            .json()
            .await
            .map_err(|e| {
                ResearchError::search("tavily", format!("failed to parse response: {}", e))
            })?;

        Ok(data
            .results
            .into_iter()
            .take(options.max_results.max(1))
            .map(SearchResult::from)
            .collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}
