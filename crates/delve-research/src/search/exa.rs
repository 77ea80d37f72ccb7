//! Exa search, which returns full page text with each hit.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{SearchOptions, SearchProvider, build_client, check_status};
use crate::error::{ResearchError, Result};
use crate::types::SearchResult;

const DEFAULT_API_BASE: &str = "https://api.exa.ai";

pub struct ExaSearch {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ExaSearch {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client("exa", timeout)?,
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaRequest<'a> {
    query: &'a str,
    num_results: usize,
    #[serde(rename = "type")]
    search_type: &'static str,
    contents: ExaContents,
    livecrawl: &'static str,
}

#[derive(Debug, Serialize)]
struct ExaContents {
    text: bool,
}

impl<'a> ExaRequest<'a> {
    fn new(query: &'a str, options: &SearchOptions) -> Self {
        Self {
            query,
            num_results: options.max_results.max(1),
            search_type: "auto",
            contents: ExaContents { text: true },
            livecrawl: if options.live_crawl { "always" } else { "fallback" },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaHit>,
}

#[derive(Debug, Deserialize)]
struct ExaHit {
    #[serde(default)]
    title: Option<String>,
    url: String,
    #[serde(default)]
    text: Option<String>,
}

impl From<ExaHit> for SearchResult {
    fn from(hit: ExaHit) -> Self {
        SearchResult {
            title: hit.title.unwrap_or_default(),
            url: hit.url,
            content: hit.text.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl SearchProvider for ExaSearch {
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        tracing::debug!(query, max_results = options.max_results, "Exa search");

        let response = self
            .client
            .post(self.search_url())
            .header("x-api-key", &self.api_key)
            .json(&ExaRequest::new(query, options))
            .send()
            .await
            .map_err(|e| ResearchError::search("exa", e.to_string()))?;

        let data: ExaResponse = check_status("exa", response)
            .await?
            .json()
            .await
            .map_err(|e| ResearchError::search("exa", format!("failed to parse response: {}", e)))?;

        Ok(data
            .results
            .into_iter()
            .take(options.max_results.max(1))
            .map(SearchResult::from)
            .collect())
    }

    fn name(&self) -> &str {
        "exa"
    }
}
