//! Brave search. Hits only carry a snippet, so each page is fetched and
//! reduced to text.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{PageFetcher, SearchOptions, SearchProvider, build_client, check_status};
use crate::error::{ResearchError, Result};
use crate::types::SearchResult;

const DEFAULT_API_BASE: &str = "https://api.search.brave.com";

pub struct BraveSearch {
    client: Client,
    fetcher: PageFetcher,
    api_key: String,
    base_url: String,
}

impl BraveSearch {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client("brave", timeout)?,
            fetcher: PageFetcher::new(timeout)?,
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn search_url(&self, query: &str, count: usize) -> String {
        format!(
            "{}/res/v1/web/search?q={}&count={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(query),
            count
        )
    }
}

/// Title, URL and snippet of each web hit.
fn parse_hits(data: &Value) -> Vec<SearchResult> {
    data["web"]["results"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|r| {
                    Some(SearchResult {
                        title: r["title"].as_str().unwrap_or_default().to_string(),
                        url: r["url"].as_str()?.to_string(),
                        content: r["description"].as_str().unwrap_or_default().to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SearchProvider for BraveSearch {
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let count = options.max_results.max(1);
        tracing::debug!(query, max_results = count, "Brave search");

        let response = self
            .client
            .get(self.search_url(query, count))
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ResearchError::search("brave", e.to_string()))?;

        let data: Value = check_status("brave", response)
            .await?
            .json()
            .await
            .map_err(|e| {
                ResearchError::search("brave", format!("failed to parse response: {}", e))
            })?;

        let mut hits = parse_hits(&data);
        hits.truncate(count);

        for hit in &mut hits {
            match self.fetcher.fetch_text(&hit.url).await {
                Ok(text) if !text.is_empty() => hit.content = text,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(url = %hit.url, error = %e, "Page fetch failed, keeping snippet");
                }
            }
        }

        Ok(hits)
    }

    fn name(&self) -> &str {
        "brave"
    }
}
