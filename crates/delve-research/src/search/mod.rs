//! Web search providers.
//!
//! Every provider answers a query with pages that already carry their
//! extracted text, so the relevance filter and the learning extractor can
//! read them without another fetch.

mod brave;
mod exa;
mod fetch;
mod mock;
mod tavily;

pub use brave::BraveSearch;
pub use exa::ExaSearch;
pub use fetch::{PageFetcher, extract_text_from_html};
pub use mock::MockSearch;
pub use tavily::TavilySearch;

use async_trait::async_trait;
use reqwest::{Client, Response};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ResearchError, Result};
use crate::types::SearchResult;

/// Default timeout for provider requests.
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call search settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Ask the provider for a fresh crawl instead of a cached copy.
    pub live_crawl: bool,
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            live_crawl: true,
            max_results: 1,
        }
    }
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search and return up to `options.max_results` pages with content.
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>>;

    fn name(&self) -> &str;
}

pub type SharedSearch = Arc<dyn SearchProvider>;

fn build_client(provider: &str, timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("delve/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ResearchError::search(provider, format!("failed to create HTTP client: {}", e)))
}

/// Turn a non-2xx answer into a search error carrying the body.
async fn check_status(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body = body.chars().take(300).collect::<String>();
    Err(ResearchError::search(provider, format!("HTTP {}: {}", status, body)))
}
