//! Page download and readable-text extraction for providers that return
//! only links and snippets.

use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;

use super::{build_client, check_status};
use crate::error::{ResearchError, Result};

/// Default cap on extracted text per page.
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 50_000;

/// Elements that usually hold the article body, tried in order.
const CONTENT_SELECTORS: [&str; 7] = [
    "article",
    "main",
    "[role='main']",
    ".content",
    "#content",
    ".post-content",
    ".entry-content",
];

/// Downloads pages and reduces them to text.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    max_text_length: usize,
}

impl PageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client("fetch", timeout)?,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
        })
    }

    pub fn with_max_text_length(mut self, max: usize) -> Self {
        self.max_text_length = max;
        self
    }

    /// Fetch `url` and return its readable text.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ResearchError::search("fetch", format!("unsupported URL: {}", url)));
        }

        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,text/plain")
            .send()
            .await
            .map_err(|e| ResearchError::search("fetch", format!("{}: {}", url, e)))?;
        let response = check_status("fetch", response).await?;

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_none_or(|ct| ct.contains("html"));

        let body = response
            .text()
            .await
            .map_err(|e| ResearchError::search("fetch", format!("{}: {}", url, e)))?;

        Ok(if is_html {
            extract_text_from_html(&body, self.max_text_length)
        } else {
            truncate(collapse_whitespace(&body), self.max_text_length)
        })
    }
}

/// Extract readable text from an HTML document.
///
/// Prefers the first content container that has text and falls back to the
/// whole body. Script and style contents are dropped. Whitespace collapses to
/// single spaces and the result is cut to `max_len` bytes.
pub fn extract_text_from_html(html: &str, max_len: usize) -> String {
    let document = Html::parse_document(html);

    let mut parts = Vec::new();
    for selector_str in CONTENT_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            for element in document.select(&selector) {
                let text = visible_text(element);
                if !text.trim().is_empty() {
                    parts.push(text);
                }
            }
        }
        if !parts.is_empty() {
            break;
        }
    }

    if parts.is_empty()
        && let Ok(body) = Selector::parse("body")
    {
        parts.extend(document.select(&body).map(visible_text));
    }

    truncate(collapse_whitespace(&parts.join("\n\n")), max_len)
}

fn visible_text(element: scraper::ElementRef<'_>) -> String {
    element
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let parent = node.parent().and_then(|p| p.value().as_element().map(|e| e.name()));
            match parent {
                Some("script" | "style" | "noscript") => None,
                _ => Some(&**text),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(mut text: String, max_len: usize) -> String {
    if text.len() <= max_len {
        return text;
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("...[truncated]");
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_article() {
        let html = r#"
            <html><body>
              <nav>Home | About</nav>
              <article><h1>Title</h1><p>The   real
                 content.</p><script>var x = 1;</script></article>
              <footer>Copyright</footer>
            </body></html>"#;

        assert_eq!(extract_text_from_html(html, 1000), "Title The real content.");
    }

    #[test]
    fn test_falls_back_to_body() {
        let html = "<html><head><style>p{}</style></head><body><p>Hello</p><p>world</p></body></html>";
        assert_eq!(extract_text_from_html(html, 1000), "Hello world");
    }

    #[test]
    fn test_truncates() {
        let html = "<body><p>ünïcödé text that is long</p></body>";
        let text = extract_text_from_html(html, 3);
        assert!(text.starts_with('ü'));
        assert!(text.ends_with("...[truncated]"));
    }

    #[tokio::test]
    async fn test_rejects_non_http() {
        let fetcher = PageFetcher::new(Duration::from_secs(1)).unwrap();
        let err = fetcher.fetch_text("file:///etc/passwd").await.unwrap_err();
        assert!(err.to_string().contains("unsupported URL"));
    }
}
