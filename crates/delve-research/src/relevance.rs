//! Judging whether a search result helps answer a query.

use serde::Serialize;
use std::fmt;

use delve_llm::Generator;

use crate::error::{ResearchError, Result};
use crate::types::SearchResult;

/// Outcome of a relevance judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Relevant,
    Irrelevant,
}

impl Verdict {
    pub const LABELS: [&'static str; 2] = ["relevant", "irrelevant"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relevant => "relevant",
            Self::Irrelevant => "irrelevant",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "relevant" => Some(Self::Relevant),
            "irrelevant" => Some(Self::Irrelevant),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn relevance_prompt(query: &str, candidate: &SearchResult, existing_urls: &[String]) -> Result<String> {
    Ok(format!(
        "Evaluate whether the search results are relevant and will help answer the following query: {query}. \
         If the page already exists in the existing results, mark it as irrelevant.\n\n\
         <search_results>\n{}\n</search_results>\n\n\
         <existing_results>\n{}\n</existing_results>",
        serde_json::to_string(candidate)?,
        serde_json::to_string(existing_urls)?,
    ))
}

/// Classifies candidates as relevant or not.
///
/// With `strict_dedup`, a candidate whose URL is already known is rejected
/// without consulting the model.
#[derive(Clone)]
pub struct RelevanceFilter {
    generator: Generator,
    strict_dedup: bool,
}

impl RelevanceFilter {
    pub fn new(generator: Generator) -> Self {
        Self {
            generator,
            strict_dedup: true,
        }
    }

    pub fn with_strict_dedup(mut self, strict: bool) -> Self {
        self.strict_dedup = strict;
        self
    }

    pub async fn classify(
        &self,
        query: &str,
        candidate: &SearchResult,
        existing_urls: &[String],
    ) -> Result<Verdict> {
        if self.strict_dedup && existing_urls.iter().any(|u| u == &candidate.url) {
            tracing::debug!(url = %candidate.url, "Already known, skipping evaluation");
            return Ok(Verdict::Irrelevant);
        }

        let prompt = relevance_prompt(query, candidate, existing_urls)?;
        let label = self.generator.choice(&prompt, &Verdict::LABELS).await?;

        Verdict::from_label(&label)
            .ok_or_else(|| ResearchError::internal(format!("unexpected verdict label '{}'", label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_llm::{MockBackend, tool_call_response};
    use serde_json::json;
    use std::sync::Arc;

    fn candidate() -> SearchResult {
        SearchResult::new("Tokio", "https://tokio.rs", "An asynchronous runtime")
    }

    fn filter(label: &str) -> (Arc<MockBackend>, RelevanceFilter) {
        let backend = Arc::new(MockBackend::new(vec![tool_call_response(
            "c1",
            "classify",
            json!({ "label": label }),
        )]));
        (backend.clone(), RelevanceFilter::new(Generator::new(backend, "m")))
    }

    #[tokio::test]
    async fn test_classify_relevant() {
        let (backend, filter) = filter("relevant");
        let existing = vec!["https://docs.rs".to_string()];

        let verdict = filter.classify("async rust", &candidate(), &existing).await.unwrap();
        assert_eq!(verdict, Verdict::Relevant);

        let prompt = backend.requests()[0].last_user_text().unwrap();
        assert!(prompt.contains("following query: async rust."));
        assert!(prompt.contains(r#"<search_results>
{"title":"Tokio","url":"https://tokio.rs","content":"An asynchronous runtime"}"#));
        assert!(prompt.contains(r#"["https://docs.rs"]"#));
    }

    #[tokio::test]
    async fn test_known_url_skips_model() {
        let (backend, filter) = filter("relevant");
        let existing = vec!["https://tokio.rs".to_string()];

        let verdict = filter.classify("q", &candidate(), &existing).await.unwrap();
        assert_eq!(verdict, Verdict::Irrelevant);
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_model_decides_without_strict_dedup() {
        let (backend, filter) = filter("relevant");
        let filter = filter.with_strict_dedup(false);
        let existing = vec!["https://tokio.rs".to_string()];

        let verdict = filter.classify("q", &candidate(), &existing).await.unwrap();
        assert_eq!(verdict, Verdict::Relevant);
        assert_eq!(backend.request_count(), 1);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Irrelevant.to_string(), "irrelevant");
        assert_eq!(serde_json::to_value(Verdict::Relevant).unwrap(), json!("relevant"));
    }
}
