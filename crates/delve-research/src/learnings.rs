//! Distilling a learning and follow-up questions from a relevant result.

use delve_llm::{Generator, ObjectSchema};

use crate::error::Result;
use crate::types::{Learning, SearchResult};

fn schema() -> ObjectSchema {
    ObjectSchema::new(
        "learning",
        "Record the learning and follow-up questions.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "learning": { "type": "string" },
                "followUpQuestions": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["learning", "followUpQuestions"]
        }),
    )
}

pub fn learning_prompt(query: &str, result: &SearchResult) -> Result<String> {
    Ok(format!(
        "The user is researching \"{}\". The following search result were deemed relevant.\n\
         Generate a learning and a follow-up question from the following search result:\n\n\
         <search_result>\n{}\n</search_result>",
        query,
        serde_json::to_string(result)?
    ))
}

#[derive(Clone)]
pub struct LearningExtractor {
    generator: Generator,
}

impl LearningExtractor {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }

    /// One learning for `result`, which was found while researching `query`.
    pub async fn extract(&self, query: &str, result: &SearchResult) -> Result<Learning> {
        let prompt = learning_prompt(query, result)?;
        let mut learning: Learning = self.generator.object(&prompt, &schema()).await?;

        learning.learning = learning.learning.trim().to_string();
        learning
            .follow_up_questions
            .retain(|q| !q.trim().is_empty());

        tracing::debug!(
            url = %result.url,
            follow_ups = learning.follow_up_questions.len(),
            "Extracted learning"
        );
        Ok(learning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResearchError;
    use delve_llm::{LlmError, MockBackend, tool_call_response};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_extract() {
        let backend = Arc::new(MockBackend::new(vec![tool_call_response(
            "c1",
            "learning",
            json!({
                "learning": " Shot put throwers need explosive power. ",
                "followUpQuestions": ["What lifts build power?", ""]
            }),
        )]));
        let extractor = LearningExtractor::new(Generator::new(backend.clone(), "m"));
        let result = SearchResult::new("Throwing", "https://t", "Power matters");

        let learning = extractor.extract("shot put", &result).await.unwrap();
        assert_eq!(learning.learning, "Shot put throwers need explosive power.");
        assert_eq!(learning.follow_up_questions, vec!["What lifts build power?"]);

        let prompt = backend.requests()[0].last_user_text().unwrap();
        assert!(prompt.starts_with("The user is researching \"shot put\"."));
        assert!(prompt.contains(r#""url":"https://t""#));
    }

    #[tokio::test]
    async fn test_missing_learning_fails() {
        let backend = Arc::new(MockBackend::new(vec![tool_call_response(
            "c1",
            "learning",
            json!({"followUpQuestions": []}),
        )]));
        let extractor = LearningExtractor::new(Generator::new(backend, "m"));

        let err = extractor
            .extract("q", &SearchResult::new("t", "u", "c"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResearchError::Llm(LlmError::SchemaConformance { .. })
        ));
    }
}
