//! End-to-end research runs against a scripted model and search provider.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use delve_llm::{
    CompletionRequest, CompletionResponse, ContentBlock, Generator, LlmError, MockBackend,
    text_response, tool_call_response,
};
use delve_research::{
    DeepResearch, FailurePolicy, LearningExtractor, MockSearch, QueryGenerator, RelevanceFilter,
    ResearchError, SearchAndEvaluate, SearchResult,
};
use serde_json::json;

type QueryScript = Box<dyn Fn(&str, usize) -> Vec<String> + Send + Sync>;
type LearningScript = Box<dyn Fn(&str) -> Result<serde_json::Value, LlmError> + Send + Sync>;

fn schema_forced(req: &CompletionRequest, name: &str) -> bool {
    req.tools.len() == 1 && req.tools[0].name == name
}

fn url_in(prompt: &str) -> String {
    prompt
        .split("\"url\":\"")
        .nth(1)
        .and_then(|s| s.split('"').next())
        .unwrap_or_default()
        .to_string()
}

fn last_tool_output(req: &CompletionRequest) -> String {
    req.messages
        .last()
        .map(|m| m.content.blocks())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|b| match b {
            ContentBlock::ToolResult { content, .. } => Some(content),
            _ => None,
        })
        .collect()
}

/// The researcher persona: search for the loop's query, evaluate what came
/// back, and stop once told to.
fn researcher_move(req: &CompletionRequest) -> CompletionResponse {
    let query = req.messages[0]
        .content
        .to_text()
        .trim_start_matches("Search the web for information about ")
        .to_string();

    if req.messages.len() == 1 {
        return tool_call_response("s", "search", json!({ "query": query }));
    }

    let output = last_tool_output(req);
    if output.contains("End research") {
        text_response("Done.")
    } else if output.contains("search again") {
        tool_call_response("s", "search", json!({ "query": query }))
    } else if output.trim() == "[]" {
        text_response("Nothing found.")
    } else {
        tool_call_response("e", "evaluate", json!({}))
    }
}

struct Harness {
    backend: Arc<MockBackend>,
    search: Arc<MockSearch>,
    query_calls: Arc<AtomicUsize>,
}

impl Harness {
    fn new(queries: QueryScript, learning: LearningScript, search: MockSearch) -> Self {
        let query_calls = Arc::new(AtomicUsize::new(0));
        let counter = query_calls.clone();

        let backend = Arc::new(MockBackend::with_handler(move |req| {
            let prompt = req.last_user_text().unwrap_or_default();

            if schema_forced(req, "queries") {
                counter.fetch_add(1, Ordering::SeqCst);
                let rest = prompt.trim_start_matches("Generate ");
                let (n, goal) = rest
                    .split_once(" search queries for the following query: ")
                    .unwrap_or(("1", rest));
                let n: usize = n.parse().unwrap_or(1);
                return Ok(tool_call_response("q", "queries", json!({ "queries": queries(goal, n) })));
            }
            if schema_forced(req, "classify") {
                return Ok(tool_call_response("c", "classify", json!({ "label": "relevant" })));
            }
            if schema_forced(req, "learning") {
                return learning(&url_in(&prompt)).map(|v| tool_call_response("l", "learning", v));
            }
            Ok(researcher_move(req))
        }));

        Self {
            backend,
            search: Arc::new(search),
            query_calls,
        }
    }

    fn driver(&self) -> DeepResearch {
        let generator = Generator::new(self.backend.clone(), "mock-model");
        DeepResearch::new(
            QueryGenerator::new(generator.clone()),
            SearchAndEvaluate::new(
                generator.clone(),
                self.search.clone(),
                RelevanceFilter::new(generator.clone()),
            ),
            LearningExtractor::new(generator),
        )
    }

    fn query_generations(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

fn page(url: &str) -> SearchResult {
    SearchResult::new(format!("About {url}"), url, format!("Text of {url}"))
}

fn no_follow_ups() -> LearningScript {
    Box::new(|url| Ok(json!({ "learning": format!("Learned from {url}"), "followUpQuestions": [] })))
}

fn with_follow_ups() -> LearningScript {
    Box::new(|url| {
        Ok(json!({
            "learning": format!("Learned from {url}"),
            "followUpQuestions": [format!("What else about {url}?")]
        }))
    })
}

/// Queries named by a global counter so every one is distinct.
fn numbered_queries() -> QueryScript {
    let next = Arc::new(AtomicUsize::new(0));
    Box::new(move |_, n| {
        (0..n)
            .map(|_| format!("query {}", next.fetch_add(1, Ordering::SeqCst)))
            .collect()
    })
}

/// Every query gets its own page.
fn page_per_query() -> MockSearch {
    let mut search = MockSearch::new();
    for i in 0..64 {
        let query = format!("query {i}");
        search = search.with_results(&query, vec![page(&format!("https://site/{i}"))]);
    }
    search
}

#[tokio::test]
async fn depth_one_breadth_two_scenario() {
    let harness = Harness::new(
        Box::new(|goal, _| {
            assert_eq!(goal, "X");
            vec!["X query A".into(), "X query B".into()]
        }),
        no_follow_ups(),
        MockSearch::new()
            .with_results("X query A", vec![page("https://a")])
            .with_results("X query B", vec![page("https://b")]),
    );

    let research = harness.driver().run("X", 1, 2).await.unwrap();

    assert_eq!(research.query.as_deref(), Some("X"));
    assert_eq!(research.queries, vec!["X query A", "X query B"]);
    assert_eq!(research.search_results.len(), 2);
    assert_eq!(research.learnings.len(), 2);
    assert_eq!(research.completed_queries, vec!["X query A", "X query B"]);
    assert_eq!(research.learnings[1].learning, "Learned from https://b");
    // depth 0 below: no further query generation
    assert_eq!(harness.query_generations(), 1);
    assert_eq!(harness.search.calls(), vec!["X query A", "X query B"]);
}

#[tokio::test]
async fn depth_zero_makes_no_calls() {
    let harness = Harness::new(numbered_queries(), no_follow_ups(), MockSearch::new());

    let research = harness.driver().run("anything", 0, 3).await.unwrap();

    assert_eq!(research.query.as_deref(), Some("anything"));
    assert!(research.queries.is_empty());
    assert!(research.search_results.is_empty());
    assert_eq!(harness.backend.request_count(), 0);
    assert!(harness.search.calls().is_empty());
}

#[tokio::test]
async fn breadth_zero_makes_no_calls() {
    let harness = Harness::new(numbered_queries(), no_follow_ups(), MockSearch::new());

    let research = harness.driver().run("anything", 3, 0).await.unwrap();

    assert_eq!(research.query.as_deref(), Some("anything"));
    assert_eq!(harness.backend.request_count(), 0);
}

#[tokio::test]
async fn breadth_one_generates_one_query_per_level() {
    let harness = Harness::new(numbered_queries(), with_follow_ups(), page_per_query());

    let research = harness.driver().run("goal", 3, 1).await.unwrap();

    assert_eq!(harness.query_generations(), 3);
    assert_eq!(research.completed_queries, vec!["query 0", "query 1", "query 2"]);
    assert_eq!(research.search_results.len(), 3);
    assert_eq!(research.query.as_deref(), Some("goal"));

    // every query-generation prompt below the top carries the overall goal
    let follow_up_prompts: Vec<String> = harness
        .backend
        .requests()
        .iter()
        .filter(|r| schema_forced(r, "queries"))
        .skip(1)
        .filter_map(|r| r.last_user_text())
        .collect();
    assert_eq!(follow_up_prompts.len(), 2);
    assert!(follow_up_prompts[0].contains("Overall research goal: goal\n"));
    assert!(follow_up_prompts[0].contains("Follow-up questions: What else about https://site/0?"));
    assert!(follow_up_prompts[1].contains("Previous search queries: query 0, query 1"));
}

#[tokio::test]
async fn breadth_halves_at_each_level() {
    let harness = Harness::new(numbered_queries(), with_follow_ups(), page_per_query());

    let research = harness.driver().run("goal", 3, 4).await.unwrap();

    // 1 + 4 + 8 generations; 4 + 8 + 8 accepted pages
    assert_eq!(harness.query_generations(), 13);
    assert_eq!(research.search_results.len(), 20);

    let requested: Vec<String> = harness
        .backend
        .requests()
        .iter()
        .filter(|r| schema_forced(r, "queries"))
        .filter_map(|r| r.last_user_text())
        .map(|p| p.split(" search queries").next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(requested[0], "Generate 4");
    assert_eq!(requested[1], "Generate 2");
    assert_eq!(requested[2], "Generate 1");
}

#[tokio::test]
async fn no_duplicate_urls_enter_the_record() {
    // Every search lands on the same page and the classifier accepts
    // everything, so only deduplication keeps the record clean.
    let harness = Harness::new(
        numbered_queries(),
        with_follow_ups(),
        MockSearch::new().with_fallback(vec![page("https://same")]),
    );

    let research = harness.driver().run("goal", 2, 2).await.unwrap();

    let urls: HashSet<&str> = research.search_results.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(urls.len(), research.search_results.len());
    assert_eq!(research.search_results.len(), 1);
    assert_eq!(research.summary().unique_urls, 1);
}

#[tokio::test]
async fn results_and_learnings_stay_in_lockstep() {
    let harness = Harness::new(numbered_queries(), with_follow_ups(), page_per_query());

    let research = harness.driver().run("goal", 2, 3).await.unwrap();

    assert!(!research.search_results.is_empty());
    assert_eq!(research.search_results.len(), research.learnings.len());
    assert_eq!(research.search_results.len(), research.completed_queries.len());
}

#[tokio::test]
async fn failed_query_is_skipped_under_continue() {
    let harness = Harness::new(
        Box::new(|_, _| vec!["broken".into(), "fine".into()]),
        no_follow_ups(),
        MockSearch::new()
            .failing("broken")
            .with_results("fine", vec![page("https://fine")]),
    );

    let research = harness.driver().run("goal", 1, 2).await.unwrap();

    assert_eq!(research.completed_queries, vec!["fine"]);
    assert_eq!(research.search_results.len(), 1);
}

#[tokio::test]
async fn failed_query_aborts_under_abort() {
    let harness = Harness::new(
        Box::new(|_, _| vec!["broken".into(), "fine".into()]),
        no_follow_ups(),
        MockSearch::new()
            .failing("broken")
            .with_results("fine", vec![page("https://fine")]),
    );

    let err = harness
        .driver()
        .with_failure_policy(FailurePolicy::Abort)
        .run("goal", 1, 2)
        .await
        .unwrap_err();

    assert!(matches!(err, ResearchError::Search { .. }));
    assert_eq!(harness.search.calls(), vec!["broken"]);
}

#[tokio::test]
async fn unlearnable_results_are_withdrawn() {
    let search =
        MockSearch::new().with_results("only", vec![page("https://first"), page("https://last")]);
    let harness = Harness::new(
        Box::new(|_, _| vec!["only".into()]),
        Box::new(|url| {
            if url == "https://last" {
                Err(LlmError::schema("learning", "no learning"))
            } else {
                Ok(json!({ "learning": "ok", "followUpQuestions": [] }))
            }
        }),
        search,
    );

    let evaluator_options = delve_research::SearchOptions {
        live_crawl: true,
        max_results: 2,
    };
    let generator = Generator::new(harness.backend.clone(), "mock-model");
    let driver = DeepResearch::new(
        QueryGenerator::new(generator.clone()),
        SearchAndEvaluate::new(
            generator.clone(),
            harness.search.clone(),
            RelevanceFilter::new(generator.clone()),
        )
        .with_options(evaluator_options),
        LearningExtractor::new(generator),
    );

    let research = driver.run("goal", 1, 1).await.unwrap();

    // evaluate is LIFO, so only the last page was accepted; its learning
    // failed and the query was skipped without leaving an orphan result
    assert!(research.search_results.is_empty());
    assert!(research.learnings.is_empty());
    assert!(research.completed_queries.is_empty());
}

#[tokio::test]
async fn top_level_query_failure_propagates() {
    let harness = Harness::new(Box::new(|_, _| Vec::new()), no_follow_ups(), MockSearch::new());

    let err = harness.driver().run("goal", 2, 2).await.unwrap_err();
    assert!(matches!(
        err,
        ResearchError::Llm(LlmError::SchemaConformance { .. })
    ));
}
