//! Recursive deep research.
//!
//! A run starts from one prompt and alternates between the phases below,
//! accumulating everything into a single [`Research`] record that is finally
//! handed to the [`ReportSynthesizer`].
//!
//! ```text
//!  prompt ──► QueryGenerator ──► query ──► SearchAndEvaluate ──► results
//!                  ▲                        (search / evaluate       │
//!                  │                         tool loop)              ▼
//!                  └──── follow-up prompt ◄── LearningExtractor ◄────┘
//!                        (depth - 1, breadth / 2)
//! ```

pub mod driver;
pub mod error;
pub mod evaluate;
pub mod learnings;
pub mod queries;
pub mod relevance;
pub mod report;
pub mod search;
pub mod tool;
pub mod tool_loop;
pub mod types;

pub use driver::{DEFAULT_BREADTH, DEFAULT_DEPTH, DeepResearch, FailurePolicy};
pub use error::{ResearchError, Result};
pub use evaluate::{DEFAULT_MAX_REQUERIES, DEFAULT_MAX_STEPS, SearchAndEvaluate};
pub use learnings::LearningExtractor;
pub use queries::{MAX_QUERIES, QueryGenerator};
pub use relevance::{RelevanceFilter, Verdict};
pub use report::{FileSink, ReportSink, ReportSynthesizer};
pub use search::{
    BraveSearch, ExaSearch, MockSearch, SearchOptions, SearchProvider, SharedSearch, TavilySearch,
};
pub use tool::{Tool, ToolContext, ToolRegistry, ToolResult};
pub use tool_loop::{LoopTrace, ToolCallRecord, ToolLoop};
pub use types::{Learning, Research, ResearchSummary, SearchResult};
