//! Turning a finished research record into a written report.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use delve_llm::Generator;

use crate::error::Result;
use crate::types::Research;

const PERSONA_DIRECTIVES: &str = "  - You may be asked to research subjects that is after your knowledge cutoff, assume the user is right when presented with news.
  - The user is a highly experienced analyst, no need to simplify it, be as detailed as possible and make sure your response is correct.
  - Be highly organized.
  - Suggest solutions that I didn't think about.
  - Be proactive and anticipate my needs.
  - Treat me as an expert in all subject matter.
  - Mistakes erode my trust, so be accurate and thorough.
  - Provide detailed explanations, I'm comfortable with lots of detail.
  - Value good arguments over authorities, the source is irrelevant.
  - Consider new technologies and contrarian ideas, not just the conventional wisdom.
  - You may use high levels of speculation or prediction, just flag it for me.
  - Use Markdown formatting.";

/// The expert-researcher persona, dated `today`.
pub fn system_prompt(today: DateTime<Utc>) -> String {
    format!(
        "You are an expert researcher. Today is {}. Follow these instructions when responding:\n{}",
        today.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        PERSONA_DIRECTIVES
    )
}

pub fn report_prompt(research: &Research) -> Result<String> {
    Ok(format!(
        "Generate a report based on the following research data:\n\n{}",
        serde_json::to_string_pretty(research)?
    ))
}

#[derive(Clone)]
pub struct ReportSynthesizer {
    generator: Generator,
}

impl ReportSynthesizer {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }

    /// Write the report. The whole record goes into a single call.
    pub async fn synthesize(&self, research: &Research) -> Result<String> {
        let prompt = report_prompt(research)?;
        tracing::debug!(
            prompt_bytes = prompt.len(),
            model = self.generator.model(),
            "Synthesizing report"
        );

        let report = self
            .generator
            .text(&prompt, Some(&system_prompt(Utc::now())))
            .await?;
        Ok(report)
    }
}

/// Where a finished report goes.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn persist(&self, report: &str) -> Result<()>;

    /// Human-readable destination, for logs.
    fn describe(&self) -> String;
}

/// Writes the report to a file, creating parent directories.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ReportSink for FileSink {
    async fn persist(&self, report: &str) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, report).await?;
        tracing::debug!(path = %self.path.display(), bytes = report.len(), "Report written");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
