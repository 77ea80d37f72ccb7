//! Append-only JSONL journal of model exchanges.
//!
//! One line per exchange, in `interactions-YYYY-MM-DD.jsonl` under the
//! configured directory. Each line is tagged with the research phase that
//! made the call (`queries`, `evaluate`, `learning`, `report`, ...), so a
//! run's cost can be broken down after the fact.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{CompletionRequest, CompletionResponse, StopReason, ToolChoice, Usage};

const FILE_PREFIX: &str = "interactions-";
const FILE_SUFFIX: &str = ".jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: Uuid,
    /// When the response arrived.
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub model: String,
    pub message_count: usize,
    pub tools_offered: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_tool: Option<String>,
    /// As reported by the provider, which may differ from `model`.
    pub response_model: String,
    pub stop_reason: Option<StopReason>,
    pub usage: Usage,
    pub tool_calls: Vec<String>,
    pub response_chars: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl InteractionRecord {
    pub fn from_exchange(
        request: &CompletionRequest,
        response: &CompletionResponse,
        duration_ms: u64,
    ) -> Self {
        let forced_tool = match &request.tool_choice {
            Some(ToolChoice::Tool { name }) => Some(name.clone()),
            _ => None,
        };
        let tool_calls = response.tool_uses().into_iter().map(|call| call.name).collect();

        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            duration_ms,
            model: request.model.clone(),
            message_count: request.messages.len(),
            tools_offered: request.tools.iter().map(|t| t.name.clone()).collect(),
            forced_tool,
            response_model: response.model.clone(),
            stop_reason: response.stop_reason,
            usage: response.usage.clone(),
            tool_calls,
            response_chars: response.text().chars().count(),
            tags: Vec::new(),
        }
    }

    pub fn with_tag(self, tag: impl Into<String>) -> Self {
        let mut tags = self.tags;
        tags.push(tag.into());
        Self { tags, ..self }
    }
}

/// Mirrors `[logging.interactions]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionLogConfig {
    pub enabled: bool,
    /// Defaults to `<config dir>/delve/interactions`.
    pub path: Option<PathBuf>,
    pub retention_days: u32,
}

impl Default for InteractionLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            retention_days: 30,
        }
    }
}

impl InteractionLogConfig {
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("delve")
                .join("interactions"),
        }
    }
}

/// The file for the current day, reopened when the date rolls over.
struct DailyFile {
    date: NaiveDate,
    writer: BufWriter<File>,
}

pub struct InteractionLogger {
    dir: Option<PathBuf>,
    current: Mutex<Option<DailyFile>>,
}

impl InteractionLogger {
    /// Prepare the directory and delete files past retention.
    /// A disabled config yields a logger that writes nothing.
    pub fn new(config: InteractionLogConfig) -> io::Result<Self> {
        let dir = if config.enabled {
            let dir = config.resolved_path();
            fs::create_dir_all(&dir)?;
            prune(&dir, config.retention_days)?;
            Some(dir)
        } else {
            None
        };

        Ok(Self {
            dir,
            current: Mutex::new(None),
        })
    }

    pub fn log(&self, record: &InteractionRecord) -> io::Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let line = serde_json::to_string(record)?;
        let today = record.timestamp.date_naive();

        let mut current = self.current.lock();
        let file = match current.take() {
            Some(file) if file.date == today => file,
            _ => {
                let path = dir.join(file_name(today));
                let handle = OpenOptions::new().create(true).append(true).open(path)?;
                DailyFile {
                    date: today,
                    writer: BufWriter::new(handle),
                }
            }
        };
        let file = current.insert(file);
        writeln!(file.writer, "{line}")?;
        file.writer.flush()?;

        tracing::trace!(id = %record.id, model = %record.model, "interaction logged");
        Ok(())
    }
}

fn file_name(date: NaiveDate) -> String {
    format!("{FILE_PREFIX}{}{FILE_SUFFIX}", date.format("%Y-%m-%d"))
}

fn file_date(name: &str) -> Option<NaiveDate> {
    let stamp = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(stamp, "%Y-%m-%d").ok()
}

fn prune(dir: &Path, retention_days: u32) -> io::Result<()> {
    let cutoff = Utc::now().date_naive() - chrono::Days::new(u64::from(retention_days));
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if file_date(&name).is_some_and(|date| date < cutoff) {
            fs::remove_file(entry.path())?;
            tracing::info!(file = %name, "removed expired interaction log");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tool_call_response;
    use crate::types::{Message, ToolDefinition};

    fn forced_request() -> CompletionRequest {
        CompletionRequest::new("test-model", vec![Message::user("go")], 1024)
            .with_tools(vec![ToolDefinition::new(
                "queries",
                "",
                serde_json::json!({"type": "object"}),
            )])
            .with_tool_choice(ToolChoice::Tool {
                name: "queries".into(),
            })
    }

    fn enabled_in(dir: &Path, retention_days: u32) -> InteractionLogConfig {
        InteractionLogConfig {
            enabled: true,
            path: Some(dir.to_path_buf()),
            retention_days,
        }
    }

    #[test]
    fn test_record_captures_exchange() {
        let response = tool_call_response("call-1", "queries", serde_json::json!({"queries": []}));
        let record = InteractionRecord::from_exchange(&forced_request(), &response, 150)
            .with_tag("queries");

        assert_eq!(record.model, "test-model");
        assert_eq!(record.duration_ms, 150);
        assert_eq!(record.tools_offered, vec!["queries"]);
        assert_eq!(record.forced_tool.as_deref(), Some("queries"));
        assert_eq!(record.tool_calls, vec!["queries"]);
        assert_eq!(record.tags, vec!["queries"]);
    }

    #[test]
    fn test_disabled_logger_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = InteractionLogConfig {
            enabled: false,
            ..enabled_in(dir.path(), 30)
        };
        let logger = InteractionLogger::new(config).unwrap();

        let response = tool_call_response("c", "queries", serde_json::json!({}));
        logger
            .log(&InteractionRecord::from_exchange(&forced_request(), &response, 5))
            .unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_lines_append_to_daily_file() {
        let dir = tempfile::tempdir().unwrap();
        let logger = InteractionLogger::new(enabled_in(dir.path(), 30)).unwrap();

        let response = tool_call_response("c", "queries", serde_json::json!({}));
        for ms in [75, 80] {
            let record = InteractionRecord::from_exchange(&forced_request(), &response, ms);
            logger.log(&record).unwrap();
        }

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name();
        assert!(file_date(&name.to_string_lossy()).is_some());

        let content = fs::read_to_string(entries[0].path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let last: InteractionRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(last.duration_ms, 80);
    }

    #[test]
    fn test_expired_files_pruned() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("interactions-2000-01-01.jsonl"), "{}\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        InteractionLogger::new(enabled_in(dir.path(), 7)).unwrap();

        assert!(!dir.path().join("interactions-2000-01-01.jsonl").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_file_name_round_trips_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(file_name(date), "interactions-2025-03-09.jsonl");
        assert_eq!(file_date(&file_name(date)), Some(date));
        assert_eq!(file_date("interactions-latest.jsonl"), None);
    }
}
