//! Session log line parsing
//!
//! A line is either a canonical tagged entry
//! (`{"type":"user_message" | "assistant_message" | "tool_invocation" | "tool_result", ...}`)
//! or an assistant transcript line (`{"type":"user" | "assistant", "message": {...}}`)
//! which may expand into several entries.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    UserMessage {
        text: String,
        timestamp: Option<DateTime<Utc>>,
    },
    AssistantMessage {
        message_id: Option<String>,
        model: Option<String>,
        text: String,
        /// `end_turn`, `tool_use`, ...; absent while a streamed message is still being written
        stop_reason: Option<String>,
        timestamp: Option<DateTime<Utc>>,
    },
    ToolInvocation {
        id: String,
        name: String,
        input: Value,
        timestamp: Option<DateTime<Utc>>,
    },
    ToolResult {
        tool_use_id: String,
        content: Value,
        is_error: bool,
        timestamp: Option<DateTime<Utc>>,
    },
}

/// Whether a stop reason means the assistant is done with the turn
pub fn is_terminal_stop_reason(reason: &str) -> bool {
    matches!(reason, "end_turn" | "stop_sequence" | "max_tokens")
}

impl LogEntry {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            LogEntry::UserMessage { timestamp, .. }
            | LogEntry::AssistantMessage { timestamp, .. }
            | LogEntry::ToolInvocation { timestamp, .. }
            | LogEntry::ToolResult { timestamp, .. } => *timestamp,
        }
    }
}

/// A line that could not be turned into entries
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("malformed log entry: {reason}")]
pub struct MalformedLogEntry {
    pub reason: String,
}

impl MalformedLogEntry {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CanonicalLine {
    UserMessage {
        #[serde(alias = "content")]
        text: Value,
        #[serde(default)]
        timestamp: Option<String>,
    },
    AssistantMessage {
        #[serde(alias = "content")]
        text: Value,
        #[serde(default, alias = "id")]
        message_id: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        stop_reason: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    ToolInvocation {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
        #[serde(default)]
        timestamp: Option<String>,
    },
    ToolResult {
        #[serde(alias = "id")]
        tool_use_id: String,
        #[serde(default, alias = "output")]
        content: Value,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        timestamp: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptLine {
    message: TranscriptMessage,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    is_meta: bool,
}

#[derive(Deserialize)]
struct TranscriptMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    content: Value,
}

/// Parse one log line into zero or more entries
///
/// Lines of unrelated types (summaries, snapshots, system notices) yield
/// no entries. Only lines that are not JSON objects, or that carry a known
/// type without its required fields, are malformed.
pub fn parse_line(line: &str) -> Result<Vec<LogEntry>, MalformedLogEntry> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| MalformedLogEntry::new(e.to_string()))?;
    if !value.is_object() {
        return Err(MalformedLogEntry::new("line is not a JSON object"));
    }

    let line_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .or_else(|| value.pointer("/message/role").and_then(|r| r.as_str()))
        .unwrap_or("")
        .to_string();

    match line_type.as_str() {
        "user_message" | "assistant_message" | "tool_invocation" | "tool_result" => {
            let line: CanonicalLine = serde_json::from_value(value)
                .map_err(|e| MalformedLogEntry::new(format!("{}: {}", line_type, e)))?;
            Ok(vec![from_canonical(line)])
        }
        "user" | "human" => {
            let line: TranscriptLine = serde_json::from_value(value)
                .map_err(|e| MalformedLogEntry::new(format!("{}: {}", line_type, e)))?;
            Ok(from_user_line(line))
        }
        "assistant" => {
            let line: TranscriptLine = serde_json::from_value(value)
                .map_err(|e| MalformedLogEntry::new(format!("{}: {}", line_type, e)))?;
            Ok(from_assistant_line(line))
        }
        _ => Ok(Vec::new()),
    }
}

fn from_canonical(line: CanonicalLine) -> LogEntry {
    match line {
        CanonicalLine::UserMessage { text, timestamp } => LogEntry::UserMessage {
            text: text_content(&text),
            timestamp: parse_timestamp(timestamp.as_deref()),
        },
        CanonicalLine::AssistantMessage {
            text,
            message_id,
            model,
            stop_reason,
            timestamp,
        } => LogEntry::AssistantMessage {
            message_id,
            model,
            text: text_content(&text),
            stop_reason,
            timestamp: parse_timestamp(timestamp.as_deref()),
        },
        CanonicalLine::ToolInvocation {
            id,
            name,
            input,
            timestamp,
        } => LogEntry::ToolInvocation {
            id,
            name,
            input,
            timestamp: parse_timestamp(timestamp.as_deref()),
        },
        CanonicalLine::ToolResult {
            tool_use_id,
            content,
            is_error,
            timestamp,
        } => LogEntry::ToolResult {
            tool_use_id,
            content,
            is_error,
            timestamp: parse_timestamp(timestamp.as_deref()),
        },
    }
}

fn from_user_line(line: TranscriptLine) -> Vec<LogEntry> {
    if line.is_meta {
        return Vec::new();
    }
    let timestamp = parse_timestamp(line.timestamp.as_deref());
    let content = &line.message.content;

    let results: Vec<LogEntry> = blocks_of_type(content, "tool_result")
        .map(|block| LogEntry::ToolResult {
            tool_use_id: block
                .get("tool_use_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            content: block.get("content").cloned().unwrap_or(Value::Null),
            is_error: block
                .get("is_error")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            timestamp,
        })
        .collect();

    if !results.is_empty() {
        return results;
    }

    vec![LogEntry::UserMessage {
        text: text_content(content),
        timestamp,
    }]
}

fn from_assistant_line(line: TranscriptLine) -> Vec<LogEntry> {
    let timestamp = parse_timestamp(line.timestamp.as_deref());
    let content = &line.message.content;

    let mut entries = vec![LogEntry::AssistantMessage {
        message_id: line.message.id.clone(),
        model: line.message.model.clone(),
        text: text_content(content),
        stop_reason: line.message.stop_reason.clone(),
        timestamp,
    }];

    entries.extend(blocks_of_type(content, "tool_use").map(|block| {
        LogEntry::ToolInvocation {
            id: block
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            name: block
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            input: block.get("input").cloned().unwrap_or(Value::Null),
            timestamp,
        }
    }));

    entries
}

fn blocks_of_type<'a>(content: &'a Value, block_type: &'a str) -> impl Iterator<Item = &'a Value> {
    content
        .as_array()
        .into_iter()
        .flatten()
        .filter(move |item| item.get("type").and_then(|t| t.as_str()) == Some(block_type))
}

/// Extract display text from a string or a list of content blocks
pub fn text_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(_) if item.get("type").and_then(|t| t.as_str()) == Some("text") => {
                    Some(
                        item.get("text")
                            .and_then(|t| t.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    )
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
