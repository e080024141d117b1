//! Core types shared by the ingestion pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Tag attached to every trace
pub const SYSTEM_TAG: &str = "claude-code";

/// One conversation and its append-only log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// File stem of the log; keys the checkpoint and the trace ids
    pub id: String,
    /// Conversation id reported to backends: the log's `sessionId`, else `id`
    pub conversation_id: String,
    pub project: String,
    pub log_path: PathBuf,
}

/// Per-session ingestion progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Byte offset into the log, always at a line boundary
    pub offset: u64,
    /// Modification time of the log when it was last examined
    pub last_updated_at: DateTime<Utc>,
    /// Turns converted so far, used to number the next trace
    #[serde(default)]
    pub turn_count: u64,
}

impl Checkpoint {
    /// True when `self` would move the stored checkpoint backwards
    pub fn regresses(&self, stored: &Checkpoint) -> bool {
        self.offset < stored.offset || self.last_updated_at < stored.last_updated_at
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            offset: 0,
            last_updated_at: DateTime::<Utc>::UNIX_EPOCH,
            turn_count: 0,
        }
    }
}

/// Span classification: the assistant's generation or one tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SpanKind {
    Generation,
    Tool(String),
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanKind::Generation => write!(f, "generation"),
            SpanKind::Tool(name) => write!(f, "tool:{}", name),
        }
    }
}

impl FromStr for SpanKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "generation" {
            return Ok(SpanKind::Generation);
        }
        match s.strip_prefix("tool:") {
            Some(name) => Ok(SpanKind::Tool(name.to_string())),
            None => Err(format!("unknown span kind: {}", s)),
        }
    }
}

impl From<SpanKind> for String {
    fn from(kind: SpanKind) -> Self {
        kind.to_string()
    }
}

impl TryFrom<String> for SpanKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
    /// Tool call with no matching result when the turn closed
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub span_id: String,
    pub kind: SpanKind,
    pub name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub status: SpanStatus,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Backend-agnostic representation of one turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub trace_id: String,
    pub name: String,
    pub ordinal: u64,
    pub session_id: String,
    pub project: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub input: String,
    pub output: String,
    pub model: Option<String>,
    pub tags: Vec<String>,
    pub spans: Vec<SpanRecord>,
    /// Build-time metadata, not part of the record's identity
    pub built_at: DateTime<Utc>,
}

impl TraceRecord {
    /// Start time, falling back to the build time for logs without timestamps
    pub fn effective_start(&self) -> DateTime<Utc> {
        self.start_time.unwrap_or(self.built_at)
    }

    pub fn effective_end(&self) -> DateTime<Utc> {
        self.end_time.unwrap_or_else(|| self.effective_start())
    }
}

impl PartialEq for TraceRecord {
    fn eq(&self, other: &Self) -> bool {
        self.trace_id == other.trace_id
            && self.name == other.name
            && self.ordinal == other.ordinal
            && self.session_id == other.session_id
            && self.project == other.project
            && self.start_time == other.start_time
            && self.end_time == other.end_time
            && self.input == other.input
            && self.output == other.output
            && self.model == other.model
            && self.tags == other.tags
            && self.spans == other.spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_kind_serializes_as_string() {
        let json = serde_json::to_string(&SpanKind::Tool("Read".to_string())).unwrap();
        assert_eq!(json, "\"tool:Read\"");
        let parsed: SpanKind = serde_json::from_str("\"generation\"").unwrap();
        assert_eq!(parsed, SpanKind::Generation);
        assert!(serde_json::from_str::<SpanKind>("\"other\"").is_err());
    }

    #[test]
    fn test_checkpoint_default_is_epoch() {
        let cp = Checkpoint::default();
        assert_eq!(cp.offset, 0);
        assert_eq!(cp.last_updated_at.timestamp(), 0);
    }

    #[test]
    fn test_checkpoint_regresses() {
        let stored = Checkpoint {
            offset: 100,
            last_updated_at: Utc::now(),
            turn_count: 2,
        };
        let behind = Checkpoint {
            offset: 50,
            ..stored
        };
        let ahead = Checkpoint {
            offset: 150,
            ..stored
        };
        assert!(behind.regresses(&stored));
        assert!(!ahead.regresses(&stored));
        assert!(!stored.regresses(&stored));
    }

    #[test]
    fn test_checkpoint_backwards_compatible() {
        let old = r#"{"offset":10,"last_updated_at":"2025-01-01T00:00:00Z"}"#;
        let parsed: Checkpoint = serde_json::from_str(old).unwrap();
        assert_eq!(parsed.offset, 10);
        assert_eq!(parsed.turn_count, 0);
    }
}
