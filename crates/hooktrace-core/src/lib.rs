//! Session log parsing, turn assembly and trace record building

pub mod assembler;
pub mod builder;
mod config;
pub mod locator;
mod redact;
pub mod transcript;
mod types;

pub use assembler::{AssembledTurn, AssistantReply, ToolCall, ToolOutcome, Turn, TurnAssembler};
pub use builder::RecordBuilder;
pub use config::{Config, ConfigError, LangfuseConfig, OtlpConfig};
pub use locator::{discover_sessions, locate_modified, project_label, CheckpointRead, LocatedSession};
pub use redact::Redactor;
pub use transcript::{parse_line, LogEntry, MalformedLogEntry};
pub use types::{
    Checkpoint, Session, SpanKind, SpanRecord, SpanStatus, TraceRecord, SYSTEM_TAG,
};
