//! Turn to trace record mapping

use crate::assembler::{ToolOutcome, Turn};
use crate::redact::Redactor;
use crate::types::{Session, SpanKind, SpanRecord, SpanStatus, TraceRecord, SYSTEM_TAG};
use chrono::Utc;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

pub const GENERATION_SPAN_NAME: &str = "Claude Response";
const DEFAULT_MODEL: &str = "claude";

/// Builds trace records; deterministic apart from `built_at`
#[derive(Debug, Clone, Default)]
pub struct RecordBuilder {
    redactor: Redactor,
}

impl RecordBuilder {
    pub fn new(redactor: Redactor) -> Self {
        Self { redactor }
    }

    pub fn build(&self, session: &Session, ordinal: u64, turn: &Turn) -> TraceRecord {
        let trace_id = trace_id(&session.id, turn.start_offset);
        let input = self.redactor.redact_text(&turn.user_text);
        let output = self.redactor.redact_text(turn.final_output());
        let model = turn.model().unwrap_or(DEFAULT_MODEL).to_string();

        let mut spans = Vec::with_capacity(turn.tool_calls.len() + 1);

        let generation_start = turn
            .replies
            .first()
            .and_then(|r| r.timestamp)
            .or(turn.user_timestamp);
        let generation_end = turn
            .replies
            .iter()
            .rev()
            .find_map(|r| r.timestamp)
            .or(generation_start);
        let mut generation_meta = Map::new();
        generation_meta.insert("tool_count".into(), json!(turn.tool_calls.len()));
        generation_meta.insert("model".into(), json!(model));
        spans.push(SpanRecord {
            span_id: span_id(&trace_id, 0),
            kind: SpanKind::Generation,
            name: GENERATION_SPAN_NAME.to_string(),
            start_time: generation_start,
            end_time: generation_end,
            input: json!({"role": "user", "content": input}),
            output: json!({"role": "assistant", "content": output}),
            status: SpanStatus::Ok,
            metadata: generation_meta,
        });

        for (index, call) in turn.tool_calls.iter().enumerate() {
            let (output_value, status, end_time) = match &call.outcome {
                ToolOutcome::Resolved {
                    content,
                    is_error,
                    completed_at,
                } => (
                    self.redactor.redact_value(content),
                    if *is_error {
                        SpanStatus::Error
                    } else {
                        SpanStatus::Ok
                    },
                    completed_at.or(call.invoked_at),
                ),
                ToolOutcome::Unresolved => (Value::Null, SpanStatus::Unresolved, call.invoked_at),
            };

            let mut metadata = Map::new();
            metadata.insert("tool_name".into(), json!(call.name));
            metadata.insert("tool_id".into(), json!(call.id));

            spans.push(SpanRecord {
                span_id: span_id(&trace_id, index + 1),
                kind: SpanKind::Tool(call.name.clone()),
                name: format!("Tool: {}", call.name),
                start_time: call.invoked_at,
                end_time,
                input: self.redactor.redact_value(&call.input),
                output: output_value,
                status,
                metadata,
            });
        }

        let mut tags = vec![SYSTEM_TAG.to_string()];
        if !session.project.is_empty() {
            tags.push(session.project.clone());
        }

        TraceRecord {
            trace_id,
            name: format!("Turn {}", ordinal),
            ordinal,
            session_id: session.conversation_id.clone(),
            project: session.project.clone(),
            start_time: turn.user_timestamp,
            end_time: turn.last_timestamp,
            input,
            output,
            model: Some(model),
            tags,
            spans,
            built_at: Utc::now(),
        }
    }
}

/// 32 hex chars identifying the turn starting at `start_offset`
pub fn trace_id(session_id: &str, start_offset: u64) -> String {
    hex_digest(&format!("{}:{}", session_id, start_offset), 16)
}

/// 16 hex chars identifying a span within a trace
pub fn span_id(trace_id: &str, index: usize) -> String {
    hex_digest(&format!("{}:{}", trace_id, index), 8)
}

fn hex_digest(input: &str, bytes: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest[..bytes].iter().map(|b| format!("{:02x}", b)).collect()
}
