//! Langfuse public ingestion API adapter

use crate::base::{check_status, Backend, BackendError};
use async_trait::async_trait;
use hooktrace_core::{LangfuseConfig, SpanKind, SpanStatus, TraceRecord, SYSTEM_TAG};
use serde_json::{json, Value};

pub const LANGFUSE_BACKEND_ID: &str = "langfuse";

pub struct LangfuseBackend {
    client: reqwest::Client,
    config: LangfuseConfig,
}

impl LangfuseBackend {
    pub fn new(client: reqwest::Client, config: LangfuseConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.host.trim_end_matches('/'), path)
    }
}

/// Ingestion batch for one record: the trace, its generation and one span per tool call
///
/// Event ids derive from the record's ids, so a re-sent record updates the
/// same objects instead of creating new ones.
pub fn ingestion_batch(record: &TraceRecord) -> Value {
    let timestamp = record.effective_start().to_rfc3339();
    let mut batch = Vec::with_capacity(record.spans.len() + 1);

    batch.push(json!({
        "id": format!("{}-trace", record.trace_id),
        "type": "trace-create",
        "timestamp": timestamp,
        "body": {
            "id": record.trace_id,
            "name": record.name,
            "sessionId": record.session_id,
            "timestamp": timestamp,
            "input": {"role": "user", "content": record.input},
            "output": {"role": "assistant", "content": record.output},
            "tags": record.tags,
            "metadata": {
                "source": SYSTEM_TAG,
                "turn_number": record.ordinal,
                "session_id": record.session_id,
                "project": record.project,
            },
        },
    }));

    for span in &record.spans {
        let start = span.start_time.unwrap_or_else(|| record.effective_start());
        let end = span.end_time.unwrap_or(start);
        let mut body = json!({
            "id": span.span_id,
            "traceId": record.trace_id,
            "name": span.name,
            "startTime": start.to_rfc3339(),
            "endTime": end.to_rfc3339(),
            "input": span.input,
            "output": span.output,
            "metadata": span.metadata,
        });
        match span.status {
            SpanStatus::Ok => {}
            SpanStatus::Error => {
                body["level"] = json!("ERROR");
                body["statusMessage"] = json!("tool returned an error");
            }
            SpanStatus::Unresolved => {
                body["level"] = json!("WARNING");
                body["statusMessage"] = json!("no tool result recorded");
            }
        }

        let event_type = match &span.kind {
            SpanKind::Generation => {
                body["model"] = json!(record.model);
                "generation-create"
            }
            SpanKind::Tool(_) => "span-create",
        };

        batch.push(json!({
            "id": format!("{}-{}", span.span_id, event_type),
            "type": event_type,
            "timestamp": start.to_rfc3339(),
            "body": body,
        }));
    }

    json!({ "batch": batch })
}

#[async_trait]
impl Backend for LangfuseBackend {
    fn id(&self) -> &str {
        LANGFUSE_BACKEND_ID
    }

    async fn health_check(&self) -> bool {
        match self.client.get(self.url("/api/public/health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "langfuse health check failed");
                false
            }
        }
    }

    async fn submit(&self, record: &TraceRecord) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.url("/api/public/ingestion"))
            .basic_auth(&self.config.public_key, Some(&self.config.secret_key))
            .json(&ingestion_batch(record))
            .send()
            .await?;
        let response = check_status(response).await?;
        let status = response.status().as_u16();

        // 207 responses list per-event failures
        let body: Value = response.json().await.unwrap_or(Value::Null);
        match body.get("errors").and_then(Value::as_array) {
            Some(errors) if !errors.is_empty() => Err(BackendError::Rejected {
                status,
                body: Value::Array(errors.clone()).to_string(),
            }),
            _ => Ok(()),
        }
    }
}
