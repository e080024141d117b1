//! OTLP/HTTP JSON trace exporter

use crate::base::{check_status, Backend, BackendError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hooktrace_core::{OtlpConfig, SpanStatus, TraceRecord, SYSTEM_TAG};
use serde_json::{json, Value};

pub const OTLP_BACKEND_ID: &str = "otlp";
const SERVICE_NAME: &str = "hooktrace";

// SpanKind and StatusCode values from the OTLP protobuf definitions
const SPAN_KIND_INTERNAL: u8 = 1;
const STATUS_UNSET: u8 = 0;
const STATUS_OK: u8 = 1;
const STATUS_ERROR: u8 = 2;

pub struct OtlpBackend {
    client: reqwest::Client,
    config: OtlpConfig,
}

impl OtlpBackend {
    pub fn new(client: reqwest::Client, config: OtlpConfig) -> Self {
        Self { client, config }
    }

    fn base(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }
}

fn nanos(at: DateTime<Utc>) -> String {
    at.timestamp_nanos_opt().unwrap_or_default().to_string()
}

fn string_attr(key: &str, value: impl Into<String>) -> Value {
    json!({"key": key, "value": {"stringValue": value.into()}})
}

fn payload_attr(key: &str, value: &Value) -> Value {
    match value {
        Value::String(s) => string_attr(key, s.as_str()),
        other => string_attr(key, other.to_string()),
    }
}

/// OTLP span id of the root span of a record
pub fn root_span_id(record: &TraceRecord) -> String {
    record
        .trace_id
        .get(..16)
        .unwrap_or(&record.trace_id)
        .to_string()
}

/// `ExportTraceServiceRequest` in OTLP JSON encoding: one root span for the
/// turn and one child span per record span
pub fn export_request(record: &TraceRecord) -> Value {
    let root_id = root_span_id(record);
    let start = record.effective_start();
    let end = record.effective_end();

    let mut root_attributes = vec![
        string_attr("hooktrace.session.id", record.session_id.as_str()),
        string_attr("hooktrace.project", record.project.as_str()),
        string_attr("hooktrace.turn.number", record.ordinal.to_string()),
        string_attr("hooktrace.tags", record.tags.join(",")),
        string_attr("input.value", record.input.as_str()),
        string_attr("output.value", record.output.as_str()),
    ];
    if let Some(model) = &record.model {
        root_attributes.push(string_attr("gen_ai.request.model", model.as_str()));
    }

    let mut spans = vec![json!({
        "traceId": record.trace_id,
        "spanId": root_id,
        "name": record.name,
        "kind": SPAN_KIND_INTERNAL,
        "startTimeUnixNano": nanos(start),
        "endTimeUnixNano": nanos(end),
        "attributes": root_attributes,
        "status": {"code": STATUS_OK},
    })];

    for span in &record.spans {
        let span_start = span.start_time.unwrap_or(start);
        let span_end = span.end_time.unwrap_or(span_start);
        let status = match span.status {
            SpanStatus::Ok => json!({"code": STATUS_OK}),
            SpanStatus::Error => json!({"code": STATUS_ERROR, "message": "tool returned an error"}),
            SpanStatus::Unresolved => json!({"code": STATUS_UNSET, "message": "no tool result recorded"}),
        };
        spans.push(json!({
            "traceId": record.trace_id,
            "spanId": span.span_id,
            "parentSpanId": root_id,
            "name": span.name,
            "kind": SPAN_KIND_INTERNAL,
            "startTimeUnixNano": nanos(span_start),
            "endTimeUnixNano": nanos(span_end),
            "attributes": [
                string_attr("hooktrace.span.kind", span.kind.to_string()),
                payload_attr("input.value", &span.input),
                payload_attr("output.value", &span.output),
            ],
            "status": status,
        }));
    }

    json!({
        "resourceSpans": [{
            "resource": {
                "attributes": [
                    string_attr("service.name", SERVICE_NAME),
                    string_attr("telemetry.source", SYSTEM_TAG),
                ],
            },
            "scopeSpans": [{
                "scope": {"name": SERVICE_NAME, "version": env!("CARGO_PKG_VERSION")},
                "spans": spans,
            }],
        }],
    })
}

#[async_trait]
impl Backend for OtlpBackend {
    fn id(&self) -> &str {
        OTLP_BACKEND_ID
    }

    /// Collectors expose no standard health route; any HTTP answer means the port is up
    async fn health_check(&self) -> bool {
        match self.client.get(self.base()).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "otlp endpoint unreachable");
                false
            }
        }
    }

    async fn submit(&self, record: &TraceRecord) -> Result<(), BackendError> {
        let mut request = self
            .client
            .post(format!("{}/v1/traces", self.base()))
            .json(&export_request(record));
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        check_status(response).await?;
        Ok(())
    }
}
