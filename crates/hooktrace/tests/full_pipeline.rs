mod common;

use common::{tool_turn, Workspace};
use hooktrace::Orchestrator;
use hooktrace_core::{LangfuseConfig, OtlpConfig};
use hooktrace_store::Paths;
use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn langfuse_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/public/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/public/ingestion"))
        .respond_with(ResponseTemplate::new(207).set_body_json(serde_json::json!({"successes": [], "errors": []})))
        .mount(&server)
        .await;
    server
}

async fn otlp_server(status: u16) -> MockServer {
    let server = MockServer::start().await;
    mount_otlp(&server, status).await;
    server
}

async fn mount_otlp(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/v1/traces"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn bodies(server: &MockServer, route: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == route)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

fn orchestrator(workspace: &Workspace, langfuse: &MockServer, otlp: &MockServer) -> Orchestrator {
    let mut config = workspace.config.clone();
    config.backend_timeout = Duration::from_secs(2);
    config.langfuse = Some(LangfuseConfig {
        public_key: "pk-lf-local".to_string(),
        secret_key: "sk-lf-local".to_string(),
        host: langfuse.uri(),
    });
    config.otlp = Some(OtlpConfig {
        endpoint: otlp.uri(),
        headers: Vec::new(),
    });
    let dispatcher = hooktrace_backends::from_config(&config).unwrap();
    Orchestrator::new(&config, &Paths::new(&config).unwrap(), dispatcher)
}

#[tokio::test]
async fn test_transcript_turns_reach_both_backends() {
    let workspace = Workspace::new();
    let langfuse = langfuse_server().await;
    let otlp = otlp_server(200).await;

    let mut lines = tool_turn(1);
    lines.extend(tool_turn(2));
    workspace.append("sess-a", &lines, 1_740_000_000);

    let summary = orchestrator(&workspace, &langfuse, &otlp).run().await;
    assert_eq!(summary.turns, 2);
    assert_eq!(summary.records_delivered, 2);
    assert_eq!(summary.queue_depth, 0);

    let batches = bodies(&langfuse, "/api/public/ingestion").await;
    assert_eq!(batches.len(), 2);
    let trace = &batches[0]["batch"][0]["body"];
    assert_eq!(trace["name"], "Turn 1");
    assert_eq!(trace["sessionId"], "sess-a");
    assert_eq!(trace["tags"], serde_json::json!(["claude-code", "checkout-service"]));
    assert_eq!(trace["output"]["content"], "Formatted.");

    let generation = &batches[0]["batch"][1];
    assert_eq!(generation["type"], "generation-create");
    assert_eq!(generation["body"]["model"], "claude-sonnet-4");
    let tool = &batches[0]["batch"][2];
    assert_eq!(tool["body"]["name"], "Tool: Bash");
    assert_eq!(tool["body"]["output"], "ok");

    let raw = serde_json::to_string(&batches).unwrap();
    assert!(!raw.contains("sk-abcdefghijklmnopqrstuv"));

    let exports = bodies(&otlp, "/v1/traces").await;
    assert_eq!(exports.len(), 2);
    let spans = &exports[1]["resourceSpans"][0]["scopeSpans"][0]["spans"];
    assert_eq!(spans[0]["name"], "Turn 2");
    assert_eq!(spans.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_failed_backend_catches_up_without_duplicating_the_other() {
    let workspace = Workspace::new();
    let langfuse = langfuse_server().await;
    let otlp = otlp_server(503).await;
    workspace.append("sess-b", &tool_turn(1), 1_740_000_000);

    let first = orchestrator(&workspace, &langfuse, &otlp).run().await;
    assert_eq!(first.records_queued, 1);
    assert_eq!(first.queue_depth, 1);
    assert_eq!(bodies(&langfuse, "/api/public/ingestion").await.len(), 1);

    otlp.reset().await;
    mount_otlp(&otlp, 200).await;

    let second = orchestrator(&workspace, &langfuse, &otlp).run().await;
    assert_eq!(second.drain_delivered, 1);
    assert_eq!(second.turns, 0);
    assert_eq!(second.queue_depth, 0);
    assert_eq!(bodies(&otlp, "/v1/traces").await.len(), 1);
    assert_eq!(bodies(&langfuse, "/api/public/ingestion").await.len(), 1);
}

#[tokio::test]
async fn test_trailing_partial_turn_waits_for_next_run() {
    let workspace = Workspace::new();
    let langfuse = langfuse_server().await;
    let otlp = otlp_server(200).await;

    let turn = tool_turn(1);
    // prompt and tool call only: the answer has not been written yet
    workspace.append("sess-c", &turn[..2], 1_740_000_000);
    let first = orchestrator(&workspace, &langfuse, &otlp).run().await;
    assert_eq!(first.turns, 0);

    workspace.append("sess-c", &turn[2..], 1_740_000_030);
    let second = orchestrator(&workspace, &langfuse, &otlp).run().await;
    assert_eq!(second.turns, 1);

    let batches = bodies(&langfuse, "/api/public/ingestion").await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0]["batch"][2]["body"]["output"], "ok");
}
