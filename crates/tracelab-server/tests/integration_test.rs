//! End-to-end tests for the tracelab HTTP API.
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`,
//! without a network listener. The sandbox spawns the real
//! `tracelab-server exec` binary built for this test run; the explanation
//! provider is left unconfigured.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use tracelab_check::tracer::TraceConfig;
use tracelab_check::{HeuristicClassifier, RuleScanner};
use tracelab_server::config::ServerConfig;
use tracelab_server::explain::DisabledExplainer;
use tracelab_server::pipeline::Pipeline;
use tracelab_server::router::build_router;
use tracelab_server::sandbox::{SandboxCommand, SandboxRunner};
use tracelab_server::state::AppState;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn sandbox(timeout: Duration) -> SandboxRunner {
    SandboxRunner::new(
        SandboxCommand {
            program: PathBuf::from(env!("CARGO_BIN_EXE_tracelab-server")),
            args: vec!["exec".to_string()],
        },
        timeout,
    )
}

/// Creates a router over the default collaborators, minus the explainer.
fn test_app() -> Router {
    let pipeline = Pipeline::new(
        Arc::new(HeuristicClassifier),
        Arc::new(RuleScanner),
        Arc::new(DisabledExplainer),
        Arc::new(sandbox(Duration::from_secs(5))),
        TraceConfig::default(),
    );
    build_router(AppState::with_pipeline(pipeline, ServerConfig::default()))
}

/// Sends a POST request with a JSON body and returns (status, json).
async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let (status, bytes) = post_raw(app, path, body).await;
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(json!(null));
    (status, json)
}

async fn post_raw(app: &Router, path: &str, body: Value) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body_bytes.to_vec())
}

/// Sends a GET request and returns (status, json).
async fn get_json(app: &Router, path: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!(null));
    (status, json)
}

/// Splits an SSE body into (event name, data json) pairs, skipping
/// keep-alive comments.
fn parse_sse(body: &[u8]) -> Vec<(String, Value)> {
    let text = String::from_utf8_lossy(body);
    text.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_string());
                } else if let Some(payload) = line.strip_prefix("data:") {
                    data = serde_json::from_str(payload.trim()).ok();
                }
            }
            Some((event?, data?))
        })
        .collect()
}

const FIB: &str = "\
def fib(n):
    if n < 2:
        return n
    return fib(n - 1) + fib(n - 2)

print(fib(3))
";

// ---------------------------------------------------------------------------
// Single collaborators
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app();
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["explainer"], Value::Null);
    assert_eq!(body["run_timeout_ms"], 2000);
    assert_eq!(body["event_budget"], 300);
}

#[tokio::test]
async fn classify_reports_topic_and_entry() {
    let app = test_app();
    let (status, body) = post_json(&app, "/classify", json!({"code": FIB})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"], "recursion");
    assert_eq!(body["confidence"], json!(1.0));
    assert_eq!(body["entry"]["function"], "fib");
    assert_eq!(body["entry"]["args"], json!([3]));
    assert_eq!(body["entry"]["source"], "inferred");
}

#[tokio::test]
async fn debug_lists_issues() {
    let app = test_app();
    let (status, body) = post_json(
        &app,
        "/debug",
        json!({"code": "i = 0\nwhile i < 3:\n    i += 1\n"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["issues"][0]["kind"], "infinite_loop");
    assert_eq!(body["issues"][0]["severity"], "high");
}

#[tokio::test]
async fn run_executes_in_a_child_process() {
    let app = test_app();
    let (status, body) = post_json(
        &app,
        "/run",
        json!({"code": "name = input()\nprint('hi ' + name)\n", "input": "ada\n"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stdout"], "hi ada\n");
    assert_eq!(body["exit_code"], 0);
    assert_eq!(body["timed_out"], false);
}

#[tokio::test]
async fn run_reports_runtime_errors_on_stderr() {
    let app = test_app();
    let (status, body) = post_json(&app, "/run", json!({"code": "print(1 // 0)\n"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exit_code"], 1);
    assert!(body["stderr"]
        .as_str()
        .unwrap()
        .starts_with("ZeroDivisionError"));
}

#[tokio::test]
async fn simulate_runs_one_tracer() {
    let app = test_app();
    let (status, body) = post_json(
        &app,
        "/simulate",
        json!({
            "code": "graph = {\"a\": [\"b\", \"c\"], \"b\": [\"c\"], \"c\": []}\n",
            "topic": "graph-bfs"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tracer"], "graph_bfs");
    assert_eq!(body["report"]["status"], "completed");
    assert_eq!(body["artifact"]["kind"], "graph_traversal");
    assert_eq!(body["artifact"]["order"], json!(["a", "b", "c"]));
}

#[tokio::test]
async fn simulate_with_explicit_entry() {
    let app = test_app();
    let (status, body) = post_json(
        &app,
        "/simulate",
        json!({
            "code": FIB,
            "topic": "recursion",
            "entry_function": "fib",
            "entry_args": [2]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entry"]["source"], "explicit");
    assert_eq!(body["report"]["result"], "1");
    assert_eq!(body["artifact"]["tree"]["args"]["n"], 2);
}

#[tokio::test]
async fn analyze_reports_out_of_range_constants() {
    let app = test_app();
    let (status, body) = post_json(
        &app,
        "/analyze",
        json!({"code": "s = 'abc'\nprint(s[3])\n", "topic": "string"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"], "string");
    assert_eq!(body["analysis"]["kind"], "indexing");
    assert_eq!(body["analysis"]["boundary_issues"][0]["variable"], "s");
    assert_eq!(body["analysis"]["boundary_issues"][0]["line"], 2);
}

#[tokio::test]
async fn analyze_without_a_report_for_the_topic() {
    let app = test_app();
    let (status, body) = post_json(&app, "/analyze", json!({"code": FIB})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"], "recursion");
    assert_eq!(body["analysis"], Value::Null);
}

#[tokio::test]
async fn dp_lists_memo_writes() {
    let app = test_app();
    let code = "memo = {}\ndef f(n):\n    if n < 2:\n        return n\n    memo[n] = f(n - 1) + f(n - 2)\n    return memo[n]\n";
    let (status, body) = post_json(&app, "/dp", json!({"code": code})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["dp_analysis"]["style"], "top_down");
    assert_eq!(body["dp_analysis"]["memo_writes"][0]["line"], 5);
    assert_eq!(body["dp_analysis"]["memo_reads"][0]["line"], 6);

    let (status, _) = post_json(&app, "/dp", json!({"code": "def (:\n"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn explain_without_provider_is_unavailable() {
    let app = test_app();
    let (status, body) = post_json(&app, "/explain", json!({"code": FIB})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "EXPLAINER_UNAVAILABLE");
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_code_is_rejected() {
    let app = test_app();
    let (status, body) = post_json(&app, "/process", json!({"code": "   "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unknown_topic_override_is_rejected() {
    let app = test_app();
    let (status, body) = post_json(
        &app,
        "/process/stream",
        json!({"code": FIB, "topic": "sorting"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "unknown topic 'sorting'");
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn process_returns_the_aggregate_summary() {
    let app = test_app();
    let (status, body) = post_json(&app, "/process", json!({"code": FIB})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let result = &body["result"];
    assert_eq!(result["topic"], "recursion");
    assert_eq!(result["recursion_tree"]["return_value"], "2");
    assert_eq!(result["trace"]["status"], "completed");
    assert_eq!(result["issues"], json!([]));
    assert_eq!(result["explanation"], Value::Null);
    assert_eq!(
        result["explanation_error"],
        "explanation provider not configured"
    );
}

#[tokio::test]
async fn process_stream_emits_stage_events_in_order() {
    let app = test_app();
    let (status, body) = post_raw(
        &app,
        "/process/stream",
        json!({"code": "arr = [3, 1, 2]\nprint(arr[0])\n", "topic": "array"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let events = parse_sse(&body);
    let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec!["classification", "runtime", "trace", "analysis", "issues", "explanation", "done"]
    );
    for (name, data) in &events {
        assert_eq!(data["stage"], json!(name));
    }
    assert_eq!(events[1].1["payload"]["stdout"], "3\n");
    assert_eq!(events[3].1["payload"]["timeline"][0]["index"], "0");
    assert_eq!(events[6].1["payload"]["runtime"]["exit_code"], 0);
}
