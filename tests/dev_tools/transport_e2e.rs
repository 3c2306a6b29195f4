//! End-to-end transport tests against a real child process
//!
//! Drives `ProcessTransport` and `RpcClient` against the backend-stub binary.
//!
//! Run with: `cargo test --features dev-tools --test transport_e2e`

use std::time::Duration;

use initrepo_transport::{CommandSpec, ProcessTransport, RpcClient, RpcError, TransportConfig, TransportError};
use serde_json::{Map, Value, json};
use tempfile::TempDir;

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

fn stub_config(args: &[&str], project_root: &std::path::Path) -> TransportConfig {
    let command = CommandSpec::new(env!("CARGO_BIN_EXE_backend-stub"))
        .args(args.iter().copied())
        .cwd(project_root)
        .project_root(project_root);
    let mut config = TransportConfig::new(command);
    config.startup_timeout = Duration::from_secs(5);
    config.stop_grace = Duration::from_millis(500);
    config
}

async fn connect(args: &[&str], project_root: &std::path::Path) -> RpcClient {
    let mut transport = ProcessTransport::new(stub_config(args, project_root));
    transport.start().await.expect("stub should become ready");
    RpcClient::attach(transport).expect("attach to running transport")
}

/// Decode the MCP text envelope the stub wraps most results in.
fn payload(result: &Value) -> Value {
    let text = result["content"][0]["text"].as_str().expect("text content");
    serde_json::from_str(text).expect("json text")
}

#[tokio::test]
async fn ready_sentinel_split_across_writes_is_detected() {
    let root = TempDir::new().unwrap();
    let client = connect(&[], root.path()).await;

    let result = client
        .call("generateProjectHealthReport", Map::new(), CALL_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(payload(&result), json!({"healthScore": 90}));

    client.stop().await.unwrap();
}

#[tokio::test]
async fn project_root_is_passed_to_the_backend() {
    let root = TempDir::new().unwrap();
    let client = connect(&[], root.path()).await;

    let result = client.call("getProjectStatus", Map::new(), CALL_TIMEOUT).await.unwrap();
    assert_eq!(
        payload(&result)["projectRoot"],
        json!(root.path().to_string_lossy())
    );
    client.stop().await.unwrap();
}

#[tokio::test]
async fn concurrent_calls_are_correlated_by_id() {
    let root = TempDir::new().unwrap();
    let client = connect(&["--scenario", "noise"], root.path()).await;

    let mut args = Map::new();
    args.insert("id".into(), json!("T-3"));
    let (health, projects, context) = tokio::join!(
        client.call("generateProjectHealthReport", Map::new(), CALL_TIMEOUT),
        client.call("listProjects", Map::new(), CALL_TIMEOUT),
        client.call("getContextById", args, CALL_TIMEOUT),
    );

    assert_eq!(payload(&health.unwrap())["healthScore"], 90);
    assert_eq!(projects.unwrap()["projects"][0]["name"], "demo");
    assert_eq!(payload(&context.unwrap())["id"], "T-3");
    assert_eq!(client.pending_calls(), 0);
    client.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_tool_is_a_remote_error() {
    let root = TempDir::new().unwrap();
    let client = connect(&[], root.path()).await;

    let err = client.call("launchRockets", Map::new(), CALL_TIMEOUT).await.unwrap_err();
    assert_eq!(
        err,
        RpcError::Remote {
            tool: "launchRockets".into(),
            message: "Unknown tool: launchRockets".into(),
            code: Some(-32601),
        }
    );
    client.stop().await.unwrap();
}

#[tokio::test]
async fn unanswered_call_times_out_and_client_stays_usable() {
    let root = TempDir::new().unwrap();
    let client = connect(&["--hang-on", "checkDocumentationGaps"], root.path()).await;

    let err = client
        .call("checkDocumentationGaps", Map::new(), Duration::from_millis(300))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout { .. }));
    assert_eq!(client.pending_calls(), 0);

    let ok = client.call("listProjects", Map::new(), CALL_TIMEOUT).await;
    assert!(ok.is_ok());
    client.stop().await.unwrap();
}

#[tokio::test]
async fn backend_crash_fails_the_call_with_transport_closed() {
    let root = TempDir::new().unwrap();
    let client = connect(&["--crash-on", "findOrphanedReferences"], root.path()).await;

    let err = client
        .call("findOrphanedReferences", Map::new(), CALL_TIMEOUT)
        .await
        .unwrap_err();
    assert_eq!(err, RpcError::TransportClosed);
    assert!(client.is_closed());
    client.stop().await.unwrap();
}

#[tokio::test]
async fn stop_is_idempotent_and_closes_the_client() {
    let root = TempDir::new().unwrap();
    let client = connect(&[], root.path()).await;

    client.stop().await.unwrap();
    client.stop().await.unwrap();
    let err = client.call("listProjects", Map::new(), CALL_TIMEOUT).await.unwrap_err();
    assert_eq!(err, RpcError::TransportClosed);
}

#[tokio::test]
async fn silent_backend_hits_the_startup_timeout() {
    let root = TempDir::new().unwrap();
    let mut config = stub_config(&["--scenario", "silent"], root.path());
    config.startup_timeout = Duration::from_millis(500);
    let mut transport = ProcessTransport::new(config);

    match transport.start().await {
        Err(TransportError::StartupTimeout { stderr_tail, .. }) => {
            assert!(stderr_tail.contains("Loading documentation index"));
        }
        other => panic!("expected StartupTimeout, got {other:?}"),
    }
    assert!(!transport.is_running());
}

#[tokio::test]
async fn backend_exiting_before_readiness_fails_fast() {
    let root = TempDir::new().unwrap();
    let mut transport = ProcessTransport::new(stub_config(&["--scenario", "exit-early"], root.path()));

    let started = std::time::Instant::now();
    match transport.start().await {
        Err(TransportError::ExitedBeforeReady { stderr_tail }) => {
            assert!(stderr_tail.contains("Cannot find module"));
        }
        other => panic!("expected ExitedBeforeReady, got {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() {
    let root = TempDir::new().unwrap();
    let command = CommandSpec::new("/nonexistent/initrepo-mcp-server").project_root(root.path());
    let mut transport = ProcessTransport::new(TransportConfig::new(command));

    assert!(matches!(transport.start().await, Err(TransportError::Spawn { .. })));
}
