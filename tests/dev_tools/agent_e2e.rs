//! End-to-end agent runs against the backend-stub binary
//!
//! Each test writes a project-local `.initrepo/config.toml` pointing the
//! backend command at backend-stub, then runs the real `initrepo` binary.
//!
//! Run with: `cargo test --features dev-tools --test agent_e2e`

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use assert_cmd::Command;
use initrepo_agent::{
    Config, OrchestratorSettings, PhaseId, PhaseOrchestrator, RpcBackend, RunOutcome,
};
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const STUB: &str = env!("CARGO_BIN_EXE_backend-stub");

fn project(stub_args: &[&str], extra_backend: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let args = stub_args
        .iter()
        .map(|a| format!("'{a}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let config = format!(
        "[backend]\ncommand = '{STUB}'\nargs = [{args}]\ncall_timeout_secs = 10\n{extra_backend}\n\n[execution]\nitem_pacing_ms = 0\n"
    );
    fs::create_dir_all(dir.path().join(".initrepo")).unwrap();
    fs::write(dir.path().join(".initrepo/config.toml"), config).unwrap();
    dir
}

fn initrepo(root: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("initrepo"));
    cmd.arg("--project-root").arg(root);
    cmd.env("XDG_CONFIG_HOME", root.join("xdg"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn agent_runs_to_done() {
    let root = project(&[], "");
    initrepo(root.path())
        .arg("agent")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("✓ discovery"))
        .stdout(predicate::str::contains("✓ quality_assurance"))
        .stdout(predicate::str::contains("completed: 4 phases passed"));
}

#[test]
fn agent_json_report_follows_dependency_order() {
    let root = project(&[], "");
    let output = initrepo(root.path())
        .args(["agent", "--json"])
        .assert()
        .code(0)
        .get_output()
        .stdout
        .clone();

    let report: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["outcome"], "done");
    assert_eq!(report["phases"].as_array().unwrap().len(), 4);

    let planning = &report["phases"][1]["data"];
    assert_eq!(planning["queue"][0]["id"], "T-2");
    assert_eq!(planning["queue"][1]["priority"], "critical");
    assert_eq!(planning["estimated_effort"], "2 days");

    let implementation = &report["phases"][2]["data"];
    assert_eq!(implementation["total"], 5);
    assert_eq!(implementation["success_ratio"], 1.0);
}

#[test]
fn low_success_ratio_aborts_with_exit_1() {
    let root = project(&["--scenario", "low-success"], "");
    initrepo(root.path())
        .arg("agent")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("✗ implementation"))
        .stdout(predicate::str::contains(
            "success ratio 0.20 is below the required 0.80",
        ));
}

#[test]
fn degraded_project_fails_quality_assurance() {
    let root = project(&["--scenario", "degraded"], "");
    initrepo(root.path())
        .arg("agent")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("quality_assurance gate failed"))
        .stdout(predicate::str::contains("final health 62"))
        .stdout(predicate::str::contains("quality score 70"));
}

#[test]
fn backend_crash_is_reported_as_lost_connection() {
    let root = project(&["--crash-on", "findOrphanedReferences"], "");
    initrepo(root.path())
        .arg("agent")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Lost the MCP server connection during the quality_assurance phase",
        ));
}

#[test]
fn silent_backend_reports_startup_timeout() {
    let root = project(&["--scenario", "silent"], "startup_timeout_secs = 1");
    initrepo(root.path())
        .arg("agent")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("did not report readiness within 1s"))
        .stderr(predicate::str::contains("Loading documentation index"));
}

#[test]
fn verify_project_passes_at_96() {
    let root = project(&[], "");
    initrepo(root.path())
        .arg("verify")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("Remaining tasks:     5"))
        .stdout(predicate::str::contains("Project verification passed with score 96"));
}

#[test]
fn verify_unknown_task_fails() {
    let root = project(&[], "");
    initrepo(root.path())
        .args(["verify", "T-404"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Task T-404 not found in documentation"));
}

#[test]
fn verify_task_json() {
    let root = project(&[], "");
    let output = initrepo(root.path())
        .args(["verify", "T-1", "--json"])
        .assert()
        .code(0)
        .get_output()
        .stdout
        .clone();

    let result: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(result["kind"], "task");
    assert_eq!(result["task_id"], "T-1");
    assert_eq!(result["passed"], true);
}

#[test]
fn status_prints_snapshot() {
    let root = project(&[], "");
    initrepo(root.path())
        .arg("status")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("Project demo ("))
        .stdout(predicate::str::contains("Health score:        90% (healthy)"))
        .stdout(predicate::str::contains("pending (5):"))
        .stdout(predicate::str::contains(
            "✓ Health 90% (healthy), 5 critical task(s), 0 documentation gap(s)",
        ));
}

#[test]
fn status_json_lists_gaps() {
    let root = project(&["--scenario", "degraded"], "");
    let output = initrepo(root.path())
        .args(["status", "--json"])
        .assert()
        .code(0)
        .get_output()
        .stdout
        .clone();

    let status: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(status["name"], "demo");
    assert_eq!(status["health_band"], "healthy");
    assert_eq!(status["documentation_gaps"], serde_json::json!(["api", "deploy", "security"]));
    assert_eq!(status["next_action"], "continue_building");
}

#[test]
fn implement_plans_documented_feature() {
    let root = project(&[], "");
    fs::write(
        root.path().join("README.md"),
        "# Shop

Authentication: T-001 then T-002
Payments: T-010
",
    )
    .unwrap();

    initrepo(root.path())
        .args(["implement", "authentication"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("Related items: T-001, T-002"))
        .stdout(predicate::str::contains("Approach: Implement it"))
        .stdout(predicate::str::contains("1. T-002
  2. T-001"))
        .stdout(predicate::str::contains("T-010").not())
        .stdout(predicate::str::contains("Estimated effort: 2 days"));
}

#[test]
fn implement_without_documentation_fails_before_launch() {
    // A backend that would never become ready proves nothing was launched
    let root = project(&["--scenario", "silent"], "startup_timeout_secs = 30");
    initrepo(root.path())
        .args(["implement", "email", "warming"])
        .timeout(Duration::from_secs(10))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("No documentation found for \"email warming\""));
}

#[test]
fn config_shows_file_sources() {
    let root = project(&[], "");
    initrepo(root.path())
        .arg("config")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("backend.command"))
        .stdout(predicate::str::contains("[config ("))
        .stdout(predicate::str::contains("execution.max_parallel"))
        .stdout(predicate::str::contains("[default]"));
}

#[tokio::test]
async fn library_run_with_parallel_items() {
    let root = TempDir::new().unwrap();
    let config = Config::builder()
        .command(STUB)
        .item_pacing(Duration::ZERO)
        .max_parallel(3)
        .build()
        .unwrap();

    let backend = Arc::new(RpcBackend::launch(&config, root.path()).await.unwrap());
    let mut orchestrator = PhaseOrchestrator::new(backend.clone(), OrchestratorSettings::from(&config));
    let report = orchestrator.run().await.unwrap();
    backend.stop().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Done);
    let phases: Vec<PhaseId> = report.phases.iter().map(|p| p.phase).collect();
    assert_eq!(phases, PhaseId::ALL);
}
