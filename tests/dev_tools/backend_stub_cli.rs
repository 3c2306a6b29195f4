//! Integration tests for the backend-stub binary
//!
//! These tests execute the compiled backend-stub directly using `assert_cmd`.
//! They are gated behind the `dev-tools` feature and only run when that feature is enabled.
//!
//! Run with: `cargo test --features dev-tools --test backend_stub_cli`

use assert_cmd::Command;
use predicates::prelude::*;

fn stub() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("backend-stub"))
}

fn request(id: u64, tool: &str, arguments: &str) -> String {
    format!(
        r#"{{"jsonrpc":"2.0","id":{id},"method":"tools/call","params":{{"name":"{tool}","arguments":{arguments}}}}}"#
    ) + "\n"
}

#[test]
fn version_output() {
    stub()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("backend-stub"));
}

#[test]
fn announces_readiness_and_answers_calls() {
    let input = request(1, "generateProjectHealthReport", "{}") + &request(2, "listProjects", "{}");
    stub()
        .write_stdin(input)
        .assert()
        .success()
        .stderr(predicate::str::contains("InitRepo MCP Server running on stdio"))
        .stdout(predicate::str::contains(r#""id":1"#))
        .stdout(predicate::str::contains(r#"\"healthScore\":90"#))
        .stdout(predicate::str::contains(r#""projects":[{"name":"demo"}]"#));
}

#[test]
fn dependency_order_follows_requested_tasks() {
    stub()
        .write_stdin(request(4, "analyzeTaskDependencies", r#"{"taskIds":["T-001","T-002","T-003"]}"#))
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"\"implementationOrder\":[\"T-002\",\"T-001\",\"T-003\"]"#,
        ));
}

#[test]
fn unknown_tool_is_an_error_response() {
    stub()
        .write_stdin(request(7, "launchRockets", "{}"))
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""code":-32601"#))
        .stdout(predicate::str::contains("Unknown tool: launchRockets"));
}

#[test]
fn garbage_input_is_skipped() {
    stub()
        .write_stdin(format!("not json\n{}", request(3, "getProjectStatus", "{}")))
        .assert()
        .success()
        .stderr(predicate::str::contains("ignoring unparseable request"))
        .stdout(predicate::str::contains(r#""id":3"#));
}

#[test]
fn exit_early_scenario_fails_before_readiness() {
    stub()
        .args(["--scenario", "exit-early"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Cannot find module"))
        .stderr(predicate::str::contains("running on stdio").not());
}

#[test]
fn unknown_scenario_is_rejected() {
    stub()
        .args(["--scenario", "chaos"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown scenario: chaos"));
}
