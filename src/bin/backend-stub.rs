//! Stub InitRepo MCP server for development testing
//!
//! This binary mimics the InitRepo MCP server's stdio protocol so the agent
//! can be exercised end to end without Node.js. It announces readiness on
//! stderr, then answers newline-delimited `tools/call` requests with canned
//! project data.

use clap::{Arg, ArgAction, Command};
use serde_json::{Value, json};
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

const SENTINEL_HEAD: &str = "InitRepo MCP ";
const SENTINEL_TAIL: &str = "Server running on stdio";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scenario {
    /// Every phase passes
    Success,
    /// Most tasks fail context validation
    LowSuccess,
    /// Health drops and gaps appear before quality assurance
    Degraded,
    /// Never announces readiness
    Silent,
    /// Exits with an error before readiness
    ExitEarly,
    /// Prints non-JSON lines on stdout around every response
    Noise,
}

impl Scenario {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "low-success" => Some(Self::LowSuccess),
            "degraded" => Some(Self::Degraded),
            "silent" => Some(Self::Silent),
            "exit-early" => Some(Self::ExitEarly),
            "noise" => Some(Self::Noise),
            _ => None,
        }
    }
}

struct Stub {
    scenario: Scenario,
    crash_on: Option<String>,
    hang_on: Option<String>,
    health_calls: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("backend-stub")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Stub InitRepo MCP server for testing")
        .arg(
            Arg::new("scenario")
                .long("scenario")
                .value_name("SCENARIO")
                .help("success, low-success, degraded, silent, exit-early or noise")
                .default_value("success"),
        )
        .arg(
            Arg::new("crash-on")
                .long("crash-on")
                .value_name("TOOL")
                .help("Exit without answering when TOOL is called"),
        )
        .arg(
            Arg::new("hang-on")
                .long("hang-on")
                .value_name("TOOL")
                .help("Never answer calls to TOOL"),
        )
        .arg(
            Arg::new("print-env")
                .long("print-env")
                .help("Print PROJECT_ROOT and the working directory to stderr at startup")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let scenario_name = matches
        .get_one::<String>("scenario")
        .map_or("success", String::as_str);
    let scenario = Scenario::parse(scenario_name)
        .ok_or_else(|| format!("unknown scenario: {scenario_name}"))?;

    let mut stderr = io::stderr();
    if matches.get_flag("print-env") {
        writeln!(
            stderr,
            "PROJECT_ROOT={}",
            std::env::var("PROJECT_ROOT").unwrap_or_default()
        )?;
        writeln!(stderr, "CWD={}", std::env::current_dir()?.display())?;
    }

    match scenario {
        Scenario::Silent => {
            writeln!(stderr, "Loading documentation index...")?;
            thread::sleep(Duration::from_secs(3600));
            return Ok(());
        }
        Scenario::ExitEarly => {
            writeln!(stderr, "Error: Cannot find module 'initrepo-core'")?;
            std::process::exit(1);
        }
        _ => {}
    }

    // The sentinel deliberately arrives in two writes
    write!(stderr, "{SENTINEL_HEAD}")?;
    stderr.flush()?;
    thread::sleep(Duration::from_millis(20));
    writeln!(stderr, "{SENTINEL_TAIL}")?;

    let mut stub = Stub {
        scenario,
        crash_on: matches.get_one::<String>("crash-on").cloned(),
        hang_on: matches.get_one::<String>("hang-on").cloned(),
        health_calls: 0,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        let Ok(request) = serde_json::from_str::<Value>(&line) else {
            writeln!(stderr, "ignoring unparseable request: {line}")?;
            continue;
        };
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let tool = request["params"]["name"].as_str().unwrap_or_default().to_string();
        let arguments = request["params"]["arguments"].clone();

        if stub.crash_on.as_deref() == Some(tool.as_str()) {
            writeln!(stderr, "fatal: crashed while handling {tool}")?;
            std::process::exit(70);
        }
        if stub.hang_on.as_deref() == Some(tool.as_str()) {
            continue;
        }

        let response = match stub.handle(&tool, &arguments) {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err(message) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": message}
            }),
        };

        if stub.scenario == Scenario::Noise {
            writeln!(stdout, "[debug] handling {tool}")?;
        }
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }

    Ok(())
}

impl Stub {
    fn handle(&mut self, tool: &str, arguments: &Value) -> Result<Value, String> {
        let payload = match tool {
            "getProjectStatus" => json!({
                "name": "demo",
                "status": "active",
                "projectRoot": std::env::var("PROJECT_ROOT").unwrap_or_default(),
                "lastUpdated": "2026-10-01"
            }),
            "generateProjectHealthReport" => {
                self.health_calls += 1;
                let health = match self.scenario {
                    Scenario::Degraded if self.health_calls > 1 => 62,
                    _ => 90,
                };
                json!({"healthScore": health})
            }
            "validateDocumentationCompleteness" => json!({"isComplete": true}),
            // Returned without the content envelope
            "listProjects" => return Ok(json!({"projects": [{"name": "demo"}]})),
            "identifyNextCriticalTasks" => json!({"tasks": [
                {"id": "T-1", "priority": "critical", "reason": "unblocks everything"},
                {"id": "T-2", "priority": "high"},
                {"id": "T-3"},
                {"id": "T-4"},
                {"id": "T-5"}
            ]}),
            "analyzeTaskDependencies" => {
                // The second task is always a prerequisite of the first
                let mut order: Vec<Value> = arguments["taskIds"].as_array().cloned().unwrap_or_default();
                if order.len() > 1 {
                    order.swap(0, 1);
                }
                json!({"implementationOrder": order, "estimatedEffort": "2 days"})
            }
            "generateTaskSchedule" => json!({"schedule": []}),
            "getContextById" => match arguments["id"].as_str() {
                Some("T-404") | None => Value::Null,
                Some(id) => json!({"id": id, "title": format!("Task {id}")}),
            },
            "generateSmartImplementationBrief" => json!({"brief": "Implement it", "testing": true}),
            "validateContextUnderstanding" => {
                let id = arguments["id"].as_str().unwrap_or_default();
                let valid = match self.scenario {
                    Scenario::LowSuccess => id == "T-1",
                    _ => arguments["context"]["id"].as_str() == Some(id),
                };
                json!({"isValid": valid})
            }
            "validateCrossReferences" => json!({"issues": []}),
            "checkDocumentationGaps" => match self.scenario {
                Scenario::Degraded => json!({"gaps": ["api", "deploy", "security"]}),
                _ => json!({"gaps": []}),
            },
            "findOrphanedReferences" => json!({"orphanedReferences": []}),
            other => return Err(format!("Unknown tool: {other}")),
        };

        Ok(json!({"content": [{"type": "text", "text": payload.to_string()}]}))
    }
}
