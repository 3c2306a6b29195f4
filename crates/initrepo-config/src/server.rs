//! Backend launch resolution.
//!
//! With the default `node` command the server entry point is searched for in
//! the project's `node_modules`, the global npm prefix, and a sibling
//! `initrepo-mcp` checkout. A custom `backend.command` runs as-is with
//! `backend.args`, prefixed by the entry point only when `server_path` is set.

use initrepo_transport::{CommandSpec, TransportConfig};
use initrepo_utils::ConfigError;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::model::{Config, defaults};

const PACKAGE: &str = "initrepo-mcp";
const ENTRY: [&str; 5] = ["dist", "packages", "mcp-server", "src", "index.js"];
const GLOBAL_NODE_MODULES: &str = "/usr/local/lib/node_modules";

/// A server entry point and the directory it runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLocation {
    pub entry: PathBuf,
    /// Four levels above the entry point, the package's `dist` directory
    pub working_dir: PathBuf,
}

impl ServerLocation {
    #[must_use]
    pub fn from_entry(entry: PathBuf) -> Self {
        let working_dir = entry
            .ancestors()
            .nth(4)
            .or_else(|| entry.parent())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self { entry, working_dir }
    }
}

fn entry_under(package_dir: PathBuf) -> PathBuf {
    ENTRY.iter().fold(package_dir, |path, part| path.join(part))
}

/// Places a server install is looked for, in search order.
#[must_use]
pub fn candidate_paths(project_root: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![
        entry_under(project_root.join("node_modules").join(PACKAGE)),
        entry_under(Path::new(GLOBAL_NODE_MODULES).join(PACKAGE)),
    ];
    if let Some(parent) = project_root.parent() {
        candidates.push(entry_under(parent.join(PACKAGE)));
    }
    candidates
}

/// Resolve the server entry point.
///
/// An explicit path must exist; otherwise the first existing candidate wins.
pub fn locate_server(
    project_root: &Path,
    explicit: Option<&Path>,
) -> Result<ServerLocation, ConfigError> {
    if let Some(path) = explicit {
        let path = if path.is_relative() {
            project_root.join(path)
        } else {
            path.to_path_buf()
        };
        return if path.is_file() {
            Ok(ServerLocation::from_entry(path))
        } else {
            Err(ConfigError::ServerNotFound {
                searched: path.display().to_string(),
            })
        };
    }

    let candidates = candidate_paths(project_root);
    candidates
        .iter()
        .find(|path| path.is_file())
        .map(|path| ServerLocation::from_entry(path.clone()))
        .ok_or_else(|| ConfigError::ServerNotFound {
            searched: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

fn resolve_program(command: &str) -> Result<PathBuf, ConfigError> {
    which::which(command).map_err(|e| ConfigError::InvalidValue {
        key: "backend.command".to_string(),
        value: format!("{command} ({e})"),
    })
}

impl Config {
    /// Build the launch description for a backend serving `project_root`.
    pub fn transport_config(&self, project_root: &Path) -> Result<TransportConfig, ConfigError> {
        let program = resolve_program(self.command())?;
        let default_command = self.command() == defaults::COMMAND;

        let location = if default_command || self.backend.server_path.is_some() {
            Some(locate_server(
                project_root,
                self.backend.server_path.as_deref(),
            )?)
        } else {
            None
        };

        let mut spec = CommandSpec::new(program).project_root(project_root);
        if let Some(location) = &location {
            spec = spec.arg(&location.entry);
        }
        spec = spec.args(&self.backend.args);

        let cwd = self
            .backend
            .working_dir
            .clone()
            .or_else(|| location.map(|l| l.working_dir))
            .unwrap_or_else(|| project_root.to_path_buf());
        spec = spec.cwd(cwd);
        debug!(command = %spec.display(), "Resolved backend launch");

        let mut transport = TransportConfig::new(spec);
        transport.ready_sentinel = self.ready_sentinel().to_string();
        transport.startup_timeout = self.startup_timeout();
        transport.stop_grace = self.stop_grace();
        Ok(transport)
    }
}
