//! Argv-style launch description for the backend process.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use tokio::process::Command;

/// Environment variable through which the backend learns the project root.
pub const PROJECT_ROOT_ENV: &str = "PROJECT_ROOT";

/// How to launch the backend: program, arguments, working directory and
/// extra environment. Arguments are passed as discrete argv elements.
///
/// # Example
///
/// ```rust
/// use initrepo_transport::CommandSpec;
///
/// let spec = CommandSpec::new("node")
///     .arg("dist/packages/mcp-server/src/index.js")
///     .cwd("/opt/initrepo-mcp")
///     .project_root("/work/my-app");
/// assert_eq!(spec.display(), "node dist/packages/mcp-server/src/index.js");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<OsString, OsString>,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set `PROJECT_ROOT` for the backend.
    #[must_use]
    pub fn project_root(self, root: impl Into<PathBuf>) -> Self {
        self.env(PROJECT_ROOT_ENV, root.into().into_os_string())
    }

    /// Program and arguments joined for log output.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build a tokio command with all three stdio streams piped.
    #[must_use]
    pub fn to_tokio_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let spec = CommandSpec::new("node")
            .arg("server.js")
            .args(["--stdio", "--quiet"])
            .cwd("/srv")
            .env("DEBUG", "1");

        assert_eq!(spec.program, OsString::from("node"));
        assert_eq!(spec.args.len(), 3);
        assert_eq!(spec.cwd, Some(PathBuf::from("/srv")));
        assert_eq!(spec.env.get(&OsString::from("DEBUG")), Some(&OsString::from("1")));
    }

    #[test]
    fn test_project_root_sets_env() {
        let spec = CommandSpec::new("node").project_root("/work/app");
        assert_eq!(
            spec.env.get(&OsString::from(PROJECT_ROOT_ENV)),
            Some(&OsString::from("/work/app"))
        );
    }

    #[test]
    fn test_arguments_are_not_shell_split() {
        let spec = CommandSpec::new("node").arg("file with spaces.js; rm -rf /");
        assert_eq!(spec.args.len(), 1);
        assert_eq!(spec.display(), "node file with spaces.js; rm -rf /");
    }
}
