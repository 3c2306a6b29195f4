//! Backend child-process lifecycle.
//!
//! `Idle -> Running -> Stopped`. Stopped is terminal: a transport is never
//! restarted, a new one is built instead.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command_spec::CommandSpec;
use crate::error::TransportError;
use crate::outbound::{DEFAULT_QUEUE_FRAMES, OutboundWriter};
use crate::ring_buffer::RingBuffer;

/// Stderr line the InitRepo MCP server prints once it accepts requests.
pub const DEFAULT_READY_SENTINEL: &str = "InitRepo MCP Server running on stdio";

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub command: CommandSpec,
    pub ready_sentinel: String,
    pub startup_timeout: Duration,
    /// Time between SIGTERM and SIGKILL during [`ProcessTransport::stop`].
    pub stop_grace: Duration,
    pub queue_frames: usize,
    pub stderr_tail_bytes: usize,
}

impl TransportConfig {
    #[must_use]
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            ready_sentinel: DEFAULT_READY_SENTINEL.to_string(),
            startup_timeout: Duration::from_secs(10),
            stop_grace: Duration::from_millis(2000),
            queue_frames: DEFAULT_QUEUE_FRAMES,
            stderr_tail_bytes: 4096,
        }
    }
}

/// Detects the readiness sentinel in a growing diagnostic stream.
///
/// Only the last `sentinel.len() - 1` bytes are carried between feeds, so a
/// sentinel split across any number of chunks is still found while the
/// buffer stays bounded by the largest chunk.
#[derive(Debug)]
pub struct SentinelScanner {
    sentinel: Vec<u8>,
    seen: Vec<u8>,
    found: bool,
}

impl SentinelScanner {
    #[must_use]
    pub fn new(sentinel: &str) -> Self {
        Self {
            sentinel: sentinel.as_bytes().to_vec(),
            seen: Vec::new(),
            found: sentinel.is_empty(),
        }
    }

    /// Append a chunk; returns true once the sentinel has been observed.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        if self.found {
            return true;
        }
        self.seen.extend_from_slice(chunk);
        self.found = self
            .seen
            .windows(self.sentinel.len())
            .any(|w| w == self.sentinel.as_slice());

        let keep = self.sentinel.len() - 1;
        if self.found {
            self.seen = Vec::new();
        } else if self.seen.len() > keep {
            self.seen.drain(..self.seen.len() - keep);
        }
        self.found
    }

    #[must_use]
    pub const fn is_found(&self) -> bool {
        self.found
    }
}

struct Running {
    child: Child,
    pid: Option<u32>,
    writer: OutboundWriter,
    writer_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
    inbound: Option<ChildStdout>,
}

enum State {
    Idle,
    Running(Box<Running>),
    Stopped,
}

/// Owns the backend process and its three streams.
pub struct ProcessTransport {
    config: TransportConfig,
    state: State,
    stderr_tail: Arc<Mutex<RingBuffer>>,
}

impl ProcessTransport {
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        let tail = RingBuffer::new(config.stderr_tail_bytes);
        Self {
            config,
            state: State::Idle,
            stderr_tail: Arc::new(Mutex::new(tail)),
        }
    }

    /// Spawn the backend and wait for the readiness sentinel on stderr.
    ///
    /// On any failure the child is torn down before returning and the
    /// transport is stopped.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Spawn`] if the program cannot be launched
    /// - [`TransportError::StartupTimeout`] if the sentinel does not appear in time
    /// - [`TransportError::ExitedBeforeReady`] if stderr closes first
    /// - [`TransportError::TransportClosed`] if called twice or after `stop()`
    pub async fn start(&mut self) -> Result<(), TransportError> {
        if !matches!(self.state, State::Idle) {
            return Err(TransportError::TransportClosed);
        }

        let spec = &self.config.command;
        let mut cmd = spec.to_tokio_command();

        // Own process group so stop() reaches grandchildren too
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|e| {
            self.state = State::Stopped;
            TransportError::Spawn {
                program: spec.display(),
                reason: e.to_string(),
            }
        })?;
        let pid = child.id();
        info!(command = %spec.display(), pid = ?pid, "Backend spawned");

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            self.state = State::Stopped;
            return Err(TransportError::Spawn {
                program: spec.display(),
                reason: "stdio pipes unavailable".to_string(),
            });
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        let stderr_task = tokio::spawn(watch_stderr(
            stderr,
            SentinelScanner::new(&self.config.ready_sentinel),
            ready_tx,
            Arc::clone(&self.stderr_tail),
        ));
        let (writer, writer_task) = OutboundWriter::spawn(stdin, self.config.queue_frames);

        self.state = State::Running(Box::new(Running {
            child,
            pid,
            writer,
            writer_task,
            stderr_task,
            inbound: Some(stdout),
        }));

        let timeout = self.config.startup_timeout;
        match tokio::time::timeout(timeout, ready_rx).await {
            Ok(Ok(())) => {
                info!(pid = ?pid, "Backend ready");
                Ok(())
            }
            Ok(Err(_)) => {
                let _ = self.stop().await;
                Err(TransportError::ExitedBeforeReady {
                    stderr_tail: self.stderr_tail(),
                })
            }
            Err(_) => {
                warn!(timeout = ?timeout, "Backend did not become ready");
                let _ = self.stop().await;
                Err(TransportError::StartupTimeout {
                    timeout,
                    stderr_tail: self.stderr_tail(),
                })
            }
        }
    }

    /// Queue `frame` for the backend's stdin, waiting at most `timeout`.
    pub async fn write(&self, frame: Vec<u8>, timeout: Duration) -> Result<(), TransportError> {
        self.outbound()?.send(frame, timeout).await
    }

    /// A handle for writing frames without borrowing the transport.
    pub fn outbound(&self) -> Result<OutboundWriter, TransportError> {
        match &self.state {
            State::Running(running) => Ok(running.writer.clone()),
            _ => Err(TransportError::TransportClosed),
        }
    }

    /// Hand the backend's stdout to a reader. Yields it once.
    pub fn take_inbound(&mut self) -> Result<ChildStdout, TransportError> {
        match &mut self.state {
            State::Running(running) => running
                .inbound
                .take()
                .ok_or(TransportError::TransportClosed),
            _ => Err(TransportError::TransportClosed),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        match &self.state {
            State::Running(running) => running.pid,
            _ => None,
        }
    }

    /// Most recent backend stderr output.
    #[must_use]
    pub fn stderr_tail(&self) -> String {
        self.stderr_tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_string()
    }

    /// Terminate the backend and release its streams. Idempotent.
    ///
    /// Closes stdin, sends SIGTERM to the process group, and escalates to
    /// SIGKILL if the process outlives the grace period.
    pub async fn stop(&mut self) -> Result<(), TransportError> {
        let running = match std::mem::replace(&mut self.state, State::Stopped) {
            State::Running(running) => running,
            State::Idle | State::Stopped => return Ok(()),
        };
        let Running {
            mut child,
            pid,
            writer,
            writer_task,
            stderr_task,
            inbound,
        } = *running;

        writer_task.abort();
        drop(writer);
        drop(inbound);

        terminate(&mut child, pid, self.config.stop_grace).await?;

        stderr_task.abort();
        debug!(pid = ?pid, "Backend stopped");
        Ok(())
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        if let State::Running(running) = &mut self.state {
            running.writer_task.abort();
            running.stderr_task.abort();
            #[cfg(unix)]
            if let Some(pid) = running.pid {
                signal_group(pid, nix::sys::signal::Signal::SIGKILL);
            }
            let _ = running.child.start_kill();
        }
    }
}

async fn watch_stderr(
    mut stderr: ChildStderr,
    mut scanner: SentinelScanner,
    ready_tx: oneshot::Sender<()>,
    tail: Arc<Mutex<RingBuffer>>,
) {
    let mut ready_tx = Some(ready_tx);
    let mut chunk = vec![0u8; 4096];
    loop {
        let n = match stderr.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "Backend stderr read failed");
                break;
            }
        };
        let bytes = &chunk[..n];
        tail.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(bytes);
        debug!(target: "initrepo_transport::backend", "{}", String::from_utf8_lossy(bytes).trim_end());

        if scanner.feed(bytes) {
            if let Some(tx) = ready_tx.take() {
                let _ = tx.send(());
            }
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    let _ = killpg(Pid::from_raw(raw), signal);
}

async fn terminate(child: &mut Child, pid: Option<u32>, grace: Duration) -> Result<(), TransportError> {
    if let Ok(Some(_)) = child.try_wait() {
        return Ok(());
    }

    #[cfg(unix)]
    if let Some(pid) = pid {
        signal_group(pid, nix::sys::signal::Signal::SIGTERM);
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        let _ = child.start_kill();
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => {
            debug!(status = ?status.ok(), "Backend exited");
        }
        Err(_) => {
            warn!(grace = ?grace, "Backend ignored SIGTERM; killing");
            #[cfg(unix)]
            if let Some(pid) = pid {
                signal_group(pid, nix::sys::signal::Signal::SIGKILL);
            }
            let _ = child.start_kill();
            child.wait().await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_in_one_chunk() {
        let mut scanner = SentinelScanner::new(DEFAULT_READY_SENTINEL);
        assert!(!scanner.feed(b"loading config\n"));
        assert!(scanner.feed(b"InitRepo MCP Server running on stdio\n"));
        assert!(scanner.is_found());
    }

    #[test]
    fn test_sentinel_split_byte_by_byte() {
        let mut scanner = SentinelScanner::new(DEFAULT_READY_SENTINEL);
        let text = b"warn: x\nInitRepo MCP Server running on stdio\n";
        let hits: Vec<bool> = text.iter().map(|b| scanner.feed(&[*b])).collect();
        let first = hits.iter().position(|&h| h).unwrap();
        assert_eq!(first, 8 + DEFAULT_READY_SENTINEL.len() - 1);
        assert!(hits[first..].iter().all(|&h| h));
    }

    #[test]
    fn test_sentinel_split_across_uneven_chunks() {
        let mut scanner = SentinelScanner::new("READY NOW");
        assert!(!scanner.feed(b"...REA"));
        assert!(!scanner.feed(b"DY"));
        assert!(!scanner.feed(b" N"));
        assert!(scanner.feed(b"OW\n"));
    }

    #[test]
    fn test_empty_sentinel_is_immediately_ready() {
        let scanner = SentinelScanner::new("");
        assert!(scanner.is_found());
    }

    #[test]
    fn test_startup_noise_does_not_accumulate() {
        let mut scanner = SentinelScanner::new(DEFAULT_READY_SENTINEL);
        let noise = vec![b'x'; 64 * 1024];
        for _ in 0..64 {
            assert!(!scanner.feed(&noise));
            assert!(scanner.seen.len() < DEFAULT_READY_SENTINEL.len());
        }
        assert!(!scanner.feed(b"...InitRepo MCP Ser"));
        assert!(scanner.seen.len() < DEFAULT_READY_SENTINEL.len());
        assert!(scanner.feed(b"ver running on stdio\n"));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_without_start() {
        let mut transport = ProcessTransport::new(TransportConfig::new(CommandSpec::new("true")));
        transport.stop().await.unwrap();
        transport.stop().await.unwrap();
        assert!(matches!(transport.start().await, Err(TransportError::TransportClosed)));
        assert!(matches!(
            transport.write(b"{}\n".to_vec(), Duration::from_millis(10)).await,
            Err(TransportError::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let spec = CommandSpec::new("/definitely/not/a/real/binary-initrepo");
        let mut transport = ProcessTransport::new(TransportConfig::new(spec));
        let err = transport.start().await.unwrap_err();
        assert!(matches!(err, TransportError::Spawn { .. }));
        assert!(!transport.is_running());
    }

    #[cfg(unix)]
    fn sh(script: &str) -> TransportConfig {
        let mut config = TransportConfig::new(CommandSpec::new("sh").arg("-c").arg(script));
        config.startup_timeout = Duration::from_secs(5);
        config.stop_grace = Duration::from_millis(500);
        config
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_sees_sentinel_split_across_writes() {
        let mut transport = ProcessTransport::new(sh(
            "printf 'InitRepo MCP ' >&2; sleep 0.1; printf 'Server running on stdio\\n' >&2; exec cat",
        ));
        transport.start().await.unwrap();
        assert!(transport.is_running());
        assert!(transport.pid().is_some());

        let mut stdout = transport.take_inbound().unwrap();
        transport
            .write(b"{\"id\":1}\n".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        let mut buf = [0u8; 9];
        stdout.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"{\"id\":1}\n");

        transport.stop().await.unwrap();
        transport.stop().await.unwrap();
        assert!(!transport.is_running());
        assert!(transport.stderr_tail().contains("Server running"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_times_out_without_sentinel() {
        let mut config = sh("echo booting >&2; sleep 30");
        config.startup_timeout = Duration::from_millis(300);
        let mut transport = ProcessTransport::new(config);

        let err = transport.start().await.unwrap_err();
        match err {
            TransportError::StartupTimeout { timeout, stderr_tail } => {
                assert_eq!(timeout, Duration::from_millis(300));
                assert!(stderr_tail.contains("booting"));
            }
            other => panic!("expected StartupTimeout, got {other:?}"),
        }
        assert!(!transport.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_before_ready_fails_fast() {
        let mut transport = ProcessTransport::new(sh("echo 'Cannot find module' >&2; exit 1"));
        let err = transport.start().await.unwrap_err();
        assert!(matches!(err, TransportError::ExitedBeforeReady { .. }));
        assert_eq!(err.stderr_tail(), Some("Cannot find module\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_kills_process_ignoring_sigterm() {
        let mut transport = ProcessTransport::new(sh(
            "trap '' TERM; echo 'InitRepo MCP Server running on stdio' >&2; while :; do sleep 1; done",
        ));
        transport.start().await.unwrap();
        let started = std::time::Instant::now();
        transport.stop().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
