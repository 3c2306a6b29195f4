//! Tool-call client with id correlation.
//!
//! One reader task owns the inbound stream and a [`LineDecoder`]; every
//! complete frame is matched against the correlation table and delivered to
//! the waiting call through a oneshot channel. Each call owns a drop guard
//! that retires its table entry, so a timed-out or cancelled call can never
//! be resolved later.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{RpcError, TransportError};
use crate::framing::{self, Decoded, LineDecoder, RemoteFault};
use crate::outbound::{DEFAULT_QUEUE_FRAMES, OutboundWriter};
use crate::process::ProcessTransport;

type Reply = Result<Value, RemoteFault>;

#[derive(Default)]
struct CorrelationTable {
    closed: bool,
    pending: HashMap<u64, oneshot::Sender<Reply>>,
}

struct Shared {
    next_id: AtomicU64,
    table: Mutex<CorrelationTable>,
}

impl Shared {
    fn with_first_id() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            table: Mutex::default(),
        }
    }

    fn table(&self) -> MutexGuard<'_, CorrelationTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, id: u64) -> Result<oneshot::Receiver<Reply>, RpcError> {
        let mut table = self.table();
        if table.closed {
            return Err(RpcError::TransportClosed);
        }
        let (tx, rx) = oneshot::channel();
        table.pending.insert(id, tx);
        Ok(rx)
    }

    fn dispatch(&self, line: &[u8]) {
        match framing::decode_line(line) {
            Decoded::Response { id, outcome } => match self.table().pending.remove(&id) {
                Some(tx) => {
                    trace!(id, "Response matched");
                    let _ = tx.send(outcome);
                }
                None => debug!(id, "Ignoring response for unknown or retired call"),
            },
            Decoded::Unaddressed => trace!("Ignoring frame without numeric id"),
            Decoded::Noise(excerpt) => debug!(line = %excerpt, "Ignoring non-JSON backend output"),
        }
    }

    /// Refuse new calls and fail every outstanding one.
    ///
    /// Dropping a pending sender wakes its call with `TransportClosed`.
    fn close(&self) -> usize {
        let mut table = self.table();
        table.closed = true;
        let failed = table.pending.len();
        table.pending.clear();
        failed
    }
}

/// Retires a call's correlation entry on every exit path.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.table().pending.remove(&self.id);
    }
}

/// Multiplexes concurrent tool calls over one backend connection.
///
/// Ids start at 1 and are never reused within a client. Responses may arrive
/// in any order.
pub struct RpcClient {
    shared: Arc<Shared>,
    writer: OutboundWriter,
    reader_task: JoinHandle<()>,
    writer_task: Option<JoinHandle<()>>,
    transport: tokio::sync::Mutex<Option<ProcessTransport>>,
}

impl RpcClient {
    /// Attach to a started transport, taking ownership of it.
    ///
    /// # Errors
    ///
    /// [`TransportError::TransportClosed`] if the transport is not running or
    /// its stdout was already taken.
    pub fn attach(mut transport: ProcessTransport) -> Result<Self, TransportError> {
        let writer = transport.outbound()?;
        let inbound = transport.take_inbound()?;
        let shared = Arc::new(Shared::with_first_id());
        let reader_task = tokio::spawn(read_loop(inbound, Arc::clone(&shared), LineDecoder::default()));
        Ok(Self {
            shared,
            writer,
            reader_task,
            writer_task: None,
            transport: tokio::sync::Mutex::new(Some(transport)),
        })
    }

    /// Run the client over arbitrary streams instead of a child process.
    pub fn from_streams<R, W>(inbound: R, outbound: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer, writer_task) = OutboundWriter::spawn(outbound, DEFAULT_QUEUE_FRAMES);
        let shared = Arc::new(Shared::with_first_id());
        let reader_task = tokio::spawn(read_loop(inbound, Arc::clone(&shared), LineDecoder::default()));
        Self {
            shared,
            writer,
            reader_task,
            writer_task: Some(writer_task),
            transport: tokio::sync::Mutex::new(None),
        }
    }

    /// Invoke `tool` and wait up to `timeout` for its response.
    ///
    /// The timeout covers queueing the request as well as the reply.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Remote`] when the backend answers with an error payload
    /// - [`RpcError::Timeout`] when no matching response arrives in time
    /// - [`RpcError::TransportClosed`] when the client is stopped or the
    ///   backend's stdout closes while waiting
    pub async fn call(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        let deadline = Instant::now() + timeout;
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let timed_out = || RpcError::Timeout {
            tool: tool.to_string(),
            id,
            timeout,
        };

        let frame = framing::encode_call(id, tool, &arguments).map_err(|e| RpcError::Encode {
            tool: tool.to_string(),
            reason: e.to_string(),
        })?;

        let rx = self.shared.register(id)?;
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };
        debug!(id, tool, "Calling tool");

        match self
            .writer
            .send(frame, deadline.saturating_duration_since(Instant::now()))
            .await
        {
            Ok(()) => {}
            Err(TransportError::Timeout { .. }) => return Err(timed_out()),
            Err(_) => return Err(RpcError::TransportClosed),
        }

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(fault))) => Err(RpcError::Remote {
                tool: tool.to_string(),
                message: fault.message,
                code: fault.code,
            }),
            Ok(Err(_)) => Err(RpcError::TransportClosed),
            Err(_) => {
                warn!(id, tool, timeout = ?timeout, "Tool call timed out");
                Err(timed_out())
            }
        }
    }

    /// Calls currently waiting for a response.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.shared.table().pending.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.table().closed
    }

    /// Fail all outstanding calls with `TransportClosed` and stop the backend.
    ///
    /// Idempotent. Calls made afterwards fail without writing anything.
    pub async fn stop(&self) -> Result<(), TransportError> {
        let failed = self.shared.close();
        if failed > 0 {
            debug!(failed, "Failed outstanding calls on stop");
        }
        self.reader_task.abort();
        if let Some(task) = &self.writer_task {
            task.abort();
        }
        let transport = self.transport.lock().await.take();
        if let Some(mut transport) = transport {
            transport.stop().await?;
        }
        Ok(())
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.shared.close();
        self.reader_task.abort();
        if let Some(task) = &self.writer_task {
            task.abort();
        }
    }
}

async fn read_loop<R>(mut inbound: R, shared: Arc<Shared>, mut decoder: LineDecoder)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; 8192];
    let mut discarded = 0;
    loop {
        match inbound.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                for line in decoder.push(&chunk[..n]) {
                    shared.dispatch(&line);
                }
                if decoder.discarded_lines() > discarded {
                    discarded = decoder.discarded_lines();
                    warn!(discarded, "Dropped oversized backend frame");
                }
            }
            Err(e) => {
                warn!(error = %e, "Backend stdout read failed");
                break;
            }
        }
    }
    if decoder.pending_bytes() > 0 {
        debug!(bytes = decoder.pending_bytes(), "Dropping unterminated trailing frame");
    }
    let failed = shared.close();
    warn!(failed, "Backend stdout closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

    /// The backend end of an in-memory connection.
    struct FakeBackend {
        requests: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
        replies: WriteHalf<DuplexStream>,
    }

    impl FakeBackend {
        async fn next_request(&mut self) -> Value {
            let line = self.requests.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn send(&mut self, bytes: &[u8]) {
            self.replies.write_all(bytes).await.unwrap();
            self.replies.flush().await.unwrap();
        }

        async fn reply(&mut self, id: u64, result: Value) {
            let mut line = serde_json::to_vec(&json!({"jsonrpc": "2.0", "id": id, "result": result})).unwrap();
            line.push(b'\n');
            self.send(&line).await;
        }
    }

    fn connect() -> (Arc<RpcClient>, FakeBackend) {
        let (client_end, backend_end) = tokio::io::duplex(64 * 1024);
        let (client_rx, client_tx) = tokio::io::split(client_end);
        let (backend_rx, backend_tx) = tokio::io::split(backend_end);
        let client = RpcClient::from_streams(client_rx, client_tx);
        let backend = FakeBackend {
            requests: BufReader::new(backend_rx).lines(),
            replies: backend_tx,
        };
        (Arc::new(client), backend)
    }

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    const THIRTY: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_call_round_trip() {
        let (client, mut backend) = connect();
        let call = tokio::spawn({
            let client = Arc::clone(&client);
            async move {
                client
                    .call("getContextById", args(&[("id", json!("T-1"))]), THIRTY)
                    .await
            }
        });

        let request = backend.next_request().await;
        assert_eq!(request["id"], json!(1));
        assert_eq!(request["method"], json!("tools/call"));
        assert_eq!(request["params"]["name"], json!("getContextById"));
        assert_eq!(request["params"]["arguments"]["id"], json!("T-1"));

        backend.reply(1, json!({"title": "Auth"})).await;
        assert_eq!(call.await.unwrap().unwrap(), json!({"title": "Auth"}));
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_remote_error_is_tagged() {
        let (client, mut backend) = connect();
        let call = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("listProjects", Map::new(), THIRTY).await }
        });
        let request = backend.next_request().await;
        let id = request["id"].as_u64().unwrap();
        backend
            .send(format!("{{\"id\":{id},\"error\":{{\"message\":\"no projects\"}}}}\n").as_bytes())
            .await;

        assert_eq!(
            call.await.unwrap(),
            Err(RpcError::Remote {
                tool: "listProjects".into(),
                message: "no projects".into(),
                code: None,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_retires_call_and_ignores_late_reply() {
        let (client, mut backend) = connect();

        let started = Instant::now();
        let err = client.call("getProjectStatus", Map::new(), THIRTY).await.unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(
            err,
            RpcError::Timeout {
                tool: "getProjectStatus".into(),
                id: 1,
                timeout: THIRTY,
            }
        );
        assert!(elapsed >= THIRTY);
        assert!(elapsed < Duration::from_secs(31));
        assert_eq!(client.pending_calls(), 0);

        // Late reply for id 1, then a live call with id 2
        assert_eq!(backend.next_request().await["id"], json!(1));
        backend.reply(1, json!("late")).await;

        let call = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("getProjectStatus", Map::new(), THIRTY).await }
        });
        assert_eq!(backend.next_request().await["id"], json!(2));
        backend.reply(2, json!("fresh")).await;
        assert_eq!(call.await.unwrap().unwrap(), json!("fresh"));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_dropped_and_reading_continues() {
        let (reader, mut writer) = tokio::io::duplex(1024);
        let shared = Arc::new(Shared::with_first_id());
        let reply = shared.register(1).unwrap();
        let reader_task = tokio::spawn(read_loop(reader, Arc::clone(&shared), LineDecoder::new(32)));

        let oversized = format!("{{\"id\":1,\"result\":\"{}\"}}\n", "x".repeat(200));
        writer.write_all(oversized.as_bytes()).await.unwrap();
        writer.write_all(b"{\"id\":1,\"result\":\"ok\"}\n").await.unwrap();

        assert_eq!(reply.await.unwrap(), Ok(json!("ok")));
        drop(writer);
        reader_task.await.unwrap();
        assert!(shared.table().closed);
    }

    #[tokio::test]
    async fn test_response_split_across_chunks() {
        let (client, mut backend) = connect();
        let call = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("generateProjectHealthReport", Map::new(), THIRTY).await }
        });
        backend.next_request().await;

        let frame = b"{\"id\":1,\"result\":{\"healthScore\":91}}\n";
        for piece in frame.chunks(5) {
            backend.send(piece).await;
            tokio::task::yield_now().await;
        }
        assert_eq!(call.await.unwrap().unwrap(), json!({"healthScore": 91}));
    }

    #[tokio::test]
    async fn test_out_of_order_replies_reach_their_callers() {
        let (client, mut backend) = connect();
        let mut calls = Vec::new();
        for tool in ["a", "b", "c"] {
            let client = Arc::clone(&client);
            calls.push(tokio::spawn(async move {
                client.call(tool, Map::new(), THIRTY).await
            }));
        }

        let mut ids_by_tool = HashMap::new();
        for _ in 0..3 {
            let request = backend.next_request().await;
            ids_by_tool.insert(
                request["params"]["name"].as_str().unwrap().to_string(),
                request["id"].as_u64().unwrap(),
            );
        }

        // Reply in reverse, with noise and a stray id mixed in
        backend.send(b"server log line\n").await;
        backend.reply(999, json!("stray")).await;
        for tool in ["c", "b", "a"] {
            backend.reply(ids_by_tool[tool], json!(tool)).await;
        }

        for (handle, tool) in calls.into_iter().zip(["a", "b", "c"]) {
            assert_eq!(handle.await.unwrap().unwrap(), json!(tool));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_fails_outstanding_calls_immediately() {
        let (client, mut backend) = connect();
        let mut calls = Vec::new();
        for _ in 0..3 {
            let client = Arc::clone(&client);
            calls.push(tokio::spawn(async move {
                client.call("analyzeTaskDependencies", Map::new(), THIRTY).await
            }));
        }
        for _ in 0..3 {
            backend.next_request().await;
        }
        assert_eq!(client.pending_calls(), 3);

        let started = Instant::now();
        client.stop().await.unwrap();
        for handle in calls {
            assert_eq!(handle.await.unwrap(), Err(RpcError::TransportClosed));
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(
            client.call("listProjects", Map::new(), THIRTY).await,
            Err(RpcError::TransportClosed)
        );
        client.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_backend_eof_fails_pending_calls() {
        let (client, mut backend) = connect();
        let call = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("listProjects", Map::new(), THIRTY).await }
        });
        backend.next_request().await;
        drop(backend);

        assert_eq!(call.await.unwrap(), Err(RpcError::TransportClosed));
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_dropped_call_future_retires_entry() {
        let (client, mut backend) = connect();
        let call = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("slow", Map::new(), THIRTY).await }
        });
        backend.next_request().await;
        assert_eq!(client.pending_calls(), 1);

        call.abort();
        let _ = call.await;
        assert_eq!(client.pending_calls(), 0);
    }
}
