//! The seam between the engine and the MCP backend.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use initrepo_config::Config;
use initrepo_transport::{ProcessTransport, RpcClient, RpcError, TransportError};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::tools::{ToolPayload, unwrap_content};

/// Trait for tool backends
///
/// The orchestrator, executor and verifiers only see this trait, so they run
/// unchanged against a real process or an in-memory script.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Invoke `tool` and return its unwrapped JSON payload.
    ///
    /// # Errors
    ///
    /// Returns `RpcError` when the call fails, times out, the tool reports an
    /// error, or the backend connection is gone.
    async fn call_tool(&self, tool: &str, arguments: Map<String, Value>)
    -> Result<Value, RpcError>;
}

/// [`ToolBackend`] over a child process speaking newline-delimited JSON.
pub struct RpcBackend {
    client: RpcClient,
    call_timeout: Duration,
}

impl RpcBackend {
    #[must_use]
    pub fn new(client: RpcClient, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    /// Locate, spawn and attach to the backend for `project_root`.
    ///
    /// Returns once the backend has announced readiness.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Config`] when the server or command cannot be found
    /// - [`EngineError::Transport`] when the process fails to start or never
    ///   becomes ready
    pub async fn launch(config: &Config, project_root: &Path) -> Result<Self, EngineError> {
        let transport_config = config.transport_config(project_root)?;
        info!(
            command = %transport_config.command.display(),
            project_root = %project_root.display(),
            "Starting MCP backend"
        );

        let mut transport = ProcessTransport::new(transport_config);
        transport.start().await?;
        let client = RpcClient::attach(transport)?;
        Ok(Self::new(client, config.call_timeout()))
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Stop the backend, failing any calls still in flight.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the process could not be reaped.
    pub async fn stop(&self) -> Result<(), TransportError> {
        self.client.stop().await
    }
}

#[async_trait]
impl ToolBackend for RpcBackend {
    async fn call_tool(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, RpcError> {
        let result = self.client.call(tool, arguments, self.call_timeout).await?;
        match unwrap_content(result) {
            ToolPayload::Value(value) => Ok(value),
            ToolPayload::ToolError(message) => {
                debug!(tool, %message, "Tool reported an error");
                Err(RpcError::Remote {
                    tool: tool.to_string(),
                    message,
                    code: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// Answers every request with `reply(request)` over an in-memory pipe.
    fn backend_with<F>(reply: F) -> RpcBackend
    where
        F: Fn(&Value) -> Value + Send + 'static,
    {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_side);
        let (server_read, mut server_write) = tokio::io::split(server_side);

        tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                let mut frame = serde_json::to_vec(&reply(&request)).unwrap();
                frame.push(b'\n');
                server_write.write_all(&frame).await.unwrap();
            }
        });

        RpcBackend::new(
            RpcClient::from_streams(client_read, client_write),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_call_tool_unwraps_envelope() {
        let backend = backend_with(|req| {
            json!({
                "id": req["id"],
                "result": {"content": [{"type": "text", "text": "{\"healthScore\": 91}"}]}
            })
        });

        let payload = backend
            .call_tool("generateProjectHealthReport", Map::new())
            .await
            .unwrap();
        assert_eq!(payload, json!({"healthScore": 91}));
        backend.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_call_tool_maps_is_error_to_remote() {
        let backend = backend_with(|req| {
            json!({
                "id": req["id"],
                "result": {"isError": true, "content": [{"type": "text", "text": "no such task"}]}
            })
        });

        let err = backend
            .call_tool("getContextById", Map::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RpcError::Remote {
                tool: "getContextById".into(),
                message: "no such task".into(),
                code: None,
            }
        );
    }

    #[tokio::test]
    async fn test_call_after_stop_is_transport_closed() {
        let backend = backend_with(|req| json!({"id": req["id"], "result": {}}));
        backend.stop().await.unwrap();
        let err = backend.call_tool("listProjects", Map::new()).await.unwrap_err();
        assert_eq!(err, RpcError::TransportClosed);
    }
}
