//! Backpressure-aware outbound writes.
//!
//! Frames are queued on a bounded channel drained by one writer task. A full
//! pipe stalls only the writer task; callers wait on queue capacity for at
//! most their own timeout. Each frame is written whole before the next one
//! starts, so concurrent callers never interleave bytes.

use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::error::TransportError;

/// Default number of frames that may wait for the writer task.
pub const DEFAULT_QUEUE_FRAMES: usize = 64;

/// Cloneable handle to the writer task.
#[derive(Debug, Clone)]
pub struct OutboundWriter {
    tx: mpsc::Sender<Vec<u8>>,
}

impl OutboundWriter {
    /// Spawn the writer task over `sink`.
    ///
    /// The task ends when every handle is dropped, when the task is aborted,
    /// or on the first write error; later sends then fail with
    /// [`TransportError::TransportClosed`].
    pub fn spawn<W>(sink: W, capacity: usize) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(write_loop(sink, rx));
        (Self { tx }, task)
    }

    /// Queue one complete frame, waiting at most `timeout` for capacity.
    ///
    /// # Errors
    ///
    /// [`TransportError::Timeout`] if the queue stays full past `timeout`,
    /// [`TransportError::TransportClosed`] if the writer task is gone.
    pub async fn send(&self, frame: Vec<u8>, timeout: Duration) -> Result<(), TransportError> {
        match self.tx.send_timeout(frame, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(TransportError::Timeout { timeout }),
            Err(SendTimeoutError::Closed(_)) => Err(TransportError::TransportClosed),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

async fn write_loop<W>(mut sink: W, mut rx: mpsc::Receiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        let written = async {
            sink.write_all(&frame).await?;
            sink.flush().await
        }
        .await;

        if let Err(e) = written {
            warn!(error = %e, "Backend stdin write failed; closing outbound stream");
            break;
        }
        trace!(bytes = frame.len(), "Frame written");
    }
    let _ = sink.shutdown().await;
}
