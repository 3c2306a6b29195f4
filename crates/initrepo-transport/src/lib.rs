//! Child-process transport and tool-call client for MCP backends.
//!
//! The backend is a child process speaking newline-delimited JSON over its
//! stdin/stdout and announcing readiness with a sentinel line on stderr.
//!
//! - [`ProcessTransport`] owns the child: spawn, readiness detection,
//!   backpressure-aware writes and deterministic termination.
//! - [`RpcClient`] multiplexes concurrent tool calls over one stream and
//!   correlates responses by id through a single persistent frame decoder.
//!
//! # Security Model
//!
//! The backend is launched through [`CommandSpec`] with argv-style arguments,
//! never through a shell.

pub mod command_spec;
pub mod error;
pub mod framing;
pub mod outbound;
pub mod process;
pub mod ring_buffer;
pub mod rpc;

pub use command_spec::CommandSpec;
pub use error::{RpcError, TransportError};
pub use framing::{LineDecoder, RemoteFault};
pub use outbound::OutboundWriter;
pub use process::{ProcessTransport, SentinelScanner, TransportConfig};
pub use ring_buffer::RingBuffer;
pub use rpc::RpcClient;
