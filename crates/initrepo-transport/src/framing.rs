//! Newline-delimited JSON framing for tool calls.
//!
//! Outbound, every call is a single `tools/call` object terminated by `\n`.
//! Inbound, bytes arrive in arbitrary chunks; [`LineDecoder`] reassembles
//! them into complete lines before any parse is attempted, and
//! [`decode_line`] classifies each line as a response or as noise.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Upper bound for a single inbound frame.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const TOOLS_CALL: &str = "tools/call";

#[derive(Serialize)]
struct CallFrame<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: CallParams<'a>,
}

#[derive(Serialize)]
struct CallParams<'a> {
    name: &'a str,
    arguments: &'a Map<String, Value>,
}

/// Encode one tool call as a complete, newline-terminated frame.
///
/// # Errors
///
/// Fails only if an argument value cannot be serialized.
pub fn encode_call(
    id: u64,
    tool: &str,
    arguments: &Map<String, Value>,
) -> Result<Vec<u8>, serde_json::Error> {
    let mut frame = serde_json::to_vec(&CallFrame {
        jsonrpc: "2.0",
        id,
        method: TOOLS_CALL,
        params: CallParams {
            name: tool,
            arguments,
        },
    })?;
    frame.push(b'\n');
    Ok(frame)
}

/// Error payload reported by the backend for a call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteFault {
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
}

impl RemoteFault {
    /// Build a fault from whatever the backend put in `error`.
    ///
    /// A bare string becomes the message; an object without a usable
    /// `message` still yields a fault so the addressed call settles.
    fn from_value(error: Value) -> Self {
        match error {
            Value::String(message) => Self { message, code: None },
            Value::Object(ref fields) => Self {
                message: fields
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| format!("malformed error: {error}"), str::to_string),
                code: fields.get("code").and_then(Value::as_i64),
            },
            other => Self {
                message: format!("malformed error: {other}"),
                code: None,
            },
        }
    }
}

#[derive(Deserialize)]
struct InboundFrame {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Classification of one complete inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A response addressed to call `id`.
    Response {
        id: u64,
        outcome: Result<Value, RemoteFault>,
    },
    /// Valid JSON without a numeric id (notifications, logs).
    Unaddressed,
    /// Not a JSON object at all; carries a short excerpt for logging.
    Noise(String),
}

/// Classify a complete line. Never fails: anything unparseable is noise.
#[must_use]
pub fn decode_line(line: &[u8]) -> Decoded {
    match serde_json::from_slice::<InboundFrame>(line) {
        Ok(frame) => match frame.id.as_ref().and_then(Value::as_u64) {
            Some(id) => {
                let outcome = match frame.error {
                    Some(error) => Err(RemoteFault::from_value(error)),
                    None => Ok(frame.result.unwrap_or(Value::Null)),
                };
                Decoded::Response { id, outcome }
            }
            None => Decoded::Unaddressed,
        },
        Err(_) => Decoded::Noise(excerpt(line, 120)),
    }
}

fn excerpt(line: &[u8], max_chars: usize) -> String {
    let text = String::from_utf8_lossy(line);
    if text.chars().count() <= max_chars {
        text.into_owned()
    } else {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    }
}

/// Reassembles newline-terminated lines from arbitrary byte chunks.
///
/// Bytes after the last `\n` are held until the next chunk completes them.
/// A trailing `\r` is stripped and blank lines are skipped. A line longer
/// than the configured limit is discarded up to its terminator.
#[derive(Debug)]
pub struct LineDecoder {
    buf: Vec<u8>,
    max_line: usize,
    discarding: bool,
    discarded_lines: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(MAX_FRAME_BYTES)
    }
}

impl LineDecoder {
    #[must_use]
    pub fn new(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line,
            discarding: false,
            discarded_lines: 0,
        }
    }

    /// Feed a chunk and return every line it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if self.buf.len() + head.len() > self.max_line {
                self.buf.clear();
                self.discarded_lines += 1;
                continue;
            }

            self.buf.extend_from_slice(head);
            let mut line = std::mem::take(&mut self.buf);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(line);
            }
        }

        if !self.discarding {
            if self.buf.len() + rest.len() > self.max_line {
                self.buf.clear();
                self.discarding = true;
                self.discarded_lines += 1;
            } else {
                self.buf.extend_from_slice(rest);
            }
        }

        lines
    }

    /// Bytes held while waiting for a terminator.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Number of oversized lines dropped so far.
    #[must_use]
    pub const fn discarded_lines(&self) -> usize {
        self.discarded_lines
    }
}
