//! Gateway frame codec.
//!
//! Frames are UTF-8 JSON, one object per logical message, discriminated
//! by `type`:
//!
//! - `{"type": "request", "id": "ab12cd34", "method": "agent", "params": {...}}`
//! - `{"type": "response", "id": "ab12cd34", "ok": true, "payload": {...}}`
//! - `{"type": "response", "id": "ab12cd34", "ok": false, "error": {"code": -32601, "message": "..."}}`
//! - `{"type": "event", "name": "agent", "payload": {...}}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request: open a connection handshake (`{client, version, timestamp}`).
pub const METHOD_CONNECT: &str = "connect";
/// Request: send a chat message to the agent.
pub const METHOD_AGENT: &str = "agent";
/// Request: fetch the agent's identity.
pub const METHOD_AGENT_IDENTITY: &str = "agent_identity";
/// Request: list sessions.
pub const METHOD_SESSIONS_LIST: &str = "sessions_list";
/// Request: patch a session.
pub const METHOD_SESSIONS_PATCH: &str = "sessions_patch";
/// Request: read the active configuration.
pub const METHOD_CONFIG_GET: &str = "config_get";

/// Event: a streamed agent output chunk.
pub const EVENT_AGENT: &str = "agent";
/// Event: a chat completion or out-of-band message.
pub const EVENT_CHAT: &str = "chat";

/// A single gateway frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GatewayFrame {
    /// A client-originated request.
    Request {
        /// Short unique id; the response echoes it.
        id: String,
        /// Method name.
        method: String,
        /// Method parameters.
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    /// The server's answer to a request.
    Response {
        /// The request id this answers.
        id: String,
        /// Whether the request succeeded.
        ok: bool,
        /// Result payload, when `ok`.
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        /// Error details, when not `ok`.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<FrameError>,
    },
    /// A server-pushed event.
    Event {
        /// Event name.
        name: String,
        /// Event payload.
        payload: Value,
    },
}

/// Error carried by a failed response frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameError {
    /// Error code (JSON-RPC codes reused).
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

impl GatewayFrame {
    /// Build a request frame with a fresh id.
    pub fn request(method: impl Into<String>, params: Option<Value>) -> Self {
        GatewayFrame::Request {
            id: frame_id(),
            method: method.into(),
            params,
        }
    }

    /// Build a successful response for `id`.
    pub fn ok(id: impl Into<String>, payload: Value) -> Self {
        GatewayFrame::Response {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Build a failed response for `id`.
    pub fn err(id: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        GatewayFrame::Response {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(FrameError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Build an event frame.
    pub fn event(name: impl Into<String>, payload: Value) -> Self {
        GatewayFrame::Event {
            name: name.into(),
            payload,
        }
    }
}

/// Generate a short unique frame id (8 hex chars).
pub fn frame_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Which output stream an agent chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Normal response text.
    Text,
    /// Model thinking output.
    Thinking,
    /// A tool invocation notice.
    ToolCall,
}

/// Payload of an `agent` event: one chunk of streamed output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStreamChunk {
    /// The run this chunk belongs to.
    pub run_id: String,
    /// Sequence number within the run.
    pub seq: u64,
    /// Which stream the chunk carries.
    pub stream: StreamKind,
    /// Chunk content.
    pub data: String,
}
