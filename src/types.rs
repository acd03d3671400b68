//! A2A v0.2 protocol types.
//!
//! Wire types for the Agent-to-Agent protocol: tasks, messages, parts,
//! artifacts, agent cards, streaming events, and the JSON-RPC 2.0
//! envelope. All structs serialize camelCase; tagged unions carry an
//! explicit `type` discriminator.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Enums
// ============================================================================

/// The lifecycle state of a task.
///
/// Serialized as kebab-case strings on the wire (`"input-required"` etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// Task has been received but not yet started.
    Submitted,
    /// Task is actively being processed.
    Working,
    /// Task requires additional input from the user.
    ///
    /// The state machine supports entering and leaving this state, but no
    /// companion RPC method for supplying the input is defined; executors
    /// that use it must define their own re-entry path.
    InputRequired,
    /// Task completed successfully. Terminal.
    Completed,
    /// Task failed. Terminal.
    Failed,
    /// Task was canceled. Terminal.
    Canceled,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::InputRequired => "input-required",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
        };
        write!(f, "{}", s)
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message from the user / client.
    User,
    /// Message from the agent / server.
    Agent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

// ============================================================================
// Core Task Types
// ============================================================================

/// Current status of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    /// The current state.
    pub state: TaskState,

    /// Optional message associated with this status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    /// RFC-3339 timestamp of when this status was set.
    ///
    /// Monotonically non-decreasing within a task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl TaskStatus {
    /// Create a new status with the given state and no message.
    pub fn new(state: TaskState) -> Self {
        TaskStatus {
            state,
            message: None,
            timestamp: None,
        }
    }
}

/// A task — the primary unit of work in the A2A protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier (UUID v4).
    pub id: String,

    /// Session identifier grouping related tasks (UUID v4; server-generated
    /// when the caller does not supply one).
    pub session_id: String,

    /// Current task status.
    pub status: TaskStatus,

    /// Message history. `history[0]` is the initiating user message.
    #[serde(default)]
    pub history: Vec<Message>,

    /// Artifacts produced by the task, ordered by `index`.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,

    /// Arbitrary metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

// ============================================================================
// Message & Parts
// ============================================================================

/// A single message in a conversation. Carries at least one part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Who sent this message.
    pub role: Role,

    /// Content parts of the message.
    pub parts: Vec<Part>,

    /// Arbitrary metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Message {
    /// Create a user message with a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            parts: vec![Part::text(text)],
            metadata: None,
        }
    }

    /// Create an agent message with a single text part.
    pub fn agent(text: impl Into<String>) -> Self {
        Message {
            role: Role::Agent,
            parts: vec![Part::text(text)],
            metadata: None,
        }
    }

    /// The concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// File content carried by a file part — inline base64 bytes or a URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FilePayload {
    /// Optional file name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// MIME type of the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Base64-encoded file content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,

    /// URI pointing to the file content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// A content part within a message or artifact.
///
/// Discriminated by the `type` field.
///
/// JSON wire format:
/// - Text: `{"type": "text", "text": "hello"}`
/// - File: `{"type": "file", "file": {"name": "a.txt", "mimeType": "text/plain", "bytes": "SGVsbG8="}}`
/// - Data: `{"type": "data", "data": {"key": "value"}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Part {
    /// A text content part. Discriminator: `"text"`.
    #[serde(rename = "text")]
    Text {
        /// The text content.
        text: String,
    },
    /// A file content part. Discriminator: `"file"`.
    #[serde(rename = "file")]
    File {
        /// The file content (inline bytes or URI).
        file: FilePayload,
    },
    /// A structured data content part. Discriminator: `"data"`.
    #[serde(rename = "data")]
    Data {
        /// Arbitrary structured data (object or array).
        data: serde_json::Value,
    },
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Create a file part.
    pub fn file(file: FilePayload) -> Self {
        Part::File { file }
    }

    /// Create a structured data part.
    pub fn data(data: serde_json::Value) -> Self {
        Part::Data { data }
    }
}

/// An artifact produced by a task.
///
/// Artifacts within a task are ordered by `index`; `last_chunk = true`
/// marks the final chunk of a streamed artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Description of the artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Content parts of the artifact.
    pub parts: Vec<Part>,

    /// Position of this artifact within the task's artifact list.
    pub index: u32,

    /// Whether this chunk appends to an existing artifact at `index`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append: Option<bool>,

    /// Whether this is the last chunk of the artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk: Option<bool>,

    /// Arbitrary metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Artifact {
    /// Create a single-chunk text artifact at the given index.
    pub fn text(text: impl Into<String>, index: u32) -> Self {
        Artifact {
            name: None,
            description: None,
            parts: vec![Part::text(text)],
            index,
            append: None,
            last_chunk: Some(true),
            metadata: None,
        }
    }

    /// Create a single-chunk file artifact at the given index.
    pub fn file(file: FilePayload, index: u32) -> Self {
        Artifact {
            name: file.name.clone(),
            description: None,
            parts: vec![Part::file(file)],
            index,
            append: None,
            last_chunk: Some(true),
            metadata: None,
        }
    }
}

// ============================================================================
// Streaming Events
// ============================================================================

/// Notification that a task's status has changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdateEvent {
    /// ID of the task whose status changed.
    pub task_id: String,

    /// The new status.
    pub status: TaskStatus,

    /// Whether this is the final event for this task (the status is
    /// terminal and the subscriber set has been released).
    #[serde(rename = "final")]
    pub r#final: bool,
}

/// Notification that an artifact has been produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskArtifactUpdateEvent {
    /// ID of the task that produced the artifact.
    pub task_id: String,

    /// The artifact.
    pub artifact: Artifact,
}

/// A streaming event — the payload of SSE frames on the streaming routes.
///
/// Closed tagged union, discriminated by `type`:
/// - `"status-update"` -> [`TaskStatusUpdateEvent`]
/// - `"artifact-update"` -> [`TaskArtifactUpdateEvent`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A task status update.
    #[serde(rename = "status-update")]
    StatusUpdate(TaskStatusUpdateEvent),

    /// An artifact update.
    #[serde(rename = "artifact-update")]
    ArtifactUpdate(TaskArtifactUpdateEvent),
}

impl StreamEvent {
    /// The id of the task this event belongs to.
    pub fn task_id(&self) -> &str {
        match self {
            StreamEvent::StatusUpdate(e) => &e.task_id,
            StreamEvent::ArtifactUpdate(e) => &e.task_id,
        }
    }

    /// Whether this event terminates the stream.
    pub fn is_final(&self) -> bool {
        matches!(self, StreamEvent::StatusUpdate(e) if e.r#final)
    }
}

// ============================================================================
// Agent Card & Related Types
// ============================================================================

/// Self-describing manifest for an A2A agent, served at
/// `/.well-known/agent-card.json`.
///
/// Immutable once fetched; identified by its normalized base `url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    /// Human-readable name.
    pub name: String,

    /// Description of the agent's capabilities.
    #[serde(default)]
    pub description: String,

    /// Canonical base URL (origin + path, no trailing slash).
    pub url: String,

    /// Protocol version string.
    pub version: String,

    /// Agent capability flags.
    #[serde(default)]
    pub capabilities: AgentCapabilities,

    /// Skills the agent supports, in declaration order.
    #[serde(default)]
    pub skills: Vec<AgentSkill>,

    /// Supported authentication schemes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AgentAuthentication>,

    /// Service provider information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<AgentProvider>,
}

/// Agent capabilities declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    /// Whether the agent supports streaming responses.
    #[serde(default)]
    pub streaming: bool,

    /// Whether the agent supports push notifications.
    #[serde(default)]
    pub push_notifications: bool,

    /// Whether the agent records a history of state transitions per task.
    #[serde(default)]
    pub state_transition_history: bool,
}

/// A skill that an agent can perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    /// Unique skill identifier.
    pub id: String,

    /// Human-readable skill name.
    pub name: String,

    /// Description of what the skill does.
    #[serde(default)]
    pub description: String,

    /// Categorization tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Supported authentication schemes for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAuthentication {
    /// Scheme names (e.g. `["bearer"]`).
    pub schemes: Vec<String>,

    /// Optional credential hint for the schemes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

/// Information about the agent's provider/organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProvider {
    /// Organization name.
    pub organization: String,

    /// Organization URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A registry entry for a remote agent this process knows about.
///
/// Identified by `url`; persists for process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownAgent {
    /// Base URL of the remote agent.
    pub url: String,

    /// Optional display name overriding the card's name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Bearer token to present when calling this agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Vault reference resolving to the bearer token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_vault_ref: Option<String>,
}

// ============================================================================
// JSON-RPC Foundation
// ============================================================================

/// A JSON-RPC 2.0 request ID — a string or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    /// String identifier.
    String(String),
    /// Numeric identifier.
    Number(i64),
}

impl fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonRpcId::String(s) => write!(f, "{}", s),
            JsonRpcId::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for JsonRpcId {
    fn from(s: &str) -> Self {
        JsonRpcId::String(s.to_string())
    }
}

impl From<i64> for JsonRpcId {
    fn from(n: i64) -> Self {
        JsonRpcId::Number(n)
    }
}

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version — always "2.0".
    pub jsonrpc: String,

    /// Request identifier.
    pub id: JsonRpcId,

    /// Method name.
    pub method: String,

    /// Method parameters. Defaults to an empty object when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(
        id: impl Into<JsonRpcId>,
        method: impl Into<String>,
        params: Option<serde_json::Value>,
    ) -> Self {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response. Exactly one of `result` or `error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version — always "2.0".
    pub jsonrpc: String,

    /// Request identifier this response corresponds to. `None` when the
    /// request id could not be read from the envelope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,

    /// Successful result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a successful response.
    pub fn success(id: Option<JsonRpcId>, result: serde_json::Value) -> Self {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<JsonRpcId>, error: JsonRpcError) -> Self {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Create an error response from a [`SwarmlinkError`](crate::error::SwarmlinkError).
    pub fn from_error(id: Option<JsonRpcId>, err: crate::error::SwarmlinkError) -> Self {
        Self::error(id, err.into())
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,

    /// Human-readable error message.
    pub message: String,

    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// ============================================================================
// Request Parameter Types
// ============================================================================

/// Parameters for `message/send` and `message/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageParams {
    /// The message to send.
    pub message: Message,

    /// Session to attach the task to. A fresh UUID is generated when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Arbitrary metadata stored on the task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Parameters for `tasks/get` and `tasks/cancel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskIdParams {
    /// The task ID.
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_state_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(TaskState::InputRequired).unwrap(),
            json!("input-required")
        );
        assert_eq!(
            serde_json::from_value::<TaskState>(json!("canceled")).unwrap(),
            TaskState::Canceled
        );
    }

    #[test]
    fn part_wire_format() {
        let text = Part::text("hello");
        assert_eq!(
            serde_json::to_value(&text).unwrap(),
            json!({"type": "text", "text": "hello"})
        );

        let file = Part::file(FilePayload {
            name: Some("a.txt".to_string()),
            mime_type: Some("text/plain".to_string()),
            bytes: Some("SGVsbG8=".to_string()),
            uri: None,
        });
        assert_eq!(
            serde_json::to_value(&file).unwrap(),
            json!({"type": "file", "file": {"name": "a.txt", "mimeType": "text/plain", "bytes": "SGVsbG8="}})
        );

        let data = Part::data(json!({"k": 1}));
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({"type": "data", "data": {"k": 1}})
        );
    }

    #[test]
    fn stream_event_discriminator_round_trip() {
        let event = StreamEvent::StatusUpdate(TaskStatusUpdateEvent {
            task_id: "t1".to_string(),
            status: TaskStatus::new(TaskState::Working),
            r#final: false,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "status-update");
        assert_eq!(value["taskId"], "t1");
        assert_eq!(value["final"], false);

        let parsed: StreamEvent = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.task_id(), "t1");
        assert!(!parsed.is_final());
    }

    #[test]
    fn artifact_serializes_camel_case() {
        let artifact = Artifact::text("pong", 0);
        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value["index"], 0);
        assert_eq!(value["lastChunk"], true);
        assert_eq!(value["parts"][0]["text"], "pong");
    }

    #[test]
    fn agent_card_tolerates_unknown_fields() {
        let card: AgentCard = serde_json::from_value(json!({
            "name": "Remote",
            "url": "http://example.com",
            "version": "0.2.0",
            "futureField": {"ignored": true},
            "skills": [{"id": "s1", "name": "Skill", "tags": ["a"], "bonus": 1}]
        }))
        .unwrap();
        assert_eq!(card.name, "Remote");
        assert_eq!(card.skills.len(), 1);
        assert!(!card.capabilities.streaming);
    }

    #[test]
    fn message_text_concatenates_text_parts() {
        let msg = Message {
            role: Role::User,
            parts: vec![
                Part::text("one"),
                Part::data(json!({})),
                Part::text("two"),
            ],
            metadata: None,
        };
        assert_eq!(msg.text(), "one\ntwo");
    }

    #[test]
    fn json_rpc_id_accepts_string_and_number() {
        let s: JsonRpcId = serde_json::from_value(json!("abc")).unwrap();
        assert_eq!(s, JsonRpcId::String("abc".to_string()));
        let n: JsonRpcId = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(n, JsonRpcId::Number(7));
    }
}
