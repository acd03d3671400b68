//! Error types — JSON-RPC error codes + swarmlink-specific errors.
//!
//! One unified enum covers all subsystems:
//! - Standard JSON-RPC 2.0 errors (-32700 through -32603)
//! - A2A task errors (-32001 through -32010)
//! - Client transport, swarm orchestrator, and gateway errors

use crate::types::{JsonRpcError, TaskState};

// ---------------------------------------------------------------------------
// Standard JSON-RPC 2.0 error codes
// ---------------------------------------------------------------------------

/// Invalid JSON was received by the server.
pub const PARSE_ERROR: i64 = -32700;

/// The JSON sent is not a valid Request object.
pub const INVALID_REQUEST: i64 = -32600;

/// The method does not exist / is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Invalid method parameter(s).
pub const INVALID_PARAMS: i64 = -32602;

/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;

// ---------------------------------------------------------------------------
// A2A-specific error codes
// ---------------------------------------------------------------------------

/// The requested task was not found.
pub const TASK_NOT_FOUND: i64 = -32001;

/// The task cannot be canceled in its current state.
pub const TASK_NOT_CANCELABLE: i64 = -32002;

/// Push notifications are not supported by this agent.
pub const PUSH_NOT_SUPPORTED: i64 = -32003;

/// The requested operation is not supported.
pub const UNSUPPORTED_OPERATION: i64 = -32004;

/// The request lacks valid authentication credentials.
pub const AUTHENTICATION_REQUIRED: i64 = -32010;

// ---------------------------------------------------------------------------
// SwarmlinkError enum
// ---------------------------------------------------------------------------

/// Unified error type for all swarmlink subsystems.
///
/// Every failure surfaced by the crate is one of these kinds with a stable
/// display string. Variants that map to A2A wire errors expose their
/// JSON-RPC code via [`SwarmlinkError::code`]; everything else maps to
/// `-32603` (internal error) when it has to cross the wire.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SwarmlinkError {
    // -- Dispatcher / server protocol errors --
    /// Invalid JSON payload (code -32700).
    #[error("Parse error: {message}")]
    ParseError {
        /// Human-readable error message.
        message: String,
    },

    /// Request envelope validation error (code -32600).
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Human-readable error message.
        message: String,
    },

    /// Method not found (code -32601).
    #[error("Method not found: {method}")]
    MethodNotFound {
        /// The unknown method name.
        method: String,
    },

    /// Invalid parameters (code -32602).
    #[error("Invalid params: {message}")]
    InvalidParams {
        /// Human-readable error message.
        message: String,
    },

    /// Internal error (code -32603).
    #[error("Internal error: {message}")]
    InternalError {
        /// Human-readable error message.
        message: String,
    },

    /// Missing or invalid authentication (code -32010).
    #[error("Authentication required: {message}")]
    AuthenticationRequired {
        /// Human-readable error message.
        message: String,
    },

    // -- Task manager errors --
    /// A task state transition outside the state machine was attempted.
    #[error("Invalid transition: {from} -> {to} (allowed: {allowed:?})")]
    InvalidTransition {
        /// The state the task is currently in.
        from: TaskState,
        /// The state the caller tried to move to.
        to: TaskState,
        /// The transitions actually permitted from `from`.
        allowed: &'static [TaskState],
    },

    /// Task not found (code -32001).
    #[error("Task not found: {id}")]
    TaskNotFound {
        /// The missing task id.
        id: String,
    },

    /// Task is already terminal and cannot be canceled (code -32002).
    #[error("Task not cancelable: {id}")]
    TaskNotCancelable {
        /// The task id.
        id: String,
    },

    /// The task store is full.
    #[error("Task limit reached ({max} tasks)")]
    TaskLimitReached {
        /// The configured maximum.
        max: usize,
    },

    // -- Client-side errors --
    /// Fetching an agent card returned a non-2xx status.
    #[error("Card fetch failed with HTTP {status} from {url}")]
    CardFetchFailed {
        /// HTTP status code returned by the remote agent.
        status: u16,
        /// The URL the fetch targeted.
        url: String,
    },

    /// An RPC HTTP round trip returned a non-2xx status.
    #[error("RPC HTTP error {status}")]
    RpcHttpError {
        /// HTTP status code.
        status: u16,
    },

    /// A JSON-RPC error response was received from the remote side.
    #[error("RPC error {code}: {message}")]
    RpcError {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },

    /// The operation was canceled by the caller.
    #[error("Canceled")]
    Canceled,

    /// Request or stream timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transport-level failure (connection refused, DNS, broken stream).
    #[error("Transport error: {0}")]
    Transport(String),

    // -- Swarm orchestrator errors --
    /// Too many concurrently active swarms.
    #[error("Maximum concurrent swarms reached ({max})")]
    MaxSwarmsReached {
        /// The configured maximum.
        max: usize,
    },

    /// More agents requested than the per-swarm cap allows.
    #[error("Too many agents: {requested} requested, {max} allowed")]
    TooManyAgents {
        /// Number of agents requested.
        requested: usize,
        /// The configured maximum.
        max: usize,
    },

    /// `execute` was called on an agent with no assigned task.
    #[error("Agent {agent_id} has no assigned task")]
    NoAssignedTask {
        /// The agent id.
        agent_id: String,
    },

    // -- Gateway client errors --
    /// A request was issued while the gateway client was not connected.
    #[error("Gateway client is not connected")]
    NotConnected,

    /// The connection dropped while requests were pending.
    #[error("Connection closed ({code}): {reason}")]
    ConnectionClosed {
        /// Close code reported by the transport.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },

    /// All reconnect attempts were exhausted.
    #[error("Reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted {
        /// How many attempts were made.
        attempts: u32,
    },
}

/// Convenience result type for swarmlink operations.
pub type SwarmlinkResult<T> = Result<T, SwarmlinkError>;

impl SwarmlinkError {
    /// Create a `ParseError` from a message.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    /// Create an `InvalidRequest` from a message.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a `MethodNotFound` for a method name.
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Create an `InvalidParams` from a message.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Create an `InternalError` from a message.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Create an `AuthenticationRequired` from a message.
    pub fn authentication_required(message: impl Into<String>) -> Self {
        Self::AuthenticationRequired {
            message: message.into(),
        }
    }

    /// Create a `TaskNotFound` for a task id.
    pub fn task_not_found(id: impl Into<String>) -> Self {
        Self::TaskNotFound { id: id.into() }
    }

    /// Create a `TaskNotCancelable` for a task id.
    pub fn task_not_cancelable(id: impl Into<String>) -> Self {
        Self::TaskNotCancelable { id: id.into() }
    }

    /// Returns the JSON-RPC error code for this error kind.
    ///
    /// Kinds with no wire representation (client transport, swarm,
    /// gateway) map to -32603 (internal error).
    pub fn code(&self) -> i64 {
        match self {
            SwarmlinkError::ParseError { .. } => PARSE_ERROR,
            SwarmlinkError::InvalidRequest { .. } => INVALID_REQUEST,
            SwarmlinkError::MethodNotFound { .. } => METHOD_NOT_FOUND,
            SwarmlinkError::InvalidParams { .. } => INVALID_PARAMS,
            SwarmlinkError::InternalError { .. } => INTERNAL_ERROR,
            SwarmlinkError::AuthenticationRequired { .. } => AUTHENTICATION_REQUIRED,
            SwarmlinkError::TaskNotFound { .. } => TASK_NOT_FOUND,
            SwarmlinkError::TaskNotCancelable { .. } => TASK_NOT_CANCELABLE,
            SwarmlinkError::RpcError { code, .. } => *code,
            SwarmlinkError::InvalidTransition { .. }
            | SwarmlinkError::TaskLimitReached { .. }
            | SwarmlinkError::CardFetchFailed { .. }
            | SwarmlinkError::RpcHttpError { .. }
            | SwarmlinkError::Canceled
            | SwarmlinkError::Timeout(_)
            | SwarmlinkError::Transport(_)
            | SwarmlinkError::MaxSwarmsReached { .. }
            | SwarmlinkError::TooManyAgents { .. }
            | SwarmlinkError::NoAssignedTask { .. }
            | SwarmlinkError::NotConnected
            | SwarmlinkError::ConnectionClosed { .. }
            | SwarmlinkError::ReconnectExhausted { .. } => INTERNAL_ERROR,
        }
    }
}

impl From<SwarmlinkError> for JsonRpcError {
    fn from(err: SwarmlinkError) -> Self {
        JsonRpcError {
            code: err.code(),
            message: err.to_string(),
            data: None,
        }
    }
}

impl From<serde_json::Error> for SwarmlinkError {
    fn from(err: serde_json::Error) -> Self {
        SwarmlinkError::ParseError {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_protocol() {
        assert_eq!(PARSE_ERROR, -32700);
        assert_eq!(INVALID_REQUEST, -32600);
        assert_eq!(METHOD_NOT_FOUND, -32601);
        assert_eq!(INVALID_PARAMS, -32602);
        assert_eq!(INTERNAL_ERROR, -32603);
        assert_eq!(TASK_NOT_FOUND, -32001);
        assert_eq!(TASK_NOT_CANCELABLE, -32002);
        assert_eq!(PUSH_NOT_SUPPORTED, -32003);
        assert_eq!(UNSUPPORTED_OPERATION, -32004);
        assert_eq!(AUTHENTICATION_REQUIRED, -32010);
    }

    #[test]
    fn task_error_to_json_rpc_error() {
        let err = SwarmlinkError::task_not_found("task-123");
        let rpc_err: JsonRpcError = err.into();
        assert_eq!(rpc_err.code, -32001);
        assert!(rpc_err.message.contains("task-123"));
    }

    #[test]
    fn transport_error_maps_to_internal() {
        let err = SwarmlinkError::Transport("connection refused".to_string());
        assert_eq!(err.code(), INTERNAL_ERROR);
    }

    #[test]
    fn rpc_error_preserves_remote_code() {
        let err = SwarmlinkError::RpcError {
            code: -32001,
            message: "Task not found".to_string(),
        };
        assert_eq!(err.code(), -32001);
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = SwarmlinkError::InvalidTransition {
            from: TaskState::Completed,
            to: TaskState::Working,
            allowed: &[],
        };
        let s = err.to_string();
        assert!(s.contains("completed"));
        assert!(s.contains("working"));
    }
}
