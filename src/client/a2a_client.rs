//! A2A client — typed HTTP client for a single remote agent.
//!
//! Wraps the JSON-RPC routes (`/a2a/messages`, `/a2a/messages:stream`)
//! and the task-subscribe SSE route. Every call sets
//! `Content-Type: application/json` and, when configured, either an
//! `Authorization: Bearer` or `X-API-Key` header.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::{SwarmlinkError, SwarmlinkResult};
use crate::types::{
    JsonRpcRequest, JsonRpcResponse, SendMessageParams, Task, TaskIdParams,
};

use super::sse::SseStream;

/// Default request timeout (120 s).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Credentials presented on every request.
#[derive(Debug, Clone)]
pub enum ClientAuth {
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// `X-API-Key: <key>`.
    ApiKey(String),
}

/// Options for constructing an [`A2aClient`].
#[derive(Debug, Clone)]
pub struct A2aClientOptions {
    /// Base URL of the remote agent. Trailing slashes are trimmed.
    pub base_url: String,
    /// Optional credentials.
    pub auth: Option<ClientAuth>,
    /// Per-request timeout. Defaults to 120 s.
    pub timeout: Duration,
}

impl A2aClientOptions {
    /// Options with defaults for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Client for one remote A2A agent.
#[derive(Debug, Clone)]
pub struct A2aClient {
    http: reqwest::Client,
    base_url: String,
    auth: Option<ClientAuth>,
    timeout: Duration,
}

impl A2aClient {
    /// Create a client from options.
    pub fn new(options: A2aClientOptions) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: options.base_url.trim_end_matches('/').to_string(),
            auth: options.auth,
            timeout: options.timeout,
        }
    }

    /// The normalized base URL this client targets.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a message and block until the remote task is final.
    pub async fn send_message(&self, params: SendMessageParams) -> SwarmlinkResult<Task> {
        let request = self.rpc_request(
            "message/send",
            serde_json::to_value(params).map_err(SwarmlinkError::from)?,
        );
        let result = self.post_rpc(&request).await?;
        serde_json::from_value(result)
            .map_err(|e| SwarmlinkError::parse_error(format!("invalid task in response: {e}")))
    }

    /// Send a message and stream events as the remote task progresses.
    pub async fn send_message_stream(
        &self,
        params: SendMessageParams,
    ) -> SwarmlinkResult<SseStream> {
        let request = self.rpc_request(
            "message/send",
            serde_json::to_value(params).map_err(SwarmlinkError::from)?,
        );
        let url = format!("{}/a2a/messages:stream", self.base_url);
        debug!(url = %url, "opening message stream");

        let response = self
            .apply_auth(
                self.http
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .header("Accept", "text/event-stream"),
            )
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SwarmlinkError::RpcHttpError {
                status: status.as_u16(),
            });
        }

        Ok(SseStream::from_response(response))
    }

    /// Fetch a task by id.
    pub async fn get_task(&self, id: &str) -> SwarmlinkResult<Task> {
        let request = self.rpc_request(
            "tasks/get",
            serde_json::to_value(TaskIdParams { id: id.to_string() })
                .map_err(SwarmlinkError::from)?,
        );
        let result = self.post_rpc(&request).await?;
        serde_json::from_value(result)
            .map_err(|e| SwarmlinkError::parse_error(format!("invalid task in response: {e}")))
    }

    /// Cancel a task by id. Returns the canceled task.
    pub async fn cancel_task(&self, id: &str) -> SwarmlinkResult<Task> {
        let request = self.rpc_request(
            "tasks/cancel",
            serde_json::to_value(TaskIdParams { id: id.to_string() })
                .map_err(SwarmlinkError::from)?,
        );
        let result = self.post_rpc(&request).await?;
        serde_json::from_value(result)
            .map_err(|e| SwarmlinkError::parse_error(format!("invalid task in response: {e}")))
    }

    /// Subscribe to an existing task's event stream.
    pub async fn subscribe(&self, id: &str) -> SwarmlinkResult<SseStream> {
        let url = format!("{}/a2a/tasks/subscribe?taskId={}", self.base_url, id);
        debug!(url = %url, "subscribing to task");

        let response = self
            .apply_auth(self.http.get(&url).header("Accept", "text/event-stream"))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SwarmlinkError::RpcHttpError {
                status: status.as_u16(),
            });
        }

        Ok(SseStream::from_response(response))
    }

    fn rpc_request(&self, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(
            uuid::Uuid::new_v4().to_string().as_str(),
            method,
            Some(params),
        )
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some(ClientAuth::Bearer(token)) => {
                builder.header("Authorization", format!("Bearer {token}"))
            }
            Some(ClientAuth::ApiKey(key)) => builder.header("X-API-Key", key),
            None => builder,
        }
    }

    async fn post_rpc(&self, request: &JsonRpcRequest) -> SwarmlinkResult<Value> {
        let url = format!("{}/a2a/messages", self.base_url);

        let response = self
            .apply_auth(
                self.http
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .timeout(self.timeout),
            )
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SwarmlinkError::RpcHttpError {
                status: status.as_u16(),
            });
        }

        let rpc: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| SwarmlinkError::parse_error(format!("invalid JSON-RPC response: {e}")))?;

        if let Some(error) = rpc.error {
            return Err(SwarmlinkError::RpcError {
                code: error.code,
                message: error.message,
            });
        }

        rpc.result
            .ok_or_else(|| SwarmlinkError::parse_error("JSON-RPC response has neither result nor error"))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> SwarmlinkError {
    if e.is_timeout() {
        SwarmlinkError::Timeout(format!("request timed out: {e}"))
    } else {
        SwarmlinkError::Transport(format!("request failed: {e}"))
    }
}
