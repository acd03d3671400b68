//! Axum integration — ready-made HTTP routes for the A2A server.
//!
//! Routes:
//! - `GET /.well-known/agent-card.json` — agent card discovery (no auth)
//! - `POST /a2a/messages` — synchronous JSON-RPC (`message/send`,
//!   `tasks/get`, `tasks/cancel`)
//! - `POST /a2a/messages:stream` — streaming JSON-RPC over SSE
//!   (`message/send`, `message/stream`)
//! - `GET /a2a/tasks/subscribe?taskId=…` — SSE subscription for an
//!   existing task
//!
//! Authentication is `none`, `token`, or `gateway`; the latter two require
//! `Authorization: Bearer <token>` matching the configured token,
//! compared in constant time. Failures yield HTTP 401 — with a JSON-RPC
//! `-32010` body on the RPC route, plain on the SSE routes.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::{A2aConfig, AuthConfig, AuthMode};
use crate::error::{self, SwarmlinkError};
use crate::state::is_terminal;
use crate::types::{
    AgentAuthentication, AgentCapabilities, AgentCard, AgentSkill, JsonRpcId, JsonRpcResponse,
    SendMessageParams, StreamEvent, TaskIdParams, TaskStatusUpdateEvent,
};

use super::dispatcher::Dispatcher;
use super::executor::{run_task, TaskExecutor};
use super::task_manager::TaskManager;

/// JSON-RPC method: send a message and wait for the final task.
pub const METHOD_MESSAGE_SEND: &str = "message/send";
/// JSON-RPC method: send a message and stream events.
pub const METHOD_MESSAGE_STREAM: &str = "message/stream";
/// JSON-RPC method: fetch a task by id.
pub const METHOD_TASKS_GET: &str = "tasks/get";
/// JSON-RPC method: cancel a task by id.
pub const METHOD_TASKS_CANCEL: &str = "tasks/cancel";

/// Protocol version advertised in the agent card.
pub const A2A_PROTOCOL_VERSION: &str = "0.2.0";

/// Maximum accepted request body on the RPC routes (10 MiB).
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state behind the A2A routes.
pub struct A2aServerState {
    /// Full A2A configuration (card generation + auth).
    pub config: A2aConfig,
    /// The task store.
    pub manager: Arc<TaskManager>,
    /// The executor hook supplied by the embedding application.
    pub executor: Arc<dyn TaskExecutor>,
}

struct AppState {
    state: Arc<A2aServerState>,
    dispatcher: Dispatcher<A2aServerState>,
}

/// Generate the agent card advertised at the well-known endpoint.
pub fn build_agent_card(config: &A2aConfig) -> AgentCard {
    let url = config
        .base_url
        .as_deref()
        .unwrap_or("http://localhost")
        .trim_end_matches('/')
        .to_string();

    let name = config
        .server
        .expose_agents
        .first()
        .cloned()
        .unwrap_or_else(|| "swarmlink-agent".to_string());

    let skills = config
        .server
        .expose_agents
        .iter()
        .map(|agent| AgentSkill {
            id: agent.clone(),
            name: agent.clone(),
            description: format!("Delegate tasks to the {agent} agent"),
            tags: vec!["agent".to_string()],
        })
        .collect();

    let authentication = match config.auth.mode {
        AuthMode::None => None,
        AuthMode::Token | AuthMode::Gateway => Some(AgentAuthentication {
            schemes: vec!["bearer".to_string()],
            credentials: None,
        }),
    };

    AgentCard {
        name,
        description: "A2A endpoint exposing local agents for delegation".to_string(),
        url,
        version: A2A_PROTOCOL_VERSION.to_string(),
        capabilities: AgentCapabilities {
            streaming: config.server.streaming,
            push_notifications: config.server.push_notifications,
            state_transition_history: true,
        },
        skills,
        authentication,
        provider: None,
    }
}

/// Validate the `Authorization` header against the configured auth mode.
///
/// Token comparison is constant-time. A non-`none` mode with no token
/// configured rejects everything.
pub(crate) fn authorize(auth: &AuthConfig, headers: &HeaderMap) -> Result<(), SwarmlinkError> {
    if auth.mode == AuthMode::None {
        return Ok(());
    }

    let Some(expected) = auth.token.as_deref() else {
        warn!("auth mode requires a token but none is configured");
        return Err(SwarmlinkError::authentication_required(
            "no token configured",
        ));
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| SwarmlinkError::authentication_required("missing bearer token"))?;

    if constant_time_eq::constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(SwarmlinkError::authentication_required("invalid token"))
    }
}

/// Create an axum `Router` with the A2A routes.
pub fn a2a_router(state: Arc<A2aServerState>) -> Router {
    let mut dispatcher = Dispatcher::new(Arc::clone(&state));

    dispatcher.register(METHOD_MESSAGE_SEND, |params, ctx: Arc<A2aServerState>| {
        async move {
            let params: SendMessageParams = parse_params(params)?;
            let task = ctx.manager.create_task(params).await?;
            let task = run_task(&ctx.manager, ctx.executor.as_ref(), &task.id).await?;
            Ok(serde_json::to_value(task)
                .map_err(|e| SwarmlinkError::internal_error(e.to_string()))?)
        }
    });

    dispatcher.register(METHOD_TASKS_GET, |params, ctx: Arc<A2aServerState>| {
        async move {
            let params: TaskIdParams = parse_params(params)?;
            let task = ctx.manager.get_task_or_err(&params.id).await?;
            Ok(serde_json::to_value(task)
                .map_err(|e| SwarmlinkError::internal_error(e.to_string()))?)
        }
    });

    dispatcher.register(METHOD_TASKS_CANCEL, |params, ctx: Arc<A2aServerState>| {
        async move {
            let params: TaskIdParams = parse_params(params)?;
            let task = ctx.manager.cancel_task(&params.id).await?;
            Ok(serde_json::to_value(task)
                .map_err(|e| SwarmlinkError::internal_error(e.to_string()))?)
        }
    });

    // Background expiry sweep, detached for the life of the process.
    Arc::clone(&state.manager).spawn_prune_loop(CancellationToken::new());

    let app = Arc::new(AppState { state, dispatcher });

    Router::new()
        .route("/.well-known/agent-card.json", get(handle_agent_card))
        .route("/a2a/messages", post(handle_rpc))
        .route("/a2a/messages:stream", post(handle_rpc_stream))
        .route("/a2a/tasks/subscribe", get(handle_subscribe))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(app)
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, SwarmlinkError> {
    serde_json::from_value(params).map_err(|e| SwarmlinkError::invalid_params(e.to_string()))
}

/// Serve the agent card. No auth; non-GET methods get 405 from the router.
async fn handle_agent_card(State(app): State<Arc<AppState>>) -> impl IntoResponse {
    Json(build_agent_card(&app.state.config))
}

/// `POST /a2a/messages` — synchronous JSON-RPC.
async fn handle_rpc(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if let Err(err) = authorize(&app.state.config.auth, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(JsonRpcResponse::from_error(None, err)),
        )
            .into_response();
    }

    if !is_json_content(&headers) {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Json(JsonRpcResponse::from_error(
                None,
                SwarmlinkError::invalid_request("Content-Type must be application/json"),
            )),
        )
            .into_response();
    }

    let raw: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return Json(JsonRpcResponse::from_error(
                None,
                SwarmlinkError::parse_error(e.to_string()),
            ))
            .into_response();
        }
    };

    Json(app.dispatcher.dispatch(raw).await).into_response()
}

fn is_json_content(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim() == "application/json")
        .unwrap_or(false)
}

/// `POST /a2a/messages:stream` — start a task and stream its events.
///
/// Each SSE event is a JSON-RPC success response whose `result` is a
/// [`StreamEvent`]; every event on the stream reuses the original
/// request's id (intentionally, despite general JSON-RPC semantics).
async fn handle_rpc_stream(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if authorize(&app.state.config.auth, &headers).is_err() {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    if !is_json_content(&headers) {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Json(JsonRpcResponse::from_error(
                None,
                SwarmlinkError::invalid_request("Content-Type must be application/json"),
            )),
        )
            .into_response();
    }

    let raw: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return Json(JsonRpcResponse::from_error(
                None,
                SwarmlinkError::parse_error(e.to_string()),
            ))
            .into_response();
        }
    };

    let id = match raw.get("id") {
        Some(Value::String(s)) => Some(JsonRpcId::String(s.clone())),
        Some(Value::Number(n)) => n.as_i64().map(JsonRpcId::Number),
        _ => None,
    };

    let method = raw.get("method").and_then(Value::as_str).unwrap_or("");
    if method != METHOD_MESSAGE_SEND && method != METHOD_MESSAGE_STREAM {
        return Json(JsonRpcResponse::from_error(
            id,
            SwarmlinkError::method_not_found(method),
        ))
        .into_response();
    }

    if !app.state.config.server.streaming {
        return Json(JsonRpcResponse::error(
            id,
            crate::types::JsonRpcError {
                code: error::UNSUPPORTED_OPERATION,
                message: "Streaming is not enabled on this server".to_string(),
                data: None,
            },
        ))
        .into_response();
    }

    let params: SendMessageParams = match parse_params(
        raw.get("params")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
    ) {
        Ok(p) => p,
        Err(err) => return Json(JsonRpcResponse::from_error(id, err)).into_response(),
    };

    let task = match app.state.manager.create_task(params).await {
        Ok(task) => task,
        Err(err) => return Json(JsonRpcResponse::from_error(id, err)).into_response(),
    };

    // Subscribe before execution starts so no event is missed.
    let rx = match app.state.manager.subscribe(&task.id).await {
        Ok(rx) => rx,
        Err(err) => return Json(JsonRpcResponse::from_error(id, err)).into_response(),
    };

    let cancel = app
        .state
        .manager
        .cancel_token(&task.id)
        .await
        .unwrap_or_default();

    {
        let state = Arc::clone(&app.state);
        let task_id = task.id.clone();
        tokio::spawn(async move {
            if let Err(err) = run_task(&state.manager, state.executor.as_ref(), &task_id).await {
                error!(task_id = %task_id, error = %err, "streamed task execution failed");
            }
        });
    }

    debug!(task_id = %task.id, "streaming task events");
    sse_response(wrapped_event_stream(id, rx, cancel))
}

/// `GET /a2a/tasks/subscribe?taskId=…` — subscribe to an existing task.
///
/// The task's current status is sent first (as a raw [`StreamEvent`], no
/// JSON-RPC envelope); if the task is already terminal the stream closes
/// right after.
async fn handle_subscribe(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SubscribeQuery>,
) -> Response {
    if authorize(&app.state.config.auth, &headers).is_err() {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    // Subscribe before snapshotting so nothing is missed in between.
    let rx = match app.state.manager.subscribe(&query.task_id).await {
        Ok(rx) => rx,
        Err(_) => return (StatusCode::NOT_FOUND, "task not found").into_response(),
    };

    let Some(task) = app.state.manager.get_task(&query.task_id).await else {
        return (StatusCode::NOT_FOUND, "task not found").into_response();
    };

    let current = StreamEvent::StatusUpdate(TaskStatusUpdateEvent {
        task_id: task.id.clone(),
        status: task.status.clone(),
        r#final: is_terminal(task.status.state),
    });

    sse_response(raw_event_stream(current, rx))
}

#[derive(Debug, serde::Deserialize)]
struct SubscribeQuery {
    #[serde(rename = "taskId")]
    task_id: String,
}

fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache"),
    );
    response
}

/// Cancels the task's executor if the SSE stream is dropped before the
/// terminal event (client disconnect).
struct DisconnectGuard {
    cancel: CancellationToken,
    armed: bool,
}

impl DisconnectGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.armed {
            debug!("SSE client disconnected; canceling executor");
            self.cancel.cancel();
        }
    }
}

/// Stream for the streaming RPC route: JSON-RPC-wrapped events, closing
/// after the terminal status update.
fn wrapped_event_stream(
    request_id: Option<JsonRpcId>,
    mut rx: broadcast::Receiver<StreamEvent>,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let mut guard = DisconnectGuard { cancel, armed: true };
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let is_final = event.is_final();
                    match serde_json::to_value(&event) {
                        Ok(result) => {
                            let rpc = JsonRpcResponse::success(request_id.clone(), result);
                            match serde_json::to_string(&rpc) {
                                Ok(json) => yield Ok(Event::default().data(json)),
                                Err(e) => error!(error = %e, "failed to serialize SSE response"),
                            }
                        }
                        Err(e) => error!(error = %e, "failed to serialize stream event"),
                    }
                    if is_final {
                        guard.disarm();
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    guard.disarm();
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "SSE subscriber lagged; events dropped");
                }
            }
        }
    }
}

/// Stream for the task-subscribe route: raw events, current status first.
fn raw_event_stream(
    current: StreamEvent,
    mut rx: broadcast::Receiver<StreamEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let is_final = current.is_final();
        if let Ok(json) = serde_json::to_string(&current) {
            yield Ok(Event::default().data(json));
        }
        if is_final {
            return;
        }

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let is_final = event.is_final();
                    match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(Event::default().data(json)),
                        Err(e) => error!(error = %e, "failed to serialize stream event"),
                    }
                    if is_final {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "SSE subscriber lagged; events dropped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthMode;

    fn headers_with_bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        headers
    }

    #[test]
    fn auth_none_accepts_everything() {
        let auth = AuthConfig {
            mode: AuthMode::None,
            token: None,
        };
        assert!(authorize(&auth, &HeaderMap::new()).is_ok());
    }

    #[test]
    fn auth_token_requires_exact_match() {
        let auth = AuthConfig {
            mode: AuthMode::Token,
            token: Some("T".to_string()),
        };
        assert!(authorize(&auth, &headers_with_bearer("T")).is_ok());
        assert!(authorize(&auth, &headers_with_bearer("X")).is_err());
        assert!(authorize(&auth, &HeaderMap::new()).is_err());
    }

    #[test]
    fn auth_without_configured_token_rejects() {
        let auth = AuthConfig {
            mode: AuthMode::Token,
            token: None,
        };
        assert!(authorize(&auth, &headers_with_bearer("anything")).is_err());
    }

    #[test]
    fn card_reflects_config() {
        let mut config = A2aConfig::default();
        config.base_url = Some("http://localhost:7420/".to_string());
        config.server.expose_agents = vec!["researcher".to_string()];
        config.server.streaming = true;
        config.auth.mode = AuthMode::Token;
        config.auth.token = Some("T".to_string());

        let card = build_agent_card(&config);
        assert_eq!(card.url, "http://localhost:7420");
        assert_eq!(card.name, "researcher");
        assert!(card.capabilities.streaming);
        assert!(card.capabilities.state_transition_history);
        assert_eq!(card.skills.len(), 1);
        assert_eq!(
            card.authentication.unwrap().schemes,
            vec!["bearer".to_string()]
        );
    }

    #[test]
    fn json_content_type_detection() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            "application/json; charset=utf-8".parse().unwrap(),
        );
        assert!(is_json_content(&headers));

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
        assert!(!is_json_content(&headers));

        assert!(!is_json_content(&HeaderMap::new()));
    }
}
