//! Gateway server side — WebSocket upgrade, per-socket frame loop, and
//! the method handler registry.
//!
//! Each socket gets the shared handler mapping; requests are answered
//! with one response carrying the same id, and handlers may push events
//! through their [`EventSink`] at any time while the socket lives.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::{self, SwarmlinkResult};
use crate::server::authorize;

use super::frame::GatewayFrame;

/// Outgoing frame buffer per socket.
const OUTBOX_CAPACITY: usize = 64;

/// A registered gateway method handler: `(params, sink) -> payload`.
pub type GatewayHandler =
    Arc<dyn Fn(Option<Value>, EventSink) -> BoxFuture<'static, SwarmlinkResult<Value>> + Send + Sync>;

/// Handle for pushing server-originated events down one socket.
#[derive(Clone)]
pub struct EventSink {
    outbox: mpsc::Sender<GatewayFrame>,
}

impl EventSink {
    /// Push an event frame. Returns `false` if the socket is gone.
    pub async fn send_event(&self, name: impl Into<String>, payload: Value) -> bool {
        self.outbox
            .send(GatewayFrame::event(name, payload))
            .await
            .is_ok()
    }
}

/// Method name to handler mapping shared by every gateway socket.
#[derive(Default)]
pub struct GatewayMethods {
    handlers: HashMap<String, GatewayHandler>,
}

impl GatewayMethods {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `method`, replacing any previous one.
    pub fn register<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>, EventSink) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SwarmlinkResult<Value>> + Send + 'static,
    {
        let handler: GatewayHandler =
            Arc::new(move |params, sink| Box::pin(handler(params, sink)));
        self.handlers.insert(method.into(), handler);
    }

    fn get(&self, method: &str) -> Option<GatewayHandler> {
        self.handlers.get(method).cloned()
    }
}

struct GatewayState {
    methods: Arc<GatewayMethods>,
    auth: AuthConfig,
}

/// Create an axum `Router` exposing `GET /gateway` as the WebSocket
/// upgrade endpoint, honoring the same auth config as the A2A routes.
pub fn gateway_router(methods: Arc<GatewayMethods>, auth: AuthConfig) -> Router {
    let state = Arc::new(GatewayState { methods, auth });
    Router::new()
        .route("/gateway", get(handle_upgrade))
        .with_state(state)
}

async fn handle_upgrade(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if authorize(&state.auth, &headers).is_err() {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    let methods = Arc::clone(&state.methods);
    ws.on_upgrade(move |socket| serve_socket(socket, methods))
        .into_response()
}

/// Serve one gateway socket until the peer disconnects.
///
/// Frames that are not requests are ignored; malformed frames are
/// skipped. Handlers run concurrently, each answering with the request's
/// id when it finishes.
pub async fn serve_socket(socket: WebSocket, methods: Arc<GatewayMethods>) {
    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut outbox_rx) = mpsc::channel::<GatewayFrame>(OUTBOX_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbox_rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "failed to serialize gateway frame");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(incoming) = receiver.next().await {
        let text = match incoming {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            _ => continue,
        };

        let frame: GatewayFrame = match serde_json::from_str(text.as_str()) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "skipping malformed gateway frame");
                continue;
            }
        };

        let GatewayFrame::Request { id, method, params } = frame else {
            continue;
        };

        let sink = EventSink {
            outbox: outbox.clone(),
        };
        let outbox = outbox.clone();

        match methods.get(&method) {
            Some(handler) => {
                tokio::spawn(async move {
                    let response = match handler(params, sink).await {
                        Ok(payload) => GatewayFrame::ok(id, payload),
                        Err(err) => GatewayFrame::err(id, err.code(), err.to_string()),
                    };
                    let _ = outbox.send(response).await;
                });
            }
            None => {
                warn!(method = %method, "unknown gateway method");
                let _ = outbox
                    .send(GatewayFrame::err(
                        id,
                        error::METHOD_NOT_FOUND,
                        format!("Method not found: {method}"),
                    ))
                    .await;
            }
        }
    }

    // Closing the outbox ends the writer.
    drop(outbox);
    let _ = writer.await;
    debug!("gateway socket closed");
}
