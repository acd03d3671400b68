//! Gateway client — a process-wide connection to the gateway server with
//! request/response correlation, event subscriptions, and
//! exponential-backoff reconnect.
//!
//! One connection per process ([`GatewayClient::global`]). Requests are
//! scoped to a single connection: a drop fails every pending request with
//! `ConnectionClosed`, and nothing is retried across reconnects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::{SinkExt, StreamExt};
use rand::RngExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::{SwarmlinkError, SwarmlinkResult};

use super::frame::{frame_id, GatewayFrame, METHOD_CONNECT};

/// How long a request waits for its matching response.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const RECONNECT_BASE_MS: u64 = 500;
const RECONNECT_MAX_MS: u64 = 30_000;
const RECONNECT_JITTER_MS: u64 = 500;
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none being attempted.
    Disconnected,
    /// A connection (or reconnection) attempt is in flight.
    Connecting,
    /// Connected and able to carry requests.
    Connected,
}

/// Callback for a named gateway event.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Callback for connection state changes.
pub type StateHandler = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Handle for removing an event or state subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Shared {
    state: watch::Sender<ConnectionState>,
    pending: Mutex<HashMap<String, oneshot::Sender<SwarmlinkResult<Value>>>>,
    event_handlers: Mutex<HashMap<String, Vec<(SubscriptionId, EventHandler)>>>,
    state_handlers: Mutex<Vec<(SubscriptionId, StateHandler)>>,
    next_subscription: AtomicU64,
    outbox: Mutex<Option<mpsc::Sender<GatewayFrame>>>,
    user_disconnected: AtomicBool,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let changed = *self.state.borrow() != state;
        if !changed {
            return;
        }
        self.state.send_replace(state);

        let handlers: Vec<StateHandler> = self
            .state_handlers
            .lock()
            .expect("state handlers lock")
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(state))).is_err()
            {
                warn!("state-change handler panicked");
            }
        }
    }

    /// Fail every pending request with `ConnectionClosed`.
    fn fail_pending(&self, code: u16, reason: &str) {
        let pending: Vec<oneshot::Sender<SwarmlinkResult<Value>>> = self
            .pending
            .lock()
            .expect("pending lock")
            .drain()
            .map(|(_, tx)| tx)
            .collect();
        for tx in pending {
            let _ = tx.send(Err(SwarmlinkError::ConnectionClosed {
                code,
                reason: reason.to_string(),
            }));
        }
    }

    async fn request(&self, method: &str, params: Option<Value>) -> SwarmlinkResult<Value> {
        if *self.state.borrow() != ConnectionState::Connected {
            return Err(SwarmlinkError::NotConnected);
        }
        let outbox = self
            .outbox
            .lock()
            .expect("outbox lock")
            .clone()
            .ok_or(SwarmlinkError::NotConnected)?;

        let id = frame_id();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending lock")
            .insert(id.clone(), tx);

        let frame = GatewayFrame::Request {
            id: id.clone(),
            method: method.to_string(),
            params,
        };
        if outbox.send(frame).await.is_err() {
            self.pending.lock().expect("pending lock").remove(&id);
            return Err(SwarmlinkError::NotConnected);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SwarmlinkError::ConnectionClosed {
                code: 1006,
                reason: String::new(),
            }),
            Err(_) => {
                self.pending.lock().expect("pending lock").remove(&id);
                Err(SwarmlinkError::Timeout(format!(
                    "no response within {}s",
                    REQUEST_TIMEOUT.as_secs()
                )))
            }
        }
    }

    fn handle_frame(&self, frame: GatewayFrame) {
        match frame {
            GatewayFrame::Response {
                id,
                ok,
                payload,
                error,
            } => {
                let Some(tx) = self.pending.lock().expect("pending lock").remove(&id) else {
                    debug!(id = %id, "response for unknown request id");
                    return;
                };
                let result = if ok {
                    Ok(payload.unwrap_or(Value::Null))
                } else {
                    let (code, message) = error
                        .map(|e| (e.code, e.message))
                        .unwrap_or((-1, "unknown error".to_string()));
                    Err(SwarmlinkError::RpcError { code, message })
                };
                let _ = tx.send(result);
            }
            GatewayFrame::Event { name, payload } => {
                let handlers: Vec<EventHandler> = self
                    .event_handlers
                    .lock()
                    .expect("event handlers lock")
                    .get(&name)
                    .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
                    .unwrap_or_default();
                for handler in handlers {
                    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        handler(&payload)
                    }))
                    .is_err()
                    {
                        warn!(event = %name, "event handler panicked");
                    }
                }
            }
            GatewayFrame::Request { .. } => {
                // The server does not issue requests; ignore.
            }
        }
    }
}

/// Reconnecting gateway client.
pub struct GatewayClient {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Default for GatewayClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayClient {
    /// Create a standalone client. Most callers want
    /// [`GatewayClient::global`].
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                state,
                pending: Mutex::new(HashMap::new()),
                event_handlers: Mutex::new(HashMap::new()),
                state_handlers: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
                outbox: Mutex::new(None),
                user_disconnected: AtomicBool::new(false),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// The process-wide client instance.
    pub fn global() -> &'static GatewayClient {
        static GLOBAL: OnceLock<GatewayClient> = OnceLock::new();
        GLOBAL.get_or_init(GatewayClient::new)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// A watch receiver following the connection state.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Start connecting to `url`, reconnecting on loss until
    /// [`disconnect`](Self::disconnect) is called or the attempt budget
    /// is exhausted. Idempotent while a connection supervisor is running.
    pub fn connect(&self, url: impl Into<String>) {
        let url = url.into();
        self.shared.user_disconnected.store(false, Ordering::SeqCst);

        let mut supervisor = self.supervisor.lock().expect("supervisor lock");
        if let Some(handle) = supervisor.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }
        let shared = Arc::clone(&self.shared);
        *supervisor = Some(tokio::spawn(run_connection(shared, url)));
    }

    /// Drop the connection, cancel reconnection, and fail all pending
    /// requests with `ConnectionClosed`.
    pub fn disconnect(&self) {
        self.shared.user_disconnected.store(true, Ordering::SeqCst);
        if let Some(handle) = self.supervisor.lock().expect("supervisor lock").take() {
            handle.abort();
        }
        self.shared.outbox.lock().expect("outbox lock").take();
        self.shared.fail_pending(1000, "client disconnect");
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Issue a request and await its payload.
    ///
    /// Fails with `NotConnected` when not connected, `Timeout` after 30 s
    /// without a matching response, `RpcError` on an `ok=false` response,
    /// and `ConnectionClosed` if the connection drops first.
    pub async fn request(&self, method: &str, params: Option<Value>) -> SwarmlinkResult<Value> {
        self.shared.request(method, params).await
    }

    /// Subscribe to a named gateway event.
    pub fn on(&self, event: impl Into<String>, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(
            self.shared
                .next_subscription
                .fetch_add(1, Ordering::Relaxed),
        );
        self.shared
            .event_handlers
            .lock()
            .expect("event handlers lock")
            .entry(event.into())
            .or_default()
            .push((id, handler));
        id
    }

    /// Subscribe to connection state changes.
    pub fn on_state_change(&self, handler: StateHandler) -> SubscriptionId {
        let id = SubscriptionId(
            self.shared
                .next_subscription
                .fetch_add(1, Ordering::Relaxed),
        );
        self.shared
            .state_handlers
            .lock()
            .expect("state handlers lock")
            .push((id, handler));
        id
    }

    /// Remove an event or state subscription.
    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        let mut events = self
            .shared
            .event_handlers
            .lock()
            .expect("event handlers lock");
        for handlers in events.values_mut() {
            handlers.retain(|(id, _)| *id != subscription);
        }
        drop(events);
        self.shared
            .state_handlers
            .lock()
            .expect("state handlers lock")
            .retain(|(id, _)| *id != subscription);
    }
}

/// Connection supervisor: connect, serve, and reconnect with backoff.
async fn run_connection(shared: Arc<Shared>, url: String) {
    let mut attempts: u32 = 0;

    loop {
        if shared.user_disconnected.load(Ordering::SeqCst) {
            break;
        }
        shared.set_state(ConnectionState::Connecting);

        match tokio_tungstenite::connect_async(&url).await {
            Ok((stream, _response)) => {
                info!(url = %url, "gateway connected");
                attempts = 0;

                let (mut write, mut read) = stream.split();
                let (outbox_tx, mut outbox_rx) = mpsc::channel::<GatewayFrame>(64);
                *shared.outbox.lock().expect("outbox lock") = Some(outbox_tx);
                shared.set_state(ConnectionState::Connected);

                let writer = tokio::spawn(async move {
                    while let Some(frame) = outbox_rx.recv().await {
                        let json = match serde_json::to_string(&frame) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "failed to serialize gateway frame");
                                continue;
                            }
                        };
                        if write.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    let _ = write.close().await;
                });

                // Handshake: announce ourselves on every successful connect.
                {
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        let timestamp = SystemTime::now()
                            .duration_since(UNIX_EPOCH)
                            .map(|d| d.as_millis() as u64)
                            .unwrap_or(0);
                        if let Err(e) = shared
                            .request(
                                METHOD_CONNECT,
                                Some(json!({
                                    "client": "swarmlink",
                                    "version": env!("CARGO_PKG_VERSION"),
                                    "timestamp": timestamp,
                                })),
                            )
                            .await
                        {
                            warn!(error = %e, "gateway handshake failed");
                        }
                    });
                }

                let mut close_code: u16 = 1006;
                let mut close_reason = String::new();
                while let Some(next) = read.next().await {
                    match next {
                        Ok(Message::Text(text)) => {
                            match serde_json::from_str::<GatewayFrame>(text.as_str()) {
                                Ok(frame) => shared.handle_frame(frame),
                                Err(e) => {
                                    debug!(error = %e, "skipping malformed gateway frame")
                                }
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            if let Some(frame) = frame {
                                close_code = frame.code.into();
                                close_reason = frame.reason.to_string();
                            } else {
                                close_code = 1000;
                            }
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            close_reason = e.to_string();
                            break;
                        }
                    }
                }

                shared.outbox.lock().expect("outbox lock").take();
                writer.abort();
                shared.fail_pending(close_code, &close_reason);
                shared.set_state(ConnectionState::Disconnected);
                debug!(code = close_code, reason = %close_reason, "gateway connection closed");
            }
            Err(e) => {
                debug!(url = %url, error = %e, "gateway connect attempt failed");
            }
        }

        if shared.user_disconnected.load(Ordering::SeqCst) {
            break;
        }
        if attempts >= MAX_RECONNECT_ATTEMPTS {
            warn!(
                error = %SwarmlinkError::ReconnectExhausted { attempts },
                "giving up on gateway reconnection"
            );
            break;
        }
        let delay = reconnect_delay(attempts);
        attempts += 1;
        debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, "reconnect backoff");
        tokio::time::sleep(delay).await;
    }

    shared.set_state(ConnectionState::Disconnected);
}

/// `clamp(500ms * 2^attempts + jitter[0, 500ms), 500ms, 30s)`.
fn reconnect_delay(attempts: u32) -> Duration {
    let exp = RECONNECT_BASE_MS.saturating_mul(1u64 << attempts.min(16));
    let jitter = rand::rng().random_range(0..RECONNECT_JITTER_MS);
    Duration::from_millis(exp.saturating_add(jitter).clamp(RECONNECT_BASE_MS, RECONNECT_MAX_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_fails_when_disconnected() {
        let client = GatewayClient::new();
        let err = client.request("agent", None).await.unwrap_err();
        assert!(matches!(err, SwarmlinkError::NotConnected));
    }

    #[test]
    fn reconnect_delay_is_clamped() {
        for attempts in 0..20 {
            let delay = reconnect_delay(attempts);
            assert!(delay >= Duration::from_millis(RECONNECT_BASE_MS));
            assert!(delay <= Duration::from_millis(RECONNECT_MAX_MS));
        }
        // Early attempts back off exponentially (modulo jitter).
        assert!(reconnect_delay(3) >= Duration::from_millis(4000));
    }

    #[test]
    fn subscriptions_can_be_removed() {
        let client = GatewayClient::new();
        let seen = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&seen);
        let sub = client.on(
            "agent",
            Arc::new(move |_| {
                sink.fetch_add(1, Ordering::Relaxed);
            }),
        );

        client.shared.handle_frame(GatewayFrame::event("agent", json!({})));
        client.unsubscribe(sub);
        client.shared.handle_frame(GatewayFrame::event("agent", json!({})));

        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn event_handler_panic_is_isolated() {
        let client = GatewayClient::new();
        client.on("chat", Arc::new(|_| panic!("boom")));
        let seen = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&seen);
        client.on(
            "chat",
            Arc::new(move |_| {
                sink.fetch_add(1, Ordering::Relaxed);
            }),
        );

        client.shared.handle_frame(GatewayFrame::event("chat", json!({})));
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn response_resolves_pending_request() {
        let client = GatewayClient::new();
        let (tx, mut rx) = oneshot::channel();
        client
            .shared
            .pending
            .lock()
            .unwrap()
            .insert("ab".to_string(), tx);

        client
            .shared
            .handle_frame(GatewayFrame::ok("ab", json!({"x": 1})));

        let result = rx.try_recv().unwrap().unwrap();
        assert_eq!(result["x"], 1);
    }

    #[test]
    fn error_response_maps_to_rpc_error() {
        let client = GatewayClient::new();
        let (tx, mut rx) = oneshot::channel();
        client
            .shared
            .pending
            .lock()
            .unwrap()
            .insert("ab".to_string(), tx);

        client
            .shared
            .handle_frame(GatewayFrame::err("ab", -32601, "no such method"));

        let err = rx.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, SwarmlinkError::RpcError { code: -32601, .. }));
    }

    #[test]
    fn fail_pending_uses_connection_closed() {
        let client = GatewayClient::new();
        let (tx, mut rx) = oneshot::channel();
        client
            .shared
            .pending
            .lock()
            .unwrap()
            .insert("ab".to_string(), tx);

        client.shared.fail_pending(1001, "going away");

        let err = rx.try_recv().unwrap().unwrap_err();
        match err {
            SwarmlinkError::ConnectionClosed { code, reason } => {
                assert_eq!(code, 1001);
                assert_eq!(reason, "going away");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(client.shared.pending.lock().unwrap().is_empty());
    }
}
