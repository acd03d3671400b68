//! JSON-RPC 2.0 dispatcher.
//!
//! Validates request envelopes, routes `method -> handler`, and turns
//! handler errors into typed JSON-RPC error responses. Handlers are
//! registered per method as boxed async closures over a shared context.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{SwarmlinkError, SwarmlinkResult};
use crate::types::{JsonRpcId, JsonRpcResponse};

/// A registered method handler: `(params, ctx) -> result value`.
pub type Handler<C> =
    Arc<dyn Fn(Value, Arc<C>) -> BoxFuture<'static, SwarmlinkResult<Value>> + Send + Sync>;

/// Method registry + envelope validation for one JSON-RPC surface.
pub struct Dispatcher<C> {
    ctx: Arc<C>,
    handlers: HashMap<String, Handler<C>>,
}

impl<C: Send + Sync + 'static> Dispatcher<C> {
    /// Create a dispatcher over a shared context.
    pub fn new(ctx: Arc<C>) -> Self {
        Self {
            ctx,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for `method`. Re-registering replaces the
    /// previous handler.
    pub fn register<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Value, Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SwarmlinkResult<Value>> + Send + 'static,
    {
        let handler: Handler<C> = Arc::new(move |params, ctx| Box::pin(handler(params, ctx)));
        self.handlers.insert(method.into(), handler);
    }

    /// Whether a handler is registered for `method`.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Validate and dispatch a raw request envelope.
    ///
    /// A valid envelope has `jsonrpc == "2.0"`, an `id` that is a string
    /// or number, and a string `method`. `params` defaults to `{}`.
    pub async fn dispatch(&self, raw: Value) -> JsonRpcResponse {
        // Best-effort id extraction so even shape errors correlate.
        let id = extract_id(&raw);

        let envelope = match validate_envelope(&raw) {
            Ok(env) => env,
            Err(err) => return JsonRpcResponse::from_error(id, err),
        };

        debug!(method = %envelope.method, "dispatching JSON-RPC request");

        let Some(handler) = self.handlers.get(envelope.method) else {
            warn!(method = %envelope.method, "unknown JSON-RPC method");
            return JsonRpcResponse::from_error(
                id,
                SwarmlinkError::method_not_found(envelope.method),
            );
        };

        match handler(envelope.params, Arc::clone(&self.ctx)).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::from_error(id, err),
        }
    }
}

struct Envelope<'a> {
    method: &'a str,
    params: Value,
}

fn extract_id(raw: &Value) -> Option<JsonRpcId> {
    match raw.get("id") {
        Some(Value::String(s)) => Some(JsonRpcId::String(s.clone())),
        Some(Value::Number(n)) => n.as_i64().map(JsonRpcId::Number),
        _ => None,
    }
}

fn validate_envelope(raw: &Value) -> SwarmlinkResult<Envelope<'_>> {
    let obj = raw
        .as_object()
        .ok_or_else(|| SwarmlinkError::invalid_request("request must be an object"))?;

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some("2.0") => {}
        _ => {
            return Err(SwarmlinkError::invalid_request(
                "jsonrpc version must be \"2.0\"",
            ))
        }
    }

    match obj.get("id") {
        Some(Value::String(_)) | Some(Value::Number(_)) => {}
        _ => {
            return Err(SwarmlinkError::invalid_request(
                "id must be a string or number",
            ))
        }
    }

    let method = obj
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| SwarmlinkError::invalid_request("method must be a string"))?;

    let params = obj
        .get("params")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    Ok(Envelope { method, params })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Ctx;

    fn dispatcher() -> Dispatcher<Ctx> {
        let mut d = Dispatcher::new(Arc::new(Ctx));
        d.register("echo", |params, _ctx| async move { Ok(params) });
        d.register("boom", |_params, _ctx| async move {
            Err(SwarmlinkError::task_not_found("t1"))
        });
        d
    }

    #[tokio::test]
    async fn dispatches_registered_method() {
        let d = dispatcher();
        let response = d
            .dispatch(json!({"jsonrpc": "2.0", "id": 1, "method": "echo", "params": {"x": 1}}))
            .await;
        assert_eq!(response.id, Some(JsonRpcId::Number(1)));
        assert_eq!(response.result.unwrap()["x"], 1);
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn missing_params_defaults_to_empty_object() {
        let d = dispatcher();
        let response = d
            .dispatch(json!({"jsonrpc": "2.0", "id": "a", "method": "echo"}))
            .await;
        assert_eq!(response.result.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn invalid_envelope_shapes() {
        let d = dispatcher();

        for raw in [
            json!({"id": 1, "method": "echo"}),
            json!({"jsonrpc": "1.0", "id": 1, "method": "echo"}),
            json!({"jsonrpc": "2.0", "method": "echo"}),
            json!({"jsonrpc": "2.0", "id": null, "method": "echo"}),
            json!({"jsonrpc": "2.0", "id": 1}),
            json!([1, 2, 3]),
        ] {
            let response = d.dispatch(raw).await;
            assert_eq!(response.error.unwrap().code, -32600);
        }
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let d = dispatcher();
        let response = d
            .dispatch(json!({"jsonrpc": "2.0", "id": 1, "method": "nope"}))
            .await;
        let error = response.error.unwrap();
        assert_eq!(error.code, -32601);
        assert!(error.message.contains("nope"));
    }

    #[tokio::test]
    async fn handler_error_maps_to_its_code() {
        let d = dispatcher();
        let response = d
            .dispatch(json!({"jsonrpc": "2.0", "id": 1, "method": "boom"}))
            .await;
        assert_eq!(response.error.unwrap().code, -32001);
    }
}
