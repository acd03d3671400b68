//! Gateway transport end-to-end: ws server + reconnecting client.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use swarmlink::config::AuthConfig;
use swarmlink::error::SwarmlinkError;
use swarmlink::gateway::{
    gateway_router, ConnectionState, GatewayClient, GatewayMethods, EVENT_AGENT, METHOD_AGENT,
    METHOD_CONNECT,
};

struct TestServer {
    addr: SocketAddr,
    connects: Arc<AtomicU64>,
}

async fn serve() -> TestServer {
    let connects = Arc::new(AtomicU64::new(0));

    let mut methods = GatewayMethods::new();
    {
        let connects = Arc::clone(&connects);
        methods.register(METHOD_CONNECT, move |params, _sink| {
            let connects = Arc::clone(&connects);
            async move {
                connects.fetch_add(1, Ordering::SeqCst);
                let client = params
                    .as_ref()
                    .and_then(|p| p.get("client"))
                    .cloned()
                    .unwrap_or(json!(null));
                Ok(json!({"hello": client}))
            }
        });
    }
    methods.register(METHOD_AGENT, |params, sink| async move {
        // Stream two chunks, then answer.
        let run_id = "run-1";
        for (seq, chunk) in ["Hel", "lo"].iter().enumerate() {
            sink.send_event(
                EVENT_AGENT,
                json!({
                    "runId": run_id,
                    "seq": seq as u64,
                    "stream": "text",
                    "data": chunk,
                }),
            )
            .await;
        }
        Ok(json!({"runId": run_id, "echo": params}))
    });
    methods.register("slow", |_params, _sink| async move {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(json!(null))
    });

    let router = gateway_router(Arc::new(methods), AuthConfig::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer { addr, connects }
}

async fn connect_client(addr: SocketAddr) -> GatewayClient {
    let client = GatewayClient::new();
    client.connect(format!("ws://{addr}/gateway"));
    let mut watch = client.state_watch();
    tokio::time::timeout(
        Duration::from_secs(5),
        watch.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("timed out waiting for connection")
    .unwrap();
    client
}

#[tokio::test]
async fn connect_issues_handshake_request() {
    let server = serve().await;
    let _client = connect_client(server.addr).await;

    // The handshake is asynchronous; give it a moment to land.
    for _ in 0..50 {
        if server.connects.load(Ordering::SeqCst) == 1 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("connect handshake never reached the server");
}

#[tokio::test]
async fn request_round_trips_payload() {
    let server = serve().await;
    let client = connect_client(server.addr).await;

    let payload = client
        .request(METHOD_AGENT, Some(json!({"message": "hi"})))
        .await
        .unwrap();
    assert_eq!(payload["runId"], "run-1");
    assert_eq!(payload["echo"]["message"], "hi");
}

#[tokio::test]
async fn unknown_method_fails_with_method_not_found() {
    let server = serve().await;
    let client = connect_client(server.addr).await;

    let err = client.request("no_such_method", None).await.unwrap_err();
    assert!(matches!(err, SwarmlinkError::RpcError { code: -32601, .. }));
}

#[tokio::test]
async fn events_reach_subscribers_in_order() {
    let server = serve().await;
    let client = connect_client(server.addr).await;

    let chunks = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    {
        let chunks = Arc::clone(&chunks);
        client.on(
            EVENT_AGENT,
            Arc::new(move |payload| {
                chunks
                    .lock()
                    .unwrap()
                    .push(payload["data"].as_str().unwrap_or("").to_string());
            }),
        );
    }

    client
        .request(METHOD_AGENT, Some(json!({"message": "hi"})))
        .await
        .unwrap();

    // Events are pushed before the response on the same ordered socket,
    // but delivery to handlers races the test; poll briefly.
    for _ in 0..50 {
        if chunks.lock().unwrap().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(*chunks.lock().unwrap(), vec!["Hel".to_string(), "lo".to_string()]);
}

#[tokio::test]
async fn request_while_disconnected_fails_fast() {
    let client = GatewayClient::new();
    let err = client.request(METHOD_AGENT, None).await.unwrap_err();
    assert!(matches!(err, SwarmlinkError::NotConnected));
}

#[tokio::test]
async fn disconnect_fails_pending_and_stops_reconnecting() {
    let server = serve().await;
    let client = Arc::new(connect_client(server.addr).await);

    let pending = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.request("slow", None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    client.disconnect();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, SwarmlinkError::ConnectionClosed { .. }));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // No reconnect is scheduled after an explicit disconnect.
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let err = client.request(METHOD_AGENT, None).await.unwrap_err();
    assert!(matches!(err, SwarmlinkError::NotConnected));
}

#[tokio::test]
async fn state_change_handlers_observe_transitions() {
    let server = serve().await;
    let client = GatewayClient::new();

    let states = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let states = Arc::clone(&states);
        client.on_state_change(Arc::new(move |state| {
            states.lock().unwrap().push(state);
        }));
    }

    client.connect(format!("ws://{}/gateway", server.addr));
    let mut watch = client.state_watch();
    tokio::time::timeout(
        Duration::from_secs(5),
        watch.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    let seen = states.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
}
