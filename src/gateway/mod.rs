//! Gateway transport — the framed duplex channel UI clients use to drive
//! agents and receive streaming output.
//!
//! One JSON object per frame: [`GatewayFrame::Request`] /
//! [`GatewayFrame::Response`] pairs correlated by id, plus
//! server-originated [`GatewayFrame::Event`]s. The server side rides an
//! axum WebSocket upgrade; the client side is a process-wide singleton
//! with exponential-backoff reconnect.

mod client;
mod frame;
mod server;

pub use client::{ConnectionState, EventHandler, GatewayClient, StateHandler, SubscriptionId};
pub use frame::{
    frame_id, AgentStreamChunk, FrameError, GatewayFrame, StreamKind, EVENT_AGENT, EVENT_CHAT,
    METHOD_AGENT, METHOD_AGENT_IDENTITY, METHOD_CONFIG_GET, METHOD_CONNECT,
    METHOD_SESSIONS_LIST, METHOD_SESSIONS_PATCH,
};
pub use server::{gateway_router, serve_socket, EventSink, GatewayMethods};
