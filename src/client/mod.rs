//! Client-side A2A engine.
//!
//! - [`A2aClient`] — typed HTTP client for a single remote agent.
//! - [`SseStream`] — pull-based stream of [`StreamEvent`]s parsed from SSE.
//! - [`CardCache`] — TTL-bounded agent-card cache with on-demand fetch.
//! - [`AgentRegistry`] — known remote agents + discovery across the cache.
//!
//! [`StreamEvent`]: crate::types::StreamEvent

mod a2a_client;
mod card_cache;
mod registry;
mod sse;

pub use a2a_client::{A2aClient, A2aClientOptions, ClientAuth};
pub use card_cache::{CardCache, FetchOptions};
pub use registry::{AgentRegistry, DiscoverOptions};
pub use sse::SseStream;
