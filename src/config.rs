//! Configuration options for the A2A engine, swarm orchestrator, and
//! gateway-facing auth.
//!
//! These structs enumerate every tunable with its default; loading them
//! from files or the environment is the embedding application's job.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::KnownAgent;

/// Top-level A2A configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct A2aConfig {
    /// Master switch for the A2A subsystem.
    pub enabled: bool,

    /// Public base URL this agent advertises in its card.
    pub base_url: Option<String>,

    /// Server-side options.
    pub server: A2aServerConfig,

    /// Client-side options.
    pub client: A2aClientConfig,

    /// Authentication options shared by the A2A and gateway routes.
    pub auth: AuthConfig,
}

/// A2A server options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct A2aServerConfig {
    /// Whether the server routes are mounted.
    pub enabled: bool,

    /// Agent names exposed through the card's skill list.
    pub expose_agents: Vec<String>,

    /// Maximum number of tasks held in memory at once.
    pub max_tasks: usize,

    /// Minutes a terminal task is retained before the sweep prunes it.
    pub task_expiry_minutes: u64,

    /// Whether the streaming route is advertised and served.
    pub streaming: bool,

    /// Whether push notifications are advertised. Not implemented; always
    /// advertised as configured.
    pub push_notifications: bool,
}

impl Default for A2aServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            expose_agents: Vec::new(),
            max_tasks: 100,
            task_expiry_minutes: 60,
            streaming: true,
            push_notifications: false,
        }
    }
}

impl A2aServerConfig {
    /// Task expiry as a [`Duration`].
    pub fn task_expiry(&self) -> Duration {
        Duration::from_secs(self.task_expiry_minutes * 60)
    }
}

/// A2A client options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct A2aClientConfig {
    /// Whether outbound A2A calls are allowed.
    pub enabled: bool,

    /// Request timeout in seconds.
    pub timeout_seconds: u64,

    /// Agent-card cache TTL in minutes.
    pub cache_ttl_minutes: u64,

    /// Remote agents known at startup.
    pub agents: Vec<KnownAgent>,
}

impl Default for A2aClientConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_seconds: 120,
            cache_ttl_minutes: 5,
            agents: Vec::new(),
        }
    }
}

impl A2aClientConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Card cache TTL as a [`Duration`].
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes * 60)
    }
}

/// Authentication mode for inbound requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Accept every request.
    #[default]
    None,
    /// Require `Authorization: Bearer <token>` matching the configured token.
    Token,
    /// Same bearer check, but the token is the gateway's shared secret.
    Gateway,
}

/// Authentication options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    /// The active mode.
    pub mode: AuthMode,

    /// The expected bearer token. Required for any mode other than
    /// [`AuthMode::None`]; a non-`none` mode with no token rejects all
    /// requests.
    pub token: Option<String>,
}

/// The rule used to combine multiple agent outputs into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusStrategy {
    /// One Markdown section per result, grouped in role order.
    #[default]
    Merge,
    /// Excerpt every output, then a consensus paragraph.
    Vote,
    /// Numbered stages in role order; final output repeats the last stage.
    Chain,
    /// Score every output and emit only the winner.
    Best,
}

/// Swarm orchestrator options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwarmConfig {
    /// Master switch for the swarm subsystem.
    pub enabled: bool,

    /// Maximum agents a single swarm may hold.
    pub max_agents_per_swarm: usize,

    /// Maximum number of concurrently non-terminal swarms.
    pub max_concurrent_swarms: usize,

    /// Per-agent execution deadline in milliseconds.
    pub agent_timeout_ms: u64,

    /// Strategy used when the caller does not pick one.
    pub default_consensus: ConsensusStrategy,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_agents_per_swarm: 10,
            max_concurrent_swarms: 5,
            agent_timeout_ms: 300_000,
            default_consensus: ConsensusStrategy::Merge,
        }
    }
}

impl SwarmConfig {
    /// Per-agent deadline as a [`Duration`].
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }
}
