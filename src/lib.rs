//! # swarmlink — agent orchestration SDK
//!
//! swarmlink lets a primary AI agent expose itself to remote agents,
//! delegate work to them, and run local in-process multi-agent swarms
//! that cooperate on a single task. Three subsystems:
//!
//! - **A2A protocol engine** — a JSON-RPC 2.0 server and client for the
//!   Agent-to-Agent v0.2 wire protocol: task state machine, SSE
//!   streaming, agent-card discovery cache, and a known-agent registry.
//! - **Swarm orchestrator** — role-based task decomposition, parallel
//!   priority-group scheduling, an inter-agent message bus, per-agent
//!   timeouts, and pluggable consensus aggregation.
//! - **Gateway transport** — a reconnecting framed duplex channel
//!   (request/response + server-pushed events) for UI clients.
//!
//! ## Feature flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `client`  | yes     | HTTP client for calling A2A agents (reqwest + SSE) |
//! | `server`  | yes     | Task manager, dispatcher, and axum routes |
//! | `gateway` | yes     | Framed ws transport (implies `server`) |
//!
//! ## Quick start: serving A2A
//!
//! Implement [`server::TaskExecutor`] to define what a task does, then
//! mount the routes:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use swarmlink::config::A2aConfig;
//! use swarmlink::error::SwarmlinkResult;
//! use swarmlink::server::{a2a_router, A2aServerState, ExecutorOutput, TaskExecutor, TaskManager, TaskManagerOptions};
//! use swarmlink::types::{Message, Task};
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//!
//! struct EchoExecutor;
//!
//! #[async_trait]
//! impl TaskExecutor for EchoExecutor {
//!     async fn execute(
//!         &self,
//!         _task: Task,
//!         message: Message,
//!         _cancel: CancellationToken,
//!     ) -> SwarmlinkResult<ExecutorOutput> {
//!         Ok(ExecutorOutput::text(format!("Echo: {}", message.text())))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = Arc::new(A2aServerState {
//!         config: A2aConfig::default(),
//!         manager: Arc::new(TaskManager::new(TaskManagerOptions::default())),
//!         executor: Arc::new(EchoExecutor),
//!     });
//!     let app = a2a_router(state);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:7420").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Quick start: running a swarm
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use swarmlink::config::SwarmConfig;
//! use swarmlink::swarm::{AgentRunner, SpawnOptions, SwarmAgent, SwarmOrchestrator};
//!
//! struct PromptRunner;
//!
//! #[async_trait::async_trait]
//! impl AgentRunner for PromptRunner {
//!     async fn run(&self, agent: &SwarmAgent) -> swarmlink::error::SwarmlinkResult<String> {
//!         let task = agent.current_task().expect("assigned");
//!         Ok(format!("{}: {}", agent.role(), task.description))
//!     }
//! }
//!
//! # async fn run() {
//! let orchestrator = SwarmOrchestrator::new(SwarmConfig::default());
//! let info = orchestrator
//!     .spawn(SpawnOptions::new("build a CLI tool"), Arc::new(PromptRunner))
//!     .await
//!     .unwrap();
//! println!("{}", info.aggregated_output.unwrap());
//! # }
//! ```

pub mod config;
pub mod error;
pub mod state;
pub mod types;

pub mod swarm;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "gateway")]
pub mod gateway;

/// Prelude re-exporting the most frequently used types.
pub mod prelude {
    pub use crate::config::{A2aConfig, AuthConfig, AuthMode, ConsensusStrategy, SwarmConfig};
    pub use crate::error::{SwarmlinkError, SwarmlinkResult};
    pub use crate::types::{
        AgentCard, AgentSkill, Artifact, KnownAgent, Message, Part, Role, SendMessageParams,
        StreamEvent, Task, TaskState, TaskStatus,
    };

    pub use crate::swarm::{
        AgentResult, AgentRunner, SpawnOptions, SwarmAgent, SwarmOrchestrator, SwarmRole,
    };

    #[cfg(feature = "client")]
    pub use crate::client::{A2aClient, A2aClientOptions, AgentRegistry, CardCache};

    #[cfg(feature = "server")]
    pub use crate::server::{
        a2a_router, A2aServerState, ExecutorOutput, TaskExecutor, TaskManager, TaskManagerOptions,
    };

    #[cfg(feature = "gateway")]
    pub use crate::gateway::{GatewayClient, GatewayFrame, GatewayMethods};
}

pub use error::{SwarmlinkError, SwarmlinkResult};
