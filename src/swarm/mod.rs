//! In-process multi-agent swarm orchestration.
//!
//! A swarm is a bounded set of role-specialized agents executed against a
//! single task: the planner derives one sub-task per role, the
//! orchestrator runs agents in parallel by priority group under per-agent
//! deadlines, agents coordinate over the [`MessageBus`], and the
//! aggregator folds their outputs into one result under a consensus
//! strategy.

mod agent;
mod aggregator;
mod bus;
mod orchestrator;
mod planner;
mod roles;
mod tools;

pub use agent::{
    AgentCounters, AgentResult, AgentRunner, AgentStatus, SubTask, SwarmAgent,
};
pub use aggregator::aggregate;
pub use bus::{MessageBus, MessageHandler, SubscriptionId, SwarmMessage, BROADCAST_TARGET};
pub use orchestrator::{SpawnOptions, SwarmInfo, SwarmOrchestrator, SwarmStatus};
pub use planner::decompose;
pub use roles::{suggest_roles, RoleProfile, SwarmRole};
pub use tools::{substitute_secrets, SecretResolver, Tool, ToolRegistry};

/// Bus topic announced when a swarm starts executing.
pub const TOPIC_SWARM_START: &str = "swarm:start";
/// Bus topic broadcast by an agent that finished successfully.
pub const TOPIC_AGENT_DONE: &str = "agent:done";
/// Bus topic broadcast by an agent that failed.
pub const TOPIC_AGENT_FAILED: &str = "agent:failed";
/// Bus topic broadcast per successful result between priority groups.
pub const TOPIC_RESULT_AVAILABLE: &str = "result:available";
