//! Swarm agent — a single role-bound worker.
//!
//! An agent owns its inbox (fed by a bus subscription attached at
//! construction), its status bookkeeping, and a pluggable execute
//! function supplied by the orchestrator's caller.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{SwarmlinkError, SwarmlinkResult};

use super::bus::{MessageBus, SubscriptionId, SwarmMessage};
use super::roles::SwarmRole;
use super::{TOPIC_AGENT_DONE, TOPIC_AGENT_FAILED};

/// Characters of output included in the `agent:done` broadcast preview.
const DONE_PREVIEW_CHARS: usize = 500;

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Constructed or assigned, not yet running.
    Idle,
    /// Currently executing.
    Working,
    /// Finished successfully.
    Done,
    /// Finished with an error (or timed out).
    Failed,
    /// Destroyed or canceled before finishing.
    Cancelled,
}

/// A unit of work assigned to one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTask {
    /// What the agent should do.
    pub description: String,

    /// Shared context carried from the swarm request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Ids of agents whose results this task builds on.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Scheduling priority; defaults to the role's priority.
    pub priority: u8,
}

/// Message counters for one agent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AgentCounters {
    /// Messages delivered to the inbox.
    pub received: u64,
    /// Messages sent or broadcast by the agent.
    pub sent: u64,
}

/// Immutable snapshot produced when an agent terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    /// Swarm-scoped agent id.
    pub agent_id: String,
    /// The agent's role.
    pub role: SwarmRole,
    /// The assigned sub-task, if any.
    pub task: Option<SubTask>,
    /// Final status.
    pub status: AgentStatus,
    /// Output text (or `"Error: …"` / `"Agent timeout"` on failure).
    pub output: String,
    /// Artifacts recorded during execution.
    pub artifacts: Vec<String>,
    /// Wall-clock start of execution.
    pub started_at: Option<DateTime<Utc>>,
    /// Wall-clock end of execution.
    pub completed_at: Option<DateTime<Utc>>,
    /// Message counters at termination.
    pub counters: AgentCounters,
}

/// The pluggable execute function for an agent.
///
/// The runner receives the agent so it can read its task, consult its
/// inbox, and send or broadcast messages while working. Its return value
/// becomes the agent's output.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run the agent's assigned sub-task to completion.
    async fn run(&self, agent: &SwarmAgent) -> SwarmlinkResult<String>;
}

struct AgentState {
    current_task: Option<SubTask>,
    status: AgentStatus,
    output: String,
    artifacts: Vec<String>,
    inbox: Vec<SwarmMessage>,
    counters: AgentCounters,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

/// A role-bound worker inside one swarm.
pub struct SwarmAgent {
    id: String,
    swarm_id: String,
    role: SwarmRole,
    bus: Arc<MessageBus>,
    subscription: SubscriptionId,
    cancel: CancellationToken,
    state: Arc<Mutex<AgentState>>,
}

impl SwarmAgent {
    /// Create an agent and attach its bus subscription.
    pub fn new(swarm_id: &str, role: SwarmRole, bus: Arc<MessageBus>) -> Self {
        let id = format!("{swarm_id}-{role}");
        let state = Arc::new(Mutex::new(AgentState {
            current_task: None,
            status: AgentStatus::Idle,
            output: String::new(),
            artifacts: Vec::new(),
            inbox: Vec::new(),
            counters: AgentCounters::default(),
            started_at: None,
            completed_at: None,
        }));

        let inbox_state = Arc::clone(&state);
        let subscription = bus.subscribe(
            &id,
            Arc::new(move |message| {
                let mut state = inbox_state.lock().expect("agent state lock");
                state.inbox.push(message.clone());
                state.counters.received += 1;
            }),
        );

        Self {
            id,
            swarm_id: swarm_id.to_string(),
            role,
            bus,
            subscription,
            cancel: CancellationToken::new(),
            state,
        }
    }

    /// Swarm-scoped agent id (`<swarm>-<role>`).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The agent's role.
    pub fn role(&self) -> SwarmRole {
        self.role
    }

    /// The swarm this agent belongs to.
    pub fn swarm_id(&self) -> &str {
        &self.swarm_id
    }

    /// Current status.
    pub fn status(&self) -> AgentStatus {
        self.state.lock().expect("agent state lock").status
    }

    /// The currently assigned sub-task.
    pub fn current_task(&self) -> Option<SubTask> {
        self.state
            .lock()
            .expect("agent state lock")
            .current_task
            .clone()
    }

    /// Assign a sub-task and reset the agent to idle.
    pub fn assign_task(&self, task: SubTask) {
        let mut state = self.state.lock().expect("agent state lock");
        state.current_task = Some(task);
        state.status = AgentStatus::Idle;
    }

    /// Record an artifact produced while working.
    pub fn add_artifact(&self, artifact: impl Into<String>) {
        self.state
            .lock()
            .expect("agent state lock")
            .artifacts
            .push(artifact.into());
    }

    /// Execute the assigned sub-task with `runner`.
    ///
    /// Fails with [`SwarmlinkError::NoAssignedTask`] when no task is
    /// assigned. Observes the agent's cancellation signal: a destroyed
    /// agent returns promptly with a `cancelled` result.
    pub async fn execute(&self, runner: &dyn AgentRunner) -> SwarmlinkResult<AgentResult> {
        {
            let mut state = self.state.lock().expect("agent state lock");
            if state.current_task.is_none() {
                return Err(SwarmlinkError::NoAssignedTask {
                    agent_id: self.id.clone(),
                });
            }
            state.status = AgentStatus::Working;
            state.started_at = Some(Utc::now());
        }

        debug!(agent_id = %self.id, role = %self.role, "agent executing");

        let outcome = tokio::select! {
            outcome = runner.run(self) => Some(outcome),
            _ = self.cancel.cancelled() => None,
        };

        match outcome {
            Some(Ok(output)) => {
                {
                    let mut state = self.state.lock().expect("agent state lock");
                    state.output = output.clone();
                    state.status = AgentStatus::Done;
                    state.completed_at = Some(Utc::now());
                }
                let preview: String = output.chars().take(DONE_PREVIEW_CHARS).collect();
                self.broadcast_message(
                    TOPIC_AGENT_DONE,
                    json!({
                        "agentId": self.id,
                        "role": self.role,
                        "outputPreview": preview,
                    }),
                );
            }
            Some(Err(err)) => {
                {
                    let mut state = self.state.lock().expect("agent state lock");
                    state.output = format!("Error: {err}");
                    state.status = AgentStatus::Failed;
                    state.completed_at = Some(Utc::now());
                }
                self.broadcast_message(
                    TOPIC_AGENT_FAILED,
                    json!({
                        "agentId": self.id,
                        "role": self.role,
                        "error": err.to_string(),
                    }),
                );
            }
            None => {
                let mut state = self.state.lock().expect("agent state lock");
                state.status = AgentStatus::Cancelled;
                state.completed_at = Some(Utc::now());
            }
        }

        Ok(self.result())
    }

    /// Record a deadline expiry: status `failed`, output `"Agent timeout"`.
    pub(crate) fn mark_timed_out(&self) -> AgentResult {
        {
            let mut state = self.state.lock().expect("agent state lock");
            state.status = AgentStatus::Failed;
            state.output = "Agent timeout".to_string();
            state.completed_at = Some(Utc::now());
        }
        self.result()
    }

    /// Send a direct message to another agent in the swarm.
    pub fn send_message(&self, to: &str, topic: &str, payload: Value) -> SwarmMessage {
        let message = self
            .bus
            .send(&self.swarm_id, &self.id, to, topic, payload, None);
        self.state.lock().expect("agent state lock").counters.sent += 1;
        message
    }

    /// Broadcast to the rest of the swarm.
    pub fn broadcast_message(&self, topic: &str, payload: Value) -> SwarmMessage {
        let message = self.bus.broadcast(&self.swarm_id, &self.id, topic, payload);
        self.state.lock().expect("agent state lock").counters.sent += 1;
        message
    }

    /// The last `limit` inbox entries, oldest first. Read-only.
    pub fn read_inbox(&self, limit: usize) -> Vec<SwarmMessage> {
        let state = self.state.lock().expect("agent state lock");
        let skip = state.inbox.len().saturating_sub(limit);
        state.inbox.iter().skip(skip).cloned().collect()
    }

    /// Immutable snapshot of the agent.
    pub fn result(&self) -> AgentResult {
        let state = self.state.lock().expect("agent state lock");
        AgentResult {
            agent_id: self.id.clone(),
            role: self.role,
            task: state.current_task.clone(),
            status: state.status,
            output: state.output.clone(),
            artifacts: state.artifacts.clone(),
            started_at: state.started_at,
            completed_at: state.completed_at,
            counters: state.counters,
        }
    }

    /// Detach the bus subscription, cancel any in-flight execution, and
    /// force status to `cancelled`.
    pub fn destroy(&self) {
        self.bus.unsubscribe(self.subscription);
        self.cancel.cancel();
        let mut state = self.state.lock().expect("agent state lock");
        state.status = AgentStatus::Cancelled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct StaticRunner(&'static str);

    #[async_trait]
    impl AgentRunner for StaticRunner {
        async fn run(&self, _agent: &SwarmAgent) -> SwarmlinkResult<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl AgentRunner for FailingRunner {
        async fn run(&self, _agent: &SwarmAgent) -> SwarmlinkResult<String> {
            Err(SwarmlinkError::internal_error("no model"))
        }
    }

    struct HangingRunner;

    #[async_trait]
    impl AgentRunner for HangingRunner {
        async fn run(&self, _agent: &SwarmAgent) -> SwarmlinkResult<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    fn sub_task(description: &str) -> SubTask {
        SubTask {
            description: description.to_string(),
            context: None,
            depends_on: Vec::new(),
            priority: 1,
        }
    }

    #[tokio::test]
    async fn execute_without_task_fails() {
        let bus = Arc::new(MessageBus::new());
        let agent = SwarmAgent::new("s1", SwarmRole::Coder, bus);
        let err = agent.execute(&StaticRunner("x")).await.unwrap_err();
        assert!(matches!(err, SwarmlinkError::NoAssignedTask { .. }));
    }

    #[tokio::test]
    async fn successful_execute_broadcasts_done_with_preview() {
        let bus = Arc::new(MessageBus::new());
        let agent = SwarmAgent::new("s1", SwarmRole::Coder, Arc::clone(&bus));
        let observer = SwarmAgent::new("s1", SwarmRole::Reviewer, Arc::clone(&bus));

        agent.assign_task(sub_task("build"));
        let long_output = "x".repeat(600);

        struct LongRunner(String);
        #[async_trait]
        impl AgentRunner for LongRunner {
            async fn run(&self, _agent: &SwarmAgent) -> SwarmlinkResult<String> {
                Ok(self.0.clone())
            }
        }

        let result = agent
            .execute(&LongRunner(long_output.clone()))
            .await
            .unwrap();

        assert_eq!(result.status, AgentStatus::Done);
        assert_eq!(result.output, long_output);
        assert!(result.started_at.is_some() && result.completed_at.is_some());

        let inbox = observer.read_inbox(10);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].topic, TOPIC_AGENT_DONE);
        assert_eq!(
            inbox[0].payload["outputPreview"].as_str().unwrap().len(),
            DONE_PREVIEW_CHARS
        );
    }

    #[tokio::test]
    async fn failed_execute_prefixes_error_and_broadcasts() {
        let bus = Arc::new(MessageBus::new());
        let agent = SwarmAgent::new("s1", SwarmRole::Tester, Arc::clone(&bus));
        let observer = SwarmAgent::new("s1", SwarmRole::Coder, Arc::clone(&bus));

        agent.assign_task(sub_task("test"));
        let result = agent.execute(&FailingRunner).await.unwrap();

        assert_eq!(result.status, AgentStatus::Failed);
        assert!(result.output.starts_with("Error: "));

        let inbox = observer.read_inbox(10);
        assert_eq!(inbox[0].topic, TOPIC_AGENT_FAILED);
    }

    #[tokio::test]
    async fn destroy_cancels_in_flight_execution() {
        let bus = Arc::new(MessageBus::new());
        let agent = Arc::new(SwarmAgent::new("s1", SwarmRole::Coder, bus));
        agent.assign_task(sub_task("hang"));

        let run = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move { agent.execute(&HangingRunner).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        agent.destroy();

        let result = run.await.unwrap().unwrap();
        assert_eq!(result.status, AgentStatus::Cancelled);
    }

    #[tokio::test]
    async fn destroyed_agent_receives_no_more_messages() {
        let bus = Arc::new(MessageBus::new());
        let agent = SwarmAgent::new("s1", SwarmRole::Coder, Arc::clone(&bus));

        bus.send("s1", "peer", agent.id(), "t", serde_json::json!(1), None);
        agent.destroy();
        bus.send("s1", "peer", agent.id(), "t", serde_json::json!(2), None);

        assert_eq!(agent.read_inbox(10).len(), 1);
        assert_eq!(agent.status(), AgentStatus::Cancelled);
    }

    #[tokio::test]
    async fn counters_track_sent_and_received() {
        let bus = Arc::new(MessageBus::new());
        let a = SwarmAgent::new("s1", SwarmRole::Coder, Arc::clone(&bus));
        let b = SwarmAgent::new("s1", SwarmRole::Reviewer, Arc::clone(&bus));

        a.send_message(b.id(), "t", serde_json::json!(1));
        a.broadcast_message("t", serde_json::json!(2));

        let a_result = a.result();
        let b_result = b.result();
        assert_eq!(a_result.counters.sent, 2);
        assert_eq!(b_result.counters.received, 2);
    }

    #[tokio::test]
    async fn read_inbox_returns_last_n() {
        let bus = Arc::new(MessageBus::new());
        let agent = SwarmAgent::new("s1", SwarmRole::Coder, Arc::clone(&bus));

        for i in 0..15 {
            bus.send("s1", "peer", agent.id(), "t", serde_json::json!(i), None);
        }

        let inbox = agent.read_inbox(10);
        assert_eq!(inbox.len(), 10);
        assert_eq!(inbox[0].payload, serde_json::json!(5));
        assert_eq!(inbox[9].payload, serde_json::json!(14));
    }
}
