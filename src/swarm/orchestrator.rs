//! Swarm orchestrator — creates swarms, schedules agents by priority
//! group, and aggregates their results.
//!
//! Execution walks `initializing -> planning -> executing -> aggregating
//! -> completed` (or `failed` on an orchestration-level error,
//! `cancelled` via [`SwarmOrchestrator::dissolve`]). Within a priority
//! group agents run in parallel, each under the configured deadline;
//! between groups the orchestrator broadcasts one `result:available` per
//! successful result so later groups can consume earlier output from
//! their inboxes.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{ConsensusStrategy, SwarmConfig};
use crate::error::{SwarmlinkError, SwarmlinkResult};

use super::agent::{AgentResult, AgentRunner, AgentStatus, SwarmAgent};
use super::aggregator::aggregate;
use super::bus::{MessageBus, SwarmMessage};
use super::planner::decompose;
use super::roles::{suggest_roles, SwarmRole};
use super::{TOPIC_RESULT_AVAILABLE, TOPIC_SWARM_START};

/// Sender id the orchestrator uses on the bus.
const ORCHESTRATOR_ID: &str = "orchestrator";

/// Characters of output included in `result:available` previews.
const RESULT_PREVIEW_CHARS: usize = 300;

/// Default limit for [`SwarmOrchestrator::get_messages`].
pub(crate) const DEFAULT_MESSAGE_LIMIT: usize = 50;

/// Lifecycle status of a swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmStatus {
    /// Created, agents not yet assigned.
    Initializing,
    /// Planner assigning sub-tasks.
    Planning,
    /// Priority groups running.
    Executing,
    /// Combining results.
    Aggregating,
    /// Finished with an aggregated output. Terminal.
    Completed,
    /// Orchestration-level failure. Terminal.
    Failed,
    /// Dissolved. Terminal.
    Cancelled,
}

impl SwarmStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SwarmStatus::Completed | SwarmStatus::Failed | SwarmStatus::Cancelled
        )
    }
}

/// Options for [`SwarmOrchestrator::spawn`].
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// The task the swarm works on.
    pub task: String,
    /// Role ids to use; unknown ids are dropped. When absent (or all
    /// unknown) roles are suggested from the task text.
    pub roles: Option<Vec<String>>,
    /// Consensus strategy; defaults to the configured default.
    pub consensus: Option<ConsensusStrategy>,
    /// Shared context handed to every agent.
    pub context: Option<String>,
    /// Whether the planner produces role-flavored sub-tasks.
    pub auto_decompose: bool,
}

impl SpawnOptions {
    /// Options with defaults for the given task.
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            roles: None,
            consensus: None,
            context: None,
            auto_decompose: true,
        }
    }
}

/// Snapshot of a swarm.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmInfo {
    /// Swarm id (`swarm-<n>-<ms>`).
    pub id: String,
    /// The original task.
    pub task: String,
    /// Current status.
    pub status: SwarmStatus,
    /// Consensus strategy in effect.
    pub consensus: ConsensusStrategy,
    /// Roles of the swarm's agents.
    pub roles: Vec<SwarmRole>,
    /// Results collected so far (completion order).
    pub results: Vec<AgentResult>,
    /// Aggregated output; set from `aggregating` onward.
    pub aggregated_output: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time, once terminal.
    pub completed_at: Option<DateTime<Utc>>,
    /// Shared context, if any.
    pub context: Option<String>,
}

struct SwarmMut {
    status: SwarmStatus,
    results: Vec<AgentResult>,
    aggregated_output: Option<String>,
    completed_at: Option<DateTime<Utc>>,
}

struct SwarmState {
    id: String,
    task: String,
    consensus: ConsensusStrategy,
    context: Option<String>,
    created_at: DateTime<Utc>,
    agents: Vec<Arc<SwarmAgent>>,
    inner: Mutex<SwarmMut>,
}

impl SwarmState {
    fn status(&self) -> SwarmStatus {
        self.inner.lock().expect("swarm lock").status
    }

    /// Move to `status` unless already terminal; terminal states never
    /// regress.
    fn set_status(&self, status: SwarmStatus) {
        let mut inner = self.inner.lock().expect("swarm lock");
        if inner.status.is_terminal() {
            return;
        }
        inner.status = status;
        if status.is_terminal() {
            inner.completed_at = Some(Utc::now());
        }
    }

    fn push_result(&self, result: AgentResult) {
        self.inner.lock().expect("swarm lock").results.push(result);
    }

    fn snapshot(&self) -> SwarmInfo {
        let inner = self.inner.lock().expect("swarm lock");
        SwarmInfo {
            id: self.id.clone(),
            task: self.task.clone(),
            status: inner.status,
            consensus: self.consensus,
            roles: self.agents.iter().map(|a| a.role()).collect(),
            results: inner.results.clone(),
            aggregated_output: inner.aggregated_output.clone(),
            created_at: self.created_at,
            completed_at: inner.completed_at,
            context: self.context.clone(),
        }
    }
}

/// Creates and drives swarms over a shared message bus.
pub struct SwarmOrchestrator {
    config: SwarmConfig,
    bus: Arc<MessageBus>,
    counter: AtomicU64,
    swarms: Mutex<HashMap<String, Arc<SwarmState>>>,
}

impl SwarmOrchestrator {
    /// Create an orchestrator with its own bus.
    pub fn new(config: SwarmConfig) -> Self {
        Self {
            config,
            bus: Arc::new(MessageBus::new()),
            counter: AtomicU64::new(0),
            swarms: Mutex::new(HashMap::new()),
        }
    }

    /// The bus shared by every swarm of this orchestrator.
    pub fn bus(&self) -> Arc<MessageBus> {
        Arc::clone(&self.bus)
    }

    /// Spawn a swarm and drive it to a terminal state.
    ///
    /// Rejects with [`SwarmlinkError::MaxSwarmsReached`] when the
    /// concurrent non-terminal swarm cap is hit, and with
    /// [`SwarmlinkError::TooManyAgents`] when the resolved role set
    /// exceeds the per-swarm agent cap.
    pub async fn spawn(
        &self,
        options: SpawnOptions,
        runner: Arc<dyn AgentRunner>,
    ) -> SwarmlinkResult<SwarmInfo> {
        let roles = resolve_roles(options.roles.as_deref(), &options.task);
        if roles.len() > self.config.max_agents_per_swarm {
            return Err(SwarmlinkError::TooManyAgents {
                requested: roles.len(),
                max: self.config.max_agents_per_swarm,
            });
        }

        let consensus = options.consensus.unwrap_or(self.config.default_consensus);
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let swarm_id = format!("swarm-{n}-{now_ms}");

        let agents: Vec<Arc<SwarmAgent>> = roles
            .iter()
            .map(|&role| Arc::new(SwarmAgent::new(&swarm_id, role, Arc::clone(&self.bus))))
            .collect();

        let swarm = Arc::new(SwarmState {
            id: swarm_id.clone(),
            task: options.task.clone(),
            consensus,
            context: options.context.clone(),
            created_at: Utc::now(),
            agents,
            inner: Mutex::new(SwarmMut {
                status: SwarmStatus::Initializing,
                results: Vec::new(),
                aggregated_output: None,
                completed_at: None,
            }),
        });

        {
            let mut swarms = self.swarms.lock().expect("swarms lock");
            let active = swarms.values().filter(|s| !s.status().is_terminal()).count();
            if active >= self.config.max_concurrent_swarms {
                return Err(SwarmlinkError::MaxSwarmsReached {
                    max: self.config.max_concurrent_swarms,
                });
            }
            swarms.insert(swarm_id.clone(), Arc::clone(&swarm));
        }

        info!(swarm_id = %swarm_id, roles = ?roles, "swarm spawned");

        swarm.set_status(SwarmStatus::Planning);
        for (role, sub_task) in decompose(
            &options.task,
            &roles,
            options.context.as_deref(),
            options.auto_decompose,
        ) {
            if let Some(agent) = swarm.agents.iter().find(|a| a.role() == role) {
                agent.assign_task(sub_task);
            }
        }

        swarm.set_status(SwarmStatus::Executing);
        self.bus.broadcast(
            &swarm_id,
            ORCHESTRATOR_ID,
            TOPIC_SWARM_START,
            json!({
                "task": options.task,
                "agentCount": swarm.agents.len(),
                "roles": roles,
            }),
        );

        if let Err(err) = self.run_priority_groups(&swarm, runner).await {
            warn!(swarm_id = %swarm_id, error = %err, "swarm execution failed");
            {
                let mut inner = swarm.inner.lock().expect("swarm lock");
                inner.aggregated_output = Some(err.to_string());
            }
            swarm.set_status(SwarmStatus::Failed);
            return Ok(swarm.snapshot());
        }

        // A dissolve that landed mid-execution wins over aggregation.
        if swarm.status() == SwarmStatus::Cancelled {
            return Ok(swarm.snapshot());
        }

        swarm.set_status(SwarmStatus::Aggregating);
        let output = {
            let inner = swarm.inner.lock().expect("swarm lock");
            aggregate(consensus, &swarm.task, &inner.results)
        };
        {
            let mut inner = swarm.inner.lock().expect("swarm lock");
            inner.aggregated_output = Some(output);
        }
        swarm.set_status(SwarmStatus::Completed);

        info!(swarm_id = %swarm_id, "swarm completed");
        Ok(swarm.snapshot())
    }

    async fn run_priority_groups(
        &self,
        swarm: &Arc<SwarmState>,
        runner: Arc<dyn AgentRunner>,
    ) -> SwarmlinkResult<()> {
        let mut groups: BTreeMap<u8, Vec<Arc<SwarmAgent>>> = BTreeMap::new();
        for agent in &swarm.agents {
            let priority = agent
                .current_task()
                .map(|t| t.priority)
                .unwrap_or_else(|| agent.role().priority());
            groups.entry(priority).or_default().push(Arc::clone(agent));
        }

        let timeout = self.config.agent_timeout();

        for (priority, group) in groups {
            debug!(
                swarm_id = %swarm.id,
                priority,
                agents = group.len(),
                "running priority group"
            );

            let mut executions: FuturesUnordered<_> = group
                .iter()
                .map(|agent| {
                    let agent = Arc::clone(agent);
                    let runner = Arc::clone(&runner);
                    async move {
                        match tokio::time::timeout(timeout, agent.execute(runner.as_ref())).await
                        {
                            Ok(Ok(result)) => result,
                            Ok(Err(err)) => AgentResult {
                                status: AgentStatus::Failed,
                                output: format!("Error: {err}"),
                                ..agent.result()
                            },
                            Err(_elapsed) => agent.mark_timed_out(),
                        }
                    }
                })
                .collect();

            let mut group_results = Vec::new();
            while let Some(result) = executions.next().await {
                swarm.push_result(result.clone());
                group_results.push(result);
            }

            // Later groups consume earlier results via their inboxes.
            for result in group_results
                .iter()
                .filter(|r| r.status == AgentStatus::Done)
            {
                let preview: String =
                    result.output.chars().take(RESULT_PREVIEW_CHARS).collect();
                self.bus.broadcast(
                    &swarm.id,
                    ORCHESTRATOR_ID,
                    TOPIC_RESULT_AVAILABLE,
                    json!({
                        "agentId": result.agent_id,
                        "role": result.role,
                        "preview": preview,
                    }),
                );
            }

            if swarm.status() == SwarmStatus::Cancelled {
                break;
            }
        }

        Ok(())
    }

    /// Snapshot of a swarm by id.
    pub fn get_swarm_info(&self, id: &str) -> Option<SwarmInfo> {
        self.swarms
            .lock()
            .expect("swarms lock")
            .get(id)
            .map(|s| s.snapshot())
    }

    /// Snapshots of every swarm, newest first.
    pub fn list_swarms(&self) -> Vec<SwarmInfo> {
        let mut swarms: Vec<SwarmInfo> = self
            .swarms
            .lock()
            .expect("swarms lock")
            .values()
            .map(|s| s.snapshot())
            .collect();
        swarms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        swarms
    }

    /// Number of swarms currently tracked (any status).
    pub fn swarm_count(&self) -> usize {
        self.swarms.lock().expect("swarms lock").len()
    }

    /// Destroy a swarm's agents, mark it cancelled, and clear its bus
    /// history. Completed swarms keep their terminal status but still
    /// release agents and history.
    pub fn dissolve(&self, id: &str) -> SwarmlinkResult<()> {
        let swarm = self
            .swarms
            .lock()
            .expect("swarms lock")
            .get(id)
            .cloned()
            .ok_or_else(|| SwarmlinkError::invalid_params(format!("unknown swarm: {id}")))?;

        for agent in &swarm.agents {
            agent.destroy();
        }
        swarm.set_status(SwarmStatus::Cancelled);
        self.bus.clear_swarm(id);
        info!(swarm_id = %id, "swarm dissolved");
        Ok(())
    }

    /// Send a direct message on a swarm's scope.
    pub fn send_message(
        &self,
        swarm_id: &str,
        from: &str,
        to: &str,
        topic: &str,
        payload: Value,
    ) -> SwarmlinkResult<SwarmMessage> {
        self.require_swarm(swarm_id)?;
        Ok(self.bus.send(swarm_id, from, to, topic, payload, None))
    }

    /// Broadcast on a swarm's scope.
    pub fn broadcast_to_swarm(
        &self,
        swarm_id: &str,
        from: &str,
        topic: &str,
        payload: Value,
    ) -> SwarmlinkResult<SwarmMessage> {
        self.require_swarm(swarm_id)?;
        Ok(self.bus.broadcast(swarm_id, from, topic, payload))
    }

    /// The most recent `limit` messages of a swarm (default 50).
    pub fn get_messages(&self, swarm_id: &str, limit: Option<usize>) -> Vec<SwarmMessage> {
        self.bus
            .get_history(swarm_id, limit.unwrap_or(DEFAULT_MESSAGE_LIMIT))
    }

    fn require_swarm(&self, id: &str) -> SwarmlinkResult<()> {
        if self.swarms.lock().expect("swarms lock").contains_key(id) {
            Ok(())
        } else {
            Err(SwarmlinkError::invalid_params(format!(
                "unknown swarm: {id}"
            )))
        }
    }
}

fn resolve_roles(requested: Option<&[String]>, task: &str) -> Vec<SwarmRole> {
    let filtered: Vec<SwarmRole> = requested
        .map(|ids| {
            ids.iter()
                .filter_map(|id| {
                    let role = SwarmRole::from_id(id);
                    if role.is_none() {
                        warn!(role = %id, "ignoring unknown role id");
                    }
                    role
                })
                .collect()
        })
        .unwrap_or_default();

    if filtered.is_empty() {
        suggest_roles(task)
    } else {
        filtered
    }
}
