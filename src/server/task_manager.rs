//! Task manager — in-memory store of A2A tasks.
//!
//! Owns every live task, enforces the state machine on each update, fans
//! events out to subscribers, and prunes expired terminal tasks on a fixed
//! cadence.
//!
//! Fan-out is a bounded `tokio::sync::broadcast` channel per task: slow
//! subscribers observe `Lagged` (oldest events dropped) instead of stalling
//! the manager or their siblings. When a task reaches a terminal state the
//! sender is dropped, which releases every subscriber after it drains the
//! final event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{SwarmlinkError, SwarmlinkResult};
use crate::state::{assert_transition, is_terminal};
use crate::types::{
    Artifact, Message, SendMessageParams, StreamEvent, Task, TaskArtifactUpdateEvent, TaskState,
    TaskStatus, TaskStatusUpdateEvent,
};

/// Per-subscriber event buffer. Overflow drops the oldest events
/// (`broadcast::error::RecvError::Lagged`); the drop is surfaced to the
/// lagging subscriber and logged.
pub const SUBSCRIBER_CAPACITY: usize = 256;

/// Cadence of the background expiry sweep.
const PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Options for constructing a [`TaskManager`].
#[derive(Debug, Clone)]
pub struct TaskManagerOptions {
    /// Maximum number of tasks held at once.
    pub max_tasks: usize,
    /// How long a terminal task is retained before pruning.
    pub expiry: Duration,
}

impl Default for TaskManagerOptions {
    fn default() -> Self {
        Self {
            max_tasks: 100,
            expiry: Duration::from_secs(60 * 60),
        }
    }
}

struct TaskEntry {
    task: Task,
    /// `None` once the task is terminal — dropping the sender releases
    /// all subscribers.
    events: Option<broadcast::Sender<StreamEvent>>,
    cancel: CancellationToken,
}

/// In-memory task store with state-machine enforcement and subscriber
/// fan-out.
pub struct TaskManager {
    options: TaskManagerOptions,
    tasks: RwLock<HashMap<String, TaskEntry>>,
}

impl TaskManager {
    /// Create a manager with the given limits.
    pub fn new(options: TaskManagerOptions) -> Self {
        Self {
            options,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Number of tasks currently held (any state).
    pub async fn task_count(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Create a task in `submitted` with the given initiating message.
    ///
    /// Fails with [`SwarmlinkError::TaskLimitReached`] when the store is
    /// full.
    pub async fn create_task(&self, params: SendMessageParams) -> SwarmlinkResult<Task> {
        let mut tasks = self.tasks.write().await;
        if tasks.len() >= self.options.max_tasks {
            return Err(SwarmlinkError::TaskLimitReached {
                max: self.options.max_tasks,
            });
        }

        let id = uuid::Uuid::new_v4().to_string();
        let session_id = params
            .session_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let task = Task {
            id: id.clone(),
            session_id,
            status: TaskStatus {
                state: TaskState::Submitted,
                message: None,
                timestamp: Some(Utc::now().to_rfc3339()),
            },
            history: vec![params.message],
            artifacts: Vec::new(),
            metadata: params.metadata,
        };

        let (events, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        tasks.insert(
            id.clone(),
            TaskEntry {
                task: task.clone(),
                events: Some(events),
                cancel: CancellationToken::new(),
            },
        );

        info!(task_id = %id, "task created");
        Ok(task)
    }

    /// Snapshot of a task, if present.
    pub async fn get_task(&self, id: &str) -> Option<Task> {
        self.tasks.read().await.get(id).map(|e| e.task.clone())
    }

    /// Snapshot of a task, failing with [`SwarmlinkError::TaskNotFound`]
    /// if absent.
    pub async fn get_task_or_err(&self, id: &str) -> SwarmlinkResult<Task> {
        self.get_task(id)
            .await
            .ok_or_else(|| SwarmlinkError::task_not_found(id))
    }

    /// The cancellation token tied to a task. Executors watch it to
    /// abandon work once the task is canceled.
    pub async fn cancel_token(&self, id: &str) -> Option<CancellationToken> {
        self.tasks.read().await.get(id).map(|e| e.cancel.clone())
    }

    /// Transition a task to `new_state`, optionally appending `message`
    /// to its history, and fan the status update out to subscribers.
    ///
    /// The transition is validated against the state machine. Reaching a
    /// terminal state releases the subscriber set after the final event.
    pub async fn update_status(
        &self,
        id: &str,
        new_state: TaskState,
        message: Option<Message>,
    ) -> SwarmlinkResult<Task> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(id)
            .ok_or_else(|| SwarmlinkError::task_not_found(id))?;

        assert_transition(entry.task.status.state, new_state)?;

        debug!(
            task_id = %id,
            from = %entry.task.status.state,
            to = %new_state,
            "task status transition"
        );

        if let Some(message) = message {
            entry.task.history.push(message);
        }

        entry.task.status = TaskStatus {
            state: new_state,
            message: None,
            timestamp: Some(monotonic_timestamp(entry.task.status.timestamp.as_deref())),
        };

        let r#final = is_terminal(new_state);
        let event = StreamEvent::StatusUpdate(TaskStatusUpdateEvent {
            task_id: id.to_string(),
            status: entry.task.status.clone(),
            r#final,
        });

        if let Some(events) = &entry.events {
            // Send failures just mean no subscriber is listening.
            let _ = events.send(event);
        }

        if r#final {
            entry.events = None;
        }

        Ok(entry.task.clone())
    }

    /// Append an artifact to a task and fan the update out.
    ///
    /// Rejected on terminal tasks: once a task is terminal it is
    /// immutable.
    pub async fn add_artifact(&self, id: &str, artifact: Artifact) -> SwarmlinkResult<()> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(id)
            .ok_or_else(|| SwarmlinkError::task_not_found(id))?;

        let state = entry.task.status.state;
        if is_terminal(state) {
            return Err(SwarmlinkError::InvalidTransition {
                from: state,
                to: state,
                allowed: &[],
            });
        }

        entry.task.artifacts.push(artifact.clone());
        entry.task.artifacts.sort_by_key(|a| a.index);

        let event = StreamEvent::ArtifactUpdate(TaskArtifactUpdateEvent {
            task_id: id.to_string(),
            artifact,
        });
        if let Some(events) = &entry.events {
            let _ = events.send(event);
        }
        Ok(())
    }

    /// Cancel a task: transition to `canceled`, emit the terminal event,
    /// and fire the task's cancellation token.
    ///
    /// Idempotence: canceling an already-terminal task fails with
    /// [`SwarmlinkError::TaskNotCancelable`] and emits nothing.
    pub async fn cancel_task(&self, id: &str) -> SwarmlinkResult<Task> {
        let cancel = {
            let mut tasks = self.tasks.write().await;
            let entry = tasks
                .get_mut(id)
                .ok_or_else(|| SwarmlinkError::task_not_found(id))?;

            if is_terminal(entry.task.status.state) {
                return Err(SwarmlinkError::task_not_cancelable(id));
            }

            entry.task.status = TaskStatus {
                state: TaskState::Canceled,
                message: None,
                timestamp: Some(monotonic_timestamp(entry.task.status.timestamp.as_deref())),
            };

            let event = StreamEvent::StatusUpdate(TaskStatusUpdateEvent {
                task_id: id.to_string(),
                status: entry.task.status.clone(),
                r#final: true,
            });
            if let Some(events) = entry.events.take() {
                let _ = events.send(event);
            }
            entry.cancel.clone()
        };

        // Fire the token outside the lock; executors may react immediately.
        cancel.cancel();
        info!(task_id = %id, "task canceled");
        self.get_task_or_err(id).await
    }

    /// Subscribe to a task's event stream.
    ///
    /// For a terminal task the returned receiver is already closed — the
    /// caller observes the end of stream immediately.
    pub async fn subscribe(
        &self,
        id: &str,
    ) -> SwarmlinkResult<broadcast::Receiver<StreamEvent>> {
        let tasks = self.tasks.read().await;
        let entry = tasks
            .get(id)
            .ok_or_else(|| SwarmlinkError::task_not_found(id))?;

        match &entry.events {
            Some(events) => Ok(events.subscribe()),
            None => {
                // Terminal: hand out a receiver whose sender is gone.
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                Ok(rx)
            }
        }
    }

    /// Delete every terminal task whose last status timestamp is older
    /// than the configured expiry. Returns the number pruned.
    pub async fn prune_expired_tasks(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.options.expiry).unwrap_or(chrono::Duration::zero());

        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|id, entry| {
            if !is_terminal(entry.task.status.state) {
                return true;
            }
            let expired = entry
                .task
                .status
                .timestamp
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc) < cutoff)
                .unwrap_or(false);
            if expired {
                debug!(task_id = %id, "pruning expired task");
            }
            !expired
        });
        let pruned = before - tasks.len();
        if pruned > 0 {
            info!(pruned, "expired tasks pruned");
        }
        pruned
    }

    /// Spawn the background sweep that calls
    /// [`prune_expired_tasks`](Self::prune_expired_tasks) every 5 minutes
    /// until `shutdown` fires.
    pub fn spawn_prune_loop(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let manager = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        manager.prune_expired_tasks().await;
                    }
                    _ = shutdown.cancelled() => {
                        debug!("prune loop shutting down");
                        break;
                    }
                }
            }
        })
    }
}

/// Current time as RFC-3339, clamped so it never moves backwards relative
/// to the previous status timestamp of the same task.
fn monotonic_timestamp(previous: Option<&str>) -> String {
    let now = Utc::now();
    let prev = previous
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));
    match prev {
        Some(prev) if prev > now => {
            warn!("clock moved backwards; clamping status timestamp");
            prev.to_rfc3339()
        }
        _ => now.to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TaskManager {
        TaskManager::new(TaskManagerOptions::default())
    }

    fn send_params(text: &str) -> SendMessageParams {
        SendMessageParams {
            message: Message::user(text),
            session_id: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn create_task_initializes_history_and_state() {
        let mgr = manager();
        let task = mgr.create_task(send_params("hello")).await.unwrap();

        assert_eq!(task.status.state, TaskState::Submitted);
        assert_eq!(task.history.len(), 1);
        assert_eq!(task.history[0].text(), "hello");
        assert!(task.artifacts.is_empty());
        assert!(task.status.timestamp.is_some());
    }

    #[tokio::test]
    async fn create_task_respects_limit() {
        let mgr = TaskManager::new(TaskManagerOptions {
            max_tasks: 2,
            ..Default::default()
        });

        mgr.create_task(send_params("a")).await.unwrap();
        mgr.create_task(send_params("b")).await.unwrap();

        let err = mgr.create_task(send_params("c")).await.unwrap_err();
        assert!(matches!(err, SwarmlinkError::TaskLimitReached { max: 2 }));
    }

    #[tokio::test]
    async fn update_status_enforces_state_machine() {
        let mgr = manager();
        let task = mgr.create_task(send_params("x")).await.unwrap();

        let err = mgr
            .update_status(&task.id, TaskState::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmlinkError::InvalidTransition { .. }));

        mgr.update_status(&task.id, TaskState::Working, None)
            .await
            .unwrap();
        let task = mgr
            .update_status(&task.id, TaskState::Completed, Some(Message::agent("done")))
            .await
            .unwrap();
        assert_eq!(task.status.state, TaskState::Completed);
        assert_eq!(task.history.last().unwrap().text(), "done");
    }

    #[tokio::test]
    async fn subscribers_see_events_in_order_and_are_released() {
        let mgr = manager();
        let task = mgr.create_task(send_params("x")).await.unwrap();
        let mut rx = mgr.subscribe(&task.id).await.unwrap();

        mgr.update_status(&task.id, TaskState::Working, None)
            .await
            .unwrap();
        mgr.add_artifact(&task.id, Artifact::text("out", 0))
            .await
            .unwrap();
        mgr.update_status(&task.id, TaskState::Completed, None)
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            StreamEvent::StatusUpdate(e) => {
                assert_eq!(e.status.state, TaskState::Working);
                assert!(!e.r#final);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            StreamEvent::ArtifactUpdate(e) => assert_eq!(e.artifact.index, 0),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            StreamEvent::StatusUpdate(e) => {
                assert_eq!(e.status.state, TaskState::Completed);
                assert!(e.r#final);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Sender dropped after the terminal event: stream ends.
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn subscribe_on_terminal_task_is_closed_immediately() {
        let mgr = manager();
        let task = mgr.create_task(send_params("x")).await.unwrap();
        mgr.cancel_task(&task.id).await.unwrap();

        let mut rx = mgr.subscribe(&task.id).await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn cancel_is_not_idempotent_and_emits_once() {
        let mgr = manager();
        let task = mgr.create_task(send_params("x")).await.unwrap();
        let mut rx = mgr.subscribe(&task.id).await.unwrap();

        let canceled = mgr.cancel_task(&task.id).await.unwrap();
        assert_eq!(canceled.status.state, TaskState::Canceled);
        assert!(canceled.status.message.is_none());

        let err = mgr.cancel_task(&task.id).await.unwrap_err();
        assert!(matches!(err, SwarmlinkError::TaskNotCancelable { .. }));

        // Exactly one terminal event, then closed.
        assert!(rx.recv().await.unwrap().is_final());
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn cancel_fires_the_task_token() {
        let mgr = manager();
        let task = mgr.create_task(send_params("x")).await.unwrap();
        let token = mgr.cancel_token(&task.id).await.unwrap();
        assert!(!token.is_cancelled());

        mgr.cancel_task(&task.id).await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn add_artifact_rejected_on_terminal_task() {
        let mgr = manager();
        let task = mgr.create_task(send_params("x")).await.unwrap();
        mgr.cancel_task(&task.id).await.unwrap();

        let err = mgr
            .add_artifact(&task.id, Artifact::text("late", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmlinkError::InvalidTransition { .. }));
        assert!(mgr.get_task(&task.id).await.unwrap().artifacts.is_empty());
    }

    #[tokio::test]
    async fn artifacts_kept_ordered_by_index() {
        let mgr = manager();
        let task = mgr.create_task(send_params("x")).await.unwrap();
        mgr.update_status(&task.id, TaskState::Working, None)
            .await
            .unwrap();

        mgr.add_artifact(&task.id, Artifact::text("second", 1))
            .await
            .unwrap();
        mgr.add_artifact(&task.id, Artifact::text("first", 0))
            .await
            .unwrap();

        let task = mgr.get_task(&task.id).await.unwrap();
        let indices: Vec<u32> = task.artifacts.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn prune_removes_only_expired_terminal_tasks() {
        let mgr = TaskManager::new(TaskManagerOptions {
            max_tasks: 10,
            expiry: Duration::from_millis(10),
        });

        let done = mgr.create_task(send_params("done")).await.unwrap();
        mgr.update_status(&done.id, TaskState::Working, None)
            .await
            .unwrap();
        mgr.update_status(&done.id, TaskState::Completed, None)
            .await
            .unwrap();

        let live = mgr.create_task(send_params("live")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(mgr.prune_expired_tasks().await, 1);

        assert!(mgr.get_task(&done.id).await.is_none());
        assert!(matches!(
            mgr.get_task_or_err(&done.id).await,
            Err(SwarmlinkError::TaskNotFound { .. })
        ));
        assert!(mgr.get_task(&live.id).await.is_some());
    }

    #[tokio::test]
    async fn status_timestamps_are_monotonic() {
        let mgr = manager();
        let task = mgr.create_task(send_params("x")).await.unwrap();
        let t0 = task.status.timestamp.clone().unwrap();

        let task = mgr
            .update_status(&task.id, TaskState::Working, None)
            .await
            .unwrap();
        let t1 = task.status.timestamp.clone().unwrap();

        let parse = |t: &str| {
            DateTime::parse_from_rfc3339(t)
                .unwrap()
                .with_timezone(&Utc)
        };
        assert!(parse(&t1) >= parse(&t0));
    }
}
