//! Task executor hook — the seam between the A2A engine and the agent
//! runtime that actually does the work.
//!
//! The server core never interprets a task's content. It hands the task
//! and its initiating message to a [`TaskExecutor`] supplied by the
//! embedding application, then translates the outcome into state
//! transitions and artifacts via [`run_task`].

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{SwarmlinkError, SwarmlinkResult};
use crate::state::is_terminal;
use crate::types::{Artifact, FilePayload, Message, Task, TaskState};

use super::task_manager::TaskManager;

/// What an executor produced for a completed task.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOutput {
    /// The response text. Becomes the task's first artifact and its final
    /// agent message.
    pub text: String,

    /// Optional files, appended as artifacts after the text.
    pub files: Vec<FilePayload>,
}

impl ExecutorOutput {
    /// A text-only output.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            files: Vec::new(),
        }
    }
}

/// The hook the embedding application implements to execute tasks.
///
/// `cancel` is tied to the task: it fires when the task is canceled, and
/// implementations must observe it and return promptly. Whatever they
/// return after cancellation is discarded.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run the task to completion (or failure).
    async fn execute(
        &self,
        task: Task,
        message: Message,
        cancel: CancellationToken,
    ) -> SwarmlinkResult<ExecutorOutput>;
}

/// Drive a submitted task through the executor:
/// `submitted -> working`, then either artifacts + `completed` with an
/// agent message carrying the response text, or `failed` with an
/// `"Error: <reason>"` message.
///
/// If the task was canceled while the executor ran, the canceled state
/// wins and the executor's outcome is discarded.
pub async fn run_task(
    manager: &TaskManager,
    executor: &dyn TaskExecutor,
    task_id: &str,
) -> SwarmlinkResult<Task> {
    let task = manager.get_task_or_err(task_id).await?;
    let message = task
        .history
        .first()
        .cloned()
        .ok_or_else(|| SwarmlinkError::internal_error("task has no initiating message"))?;

    let cancel = manager
        .cancel_token(task_id)
        .await
        .ok_or_else(|| SwarmlinkError::task_not_found(task_id))?;

    manager
        .update_status(task_id, TaskState::Working, None)
        .await?;

    let outcome = executor.execute(task, message, cancel.clone()).await;

    // A cancel that landed mid-execution already produced the terminal
    // event; nothing of the executor's outcome is applied.
    if cancel.is_cancelled() {
        debug!(task_id = %task_id, "executor finished after cancellation; outcome discarded");
        return manager.get_task_or_err(task_id).await;
    }

    let result = match outcome {
        Ok(output) => {
            let mut applied =
                apply_artifact(manager, task_id, Artifact::text(output.text.clone(), 0)).await;
            if applied.is_ok() {
                for (offset, file) in output.files.into_iter().enumerate() {
                    applied =
                        apply_artifact(manager, task_id, Artifact::file(file, offset as u32 + 1))
                            .await;
                    if applied.is_err() {
                        break;
                    }
                }
            }
            match applied {
                Ok(()) => {
                    manager
                        .update_status(
                            task_id,
                            TaskState::Completed,
                            Some(Message::agent(output.text)),
                        )
                        .await
                }
                Err(err) => Err(err),
            }
        }
        Err(err) => {
            manager
                .update_status(
                    task_id,
                    TaskState::Failed,
                    Some(Message::agent(format!("Error: {err}"))),
                )
                .await
        }
    };

    match result {
        Ok(task) => Ok(task),
        // Lost the race against a concurrent cancel: the terminal state
        // that is already in place wins.
        Err(SwarmlinkError::InvalidTransition { from, .. }) if is_terminal(from) => {
            manager.get_task_or_err(task_id).await
        }
        Err(err) => Err(err),
    }
}

async fn apply_artifact(
    manager: &TaskManager,
    task_id: &str,
    artifact: Artifact,
) -> SwarmlinkResult<()> {
    manager.add_artifact(task_id, artifact).await
}
