//! Task lifecycle properties: every observed state sequence is a path
//! through the state machine, and terminal tasks go quiet.

use std::time::Duration;

use swarmlink::server::{TaskManager, TaskManagerOptions};
use swarmlink::state::{is_terminal, is_valid_transition};
use swarmlink::types::{Artifact, Message, SendMessageParams, StreamEvent, TaskState};

fn params(text: &str) -> SendMessageParams {
    SendMessageParams {
        message: Message::user(text),
        session_id: None,
        metadata: None,
    }
}

#[tokio::test]
async fn observed_state_sequence_is_a_state_machine_path() {
    let manager = TaskManager::new(TaskManagerOptions::default());
    let task = manager.create_task(params("work")).await.unwrap();
    let mut rx = manager.subscribe(&task.id).await.unwrap();

    // Walk the long way round: working -> input-required -> working ->
    // completed.
    manager
        .update_status(&task.id, TaskState::Working, None)
        .await
        .unwrap();
    manager
        .update_status(
            &task.id,
            TaskState::InputRequired,
            Some(Message::agent("need a file")),
        )
        .await
        .unwrap();
    manager
        .update_status(&task.id, TaskState::Working, Some(Message::user("here")))
        .await
        .unwrap();
    manager
        .update_status(&task.id, TaskState::Completed, None)
        .await
        .unwrap();

    let mut states = vec![TaskState::Submitted];
    while let Ok(event) = rx.recv().await {
        if let StreamEvent::StatusUpdate(update) = event {
            states.push(update.status.state);
        }
    }

    assert_eq!(
        states,
        vec![
            TaskState::Submitted,
            TaskState::Working,
            TaskState::InputRequired,
            TaskState::Working,
            TaskState::Completed,
        ]
    );
    for window in states.windows(2) {
        assert!(
            is_valid_transition(window[0], window[1]),
            "observed invalid edge {:?} -> {:?}",
            window[0],
            window[1]
        );
    }
    assert!(is_terminal(*states.last().unwrap()));
}

#[tokio::test]
async fn no_events_after_terminal_state() {
    let manager = TaskManager::new(TaskManagerOptions::default());
    let task = manager.create_task(params("work")).await.unwrap();
    let mut rx = manager.subscribe(&task.id).await.unwrap();

    manager
        .update_status(&task.id, TaskState::Working, None)
        .await
        .unwrap();
    manager
        .update_status(&task.id, TaskState::Failed, Some(Message::agent("Error: boom")))
        .await
        .unwrap();

    // Attempts to mutate a terminal task fail and emit nothing.
    assert!(manager
        .update_status(&task.id, TaskState::Working, None)
        .await
        .is_err());
    assert!(manager
        .add_artifact(&task.id, Artifact::text("late", 0))
        .await
        .is_err());
    assert!(manager.cancel_task(&task.id).await.is_err());

    let mut events = Vec::new();
    while let Ok(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 2);
    assert!(events.last().unwrap().is_final());
}

#[tokio::test]
async fn boundary_create_at_exactly_max_tasks() {
    let manager = TaskManager::new(TaskManagerOptions {
        max_tasks: 3,
        ..Default::default()
    });

    for i in 0..3 {
        manager.create_task(params(&format!("t{i}"))).await.unwrap();
    }
    assert_eq!(manager.task_count().await, 3);
    assert!(manager.create_task(params("overflow")).await.is_err());
}

#[tokio::test]
async fn expiry_prunes_and_lookup_fails_afterwards() {
    let manager = TaskManager::new(TaskManagerOptions {
        max_tasks: 10,
        expiry: Duration::from_millis(10),
    });

    let task = manager.create_task(params("quick")).await.unwrap();
    manager
        .update_status(&task.id, TaskState::Working, None)
        .await
        .unwrap();
    manager
        .update_status(&task.id, TaskState::Completed, None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(manager.prune_expired_tasks().await, 1);
    assert!(manager.get_task(&task.id).await.is_none());
    assert!(manager.get_task_or_err(&task.id).await.is_err());
}

#[tokio::test]
async fn session_id_defaults_and_round_trips() {
    let manager = TaskManager::new(TaskManagerOptions::default());

    let defaulted = manager.create_task(params("a")).await.unwrap();
    assert!(!defaulted.session_id.is_empty());

    let explicit = manager
        .create_task(SendMessageParams {
            message: Message::user("b"),
            session_id: Some("session-42".to_string()),
            metadata: None,
        })
        .await
        .unwrap();
    assert_eq!(explicit.session_id, "session-42");
}
