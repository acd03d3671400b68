//! Task state machine.
//!
//! Pure transition rules for [`TaskState`]:
//!
//! ```text
//! submitted      -> working | canceled
//! working        -> completed | failed | canceled | input-required
//! input-required -> working | canceled
//! completed, failed, canceled -> (terminal)
//! ```
//!
//! No other edges exist.

use crate::error::{SwarmlinkError, SwarmlinkResult};
use crate::types::TaskState;

/// Returns the set of states reachable from `from` in one transition.
///
/// Terminal states return an empty slice.
pub fn allowed_transitions(from: TaskState) -> &'static [TaskState] {
    match from {
        TaskState::Submitted => &[TaskState::Working, TaskState::Canceled],
        TaskState::Working => &[
            TaskState::Completed,
            TaskState::Failed,
            TaskState::Canceled,
            TaskState::InputRequired,
        ],
        TaskState::InputRequired => &[TaskState::Working, TaskState::Canceled],
        TaskState::Completed | TaskState::Failed | TaskState::Canceled => &[],
    }
}

/// Whether `state` is terminal (no further transitions possible).
pub fn is_terminal(state: TaskState) -> bool {
    matches!(
        state,
        TaskState::Completed | TaskState::Failed | TaskState::Canceled
    )
}

/// Whether `from -> to` is an edge of the state machine.
pub fn is_valid_transition(from: TaskState, to: TaskState) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Validates `from -> to`, failing with
/// [`SwarmlinkError::InvalidTransition`] carrying both states and the
/// allowed set.
pub fn assert_transition(from: TaskState, to: TaskState) -> SwarmlinkResult<()> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(SwarmlinkError::InvalidTransition {
            from,
            to,
            allowed: allowed_transitions(from),
        })
    }
}
