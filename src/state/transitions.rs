use crate::error::{Result, StoreError};
use crate::state::schema::TaskStatus;

/// Validate a task status transition is allowed.
pub fn validate_transition(task: &str, from: TaskStatus, to: TaskStatus) -> Result<()> {
    if valid_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            task: task.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Get valid transitions from a status.
///
/// Trivial tasks may skip straight from pending to done.
pub fn valid_transitions(from: TaskStatus) -> &'static [TaskStatus] {
    match from {
        TaskStatus::Pending => &[TaskStatus::InProgress, TaskStatus::Done],
        TaskStatus::InProgress => &[TaskStatus::Done],
        TaskStatus::Done => &[], // Terminal state
    }
}
