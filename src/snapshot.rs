//! Read-only view of the store for status display.
//!
//! Callers poll `StateStore::snapshot`; there is no change notification.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::timing::format_age;
use crate::state::{Escalation, OrchestraState, Session, Task, TaskStatus};

/// What a status display should show. Each variant has its own message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Snapshot {
    /// No state has been written in this working directory.
    NoStore,
    /// State exists but cannot be parsed.
    Corrupt { reason: String },
    /// State exists but the last session was cleared.
    NoActiveSession,
    Active(SessionView),
}

/// The active session as a status display sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session: Session,
    pub counts: TaskCounts,
    pub tasks: Vec<Task>,
    pub unresolved_escalations: Vec<Escalation>,
    pub message_count: usize,
    /// Reviews still waiting on a verdict.
    pub pending_reviews: usize,
}

/// Task summary statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub total: usize,
}

impl TaskCounts {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut counts = TaskCounts {
            total: tasks.len(),
            ..TaskCounts::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Done => counts.done += 1,
            }
        }
        counts
    }
}

impl Snapshot {
    pub fn from_state(state: &OrchestraState) -> Self {
        let Some(session) = &state.session else {
            return Snapshot::NoActiveSession;
        };
        Snapshot::Active(SessionView {
            session: session.clone(),
            counts: TaskCounts::from_tasks(&state.tasks),
            tasks: state.tasks.clone(),
            unresolved_escalations: state.unresolved_escalations().cloned().collect(),
            message_count: state.messages.len(),
            pending_reviews: state.reviews.iter().filter(|r| r.is_pending()).count(),
        })
    }

    /// Status lines for display, with ages measured from now.
    pub fn status_lines(&self) -> Vec<String> {
        self.status_lines_at(Utc::now())
    }

    pub fn status_lines_at(&self, now: DateTime<Utc>) -> Vec<String> {
        match self {
            Snapshot::NoStore => vec!["No orchestration data found.".to_string()],
            Snapshot::Corrupt { reason } => vec![
                format!("Orchestration state is corrupt: {}", reason),
                "The file was left untouched; repair or clear it by hand.".to_string(),
            ],
            Snapshot::NoActiveSession => vec!["No active session.".to_string()],
            Snapshot::Active(view) => view.status_lines_at(now),
        }
    }
}

impl SessionView {
    fn status_lines_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut lines = vec![format!(
            "Session: {} | Started: {}",
            self.session.id,
            format_age(self.session.started_at, now)
        )];

        let c = &self.counts;
        if c.total == 0 {
            lines.push("Tasks:   No tasks yet".to_string());
        } else {
            lines.push(format!("Tasks:   {}/{} complete", c.done, c.total));
        }
        lines.push(format!(
            "         {} pending  {} in progress  {} done",
            c.pending, c.in_progress, c.done
        ));

        if self.pending_reviews > 0 {
            lines.push(format!("Reviews: {} awaiting verdict", self.pending_reviews));
        }

        if self.unresolved_escalations.is_empty() {
            lines.push("[OK] No escalations".to_string());
        }
        for escalation in &self.unresolved_escalations {
            let scope = match &escalation.task_id {
                Some(task) => format!("task {}", task),
                None => "session".to_string(),
            };
            lines.push(format!(
                "! ESCALATION {} ({}): {}",
                escalation.id, scope, escalation.reason
            ));
        }
        lines
    }
}
