//! Human-readable conversation log kept beside the state document.
//!
//! Written best-effort after each commit. The state document stays
//! authoritative; a failed log write is reported and otherwise ignored.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::state::{AgentRole, Escalation, Message, Session, Task, Vote};

/// Log entries produced by one mutation, appended after it commits.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<String>,
    reset: bool,
}

impl Journal {
    pub fn push(&mut self, entry: String) {
        self.entries.push(entry);
    }

    /// Truncate the log before appending this journal's entries.
    pub fn reset_log(&mut self) {
        self.reset = true;
        self.entries.clear();
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

#[derive(Debug, Clone)]
pub struct ConversationLog {
    path: PathBuf,
}

impl ConversationLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply a committed journal to the log.
    pub fn write(&self, journal: &Journal) {
        if journal.reset {
            if let Err(e) = fs::write(&self.path, "") {
                warn!(path = %self.path.display(), error = %e, "failed to reset conversation log");
            }
        }
        if journal.entries.is_empty() {
            return;
        }

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| {
                let mut text = String::new();
                for entry in &journal.entries {
                    text.push_str(entry);
                    text.push_str("\n\n");
                }
                file.write_all(text.as_bytes())
            });
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "failed to append to conversation log");
        }
    }
}

pub fn session_started(session: &Session) -> String {
    let mut entry = format!(
        "# Session {}\nStarted: {}",
        session.id,
        session.started_at.to_rfc3339()
    );
    if let Some(prompt) = &session.initial_prompt {
        entry.push_str("\n\n");
        entry.push_str(prompt);
    }
    entry
}

pub fn message(msg: &Message) -> String {
    let to = msg.to.map(|r| r.to_string()).unwrap_or_else(|| "all".to_string());
    format!(
        "---\n[{}] {} -> {} ({}, {})\n\n{}",
        msg.timestamp.to_rfc3339(),
        msg.from,
        to,
        msg.kind,
        msg.id,
        msg.body
    )
}

pub fn task_created(task: &Task) -> String {
    let assignee = task
        .assigned_to
        .map(|r| r.to_string())
        .unwrap_or_else(|| "unassigned".to_string());
    let title = task.title.as_deref().unwrap_or(&task.description);
    format!(
        "---\n[TASK CREATED] {} -> {}\n{}",
        task.id, assignee, title
    )
}

pub fn task_claimed(task: &Task, agent: AgentRole) -> String {
    format!("---\n[TASK CLAIMED] {} by {}", task.id, agent)
}

pub fn task_status(task: &Task) -> String {
    let mut entry = format!("---\n[TASK {}] {}", task.status.to_string().to_uppercase(), task.id);
    if let Some(result) = &task.result {
        entry.push_str("\n\n");
        entry.push_str(result);
    }
    if !task.files_modified.is_empty() {
        entry.push_str("\nFiles: ");
        entry.push_str(&task.files_modified.join(", "));
    }
    entry
}

pub fn escalation_raised(escalation: &Escalation) -> String {
    let scope = escalation.task_id.as_deref().unwrap_or("session");
    format!(
        "---\n[ESCALATION {}] {} ({})\n\n{}",
        escalation.id, escalation.raised_by, scope, escalation.reason
    )
}

pub fn escalation_resolved(escalation: &Escalation) -> String {
    let mut entry = format!("---\n[RESOLVED {}]", escalation.id);
    if let Some(note) = &escalation.resolution {
        entry.push_str(" ");
        entry.push_str(note);
    }
    entry
}

pub fn vote_closed(vote: &Vote) -> String {
    let tally = vote
        .tally()
        .iter()
        .map(|(option, count)| format!("{}: {}", option, count))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "---\n[VOTE CLOSED] {} -> {}\n{}",
        vote.topic,
        vote.result.as_deref().unwrap_or("no ballots"),
        tally
    )
}
