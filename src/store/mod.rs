//! File-backed orchestration state store.
//!
//! One JSON document per working directory, shared by independent processes.
//! Every mutation is a read-modify-write under an exclusive advisory lock and
//! is committed by atomically replacing the document. Reads take no lock and
//! always see a fully committed document.

pub mod atomic;
pub mod handoff;
pub mod lock;
pub mod log;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::OrchestraConfig;
use crate::error::{Result, StoreError};
use crate::snapshot::Snapshot;
use crate::state::transitions::validate_transition;
use crate::state::{
    AgentRole, Escalation, Message, MessageKind, OrchestraState, Priority, Review, Session, Task,
    TaskStatus, Verdict, Vote, STATE_VERSION,
};

use self::lock::StoreLock;
use self::log::{ConversationLog, Journal};

pub const STATE_FILE: &str = "state.json";
pub const LOCK_FILE: &str = "state.lock";
pub const LOG_FILE: &str = "conversation.md";

/// Result of reading the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    /// Nothing has been written yet (first run).
    Absent,
    Present(OrchestraState),
}

impl Loaded {
    pub fn into_state(self) -> Option<OrchestraState> {
        match self {
            Loaded::Absent => None,
            Loaded::Present(state) => Some(state),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Loaded::Absent)
    }
}

/// Which tasks `StateStore::tasks` returns. Empty fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<AgentRole>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self.assigned_to.map_or(true, |a| task.assigned_to == Some(a))
    }
}

/// Handle on the state store of one working directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
    state_path: PathBuf,
    lock_path: PathBuf,
    pending_dir: PathBuf,
    log: ConversationLog,
    lock_timeout: Duration,
    lock_poll: Duration,
}

impl StateStore {
    /// Store for `workdir` with default settings.
    pub fn new(workdir: &Path) -> Self {
        Self::open(workdir, &OrchestraConfig::default())
    }

    /// Store for `workdir` using the state directory and lock settings in
    /// `config`. Touches nothing on disk.
    pub fn open(workdir: &Path, config: &OrchestraConfig) -> Self {
        let dir = config.resolve_state_dir(workdir);
        Self {
            state_path: dir.join(STATE_FILE),
            lock_path: dir.join(LOCK_FILE),
            pending_dir: dir.join(handoff::PENDING_DIR),
            log: ConversationLog::new(dir.join(LOG_FILE)),
            dir,
            lock_timeout: config.lock_timeout(),
            lock_poll: config.lock_poll(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read the committed state.
    ///
    /// Unparsable bytes are `CorruptState`; they are never replaced with an
    /// empty document.
    pub fn load(&self) -> Result<Loaded> {
        let bytes = match fs::read(&self.state_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Loaded::Absent),
            Err(e) => {
                return Err(StoreError::io(
                    format!("failed to read {}", self.state_path.display()),
                    e,
                ))
            }
        };

        let state: OrchestraState =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;
        if state.version > STATE_VERSION {
            return Err(self.corrupt(format!(
                "unsupported state version {} (newest known is {})",
                state.version, STATE_VERSION
            )));
        }
        Ok(Loaded::Present(state))
    }

    /// Consistent read-only view for status display.
    ///
    /// Absent and corrupt stores are reported as snapshot states rather than
    /// errors; only other I/O failures are returned as `Err`. Escalations
    /// deferred while the store was busy are shown with the committed ones.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let mut snapshot = match self.load() {
            Ok(Loaded::Absent) => Snapshot::NoStore,
            Ok(Loaded::Present(state)) => Snapshot::from_state(&state),
            Err(StoreError::CorruptState { reason, .. }) => Snapshot::Corrupt { reason },
            Err(e) => return Err(e),
        };

        if let Snapshot::Active(view) = &mut snapshot {
            for (_, escalation) in handoff::collect(&self.pending_dir) {
                if view.unresolved_escalations.iter().all(|e| e.id != escalation.id) {
                    view.unresolved_escalations.push(escalation);
                }
            }
        }
        Ok(snapshot)
    }

    pub fn task(&self, id: &str) -> Result<Task> {
        self.committed()?
            .tasks
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::task_not_found(id))
    }

    /// Tasks matching `filter`, in creation order.
    pub fn tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self
            .committed()?
            .tasks
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect())
    }

    /// Messages addressed to `agent`, oldest first.
    pub fn inbox(&self, agent: AgentRole, unread_only: bool) -> Result<Vec<Message>> {
        Ok(self
            .committed()?
            .messages
            .into_iter()
            .filter(|m| m.is_for(agent) && !(unread_only && m.read))
            .collect())
    }

    /// The most recent `limit` messages of the session, oldest first.
    pub fn conversation(&self, limit: usize) -> Result<Vec<Message>> {
        let mut messages = self.committed()?.messages;
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }

    /// Reviews waiting on a verdict from `agent`.
    pub fn pending_reviews(&self, agent: AgentRole) -> Result<Vec<Review>> {
        let state = self.committed()?;
        Ok(state.pending_reviews(agent).cloned().collect())
    }

    pub fn context(&self, key: &str) -> Result<Option<String>> {
        Ok(self.committed()?.context.remove(key))
    }

    pub fn all_context(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.committed()?.context)
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Start a session if none is active, recording `prompt` if the session
    /// has none yet. Returns the active session.
    pub fn start_session(&self, prompt: Option<&str>) -> Result<Session> {
        self.mutate("start_session", |state, journal| {
            let created = state.session.is_none();
            let session = state.session.get_or_insert_with(Session::new);
            if let Some(prompt) = prompt {
                if session.initial_prompt.is_none() {
                    session.initial_prompt = Some(prompt.to_string());
                }
            }
            if created {
                journal.push(log::session_started(session));
            }
            Ok(session.clone())
        })
    }

    /// Drop the active session with all its records.
    pub fn clear(&self) -> Result<()> {
        self.mutate("clear", |state, journal| {
            *state = OrchestraState::new();
            journal.reset_log();
            Ok(())
        })
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Add a new task in `pending` status.
    ///
    /// The id must be unused in the session and every dependency must exist.
    pub fn append_task(&self, task: Task) -> Result<Task> {
        self.mutate("append_task", |state, journal| {
            if state.task(&task.id).is_some() {
                return Err(StoreError::duplicate("Task", &task.id));
            }
            if let Some(role) = task.assigned_to.filter(|r| !r.is_worker()) {
                return Err(StoreError::InvalidRole(format!(
                    "{} cannot be assigned tasks",
                    role
                )));
            }
            if let Some(missing) = task.depends_on.iter().find(|d| state.task(d).is_none()) {
                return Err(StoreError::task_not_found(missing));
            }

            let now = Utc::now();
            let task = Task {
                status: TaskStatus::Pending,
                claimed_by: None,
                result: None,
                files_modified: Vec::new(),
                created_at: now,
                updated_at: now,
                ..task
            };
            start_session_if_needed(state, journal);
            journal.push(log::task_created(&task));
            state.tasks.push(task.clone());
            Ok(task)
        })
    }

    /// Move a task to `status`, following pending -> in_progress -> done.
    pub fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        self.mutate("update_task_status", |state, journal| {
            let task = transition(state, id, status)?;
            journal.push(log::task_status(task));
            Ok(task.clone())
        })
    }

    /// Take ownership of a task and start it.
    ///
    /// Claiming again as the owner is a no-op. A task owned by another agent
    /// is `ClaimedByOther`; a pending task whose dependencies are not done is
    /// `BlockedByDependency`.
    pub fn claim_task(&self, id: &str, agent: AgentRole) -> Result<Task> {
        self.mutate("claim_task", |state, journal| {
            if !agent.is_worker() {
                return Err(StoreError::InvalidRole(format!(
                    "{} cannot claim tasks",
                    agent
                )));
            }
            let (status, owner) = state
                .task(id)
                .map(|t| (t.status, t.claimed_by))
                .ok_or_else(|| StoreError::task_not_found(id))?;
            if let Some(owner) = owner.filter(|o| *o != agent) {
                return Err(StoreError::ClaimedByOther {
                    task: id.to_string(),
                    owner: owner.to_string(),
                });
            }

            let task = if status == TaskStatus::InProgress {
                state
                    .task_mut(id)
                    .ok_or_else(|| StoreError::task_not_found(id))?
            } else {
                transition(state, id, TaskStatus::InProgress)?
            };
            if task.claimed_by.is_none() {
                task.claimed_by = Some(agent);
                journal.push(log::task_claimed(task, agent));
            }
            Ok(task.clone())
        })
    }

    /// Mark a task done and record its result summary in one commit.
    ///
    /// A claimed task can only be completed by the agent that claimed it.
    pub fn complete_task(
        &self,
        id: &str,
        agent: AgentRole,
        result: &str,
        files_modified: &[String],
    ) -> Result<Task> {
        self.mutate("complete_task", |state, journal| {
            let owner = state
                .task(id)
                .ok_or_else(|| StoreError::task_not_found(id))?
                .claimed_by;
            if let Some(owner) = owner.filter(|o| *o != agent) {
                return Err(StoreError::ClaimedByOther {
                    task: id.to_string(),
                    owner: owner.to_string(),
                });
            }

            let task = transition(state, id, TaskStatus::Done)?;
            task.result = Some(result.to_string());
            task.files_modified = files_modified.to_vec();
            journal.push(log::task_status(task));
            Ok(task.clone())
        })
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Log a message. Never rejected for its content.
    ///
    /// The timestamp is set at commit so document order is timestamp order.
    pub fn append_message(&self, message: Message) -> Result<Message> {
        self.mutate("append_message", |state, journal| {
            if state.messages.iter().any(|m| m.id == message.id) {
                return Err(StoreError::duplicate("Message", &message.id));
            }
            start_session_if_needed(state, journal);
            let message = push_message(state, journal, message);
            Ok(message)
        })
    }

    /// Mark a message read. Marking twice is not an error.
    pub fn mark_read(&self, message_id: &str) -> Result<Message> {
        self.mutate("mark_read", |state, _| {
            let message = state
                .messages
                .iter_mut()
                .find(|m| m.id == message_id)
                .ok_or_else(|| StoreError::not_found("Message", message_id))?;
            message.read = true;
            Ok(message.clone())
        })
    }

    // ========================================================================
    // Escalations
    // ========================================================================

    /// Record an unresolved escalation and broadcast it to all agents.
    ///
    /// Several escalations may be open at once, including for the same task,
    /// but each needs its own id. `raised_at` is set at commit.
    pub fn raise_escalation(&self, escalation: Escalation) -> Result<Escalation> {
        self.mutate("raise_escalation", |state, journal| {
            if state.escalations.iter().any(|e| e.id == escalation.id) {
                return Err(StoreError::duplicate("Escalation", &escalation.id));
            }
            if let Some(task_id) = &escalation.task_id {
                if state.task(task_id).is_none() {
                    return Err(StoreError::task_not_found(task_id));
                }
            }
            Ok(record_escalation(state, journal, escalation))
        })
    }

    /// Record an escalation without taking the lock.
    ///
    /// For callers that could not get the lock at all: the escalation is
    /// folded into the document by the next successful mutation and shows in
    /// `snapshot` until then.
    pub fn defer_escalation(&self, escalation: Escalation) -> Result<Escalation> {
        self.ensure_dir()?;
        handoff::defer(&self.pending_dir, &escalation)?;
        info!(id = %escalation.id, "escalation deferred until the store is free");
        Ok(escalation)
    }

    /// Mark an escalation resolved. Resolving twice is not an error.
    pub fn resolve_escalation(&self, id: &str) -> Result<Escalation> {
        self.resolve_escalation_with(id, None)
    }

    /// Mark an escalation resolved, recording how it was resolved.
    ///
    /// An already-resolved escalation keeps its original resolution.
    pub fn resolve_escalation_with(&self, id: &str, note: Option<&str>) -> Result<Escalation> {
        self.mutate("resolve_escalation", |state, journal| {
            let escalation = state
                .escalation_mut(id)
                .ok_or_else(|| StoreError::not_found("Escalation", id))?;
            if !escalation.resolved {
                escalation.resolved = true;
                escalation.resolved_at = Some(Utc::now());
                escalation.resolution = note.map(str::to_string);
                journal.push(log::escalation_resolved(escalation));
            }
            Ok(escalation.clone())
        })
    }

    // ========================================================================
    // Reviews
    // ========================================================================

    /// Ask `review.to` to review work, notifying it with a high-priority
    /// message.
    pub fn request_review(&self, review: Review) -> Result<Review> {
        self.mutate("request_review", |state, journal| {
            if state.reviews.iter().any(|r| r.id == review.id) {
                return Err(StoreError::duplicate("Review", &review.id));
            }
            if let Some(task_id) = &review.task_id {
                if state.task(task_id).is_none() {
                    return Err(StoreError::task_not_found(task_id));
                }
            }

            let review = Review {
                requested_at: Utc::now(),
                verdict: None,
                feedback: None,
                reviewed_at: None,
                ..review
            };
            start_session_if_needed(state, journal);
            let notice = Message::new(
                review.from,
                Some(review.to),
                &format!("[REVIEW REQUEST {}]\n\n{}", review.id, review.content),
            )
            .kind(MessageKind::ReviewRequest)
            .priority(Priority::High);
            push_message(state, journal, notice);

            state.reviews.push(review.clone());
            Ok(review)
        })
    }

    /// Record `agent`'s verdict and send it back to the requester.
    ///
    /// Only the requested reviewer may answer. Answering again replaces the
    /// earlier verdict.
    pub fn submit_review(
        &self,
        id: &str,
        agent: AgentRole,
        verdict: Verdict,
        feedback: &str,
    ) -> Result<Review> {
        self.mutate("submit_review", |state, journal| {
            let review = state
                .review_mut(id)
                .ok_or_else(|| StoreError::not_found("Review", id))?;
            if review.to != agent {
                return Err(StoreError::NotReviewer {
                    review: id.to_string(),
                    reviewer: review.to.to_string(),
                });
            }
            review.verdict = Some(verdict);
            review.feedback = Some(feedback.to_string());
            review.reviewed_at = Some(Utc::now());
            let review = review.clone();

            let result = Message::new(
                agent,
                Some(review.from),
                &format!("[REVIEW RESULT {}] {}\n\n{}", review.id, verdict, feedback),
            )
            .kind(MessageKind::ReviewResult)
            .priority(Priority::High);
            push_message(state, journal, result);
            Ok(review)
        })
    }

    // ========================================================================
    // Shared context
    // ========================================================================

    /// Set a shared context value, replacing any previous one.
    pub fn set_context(&self, key: &str, value: &str) -> Result<String> {
        self.mutate("set_context", |state, journal| {
            start_session_if_needed(state, journal);
            state.context.insert(key.to_string(), value.to_string());
            Ok(value.to_string())
        })
    }

    /// Append a line to a shared context value. Returns the new value.
    pub fn append_context(&self, key: &str, value: &str) -> Result<String> {
        self.mutate("append_context", |state, journal| {
            start_session_if_needed(state, journal);
            let entry = state.context.entry(key.to_string()).or_default();
            if !entry.is_empty() {
                entry.push('\n');
            }
            entry.push_str(value);
            Ok(entry.clone())
        })
    }

    // ========================================================================
    // Votes
    // ========================================================================

    /// Open a vote and broadcast its options. One open vote per topic.
    pub fn open_vote(&self, vote: Vote) -> Result<Vote> {
        self.mutate("open_vote", |state, journal| {
            if state.votes.iter().any(|v| v.topic == vote.topic && !v.closed) {
                return Err(StoreError::duplicate("Vote", &vote.topic));
            }

            let vote = Vote {
                opened_at: Utc::now(),
                ballots: BTreeMap::new(),
                closed: false,
                result: None,
                ..vote
            };
            start_session_if_needed(state, journal);
            let notice = Message::new(
                vote.opened_by,
                None,
                &format!("[VOTE] {}\n\nOptions: {}", vote.topic, vote.options.join(", ")),
            )
            .kind(MessageKind::Broadcast);
            push_message(state, journal, notice);

            state.votes.push(vote.clone());
            Ok(vote)
        })
    }

    /// Record `agent`'s ballot on the open vote for `topic`, replacing any
    /// earlier ballot from the same agent.
    pub fn cast_vote(&self, topic: &str, agent: AgentRole, choice: &str) -> Result<Vote> {
        self.mutate("cast_vote", |state, _| {
            let vote = state
                .open_vote_mut(topic)
                .ok_or_else(|| StoreError::not_found("Vote", topic))?;
            if !vote.options.iter().any(|o| o == choice) {
                return Err(StoreError::InvalidChoice {
                    topic: topic.to_string(),
                    choice: choice.to_string(),
                    options: vote.options.join(", "),
                });
            }
            vote.ballots.insert(agent.to_string(), choice.to_string());
            Ok(vote.clone())
        })
    }

    /// Close the open vote for `topic` and record the leading option.
    pub fn close_vote(&self, topic: &str) -> Result<Vote> {
        self.mutate("close_vote", |state, journal| {
            let vote = state
                .open_vote_mut(topic)
                .ok_or_else(|| StoreError::not_found("Vote", topic))?;
            vote.closed = true;
            vote.result = vote.leading().map(str::to_string);
            journal.push(log::vote_closed(vote));
            Ok(vote.clone())
        })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Committed state, or an empty document when nothing is stored yet.
    fn committed(&self) -> Result<OrchestraState> {
        Ok(self.load()?.into_state().unwrap_or_default())
    }

    /// Run one locked read-modify-write cycle.
    ///
    /// Deferred escalations are folded in first. `f` edits the loaded state;
    /// if it fails nothing is written and the deferred files stay for the
    /// next writer. The lock is held only for this cycle.
    fn mutate<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut OrchestraState, &mut Journal) -> Result<T>,
    ) -> Result<T> {
        self.ensure_dir()?;
        let _lock = StoreLock::acquire(&self.lock_path, self.lock_timeout, self.lock_poll)?;
        atomic::remove_stale_temps(&self.state_path);

        let mut state = self.committed()?;
        let mut journal = Journal::default();

        let deferred = handoff::collect(&self.pending_dir);
        let mut folded = Vec::with_capacity(deferred.len());
        for (path, escalation) in deferred {
            fold_deferred(&mut state, &mut journal, escalation);
            folded.push(path);
        }

        let value = f(&mut state, &mut journal)?;

        let bytes = serde_json::to_vec_pretty(&state)
            .map_err(|e| StoreError::io("failed to serialize state", e.into()))?;
        atomic::write_atomic(&self.state_path, &bytes)?;
        debug!(op, path = %self.state_path.display(), "committed state");

        handoff::discard(&folded);
        self.log.write(&journal);
        Ok(value)
    }

    // Only the state directory itself is created; a missing working
    // directory is an I/O error.
    fn ensure_dir(&self) -> Result<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        match fs::create_dir(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(StoreError::io(
                format!("failed to create state directory {}", self.dir.display()),
                e,
            )),
        }
    }

    fn corrupt(&self, reason: String) -> StoreError {
        StoreError::CorruptState {
            path: self.state_path.clone(),
            reason,
        }
    }
}

fn start_session_if_needed(state: &mut OrchestraState, journal: &mut Journal) {
    if state.session.is_none() {
        let session = state.ensure_session();
        journal.push(log::session_started(session));
    }
}

/// Append a message stamped no earlier than the last one, and log it.
fn push_message(
    state: &mut OrchestraState,
    journal: &mut Journal,
    mut message: Message,
) -> Message {
    let now = Utc::now();
    message.timestamp = match state.messages.last() {
        Some(last) if last.timestamp > now => last.timestamp,
        _ => now,
    };
    journal.push(log::message(&message));
    state.messages.push(message.clone());
    message
}

/// Store an escalation stamped at commit, with its broadcast notice.
fn record_escalation(
    state: &mut OrchestraState,
    journal: &mut Journal,
    escalation: Escalation,
) -> Escalation {
    let escalation = Escalation {
        raised_at: Utc::now(),
        resolved: false,
        resolved_at: None,
        resolution: None,
        ..escalation
    };
    start_session_if_needed(state, journal);
    journal.push(log::escalation_raised(&escalation));

    let notice = Message::new(
        escalation.raised_by,
        None,
        &format!("[ESCALATION {}] {}", escalation.id, escalation.reason),
    )
    .kind(MessageKind::Escalation)
    .priority(Priority::Urgent);
    push_message(state, journal, notice);

    state.escalations.push(escalation.clone());
    escalation
}

// A deferred escalation already in the document was folded by a writer that
// committed but died before removing the file.
fn fold_deferred(state: &mut OrchestraState, journal: &mut Journal, mut escalation: Escalation) {
    if state.escalations.iter().any(|e| e.id == escalation.id) {
        return;
    }
    if let Some(task_id) = &escalation.task_id {
        if state.task(task_id).is_none() {
            escalation.task_id = None;
        }
    }
    let escalation = record_escalation(state, journal, escalation);
    info!(id = %escalation.id, "folded deferred escalation");
}

fn transition<'a>(
    state: &'a mut OrchestraState,
    id: &str,
    status: TaskStatus,
) -> Result<&'a mut Task> {
    let task = state.task(id).ok_or_else(|| StoreError::task_not_found(id))?;
    validate_transition(id, task.status, status)?;

    if task.status == TaskStatus::Pending {
        let waiting_on = task
            .depends_on
            .iter()
            .find(|dep| state.task(dep).map_or(true, |d| d.status != TaskStatus::Done));
        if let Some(dependency) = waiting_on {
            return Err(StoreError::BlockedByDependency {
                task: id.to_string(),
                dependency: dependency.clone(),
            });
        }
    }

    let task = state
        .task_mut(id)
        .ok_or_else(|| StoreError::task_not_found(id))?;
    task.status = status;
    task.updated_at = Utc::now();
    Ok(task)
}
