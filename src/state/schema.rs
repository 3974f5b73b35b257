use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Version written into every state document.
pub const STATE_VERSION: u32 = 1;

/// Generate an 8-character identifier for sessions, messages and escalations.
pub fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Participant in an orchestration.
///
/// The orchestrator sends messages and raises escalations but is never
/// assigned a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    Orchestrator,
    Researcher,
    EngineerA,
    EngineerB,
}

impl AgentRole {
    /// Roles that can be assigned delegated work.
    pub const WORKERS: [AgentRole; 3] = [
        AgentRole::Researcher,
        AgentRole::EngineerA,
        AgentRole::EngineerB,
    ];

    pub const ALL: [AgentRole; 4] = [
        AgentRole::Orchestrator,
        AgentRole::Researcher,
        AgentRole::EngineerA,
        AgentRole::EngineerB,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Orchestrator => "orchestrator",
            AgentRole::Researcher => "researcher",
            AgentRole::EngineerA => "engineer-a",
            AgentRole::EngineerB => "engineer-b",
        }
    }

    pub fn is_worker(&self) -> bool {
        !matches!(self, AgentRole::Orchestrator)
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentRole {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "orchestrator" => Ok(AgentRole::Orchestrator),
            "researcher" => Ok(AgentRole::Researcher),
            "engineer-a" => Ok(AgentRole::EngineerA),
            "engineer-b" => Ok(AgentRole::EngineerB),
            _ => Err(StoreError::InvalidRole(s.to_string())),
        }
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Done => write!(f, "done"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            _ => Err(StoreError::InvalidStatus(s.to_string())),
        }
    }
}

/// Kind of logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Task,
    Question,
    #[default]
    Response,
    ReviewRequest,
    ReviewResult,
    Broadcast,
    Escalation,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageKind::Task => "task",
            MessageKind::Question => "question",
            MessageKind::Response => "response",
            MessageKind::ReviewRequest => "review_request",
            MessageKind::ReviewResult => "review_result",
            MessageKind::Broadcast => "broadcast",
            MessageKind::Escalation => "escalation",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// One orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_prompt: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: short_id(),
            started_at: Utc::now(),
            initial_prompt: None,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit of delegated work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<AgentRole>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<AgentRole>,

    /// Agent executing the task. Only it may complete a claimed task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<AgentRole>,

    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_modified: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(id: &str, description: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            title: None,
            description: description.to_string(),
            created_by: None,
            assigned_to: None,
            claimed_by: None,
            status: TaskStatus::Pending,
            depends_on: Vec::new(),
            result: None,
            files_modified: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn created_by(mut self, role: AgentRole) -> Self {
        self.created_by = Some(role);
        self
    }

    pub fn assigned_to(mut self, role: AgentRole) -> Self {
        self.assigned_to = Some(role);
        self
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.depends_on = ids.into_iter().collect();
        self
    }
}

/// A logged communication between the orchestrator and an agent, or
/// between agents. `to == None` is a broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub from: AgentRole,
    #[serde(default)]
    pub to: Option<AgentRole>,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub priority: Priority,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub read: bool,
}

impl Message {
    pub fn new(from: AgentRole, to: Option<AgentRole>, body: &str) -> Self {
        Self {
            id: short_id(),
            timestamp: Utc::now(),
            from,
            to,
            kind: MessageKind::default(),
            priority: Priority::default(),
            body: body.to_string(),
            in_reply_to: None,
            read: false,
        }
    }

    pub fn kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn in_reply_to(mut self, id: &str) -> Self {
        self.in_reply_to = Some(id.to_string());
        self
    }

    /// Direct messages to `agent` and broadcasts from anyone else.
    pub fn is_for(&self, agent: AgentRole) -> bool {
        self.from != agent && self.to.map_or(true, |to| to == agent)
    }
}

/// A blocker that needs a user decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: String,
    pub reason: String,
    /// Related task; `None` means the escalation is session-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub raised_by: AgentRole,
    pub raised_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl Escalation {
    pub fn new(raised_by: AgentRole, reason: &str, task_id: Option<&str>) -> Self {
        Self {
            id: short_id(),
            reason: reason.to_string(),
            task_id: task_id.map(str::to_string),
            raised_by,
            raised_at: Utc::now(),
            resolved: false,
            resolved_at: None,
            resolution: None,
        }
    }
}

/// Outcome of a code review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    NeedsChanges,
    Rejected,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Approved => write!(f, "approved"),
            Verdict::NeedsChanges => write!(f, "needs_changes"),
            Verdict::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for Verdict {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "approved" => Ok(Verdict::Approved),
            "needs_changes" => Ok(Verdict::NeedsChanges),
            "rejected" => Ok(Verdict::Rejected),
            _ => Err(StoreError::InvalidVerdict(s.to_string())),
        }
    }
}

/// A request for one agent to review another's work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub requested_at: DateTime<Utc>,
    pub from: AgentRole,
    pub to: AgentRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Review {
    pub fn new(from: AgentRole, to: AgentRole, content: &str) -> Self {
        Self {
            id: short_id(),
            requested_at: Utc::now(),
            from,
            to,
            task_id: None,
            content: content.to_string(),
            files: Vec::new(),
            verdict: None,
            feedback: None,
            reviewed_at: None,
        }
    }

    pub fn for_task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn files(mut self, files: impl IntoIterator<Item = String>) -> Self {
        self.files = files.into_iter().collect();
        self
    }

    pub fn is_pending(&self) -> bool {
        self.verdict.is_none()
    }
}

/// A poll among agents, identified by its topic while open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub topic: String,
    pub options: Vec<String>,
    pub opened_by: AgentRole,
    pub opened_at: DateTime<Utc>,
    /// Latest choice keyed by agent role name.
    #[serde(default)]
    pub ballots: BTreeMap<String, String>,
    #[serde(default)]
    pub closed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl Vote {
    pub fn new(opened_by: AgentRole, topic: &str, options: Vec<String>) -> Self {
        Self {
            topic: topic.to_string(),
            options,
            opened_by,
            opened_at: Utc::now(),
            ballots: BTreeMap::new(),
            closed: false,
            result: None,
        }
    }

    /// Ballots per option, in option order.
    pub fn tally(&self) -> Vec<(&str, usize)> {
        self.options
            .iter()
            .map(|option| {
                let count = self.ballots.values().filter(|c| *c == option).count();
                (option.as_str(), count)
            })
            .collect()
    }

    /// Option with the most ballots; ties go to the earlier option.
    pub fn leading(&self) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;
        for (option, count) in self.tally() {
            if count > 0 && best.map_or(true, |(_, most)| count > most) {
                best = Some((option, count));
            }
        }
        best.map(|(option, _)| option)
    }
}

/// The full document persisted at `<state_dir>/state.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestraState {
    pub version: u32,

    #[serde(default)]
    pub session: Option<Session>,

    #[serde(default)]
    pub tasks: Vec<Task>,

    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(default)]
    pub escalations: Vec<Escalation>,

    #[serde(default)]
    pub reviews: Vec<Review>,

    /// Shared notes keyed by name, visible to every agent.
    #[serde(default)]
    pub context: BTreeMap<String, String>,

    #[serde(default)]
    pub votes: Vec<Vote>,
}

impl OrchestraState {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            session: None,
            tasks: Vec::new(),
            messages: Vec::new(),
            escalations: Vec::new(),
            reviews: Vec::new(),
            context: BTreeMap::new(),
            votes: Vec::new(),
        }
    }

    /// Return the active session, starting one if there is none.
    pub fn ensure_session(&mut self) -> &Session {
        self.session.get_or_insert_with(Session::new)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn escalation_mut(&mut self, id: &str) -> Option<&mut Escalation> {
        self.escalations.iter_mut().find(|e| e.id == id)
    }

    pub fn unresolved_escalations(&self) -> impl Iterator<Item = &Escalation> {
        self.escalations.iter().filter(|e| !e.resolved)
    }

    pub fn review_mut(&mut self, id: &str) -> Option<&mut Review> {
        self.reviews.iter_mut().find(|r| r.id == id)
    }

    /// Reviews waiting on a verdict from `agent`.
    pub fn pending_reviews(&self, agent: AgentRole) -> impl Iterator<Item = &Review> {
        self.reviews
            .iter()
            .filter(move |r| r.to == agent && r.is_pending())
    }

    /// The open vote on `topic`, if any.
    pub fn open_vote_mut(&mut self, topic: &str) -> Option<&mut Vote> {
        self.votes
            .iter_mut()
            .find(|v| v.topic == topic && !v.closed)
    }
}

impl Default for OrchestraState {
    fn default() -> Self {
        Self::new()
    }
}
