use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use orchestra::{AgentRole, MessageKind, Priority, TaskFilter, TaskStatus, Verdict};

mod commands;

#[derive(Parser)]
#[command(name = "orchestra")]
#[command(about = "Shared task, message and escalation state for multi-agent orchestration")]
#[command(version)]
struct Cli {
    /// Working directory whose state store to use
    #[arg(long, global = true, default_value = ".")]
    cwd: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Session lifecycle
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Delegated tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Messages between the orchestrator and agents
    Message {
        #[command(subcommand)]
        command: MessageCommands,
    },

    /// Blockers that need a user decision
    Escalation {
        #[command(subcommand)]
        command: EscalationCommands,
    },

    /// Peer review between agents
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },

    /// Key-value notes shared by every agent
    Context {
        #[command(subcommand)]
        command: ContextCommands,
    },

    /// Polls among agents
    Vote {
        #[command(subcommand)]
        command: VoteCommands,
    },

    /// Show session, task counts and open escalations
    Status {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Report whether each agent CLI is reachable
    Check,

    /// Print the MCP configuration for the host integration
    Setup,
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Start a session (no-op if one is active)
    Start {
        /// Initial user prompt for the session
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Drop the active session and all its records
    Clear,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Add a pending task
    Add {
        /// What the task is
        #[arg(long)]
        description: String,

        /// Task identifier (generated if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Short title
        #[arg(long)]
        title: Option<String>,

        /// Assigned role (researcher, engineer-a, engineer-b)
        #[arg(long)]
        agent: Option<AgentRole>,

        /// Task ids that must be done first (comma-separated)
        #[arg(long, value_delimiter = ',')]
        depends_on: Vec<String>,
    },

    /// Move a task to a new status
    Update {
        /// Task identifier
        #[arg(long)]
        id: String,

        /// New status (pending, in_progress, done)
        #[arg(long)]
        status: TaskStatus,
    },

    /// Take ownership of a task and start it
    Claim {
        /// Task identifier
        #[arg(long)]
        id: String,
    },

    /// Mark a task done with its result
    Complete {
        /// Task identifier
        #[arg(long)]
        id: String,

        /// Result summary
        #[arg(long)]
        result: String,

        /// Files the task modified (comma-separated)
        #[arg(long, value_delimiter = ',')]
        files: Vec<String>,
    },

    /// Print one task as JSON
    Show {
        /// Task identifier
        #[arg(long)]
        id: String,
    },

    /// List tasks in the active session
    List {
        /// Only tasks with this status
        #[arg(long)]
        status: Option<TaskStatus>,

        /// Only tasks assigned to this role
        #[arg(long)]
        agent: Option<AgentRole>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
enum MessageCommands {
    /// Log a message
    Send {
        /// Recipient role, or "broadcast"
        #[arg(long)]
        to: String,

        /// Message body
        #[arg(long)]
        body: String,

        /// Sender role (default: $ORCHESTRA_AGENT or orchestrator)
        #[arg(long)]
        from: Option<AgentRole>,

        #[arg(long, value_enum, default_value = "response")]
        kind: KindArg,

        #[arg(long, value_enum, default_value = "normal")]
        priority: PriorityArg,

        /// Message id this replies to
        #[arg(long)]
        reply_to: Option<String>,
    },

    /// Show messages addressed to an agent
    Inbox {
        /// Recipient role (default: $ORCHESTRA_AGENT or orchestrator)
        #[arg(long)]
        agent: Option<AgentRole>,

        /// Include messages already read
        #[arg(long)]
        all: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Mark a message read
    Read {
        /// Message identifier
        #[arg(long)]
        id: String,
    },

    /// Show the latest messages of the session
    History {
        /// How many messages to show
        #[arg(long, default_value = "50")]
        limit: usize,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
enum EscalationCommands {
    /// Flag a blocker
    Raise {
        /// Why work cannot proceed
        #[arg(long)]
        reason: String,

        /// Related task (omit for a session-wide blocker)
        #[arg(long)]
        task: Option<String>,

        /// Raising role (default: $ORCHESTRA_AGENT or orchestrator)
        #[arg(long)]
        from: Option<AgentRole>,
    },

    /// Mark a blocker resolved
    Resolve {
        /// Escalation identifier
        #[arg(long)]
        id: String,

        /// How it was resolved
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Subcommand)]
enum ReviewCommands {
    /// Ask another agent to review work
    Request {
        /// Reviewer role
        #[arg(long)]
        to: AgentRole,

        /// What to review
        #[arg(long)]
        content: String,

        /// Related task
        #[arg(long)]
        task: Option<String>,

        /// Files under review (comma-separated)
        #[arg(long, value_delimiter = ',')]
        files: Vec<String>,

        /// Requesting role (default: $ORCHESTRA_AGENT or orchestrator)
        #[arg(long)]
        from: Option<AgentRole>,
    },

    /// Answer a review addressed to you
    Submit {
        /// Review identifier
        #[arg(long)]
        id: String,

        /// approved, needs_changes or rejected
        #[arg(long)]
        verdict: Verdict,

        /// Review notes
        #[arg(long)]
        feedback: String,
    },

    /// Show reviews waiting on an agent
    Pending {
        /// Reviewer role (default: $ORCHESTRA_AGENT or orchestrator)
        #[arg(long)]
        agent: Option<AgentRole>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
enum ContextCommands {
    /// Set a value, replacing any previous one
    Set {
        #[arg(long)]
        key: String,

        #[arg(long)]
        value: String,
    },

    /// Append a line to a value
    Append {
        #[arg(long)]
        key: String,

        #[arg(long)]
        value: String,
    },

    /// Show one value, or all of them
    Get {
        #[arg(long)]
        key: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
enum VoteCommands {
    /// Open a vote and broadcast its options
    Open {
        #[arg(long)]
        topic: String,

        /// Choices (comma-separated, at least two)
        #[arg(long, value_delimiter = ',', required = true)]
        options: Vec<String>,

        /// Opening role (default: $ORCHESTRA_AGENT or orchestrator)
        #[arg(long)]
        from: Option<AgentRole>,
    },

    /// Cast or change a ballot
    Cast {
        #[arg(long)]
        topic: String,

        #[arg(long)]
        choice: String,

        /// Voting role (default: $ORCHESTRA_AGENT or orchestrator)
        #[arg(long)]
        from: Option<AgentRole>,
    },

    /// Close a vote and record the leading option
    Close {
        #[arg(long)]
        topic: String,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum KindArg {
    Task,
    Question,
    Response,
    ReviewRequest,
    ReviewResult,
    Broadcast,
}

impl From<KindArg> for MessageKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Task => MessageKind::Task,
            KindArg::Question => MessageKind::Question,
            KindArg::Response => MessageKind::Response,
            KindArg::ReviewRequest => MessageKind::ReviewRequest,
            KindArg::ReviewResult => MessageKind::ReviewResult,
            KindArg::Broadcast => MessageKind::Broadcast,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum PriorityArg {
    Low,
    Normal,
    High,
    Urgent,
}

impl From<PriorityArg> for Priority {
    fn from(priority: PriorityArg) -> Self {
        match priority {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::High => Priority::High,
            PriorityArg::Urgent => Priority::Urgent,
        }
    }
}

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("ORCHESTRA_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<u8> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Session { command } => {
            let ws = commands::Workspace::open(&cli.cwd)?;
            match command {
                SessionCommands::Start { prompt } => {
                    commands::session::start(&ws, prompt.as_deref())
                }
                SessionCommands::Clear => commands::session::clear(&ws),
            }
        }

        Commands::Task { command } => {
            let ws = commands::Workspace::open(&cli.cwd)?;
            match command {
                TaskCommands::Add {
                    description,
                    id,
                    title,
                    agent,
                    depends_on,
                } => commands::task::add(
                    &ws,
                    &description,
                    id.as_deref(),
                    title.as_deref(),
                    agent,
                    depends_on,
                ),

                TaskCommands::Update { id, status } => commands::task::update(&ws, &id, status),

                TaskCommands::Claim { id } => commands::task::claim(&ws, &id),

                TaskCommands::Show { id } => commands::task::show(&ws, &id),

                TaskCommands::Complete { id, result, files } => {
                    commands::task::complete(&ws, &id, &result, &files)
                }

                TaskCommands::List {
                    status,
                    agent,
                    format,
                } => {
                    let filter = TaskFilter {
                        status,
                        assigned_to: agent,
                    };
                    commands::task::list(&ws, filter, format == OutputFormat::Json)
                }
            }
        }

        Commands::Message { command } => {
            let ws = commands::Workspace::open(&cli.cwd)?;
            match command {
                MessageCommands::Send {
                    to,
                    body,
                    from,
                    kind,
                    priority,
                    reply_to,
                } => commands::message::send(
                    &ws,
                    &to,
                    &body,
                    from,
                    kind.into(),
                    priority.into(),
                    reply_to.as_deref(),
                ),

                MessageCommands::Inbox { agent, all, format } => {
                    commands::message::inbox(&ws, agent, all, format == OutputFormat::Json)
                }

                MessageCommands::Read { id } => commands::message::read(&ws, &id),

                MessageCommands::History { limit, format } => {
                    commands::message::history(&ws, limit, format == OutputFormat::Json)
                }
            }
        }

        Commands::Escalation { command } => {
            let ws = commands::Workspace::open(&cli.cwd)?;
            match command {
                EscalationCommands::Raise { reason, task, from } => {
                    commands::escalation::raise(&ws, &reason, task.as_deref(), from)
                }
                EscalationCommands::Resolve { id, note } => {
                    commands::escalation::resolve(&ws, &id, note.as_deref())
                }
            }
        }

        Commands::Review { command } => {
            let ws = commands::Workspace::open(&cli.cwd)?;
            match command {
                ReviewCommands::Request {
                    to,
                    content,
                    task,
                    files,
                    from,
                } => commands::review::request(&ws, to, &content, task.as_deref(), files, from),

                ReviewCommands::Submit {
                    id,
                    verdict,
                    feedback,
                } => commands::review::submit(&ws, &id, verdict, &feedback),

                ReviewCommands::Pending { agent, format } => {
                    commands::review::pending(&ws, agent, format == OutputFormat::Json)
                }
            }
        }

        Commands::Context { command } => {
            let ws = commands::Workspace::open(&cli.cwd)?;
            match command {
                ContextCommands::Set { key, value } => commands::context::set(&ws, &key, &value),
                ContextCommands::Append { key, value } => {
                    commands::context::append(&ws, &key, &value)
                }
                ContextCommands::Get { key, format } => {
                    commands::context::get(&ws, key.as_deref(), format == OutputFormat::Json)
                }
            }
        }

        Commands::Vote { command } => {
            let ws = commands::Workspace::open(&cli.cwd)?;
            match command {
                VoteCommands::Open {
                    topic,
                    options,
                    from,
                } => commands::vote::open(&ws, &topic, options, from),
                VoteCommands::Cast {
                    topic,
                    choice,
                    from,
                } => commands::vote::cast(&ws, &topic, &choice, from),
                VoteCommands::Close { topic } => commands::vote::close(&ws, &topic),
            }
        }

        Commands::Status { format } => {
            let ws = commands::Workspace::open(&cli.cwd)?;
            commands::status::run(&ws, format == OutputFormat::Json)
        }

        Commands::Check => {
            let ws = commands::Workspace::open(&cli.cwd)?;
            commands::check::run(&ws)
        }

        Commands::Setup => commands::setup::run(&cli.cwd),
    }
}
