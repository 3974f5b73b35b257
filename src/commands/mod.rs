pub mod check;
pub mod context;
pub mod escalation;
pub mod message;
pub mod review;
pub mod session;
pub mod setup;
pub mod status;
pub mod task;
pub mod vote;

use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{error, warn};

use orchestra::config::current_agent;
use orchestra::{AgentRole, Escalation, OrchestraConfig, StateStore};

/// Exit code when the store stayed busy through every retry.
pub const EXIT_BUSY: u8 = 2;

/// Store, config and caller identity for one command invocation.
pub struct Workspace {
    pub config: OrchestraConfig,
    pub store: StateStore,
    pub agent: AgentRole,
}

impl Workspace {
    pub fn open(cwd: &Path) -> anyhow::Result<Self> {
        let config = OrchestraConfig::load(cwd)?;
        let store = StateStore::open(cwd, &config);
        Ok(Self {
            config,
            store,
            agent: current_agent()?,
        })
    }
}

/// Outcome of a write that retries on lock contention.
pub enum Written<T> {
    Done(T),
    /// Still busy after every attempt; the blocked operation was deferred as
    /// an escalation.
    Busy,
}

/// Run a store write on behalf of `agent`, retrying `StoreBusy` with linear
/// backoff.
///
/// After `escalate_after_failures` busy attempts the blocked operation is
/// deferred as a session-wide escalation raised by `agent`. The deferral
/// needs no lock, so the next successful write records it. Any other error
/// is returned immediately.
pub fn write_with_retry<T>(
    ws: &Workspace,
    operation: &str,
    agent: AgentRole,
    mut op: impl FnMut(&StateStore) -> orchestra::Result<T>,
) -> anyhow::Result<Written<T>> {
    let attempts = ws.config.escalate_after_failures.max(1);
    let backoff = Duration::from_millis(ws.config.retry_backoff_ms);

    for attempt in 1..=attempts {
        match op(&ws.store) {
            Ok(value) => return Ok(Written::Done(value)),
            Err(e) if e.is_busy() => {
                warn!(operation, attempt, attempts, "state store busy");
                if attempt < attempts {
                    thread::sleep(backoff * attempt);
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    let reason = format!(
        "State store stayed busy after {} attempts; '{}' by {} was not recorded",
        attempts, operation, agent
    );
    eprintln!("Error: {}", reason);
    match ws
        .store
        .defer_escalation(Escalation::new(agent, &reason, None))
    {
        Ok(escalation) => eprintln!(
            "Escalation {} will be recorded by the next write",
            escalation.id
        ),
        Err(e) => error!(operation, error = %e, "failed to defer busy-store escalation"),
    }
    Ok(Written::Busy)
}

/// Print a written record as JSON, or map a busy outcome to its exit code.
pub fn print_written<T: serde::Serialize>(written: Written<T>) -> anyhow::Result<u8> {
    match written {
        Written::Done(value) => {
            println!("{}", serde_json::to_string(&value)?);
            Ok(0)
        }
        Written::Busy => Ok(EXIT_BUSY),
    }
}
