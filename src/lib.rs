//! orchestra library
//!
//! Persistent task, message and escalation state shared between an
//! orchestrator and the agent processes it delegates to.

pub mod agents;
pub mod config;
pub mod error;
pub mod setup;
pub mod snapshot;
pub mod state;
pub mod store;

pub use config::OrchestraConfig;
pub use error::{Result, StoreError};
pub use snapshot::{SessionView, Snapshot, TaskCounts};
pub use state::{
    AgentRole, Escalation, Message, MessageKind, OrchestraState, Priority, Review, Session, Task,
    TaskStatus, Verdict, Vote,
};
pub use store::{Loaded, StateStore, TaskFilter};
