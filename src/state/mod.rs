pub mod schema;
pub mod timing;
pub mod transitions;

// Re-export all schema types for convenience
pub use schema::{
    short_id, AgentRole, Escalation, Message, MessageKind, OrchestraState, Priority, Review,
    Session, Task, TaskStatus, Verdict, Vote, STATE_VERSION,
};
