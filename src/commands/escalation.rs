use orchestra::{AgentRole, Escalation};

use super::{print_written, write_with_retry, Workspace};

pub fn raise(
    ws: &Workspace,
    reason: &str,
    task: Option<&str>,
    from: Option<AgentRole>,
) -> anyhow::Result<u8> {
    let from = from.unwrap_or(ws.agent);
    let escalation = Escalation::new(from, reason, task);
    let written = write_with_retry(ws, "escalation raise", from, |store| {
        store.raise_escalation(escalation.clone())
    })?;
    print_written(written)
}

pub fn resolve(ws: &Workspace, id: &str, note: Option<&str>) -> anyhow::Result<u8> {
    let written = write_with_retry(ws, "escalation resolve", ws.agent, |store| {
        store.resolve_escalation_with(id, note)
    })?;
    print_written(written)
}
