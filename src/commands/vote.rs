use orchestra::{AgentRole, Vote};

use super::{print_written, write_with_retry, Workspace};

pub fn open(
    ws: &Workspace,
    topic: &str,
    options: Vec<String>,
    from: Option<AgentRole>,
) -> anyhow::Result<u8> {
    if options.len() < 2 {
        anyhow::bail!("A vote needs at least two options");
    }
    let from = from.unwrap_or(ws.agent);
    let vote = Vote::new(from, topic, options);

    let written = write_with_retry(ws, "vote open", from, |store| {
        store.open_vote(vote.clone())
    })?;
    print_written(written)
}

pub fn cast(
    ws: &Workspace,
    topic: &str,
    choice: &str,
    from: Option<AgentRole>,
) -> anyhow::Result<u8> {
    let from = from.unwrap_or(ws.agent);
    let written = write_with_retry(ws, "vote cast", from, |store| {
        store.cast_vote(topic, from, choice)
    })?;
    print_written(written)
}

pub fn close(ws: &Workspace, topic: &str) -> anyhow::Result<u8> {
    let written = write_with_retry(ws, "vote close", ws.agent, |store| store.close_vote(topic))?;
    print_written(written)
}
