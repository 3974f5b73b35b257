use orchestra::{AgentRole, Message, MessageKind, Priority};

use super::{print_written, write_with_retry, Workspace};

/// Parse a recipient; "broadcast" (or "all") addresses every agent.
fn parse_recipient(to: &str) -> anyhow::Result<Option<AgentRole>> {
    match to.to_lowercase().as_str() {
        "broadcast" | "all" => Ok(None),
        _ => Ok(Some(to.parse()?)),
    }
}

pub fn send(
    ws: &Workspace,
    to: &str,
    body: &str,
    from: Option<AgentRole>,
    kind: MessageKind,
    priority: Priority,
    reply_to: Option<&str>,
) -> anyhow::Result<u8> {
    let to = parse_recipient(to)?;
    let from = from.unwrap_or(ws.agent);
    let mut message = Message::new(from, to, body)
        .kind(kind)
        .priority(priority);
    if let Some(id) = reply_to {
        message = message.in_reply_to(id);
    }

    let written = write_with_retry(ws, "message send", from, |store| {
        store.append_message(message.clone())
    })?;
    print_written(written)
}

pub fn inbox(
    ws: &Workspace,
    agent: Option<AgentRole>,
    all: bool,
    json: bool,
) -> anyhow::Result<u8> {
    let agent = agent.unwrap_or(ws.agent);
    let messages = ws.store.inbox(agent, !all)?;

    if json {
        println!("{}", serde_json::to_string(&messages)?);
        return Ok(0);
    }

    if messages.is_empty() {
        println!("No messages for {}.", agent);
        return Ok(0);
    }

    for msg in &messages {
        print_message(msg);
    }

    Ok(0)
}

/// Show the latest `limit` messages of the session, whoever they were for.
pub fn history(ws: &Workspace, limit: usize, json: bool) -> anyhow::Result<u8> {
    let messages = ws.store.conversation(limit)?;

    if json {
        println!("{}", serde_json::to_string(&messages)?);
        return Ok(0);
    }

    if messages.is_empty() {
        println!("No messages.");
        return Ok(0);
    }

    for msg in &messages {
        print_message(msg);
    }

    Ok(0)
}

fn print_message(msg: &Message) {
    let to = msg.to.map(|r| r.to_string()).unwrap_or_else(|| "all".to_string());
    let marker = if msg.read { " " } else { "*" };
    println!(
        "{} [{}] {} {} -> {} ({}): {}",
        marker,
        msg.id,
        msg.timestamp.format("%H:%M:%S"),
        msg.from,
        to,
        msg.kind,
        msg.body
    );
}

pub fn read(ws: &Workspace, id: &str) -> anyhow::Result<u8> {
    let written = write_with_retry(ws, "message read", ws.agent, |store| store.mark_read(id))?;
    print_written(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recipient() {
        assert_eq!(parse_recipient("broadcast").unwrap(), None);
        assert_eq!(parse_recipient("ALL").unwrap(), None);
        assert_eq!(parse_recipient("engineer-b").unwrap(), Some(AgentRole::EngineerB));
        assert!(parse_recipient("gemini").is_err());
    }
}
