use orchestra::state::short_id;
use orchestra::{AgentRole, Task, TaskFilter, TaskStatus};

use super::{print_written, write_with_retry, Workspace};

pub fn add(
    ws: &Workspace,
    description: &str,
    id: Option<&str>,
    title: Option<&str>,
    agent: Option<AgentRole>,
    depends_on: Vec<String>,
) -> anyhow::Result<u8> {
    let id = id.map(str::to_string).unwrap_or_else(short_id);
    let mut task = Task::new(&id, description)
        .created_by(ws.agent)
        .depends_on(depends_on);
    if let Some(title) = title {
        task = task.with_title(title);
    }
    if let Some(agent) = agent {
        task = task.assigned_to(agent);
    }

    let written = write_with_retry(ws, "task add", ws.agent, |store| {
        store.append_task(task.clone())
    })?;
    print_written(written)
}

pub fn update(ws: &Workspace, id: &str, status: TaskStatus) -> anyhow::Result<u8> {
    let written = write_with_retry(ws, "task update", ws.agent, |store| {
        store.update_task_status(id, status)
    })?;
    print_written(written)
}

pub fn claim(ws: &Workspace, id: &str) -> anyhow::Result<u8> {
    let written = write_with_retry(ws, "task claim", ws.agent, |store| {
        store.claim_task(id, ws.agent)
    })?;
    print_written(written)
}

pub fn complete(ws: &Workspace, id: &str, result: &str, files: &[String]) -> anyhow::Result<u8> {
    let written = write_with_retry(ws, "task complete", ws.agent, |store| {
        store.complete_task(id, ws.agent, result, files)
    })?;
    print_written(written)
}

pub fn show(ws: &Workspace, id: &str) -> anyhow::Result<u8> {
    let task = ws.store.task(id)?;
    println!("{}", serde_json::to_string(&task)?);
    Ok(0)
}

pub fn list(ws: &Workspace, filter: TaskFilter, json: bool) -> anyhow::Result<u8> {
    let tasks = ws.store.tasks(&filter)?;

    if json {
        println!("{}", serde_json::to_string(&tasks)?);
        return Ok(0);
    }

    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(0);
    }

    println!(
        "{:<12} {:<12} {:<12} {:<12} {}",
        "ID", "STATUS", "AGENT", "CLAIMED BY", "DESCRIPTION"
    );
    println!("{}", "-".repeat(92));
    for task in tasks {
        let role = |r: Option<AgentRole>| r.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
        let text = task.title.as_deref().unwrap_or(&task.description);
        let text = if text.chars().count() > 40 {
            format!("{}...", text.chars().take(37).collect::<String>())
        } else {
            text.to_string()
        };
        println!(
            "{:<12} {:<12} {:<12} {:<12} {}",
            task.id,
            task.status.to_string(),
            role(task.assigned_to),
            role(task.claimed_by),
            text
        );
    }

    Ok(0)
}
