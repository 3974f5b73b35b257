use orchestra::{AgentRole, Review, Verdict};

use super::{print_written, write_with_retry, Workspace};

pub fn request(
    ws: &Workspace,
    to: AgentRole,
    content: &str,
    task: Option<&str>,
    files: Vec<String>,
    from: Option<AgentRole>,
) -> anyhow::Result<u8> {
    let from = from.unwrap_or(ws.agent);
    let mut review = Review::new(from, to, content).files(files);
    if let Some(task) = task {
        review = review.for_task(task);
    }

    let written = write_with_retry(ws, "review request", from, |store| {
        store.request_review(review.clone())
    })?;
    print_written(written)
}

pub fn submit(ws: &Workspace, id: &str, verdict: Verdict, feedback: &str) -> anyhow::Result<u8> {
    let written = write_with_retry(ws, "review submit", ws.agent, |store| {
        store.submit_review(id, ws.agent, verdict, feedback)
    })?;
    print_written(written)
}

pub fn pending(ws: &Workspace, agent: Option<AgentRole>, json: bool) -> anyhow::Result<u8> {
    let agent = agent.unwrap_or(ws.agent);
    let reviews = ws.store.pending_reviews(agent)?;

    if json {
        println!("{}", serde_json::to_string(&reviews)?);
        return Ok(0);
    }

    if reviews.is_empty() {
        println!("No reviews waiting on {}.", agent);
        return Ok(0);
    }

    for review in reviews {
        let task = review.task_id.as_deref().unwrap_or("-");
        println!(
            "[{}] from {} (task {}): {}",
            review.id, review.from, task, review.content
        );
        if !review.files.is_empty() {
            println!("    files: {}", review.files.join(", "));
        }
    }

    Ok(0)
}
