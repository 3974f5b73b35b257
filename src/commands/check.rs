use orchestra::agents::check_availability;

use super::Workspace;

pub fn run(ws: &Workspace) -> anyhow::Result<u8> {
    let report = check_availability(&ws.config);

    println!("Agent availability:");
    for agent in &report {
        let status = match (&agent.path, agent.enabled) {
            (_, false) => "disabled".to_string(),
            (Some(path), true) => format!("available ({})", path.display()),
            (None, true) => "not found".to_string(),
        };
        println!("  {:<13} {:<10} {}", agent.role.to_string(), agent.binary, status);
    }

    // The orchestrator is this process's caller; only missing workers matter.
    let missing = report
        .iter()
        .filter(|a| a.role.is_worker() && a.enabled && a.path.is_none())
        .count();
    Ok(if missing == 0 { 0 } else { 1 })
}
