use orchestra::Snapshot;

use super::Workspace;

/// Print the dashboard view. Exit code 0 unless the state file is corrupt.
pub fn run(ws: &Workspace, json: bool) -> anyhow::Result<u8> {
    let snapshot = ws.store.snapshot()?;

    if json {
        println!("{}", serde_json::to_string(&snapshot)?);
    } else {
        for line in snapshot.status_lines() {
            println!("{}", line);
        }
    }

    match snapshot {
        Snapshot::Corrupt { .. } => Ok(1),
        _ => Ok(0),
    }
}
