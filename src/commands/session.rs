use super::{print_written, write_with_retry, Workspace, Written, EXIT_BUSY};

pub fn start(ws: &Workspace, prompt: Option<&str>) -> anyhow::Result<u8> {
    let written = write_with_retry(ws, "session start", ws.agent, |store| {
        store.start_session(prompt)
    })?;
    print_written(written)
}

pub fn clear(ws: &Workspace) -> anyhow::Result<u8> {
    match write_with_retry(ws, "session clear", ws.agent, |store| store.clear())? {
        Written::Done(()) => {
            println!("Cleared session state in {}", ws.store.dir().display());
            Ok(0)
        }
        Written::Busy => Ok(EXIT_BUSY),
    }
}
