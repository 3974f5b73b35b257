use super::{print_written, write_with_retry, Workspace};

pub fn set(ws: &Workspace, key: &str, value: &str) -> anyhow::Result<u8> {
    let written = write_with_retry(ws, "context set", ws.agent, |store| {
        store.set_context(key, value)
    })?;
    print_written(written)
}

pub fn append(ws: &Workspace, key: &str, value: &str) -> anyhow::Result<u8> {
    let written = write_with_retry(ws, "context append", ws.agent, |store| {
        store.append_context(key, value)
    })?;
    print_written(written)
}

/// Print one value, or every key when `key` is omitted. A missing key exits 1.
pub fn get(ws: &Workspace, key: Option<&str>, json: bool) -> anyhow::Result<u8> {
    let Some(key) = key else {
        let all = ws.store.all_context()?;
        if json {
            println!("{}", serde_json::to_string(&all)?);
        } else if all.is_empty() {
            println!("No shared context.");
        } else {
            for (key, value) in all {
                println!("{}:\n{}\n", key, value);
            }
        }
        return Ok(0);
    };

    match ws.store.context(key)? {
        Some(value) => {
            if json {
                println!("{}", serde_json::to_string(&value)?);
            } else {
                println!("{}", value);
            }
            Ok(0)
        }
        None => {
            eprintln!("No context value for '{}'", key);
            Ok(1)
        }
    }
}
