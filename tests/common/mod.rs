#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;

pub fn orchestra_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_orchestra"))
}

/// `orchestra` command pointed at `cwd`, isolated from the caller's
/// environment.
pub fn orchestra(cwd: &Path) -> Command {
    let mut cmd = Command::new(orchestra_bin());
    cmd.arg("--cwd")
        .arg(cwd)
        .env_remove("ORCHESTRA_STATE_DIR")
        .env_remove("ORCHESTRA_AGENT")
        .env_remove("ORCHESTRA_LOG");
    cmd
}

/// Same as `orchestra`, as a plain process for concurrent spawning.
pub fn orchestra_process(cwd: &Path) -> std::process::Command {
    let mut cmd = std::process::Command::new(orchestra_bin());
    cmd.arg("--cwd")
        .arg(cwd)
        .env_remove("ORCHESTRA_STATE_DIR")
        .env_remove("ORCHESTRA_AGENT")
        .env_remove("ORCHESTRA_LOG");
    cmd
}
