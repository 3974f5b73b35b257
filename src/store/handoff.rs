//! Escalations recorded while the store lock cannot be taken.
//!
//! Each deferred escalation is its own file under `<state_dir>/pending/`,
//! written atomically without the lock. The next lock holder folds the files
//! into the document and removes them once that commit is durable. A file
//! that appears after the holder lists the directory waits for the next
//! commit.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::atomic;
use crate::error::{Result, StoreError};
use crate::state::Escalation;

pub const PENDING_DIR: &str = "pending";

/// Write `escalation` to `dir` for the next lock holder to fold in.
pub fn defer(dir: &Path, escalation: &Escalation) -> Result<PathBuf> {
    match fs::create_dir(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => {
            return Err(StoreError::io(
                format!("failed to create {}", dir.display()),
                e,
            ))
        }
    }

    let path = dir.join(format!("{}.json", escalation.id));
    let bytes = serde_json::to_vec_pretty(escalation)
        .map_err(|e| StoreError::io("failed to serialize escalation", e.into()))?;
    atomic::write_atomic(&path, &bytes)?;
    debug!(path = %path.display(), "deferred escalation");
    Ok(path)
}

/// Deferred escalations in `dir`, oldest first.
///
/// Unreadable files are renamed to `*.rejected` so they are reported once
/// and never block later commits.
pub fn collect(dir: &Path) -> Vec<(PathBuf, Escalation)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut deferred = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let parsed = fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                serde_json::from_slice::<Escalation>(&bytes).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(escalation) => deferred.push((path, escalation)),
            Err(reason) => {
                warn!(path = %path.display(), %reason, "rejecting unreadable deferred escalation");
                let _ = fs::rename(&path, path.with_extension("rejected"));
            }
        }
    }
    deferred.sort_by(|a, b| a.1.raised_at.cmp(&b.1.raised_at));
    deferred
}

/// Remove folded files after their commit.
pub fn discard(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to remove folded escalation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AgentRole;
    use tempfile::TempDir;

    #[test]
    fn test_defer_then_collect() {
        let dir = TempDir::new().unwrap();
        let pending = dir.path().join(PENDING_DIR);

        let first = Escalation::new(AgentRole::EngineerA, "store busy", None);
        let second = Escalation::new(AgentRole::Researcher, "store busy again", None);
        defer(&pending, &first).unwrap();
        defer(&pending, &second).unwrap();

        let collected = collect(&pending);
        let mut ids: Vec<_> = collected.iter().map(|(_, e)| e.id.clone()).collect();
        ids.sort();
        let mut expected = vec![first.id, second.id];
        expected.sort();
        assert_eq!(ids, expected);

        let paths: Vec<_> = collected.into_iter().map(|(p, _)| p).collect();
        discard(&paths);
        assert!(collect(&pending).is_empty());
    }

    #[test]
    fn test_collect_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(collect(&dir.path().join(PENDING_DIR)).is_empty());
    }

    #[test]
    fn test_unreadable_file_is_set_aside() {
        let dir = TempDir::new().unwrap();
        let pending = dir.path().join(PENDING_DIR);
        fs::create_dir(&pending).unwrap();
        fs::write(pending.join("abcd1234.json"), "{\"id\":").unwrap();

        assert!(collect(&pending).is_empty());
        assert!(pending.join("abcd1234.rejected").exists());
        assert!(!pending.join("abcd1234.json").exists());
    }

    #[test]
    fn test_defer_needs_state_dir() {
        let dir = TempDir::new().unwrap();
        let pending = dir.path().join("missing").join(PENDING_DIR);
        let err = defer(&pending, &Escalation::new(AgentRole::EngineerB, "x", None)).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
