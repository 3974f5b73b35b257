use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::state::short_id;

/// Replace `path` with `contents` so readers see either the old or the new
/// file, never a mix.
///
/// Writes a uniquely named temp file beside `path`, syncs it, then renames
/// it over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = temp_path(path);

    if let Err(e) = write_synced(&tmp_path, contents) {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::io(
            format!("failed to write temp file {}", tmp_path.display()),
            e,
        ));
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::io(
            format!("failed to replace {}", path.display()),
            e,
        ));
    }

    sync_parent(path);
    debug!(path = %path.display(), bytes = contents.len(), "atomic write completed");
    Ok(())
}

fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

// Persists the rename itself. Not available on every platform.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
                warn!(path = %parent.display(), error = %e, "failed to sync state directory");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

/// Temp file name for a write to `path`: `<name>.<pid>.<id>.tmp`.
pub fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{}.{}.{}.tmp", name, std::process::id(), short_id()))
}

/// Remove temp files left behind by writers that died before renaming.
///
/// Only safe while holding the store lock. Returns how many were removed.
pub fn remove_stale_temps(path: &Path) -> usize {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return 0;
    };
    let prefix = format!("{}.", name.to_string_lossy());

    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if file_name.starts_with(&prefix) && file_name.ends_with(".tmp") {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "failed to remove stale temp file"
                ),
            }
        }
    }
    if removed > 0 {
        warn!(dir = %dir.display(), removed, "removed interrupted state writes");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        write_atomic(&path, b"{\"a\":1}").unwrap();
        write_atomic(&path, b"{\"a\":2}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":2}");
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_write_atomic_missing_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope").join("state.json");

        let err = write_atomic(&path, b"{}").unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn test_temp_path_is_sibling_and_unique() {
        let path = Path::new("/work/.orchestra/state.json");
        let a = temp_path(path);
        let b = temp_path(path);

        assert_eq!(a.parent(), path.parent());
        assert!(a.to_string_lossy().ends_with(".tmp"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_remove_stale_temps_only_touches_own_temps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{}").unwrap();
        fs::write(dir.path().join("state.json.123.abcd1234.tmp"), "{\"ver").unwrap();
        fs::write(dir.path().join("other.json.1.x.tmp"), "").unwrap();
        fs::write(dir.path().join("conversation.md"), "log").unwrap();

        assert_eq!(remove_stale_temps(&path), 1);
        assert!(path.exists());
        assert!(dir.path().join("other.json.1.x.tmp").exists());
        assert!(dir.path().join("conversation.md").exists());
    }
}
