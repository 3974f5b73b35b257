//! Advisory exclusive lock serializing writers across processes.
//!
//! Held for exactly one read-modify-write cycle. Readers never take it.
//!
//! On unix the lock is `flock(2)` on `state.lock`, which the kernel releases
//! when the holder exits, crashed or not. Elsewhere ownership is a
//! `state.lock.held` marker file holding the owner's pid. A holder that dies
//! without dropping its guard leaves the marker behind, and every later
//! writer reports `StoreBusy` until the marker is deleted by hand; the pid
//! in it names the process to check first.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, StoreError};

/// Guard for the store lock; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock at `path`, polling every `poll` until `timeout`.
    ///
    /// Fails with `StoreBusy` once the timeout passes. Never blocks longer.
    pub fn acquire(path: &Path, timeout: Duration, poll: Duration) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                StoreError::io(format!("failed to open lock file {}", path.display()), e)
            })?;

        let started = Instant::now();
        loop {
            let acquired = try_lock(&file, path).map_err(|e| {
                StoreError::io(format!("failed to lock {}", path.display()), e)
            })?;
            if acquired {
                let waited_ms = started.elapsed().as_millis() as u64;
                debug!(path = %path.display(), waited_ms, "acquired store lock");
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(StoreError::StoreBusy {
                    path: path.to_path_buf(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            thread::sleep(poll.min(timeout - waited));
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        unlock(&self.file, &self.path);
        debug!(path = %self.path.display(), "released store lock");
    }
}

#[cfg(unix)]
fn try_lock(file: &File, _path: &Path) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(code) if code == libc::EWOULDBLOCK || code == libc::EINTR => Ok(false),
        _ => Err(err),
    }
}

#[cfg(unix)]
fn unlock(file: &File, _path: &Path) {
    use std::os::unix::io::AsRawFd;

    // Closing the descriptor releases the lock too.
    unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
}

// Without flock, ownership is a marker file created exclusively next to the
// lock file, holding the owner's pid.
#[cfg(not(unix))]
fn try_lock(_file: &File, path: &Path) -> io::Result<bool> {
    use std::io::Write;

    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(held_marker(path))
    {
        Ok(mut marker) => match marker.write_all(std::process::id().to_string().as_bytes()) {
            Ok(()) => Ok(true),
            Err(e) => {
                let _ = std::fs::remove_file(held_marker(path));
                Err(e)
            }
        },
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let holder = std::fs::read_to_string(held_marker(path)).unwrap_or_default();
            debug!(path = %path.display(), holder = %holder.trim(), "store lock held");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn unlock(_file: &File, path: &Path) {
    let _ = std::fs::remove_file(held_marker(path));
}

#[cfg(not(unix))]
fn held_marker(path: &Path) -> PathBuf {
    path.with_extension("lock.held")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.lock");

        let lock = StoreLock::acquire(&path, Duration::from_millis(100), Duration::from_millis(5))
            .unwrap();
        assert_eq!(lock.path(), path.as_path());
        drop(lock);

        // Re-acquirable once released
        StoreLock::acquire(&path, Duration::from_millis(100), Duration::from_millis(5)).unwrap();
    }

    #[test]
    fn test_contended_lock_reports_busy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.lock");

        let _held =
            StoreLock::acquire(&path, Duration::from_millis(100), Duration::from_millis(5))
                .unwrap();
        let err = StoreLock::acquire(&path, Duration::from_millis(50), Duration::from_millis(5))
            .unwrap_err();

        match err {
            StoreError::StoreBusy { waited_ms, .. } => assert!(waited_ms >= 50),
            other => panic!("expected StoreBusy, got {other:?}"),
        }
    }

    #[test]
    fn test_waiter_gets_lock_after_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.lock");

        let held =
            StoreLock::acquire(&path, Duration::from_millis(100), Duration::from_millis(5))
                .unwrap();
        let waiter_path = path.clone();
        let waiter = thread::spawn(move || {
            StoreLock::acquire(&waiter_path, Duration::from_secs(5), Duration::from_millis(5))
                .map(|_| ())
        });

        thread::sleep(Duration::from_millis(50));
        drop(held);
        assert!(waiter.join().unwrap().is_ok());
    }

    #[cfg(not(unix))]
    #[test]
    fn test_marker_names_holder_pid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.lock");

        let held =
            StoreLock::acquire(&path, Duration::from_millis(100), Duration::from_millis(5))
                .unwrap();
        let marker = held_marker(&path);
        assert_eq!(
            std::fs::read_to_string(&marker).unwrap(),
            std::process::id().to_string()
        );

        drop(held);
        assert!(!marker.exists());
    }

    #[cfg(not(unix))]
    #[test]
    fn test_leftover_marker_keeps_store_busy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.lock");
        std::fs::write(held_marker(&path), "4242").unwrap();

        let err = StoreLock::acquire(&path, Duration::from_millis(20), Duration::from_millis(5))
            .unwrap_err();
        assert!(err.is_busy());
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("state.lock");

        let err = StoreLock::acquire(&path, Duration::from_millis(10), Duration::from_millis(5))
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
