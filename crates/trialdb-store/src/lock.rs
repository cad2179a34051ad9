use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::warn;

use crate::error::{StoreError, StoreResult};

/// How often a blocked acquisition re-polls the lock.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Cross-process mutual exclusion scoped to one backing file.
///
/// The lock is an advisory exclusive lock on a sibling `<path>.lock` file.
/// Acquisition polls with a bounded timeout and fails with
/// [`StoreError::LockTimeout`] rather than blocking forever. A disabled
/// lock (non-eager stores, which assume single-writer access) hands out
/// no-op guards.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    timeout: Duration,
    enabled: bool,
}

impl StoreLock {
    pub fn new(path: PathBuf, timeout: Duration, enabled: bool) -> Self {
        Self {
            path,
            timeout,
            enabled,
        }
    }

    /// Acquire the lock, polling until the timeout elapses.
    ///
    /// The returned guard releases on drop, so every exit path — early
    /// return, `?`, panic unwind — releases the lock.
    pub fn acquire(&self) -> StoreResult<LockGuard> {
        if !self.enabled {
            return Ok(LockGuard { file: None });
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)?;
        let contended = fs2::lock_contended_error();
        let deadline = Instant::now() + self.timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(LockGuard { file: Some(file) }),
                Err(err) if err.raw_os_error() == contended.raw_os_error() => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::LockTimeout {
                            path: self.path.clone(),
                            waited: self.timeout,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// RAII guard for an acquired [`StoreLock`].
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(err) = file.unlock() {
                warn!(error = %err, "failed to release store lock");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = StoreLock::new(dir.path().join("db.json.lock"), Duration::from_secs(1), true);
        let guard = lock.acquire().unwrap();
        drop(guard);
        // Re-acquirable after release.
        lock.acquire().unwrap();
    }

    #[test]
    fn contended_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json.lock");
        let lock_a = StoreLock::new(path.clone(), Duration::from_millis(100), true);
        let lock_b = StoreLock::new(path, Duration::from_millis(100), true);

        let _held = lock_a.acquire().unwrap();
        let err = lock_b.acquire().unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }), "got: {err}");
    }

    #[test]
    fn disabled_lock_is_noop() {
        let lock = StoreLock::new(PathBuf::from("/nonexistent/dir/x.lock"), Duration::ZERO, false);
        lock.acquire().unwrap();
    }
}
