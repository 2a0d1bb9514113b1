// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-operation advisory lock.
//!
//! This is a file-existence protocol, not an OS-level flock: two processes
//! racing for the same operation record create the same path with
//! `create_new`, and the loser either waits out the winner's lease or
//! reclaims the file once its mtime is older than the stale threshold. This
//! lets a crashed lock-holder's lease expire without anyone needing to
//! notice the crash directly.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use dpl_core::{DplError, OperationId};

/// Tunables for the lock-acquisition protocol. Defaults match the fixed
/// values: reclaim a lock file whose mtime is more than 2s old, retry every
/// 50ms, give up after 1s total.
#[derive(Debug, Clone, Copy)]
pub struct LockConfig {
    pub stale_after: Duration,
    pub retry_interval: Duration,
    pub acquire_deadline: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(2),
            retry_interval: Duration::from_millis(50),
            acquire_deadline: Duration::from_secs(1),
        }
    }
}

/// Held lock on one operation's record. Deletes the lock file on drop.
///
/// Dropping without releasing is safe: the next acquirer will simply see a
/// live, non-stale lock file and wait, or (once it ages past
/// `stale_after`) reclaim it as if this process had crashed while holding
/// it.
#[derive(Debug)]
pub struct OperationLock {
    path: PathBuf,
    released: bool,
}

impl OperationLock {
    /// Acquire the lock at `path`, polling per `config` until
    /// `config.acquire_deadline` elapses.
    pub fn acquire(
        path: impl Into<PathBuf>,
        operation_id: &OperationId,
        config: LockConfig,
    ) -> Result<Self, DplError> {
        let path = path.into();
        let deadline = Instant::now() + config.acquire_deadline;

        loop {
            match try_create_lock_file(&path) {
                Ok(()) => return Ok(Self { path, released: false }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(&path, config.stale_after) {
                        // Best effort: if removal races with another
                        // reclaimer, the next create_new attempt below
                        // will simply fail again and we loop.
                        let _ = std::fs::remove_file(&path);
                        continue;
                    }
                }
                Err(e) => return Err(DplError::Io(e)),
            }

            if Instant::now() >= deadline {
                return Err(DplError::LockTimeout {
                    operation_id: operation_id.clone(),
                    waited_ms: config.acquire_deadline.as_millis() as u64,
                });
            }
            std::thread::sleep(config.retry_interval);
        }
    }

    pub fn release(mut self) {
        self.do_release();
    }

    fn do_release(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
            self.released = true;
        }
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        self.do_release();
    }
}

fn try_create_lock_file(path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{} {}", std::process::id(), now_epoch_ms())
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        // Already gone: treat as not our problem, the caller will retry
        // `create_new` and either win or see a fresh lock file.
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age > stale_after,
        Err(_) => false,
    }
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> LockConfig {
        LockConfig {
            stale_after: Duration::from_millis(30),
            retry_interval: Duration::from_millis(5),
            acquire_deadline: Duration::from_millis(200),
        }
    }

    #[test]
    fn acquire_then_release_allows_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("op.lock");
        let op_id = OperationId::from_string("op1");

        let lock = OperationLock::acquire(&path, &op_id, fast_config()).unwrap();
        assert!(path.exists());
        lock.release();
        assert!(!path.exists());

        let lock2 = OperationLock::acquire(&path, &op_id, fast_config()).unwrap();
        lock2.release();
    }

    #[test]
    fn concurrent_acquire_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("op.lock");
        let op_id = OperationId::from_string("op1");

        let first = OperationLock::acquire(&path, &op_id, fast_config()).unwrap();
        let path2 = path.clone();
        let op_id2 = op_id.clone();
        let handle = std::thread::spawn(move || {
            OperationLock::acquire(&path2, &op_id2, fast_config()).unwrap()
        });
        std::thread::sleep(Duration::from_millis(10));
        first.release();
        let second = handle.join().unwrap();
        second.release();
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("op.lock");
        let op_id = OperationId::from_string("op1");

        std::fs::write(&path, "99999 0").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let lock = OperationLock::acquire(&path, &op_id, fast_config()).unwrap();
        lock.release();
    }

    #[test]
    fn acquire_times_out_on_a_held_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("op.lock");
        let op_id = OperationId::from_string("op1");

        let _held = OperationLock::acquire(
            &path,
            &op_id,
            LockConfig {
                stale_after: Duration::from_secs(60),
                ..fast_config()
            },
        )
        .unwrap();

        let err = OperationLock::acquire(
            &path,
            &op_id,
            LockConfig {
                stale_after: Duration::from_secs(60),
                ..fast_config()
            },
        )
        .unwrap_err();
        assert!(matches!(err, DplError::LockTimeout { .. }));
    }
}
