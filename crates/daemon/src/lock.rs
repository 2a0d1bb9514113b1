// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-singleton lock so two `dpld` instances never fight over the
//! same state directory. Grounded on the engine's companion daemon
//! process's own startup lock: open the lock file without truncating (a
//! failed acquisition must never wipe the running instance's pid), take an
//! OS-level exclusive lock via `fs2`, and only then write our pid.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};

use fs2::FileExt;

use crate::error::DaemonError;

/// Holds the open, locked file for the process's lifetime. The OS releases
/// the lock when this (and the process) drops, so an unclean exit never
/// leaves a stale lock behind the way the on-disk advisory lock's
/// mtime-based reclaim has to handle.
pub struct ProcessLock {
    #[allow(dead_code)]
    file: File,
}

impl ProcessLock {
    pub fn acquire(path: &std::path::Path) -> Result<Self, DaemonError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive().map_err(DaemonError::LockFailed)?;

        file.set_len(0)?;
        use std::io::Seek;
        file.seek(std::io::SeekFrom::Start(0))?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self { file })
    }
}

/// Read back the pid written by whichever process currently holds
/// `path`, for the "already running, pid: N" message `main` prints when
/// [`DaemonError::LockFailed`] is returned.
pub fn read_running_pid(path: &std::path::Path) -> Option<u32> {
    let mut contents = String::new();
    File::open(path).ok()?.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}
