// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Store: serialized read-modify-write of operation records, with a
//! backup snapshot ahead of every mutation.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use dpl_core::{DplError, OperationId, OperationRecord};
use tracing::{debug, warn};

use crate::lock::{LockConfig, OperationLock};
use crate::paths::OperationPaths;
use crate::trail;

#[derive(Debug, Clone)]
pub struct Store {
    base: PathBuf,
    lock_config: LockConfig,
}

impl Store {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            lock_config: LockConfig::default(),
        }
    }

    pub fn with_lock_config(base: impl Into<PathBuf>, lock_config: LockConfig) -> Self {
        Self {
            base: base.into(),
            lock_config,
        }
    }

    pub fn base(&self) -> &std::path::Path {
        &self.base
    }

    pub fn paths(&self, operation_id: &OperationId) -> OperationPaths {
        OperationPaths::new(self.base.clone(), operation_id.clone())
    }

    fn lock(&self, operation_id: &OperationId) -> Result<OperationLock, DplError> {
        std::fs::create_dir_all(&self.base)?;
        OperationLock::acquire(self.paths(operation_id).lock(), operation_id, self.lock_config)
    }

    /// Consistent read of the record. Holds the lock only across the read.
    pub fn read(&self, operation_id: &OperationId) -> Result<OperationRecord, DplError> {
        let _guard = self.lock(operation_id)?;
        self.read_unlocked(operation_id)
    }

    fn read_unlocked(&self, operation_id: &OperationId) -> Result<OperationRecord, DplError> {
        let path = self.paths(operation_id).live();
        match std::fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DplError::OperationNotFound {
                    operation_id: operation_id.clone(),
                })
            }
            Err(e) => Err(DplError::Io(e)),
        }
    }

    /// Exclusive initial write. Fails with `StateMismatch` if a record for
    /// this `operationId` already exists — there is no prior content to
    /// back up, so no trail snapshot is produced for the creating write
    /// itself; the live file it produces is the trail's implicit origin.
    pub fn create_initial(
        &self,
        operation_id: &OperationId,
        initial: OperationRecord,
    ) -> Result<OperationRecord, DplError> {
        let _guard = self.lock(operation_id)?;
        let paths = self.paths(operation_id);
        let live = paths.live();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&live) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(DplError::StateMismatch {
                    operation_id: operation_id.clone(),
                    reason: "operation record already exists".to_string(),
                })
            }
            Err(e) => return Err(DplError::Io(e)),
        };
        let json = serde_json::to_vec_pretty(&initial)?;
        file.write_all(&json)?;
        Ok(initial)
    }

    /// Read, transform via `f`, write. A trail snapshot of the pre-mutation
    /// bytes is produced before the new record lands.
    pub fn modify<F>(
        &self,
        operation_id: &OperationId,
        elapsed_label: &str,
        f: F,
    ) -> Result<OperationRecord, DplError>
    where
        F: FnOnce(OperationRecord) -> Result<OperationRecord, DplError>,
    {
        let _guard = self.lock(operation_id)?;
        let paths = self.paths(operation_id);
        let live = paths.live();

        let prior_bytes = std::fs::read(&live).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DplError::OperationNotFound {
                    operation_id: operation_id.clone(),
                }
            } else {
                DplError::Io(e)
            }
        })?;
        let prior: OperationRecord = serde_json::from_slice(&prior_bytes)?;

        let updated = f(prior)?;
        let new_bytes = serde_json::to_vec_pretty(&updated)?;

        trail::write_snapshot(&paths.trail_dir(), &paths.trail_snapshot(elapsed_label), &prior_bytes)?;

        write_atomic(&live, &new_bytes)?;
        debug!(operation_id = %operation_id, "wrote operation record");
        Ok(updated)
    }

    /// Copy the live record into the backup directory, tagged `final_*`.
    /// Does not remove the live file — see [`Store::purge`].
    pub fn archive(&self, operation_id: &OperationId, elapsed_label: &str) -> Result<(), DplError> {
        let _guard = self.lock(operation_id)?;
        let paths = self.paths(operation_id);
        let bytes = std::fs::read(paths.live())?;
        std::fs::create_dir_all(paths.backup_dir())?;
        std::fs::write(paths.backup_final(elapsed_label), &bytes)?;

        for log_path in [paths.log(), paths.debug_log()] {
            if log_path.exists() {
                let dest = paths
                    .backup_dir()
                    .join(log_path.file_name().expect("log path has a file name"));
                if let Err(e) = std::fs::copy(&log_path, &dest) {
                    warn!(operation_id = %operation_id, error = %e, "failed to archive log file");
                }
            }
        }
        Ok(())
    }

    /// Delete the live record file. Only meaningful after [`Store::archive`]
    /// has preserved a copy.
    pub fn purge(&self, operation_id: &OperationId) -> Result<(), DplError> {
        let _guard = self.lock(operation_id)?;
        let paths = self.paths(operation_id);
        match std::fs::remove_file(paths.live()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DplError::Io(e)),
        }
    }

    pub fn append_log(&self, operation_id: &OperationId, line: &str) -> Result<(), DplError> {
        append_line(&self.paths(operation_id).log(), line)
    }

    pub fn append_debug_log(&self, operation_id: &OperationId, line: &str) -> Result<(), DplError> {
        append_line(&self.paths(operation_id).debug_log(), line)
    }
}

fn append_line(path: &std::path::Path, line: &str) -> Result<(), DplError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Write `bytes` to `path` via a sibling temp file + rename, so a reader
/// never observes a partially written record.
fn write_atomic(path: &std::path::Path, bytes: &[u8]) -> Result<(), DplError> {
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpl_core::test_support::empty_record;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        (dir, store)
    }

    #[test]
    fn create_initial_then_read_round_trips() {
        let (_dir, store) = store();
        let op_id = OperationId::from_string("op1");
        let initial = empty_record("op1", "cli", 100);

        store.create_initial(&op_id, initial.clone()).unwrap();
        let read_back = store.read(&op_id).unwrap();
        assert_eq!(read_back.operation_id, initial.operation_id);
        assert_eq!(read_back.call_frames.len(), 1);
    }

    #[test]
    fn create_initial_twice_fails() {
        let (_dir, store) = store();
        let op_id = OperationId::from_string("op1");
        let initial = empty_record("op1", "cli", 100);

        store.create_initial(&op_id, initial.clone()).unwrap();
        let err = store.create_initial(&op_id, initial).unwrap_err();
        assert!(matches!(err, DplError::StateMismatch { .. }));
    }

    #[test]
    fn read_missing_operation_is_not_found() {
        let (_dir, store) = store();
        let op_id = OperationId::from_string("missing");
        let err = store.read(&op_id).unwrap_err();
        assert!(matches!(err, DplError::OperationNotFound { .. }));
    }

    #[test]
    fn modify_produces_a_trail_snapshot_of_the_prior_content() {
        let (_dir, store) = store();
        let op_id = OperationId::from_string("op1");
        let initial = empty_record("op1", "cli", 100);
        store.create_initial(&op_id, initial.clone()).unwrap();

        store
            .modify(&op_id, "000.042", |mut record| {
                record.aborted = true;
                Ok(record)
            })
            .unwrap();

        let paths = store.paths(&op_id);
        let snapshot_path = paths.trail_snapshot("000.042");
        assert!(snapshot_path.exists());
        let snapshot: OperationRecord = serde_json::from_slice(&std::fs::read(snapshot_path).unwrap()).unwrap();
        assert!(!snapshot.aborted, "snapshot captures pre-mutation state");

        let current = store.read(&op_id).unwrap();
        assert!(current.aborted);
    }

    #[test]
    fn archive_copies_without_deleting_live_file() {
        let (_dir, store) = store();
        let op_id = OperationId::from_string("op1");
        store.create_initial(&op_id, empty_record("op1", "cli", 100)).unwrap();

        store.archive(&op_id, "001.000").unwrap();
        assert!(store.paths(&op_id).backup_final("001.000").exists());
        assert!(store.paths(&op_id).live().exists());
    }

    #[test]
    fn purge_deletes_the_live_file() {
        let (_dir, store) = store();
        let op_id = OperationId::from_string("op1");
        store.create_initial(&op_id, empty_record("op1", "cli", 100)).unwrap();

        store.purge(&op_id).unwrap();
        assert!(!store.paths(&op_id).live().exists());
    }

    #[test]
    fn append_log_creates_file_and_appends_lines() {
        let (_dir, store) = store();
        let op_id = OperationId::from_string("op1");
        store.append_log(&op_id, "line one").unwrap();
        store.append_log(&op_id, "line two").unwrap();

        let contents = std::fs::read_to_string(store.paths(&op_id).log()).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
