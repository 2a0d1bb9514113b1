// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File layout for one operation's footprint under the store's base
//! directory.

use std::path::{Path, PathBuf};

use dpl_core::OperationId;

/// Resolves every path a single operation touches under `base`.
///
/// Layout:
/// - `<base>/<operationId>.operation.json` — the live document.
/// - `<base>/<operationId>.operation.json.lock` — advisory lock file.
/// - `<base>/<operationId>.operation.log` — append-only human log.
/// - `<base>/<operationId>.operation.debug.log` — append-only debug log.
/// - `<base>/<operationId>_trail/<SSS.mmm>_<operationId>.json` — one
///   snapshot per mutation.
/// - `<base>/backup/<operationId>/` — destination for the final snapshot
///   and logs once the operation terminates.
#[derive(Debug, Clone)]
pub struct OperationPaths {
    base: PathBuf,
    operation_id: OperationId,
}

impl OperationPaths {
    pub fn new(base: impl Into<PathBuf>, operation_id: OperationId) -> Self {
        Self {
            base: base.into(),
            operation_id,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn operation_id(&self) -> &OperationId {
        &self.operation_id
    }

    pub fn live(&self) -> PathBuf {
        self.base
            .join(format!("{}.operation.json", self.operation_id))
    }

    pub fn lock(&self) -> PathBuf {
        self.base
            .join(format!("{}.operation.json.lock", self.operation_id))
    }

    pub fn log(&self) -> PathBuf {
        self.base
            .join(format!("{}.operation.log", self.operation_id))
    }

    pub fn debug_log(&self) -> PathBuf {
        self.base
            .join(format!("{}.operation.debug.log", self.operation_id))
    }

    pub fn trail_dir(&self) -> PathBuf {
        self.base.join(format!("{}_trail", self.operation_id))
    }

    pub fn trail_snapshot(&self, elapsed_label: &str) -> PathBuf {
        self.trail_dir()
            .join(format!("{}_{}.json", elapsed_label, self.operation_id))
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.base.join("backup").join(self.operation_id.as_str())
    }

    pub fn backup_final(&self, elapsed_label: &str) -> PathBuf {
        self.backup_dir()
            .join(format!("final_{}_{}.json", elapsed_label, self.operation_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_path_embeds_operation_id() {
        let paths = OperationPaths::new("/base", OperationId::from_string("op1"));
        assert_eq!(paths.live(), PathBuf::from("/base/op1.operation.json"));
        assert_eq!(paths.lock(), PathBuf::from("/base/op1.operation.json.lock"));
    }

    #[test]
    fn trail_snapshot_sorts_lexicographically() {
        let paths = OperationPaths::new("/base", OperationId::from_string("op1"));
        let early = paths.trail_snapshot("000.042");
        let late = paths.trail_snapshot("001.100");
        assert!(early < late);
    }

    #[test]
    fn backup_dir_scoped_per_operation() {
        let paths = OperationPaths::new("/base", OperationId::from_string("op1"));
        assert_eq!(paths.backup_dir(), PathBuf::from("/base/backup/op1"));
    }
}
