// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup trail: a byte-identical copy of the live record written before
//! every mutation lands, named by elapsed time from `startTime` so a
//! directory listing sorts into chronological order.

use std::path::Path;

use dpl_core::DplError;

/// Write `contents` (the live file's bytes as they were immediately before
/// the in-flight mutation) into the trail directory under a name tagged
/// with `elapsed_label`.
pub fn write_snapshot(trail_dir: &Path, snapshot_path: &Path, contents: &[u8]) -> Result<(), DplError> {
    std::fs::create_dir_all(trail_dir)?;
    std::fs::write(snapshot_path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_byte_identical_to_source() {
        let dir = tempfile::tempdir().unwrap();
        let trail_dir = dir.path().join("op1_trail");
        let snapshot_path = trail_dir.join("000.042_op1.json");
        let source = br#"{"operationId":"op1"}"#;

        write_snapshot(&trail_dir, &snapshot_path, source).unwrap();

        let written = std::fs::read(&snapshot_path).unwrap();
        assert_eq!(written, source);
    }

    #[test]
    fn creates_trail_directory_if_missing() {
        let dir = tempfile::tempdir().unwrap();
        let trail_dir = dir.path().join("nested").join("op1_trail");
        let snapshot_path = trail_dir.join("000.000_op1.json");

        write_snapshot(&trail_dir, &snapshot_path, b"{}").unwrap();
        assert!(snapshot_path.exists());
    }
}
