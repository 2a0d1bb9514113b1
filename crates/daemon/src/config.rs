// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Where `dpld` keeps its state on disk. Resolution order mirrors the
//! engine's own env-driven resolution: an explicit override first, then a
//! default rooted at the user's home directory.

use std::path::PathBuf;

use crate::error::DaemonError;

#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub operations_dir: PathBuf,
    pub lock_path: PathBuf,
    pub log_path: PathBuf,
    pub bind_addr: std::net::IpAddr,
    pub port: u16,
}

impl Config {
    pub fn load(bind_addr: std::net::IpAddr, port: u16) -> Result<Self, DaemonError> {
        let state_dir = resolve_state_dir()?;
        std::fs::create_dir_all(&state_dir)?;
        let operations_dir = state_dir.join("operations");
        Ok(Self {
            lock_path: state_dir.join("daemon.lock"),
            log_path: state_dir.join("daemon.log"),
            operations_dir,
            state_dir,
            bind_addr,
            port,
        })
    }
}

fn resolve_state_dir() -> Result<PathBuf, DaemonError> {
    if let Ok(dir) = std::env::var("DPL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or(DaemonError::NoStateDir)?;
    Ok(home.join(".tom").join("dpl"))
}

/// Rotate `daemon.log` once at startup if it has grown past `max_bytes`,
/// shifting `daemon.log` -> `daemon.log.1` -> `daemon.log.2`, dropping
/// anything older. Runs before the tracing subscriber is installed, so a
/// failure here is logged to stderr rather than through `tracing`.
pub fn rotate_log_if_needed(log_path: &std::path::Path, max_bytes: u64, backups: u32) {
    let Ok(metadata) = std::fs::metadata(log_path) else {
        return;
    };
    if metadata.len() < max_bytes {
        return;
    }
    for i in (1..backups).rev() {
        let from = log_path.with_extension(format!("log.{i}"));
        let to = log_path.with_extension(format!("log.{}", i + 1));
        let _ = std::fs::rename(&from, &to);
    }
    let first_backup = log_path.with_extension("log.1");
    if let Err(e) = std::fs::rename(log_path, &first_backup) {
        eprintln!("dpld: failed to rotate log file: {e}");
    }
}

/// Write a line directly to the log file, bypassing the (possibly not yet
/// installed, possibly buffered) tracing subscriber, so a crash during
/// startup is always visible.
pub fn write_startup_marker(log_path: &std::path::Path, message: &str) {
    write_direct(log_path, "INFO", message);
}

pub fn write_startup_error(log_path: &std::path::Path, message: &str) {
    write_direct(log_path, "ERROR", message);
}

fn write_direct(log_path: &std::path::Path, level: &str, message: &str) {
    use std::io::Write;
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(log_path) else {
        eprintln!("dpld: [{level}] {message}");
        return;
    };
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let _ = writeln!(file, "{now} [{level}] {message}");
}
