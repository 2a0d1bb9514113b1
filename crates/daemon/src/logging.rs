// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Installs the process-wide `tracing` subscriber. Called exactly once,
//! from `main`, never from library code.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::DaemonError;

/// Builds a non-blocking file writer at `<state_dir>/daemon.log` and
/// installs it as the global subscriber. The returned [`WorkerGuard`] must
/// be held for the process's lifetime — dropping it early stops the
/// background flush thread and the last few log lines can be lost.
pub fn setup_logging(log_path: &std::path::Path) -> Result<WorkerGuard, DaemonError> {
    let dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let file_name = log_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("daemon.log");
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}
