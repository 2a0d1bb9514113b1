// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon-level errors: startup and transport failures that wrap the
//! shared [`DplError`] rather than inventing a parallel hierarchy, matching
//! the one-`thiserror`-enum-per-crate-boundary convention this workspace
//! uses throughout.

use dpl_core::DplError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("could not resolve a state directory: no home directory and DPL_STATE_DIR unset")]
    NoStateDir,

    /// Another `dpld` instance already holds the process lock. Special-cased
    /// in `main` to print the running instance's pid instead of a raw debug
    /// dump.
    #[error("failed to acquire process lock")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind {0}: {1}")]
    BindFailed(std::net::SocketAddr, std::io::Error),

    #[error(transparent)]
    Ledger(#[from] DplError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Runtime(String),
}
