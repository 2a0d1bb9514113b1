// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide SIGINT/SIGTERM handler.
//!
//! One `SignalBridge` per process, installed on first use. On signal it
//! runs every registered cleanup callback (swallowing and logging errors,
//! since cleanup must always complete) and exits with status 0. Installing
//! twice or signalling twice are both no-ops.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

type Callback = Box<dyn Fn() + Send + Sync>;

/// A process-wide registry of exit-time cleanup callbacks, wired to SIGINT
/// and SIGTERM exactly once per process.
pub struct SignalBridge {
    callbacks: Mutex<Vec<(u64, Callback)>>,
    next_id: AtomicU64,
    installed: AtomicBool,
    triggered: Arc<AtomicBool>,
}

impl Default for SignalBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBridge {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            installed: AtomicBool::new(false),
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a cleanup callback, returning an opaque id for
    /// [`SignalBridge::unregister`]. Runs on the signal-handling task, not
    /// the registering thread, so it must not block for long.
    pub fn register(&self, callback: Callback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.callbacks.lock().push((id, callback));
        id
    }

    pub fn unregister(&self, id: u64) {
        self.callbacks.lock().retain(|(cb_id, _)| *cb_id != id);
    }

    /// Install SIGINT/SIGTERM handlers on a background task. Idempotent:
    /// calling more than once on the same instance is a no-op after the
    /// first call wins.
    pub fn install(self: &Arc<Self>) {
        if self.installed.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "failed to install SIGINT handler");
                    return;
                }
            };
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = sigint.recv() => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
            this.trigger();
            std::process::exit(0);
        });
    }

    /// Run every registered callback once. Exposed separately from
    /// `install` so tests can exercise the cleanup path without sending a
    /// real signal or calling `process::exit`.
    pub fn trigger(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return;
        }
        for (id, callback) in self.callbacks.lock().iter() {
            callback();
            let _ = id;
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}
