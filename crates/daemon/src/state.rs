// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-side state: the process-wide `Ledger` plus a registry mapping a
//! remote client's `(operationId, sessionId)` pair back onto the in-process
//! `Operation` handle the ledger produced for it. The `Ledger` itself keeps
//! an equivalent table for its own purposes (releasing handles on
//! `dispose`), but does not expose a lookup — over the wire, every request
//! after `create`/`join` needs to find the handle again, so the daemon
//! keeps its own.

use std::collections::HashMap;
use std::sync::Arc;

use dpl_core::OperationId;
use dpl_engine::{Ledger, Operation};
use parking_lot::Mutex;

pub struct AppState {
    pub ledger: Arc<Ledger>,
    sessions: Mutex<HashMap<(OperationId, u64), Operation>>,
    pub started_at_ms: u64,
}

impl AppState {
    pub fn new(ledger: Arc<Ledger>, started_at_ms: u64) -> Self {
        Self {
            ledger,
            sessions: Mutex::new(HashMap::new()),
            started_at_ms,
        }
    }

    pub fn register(&self, operation: Operation) {
        let key = (operation.operation_id().clone(), operation.session_id().as_u64());
        self.sessions.lock().insert(key, operation);
    }

    pub fn lookup(&self, operation_id: &OperationId, session_id: u64) -> Option<Operation> {
        self.sessions.lock().get(&(operation_id.clone(), session_id)).cloned()
    }

    pub fn forget(&self, operation_id: &OperationId, session_id: u64) {
        self.sessions.lock().remove(&(operation_id.clone(), session_id));
    }

    /// Any session registered under `operation_id`, regardless of which one
    /// — used by handlers that only need *an* in-process handle on the
    /// operation (heartbeat, abort, state, log) rather than a specific
    /// session's.
    pub fn any_session(&self, operation_id: &OperationId) -> Option<Operation> {
        self.sessions
            .lock()
            .values()
            .find(|op| op.operation_id() == operation_id)
            .cloned()
    }

    pub fn operation_count(&self) -> usize {
        self.ledger.operation_count()
    }
}
