// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Callback structs replacing the closures-as-callbacks pattern from the
//! source system. Each field documents whether it runs synchronously or
//! asynchronously, and whether it runs on the happy path or the cleanup
//! path, so call sites don't have to guess from context.

use dpl_core::{CallId, OperationId, ParticipantId};

/// Information handed to a supervisor's `on_call_crashed` callback about
/// the frame it is being asked to acknowledge.
#[derive(Debug, Clone)]
pub struct CrashInfo {
    pub operation_id: OperationId,
    pub call_id: CallId,
    pub participant_id: ParticipantId,
    pub supervisor_handle: String,
}

/// Callbacks for a synchronous [`crate::Call`]. Both fire synchronously,
/// on whichever thread calls `end`/`fail`.
#[derive(Default)]
pub struct CallCallbacks<T> {
    /// Happy path: the call ended via `end(result)`.
    pub on_completion: Option<Box<dyn FnOnce(&T) + Send>>,
    /// Cleanup path: the call ended via `fail(..)`, was reclaimed by a
    /// cleanup rule, or was cancelled by `leave(cancel_pending_calls)`.
    pub on_cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> std::fmt::Debug for CallCallbacks<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallCallbacks")
            .field("on_completion", &self.on_completion.is_some())
            .field("on_cleanup", &self.on_cleanup.is_some())
            .finish()
    }
}

/// Callbacks for an asynchronous [`crate::SpawnedCall`]. `on_completion`
/// and `on_cleanup` fire synchronously from the background task once
/// `work` resolves; `on_call_crashed` is the supervisor's fallback-value
/// hook, invoked by a peer's heartbeat (Rule 3), not by this process.
#[derive(Default)]
pub struct SpawnedCallCallbacks<T> {
    pub on_completion: Option<Box<dyn FnOnce(&T) + Send>>,
    pub on_call_crashed: Option<Box<dyn FnOnce(&CrashInfo) -> Option<T> + Send>>,
    pub on_cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> std::fmt::Debug for SpawnedCallCallbacks<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedCallCallbacks")
            .field("on_completion", &self.on_completion.is_some())
            .field("on_call_crashed", &self.on_call_crashed.is_some())
            .field("on_cleanup", &self.on_cleanup.is_some())
            .finish()
    }
}

/// The category of an `on_heartbeat_error` callback invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatErrorKind {
    AbortFlagSet,
    HeartbeatStale { stale: Vec<ParticipantId> },
    LedgerNotFound,
}

/// Operation-wide callbacks invoked by the heartbeat task. All run
/// asynchronously, on the heartbeat's background task, and must not block
/// it for long — they are advisory notifications, not gates.
#[derive(Default)]
pub struct OperationCallbacks {
    pub on_heartbeat_success: Option<Box<dyn Fn() + Send + Sync>>,
    pub on_heartbeat_error: Option<Box<dyn Fn(&HeartbeatErrorKind) + Send + Sync>>,
}

impl std::fmt::Debug for OperationCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationCallbacks")
            .field("on_heartbeat_success", &self.on_heartbeat_success.is_some())
            .field("on_heartbeat_error", &self.on_heartbeat_error.is_some())
            .finish()
    }
}
