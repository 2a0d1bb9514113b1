// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy for the ledger.
//!
//! Every `dpl-*` crate returns [`DplError`] (or wraps it) from fallible
//! operations. Nothing here throws: callers get a discriminated result and,
//! for the heartbeat's asynchronous findings, a resolved observable built on
//! top of this same enum (see `dpl_engine::operation`).

use thiserror::Error;

use crate::ids::{CallId, OperationId, ParticipantId};

#[derive(Debug, Error)]
pub enum DplError {
    /// The advisory lock on an operation record could not be acquired
    /// within the acquisition deadline. Retryable by the caller.
    #[error("timed out acquiring lock for operation {operation_id} after {waited_ms}ms")]
    LockTimeout {
        operation_id: OperationId,
        waited_ms: u64,
    },

    /// The record for `operation_id` does not exist, or no longer exists
    /// (it may have completed and been archived while the caller was away).
    #[error("operation {operation_id} not found")]
    OperationNotFound { operation_id: OperationId },

    /// `leave()` was called without `cancel_pending_calls` while the
    /// session still owns open call frames.
    #[error("session {session_id} on operation {operation_id} has pending calls")]
    PendingCalls {
        operation_id: OperationId,
        session_id: String,
    },

    /// A call-tracking API referenced a `callId` that is not a live frame.
    #[error("call {call_id} not found on operation {operation_id}")]
    CallNotFound {
        operation_id: OperationId,
        call_id: CallId,
    },

    /// `createCallFrame` was asked to push a `callId` already present.
    #[error("call {call_id} already exists on operation {operation_id}")]
    DuplicateCallId {
        operation_id: OperationId,
        call_id: CallId,
    },

    /// The caller attempted an operation that its role or the record's
    /// current status forbids (e.g. `complete()` from a non-initiator, or
    /// with non-initiator frames still open).
    #[error("state mismatch on operation {operation_id}: {reason}")]
    StateMismatch {
        operation_id: OperationId,
        reason: String,
    },

    /// Surfaced via `onHeartbeatError`; advisory, not fatal to the caller.
    #[error("heartbeat observed stale participants on operation {operation_id}: {stale:?}")]
    HeartbeatStale {
        operation_id: OperationId,
        stale: Vec<ParticipantId>,
    },

    /// Surfaced via callback and via `onAbort` resolution.
    #[error("abort flag set on operation {operation_id}")]
    AbortFlagSet { operation_id: OperationId },

    /// Surfaced via `onFailure` resolution to every session.
    #[error("operation {operation_id} failed: {reason}")]
    OperationFailed {
        operation_id: OperationId,
        reason: String,
    },

    /// Any filesystem or network error not covered by a more specific
    /// variant above.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure to (de)serialize the on-disk or wire representation of a
    /// record.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl DplError {
    /// True for errors the caller may reasonably retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

pub type DplResult<T> = Result<T, DplError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_is_retryable() {
        let err = DplError::LockTimeout {
            operation_id: OperationId::from_string("op1"),
            waited_ms: 1000,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn operation_not_found_is_not_retryable() {
        let err = DplError::OperationNotFound {
            operation_id: OperationId::from_string("op1"),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn display_mentions_operation_id() {
        let err = DplError::StateMismatch {
            operation_id: OperationId::from_string("op1"),
            reason: "non-initiator frames open".to_string(),
        };
        assert!(err.to_string().contains("op1"));
    }
}
