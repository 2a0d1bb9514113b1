// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use std::collections::BTreeMap;

use crate::ids::{CallId, OperationId, ParticipantId};
use crate::record::{Frame, FrameState, OperationRecord, OperationStatus, Participant};

/// Fixed epoch-ms reference instant used by every factory below, so tests
/// that compare timestamps don't depend on wall-clock time.
pub const SAMPLE_EPOCH_MS: u64 = 1_767_225_600_000;

pub fn frame(call_id: &str, participant_id: &str, pid: u32) -> Frame {
    Frame {
        participant_id: ParticipantId::new(participant_id),
        call_id: CallId::new(call_id),
        pid,
        start_time_ms: SAMPLE_EPOCH_MS,
        state: FrameState::Active,
        supervisor_id: None,
        supervisor_handle: None,
    }
}

pub fn supervised_frame(call_id: &str, participant_id: &str, pid: u32, supervisor_id: &str) -> Frame {
    Frame {
        supervisor_id: Some(ParticipantId::new(supervisor_id)),
        supervisor_handle: Some(format!("handle-{call_id}")),
        ..frame(call_id, participant_id, pid)
    }
}

pub fn participant(participant_id: &str, pid: u32) -> Participant {
    Participant {
        participant_id: ParticipantId::new(participant_id),
        pid,
        last_seen_ms: SAMPLE_EPOCH_MS,
        supervisor_id: None,
        supervisor_handle: None,
    }
}

/// A minimal, schema-valid record with one initiator frame and no
/// participants — callers add participants/frames as the scenario needs.
pub fn empty_record(operation_id: &str, initiator: &str, initiator_pid: u32) -> OperationRecord {
    OperationRecord {
        operation_id: OperationId::from_string(operation_id),
        status: OperationStatus::Running,
        aborted: false,
        start_time_ms: SAMPLE_EPOCH_MS,
        last_heartbeat_ms: SAMPLE_EPOCH_MS,
        call_frames: vec![frame(CallId::ROOT, initiator, initiator_pid)],
        temp_resources: vec![],
        participants: vec![participant(initiator, initiator_pid)],
        description: None,
        terminal_ticks: 0,
        unknown_fields: BTreeMap::new(),
    }
}
