// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable operation record — the one document per operation that the
//! store reads, mutates, and backs up.
//!
//! `OperationRecord` is the on-disk schema. It carries no behaviour beyond
//! simple queries and the mutations the storage layer needs to perform
//! under lock; sequencing (heartbeat ticks, cleanup rules) lives in
//! `dpl_engine`. Unknown fields are preserved across a read-modify-write
//! cycle via `#[serde(flatten)]` on a catch-all map, so a record written by
//! a newer binary survives being round-tripped by an older one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{CallId, OperationId, ParticipantId};
use crate::simple_display;

/// Lifecycle status of an operation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Running,
    Cleanup,
    Completed,
    Failed,
}

simple_display! {
    OperationStatus {
        Running => "running",
        Cleanup => "cleanup",
        Completed => "completed",
        Failed => "failed",
    }
}

/// Lifecycle state of one call frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameState {
    Active,
    Crashed,
    CleanedUp,
}

simple_display! {
    FrameState {
        Active => "active",
        Crashed => "crashed",
        CleanedUp => "cleaned_up",
    }
}

/// One entry in `callFrames`: an in-flight (or tombstoned) unit of work
/// owned by a session.
///
/// `callId` is unique within an operation. A frame may only be in
/// [`FrameState::Crashed`] after its owning participant has been declared
/// stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub participant_id: ParticipantId,
    pub call_id: CallId,
    pub pid: u32,
    /// Epoch milliseconds the frame was pushed, per [`crate::Clock::epoch_ms`].
    pub start_time_ms: u64,
    pub state: FrameState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_id: Option<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_handle: Option<String>,
}

impl Frame {
    pub fn is_supervised(&self) -> bool {
        self.supervisor_id.is_some()
    }
}

/// One entry in `participants`: a process holding at least one session on
/// the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: ParticipantId,
    pub pid: u32,
    /// Epoch milliseconds of the last heartbeat this participant sent.
    pub last_seen_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_id: Option<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_handle: Option<String>,
}

/// A filesystem path registered by a process as needing cleanup, owned by
/// that process's PID until it is unregistered, the operation terminates,
/// or the signal bridge deletes it on exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempResource {
    pub path: String,
    pub owner_pid: u32,
    pub registered_at_ms: u64,
}

/// The one durable document per operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation_id: OperationId,
    pub status: OperationStatus,
    #[serde(default)]
    pub aborted: bool,
    /// Epoch milliseconds the operation was created; elapsed-time formatting
    /// for trail filenames is computed relative to this via
    /// [`crate::format_elapsed_ms`].
    pub start_time_ms: u64,
    pub last_heartbeat_ms: u64,
    #[serde(default)]
    pub call_frames: Vec<Frame>,
    #[serde(default)]
    pub temp_resources: Vec<TempResource>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Consecutive heartbeat ticks observed while `status` has sat in a
    /// terminal state. Reset to 0 whenever `status` is non-terminal; once it
    /// reaches 3 the heartbeat engine archives and purges the record.
    #[serde(default)]
    pub terminal_ticks: u32,
    /// Fields written by a newer binary that this one does not recognize.
    /// Preserved verbatim across read-modify-write so upgrading one
    /// participant's binary does not corrupt the record for its peers.
    #[serde(flatten)]
    pub unknown_fields: BTreeMap<String, serde_json::Value>,
}

impl OperationRecord {
    /// Index of the frame with the given `callId`, searching from the top
    /// of the stack (the end of the vector) since the same `callId` is
    /// never pushed twice while one instance is live.
    pub fn frame_index(&self, call_id: &CallId) -> Option<usize> {
        self.call_frames
            .iter()
            .rposition(|f| &f.call_id == call_id)
    }

    pub fn frame(&self, call_id: &CallId) -> Option<&Frame> {
        self.frame_index(call_id).map(|i| &self.call_frames[i])
    }

    pub fn participant(&self, participant_id: &ParticipantId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| &p.participant_id == participant_id)
    }

    pub fn participant_mut(&mut self, participant_id: &ParticipantId) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| &p.participant_id == participant_id)
    }

    /// Frames whose owning participant is no longer present in
    /// `participants` — a violation of invariant 4, checked by tests and by
    /// the cleanup engine's self-diagnostics.
    pub fn orphaned_frames(&self) -> Vec<&Frame> {
        self.call_frames
            .iter()
            .filter(|f| self.participant(&f.participant_id).is_none())
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, OperationStatus::Completed | OperationStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame(call_id: &str) -> Frame {
        Frame {
            participant_id: ParticipantId::new("cli"),
            call_id: CallId::new(call_id),
            pid: 100,
            start_time_ms: 0,
            state: FrameState::Active,
            supervisor_id: None,
            supervisor_handle: None,
        }
    }

    fn sample_record() -> OperationRecord {
        OperationRecord {
            operation_id: OperationId::from_string("op1"),
            status: OperationStatus::Running,
            aborted: false,
            start_time_ms: 0,
            last_heartbeat_ms: 0,
            call_frames: vec![sample_frame("root")],
            temp_resources: vec![],
            participants: vec![Participant {
                participant_id: ParticipantId::new("cli"),
                pid: 100,
                last_seen_ms: 0,
                supervisor_id: None,
                supervisor_handle: None,
            }],
            description: None,
            terminal_ticks: 0,
            unknown_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn frame_index_finds_topmost_match() {
        let record = sample_record();
        assert_eq!(record.frame_index(&CallId::new("root")), Some(0));
        assert!(record.frame_index(&CallId::new("missing")).is_none());
    }

    #[test]
    fn orphaned_frames_catches_missing_participant() {
        let mut record = sample_record();
        record.participants.clear();
        assert_eq!(record.orphaned_frames().len(), 1);
    }

    #[test]
    fn unknown_fields_round_trip() {
        let mut record = sample_record();
        record
            .unknown_fields
            .insert("futureField".to_string(), serde_json::json!("kept"));
        let json = serde_json::to_string(&record).unwrap();
        let back: OperationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.unknown_fields.get("futureField"),
            Some(&serde_json::json!("kept"))
        );
    }

    #[test]
    fn status_display_matches_schema_spelling() {
        assert_eq!(OperationStatus::Cleanup.to_string(), "cleanup");
        assert_eq!(FrameState::CleanedUp.to_string(), "cleaned_up");
    }

    /// A record round-tripped through JSON should compare equal to the one
    /// that went in. `similar_asserts::assert_eq!` gives a field-by-field
    /// diff instead of a blank boolean when that ever regresses.
    #[test]
    fn round_tripped_record_matches_the_original_field_for_field() {
        let original = sample_record();
        let json = serde_json::to_string(&original).unwrap();
        let restored: OperationRecord = serde_json::from_str(&json).unwrap();
        similar_asserts::assert_eq!(original, restored);
    }
}
