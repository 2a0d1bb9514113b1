// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The cleanup engine: four independent, state-driven rules plus
//! stack-aware frame removal. There is no orchestrator here — each
//! function is a pure transformation invoked by whichever heartbeat tick
//! or explicit call observes the triggering condition; the caller decides
//! when to apply them and writes the result back through the store.

use dpl_core::record::{Frame, FrameState, OperationRecord, OperationStatus};
use dpl_core::{CallId, DplError, ParticipantId};

/// Remove `call_id`'s frame, honoring stack-aware semantics: if `call_id`
/// is not the top of the stack but every frame pushed after it is
/// [`FrameState::Crashed`], the whole consecutive run from `call_id` to the
/// top is removed in one shot. If a live (non-crashed) frame sits above
/// `call_id`, only `call_id` itself is removed and the caller's own
/// invariants (it should only ever target its own top frame in that case)
/// are its responsibility.
pub fn remove_frame_stack_aware(
    record: &mut OperationRecord,
    call_id: &CallId,
) -> Result<Vec<Frame>, DplError> {
    let Some(index) = record.frame_index(call_id) else {
        return Err(DplError::CallNotFound {
            operation_id: record.operation_id.clone(),
            call_id: call_id.clone(),
        });
    };

    let above_all_crashed = record.call_frames[index + 1..]
        .iter()
        .all(|f| f.state == FrameState::Crashed);

    let removed = if above_all_crashed {
        record.call_frames.split_off(index)
    } else {
        vec![record.call_frames.remove(index)]
    };

    Ok(removed)
}

/// Participants whose `last_seen_ms` age exceeds `staleness_ms` as of `now_ms`
/// — candidates for Rule 2 (unsupervised reclaim) and Rule 4 (dead
/// supervisor). `now_ms` comes from [`dpl_core::Clock::epoch_ms`].
pub fn stale_participant_ids(record: &OperationRecord, now_ms: u64, staleness_ms: u64) -> Vec<ParticipantId> {
    record
        .participants
        .iter()
        .filter(|p| now_ms.saturating_sub(p.last_seen_ms) > staleness_ms)
        .map(|p| p.participant_id.clone())
        .collect()
}

/// Outcome of one application of Rules 2/3/4 against a set of stale
/// participant ids.
#[derive(Debug, Default)]
pub struct ReclaimOutcome {
    pub removed_frames: Vec<Frame>,
    pub removed_participants: Vec<ParticipantId>,
    /// Frames left in `crashed` state, naming a supervisor that is itself
    /// alive — Rule 3 candidates the caller must hand to that supervisor's
    /// `on_call_crashed` callback before removing them.
    pub awaiting_supervisor_ack: Vec<Frame>,
}

/// Apply Rule 2 (unsupervised reclaim) and Rule 4 (dead supervisor) for the
/// given `stale` participant ids in one pass, mutating `record` in place.
/// Rule 3's supervised frames are left untouched here — see
/// [`crashed_frames_for_supervisor`] and [`acknowledge_supervised_crash`].
pub fn reclaim_stale_participants(record: &mut OperationRecord, stale: &[ParticipantId]) -> ReclaimOutcome {
    let mut outcome = ReclaimOutcome::default();
    if stale.is_empty() {
        return outcome;
    }

    // Mark frames owned by a stale participant as crashed so Rule 3's scan
    // (and any concurrent observer) sees them before removal.
    for frame in record.call_frames.iter_mut() {
        if stale.contains(&frame.participant_id) {
            frame.state = FrameState::Crashed;
        }
    }

    // Rule 2: unsupervised frames owned by a stale participant go away
    // immediately. Rule 4: frames owned by anyone, naming a now-stale
    // participant as supervisor, also go away immediately (the supervisor
    // can no longer acknowledge them).
    let mut call_ids_to_remove: Vec<CallId> = record
        .call_frames
        .iter()
        .filter(|f| {
            let unsupervised_and_dead = stale.contains(&f.participant_id) && !f.is_supervised();
            let supervisor_is_dead = f
                .supervisor_id
                .as_ref()
                .map(|sup| stale.contains(sup))
                .unwrap_or(false);
            unsupervised_and_dead || supervisor_is_dead
        })
        .map(|f| f.call_id.clone())
        .collect();

    // Remove from the top of the stack down so stack-aware removal never
    // operates on an index invalidated by an earlier removal in this pass.
    call_ids_to_remove.sort_by_key(|id| std::cmp::Reverse(record.frame_index(id)));
    for call_id in &call_ids_to_remove {
        if record.frame_index(call_id).is_none() {
            continue; // already removed by a preceding stack-aware cascade
        }
        if let Ok(removed) = remove_frame_stack_aware(record, call_id) {
            outcome.removed_frames.extend(removed);
        }
    }

    outcome.awaiting_supervisor_ack = record
        .call_frames
        .iter()
        .filter(|f| f.state == FrameState::Crashed && f.is_supervised())
        .cloned()
        .collect();

    record.participants.retain(|p| !stale.contains(&p.participant_id));
    outcome.removed_participants = stale.to_vec();

    outcome
}

/// Rule 3: frames in `crashed` state whose `supervisorId` matches
/// `supervisor_id` and have not yet been acknowledged.
pub fn crashed_frames_for_supervisor<'a>(
    record: &'a OperationRecord,
    supervisor_id: &ParticipantId,
) -> Vec<&'a Frame> {
    record
        .call_frames
        .iter()
        .filter(|f| f.state == FrameState::Crashed && f.supervisor_id.as_ref() == Some(supervisor_id))
        .collect()
}

/// Remove a frame once its supervisor's `on_call_crashed` callback has run
/// and returned. Uses stack-aware removal so an acknowledged frame can
/// still unwind frames crashed above it.
pub fn acknowledge_supervised_crash(record: &mut OperationRecord, call_id: &CallId) -> Result<Vec<Frame>, DplError> {
    remove_frame_stack_aware(record, call_id)
}

/// Recompute `status` after a cleanup-triggering write: moves to
/// `cleanup` while frames remain after a reclaim, and to `failed` once the
/// stack is empty and the operation was already in `cleanup`.
pub fn recompute_status_after_cleanup(record: &mut OperationRecord, any_reclaim_happened: bool) {
    if record.status == OperationStatus::Cleanup && record.call_frames.is_empty() {
        record.status = OperationStatus::Failed;
    } else if any_reclaim_happened && record.status == OperationStatus::Running {
        record.status = OperationStatus::Cleanup;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpl_core::test_support::{frame, participant, supervised_frame};

    fn record_with_frames(frames: Vec<Frame>) -> OperationRecord {
        let mut record = dpl_core::test_support::empty_record("op1", "cli", 1);
        record.call_frames = frames;
        record
    }

    #[test]
    fn stack_aware_removal_cascades_through_crashed_frames_above() {
        let mut cli_root = frame("cliRoot", "cli", 1);
        cli_root.state = FrameState::Active;
        let mut bridge = frame("bridge", "bridge", 2);
        bridge.state = FrameState::Crashed;
        let mut vscode = frame("vscode", "vscode", 3);
        vscode.state = FrameState::Crashed;

        let mut record = record_with_frames(vec![cli_root, bridge, vscode]);

        let removed = remove_frame_stack_aware(&mut record, &CallId::new("cliRoot")).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(record.call_frames.is_empty());
    }

    #[test]
    fn stack_aware_removal_stops_at_a_live_frame_above() {
        let base = frame("base", "cli", 1);
        let mut live_above = frame("live", "cli", 1);
        live_above.state = FrameState::Active;

        let mut record = record_with_frames(vec![base, live_above]);
        let removed = remove_frame_stack_aware(&mut record, &CallId::new("base")).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(record.call_frames.len(), 1);
        assert_eq!(record.call_frames[0].call_id.as_str(), "live");
    }

    #[test]
    fn missing_frame_is_call_not_found() {
        let mut record = record_with_frames(vec![]);
        let err = remove_frame_stack_aware(&mut record, &CallId::new("missing")).unwrap_err();
        assert!(matches!(err, DplError::CallNotFound { .. }));
    }

    /// Table over Rules 2-4's removal outcome, keyed by which side of the
    /// supervision relationship (if any) is the one that went stale.
    #[yare::parameterized(
        rule2_unsupervised_owner_stale = { "worker", None, "worker", 1 },
        rule3_supervised_owner_stale_supervisor_alive = { "worker", Some("bridge"), "worker", 0 },
        rule4_supervisor_stale_owner_alive = { "worker", Some("bridge"), "bridge", 1 },
    )]
    fn rule_matrix_removal_outcome(owner: &str, supervisor: Option<&str>, stale_id: &str, expected_removed: usize) {
        let frame = match supervisor {
            Some(sup) => supervised_frame("c", owner, 5, sup),
            None => frame("c", owner, 5),
        };
        let mut record = record_with_frames(vec![frame]);
        record.participants.push(participant(owner, 5));
        if let Some(sup) = supervisor {
            record.participants.push(participant(sup, 6));
        }

        let outcome = reclaim_stale_participants(&mut record, &[ParticipantId::new(stale_id)]);
        assert_eq!(outcome.removed_frames.len(), expected_removed);
    }

    #[test]
    fn rule2_removes_unsupervised_frame_and_participant_of_a_stale_peer() {
        let mut record = record_with_frames(vec![frame("c2", "worker", 5)]);
        record.participants.push(participant("worker", 5));

        let outcome = reclaim_stale_participants(&mut record, &[ParticipantId::new("worker")]);

        assert_eq!(outcome.removed_frames.len(), 1);
        assert!(record.participant(&ParticipantId::new("worker")).is_none());
        assert!(record.frame(&CallId::new("c2")).is_none());
    }

    #[test]
    fn rule3_leaves_supervised_frame_for_supervisor_acknowledgement() {
        let mut record = record_with_frames(vec![supervised_frame("c3", "worker", 5, "bridge")]);
        record.participants.push(participant("worker", 5));

        let outcome = reclaim_stale_participants(&mut record, &[ParticipantId::new("worker")]);

        assert!(outcome.removed_frames.is_empty());
        assert_eq!(outcome.awaiting_supervisor_ack.len(), 1);
        let pending = crashed_frames_for_supervisor(&record, &ParticipantId::new("bridge"));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn rule4_removes_frames_whose_supervisor_just_went_stale() {
        let mut record = record_with_frames(vec![supervised_frame("c3", "worker", 5, "bridge")]);
        record.participants.push(participant("worker", 5));
        record.participants.push(participant("bridge", 6));

        let outcome = reclaim_stale_participants(&mut record, &[ParticipantId::new("bridge")]);

        assert_eq!(outcome.removed_frames.len(), 1);
        assert!(record.participant(&ParticipantId::new("bridge")).is_none());
    }

    #[test]
    fn status_moves_to_cleanup_then_failed() {
        let mut record = record_with_frames(vec![frame("root", "cli", 1)]);
        recompute_status_after_cleanup(&mut record, true);
        assert_eq!(record.status, OperationStatus::Cleanup);

        record.call_frames.clear();
        recompute_status_after_cleanup(&mut record, false);
        assert_eq!(record.status, OperationStatus::Failed);
    }
}
