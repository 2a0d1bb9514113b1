// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The heartbeat engine: one recurring tick per operation that refreshes
//! liveness, scans peers for staleness, and applies the unsupervised-reclaim
//! cleanup rules under the same write as the liveness update. Propagation of
//! the findings (triggering local abort, invoking `onCallCrashed`) is the
//! calling `Operation`'s job — this module only produces the tick's result.

use std::sync::Arc;
use std::time::Duration;

use dpl_core::record::{OperationRecord, OperationStatus};
use dpl_core::{format_elapsed_ms, Clock, DplError, OperationId, ParticipantId, SystemClock};
use dpl_storage::Store;

use crate::cleanup;

/// Tunables for the heartbeat loop. Defaults: 4.5s nominal interval, 0.5s
/// jitter, 10s staleness threshold.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub jitter: Duration,
    pub staleness: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(4500),
            jitter: Duration::from_millis(500),
            staleness: Duration::from_secs(10),
        }
    }
}

impl HeartbeatConfig {
    /// `interval + random_jitter(0, jitter)`, recomputed before every tick
    /// so consecutive periods don't align across participants.
    pub fn next_period(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::random::<u64>() % (jitter_ms + 1)
        };
        self.interval + Duration::from_millis(jitter)
    }
}

/// Outcome of one heartbeat tick, handed back to the invoking `Operation`
/// for propagation.
#[derive(Debug, Clone)]
pub struct HeartbeatResult {
    pub abort_flag: bool,
    /// This operation's own status after the tick's write, so the caller can
    /// detect `Cleanup` and drive Rule 1's self-cleanup without a second
    /// read.
    pub status: OperationStatus,
    pub frame_count: usize,
    pub temp_resource_count: usize,
    pub heartbeat_age_ms: u64,
    pub is_stale: bool,
    pub participants: Vec<ParticipantId>,
    pub stale_participants: Vec<ParticipantId>,
    /// Call ids whose frames were removed this tick by Rules 2/4.
    pub reclaimed_call_ids: Vec<dpl_core::CallId>,
}

/// Runs heartbeat ticks for operations against one `Store`. Stateless beyond
/// its store handle and clock — one instance may be shared across every
/// `Operation` in a process.
#[derive(Clone)]
pub struct HeartbeatEngine<C: Clock = SystemClock> {
    store: Arc<Store>,
    clock: C,
    config: HeartbeatConfig,
}

impl HeartbeatEngine<SystemClock> {
    pub fn new(store: Arc<Store>, config: HeartbeatConfig) -> Self {
        Self {
            store,
            clock: SystemClock,
            config,
        }
    }
}

impl<C: Clock> HeartbeatEngine<C> {
    pub fn with_clock(store: Arc<Store>, clock: C, config: HeartbeatConfig) -> Self {
        Self { store, clock, config }
    }

    pub fn config(&self) -> HeartbeatConfig {
        self.config
    }

    /// Run one tick for `self_participant` on `operation_id`: emits a trail
    /// snapshot of the prior record, applies Rules 2 and 4 against any
    /// participant whose `last_seen_ms` age exceeds `staleness`, refreshes
    /// `last_heartbeat_ms` and this participant's `last_seen_ms`, and writes
    /// the result. Returns the tick's findings alongside the post-write
    /// record so the caller can scan for Rule 3 (supervised crashes naming
    /// it as supervisor) without a second lock round trip.
    pub fn tick(
        &self,
        operation_id: &OperationId,
        self_participant: &ParticipantId,
    ) -> Result<(HeartbeatResult, OperationRecord), DplError> {
        // start_time_ms is immutable for the operation's lifetime, so this
        // read-before-modify does not race with the write below.
        let prior = self.store.read(operation_id)?;
        let now = self.clock.epoch_ms();
        let elapsed_label = format_elapsed_ms(now.saturating_sub(prior.start_time_ms));
        let staleness_ms = self.config.staleness.as_millis() as u64;

        let heartbeat_age_ms = now.saturating_sub(prior.last_heartbeat_ms);
        let is_stale = heartbeat_age_ms > staleness_ms;

        let reclaimed = std::cell::RefCell::new(Vec::new());
        let updated = self.store.modify(operation_id, &elapsed_label, |mut record| {
            let stale = cleanup::stale_participant_ids(&record, now, staleness_ms);
            let outcome = cleanup::reclaim_stale_participants(&mut record, &stale);
            *reclaimed.borrow_mut() = outcome.removed_frames.iter().map(|f| f.call_id.clone()).collect();
            cleanup::recompute_status_after_cleanup(&mut record, !outcome.removed_frames.is_empty());

            record.last_heartbeat_ms = now;
            if let Some(p) = record.participant_mut(self_participant) {
                p.last_seen_ms = now;
            }
            record.terminal_ticks = if record.is_terminal() { record.terminal_ticks + 1 } else { 0 };
            Ok(record)
        })?;

        // Third consecutive tick observing a terminal status: archive and
        // purge. `complete()` already does this immediately on the happy
        // path, so this only fires for operations that reached `failed`
        // through the cleanup engine rather than an explicit completion.
        if updated.terminal_ticks >= 3 {
            self.store.archive(operation_id, &elapsed_label)?;
            self.store.purge(operation_id)?;
        }

        let stale_participants = cleanup::stale_participant_ids(&prior, now, staleness_ms);
        let result = HeartbeatResult {
            abort_flag: updated.aborted,
            status: updated.status,
            frame_count: updated.call_frames.len(),
            temp_resource_count: updated.temp_resources.len(),
            heartbeat_age_ms,
            is_stale,
            participants: updated.participants.iter().map(|p| p.participant_id.clone()).collect(),
            stale_participants,
            reclaimed_call_ids: reclaimed.into_inner(),
        };
        Ok((result, updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpl_core::test_support::empty_record;
    use dpl_core::{CallId, FakeClock, OperationId};

    fn engine(store: Arc<Store>, clock: FakeClock) -> HeartbeatEngine<FakeClock> {
        HeartbeatEngine::with_clock(store, clock, HeartbeatConfig::default())
    }

    #[test]
    fn tick_refreshes_last_heartbeat_and_self_last_seen() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::new(dir.path()));
        let op_id = OperationId::from_string("op1");
        store.create_initial(&op_id, empty_record("op1", "cli", 1)).unwrap();

        let clock = FakeClock::new();
        clock.set_epoch_ms(50_000);
        let engine = engine(store.clone(), clock);

        let (result, record) = engine.tick(&op_id, &ParticipantId::new("cli")).unwrap();
        assert_eq!(record.last_heartbeat_ms, 50_000);
        assert_eq!(record.participant(&ParticipantId::new("cli")).unwrap().last_seen_ms, 50_000);
        assert!(!result.is_stale);
    }

    #[test]
    fn third_terminal_tick_archives_and_purges_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::new(dir.path()));
        let op_id = OperationId::from_string("op1");
        let mut record = empty_record("op1", "cli", 1);
        record.status = dpl_core::record::OperationStatus::Failed;
        record.call_frames.clear();
        store.create_initial(&op_id, record).unwrap();

        let clock = FakeClock::new();
        clock.set_epoch_ms(dpl_core::test_support::SAMPLE_EPOCH_MS + 1_000);
        let engine = engine(store.clone(), clock);

        engine.tick(&op_id, &ParticipantId::new("cli")).unwrap();
        engine.tick(&op_id, &ParticipantId::new("cli")).unwrap();
        assert!(store.read(&op_id).is_ok(), "record should survive the first two terminal ticks");

        engine.tick(&op_id, &ParticipantId::new("cli")).unwrap();
        assert!(
            matches!(store.read(&op_id), Err(DplError::OperationNotFound { .. })),
            "third terminal tick should have purged the record"
        );
    }

    #[test]
    fn tick_reclaims_a_stale_unsupervised_participant() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::new(dir.path()));
        let op_id = OperationId::from_string("op1");
        let mut record = empty_record("op1", "cli", 1);
        record.call_frames.push(dpl_core::test_support::frame("c2", "worker", 2));
        record.participants.push(dpl_core::test_support::participant("worker", 2));
        store.create_initial(&op_id, record).unwrap();

        let clock = FakeClock::new();
        clock.set_epoch_ms(dpl_core::test_support::SAMPLE_EPOCH_MS + 60_000);
        let engine = engine(store.clone(), clock);

        let (result, updated) = engine.tick(&op_id, &ParticipantId::new("cli")).unwrap();
        assert!(result.stale_participants.contains(&ParticipantId::new("worker")));
        assert!(updated.frame(&CallId::new("c2")).is_none());
        assert!(updated.participant(&ParticipantId::new("worker")).is_none());
    }
}
