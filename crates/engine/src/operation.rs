// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-participant handle onto one operation.
//!
//! `Operation` is a cheap-to-clone handle (an `Arc` around the real state):
//! cloning it does not create a new session, it shares the same one. One
//! session per `Operation` value — a participant that joins the same
//! operation twice in one process gets two distinct `Operation` values from
//! the `Ledger`, each with its own session id.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dpl_core::record::{Frame, FrameState, OperationStatus, TempResource};
use dpl_core::{CallId, Clock, DplError, OperationId, ParticipantId, SessionId, SystemClock};
use dpl_storage::Store;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::call::{Call, SpawnedCall};
use crate::callbacks::{CallCallbacks, HeartbeatErrorKind, OperationCallbacks, SpawnedCallCallbacks};
use crate::cleanup;
use crate::heartbeat::{HeartbeatConfig, HeartbeatEngine};
use crate::signal::SignalBridge;

/// Severity for [`Operation::log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Outcome of [`Operation::sync`]: every call that finished is bucketed by
/// how it finished, unless the operation failed first, in which case calls
/// still outstanding when that happened land in `unknown`.
#[derive(Debug, Clone)]
pub struct SyncResult<T> {
    pub successful: Vec<T>,
    pub failed: Vec<CallId>,
    pub unknown: Vec<CallId>,
    pub operation_failed: Option<OperationFailedInfo>,
}

/// Delivered via [`Operation::on_failure`] once the operation fails.
#[derive(Debug, Clone)]
pub struct OperationFailedInfo {
    pub operation_id: OperationId,
    pub failed_at_ms: u64,
    pub reason: String,
    pub crashed_call_ids: Vec<CallId>,
}

/// One entry in `Shared::open_calls`: enough of the call's real handle,
/// type-erased, for `leave()`/Rule 1's self-cleanup to reclaim it for real
/// instead of only deleting its frame.
#[derive(Clone)]
enum OpenCall {
    /// Pushed by the wire veneer's `/call/start`, which has no in-process
    /// callback to invoke — only the fatality policy survives to fail time.
    Bare { fail_on_crash: bool },
    /// A synchronous [`Call`]. `on_cleanup` is the same cell the handle
    /// holds, so whichever side runs first — the owner calling `fail()`, or
    /// a forced reclaim here — takes it and the other finds it already
    /// empty.
    Sync {
        on_cleanup: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
        fail_on_crash: bool,
    },
    /// A [`SpawnedCall`]; reclaiming one only sets its cancellation flag —
    /// the background task still owns frame deletion and callback firing
    /// whenever `work` actually returns.
    Spawned { cancelled: Arc<AtomicBool> },
}

struct Shared {
    operation_id: OperationId,
    participant_id: ParticipantId,
    pid: u32,
    session_id: SessionId,
    is_initiator: bool,
    store: Arc<Store>,
    heartbeat: HeartbeatEngine<SystemClock>,
    open_calls: Mutex<HashMap<CallId, OpenCall>>,
    temp_resources: Mutex<HashSet<String>>,
    abort_flag: AtomicBool,
    abort_notify: Notify,
    failure: Mutex<Option<OperationFailedInfo>>,
    failure_notify: Notify,
    callbacks: Mutex<OperationCallbacks>,
    heartbeat_cancel: CancellationToken,
    heartbeat_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    signal_bridge: Option<Arc<SignalBridge>>,
    signal_callback_id: Mutex<Option<u64>>,
}

/// In-process handle for one participant's one session on one operation.
#[derive(Clone)]
pub struct Operation {
    inner: Arc<Shared>,
}

impl Operation {
    /// Build a handle around an already-registered session. `Ledger` is
    /// responsible for having pushed the initiator frame (create) or
    /// appended the participant entry (join) before calling this.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        operation_id: OperationId,
        participant_id: ParticipantId,
        pid: u32,
        session_id: SessionId,
        is_initiator: bool,
        store: Arc<Store>,
        heartbeat_config: HeartbeatConfig,
        signal_bridge: Option<Arc<SignalBridge>>,
    ) -> Self {
        let heartbeat = HeartbeatEngine::new(store.clone(), heartbeat_config);
        let shared = Arc::new(Shared {
            operation_id,
            participant_id,
            pid,
            session_id,
            is_initiator,
            store,
            heartbeat,
            open_calls: Mutex::new(HashMap::new()),
            temp_resources: Mutex::new(HashSet::new()),
            abort_flag: AtomicBool::new(false),
            abort_notify: Notify::new(),
            failure: Mutex::new(None),
            failure_notify: Notify::new(),
            callbacks: Mutex::new(OperationCallbacks::default()),
            heartbeat_cancel: CancellationToken::new(),
            heartbeat_task: Mutex::new(None),
            signal_bridge,
            signal_callback_id: Mutex::new(None),
        });
        let operation = Self { inner: shared };
        operation.register_signal_cleanup();
        operation.start_heartbeat();
        operation
    }

    pub fn operation_id(&self) -> &OperationId {
        &self.inner.operation_id
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.inner.participant_id
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.session_id
    }

    pub fn is_initiator(&self) -> bool {
        self.inner.is_initiator
    }

    pub fn set_callbacks(&self, callbacks: OperationCallbacks) {
        *self.inner.callbacks.lock() = callbacks;
    }

    // -- call frame primitives -------------------------------------------

    /// Low-level push, used directly or by `start_call`/`spawn_call`.
    pub fn create_call_frame(&self, call_id: CallId) -> Result<(), DplError> {
        let participant_id = self.inner.participant_id.clone();
        let pid = self.inner.pid;
        let start_time_ms = SystemClock.epoch_ms();
        let op_id = self.inner.operation_id.clone();
        self.inner.store.modify(&self.inner.operation_id, "", move |mut record| {
            if record.frame(&call_id).is_some() {
                return Err(DplError::DuplicateCallId {
                    operation_id: op_id.clone(),
                    call_id: call_id.clone(),
                });
            }
            record.call_frames.push(Frame {
                participant_id,
                call_id,
                pid,
                start_time_ms,
                state: FrameState::Active,
                supervisor_id: None,
                supervisor_handle: None,
            });
            Ok(record)
        })?;
        Ok(())
    }

    /// Low-level pop, stack-aware per the cleanup engine's rule: removing a
    /// frame with only crashed frames above it cascades through them too.
    pub fn delete_call_frame(&self, call_id: &CallId) -> Result<(), DplError> {
        let target = call_id.clone();
        self.inner
            .store
            .modify(&self.inner.operation_id, "", move |mut record| {
                cleanup::remove_frame_stack_aware(&mut record, &target)?;
                Ok(record)
            })?;
        self.inner.open_calls.lock().remove(call_id);
        Ok(())
    }

    pub fn start_call<T>(
        &self,
        description: Option<&str>,
        fail_on_crash: bool,
        mut callbacks: CallCallbacks<T>,
    ) -> Result<Call<T>, DplError> {
        let call_id = CallId::generate();
        self.create_call_frame(call_id.clone())?;
        let on_cleanup = Arc::new(Mutex::new(callbacks.on_cleanup.take()));
        self.inner.open_calls.lock().insert(
            call_id.clone(),
            OpenCall::Sync {
                on_cleanup: on_cleanup.clone(),
                fail_on_crash,
            },
        );
        if let Some(description) = description {
            let _ = self.log(&format!("call {call_id} started: {description}"), LogLevel::Debug);
        }
        Ok(Call::new(call_id, self.clone(), fail_on_crash, callbacks.on_completion, on_cleanup))
    }

    pub fn spawn_call<T, F, Fut>(
        &self,
        description: Option<&str>,
        fail_on_crash: bool,
        callbacks: SpawnedCallCallbacks<T>,
        work: F,
    ) -> Result<SpawnedCall<T>, DplError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, DplError>> + Send + 'static,
    {
        let call_id = CallId::generate();
        self.create_call_frame(call_id.clone())?;
        let cancelled = Arc::new(AtomicBool::new(false));
        self.inner
            .open_calls
            .lock()
            .insert(call_id.clone(), OpenCall::Spawned { cancelled: cancelled.clone() });
        if let Some(description) = description {
            let _ = self.log(&format!("call {call_id} spawned: {description}"), LogLevel::Debug);
        }
        Ok(SpawnedCall::spawn(call_id, self.clone(), fail_on_crash, callbacks, work, cancelled))
    }

    /// Wire-veneer entry point for `/call/start`: push a frame for a call
    /// with no in-process typed callbacks to invoke on completion (the HTTP
    /// server has no closure to run). Tracked in `open_calls` the same way
    /// `start_call` does, so `leave()` still reclaims it if the remote
    /// session never calls back. `fail_on_crash` is fixed here, at creation
    /// time, and carried through to `fail_bare_call` rather than accepted
    /// again there.
    pub fn start_bare_call(&self, call_id: CallId, fail_on_crash: bool) -> Result<(), DplError> {
        self.create_call_frame(call_id.clone())?;
        self.inner.open_calls.lock().insert(call_id, OpenCall::Bare { fail_on_crash });
        Ok(())
    }

    /// Wire-veneer entry point for `/call/fail`: remove the frame and, when
    /// the `fail_on_crash` recorded at `start_bare_call` time was set,
    /// signal operation-wide failure the same way `Call::fail` does for an
    /// in-process typed call.
    pub fn fail_bare_call(&self, call_id: &CallId, reason: String) -> Result<(), DplError> {
        let fail_on_crash = match self.inner.open_calls.lock().get(call_id) {
            Some(OpenCall::Bare { fail_on_crash }) => *fail_on_crash,
            _ => true,
        };
        self.delete_call_frame(call_id)?;
        if fail_on_crash {
            self.signal_failure(reason);
        }
        Ok(())
    }

    /// Awaits the earlier of (every call finished) or (operation failure).
    /// Calls still outstanding when failure wins the race land in `unknown`
    /// since their frames may or may not have been reclaimed by then.
    pub async fn sync<T: Send + Clone + 'static>(&self, calls: Vec<SpawnedCall<T>>) -> SyncResult<T> {
        let ids: Vec<CallId> = calls.iter().map(|c| c.call_id().clone()).collect();

        let join_all = async {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(call.join().await);
            }
            results
        };

        tokio::select! {
            results = join_all => {
                let mut successful = Vec::new();
                let mut failed = Vec::new();
                for (id, result) in ids.into_iter().zip(results) {
                    match result {
                        Ok(value) => successful.push(value),
                        Err(_) => failed.push(id),
                    }
                }
                SyncResult { successful, failed, unknown: Vec::new(), operation_failed: None }
            }
            info = self.on_failure() => {
                SyncResult { successful: Vec::new(), failed: Vec::new(), unknown: ids, operation_failed: Some(info) }
            }
        }
    }

    // -- logging ------------------------------------------------------------

    pub fn log(&self, message: &str, level: LogLevel) -> Result<(), DplError> {
        let line = format!("[{}] {}", level.as_str(), message);
        self.inner.store.append_log(&self.inner.operation_id, &line)
    }

    // -- session lifecycle ----------------------------------------------

    /// Close this session. With `cancel_pending_calls=false` and open
    /// frames remaining, fails with `PendingCalls`. Otherwise reclaims every
    /// open call: cancels each open `SpawnedCall`, fails each open `Call`
    /// (firing its `on_cleanup` and, where `fail_on_crash`, signalling
    /// operation-wide failure), removes the frames calls own directly, then
    /// stops the heartbeat.
    pub fn leave(&self, cancel_pending_calls: bool) -> Result<(), DplError> {
        let remaining: Vec<(CallId, OpenCall)> = {
            let mut open_calls = self.inner.open_calls.lock();
            if !open_calls.is_empty() && !cancel_pending_calls {
                return Err(DplError::PendingCalls {
                    operation_id: self.inner.operation_id.clone(),
                    session_id: self.inner.session_id.to_string(),
                });
            }
            std::mem::take(&mut *open_calls).into_iter().collect()
        };
        for (call_id, call) in remaining {
            match call {
                // The background task still owns frame deletion and
                // callback firing once `work` returns; cancelling it here
                // is a signal, not a reclaim.
                OpenCall::Spawned { cancelled } => {
                    cancelled.store(true, Ordering::SeqCst);
                }
                OpenCall::Bare { fail_on_crash } => {
                    if let Err(e) = self.delete_call_frame(&call_id) {
                        warn!(call_id = %call_id, error = %e, "failed to remove frame while leaving session");
                    }
                    if fail_on_crash {
                        self.signal_failure(format!("call {call_id} cancelled by leave()"));
                    }
                }
                OpenCall::Sync { on_cleanup, fail_on_crash } => {
                    if let Err(e) = self.delete_call_frame(&call_id) {
                        warn!(call_id = %call_id, error = %e, "failed to remove frame while leaving session");
                    }
                    if let Some(cb) = on_cleanup.lock().take() {
                        cb();
                    }
                    if fail_on_crash {
                        self.signal_failure(format!("call {call_id} cancelled by leave()"));
                    }
                }
            }
        }
        self.stop_heartbeat();
        self.unregister_signal_cleanup();
        Ok(())
    }

    /// Initiator-only: requires no non-initiator frames remain, writes
    /// `status=completed`, archives, then purges the live record.
    pub fn complete(&self) -> Result<(), DplError> {
        if !self.inner.is_initiator {
            return Err(DplError::StateMismatch {
                operation_id: self.inner.operation_id.clone(),
                reason: "complete() called by a non-initiator".to_string(),
            });
        }
        let initiator = self.inner.participant_id.clone();
        let op_id_for_check = self.inner.operation_id.clone();
        self.inner.store.modify(&self.inner.operation_id, "final", move |mut record| {
            if record.call_frames.iter().any(|f| f.participant_id != initiator) {
                return Err(DplError::StateMismatch {
                    operation_id: op_id_for_check.clone(),
                    reason: "non-initiator frames still open".to_string(),
                });
            }
            record.status = OperationStatus::Completed;
            Ok(record)
        })?;
        self.log("Operation completed", LogLevel::Info)?;
        self.inner.store.archive(&self.inner.operation_id, "final")?;
        self.inner.store.purge(&self.inner.operation_id)?;
        self.stop_heartbeat();
        self.unregister_signal_cleanup();
        Ok(())
    }

    // -- abort / failure --------------------------------------------------

    pub fn set_abort_flag(&self, value: bool) -> Result<(), DplError> {
        self.inner.store.modify(&self.inner.operation_id, "", move |mut record| {
            record.aborted = value;
            Ok(record)
        })?;
        Ok(())
    }

    pub fn check_abort(&self) -> Result<bool, DplError> {
        Ok(self.inner.store.read(&self.inner.operation_id)?.aborted)
    }

    /// Full current record, for callers (the HTTP veneer) that have no
    /// other way to read the operation's state than through this handle.
    pub fn snapshot(&self) -> Result<dpl_core::record::OperationRecord, DplError> {
        self.inner.store.read(&self.inner.operation_id)
    }

    /// Force an out-of-band heartbeat tick and hand the result back to the
    /// caller, instead of only acting on it internally the way the
    /// background loop's [`Self::run_heartbeat_tick`] does. Used by the
    /// HTTP veneer's `/operation/heartbeat`, where a remote participant
    /// drives its own heartbeat cadence rather than relying on this
    /// process's background task.
    pub fn heartbeat_now(&self) -> Result<crate::heartbeat::HeartbeatResult, DplError> {
        let (result, record) = self
            .inner
            .heartbeat
            .tick(&self.inner.operation_id, &self.inner.participant_id)?;
        if result.abort_flag {
            self.trigger_abort();
        } else if !result.stale_participants.is_empty() {
            self.signal_failure_with_crashed(
                format!("heartbeat observed stale participants: {:?}", result.stale_participants),
                result.reclaimed_call_ids.clone(),
            );
        }
        if result.status == OperationStatus::Cleanup {
            self.run_self_cleanup();
        }
        self.acknowledge_supervised_crashes(&record);
        Ok(result)
    }

    /// Local short-circuit: marks this handle aborted and resolves
    /// `on_abort` without waiting for the next heartbeat tick.
    pub fn trigger_abort(&self) {
        self.inner.abort_flag.store(true, Ordering::SeqCst);
        self.inner.abort_notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.abort_flag.load(Ordering::SeqCst)
    }

    /// Resolves once this handle observes abort, either via
    /// `trigger_abort` or a heartbeat tick that saw `abortFlag=true`.
    pub async fn on_abort(&self) {
        if self.is_aborted() {
            return;
        }
        self.inner.abort_notify.notified().await;
    }

    pub(crate) fn signal_failure(&self, reason: String) {
        self.signal_failure_with_crashed(reason, Vec::new());
    }

    fn signal_failure_with_crashed(&self, reason: String, crashed_call_ids: Vec<CallId>) {
        let mut failure = self.inner.failure.lock();
        if failure.is_some() {
            return;
        }
        *failure = Some(OperationFailedInfo {
            operation_id: self.inner.operation_id.clone(),
            failed_at_ms: SystemClock.epoch_ms(),
            reason,
            crashed_call_ids,
        });
        drop(failure);
        self.inner.failure_notify.notify_waiters();
    }

    pub fn failure_info(&self) -> Option<OperationFailedInfo> {
        self.inner.failure.lock().clone()
    }

    /// Resolves once this handle observes operation-wide failure.
    pub async fn on_failure(&self) -> OperationFailedInfo {
        loop {
            if let Some(info) = self.failure_info() {
                return info;
            }
            self.inner.failure_notify.notified().await;
        }
    }

    // -- temp resources ---------------------------------------------------

    pub fn register_temp_resource(&self, path: impl Into<String>) -> Result<(), DplError> {
        let path = path.into();
        self.inner.temp_resources.lock().insert(path.clone());
        let pid = self.inner.pid;
        let registered_at_ms = SystemClock.epoch_ms();
        self.inner.store.modify(&self.inner.operation_id, "", move |mut record| {
            record.temp_resources.push(TempResource {
                path: path.clone(),
                owner_pid: pid,
                registered_at_ms,
            });
            Ok(record)
        })?;
        Ok(())
    }

    pub fn unregister_temp_resource(&self, path: &str) -> Result<(), DplError> {
        self.inner.temp_resources.lock().remove(path);
        let target = path.to_string();
        self.inner.store.modify(&self.inner.operation_id, "", move |mut record| {
            record.temp_resources.retain(|r| r.path != target);
            Ok(record)
        })?;
        Ok(())
    }

    // -- heartbeat ----------------------------------------------------------

    fn start_heartbeat(&self) {
        let shared = self.inner.clone();
        let operation = self.clone();
        let cancel = shared.heartbeat_cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                let period = shared.heartbeat.config().next_period();
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(period) => {}
                }
                operation.run_heartbeat_tick();
            }
        });
        *self.inner.heartbeat_task.lock() = Some(handle);
    }

    fn stop_heartbeat(&self) {
        self.inner.heartbeat_cancel.cancel();
        if let Some(handle) = self.inner.heartbeat_task.lock().take() {
            handle.abort();
        }
    }

    fn run_heartbeat_tick(&self) {
        let tick = self
            .inner
            .heartbeat
            .tick(&self.inner.operation_id, &self.inner.participant_id);
        let callbacks = self.inner.callbacks.lock();
        match tick {
            Ok((result, record)) => {
                if result.abort_flag {
                    self.trigger_abort();
                    if let Some(cb) = &callbacks.on_heartbeat_error {
                        cb(&HeartbeatErrorKind::AbortFlagSet);
                    }
                } else if !result.stale_participants.is_empty() {
                    if let Some(cb) = &callbacks.on_heartbeat_error {
                        cb(&HeartbeatErrorKind::HeartbeatStale {
                            stale: result.stale_participants.clone(),
                        });
                    }
                    self.signal_failure_with_crashed(
                        format!("heartbeat observed stale participants: {:?}", result.stale_participants),
                        result.reclaimed_call_ids.clone(),
                    );
                } else if let Some(cb) = &callbacks.on_heartbeat_success {
                    cb();
                }
                if result.status == OperationStatus::Cleanup {
                    self.run_self_cleanup();
                }
                self.acknowledge_supervised_crashes(&record);
                debug!(operation_id = %self.inner.operation_id, frames = result.frame_count, "heartbeat tick completed");
            }
            Err(DplError::OperationNotFound { .. }) => {
                if let Some(cb) = &callbacks.on_heartbeat_error {
                    cb(&HeartbeatErrorKind::LedgerNotFound);
                }
                self.inner.abort_flag.store(true, Ordering::SeqCst);
                self.inner.abort_notify.notify_waiters();
            }
            Err(e) => {
                warn!(operation_id = %self.inner.operation_id, error = %e, "heartbeat tick failed");
            }
        }
    }

    /// Rule 1: once this operation's own record reads `status=cleanup`,
    /// eagerly reclaim this session's remaining open calls and leave rather
    /// than waiting for a peer's cleanup rule to do it. Safe to call more
    /// than once — an empty open-call registry makes `leave(true)` a no-op.
    fn run_self_cleanup(&self) {
        if let Err(e) = self.leave(true) {
            warn!(operation_id = %self.inner.operation_id, error = %e, "self-cleanup leave failed");
        }
    }

    /// Rule 3: acknowledge every crashed frame naming this participant as
    /// supervisor and remove it in the same write.
    fn acknowledge_supervised_crashes(&self, record: &dpl_core::record::OperationRecord) {
        let pending: Vec<CallId> = cleanup::crashed_frames_for_supervisor(record, &self.inner.participant_id)
            .into_iter()
            .map(|f| f.call_id.clone())
            .collect();
        for call_id in pending {
            let call_id_for_ack = call_id.clone();
            let result = self
                .inner
                .store
                .modify(&self.inner.operation_id, "", move |mut record| {
                    cleanup::acknowledge_supervised_crash(&mut record, &call_id_for_ack)?;
                    Ok(record)
                });
            if let Err(e) = result {
                warn!(call_id = %call_id, error = %e, "failed to acknowledge supervised crash");
            } else {
                info!(call_id = %call_id, "acknowledged supervised crash");
            }
        }
    }

    // -- signal bridge wiring --------------------------------------------

    fn register_signal_cleanup(&self) {
        let Some(bridge) = self.inner.signal_bridge.clone() else {
            return;
        };
        let shared = self.inner.clone();
        let id = bridge.register(Box::new(move || {
            let resources: Vec<String> = shared.temp_resources.lock().iter().cloned().collect();
            for path in resources {
                if let Err(e) = std::fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %path, error = %e, "failed to remove temp resource on signal");
                    }
                }
                shared.temp_resources.lock().remove(&path);
                let target = path.clone();
                if let Err(e) = shared.store.modify(&shared.operation_id, "", move |mut record| {
                    record.temp_resources.retain(|r| r.path != target);
                    Ok(record)
                }) {
                    warn!(path = %path, error = %e, "failed to unregister temp resource from ledger on signal");
                }
            }
        }));
        *self.inner.signal_callback_id.lock() = Some(id);
    }

    fn unregister_signal_cleanup(&self) {
        if let (Some(bridge), Some(id)) = (
            self.inner.signal_bridge.clone(),
            self.inner.signal_callback_id.lock().take(),
        ) {
            bridge.unregister(id);
        }
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("operation_id", &self.inner.operation_id)
            .field("participant_id", &self.inner.participant_id)
            .field("session_id", &self.inner.session_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpl_core::test_support::empty_record;

    fn store() -> (tempfile::TempDir, Arc<Store>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::new(dir.path()));
        (dir, store)
    }

    fn make_operation(store: Arc<Store>, op_id: &str, participant: &str, pid: u32, initiator: bool) -> Operation {
        let session_id = dpl_core::ids::SessionIdGen::new().next_id();
        Operation::new(
            OperationId::from_string(op_id),
            ParticipantId::new(participant),
            pid,
            session_id,
            initiator,
            store,
            HeartbeatConfig::default(),
            None,
        )
    }

    #[tokio::test]
    async fn create_and_delete_call_frame_round_trips() {
        let (_dir, store) = store();
        let op_id = OperationId::from_string("op1");
        store.create_initial(&op_id, empty_record("op1", "cli", 1)).unwrap();
        let operation = make_operation(store.clone(), "op1", "cli", 1, true);

        operation.create_call_frame(CallId::new("c1")).unwrap();
        let record = store.read(&op_id).unwrap();
        assert!(record.frame(&CallId::new("c1")).is_some());

        operation.delete_call_frame(&CallId::new("c1")).unwrap();
        let record = store.read(&op_id).unwrap();
        assert!(record.frame(&CallId::new("c1")).is_none());
        operation.leave(true).unwrap();
    }

    #[tokio::test]
    async fn leave_without_cancel_fails_on_pending_calls() {
        let (_dir, store) = store();
        let op_id = OperationId::from_string("op1");
        store.create_initial(&op_id, empty_record("op1", "cli", 1)).unwrap();
        let operation = make_operation(store, "op1", "cli", 1, true);

        operation.create_call_frame(CallId::new("c1")).unwrap();
        operation
            .inner
            .open_calls
            .lock()
            .insert(CallId::new("c1"), OpenCall::Bare { fail_on_crash: true });
        let err = operation.leave(false).unwrap_err();
        assert!(matches!(err, DplError::PendingCalls { .. }));
        operation.leave(true).unwrap();
    }

    #[tokio::test]
    async fn complete_requires_initiator_role() {
        let (_dir, store) = store();
        let op_id = OperationId::from_string("op1");
        store.create_initial(&op_id, empty_record("op1", "cli", 1)).unwrap();
        let operation = make_operation(store, "op1", "cli", 1, false);

        let err = operation.complete().unwrap_err();
        assert!(matches!(err, DplError::StateMismatch { .. }));
        operation.leave(true).unwrap();
    }

    #[tokio::test]
    async fn complete_archives_and_purges_the_live_record() {
        let (_dir, store) = store();
        let op_id = OperationId::from_string("op1");
        store.create_initial(&op_id, empty_record("op1", "cli", 1)).unwrap();
        let operation = make_operation(store.clone(), "op1", "cli", 1, true);

        operation.complete().unwrap();
        assert!(!store.paths(&op_id).live().exists());
    }

    #[tokio::test]
    async fn leave_force_fires_on_cleanup_for_an_open_sync_call() {
        let (_dir, store) = store();
        let op_id = OperationId::from_string("op1");
        store.create_initial(&op_id, empty_record("op1", "cli", 1)).unwrap();
        let operation = make_operation(store.clone(), "op1", "cli", 1, true);

        let cleaned_up = Arc::new(AtomicBool::new(false));
        let flag = cleaned_up.clone();
        let call = operation
            .start_call::<()>(None, false, CallCallbacks {
                on_completion: None,
                on_cleanup: Some(Box::new(move || flag.store(true, Ordering::SeqCst))),
            })
            .unwrap();
        let call_id = call.call_id().clone();

        operation.leave(true).unwrap();

        assert!(cleaned_up.load(Ordering::SeqCst));
        assert!(store.read(&op_id).unwrap().frame(&call_id).is_none());
        drop(call); // already reclaimed by leave(); dropping here just logs
    }

    #[tokio::test]
    async fn fail_bare_call_honors_fail_on_crash_from_start_time_not_fail_time() {
        let (_dir, store) = store();
        let op_id = OperationId::from_string("op1");
        store.create_initial(&op_id, empty_record("op1", "cli", 1)).unwrap();
        let operation = make_operation(store, "op1", "cli", 1, true);

        operation.start_bare_call(CallId::new("c1"), false).unwrap();
        operation.fail_bare_call(&CallId::new("c1"), "remote failure".to_string()).unwrap();
        assert!(operation.failure_info().is_none(), "fail_on_crash=false at start time must stick");

        operation.start_bare_call(CallId::new("c2"), true).unwrap();
        operation.fail_bare_call(&CallId::new("c2"), "remote failure".to_string()).unwrap();
        assert!(operation.failure_info().is_some());
        operation.leave(true).unwrap();
    }

    #[tokio::test]
    async fn trigger_abort_is_observed_locally_without_a_heartbeat_tick() {
        let (_dir, store) = store();
        let op_id = OperationId::from_string("op1");
        store.create_initial(&op_id, empty_record("op1", "cli", 1)).unwrap();
        let operation = make_operation(store, "op1", "cli", 1, true);

        assert!(!operation.is_aborted());
        operation.trigger_abort();
        assert!(operation.is_aborted());
        operation.leave(true).unwrap();
    }
}
