// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronous and asynchronous call handles.
//!
//! Both are in-memory only — the durable state is just the frame they push
//! in `callFrames`. `Call` must be ended or failed by its owner; `SpawnedCall`
//! drives itself to completion on a background task and exposes the result
//! through polling methods plus an async `join`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dpl_core::{CallId, DplError, OperationId};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use crate::callbacks::{CrashInfo, SpawnedCallCallbacks};
use crate::operation::Operation;

/// A synchronous call: the caller pushed a frame and must end or fail it
/// itself. Dropping a `Call` without calling either leaves its frame
/// orphaned until a cleanup rule or `leave(cancelPendingCalls)` reclaims it.
pub struct Call<T> {
    call_id: CallId,
    operation: Operation,
    fail_on_crash: bool,
    on_completion: Option<Box<dyn FnOnce(&T) + Send>>,
    /// Shared with `Operation`'s open-call registry so `leave()` can force
    /// this callback to fire for a call its owner never ends or fails.
    on_cleanup: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
    finished: bool,
}

impl<T> Call<T> {
    pub(crate) fn new(
        call_id: CallId,
        operation: Operation,
        fail_on_crash: bool,
        on_completion: Option<Box<dyn FnOnce(&T) + Send>>,
        on_cleanup: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
    ) -> Self {
        Self {
            call_id,
            operation,
            fail_on_crash,
            on_completion,
            on_cleanup,
            finished: false,
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// Happy path: delete the frame, fire `on_completion`.
    pub fn end(mut self, result: T) -> Result<(), DplError> {
        self.operation.delete_call_frame(&self.call_id)?;
        if let Some(cb) = self.on_completion.take() {
            cb(&result);
        }
        self.finished = true;
        Ok(())
    }

    /// Cleanup path: delete the frame, fire `on_cleanup`, and — if
    /// `fail_on_crash` — signal operation-wide failure.
    pub fn fail(mut self, error: DplError) -> Result<(), DplError> {
        self.operation.delete_call_frame(&self.call_id)?;
        if let Some(cb) = self.on_cleanup.lock().take() {
            cb();
        }
        if self.fail_on_crash {
            self.operation
                .signal_failure(format!("call {} failed: {error}", self.call_id));
        }
        self.finished = true;
        Ok(())
    }
}

impl<T> Drop for Call<T> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(call_id = %self.call_id, "call dropped without end() or fail(); frame left for cleanup rules to reclaim");
        }
    }
}

#[derive(Debug, Clone)]
enum SpawnedOutcome<T> {
    Success(T),
    Failed(String),
}

struct SpawnedShared<T> {
    outcome: Mutex<Option<SpawnedOutcome<T>>>,
    done: Notify,
    /// Owned jointly with `Operation`'s open-call registry, so `leave()` can
    /// set it on a `SpawnedCall` it holds no typed handle to.
    cancelled: Arc<AtomicBool>,
}

/// An asynchronous call: pushes a frame, then runs `work` on a background
/// task. Completion fires callbacks from that task; the handle itself only
/// polls or awaits the outcome.
pub struct SpawnedCall<T> {
    call_id: CallId,
    operation_id: OperationId,
    shared: Arc<SpawnedShared<T>>,
    join_handle: tokio::task::JoinHandle<()>,
}

impl<T: Send + 'static> SpawnedCall<T> {
    pub(crate) fn spawn<F, Fut>(
        call_id: CallId,
        operation: Operation,
        fail_on_crash: bool,
        callbacks: SpawnedCallCallbacks<T>,
        work: F,
        cancelled: Arc<AtomicBool>,
    ) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, DplError>> + Send + 'static,
    {
        let shared = Arc::new(SpawnedShared {
            outcome: Mutex::new(None),
            done: Notify::new(),
            cancelled,
        });
        let task_shared = shared.clone();
        let task_call_id = call_id.clone();
        let operation_id = operation.operation_id().clone();
        let mut callbacks = callbacks;

        let join_handle = tokio::spawn(async move {
            let result = work().await;
            match result {
                Ok(value) => {
                    if let Err(e) = operation.delete_call_frame(&task_call_id) {
                        warn!(call_id = %task_call_id, error = %e, "failed to delete frame on spawned call completion");
                    }
                    if let Some(cb) = callbacks.on_completion.take() {
                        cb(&value);
                    }
                    *task_shared.outcome.lock() = Some(SpawnedOutcome::Success(value));
                }
                Err(err) => {
                    let fallback = callbacks.on_call_crashed.take().and_then(|cb| {
                        let info = CrashInfo {
                            operation_id: operation.operation_id().clone(),
                            call_id: task_call_id.clone(),
                            participant_id: operation.participant_id().clone(),
                            supervisor_handle: String::new(),
                        };
                        cb(&info)
                    });
                    if let Err(e) = operation.delete_call_frame(&task_call_id) {
                        warn!(call_id = %task_call_id, error = %e, "failed to delete frame on spawned call crash");
                    }
                    match fallback {
                        Some(value) => {
                            if let Some(cb) = callbacks.on_completion.take() {
                                cb(&value);
                            }
                            *task_shared.outcome.lock() = Some(SpawnedOutcome::Success(value));
                        }
                        None => {
                            if let Some(cb) = callbacks.on_cleanup.take() {
                                cb();
                            }
                            if fail_on_crash {
                                operation.signal_failure(format!("call {task_call_id} crashed: {err}"));
                            }
                            *task_shared.outcome.lock() = Some(SpawnedOutcome::Failed(err.to_string()));
                        }
                    }
                }
            }
            task_shared.done.notify_waiters();
        });

        Self {
            call_id,
            operation_id,
            shared,
            join_handle,
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// Best-effort cancellation signal; `work` must observe
    /// [`SpawnedCall::is_cancelled`] on its own, cleanup still fires on
    /// return regardless of whether it was observed.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_completed(&self) -> bool {
        self.shared.outcome.lock().is_some()
    }

    pub fn is_success(&self) -> bool {
        matches!(*self.shared.outcome.lock(), Some(SpawnedOutcome::Success(_)))
    }

    /// Await completion and return a reference-free clone-on-read result.
    pub async fn join(self) -> Result<T, DplError>
    where
        T: Clone,
    {
        loop {
            if let Some(outcome) = self.shared.outcome.lock().clone() {
                return match outcome {
                    SpawnedOutcome::Success(v) => Ok(v),
                    SpawnedOutcome::Failed(reason) => Err(DplError::OperationFailed {
                        operation_id: self.operation_id.clone(),
                        reason,
                    }),
                };
            }
            self.shared.done.notified().await;
        }
    }
}

impl<T> Drop for SpawnedCall<T> {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}
