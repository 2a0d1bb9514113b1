// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The process-wide entry point: creates and joins operations, keeps a
//! table of the live `Operation` handles this process holds, and wires the
//! signal bridge exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use dpl_core::ids::SessionIdGen;
use dpl_core::record::{Frame, FrameState, OperationRecord, OperationStatus, Participant};
use dpl_core::{CallId, Clock, DplError, OperationId, ParticipantId, SessionId, SystemClock};
use dpl_storage::Store;
use parking_lot::Mutex;

use crate::heartbeat::HeartbeatConfig;
use crate::operation::Operation;
use crate::signal::SignalBridge;

/// Identity a process presents when creating or joining an operation.
#[derive(Debug, Clone)]
pub struct ParticipantIdentity {
    pub participant_id: ParticipantId,
    pub pid: u32,
}

/// Process-wide registry of live `Operation` handles, backed by one `Store`.
pub struct Ledger {
    store: Arc<Store>,
    heartbeat_config: HeartbeatConfig,
    signal_bridge: Arc<SignalBridge>,
    operations: Mutex<HashMap<(OperationId, SessionId), Operation>>,
    session_gen: Mutex<SessionIdGen>,
}

impl Ledger {
    pub fn new(base: impl Into<std::path::PathBuf>) -> Self {
        Self::with_heartbeat_config(base, HeartbeatConfig::default())
    }

    pub fn with_heartbeat_config(base: impl Into<std::path::PathBuf>, heartbeat_config: HeartbeatConfig) -> Self {
        let bridge = Arc::new(SignalBridge::new());
        bridge.install();
        Self {
            store: Arc::new(Store::new(base)),
            heartbeat_config,
            signal_bridge: bridge,
            operations: Mutex::new(HashMap::new()),
            session_gen: Mutex::new(SessionIdGen::new()),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Generate a new `operationId`, write the initial record with the
    /// initiator's root frame, allocate session #1, and register the handle.
    pub fn create_operation(
        &self,
        identity: &ParticipantIdentity,
        description: Option<String>,
    ) -> Result<Operation, DplError> {
        let operation_id = OperationId::generate(identity.participant_id.as_str());
        let now = SystemClock.epoch_ms();
        let initial = OperationRecord {
            operation_id: operation_id.clone(),
            status: OperationStatus::Running,
            aborted: false,
            start_time_ms: now,
            last_heartbeat_ms: now,
            call_frames: vec![Frame {
                participant_id: identity.participant_id.clone(),
                call_id: CallId::root(),
                pid: identity.pid,
                start_time_ms: now,
                state: FrameState::Active,
                supervisor_id: None,
                supervisor_handle: None,
            }],
            temp_resources: vec![],
            participants: vec![Participant {
                participant_id: identity.participant_id.clone(),
                pid: identity.pid,
                last_seen_ms: now,
                supervisor_id: None,
                supervisor_handle: None,
            }],
            description,
            terminal_ticks: 0,
            unknown_fields: Default::default(),
        };
        self.store.create_initial(&operation_id, initial)?;

        let session_id = self.session_gen.lock().next_id();
        let operation = Operation::new(
            operation_id.clone(),
            identity.participant_id.clone(),
            identity.pid,
            session_id,
            true,
            self.store.clone(),
            self.heartbeat_config,
            Some(self.signal_bridge.clone()),
        );
        self.operations
            .lock()
            .insert((operation_id, session_id), operation.clone());
        Ok(operation)
    }

    /// Append the participant entry, allocate a new session, and register
    /// the handle. Fails with `OperationNotFound` if the record is absent
    /// or already terminal.
    pub fn join_operation(
        &self,
        operation_id: &OperationId,
        identity: &ParticipantIdentity,
    ) -> Result<Operation, DplError> {
        let now = SystemClock.epoch_ms();
        let participant = Participant {
            participant_id: identity.participant_id.clone(),
            pid: identity.pid,
            last_seen_ms: now,
            supervisor_id: None,
            supervisor_handle: None,
        };
        let op_id_for_check = operation_id.clone();
        self.store.modify(operation_id, "", move |mut record| {
            if record.is_terminal() {
                return Err(DplError::OperationNotFound {
                    operation_id: op_id_for_check.clone(),
                });
            }
            if record.participant(&participant.participant_id).is_none() {
                record.participants.push(participant.clone());
            }
            Ok(record)
        })?;

        let session_id = self.session_gen.lock().next_id();
        let operation = Operation::new(
            operation_id.clone(),
            identity.participant_id.clone(),
            identity.pid,
            session_id,
            false,
            self.store.clone(),
            self.heartbeat_config,
            Some(self.signal_bridge.clone()),
        );
        self.operations
            .lock()
            .insert((operation_id.clone(), session_id), operation.clone());
        Ok(operation)
    }

    /// Leave and drop the handle for `(operationId, sessionId)`. If no other
    /// registered handle in this process shares `participantId`, also
    /// removes the participant entry from the record — a different session
    /// of the same participant keeps it alive via its own heartbeat.
    pub fn release(&self, operation_id: &OperationId, session_id: SessionId, cancel_pending_calls: bool) -> Result<(), DplError> {
        let operation = {
            let mut operations = self.operations.lock();
            operations.remove(&(operation_id.clone(), session_id))
        };
        let Some(operation) = operation else {
            return Ok(());
        };
        let participant_id = operation.participant_id().clone();
        operation.leave(cancel_pending_calls)?;

        let still_present = self
            .operations
            .lock()
            .values()
            .any(|op| op.operation_id() == operation_id && op.participant_id() == &participant_id);
        if !still_present {
            let target = participant_id;
            let _ = self.store.modify(operation_id, "", move |mut record| {
                record.participants.retain(|p| p.participant_id != target);
                Ok(record)
            });
        }
        Ok(())
    }

    pub fn operation_count(&self) -> usize {
        self.operations.lock().len()
    }

    /// Stop every heartbeat and drop every handle. Does not touch on-disk
    /// records — each `Operation` has already written whatever terminal
    /// state its own lifecycle produced.
    pub fn dispose(&self) {
        let operations: Vec<Operation> = self.operations.lock().drain().map(|(_, op)| op).collect();
        for operation in operations {
            let _ = operation.leave(true);
        }
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        self.dispose();
    }
}
