// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response bodies for every endpoint in the HTTP veneer. Named per
//! endpoint rather than grouped into one giant enum, matching the
//! `build_routes` combinator style `dpl-daemon` uses to wire them up — each
//! handler takes exactly one request type and returns exactly one response
//! type.

use dpl_core::{CallId, OperationId, ParticipantId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_ms: u64,
    pub operation_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOperationRequest {
    pub participant_id: ParticipantId,
    pub participant_pid: u32,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOperationResponse {
    pub operation_id: OperationId,
    pub session_id: u64,
    pub start_time_ms: u64,
    pub is_initiator: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinOperationRequest {
    pub operation_id: OperationId,
    pub participant_id: ParticipantId,
    pub participant_pid: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinOperationResponse {
    pub session_id: u64,
    pub start_time_ms: u64,
    pub is_initiator: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSessionRequest {
    pub operation_id: OperationId,
    pub session_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub abort_flag: bool,
    pub frame_count: usize,
    pub temp_resource_count: usize,
    pub heartbeat_age_ms: u64,
    pub is_stale: bool,
    pub participants: Vec<ParticipantId>,
    pub stale_participants: Vec<ParticipantId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbortRequest {
    pub operation_id: OperationId,
    pub value: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationIdRequest {
    pub operation_id: OperationId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationStateResponse {
    pub operation_id: OperationId,
    pub status: String,
    pub aborted: bool,
    pub start_time_ms: u64,
    pub last_heartbeat_ms: u64,
    pub frame_count: usize,
    pub participant_count: usize,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRequest {
    pub operation_id: OperationId,
    pub message: String,
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub operation_id: OperationId,
    pub session_id: u64,
    #[serde(default)]
    pub cancel_pending_calls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartCallRequest {
    pub operation_id: OperationId,
    pub session_id: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub fail_on_crash: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartCallResponse {
    pub call_id: CallId,
    pub started_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndCallRequest {
    pub operation_id: OperationId,
    pub call_id: CallId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailCallRequest {
    pub operation_id: OperationId,
    pub call_id: CallId,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallFrameRequest {
    pub operation_id: OperationId,
    pub call_id: CallId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmptyResponse {}

fn default_true() -> bool {
    true
}
