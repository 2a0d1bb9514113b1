// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The HTTP veneer: one `warp` filter per endpoint in the wire contract,
//! combined into a single service with CORS, access logging, and a
//! `recover` handler that maps rejections onto the same JSON envelope the
//! happy path uses. Shaped after the teacher's `RestAPI::build_routes` —
//! path-and-method filters `.and_then`-ed into a handler, joined with `.or`.

use std::convert::Infallible;
use std::sync::Arc;

use dpl_core::{CallId, Clock, DplError, OperationId, SystemClock};
use dpl_engine::{LogLevel, ParticipantIdentity};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use dpl_wire::envelope::{ApiError, ApiMeta, ApiResponse};
use dpl_wire::types::*;

use crate::state::AppState;

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn build_routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let with_state = warp::any().map(move || state.clone());

    let health = warp::path("health")
        .and(warp::get())
        .and_then(handle_health);

    let status = warp::path("status")
        .and(warp::get())
        .and(with_state.clone())
        .and_then(handle_status);

    let create_operation = warp::path!("operation" / "create")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_create_operation);

    let join_operation = warp::path!("operation" / "join")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_join_operation);

    let heartbeat = warp::path!("operation" / "heartbeat")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_heartbeat);

    let abort = warp::path!("operation" / "abort")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_abort);

    let op_state = warp::path!("operation" / "state")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_state);

    let log = warp::path!("operation" / "log")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_log);

    let leave = warp::path!("operation" / "leave")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_leave);

    let complete = warp::path!("operation" / "complete")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_complete);

    let start_call = warp::path!("call" / "start")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_start_call);

    let end_call = warp::path!("call" / "end")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_end_call);

    let fail_call = warp::path!("call" / "fail")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_fail_call);

    let create_frame = warp::path!("callframe" / "create")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(handle_create_frame);

    let delete_frame = warp::path!("callframe" / "delete")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state)
        .and_then(handle_delete_frame);

    health
        .or(status)
        .or(create_operation)
        .or(join_operation)
        .or(heartbeat)
        .or(abort)
        .or(op_state)
        .or(log)
        .or(leave)
        .or(complete)
        .or(start_call)
        .or(end_call)
        .or(fail_call)
        .or(create_frame)
        .or(delete_frame)
        .with(warp::cors().allow_any_origin())
        .with(warp::log("dpld::api"))
        .recover(handle_rejection)
}

// -- helpers ---------------------------------------------------------------

fn meta() -> ApiMeta {
    ApiMeta {
        version: SERVER_VERSION.to_string(),
        timestamp_ms: now_ms(),
        request_id: CallId::generate().to_string(),
        processing_time_ms: 0,
    }
}

fn now_ms() -> u64 {
    SystemClock.epoch_ms()
}

/// Every handler's two branches must return the same concrete `Reply` type
/// for `impl Reply` to resolve, so the success path carries an explicit
/// `200` status alongside the error path's classified one.
fn ok_reply<T: serde::Serialize>(data: T) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(&ApiResponse::ok(data, meta())), StatusCode::OK)
}

fn error_reply(error: &DplError) -> warp::reply::WithStatus<warp::reply::Json> {
    let (code, status) = classify(error);
    let body = ApiResponse::<()>::err(
        ApiError {
            code: code.to_string(),
            message: error.to_string(),
            details: None,
        },
        meta(),
    );
    warp::reply::with_status(warp::reply::json(&body), status)
}

fn classify(error: &DplError) -> (&'static str, StatusCode) {
    match error {
        DplError::OperationNotFound { .. } => ("operation_not_found", StatusCode::NOT_FOUND),
        DplError::CallNotFound { .. } => ("call_not_found", StatusCode::NOT_FOUND),
        DplError::LockTimeout { .. } => ("lock_timeout", StatusCode::SERVICE_UNAVAILABLE),
        DplError::PendingCalls { .. } => ("pending_calls", StatusCode::CONFLICT),
        DplError::DuplicateCallId { .. } => ("duplicate_call_id", StatusCode::CONFLICT),
        DplError::StateMismatch { .. } => ("state_mismatch", StatusCode::CONFLICT),
        DplError::HeartbeatStale { .. } => ("heartbeat_stale", StatusCode::OK),
        DplError::AbortFlagSet { .. } => ("abort_flag_set", StatusCode::OK),
        DplError::OperationFailed { .. } => ("operation_failed", StatusCode::OK),
        DplError::Io(_) => ("io_error", StatusCode::INTERNAL_SERVER_ERROR),
        DplError::Serde(_) => ("serde_error", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Runs a synchronous ledger/operation call (file I/O, advisory-lock
/// busy-poll) on a blocking-pool thread so it never stalls the async
/// runtime the warp server shares with every other in-flight request.
async fn blocking<F, T>(f: F) -> Result<T, DplError>
where
    F: FnOnce() -> Result<T, DplError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(_) => Err(DplError::Io(std::io::Error::other("blocking task panicked"))),
    }
}

fn missing_session(operation_id: &OperationId) -> DplError {
    DplError::OperationNotFound {
        operation_id: operation_id.clone(),
    }
}

// -- handlers ----------------------------------------------------------------

async fn handle_health() -> Result<impl Reply, Rejection> {
    Ok(warp::reply::with_status("ok", StatusCode::OK))
}

async fn handle_status(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let uptime_ms = now_ms().saturating_sub(state.started_at_ms);
    Ok(ok_reply(StatusResponse {
        version: SERVER_VERSION.to_string(),
        uptime_ms,
        operation_count: state.operation_count(),
    }))
}

async fn handle_create_operation(
    request: CreateOperationRequest,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let identity = ParticipantIdentity {
        participant_id: request.participant_id,
        pid: request.participant_pid,
    };
    let ledger = state.ledger.clone();
    let result = blocking(move || ledger.create_operation(&identity, request.description)).await;
    match result {
        Ok(operation) => {
            let response = CreateOperationResponse {
                operation_id: operation.operation_id().clone(),
                session_id: operation.session_id().as_u64(),
                start_time_ms: now_ms(),
                is_initiator: operation.is_initiator(),
            };
            state.register(operation);
            Ok(ok_reply(response))
        }
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_join_operation(request: JoinOperationRequest, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let identity = ParticipantIdentity {
        participant_id: request.participant_id,
        pid: request.participant_pid,
    };
    let ledger = state.ledger.clone();
    let operation_id = request.operation_id.clone();
    let result = blocking(move || ledger.join_operation(&operation_id, &identity)).await;
    match result {
        Ok(operation) => {
            let response = JoinOperationResponse {
                session_id: operation.session_id().as_u64(),
                start_time_ms: now_ms(),
                is_initiator: operation.is_initiator(),
            };
            state.register(operation);
            Ok(ok_reply(response))
        }
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_heartbeat(request: OperationIdRequest, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let Some(operation) = state.any_session(&request.operation_id) else {
        return Ok(error_reply(&missing_session(&request.operation_id)));
    };
    let result = blocking(move || operation.heartbeat_now()).await;
    match result {
        Ok(tick) => Ok(ok_reply(HeartbeatResponse {
            abort_flag: tick.abort_flag,
            frame_count: tick.frame_count,
            temp_resource_count: tick.temp_resource_count,
            heartbeat_age_ms: tick.heartbeat_age_ms,
            is_stale: tick.is_stale,
            participants: tick.participants,
            stale_participants: tick.stale_participants,
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_abort(request: AbortRequest, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let Some(operation) = state.any_session(&request.operation_id) else {
        return Ok(error_reply(&missing_session(&request.operation_id)));
    };
    let value = request.value;
    let result = blocking(move || operation.set_abort_flag(value)).await;
    match result {
        Ok(()) => Ok(ok_reply(EmptyResponse {})),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_state(request: OperationIdRequest, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let Some(operation) = state.any_session(&request.operation_id) else {
        return Ok(error_reply(&missing_session(&request.operation_id)));
    };
    let result = blocking(move || operation.snapshot()).await;
    match result {
        Ok(record) => Ok(ok_reply(OperationStateResponse {
            operation_id: record.operation_id,
            status: record.status.to_string(),
            aborted: record.aborted,
            start_time_ms: record.start_time_ms,
            last_heartbeat_ms: record.last_heartbeat_ms,
            frame_count: record.call_frames.len(),
            participant_count: record.participants.len(),
            description: record.description,
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_log(request: LogRequest, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let Some(operation) = state.any_session(&request.operation_id) else {
        return Ok(error_reply(&missing_session(&request.operation_id)));
    };
    let level = parse_level(&request.level);
    let message = request.message;
    let result = blocking(move || operation.log(&message, level)).await;
    match result {
        Ok(()) => Ok(ok_reply(EmptyResponse {})),
        Err(e) => Ok(error_reply(&e)),
    }
}

fn parse_level(level: &str) -> LogLevel {
    match level.to_ascii_lowercase().as_str() {
        "debug" => LogLevel::Debug,
        "warn" => LogLevel::Warn,
        "error" => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

async fn handle_leave(request: LeaveRequest, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let Some(operation) = state.lookup(&request.operation_id, request.session_id) else {
        return Ok(error_reply(&missing_session(&request.operation_id)));
    };
    let cancel = request.cancel_pending_calls;
    let result = blocking(move || operation.leave(cancel)).await;
    match result {
        Ok(()) => {
            state.forget(&request.operation_id, request.session_id);
            Ok(ok_reply(EmptyResponse {}))
        }
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_complete(request: OperationSessionRequest, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let Some(operation) = state.lookup(&request.operation_id, request.session_id) else {
        return Ok(error_reply(&missing_session(&request.operation_id)));
    };
    let result = blocking(move || operation.complete()).await;
    match result {
        Ok(()) => {
            state.forget(&request.operation_id, request.session_id);
            Ok(ok_reply(EmptyResponse {}))
        }
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_start_call(request: StartCallRequest, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let Some(operation) = state.lookup(&request.operation_id, request.session_id) else {
        return Ok(error_reply(&missing_session(&request.operation_id)));
    };
    let call_id = CallId::generate();
    let response_call_id = call_id.clone();
    let description = request.description;
    let fail_on_crash = request.fail_on_crash;
    let result = blocking(move || {
        if let Some(description) = &description {
            let _ = operation.log(&format!("call {call_id} started: {description}"), LogLevel::Debug);
        }
        operation.start_bare_call(call_id, fail_on_crash)
    })
    .await;
    match result {
        Ok(()) => Ok(ok_reply(StartCallResponse {
            call_id: response_call_id,
            started_at_ms: now_ms(),
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_end_call(request: EndCallRequest, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let Some(operation) = state.any_session(&request.operation_id) else {
        return Ok(error_reply(&missing_session(&request.operation_id)));
    };
    let call_id = request.call_id;
    let result = blocking(move || operation.delete_call_frame(&call_id)).await;
    match result {
        Ok(()) => Ok(ok_reply(EmptyResponse {})),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_fail_call(request: FailCallRequest, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let Some(operation) = state.any_session(&request.operation_id) else {
        return Ok(error_reply(&missing_session(&request.operation_id)));
    };
    let call_id = request.call_id;
    let reason = request.error.unwrap_or_else(|| "remote call failed".to_string());
    let result = blocking(move || operation.fail_bare_call(&call_id, reason)).await;
    match result {
        Ok(()) => Ok(ok_reply(EmptyResponse {})),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_create_frame(request: CallFrameRequest, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let Some(operation) = state.any_session(&request.operation_id) else {
        return Ok(error_reply(&missing_session(&request.operation_id)));
    };
    let call_id = request.call_id;
    let result = blocking(move || operation.create_call_frame(call_id)).await;
    match result {
        Ok(()) => Ok(ok_reply(EmptyResponse {})),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_delete_frame(request: CallFrameRequest, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let Some(operation) = state.any_session(&request.operation_id) else {
        return Ok(error_reply(&missing_session(&request.operation_id)));
    };
    let call_id = request.call_id;
    let result = blocking(move || operation.delete_call_frame(&call_id)).await;
    match result {
        Ok(()) => Ok(ok_reply(EmptyResponse {})),
        Err(e) => Ok(error_reply(&e)),
    }
}

/// Maps routing/body-parsing rejections onto the same envelope the happy
/// path returns, so a client never has to special-case a bare-text 404.
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message, status) = if err.is_not_found() {
        ("not_found", "no such route".to_string(), StatusCode::NOT_FOUND)
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        ("bad_request", e.to_string(), StatusCode::BAD_REQUEST)
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ("method_not_allowed", "method not allowed".to_string(), StatusCode::METHOD_NOT_ALLOWED)
    } else {
        ("internal_error", "unhandled rejection".to_string(), StatusCode::INTERNAL_SERVER_ERROR)
    };
    let body = ApiResponse::<()>::err(
        ApiError {
            code: code.to_string(),
            message,
            details: None,
        },
        meta(),
    );
    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}
