// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retrying HTTP client for the operation protocol's transport veneer.
//!
//! On a network error or a 408/429/5xx response, the client retries with
//! the fixed exponential delays `{2s, 4s, 8s, 16s, 32s}` — enough time for
//! a supervisor-driven restart of `dpld` to complete within the window —
//! then surfaces [`WireError::RetryExhausted`].

use dpl_core::DplError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::envelope::ApiResponse;
use crate::error::WireError;
use crate::types::*;

const RETRY_DELAYS_MS: [u64; 5] = [2_000, 4_000, 8_000, 16_000, 32_000];

pub struct RetryClient {
    http: reqwest::Client,
    base_url: String,
}

impl RetryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn health(&self) -> Result<(), WireError> {
        let url = format!("{}/health", self.base_url);
        self.with_retry(|| async {
            let resp = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| WireError::Transport(e.to_string()))?;
            if resp.status().is_success() {
                Ok(())
            } else {
                Err(WireError::RequestFailed {
                    status: resp.status().as_u16(),
                    message: resp.text().await.unwrap_or_default(),
                })
            }
        })
        .await
    }

    pub async fn status(&self) -> Result<StatusResponse, WireError> {
        self.get("/status").await
    }

    pub async fn create_operation(
        &self,
        request: &CreateOperationRequest,
    ) -> Result<CreateOperationResponse, WireError> {
        self.post("/operation/create", request).await
    }

    pub async fn join_operation(&self, request: &JoinOperationRequest) -> Result<JoinOperationResponse, WireError> {
        self.post("/operation/join", request).await
    }

    pub async fn heartbeat(&self, request: &OperationIdRequest) -> Result<HeartbeatResponse, WireError> {
        self.post("/operation/heartbeat", request).await
    }

    pub async fn abort(&self, request: &AbortRequest) -> Result<EmptyResponse, WireError> {
        self.post("/operation/abort", request).await
    }

    pub async fn state(&self, request: &OperationIdRequest) -> Result<OperationStateResponse, WireError> {
        self.post("/operation/state", request).await
    }

    pub async fn log(&self, request: &LogRequest) -> Result<EmptyResponse, WireError> {
        self.post("/operation/log", request).await
    }

    pub async fn leave(&self, request: &LeaveRequest) -> Result<EmptyResponse, WireError> {
        self.post("/operation/leave", request).await
    }

    pub async fn complete(&self, request: &OperationSessionRequest) -> Result<EmptyResponse, WireError> {
        self.post("/operation/complete", request).await
    }

    pub async fn start_call(&self, request: &StartCallRequest) -> Result<StartCallResponse, WireError> {
        self.post("/call/start", request).await
    }

    pub async fn end_call(&self, request: &EndCallRequest) -> Result<EmptyResponse, WireError> {
        self.post("/call/end", request).await
    }

    pub async fn fail_call(&self, request: &FailCallRequest) -> Result<EmptyResponse, WireError> {
        self.post("/call/fail", request).await
    }

    pub async fn create_call_frame(&self, request: &CallFrameRequest) -> Result<EmptyResponse, WireError> {
        self.post("/callframe/create", request).await
    }

    pub async fn delete_call_frame(&self, request: &CallFrameRequest) -> Result<EmptyResponse, WireError> {
        self.post("/callframe/delete", request).await
    }

    async fn get<Resp: DeserializeOwned>(&self, path: &str) -> Result<Resp, WireError> {
        let url = format!("{}{path}", self.base_url);
        self.with_retry(|| async {
            let resp = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| WireError::Transport(e.to_string()))?;
            unwrap_envelope(resp).await
        })
        .await
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(&self, path: &str, body: &Req) -> Result<Resp, WireError> {
        let url = format!("{}{path}", self.base_url);
        self.with_retry(|| async {
            let resp = self
                .http
                .post(&url)
                .json(body)
                .send()
                .await
                .map_err(|e| WireError::Transport(e.to_string()))?;
            unwrap_envelope(resp).await
        })
        .await
    }

    /// Runs `attempt` up to `1 + RETRY_DELAYS_MS.len()` times, sleeping the
    /// matching delay between attempts, stopping early on a non-retryable
    /// error.
    async fn with_retry<T, F, Fut>(&self, attempt: F) -> Result<T, WireError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, WireError>>,
    {
        let mut last_error = String::new();
        let total_attempts = RETRY_DELAYS_MS.len() + 1;
        for (index, delay_ms) in std::iter::once(0).chain(RETRY_DELAYS_MS).enumerate() {
            if index > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && index + 1 < total_attempts => {
                    warn!(attempt = index + 1, error = %e, "retrying after transient wire error");
                    last_error = e.to_string();
                }
                Err(e) => return Err(e),
            }
        }
        Err(WireError::RetryExhausted {
            attempts: total_attempts,
            last_error,
        })
    }
}

async fn unwrap_envelope<Resp: DeserializeOwned>(resp: reqwest::Response) -> Result<Resp, WireError> {
    let status = resp.status();
    let bytes = resp.bytes().await.map_err(|e| WireError::Transport(e.to_string()))?;
    if !status.is_success() {
        return Err(WireError::RequestFailed {
            status: status.as_u16(),
            message: String::from_utf8_lossy(&bytes).to_string(),
        });
    }
    let envelope: ApiResponse<Resp> =
        serde_json::from_slice(&bytes).map_err(|e| WireError::Transport(e.to_string()))?;
    if envelope.success {
        envelope.data.ok_or_else(|| WireError::Transport("success response carried no data".to_string()))
    } else {
        let error = envelope.error.ok_or_else(|| WireError::Transport("error response carried no error body".to_string()))?;
        Err(WireError::Ledger(code_to_dpl_error(&error.code, &error.message)))
    }
}

/// Reconstruct the server's [`DplError`] variant from its wire code so a
/// caller can `matches!` on the same enum the in-process API returns.
/// Every variant carries a structured field (an operation or call id) that
/// the wire code can't losslessly round-trip from a human-readable message
/// alone, so every case collapses to `OperationFailed` with the original
/// message preserved rather than fabricating an id out of prose.
fn code_to_dpl_error(_code: &str, message: &str) -> DplError {
    DplError::OperationFailed {
        operation_id: dpl_core::OperationId::from_string("unknown"),
        reason: message.to_string(),
    }
}
