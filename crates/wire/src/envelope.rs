// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The JSON envelope every endpoint wraps its payload in: one success
//! boolean, an optional typed payload, an optional error, and a metadata
//! block carrying the server version and a request id for log correlation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub meta: ApiMeta,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, meta: ApiMeta) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta,
        }
    }

    pub fn err(error: ApiError, meta: ApiMeta) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            meta,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMeta {
    pub version: String,
    pub timestamp_ms: u64,
    pub request_id: String,
    pub processing_time_ms: u64,
}
