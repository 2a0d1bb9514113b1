// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-level error taxonomy. A thin wrapper around [`dpl_core::DplError`]
//! rather than a parallel hierarchy — the two extra variants here only
//! exist because the network adds failure modes the in-process API never
//! sees.

use dpl_core::DplError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    /// The ledger itself rejected the request (forwarded from the server's
    /// `ApiError`, reconstructed into the same enum the in-process API
    /// returns so callers don't need a second match arm set).
    #[error(transparent)]
    Ledger(#[from] DplError),

    /// A network-level failure talking to the daemon (connection refused,
    /// TLS failure, timeout, malformed body).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request received a non-2xx, non-retryable status.
    #[error("request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    /// The client's retry budget was exhausted without a successful
    /// response. `attempts` counts every request sent, including the first.
    #[error("retry budget exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: usize, last_error: String },
}

impl WireError {
    /// Status codes and error conditions the retry client treats as worth
    /// another attempt: network errors, 408, 429, and 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Ledger(e) => e.is_retryable(),
            Self::Transport(_) => true,
            Self::RequestFailed { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            Self::RetryExhausted { .. } => false,
        }
    }
}
