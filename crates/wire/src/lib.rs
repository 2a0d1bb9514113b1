// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dpl-wire: the optional HTTP transport veneer's request/response schema
//! and retrying client.
//!
//! This crate carries no server logic — `dpl-daemon` owns the `warp`
//! routes. It defines the wire types both sides speak and a [`RetryClient`]
//! so a remote participant can drive the same operation protocol
//! `dpl-engine::Operation` exposes in-process.

pub mod client;
pub mod envelope;
pub mod error;
pub mod types;


pub use client::RetryClient;
pub use envelope::{ApiError, ApiMeta, ApiResponse};
pub use error::WireError;
