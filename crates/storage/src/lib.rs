// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dpl-storage: the on-disk Store.
//!
//! Serializes every read-modify-write of an operation record, produces a
//! backup snapshot before every mutation, and bounds the layout of the
//! files a single operation owns on disk. Every mutating entry point holds
//! the advisory lock across read → backup → write; plain reads hold it only
//! across the single read.

pub mod lock;
pub mod paths;
pub mod store;
pub mod trail;

pub use lock::{LockConfig, OperationLock};
pub use paths::OperationPaths;
pub use store::Store;
