// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types for the ledger's data model.
//!
//! `OperationId` follows the durable naming contract used throughout the
//! system: it is not a
//! random token but a sortable, human-legible composite of the creation
//! timestamp, the initiating participant, and a short random suffix to
//! break ties. `ParticipantId` and `CallId` are caller-supplied labels in
//! most of the scenarios this system models ("cliRoot", "bridge", "root")
//! so they wrap a plain string rather than forcing random generation,
//! while still supporting `new()` for callers that want one minted.
//! `SessionId` is an opaque integer counter:
//! callers must never do arithmetic on it, only compare and quote it in
//! the `(operationId, sessionId)` tuple.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for one logical operation.
///
/// Format: `YYYYMMDDTHH:MM:SS.mmm-<initiator>-<8 hex>`. The timestamp
/// prefix keeps a directory listing of operation records roughly
/// chronological; the initiator and random suffix keep it unique even
/// when two initiators start an operation in the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Mint a fresh operation ID for an operation started by `initiator`.
    pub fn generate(initiator: &str) -> Self {
        let now = Utc::now();
        let stamp = now.format("%Y%m%dT%H:%M:%S");
        let millis = now.timestamp_subsec_millis();
        let suffix = random_hex(8);
        Self(format!("{stamp}.{millis:03}-{initiator}-{suffix}"))
    }

    /// Wrap an existing string (e.g. one read back from disk or passed in
    /// over the wire). No format validation is performed: unknown formats
    /// are accepted as opaque identifiers so that older records remain
    /// readable after a naming-contract change.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for OperationId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl AsRef<str> for OperationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A participant's self-chosen label (e.g. `"cli"`, `"worker"`, `"bridge"`).
///
/// Participants name themselves; there is no central registry of valid
/// names. Two participants with the same `ParticipantId` string within
/// one operation are, by this system's rules, the same logical
/// participant (see Rule 3/4's `supervisorId` matching).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for ParticipantId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl std::borrow::Borrow<str> for ParticipantId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identifier for a call frame, unique within one operation.
///
/// Frequently caller-supplied (`"root"`, `"c1"`) to keep forensic logs
/// legible; [`CallId::generate`] is available for callers that don't
/// care to name their own frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub const ROOT: &'static str = "root";

    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Mint an unnamed call ID (used by `spawnCall` when the application
    /// does not supply its own).
    pub fn generate() -> Self {
        Self(format!("call-{}", random_hex(12)))
    }

    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for CallId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl std::borrow::Borrow<str> for CallId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Opaque per-process join counter. Sessions are compared for equality
/// and quoted in cross-process references; arithmetic on the value is
/// intentionally not exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Expose the raw counter value for callers (the wire veneer, logs)
    /// that need to quote a session id in a format `SessionId` itself
    /// doesn't implement arithmetic or construction for. Minting a new
    /// `SessionId` still only happens through [`SessionIdGen`].
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out opaque, monotonically increasing [`SessionId`]s for one
/// process's joins into one operation.
#[derive(Debug, Default)]
pub struct SessionIdGen {
    next: u64,
}

impl SessionIdGen {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> SessionId {
        let id = SessionId::from_raw(self.next);
        self.next += 1;
        id
    }
}

fn random_hex(len: usize) -> String {
    let alphabet: &[char] = &[
        '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
    ];
    nanoid::nanoid!(len, alphabet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_id_embeds_initiator() {
        let id = OperationId::generate("cli");
        assert!(id.as_str().contains("-cli-"));
    }

    #[test]
    fn operation_id_round_trips_through_string() {
        let id = OperationId::generate("worker");
        let back = OperationId::from_string(id.as_str());
        assert_eq!(id, back);
    }

    #[test]
    fn session_ids_are_monotonic_and_opaque() {
        let mut gen = SessionIdGen::new();
        let a = gen.next_id();
        let b = gen.next_id();
        assert_ne!(a, b);
        assert!(a.to_string().parse::<u64>().unwrap() < b.to_string().parse::<u64>().unwrap());
    }

    #[test]
    fn call_id_root_is_stable() {
        assert_eq!(CallId::root().as_str(), "root");
    }
}
