//! Type-safe identifiers for capture entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! # Identifier Types
//!
//! | Type | Backing | Source |
//! |------|---------|--------|
//! | [`TabId`] | `u32` | Browser tab (logical capture target) |
//! | [`SessionId`] | `String` | Protocol session of an attached target |
//! | [`TargetId`] | `String` | Debugging-protocol target |
//! | [`NetworkRequestId`] | `String` | Network request within a tab |
//! | [`CommandId`] | `u64` | Command/response correlation |
//! | [`RecordId`] | `String` | Published request record |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// TabId
// ============================================================================

/// Identifier of a browser tab treated as one continuous capture target.
///
/// Stable across protocol session churn: child sessions resolve back to a
/// `TabId`, and request records are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(u32);

impl TabId {
    /// Creates a tab ID. Returns `None` for 0 (browsers start at 1).
    #[inline]
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        (id != 0).then_some(Self(id))
    }

    /// Returns the raw tab ID value.
    #[inline]
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SessionId
// ============================================================================

/// Ephemeral protocol session identifier of an attached target.
///
/// Assigned by the browser per attachment, including auto-attached
/// children. Globally unique among concurrently alive sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session ID from its protocol string form.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the session ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    #[inline]
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// TargetId
// ============================================================================

/// Debugging-protocol target identifier.
///
/// Carried by target-attached notifications; used to resolve a child
/// session back to a logical tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// Creates a target ID from its protocol string form.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the target ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// NetworkRequestId
// ============================================================================

/// Network request identifier from the debugging protocol.
///
/// Unique only within a tab's lifetime, never globally, and may be reused
/// by the protocol across a redirect hop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkRequestId(String);

impl NetworkRequestId {
    /// Creates a request ID from its protocol string form.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the request ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkRequestId {
    #[inline]
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// CommandId
// ============================================================================

/// Command/response correlation counter.

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier correlating a protocol command with its response.
///
/// Monotonically increasing per process, per the protocol's integer
/// message-id scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Returns the next command ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a command ID from a raw value (deserialization path).
    #[inline]
    #[must_use]
    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// RecordId
// ============================================================================

/// External identifier of a published request record.
///
/// Derived from `(tab, request id)`; redirect hops under a recycled
/// request id get a distinct `:r<hop>` suffix so both stages stay
/// addressable after the split.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Builds the record ID for the first slot of `(tab, request id)`.
    #[inline]
    #[must_use]
    pub fn new(tab_id: TabId, request_id: &NetworkRequestId) -> Self {
        Self(format!("{tab_id}:{request_id}"))
    }

    /// Builds the record ID for redirect hop `hop` (1-based) of the pair.
    #[inline]
    #[must_use]
    pub fn with_hop(tab_id: TabId, request_id: &NetworkRequestId, hop: u32) -> Self {
        Self(format!("{tab_id}:{request_id}:r{hop}"))
    }

    /// Returns the record ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_id_rejects_zero() {
        assert!(TabId::new(0).is_none());
        assert_eq!(TabId::new(7).map(TabId::value), Some(7));
    }

    #[test]
    fn test_command_id_monotonic() {
        let a = CommandId::next();
        let b = CommandId::next();
        assert!(b.value() > a.value());
    }

    #[test]
    fn test_record_id_format() {
        let tab = TabId::new(101).unwrap();
        let req = NetworkRequestId::from("req-1");

        assert_eq!(RecordId::new(tab, &req).as_str(), "101:req-1");
        assert_eq!(RecordId::with_hop(tab, &req, 2).as_str(), "101:req-1:r2");
    }

    #[test]
    fn test_session_id_serde_transparent() {
        let session = SessionId::from("ABCDEF");
        let json = serde_json::to_string(&session).expect("serialize");
        assert_eq!(json, "\"ABCDEF\"");

        let back: SessionId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, session);
    }
}
