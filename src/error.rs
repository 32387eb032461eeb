//! Error types for the capture engine.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use cdp_capture::{Result, Error};
//!
//! async fn example(handle: &EngineHandle) -> Result<()> {
//!     let attached = handle.start(tab_id).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Attachment | [`Error::Attach`], [`Error::TabNotFound`] |
//! | Commands | [`Error::Command`], [`Error::SessionNotFound`] |
//! | Bodies | [`Error::BodyRetrieval`] |
//! | Protocol | [`Error::Protocol`] |
//! | Connection | [`Error::ConnectionClosed`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! Most command failures are swallowed at their call site (best-effort,
//! per-target): the variants here exist so the swallow sites can log a
//! structured cause, not so callers propagate them past the engine
//! boundary. Only a failed `start` surfaces to the caller, as `false`.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{NetworkRequestId, SessionId, TabId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Attachment Errors
    // ========================================================================
    /// Debugger attach to a tab failed.
    ///
    /// Transient; surfaced to the caller as a boolean `false` from
    /// `start`, never retried automatically by the engine itself.
    #[error("Attach failed for tab {tab_id}: {message}")]
    Attach {
        /// Tab that could not be attached.
        tab_id: TabId,
        /// Description of the attach failure.
        message: String,
    },

    /// Tab is not attached or not known to the engine.
    #[error("Tab not found: {tab_id}")]
    TabNotFound {
        /// The missing tab ID.
        tab_id: TabId,
    },

    // ========================================================================
    // Command Errors
    // ========================================================================
    /// A protocol command failed.
    ///
    /// Best-effort call sites (domain enablement, config reapplication,
    /// detach) swallow this per target and continue.
    #[error("Command {method} failed: {message}")]
    Command {
        /// Protocol method that failed.
        method: String,
        /// Error message from the browser.
        message: String,
    },

    /// Session is not registered with any connection.
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// The missing session ID.
        session_id: SessionId,
    },

    // ========================================================================
    // Body Errors
    // ========================================================================
    /// Response body retrieval failed.
    ///
    /// Non-fatal: the record stores an empty body with a default
    /// encoding tag instead of propagating this.
    #[error("Body retrieval failed for request {request_id}: {message}")]
    BodyRetrieval {
        /// Request whose body could not be fetched.
        request_id: NetworkRequestId,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection to the browser closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an attach error.
    #[inline]
    pub fn attach(tab_id: TabId, message: impl Into<String>) -> Self {
        Self::Attach {
            tab_id,
            message: message.into(),
        }
    }

    /// Creates a tab not found error.
    #[inline]
    pub fn tab_not_found(tab_id: TabId) -> Self {
        Self::TabNotFound { tab_id }
    }

    /// Creates a command error.
    #[inline]
    pub fn command(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Creates a session not found error.
    #[inline]
    pub fn session_not_found(session_id: SessionId) -> Self {
        Self::SessionNotFound { session_id }
    }

    /// Creates a body retrieval error.
    #[inline]
    pub fn body_retrieval(request_id: NetworkRequestId, message: impl Into<String>) -> Self {
        Self::BodyRetrieval {
            request_id,
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::WebSocket(_))
    }

    /// Returns `true` if this error may succeed on retry.
    ///
    /// Attach failures are transient by design: the caller may retry,
    /// and the idempotent new-tab triggers do so naturally.
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Attach { .. } | Self::Command { .. } | Self::ConnectionClosed
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_attach_error_display() {
        let tab = TabId::new(101).unwrap();
        let err = Error::attach(tab, "target crashed");
        assert_eq!(err.to_string(), "Attach failed for tab 101: target crashed");
    }

    #[test]
    fn test_command_error_display() {
        let err = Error::command("Network.enable", "not allowed");
        assert_eq!(err.to_string(), "Command Network.enable failed: not allowed");
    }

    #[test]
    fn test_is_transient() {
        let tab = TabId::new(1).unwrap();
        let attach_err = Error::attach(tab, "busy");
        let proto_err = Error::protocol("bad frame");

        assert!(attach_err.is_transient());
        assert!(!proto_err.is_transient());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::protocol("x").is_connection_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "socket gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
