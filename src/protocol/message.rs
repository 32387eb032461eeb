//! Command envelope and response message types.
//!
//! Defines the wire format for commands sent to the browser and the
//! responses it returns over the debugging connection.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{CommandId, SessionId};

use super::Command;

// ============================================================================
// CommandEnvelope
// ============================================================================

/// A command sent to the browser.
///
/// With flattened session routing every command travels over the root
/// connection; commands addressed to an auto-attached child carry the
/// child's `sessionId` in the envelope.
///
/// # Format
///
/// ```json
/// {
///   "id": 12,
///   "sessionId": "8FDF...",
///   "method": "Network.enable",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct CommandEnvelope {
    /// Identifier for command/response correlation.
    pub id: CommandId,

    /// Child session to address, if any.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    /// Command with method and params.
    #[serde(flatten)]
    pub command: Command,
}

impl CommandEnvelope {
    /// Creates an envelope addressed to the root target.
    #[inline]
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            id: CommandId::next(),
            session_id: None,
            command,
        }
    }

    /// Creates an envelope addressed to a child session.
    #[inline]
    #[must_use]
    pub fn for_session(session_id: SessionId, command: Command) -> Self {
        Self {
            id: CommandId::next(),
            session_id: Some(session_id),
            command,
        }
    }
}

// ============================================================================
// CommandResponse
// ============================================================================

/// A command response from the browser.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 12, "result": { ... } }
/// ```
///
/// Error:
/// ```json
/// { "id": 12, "error": { "code": -32000, "message": "..." } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CommandResponse {
    /// Matches the command `id`.
    pub id: CommandId,

    /// Session the response arrived over, if a child session.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error payload (if failure).
    #[serde(default)]
    pub error: Option<ResponseError>,
}

impl CommandResponse {
    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Extracts the result value, mapping a protocol error payload to
    /// [`Error::Command`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if the browser reported an error.
    pub fn into_result(self, method: &str) -> Result<Value> {
        match self.error {
            None => Ok(self.result.unwrap_or(Value::Null)),
            Some(err) => Err(Error::command(method, err.message)),
        }
    }

    /// Gets a string value from the result.
    ///
    /// Returns empty string if key not found or not a string.
    #[inline]
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.result
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Gets a boolean value from the result.
    ///
    /// Returns false if key not found or not a boolean.
    #[inline]
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.result
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(|v| v.as_bool())
            .unwrap_or_default()
    }
}

// ============================================================================
// ResponseError
// ============================================================================

/// Error payload of a failed command response.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseError {
    /// Protocol error code.
    #[serde(default)]
    pub code: i64,
    /// Human-readable error message.
    #[serde(default)]
    pub message: String,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::NetworkCommand;

    #[test]
    fn test_root_envelope_omits_session() {
        let envelope = CommandEnvelope::new(Command::Network(NetworkCommand::enable()));
        let json = serde_json::to_value(&envelope).expect("serialize");

        assert!(json.get("sessionId").is_none());
        assert_eq!(json["method"], "Network.enable");
        assert!(json["id"].as_u64().is_some());
    }

    #[test]
    fn test_session_envelope_carries_session() {
        let session = SessionId::from("CHILD-1");
        let envelope =
            CommandEnvelope::for_session(session, Command::Network(NetworkCommand::enable()));
        let json = serde_json::to_value(&envelope).expect("serialize");

        assert_eq!(json["sessionId"], "CHILD-1");
    }

    #[test]
    fn test_success_response() {
        let json_str = r#"{ "id": 3, "result": { "body": "hi", "base64Encoded": false } }"#;

        let response: CommandResponse = serde_json::from_str(json_str).expect("parse");
        assert!(response.is_success());
        assert_eq!(response.get_string("body"), "hi");
        assert!(!response.get_bool("base64Encoded"));
    }

    #[test]
    fn test_error_response() {
        let json_str = r#"{
            "id": 4,
            "error": { "code": -32000, "message": "No resource with given identifier" }
        }"#;

        let response: CommandResponse = serde_json::from_str(json_str).expect("parse");
        assert!(!response.is_success());

        let err = response
            .into_result("Network.getResponseBody")
            .expect_err("should map to command error");
        assert!(err.to_string().contains("Network.getResponseBody"));
    }

    #[test]
    fn test_into_result_null_when_empty() {
        let json_str = r#"{ "id": 5 }"#;
        let response: CommandResponse = serde_json::from_str(json_str).expect("parse");
        let value = response.into_result("Page.enable").expect("success");
        assert!(value.is_null());
    }
}
