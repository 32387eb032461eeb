//! Control and stream channel types.
//!
//! The UI collaborator speaks JSON on two channels:
//!
//! - **Control** (request/response): messages tagged with the `__netcap`
//!   marker carrying a `cmd` plus optional `payload`. Unrecognized
//!   commands (and messages without the marker) answer `null`.
//! - **Stream** (push): frames tagged with the `__netcapStream` marker
//!   wrapping a [`Notification`].
//!
//! # Commands
//!
//! | `cmd` | Payload | Result |
//! |-------|---------|--------|
//! | `getAll` | - | attachment state + full record table |
//! | `start` | `{tabId}` | `true`/`false` |
//! | `stop` | - | `true` |
//! | `clear` | - | `true` |
//! | `setThrottle` | `{value: none\|moderate\|degraded}` | `true` |
//! | `setCacheDisabled` | `{value: bool}` | `true` |

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::capture::{EngineHandle, Notification};
use crate::error::Result;
use crate::identifiers::TabId;
use crate::protocol::ThrottleProfile;

// ============================================================================
// Markers
// ============================================================================

/// Marker key identifying control messages.
pub const CONTROL_MARKER: &str = "__netcap";

/// Marker key identifying stream frames.
pub const STREAM_MARKER: &str = "__netcapStream";

// ============================================================================
// ControlCommand
// ============================================================================

/// A decoded control command.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Snapshot attachment state and all records.
    GetAll,
    /// Start capturing a tab.
    Start {
        /// Target tab; absent or zero answers `false`.
        tab_id: Option<u32>,
    },
    /// Stop the capture.
    Stop,
    /// Empty the record table.
    Clear,
    /// Set the throttle profile.
    SetThrottle {
        /// Profile name; unrecognized names fall back to `none`.
        value: ThrottleProfile,
    },
    /// Set the cache-bypass flag.
    SetCacheDisabled {
        /// New flag value.
        value: bool,
    },
}

impl ControlCommand {
    /// Decodes a control message.
    ///
    /// Returns `None` for messages without the marker and for
    /// unrecognized commands; payload fields are extracted leniently the
    /// way the wire format allows callers to omit them.
    #[must_use]
    pub fn parse(message: &Value) -> Option<Self> {
        if message.get(CONTROL_MARKER).and_then(Value::as_bool) != Some(true) {
            return None;
        }
        let payload = message.get("payload");

        match message.get("cmd")?.as_str()? {
            "getAll" => Some(Self::GetAll),
            "start" => Some(Self::Start {
                tab_id: payload
                    .and_then(|p| p.get("tabId"))
                    .and_then(Value::as_u64)
                    .map(|id| id as u32),
            }),
            "stop" => Some(Self::Stop),
            "clear" => Some(Self::Clear),
            "setThrottle" => Some(Self::SetThrottle {
                value: payload
                    .and_then(|p| p.get("value"))
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default(),
            }),
            "setCacheDisabled" => Some(Self::SetCacheDisabled {
                value: payload
                    .and_then(|p| p.get("value"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            }),
            _ => None,
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Decodes and executes one control message against the engine.
///
/// Messages without the control marker, with an unrecognized `cmd`, or
/// with an undecodable payload answer `Value::Null`; they are never an
/// error.
///
/// # Errors
///
/// Only engine-loss errors propagate (the loop is gone); command-level
/// failures are part of the result value.
pub async fn dispatch_control(handle: &EngineHandle, message: &Value) -> Result<Value> {
    let Some(command) = ControlCommand::parse(message) else {
        debug!("Unrecognized control message");
        return Ok(Value::Null);
    };

    match command {
        ControlCommand::GetAll => Ok(serde_json::to_value(handle.get_all().await?)?),
        ControlCommand::Start { tab_id } => match TabId::new(tab_id.unwrap_or(0)) {
            Some(tab_id) => Ok(json!(handle.start(tab_id).await?)),
            None => Ok(json!(false)),
        },
        ControlCommand::Stop => {
            handle.stop().await?;
            Ok(json!(true))
        }
        ControlCommand::Clear => {
            handle.clear().await?;
            Ok(json!(true))
        }
        ControlCommand::SetThrottle { value } => {
            handle.set_throttle(value).await?;
            Ok(json!(true))
        }
        ControlCommand::SetCacheDisabled { value } => {
            handle.set_cache_disabled(value).await?;
            Ok(json!(true))
        }
    }
}

// ============================================================================
// StreamFrame
// ============================================================================

/// A stream-channel frame wrapping one notification.
#[derive(Debug, Clone, Serialize)]
pub struct StreamFrame {
    /// Always `true`; lets mixed-channel consumers route frames.
    #[serde(rename = "__netcapStream")]
    pub marker: bool,
    /// The wrapped notification (`event` + `data`).
    #[serde(flatten)]
    pub notification: Notification,
}

impl StreamFrame {
    /// Wraps a notification for the stream channel.
    #[inline]
    #[must_use]
    pub fn new(notification: Notification) -> Self {
        Self {
            marker: true,
            notification,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::capture::CaptureEngine;
    use crate::identifiers::SessionId;
    use crate::protocol::Command;
    use crate::transport::Debugger;

    use super::*;

    /// Debugger that accepts everything and answers nothing of note.
    struct NoopDebugger;

    #[async_trait]
    impl Debugger for NoopDebugger {
        async fn attach(&self, _tab_id: TabId) -> Result<()> {
            Ok(())
        }

        async fn detach(&self, _tab_id: TabId) -> Result<()> {
            Ok(())
        }

        async fn command(
            &self,
            _tab_id: TabId,
            _session_id: Option<SessionId>,
            _command: Command,
        ) -> Result<Value> {
            Ok(json!({}))
        }
    }

    fn engine() -> (
        EngineHandle,
        mpsc::UnboundedSender<crate::transport::TransportEvent>,
    ) {
        let (transport, transport_rx) = mpsc::unbounded_channel();
        let handle = CaptureEngine::spawn(Arc::new(NoopDebugger), transport_rx);
        (handle, transport)
    }

    #[test]
    fn test_command_decoding() {
        let msg = json!({ "__netcap": true, "cmd": "start", "payload": { "tabId": 101 } });
        assert_eq!(
            ControlCommand::parse(&msg),
            Some(ControlCommand::Start { tab_id: Some(101) })
        );

        let msg = json!({ "__netcap": true, "cmd": "setThrottle", "payload": { "value": "degraded" } });
        assert_eq!(
            ControlCommand::parse(&msg),
            Some(ControlCommand::SetThrottle {
                value: ThrottleProfile::Degraded
            })
        );

        // Unrecognized throttle names fall back to none.
        let msg = json!({ "__netcap": true, "cmd": "setThrottle", "payload": { "value": "warp" } });
        assert_eq!(
            ControlCommand::parse(&msg),
            Some(ControlCommand::SetThrottle {
                value: ThrottleProfile::None
            })
        );

        // No marker, no command.
        assert_eq!(ControlCommand::parse(&json!({ "cmd": "stop" })), None);
    }

    #[tokio::test]
    async fn test_dispatch_start_and_get_all() {
        let (handle, _transport) = engine();

        let result = dispatch_control(
            &handle,
            &json!({ "__netcap": true, "cmd": "start", "payload": { "tabId": 101 } }),
        )
        .await
        .unwrap();
        assert_eq!(result, json!(true));

        let result = dispatch_control(&handle, &json!({ "__netcap": true, "cmd": "getAll" }))
            .await
            .unwrap();
        assert_eq!(result["attached"], true);
        assert_eq!(result["tabId"], 101);
        assert_eq!(result["entries"], json!([]));
    }

    #[tokio::test]
    async fn test_dispatch_start_without_tab_is_false() {
        let (handle, _transport) = engine();

        let result = dispatch_control(&handle, &json!({ "__netcap": true, "cmd": "start" }))
            .await
            .unwrap();
        assert_eq!(result, json!(false));

        let result = dispatch_control(
            &handle,
            &json!({ "__netcap": true, "cmd": "start", "payload": { "tabId": 0 } }),
        )
        .await
        .unwrap();
        assert_eq!(result, json!(false));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_command_is_null() {
        let (handle, _transport) = engine();

        let result = dispatch_control(&handle, &json!({ "__netcap": true, "cmd": "openDash" }))
            .await
            .unwrap();
        assert_eq!(result, Value::Null);

        // Foreign messages without the marker are not ours either.
        let result = dispatch_control(&handle, &json!({ "cmd": "start" })).await.unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_dispatch_stop_clear_config_ack() {
        let (handle, _transport) = engine();

        for msg in [
            json!({ "__netcap": true, "cmd": "stop" }),
            json!({ "__netcap": true, "cmd": "clear" }),
            json!({ "__netcap": true, "cmd": "setThrottle", "payload": { "value": "moderate" } }),
            json!({ "__netcap": true, "cmd": "setCacheDisabled", "payload": { "value": true } }),
        ] {
            let result = dispatch_control(&handle, &msg).await.unwrap();
            assert_eq!(result, json!(true));
        }
    }

    #[test]
    fn test_stream_frame_shape() {
        let frame = StreamFrame::new(Notification::Stopped {});
        let json = serde_json::to_value(&frame).expect("serialize");

        assert_eq!(json["__netcapStream"], true);
        assert_eq!(json["event"], "stopped");
    }
}
