//! Event message types.
//!
//! Events are notifications pushed by the browser over the debugging
//! connection when network or target activity occurs.
//!
//! # Event Types
//!
//! | Domain | Events |
//! |--------|--------|
//! | `Network` | `requestWillBeSent`, `requestWillBeSentExtraInfo`, `responseReceived`, `responseReceivedExtraInfo`, `loadingFinished`, `loadingFailed` |
//! | `Target` | `attachedToTarget`, `detachedFromTarget` |
//!
//! Payloads are duck-typed on the wire; parsing here is lossy-tolerant:
//! missing fields become defaults, unrecognized methods become
//! [`ParsedEvent::Unknown`], and a shape mismatch never escapes as an
//! error. The correlator decides what to do with the result.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::identifiers::{NetworkRequestId, SessionId, TargetId};

// ============================================================================
// Event
// ============================================================================

/// An event notification from the browser.
///
/// # Format
///
/// ```json
/// {
///   "method": "Network.requestWillBeSent",
///   "sessionId": "8FDF...",
///   "params": { ... }
/// }
/// ```
///
/// `sessionId` is present only for events originating from an
/// auto-attached child session (flattened routing).
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Event name in `Domain.eventName` format.
    pub method: String,

    /// Session the event arrived over, if a child session.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl Event {
    /// Returns the domain name from the method.
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Parses the event into a typed variant.
    #[must_use]
    pub fn parse(&self) -> ParsedEvent {
        self.parse_internal()
    }
}

// ============================================================================
// ResponsePayload
// ============================================================================

/// Response metadata carried by `responseReceived` and by the embedded
/// prior-response of a redirect hop.
#[derive(Debug, Clone, Default)]
pub struct ResponsePayload {
    /// Response URL.
    pub url: String,
    /// HTTP status code.
    pub status: u32,
    /// HTTP status text.
    pub status_text: String,
    /// Response headers as a name/value object.
    pub headers: Value,
    /// MIME type.
    pub mime_type: String,
    /// Negotiated protocol (e.g. `h2`).
    pub protocol: String,
    /// Remote endpoint IP address.
    pub remote_ip_address: String,
    /// Remote endpoint port.
    pub remote_port: u32,
    /// Opaque timing payload, if reported.
    pub timing: Option<Value>,
}

impl ResponsePayload {
    /// Extracts a response payload from a protocol value.
    ///
    /// Returns `None` when the value is not an object.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object()?;
        Some(Self {
            url: str_field(value, "url"),
            status: u64_field(value, "status") as u32,
            status_text: str_field(value, "statusText"),
            headers: value.get("headers").cloned().unwrap_or(Value::Null),
            mime_type: str_field(value, "mimeType"),
            protocol: str_field(value, "protocol"),
            remote_ip_address: str_field(value, "remoteIPAddress"),
            remote_port: u64_field(value, "remotePort") as u32,
            timing: value.get("timing").filter(|t| !t.is_null()).cloned(),
        })
    }
}

// ============================================================================
// ParsedEvent
// ============================================================================

/// Parsed event types for type-safe handling.
#[derive(Debug, Clone)]
pub enum ParsedEvent {
    /// A request is about to be sent.
    RequestWillBeSent {
        /// Request ID (unique within the tab's lifetime).
        request_id: NetworkRequestId,
        /// Request URL.
        url: String,
        /// HTTP method.
        method: String,
        /// Request headers as a name/value object.
        headers: Value,
        /// Request body text, if captured.
        post_data: String,
        /// Monotonic event timestamp (seconds).
        timestamp: f64,
        /// Wall-clock time (seconds since epoch).
        wall_time: f64,
        /// Resource type, if reported.
        resource_type: Option<String>,
        /// Prior response of a redirect hop reusing this request ID.
        redirect_response: Option<ResponsePayload>,
    },

    /// Additional request headers, decoupled from the primary event.
    RequestWillBeSentExtraInfo {
        /// Request ID.
        request_id: NetworkRequestId,
        /// Headers to merge.
        headers: Value,
    },

    /// Response headers received.
    ResponseReceived {
        /// Request ID.
        request_id: NetworkRequestId,
        /// Resource type, if reported.
        resource_type: Option<String>,
        /// Response metadata.
        response: ResponsePayload,
    },

    /// Additional response headers, decoupled from the primary event.
    ResponseReceivedExtraInfo {
        /// Request ID.
        request_id: NetworkRequestId,
        /// Headers to merge.
        headers: Value,
    },

    /// Loading finished; byte counts are final.
    LoadingFinished {
        /// Request ID.
        request_id: NetworkRequestId,
        /// Monotonic event timestamp (seconds).
        timestamp: f64,
        /// Total encoded bytes received.
        encoded_data_length: f64,
    },

    /// Loading failed or was canceled.
    LoadingFailed {
        /// Request ID.
        request_id: NetworkRequestId,
        /// Monotonic event timestamp (seconds).
        timestamp: f64,
        /// Error description.
        error_text: String,
        /// Whether the request was canceled.
        canceled: bool,
    },

    /// A child target was auto-attached.
    AttachedToTarget {
        /// Session created for the child.
        session_id: SessionId,
        /// Child target ID.
        target_id: TargetId,
        /// Target type (e.g. `page`, `iframe`).
        target_type: String,
        /// Target URL.
        url: String,
        /// Whether the target is paused awaiting resume.
        waiting_for_debugger: bool,
    },

    /// A child target detached.
    DetachedFromTarget {
        /// Session that ended.
        session_id: SessionId,
    },

    /// Unrecognized event; dropped by the correlator.
    Unknown {
        /// Event method.
        method: String,
    },
}

// ============================================================================
// Event Parsing Implementation
// ============================================================================

impl Event {
    /// Internal parsing implementation.
    fn parse_internal(&self) -> ParsedEvent {
        match self.method.as_str() {
            "Network.requestWillBeSent" => {
                let request = self.params.get("request").cloned().unwrap_or(Value::Null);
                ParsedEvent::RequestWillBeSent {
                    request_id: NetworkRequestId::new(self.get_string("requestId")),
                    url: str_field(&request, "url"),
                    method: str_field(&request, "method"),
                    headers: request.get("headers").cloned().unwrap_or(Value::Null),
                    post_data: str_field(&request, "postData"),
                    timestamp: self.get_f64("timestamp"),
                    wall_time: self.get_f64("wallTime"),
                    resource_type: self.get_optional_string("type"),
                    redirect_response: self
                        .params
                        .get("redirectResponse")
                        .and_then(ResponsePayload::from_value),
                }
            }

            "Network.requestWillBeSentExtraInfo" => ParsedEvent::RequestWillBeSentExtraInfo {
                request_id: NetworkRequestId::new(self.get_string("requestId")),
                headers: self.params.get("headers").cloned().unwrap_or(Value::Null),
            },

            "Network.responseReceived" => ParsedEvent::ResponseReceived {
                request_id: NetworkRequestId::new(self.get_string("requestId")),
                resource_type: self.get_optional_string("type"),
                response: self
                    .params
                    .get("response")
                    .and_then(ResponsePayload::from_value)
                    .unwrap_or_default(),
            },

            "Network.responseReceivedExtraInfo" => ParsedEvent::ResponseReceivedExtraInfo {
                request_id: NetworkRequestId::new(self.get_string("requestId")),
                headers: self.params.get("headers").cloned().unwrap_or(Value::Null),
            },

            "Network.loadingFinished" => ParsedEvent::LoadingFinished {
                request_id: NetworkRequestId::new(self.get_string("requestId")),
                timestamp: self.get_f64("timestamp"),
                encoded_data_length: self.get_f64("encodedDataLength"),
            },

            "Network.loadingFailed" => ParsedEvent::LoadingFailed {
                request_id: NetworkRequestId::new(self.get_string("requestId")),
                timestamp: self.get_f64("timestamp"),
                error_text: self.get_string("errorText"),
                canceled: self.get_bool("canceled"),
            },

            "Target.attachedToTarget" => {
                let info = self.params.get("targetInfo").cloned().unwrap_or(Value::Null);
                ParsedEvent::AttachedToTarget {
                    session_id: SessionId::new(self.get_string("sessionId")),
                    target_id: TargetId::new(str_field(&info, "targetId")),
                    target_type: str_field(&info, "type"),
                    url: str_field(&info, "url"),
                    waiting_for_debugger: self.get_bool("waitingForDebugger"),
                }
            }

            "Target.detachedFromTarget" => ParsedEvent::DetachedFromTarget {
                session_id: SessionId::new(self.get_string("sessionId")),
            },

            _ => ParsedEvent::Unknown {
                method: self.method.clone(),
            },
        }
    }

    /// Gets a string from params.
    #[inline]
    fn get_string(&self, key: &str) -> String {
        str_field(&self.params, key)
    }

    /// Gets an optional string from params.
    #[inline]
    fn get_optional_string(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    /// Gets an f64 from params.
    #[inline]
    fn get_f64(&self, key: &str) -> f64 {
        self.params
            .get(key)
            .and_then(|v| v.as_f64())
            .unwrap_or_default()
    }

    /// Gets a bool from params.
    #[inline]
    fn get_bool(&self, key: &str) -> bool {
        self.params
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or_default()
    }
}

// ============================================================================
// Field Helpers
// ============================================================================

/// Gets a string field from a protocol value.
#[inline]
fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Gets an unsigned field from a protocol value.
#[inline]
fn u64_field(value: &Value, key: &str) -> u64 {
    value
        .get(key)
        .and_then(|v| v.as_u64())
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_will_be_sent_parsing() {
        let json_str = r#"{
            "method": "Network.requestWillBeSent",
            "params": {
                "requestId": "req-1",
                "request": {
                    "url": "http://example.com/api/data",
                    "method": "GET",
                    "headers": { "User-Agent": "Test" },
                    "postData": "test-payload"
                },
                "timestamp": 1000,
                "wallTime": 1600000000.0,
                "type": "XHR"
            }
        }"#;

        let event: Event = serde_json::from_str(json_str).expect("parse event");
        assert_eq!(event.domain(), "Network");
        assert!(event.session_id.is_none());

        match event.parse() {
            ParsedEvent::RequestWillBeSent {
                request_id,
                url,
                method,
                post_data,
                timestamp,
                wall_time,
                resource_type,
                redirect_response,
                ..
            } => {
                assert_eq!(request_id.as_str(), "req-1");
                assert_eq!(url, "http://example.com/api/data");
                assert_eq!(method, "GET");
                assert_eq!(post_data, "test-payload");
                assert_eq!(timestamp, 1000.0);
                assert_eq!(wall_time, 1600000000.0);
                assert_eq!(resource_type.as_deref(), Some("XHR"));
                assert!(redirect_response.is_none());
            }
            other => panic!("unexpected parsed event: {other:?}"),
        }
    }

    #[test]
    fn test_redirect_response_extraction() {
        let json_str = r#"{
            "method": "Network.requestWillBeSent",
            "params": {
                "requestId": "req-1",
                "request": { "url": "http://x/b", "method": "GET", "headers": {} },
                "timestamp": 1000,
                "wallTime": 1600000000.0,
                "redirectResponse": {
                    "url": "http://x/a",
                    "status": 302,
                    "statusText": "Found",
                    "headers": { "Location": "http://x/b" },
                    "mimeType": "text/html",
                    "protocol": "http/1.1",
                    "remoteIPAddress": "1.2.3.4",
                    "remotePort": 80
                }
            }
        }"#;

        let event: Event = serde_json::from_str(json_str).expect("parse event");
        match event.parse() {
            ParsedEvent::RequestWillBeSent {
                redirect_response: Some(prior),
                ..
            } => {
                assert_eq!(prior.status, 302);
                assert_eq!(prior.url, "http://x/a");
                assert_eq!(prior.headers["Location"], "http://x/b");
            }
            other => panic!("expected embedded redirect response: {other:?}"),
        }
    }

    #[test]
    fn test_response_received_parsing() {
        let json_str = r#"{
            "method": "Network.responseReceived",
            "sessionId": "CHILD-7",
            "params": {
                "requestId": "req-1",
                "type": "XHR",
                "response": {
                    "url": "http://example.com/api/data",
                    "status": 200,
                    "statusText": "OK",
                    "headers": { "Content-Type": "application/json" },
                    "mimeType": "application/json",
                    "remoteIPAddress": "1.2.3.4",
                    "remotePort": 80,
                    "protocol": "h2",
                    "timing": { "requestTime": 12.5 }
                }
            }
        }"#;

        let event: Event = serde_json::from_str(json_str).expect("parse event");
        assert_eq!(event.session_id, Some(SessionId::from("CHILD-7")));

        match event.parse() {
            ParsedEvent::ResponseReceived { response, .. } => {
                assert_eq!(response.status, 200);
                assert_eq!(response.protocol, "h2");
                assert_eq!(response.remote_ip_address, "1.2.3.4");
                assert_eq!(response.remote_port, 80);
                assert!(response.timing.is_some());
            }
            other => panic!("unexpected parsed event: {other:?}"),
        }
    }

    #[test]
    fn test_loading_failed_parsing() {
        let json_str = r#"{
            "method": "Network.loadingFailed",
            "params": {
                "requestId": "req-2",
                "timestamp": 1001.5,
                "errorText": "net::ERR_ABORTED",
                "canceled": true
            }
        }"#;

        let event: Event = serde_json::from_str(json_str).expect("parse event");
        match event.parse() {
            ParsedEvent::LoadingFailed {
                error_text,
                canceled,
                ..
            } => {
                assert_eq!(error_text, "net::ERR_ABORTED");
                assert!(canceled);
            }
            other => panic!("unexpected parsed event: {other:?}"),
        }
    }

    #[test]
    fn test_attached_to_target_parsing() {
        let json_str = r#"{
            "method": "Target.attachedToTarget",
            "params": {
                "sessionId": "CHILD-1",
                "targetInfo": {
                    "targetId": "TGT-9",
                    "type": "page",
                    "url": "http://example.com/popup"
                },
                "waitingForDebugger": true
            }
        }"#;

        let event: Event = serde_json::from_str(json_str).expect("parse event");
        match event.parse() {
            ParsedEvent::AttachedToTarget {
                session_id,
                target_id,
                target_type,
                waiting_for_debugger,
                ..
            } => {
                assert_eq!(session_id.as_str(), "CHILD-1");
                assert_eq!(target_id.as_str(), "TGT-9");
                assert_eq!(target_type, "page");
                assert!(waiting_for_debugger);
            }
            other => panic!("unexpected parsed event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event() {
        let json_str = r#"{
            "method": "Security.securityStateChanged",
            "params": { "securityState": "secure" }
        }"#;

        let event: Event = serde_json::from_str(json_str).expect("parse event");
        match event.parse() {
            ParsedEvent::Unknown { method } => {
                assert_eq!(method, "Security.securityStateChanged");
            }
            other => panic!("expected Unknown variant: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_params_yield_defaults() {
        let json_str = r#"{ "method": "Network.loadingFinished", "params": {} }"#;

        let event: Event = serde_json::from_str(json_str).expect("parse event");
        match event.parse() {
            ParsedEvent::LoadingFinished {
                request_id,
                timestamp,
                encoded_data_length,
            } => {
                assert_eq!(request_id.as_str(), "");
                assert_eq!(timestamp, 0.0);
                assert_eq!(encoded_data_length, 0.0);
            }
            other => panic!("unexpected parsed event: {other:?}"),
        }
    }
}
