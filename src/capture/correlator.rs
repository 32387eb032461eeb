//! Event correlation.
//!
//! Turns the unordered stream of partial protocol events into stable,
//! mutable request records: at most one live record per `(tab, request
//! id)` pair, fields accumulating monotonically, redirect hops split into
//! separate records when the protocol recycles a request id.
//!
//! Every event passes through exactly one identity-resolution step
//! against the registry before it can touch a record; events that resolve
//! to nothing are dropped without a trace beyond a trace log. A malformed
//! event (missing request id, wrong shapes) is likewise dropped; a bad
//! frame must never halt the capture.

// ============================================================================
// Imports
// ============================================================================

use std::mem::take;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::capture::engine::{CaptureEngine, EngineMessage};
use crate::capture::headers::merge_headers;
use crate::capture::manager::{apply_command, enable_domains};
use crate::capture::record::{BodyEncoding, RecordStatus, RequestRecord};
use crate::error::{Error, Result};
use crate::identifiers::{NetworkRequestId, SessionId, TabId, TargetId};
use crate::protocol::{
    Command, Event, NetworkCommand, ParsedEvent, ResponsePayload, RuntimeCommand,
};
use crate::transport::{Debugger, TransportEvent};

// ============================================================================
// Transport dispatch
// ============================================================================

impl CaptureEngine {
    /// Entry point for everything the transport delivers.
    pub(super) fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Event { root_tab, event } => {
                self.handle_protocol_event(root_tab, event);
            }
            // Out-of-band detach: prune the root, keep the capture going
            // for the remaining tabs.
            TransportEvent::Detached { root_tab } => {
                if self.registry.is_attached(root_tab) {
                    debug!(%root_tab, "Root session detached out of band");
                    self.registry.remove_root(root_tab);
                }
            }
        }
    }

    /// Resolves and dispatches one protocol event.
    ///
    /// Target lifecycle is handled before any request/response dispatch;
    /// network events are dropped unless identity resolution yields a
    /// captured tab.
    fn handle_protocol_event(&mut self, root_tab: TabId, event: Event) {
        let session_id = event.session_id.clone();

        match event.parse() {
            ParsedEvent::AttachedToTarget {
                session_id: child_session,
                target_id,
                target_type,
                url,
                waiting_for_debugger,
            } => {
                self.handle_target_attached(
                    root_tab,
                    child_session,
                    target_id,
                    &target_type,
                    &url,
                    waiting_for_debugger,
                );
            }

            ParsedEvent::DetachedFromTarget {
                session_id: child_session,
            } => {
                if self.registry.remove_child(&child_session).is_some() {
                    debug!(session_id = %child_session, "Child target detached");
                }
            }

            ParsedEvent::Unknown { method } => {
                trace!(%method, "Ignoring unhandled event");
            }

            parsed => {
                let Some(tab_id) = self
                    .registry
                    .resolve_event_tab(session_id.as_ref(), root_tab)
                else {
                    trace!(method = %event.method, "Dropping event for unresolved session");
                    return;
                };
                let direct = self.registry.is_direct(session_id.as_ref());
                self.correlate(tab_id, direct, parsed);
            }
        }
    }
}

// ============================================================================
// Correlation state machine
// ============================================================================

impl CaptureEngine {
    /// Applies one resolved network event to its `(tab, request id)` slot.
    fn correlate(&mut self, tab_id: TabId, direct: bool, parsed: ParsedEvent) {
        match parsed {
            ParsedEvent::RequestWillBeSent {
                request_id,
                url,
                method,
                headers,
                post_data,
                timestamp,
                wall_time,
                resource_type,
                redirect_response,
            } => {
                if request_id.as_str().is_empty() {
                    return;
                }

                // The protocol recycles the request id across a redirect
                // hop: close out the previous stage before the new one
                // takes over the slot.
                if let Some(prior) = redirect_response
                    && self.records.has_slot(tab_id, &request_id)
                {
                    self.finalize_redirect_hop(tab_id, &request_id, &prior, timestamp);
                    self.records.rotate_hop(tab_id, &request_id);
                }

                let record = self.records.ensure(tab_id, &request_id);
                RequestRecord::merge_str(&mut record.url, url);
                RequestRecord::merge_str(&mut record.method, method);
                record.request_headers = merge_headers(take(&mut record.request_headers), &headers);
                RequestRecord::merge_str(&mut record.request_body_text, post_data);
                record.stamp_start(timestamp, wall_time);
                if record.resource_type.is_none() {
                    record.resource_type = resource_type;
                }
                self.bus.entry(record);
            }

            ParsedEvent::RequestWillBeSentExtraInfo {
                request_id,
                headers,
            } => {
                if request_id.as_str().is_empty() {
                    return;
                }
                // Arrival order against requestWillBeSent is not
                // guaranteed; the slot is created here if needed.
                let record = self.records.ensure(tab_id, &request_id);
                record.request_headers = merge_headers(take(&mut record.request_headers), &headers);
                self.bus.entry(record);
            }

            ParsedEvent::ResponseReceived {
                request_id,
                resource_type,
                response,
            } => {
                if request_id.as_str().is_empty() {
                    return;
                }
                let record = self.records.ensure(tab_id, &request_id);
                apply_response(record, &response);
                if record.resource_type.is_none() {
                    record.resource_type = resource_type;
                }
                self.bus.entry(record);
            }

            ParsedEvent::ResponseReceivedExtraInfo {
                request_id,
                headers,
            } => {
                if request_id.as_str().is_empty() {
                    return;
                }
                let record = self.records.ensure(tab_id, &request_id);
                record.response_headers =
                    merge_headers(take(&mut record.response_headers), &headers);
                self.bus.entry(record);
            }

            ParsedEvent::LoadingFinished {
                request_id,
                timestamp,
                encoded_data_length,
            } => {
                if request_id.as_str().is_empty() {
                    return;
                }
                let record = self.records.ensure(tab_id, &request_id);
                record.time = Some(record.elapsed_from(timestamp));
                record.encoded_data_length = encoded_data_length;

                if direct {
                    // One-shot, best-effort; the final upsert is emitted
                    // when the resolution lands back on the loop.
                    let record_id = record.id.clone();
                    let debugger = Arc::clone(&self.debugger);
                    let msg_tx = self.msg_tx.clone();
                    tokio::spawn(async move {
                        let outcome = fetch_body(&debugger, tab_id, request_id).await;
                        let _ = msg_tx.send(EngineMessage::BodyResolved { record_id, outcome });
                    });
                } else {
                    // Body fetch through a multiplexed child session is a
                    // known scope gap: complete with an empty body.
                    record.response_body = String::new();
                    record.response_body_encoding = BodyEncoding::Utf8;
                    record.status = RecordStatus::Completed;
                    self.bus.entry(record);
                }
            }

            ParsedEvent::LoadingFailed {
                request_id,
                timestamp,
                error_text,
                canceled,
            } => {
                if request_id.as_str().is_empty() {
                    return;
                }
                let record = self.records.ensure(tab_id, &request_id);
                RequestRecord::merge_str(&mut record.error_text, error_text);
                record.canceled = canceled;
                record.time = Some(record.elapsed_from(timestamp));
                record.status = RecordStatus::Failed;
                self.bus.entry(record);
            }

            // Target lifecycle and unknowns never reach here.
            _ => {}
        }
    }

    /// Closes out the pre-redirect stage of a recycled request id: the
    /// prior response's metadata is copied in, elapsed time computed, the
    /// body left empty, and a final upsert emitted.
    fn finalize_redirect_hop(
        &mut self,
        tab_id: TabId,
        request_id: &NetworkRequestId,
        prior: &ResponsePayload,
        timestamp: f64,
    ) {
        let Some(record) = self.records.current_mut(tab_id, request_id) else {
            return;
        };

        apply_response(record, prior);
        record.time = Some(record.elapsed_from(timestamp));
        record.response_body = String::new();
        record.response_body_encoding = BodyEncoding::Utf8;
        record.status = RecordStatus::Redirected;
        self.bus.entry(record);
    }
}

// ============================================================================
// Child sessions
// ============================================================================

impl CaptureEngine {
    /// A child target auto-attached under `root_tab`: register it,
    /// enable the observation domains over its session envelope, and
    /// resume it if it is paused.
    fn handle_target_attached(
        &mut self,
        root_tab: TabId,
        session_id: SessionId,
        target_id: TargetId,
        target_type: &str,
        url: &str,
        waiting_for_debugger: bool,
    ) {
        if !self.registry.is_active() || !self.registry.is_attached(root_tab) {
            trace!(%session_id, "Dropping child attach for uncaptured root");
            return;
        }

        let child =
            self.registry
                .add_child(session_id.clone(), root_tab, &target_id, waiting_for_debugger);
        debug!(
            %session_id,
            %target_id,
            target_type,
            url,
            resolved_tab = ?child.resolved_tab(),
            "Child target attached"
        );

        let debugger = Arc::clone(&self.debugger);
        tokio::spawn(async move {
            enable_domains(&debugger, root_tab, Some(session_id.clone())).await;
            if waiting_for_debugger {
                apply_command(
                    &debugger,
                    root_tab,
                    Some(session_id),
                    Command::Runtime(RuntimeCommand::RunIfWaitingForDebugger),
                )
                .await;
            }
        });
    }
}

// ============================================================================
// Response merging
// ============================================================================

/// Merges response metadata into a record.
///
/// Every field obeys the monotonic rule: only non-empty incoming data
/// overwrites, so a sparse payload (a redirect stub, a raced event)
/// cannot blank out what an earlier event supplied. The URL merge doubles
/// as the backfill path when a response arrives before its request.
fn apply_response(record: &mut RequestRecord, payload: &ResponsePayload) {
    RequestRecord::merge_str(&mut record.url, payload.url.clone());
    if payload.status != 0 {
        record.http_status = Some(payload.status);
    }
    RequestRecord::merge_str(&mut record.status_text, payload.status_text.clone());
    RequestRecord::merge_str(&mut record.mime_type, payload.mime_type.clone());
    RequestRecord::merge_str(&mut record.protocol, payload.protocol.clone());
    RequestRecord::merge_str(&mut record.remote_ip_address, payload.remote_ip_address.clone());
    if payload.remote_port != 0 {
        record.remote_port = payload.remote_port;
    }
    record.response_headers = merge_headers(take(&mut record.response_headers), &payload.headers);
    if payload.timing.is_some() {
        record.timing = payload.timing.clone();
    }
}

/// Fetches a response body, mapping protocol failure to
/// [`Error::BodyRetrieval`].
async fn fetch_body(
    debugger: &Arc<dyn Debugger>,
    tab_id: TabId,
    request_id: NetworkRequestId,
) -> Result<(String, BodyEncoding)> {
    let value = debugger
        .command(
            tab_id,
            None,
            Command::Network(NetworkCommand::GetResponseBody {
                request_id: request_id.clone(),
            }),
        )
        .await
        .map_err(|e| Error::body_retrieval(request_id, e.to_string()))?;

    let body = value
        .get("body")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let encoding = if value
        .get("base64Encoded")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        BodyEncoding::Base64
    } else {
        BodyEncoding::Utf8
    };

    Ok((body, encoding))
}
