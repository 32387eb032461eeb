//! WebSocket connection to one debugging target.
//!
//! Each directly attached root tab owns one `CdpConnection`. The
//! connection handles command/response correlation by integer message id
//! and pumps every event frame, root and flattened child-session alike,
//! into the engine's single event queue.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming frames from the browser (responses, events)
//! - Outgoing commands from the engine
//! - Command/response correlation by message id
//! - Detach signaling when the socket closes

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CommandId, TabId};
use crate::protocol::{CommandEnvelope, CommandResponse, Event};
use crate::transport::TransportEvent;

// ============================================================================
// Types
// ============================================================================

/// Map of command IDs to response channels.
type CorrelationMap = FxHashMap<CommandId, oneshot::Sender<Result<CommandResponse>>>;

/// The socket type produced by `connect_async`.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send an envelope; the response resolves the channel.
    Send {
        envelope: CommandEnvelope,
        response_tx: oneshot::Sender<Result<CommandResponse>>,
    },
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// CdpConnection
// ============================================================================

/// WebSocket connection to a single root target.
///
/// Cheap to clone; all clones share the same socket and event loop.
/// Commands never time out here: a hung command simply keeps its caller
/// suspended, which the engine's best-effort call sites tolerate.
pub struct CdpConnection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
}

impl Clone for CdpConnection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            correlation: Arc::clone(&self.correlation),
        }
    }
}

impl CdpConnection {
    /// Connects to a target's WebSocket debugger URL.
    ///
    /// Every event frame is forwarded to `events` tagged with `root_tab`;
    /// socket closure emits [`TransportEvent::Detached`] once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if the connection cannot be
    /// established.
    pub async fn connect(
        url: &str,
        root_tab: TabId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        debug!(%url, tab_id = %root_tab, "Debugger WebSocket connected");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));

        let correlation_clone = Arc::clone(&correlation);
        tokio::spawn(Self::run_event_loop(
            ws_stream,
            root_tab,
            command_rx,
            correlation_clone,
            events,
        ));

        Ok(Self {
            command_tx,
            correlation,
        })
    }

    /// Sends a command and waits for its response.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the socket is gone
    /// - [`Error::Json`] if the envelope cannot be serialized
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<CommandResponse> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send {
                envelope,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        response_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Returns the number of commands awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Shuts down the connection gracefully.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: WsStream,
        root_tab: TabId,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the browser
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_frame(&text, root_tab, &correlation, &events);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!(tab_id = %root_tab, "WebSocket closed by browser");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(tab_id = %root_tab, error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!(tab_id = %root_tab, "WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the engine
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { envelope, response_tx }) => {
                            Self::handle_send_command(
                                envelope,
                                response_tx,
                                &mut ws_write,
                                &correlation,
                            ).await;
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!(tab_id = %root_tab, "Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!(tab_id = %root_tab, "Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        // Fail all pending commands, then signal the out-of-band detach.
        Self::fail_pending_commands(&correlation);
        let _ = events.send(TransportEvent::Detached { root_tab });

        debug!(tab_id = %root_tab, "Connection event loop terminated");
    }

    /// Routes an incoming text frame: responses resolve the correlation
    /// map, events flow to the engine queue, anything else is logged and
    /// dropped.
    fn handle_incoming_frame(
        text: &str,
        root_tab: TabId,
        correlation: &Arc<Mutex<CorrelationMap>>,
        events: &mpsc::UnboundedSender<TransportEvent>,
    ) {
        // Responses carry a top-level id; events carry a method instead.
        if let Ok(response) = from_str::<CommandResponse>(text) {
            let tx = correlation.lock().remove(&response.id);

            if let Some(tx) = tx {
                let _ = tx.send(Ok(response));
            } else {
                warn!(id = %response.id, "Response for unknown command");
            }
            return;
        }

        if let Ok(event) = from_str::<Event>(text) {
            trace!(tab_id = %root_tab, method = %event.method, "Event frame");
            let _ = events.send(TransportEvent::Event { root_tab, event });
            return;
        }

        warn!(tab_id = %root_tab, "Failed to parse incoming frame");
    }

    /// Handles a send command from the engine.
    async fn handle_send_command(
        envelope: CommandEnvelope,
        response_tx: oneshot::Sender<Result<CommandResponse>>,
        ws_write: &mut futures_util::stream::SplitSink<WsStream, Message>,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) {
        let command_id = envelope.id;

        let json = match to_string(&envelope) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Store correlation before sending
        correlation.lock().insert(command_id, response_tx);

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            if let Some(tx) = correlation.lock().remove(&command_id) {
                let _ = tx.send(Err(Error::WebSocket(e)));
            }
            return;
        }

        trace!(%command_id, "Command sent");
    }

    /// Fails all pending commands with ConnectionClosed.
    fn fail_pending_commands(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending commands on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_routing_response() {
        let correlation: Arc<Mutex<CorrelationMap>> = Arc::new(Mutex::new(Default::default()));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = oneshot::channel();

        let id = CommandId::next();
        correlation.lock().insert(id, tx);

        let frame = format!(r#"{{ "id": {id}, "result": {{ "ok": true }} }}"#);
        CdpConnection::handle_incoming_frame(
            &frame,
            TabId::new(101).unwrap(),
            &correlation,
            &events_tx,
        );

        let response = rx.try_recv().expect("resolved").expect("success");
        assert!(response.get_bool("ok"));
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn test_frame_routing_event() {
        let correlation: Arc<Mutex<CorrelationMap>> = Arc::new(Mutex::new(Default::default()));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let frame = r#"{ "method": "Network.loadingFinished", "params": { "requestId": "r1" } }"#;
        CdpConnection::handle_incoming_frame(
            frame,
            TabId::new(101).unwrap(),
            &correlation,
            &events_tx,
        );

        match events_rx.try_recv().expect("event forwarded") {
            TransportEvent::Event { root_tab, event } => {
                assert_eq!(root_tab, TabId::new(101).unwrap());
                assert_eq!(event.method, "Network.loadingFinished");
            }
            other => panic!("unexpected transport event: {other:?}"),
        }
    }

    #[test]
    fn test_send_after_loop_death_errors() {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        drop(command_rx);

        let connection = CdpConnection {
            command_tx,
            correlation: Arc::new(Mutex::new(Default::default())),
        };
        let envelope = CommandEnvelope::new(crate::protocol::Command::Page(
            crate::protocol::PageCommand::Enable,
        ));

        let result = tokio_test::block_on(connection.send(envelope));
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_unknown_response_is_dropped() {
        let correlation: Arc<Mutex<CorrelationMap>> = Arc::new(Mutex::new(Default::default()));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let frame = r#"{ "id": 999999, "result": {} }"#;
        CdpConnection::handle_incoming_frame(
            frame,
            TabId::new(101).unwrap(),
            &correlation,
            &events_tx,
        );

        assert!(events_rx.try_recv().is_err());
        assert!(correlation.lock().is_empty());
    }
}
