//! Debugging-protocol transport layer.
//!
//! One WebSocket connection per directly attached root tab; auto-attached
//! children ride their root's connection via flattened session routing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             CdpDebugger                 │
//! │  ┌─────────────────────────────────┐    │
//! │  │ TabId=101 → CdpConnection 1     │    │
//! │  │ TabId=202 → CdpConnection 2     │    │
//! │  └─────────────────────────────────┘    │
//! │        all events → engine queue        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The [`Debugger`] trait is the seam the engine drives; tests substitute
//! a scripted implementation and never open a socket.

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection to one debugging target.
pub mod connection;

pub use connection::CdpConnection;

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::identifiers::{SessionId, TabId};
use crate::protocol::{Command, CommandEnvelope, Event};

// ============================================================================
// TransportEvent
// ============================================================================

/// A message from the transport into the engine's event queue.
#[derive(Debug)]
pub enum TransportEvent {
    /// An event frame arrived over a root connection.
    Event {
        /// Root tab whose connection carried the frame.
        root_tab: TabId,
        /// The raw event.
        event: Event,
    },

    /// A root connection ended (socket closed or browser detached).
    ///
    /// Delivered outside the normal event stream, once per connection.
    Detached {
        /// Root tab whose connection ended.
        root_tab: TabId,
    },
}

// ============================================================================
// Debugger Trait
// ============================================================================

/// Command-side surface of the debugging protocol.
///
/// The engine issues every attach, detach, and command through this
/// trait; events flow back through the queue handed to the transport at
/// construction.
#[async_trait]
pub trait Debugger: Send + Sync {
    /// Attaches to a root tab, establishing its connection.
    ///
    /// Idempotent: attaching an already attached tab succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attach`] if the connection cannot be established.
    async fn attach(&self, tab_id: TabId) -> Result<()>;

    /// Detaches from a root tab, closing its connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TabNotFound`] if the tab has no connection.
    async fn detach(&self, tab_id: TabId) -> Result<()>;

    /// Sends a command over a root tab's connection.
    ///
    /// `session_id` addresses an auto-attached child through the
    /// session-envelope; `None` targets the root itself.
    ///
    /// # Errors
    ///
    /// - [`Error::TabNotFound`] if the tab has no connection
    /// - [`Error::Command`] if the browser reports a failure
    async fn command(
        &self,
        tab_id: TabId,
        session_id: Option<SessionId>,
        command: Command,
    ) -> Result<Value>;
}

// ============================================================================
// DebuggerEndpoint
// ============================================================================

/// Address of the browser's remote-debugging endpoint.
#[derive(Debug, Clone)]
pub struct DebuggerEndpoint {
    host: String,
    port: u16,
}

impl DebuggerEndpoint {
    /// Creates an endpoint address.
    #[inline]
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// WebSocket debugger URL for a page target.
    #[inline]
    #[must_use]
    pub fn page_url(&self, tab_id: TabId) -> String {
        format!("ws://{}:{}/devtools/page/{tab_id}", self.host, self.port)
    }
}

// ============================================================================
// CdpDebugger
// ============================================================================

/// WebSocket-backed [`Debugger`] implementation.
///
/// Maintains one [`CdpConnection`] per attached root tab; every
/// connection pumps its events into the queue supplied at construction.
pub struct CdpDebugger {
    endpoint: DebuggerEndpoint,
    events: mpsc::UnboundedSender<TransportEvent>,
    connections: RwLock<FxHashMap<TabId, CdpConnection>>,
}

impl CdpDebugger {
    /// Creates a debugger dialing `endpoint`, forwarding events into
    /// `events`.
    #[must_use]
    pub fn new(endpoint: DebuggerEndpoint, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            endpoint,
            events,
            connections: RwLock::new(FxHashMap::default()),
        }
    }

    /// Number of open root connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}

#[async_trait]
impl Debugger for CdpDebugger {
    async fn attach(&self, tab_id: TabId) -> Result<()> {
        if self.connections.read().contains_key(&tab_id) {
            return Ok(());
        }

        let url = self.endpoint.page_url(tab_id);
        let connection = CdpConnection::connect(&url, tab_id, self.events.clone())
            .await
            .map_err(|e| Error::attach(tab_id, e.to_string()))?;

        self.connections.write().insert(tab_id, connection);
        info!(%tab_id, "Debugger attached");
        Ok(())
    }

    async fn detach(&self, tab_id: TabId) -> Result<()> {
        let removed = self.connections.write().remove(&tab_id);
        match removed {
            Some(connection) => {
                connection.shutdown();
                debug!(%tab_id, "Debugger detached");
                Ok(())
            }
            None => Err(Error::tab_not_found(tab_id)),
        }
    }

    async fn command(
        &self,
        tab_id: TabId,
        session_id: Option<SessionId>,
        command: Command,
    ) -> Result<Value> {
        let connection = {
            let connections = self.connections.read();
            connections
                .get(&tab_id)
                .ok_or_else(|| Error::tab_not_found(tab_id))?
                .clone()
        };

        let method = command.method();
        let envelope = match session_id {
            Some(session) => CommandEnvelope::for_session(session, command),
            None => CommandEnvelope::new(command),
        };

        connection.send(envelope).await?.into_result(method)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_format() {
        let endpoint = DebuggerEndpoint::new("127.0.0.1", 9222);
        let tab = TabId::new(42).unwrap();
        assert_eq!(endpoint.page_url(tab), "ws://127.0.0.1:9222/devtools/page/42");
    }

    #[tokio::test]
    async fn test_command_to_unattached_tab() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let debugger = CdpDebugger::new(DebuggerEndpoint::new("127.0.0.1", 9222), events_tx);

        let result = debugger
            .command(
                TabId::new(1).unwrap(),
                None,
                Command::Page(crate::protocol::PageCommand::Enable),
            )
            .await;

        assert!(matches!(result, Err(Error::TabNotFound { .. })));
        assert_eq!(debugger.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_detach_unknown_tab() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let debugger = CdpDebugger::new(DebuggerEndpoint::new("127.0.0.1", 9222), events_tx);

        let result = debugger.detach(TabId::new(9).unwrap()).await;
        assert!(matches!(result, Err(Error::TabNotFound { .. })));
    }
}
