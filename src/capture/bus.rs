//! Broadcast bus.
//!
//! Publishes upsert and lifecycle notifications derived from record
//! mutations to any number of subscribers. Every `Entry` carries the
//! record's complete current snapshot, never a diff, so subscribers can
//! treat each notification as an idempotent full replacement keyed by id.
//!
//! The bus does not replay history: a late joiner sees only notifications
//! published after it subscribed and requests a full snapshot through the
//! control channel separately.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::capture::record::RequestRecord;
use crate::identifiers::{RecordId, TabId};

// ============================================================================
// Constants
// ============================================================================

/// Buffered notifications per subscriber before lag kicks in.
const BUS_CAPACITY: usize = 1024;

// ============================================================================
// Notification
// ============================================================================

/// A push notification to stream subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Notification {
    /// A record was created or mutated; `record` is the full snapshot.
    #[serde(rename_all = "camelCase")]
    Entry {
        /// External record id.
        id: RecordId,
        /// Complete current state of the record.
        record: Box<RequestRecord>,
    },

    /// A capture started on a tab.
    #[serde(rename_all = "camelCase")]
    Started {
        /// The newly attached tab.
        tab_id: TabId,
    },

    /// The capture stopped globally.
    Stopped {},

    /// The record table was cleared.
    Cleared {},
}

// ============================================================================
// BroadcastBus
// ============================================================================

/// Fan-out channel for engine notifications.
///
/// Cheap to clone; publishing with no live subscribers is a no-op.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastBus {
    /// Creates a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Subscribes to notifications published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Publishes a record upsert.
    pub fn entry(&self, record: &RequestRecord) {
        trace!(id = %record.id, seq = record.seq, "publish entry");
        let _ = self.sender.send(Notification::Entry {
            id: record.id.clone(),
            record: Box::new(record.clone()),
        });
    }

    /// Publishes a capture-started notification.
    pub fn started(&self, tab_id: TabId) {
        let _ = self.sender.send(Notification::Started { tab_id });
    }

    /// Publishes a capture-stopped notification.
    pub fn stopped(&self) {
        let _ = self.sender.send(Notification::Stopped {});
    }

    /// Publishes a table-cleared notification.
    pub fn cleared(&self) {
        let _ = self.sender.send(Notification::Cleared {});
    }

    /// Number of live subscribers.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::NetworkRequestId;

    fn record() -> RequestRecord {
        let tab = TabId::new(101).unwrap();
        let req = NetworkRequestId::from("req-1");
        RequestRecord::new(RecordId::new(tab, &req), tab, req, 1)
    }

    #[tokio::test]
    async fn test_entry_carries_full_snapshot() {
        let bus = BroadcastBus::new();
        let mut rx = bus.subscribe();

        let mut rec = record();
        rec.url = "http://example.com".to_string();
        bus.entry(&rec);

        match rx.recv().await.expect("notification") {
            Notification::Entry { id, record } => {
                assert_eq!(id.as_str(), "101:req-1");
                assert_eq!(record.url, "http://example.com");
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_subscribers_is_noop() {
        let bus = BroadcastBus::new();
        // Must not panic or error with nobody listening.
        bus.entry(&record());
        bus.stopped();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_late_joiner_gets_no_history() {
        let bus = BroadcastBus::new();
        bus.entry(&record());

        let mut rx = bus.subscribe();
        bus.cleared();

        match rx.recv().await.expect("notification") {
            Notification::Cleared {} => {}
            other => panic!("history should not replay: {other:?}"),
        }
    }

    #[test]
    fn test_notification_wire_shape() {
        let json = serde_json::to_value(Notification::Started {
            tab_id: TabId::new(7).unwrap(),
        })
        .expect("serialize");

        assert_eq!(json["event"], "started");
        assert_eq!(json["data"]["tabId"], 7);

        let json = serde_json::to_value(Notification::Entry {
            id: RecordId::new(TabId::new(101).unwrap(), &NetworkRequestId::from("req-1")),
            record: Box::new(record()),
        })
        .expect("serialize");

        assert_eq!(json["event"], "entry");
        assert_eq!(json["data"]["id"], "101:req-1");
        assert_eq!(json["data"]["record"]["status"], "pending");
    }
}
