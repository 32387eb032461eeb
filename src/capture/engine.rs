//! Capture engine: owned state and the event loop.
//!
//! All mutable capture state (session registry, record table, desired
//! configuration) lives in one [`CaptureEngine`] instance owned by a
//! single tokio task. The task drains one message queue; nothing mutates
//! engine state from anywhere else. Async side-effects (attach, command
//! dispatch, body fetches) run as spawned tasks that resume by sending a
//! message back into the queue, so the correlation structures need no
//! locking at all.
//!
//! # Message Flow
//!
//! ```text
//!  EngineHandle ──commands──▶ ┌───────────────┐
//!  transport    ──events────▶ │  engine loop  │──▶ BroadcastBus
//!  spawned tasks ─resumes───▶ └───────────────┘
//! ```
//!
//! Ordering: events for one logical tab are processed in arrival order;
//! nothing is guaranteed across tabs.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::capture::bus::{BroadcastBus, Notification};
use crate::capture::record::{BodyEncoding, RecordStatus, RecordTable, RequestRecord};
use crate::capture::registry::SessionRegistry;
use crate::error::{Error, Result};
use crate::identifiers::{RecordId, TabId, TargetId};
use crate::protocol::ThrottleProfile;
use crate::transport::{Debugger, TransportEvent};

// ============================================================================
// CaptureConfig
// ============================================================================

/// Process-wide desired configuration.
///
/// Written only by command handlers on the engine loop; reapplication to
/// targets snapshots it at spawn time.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureConfig {
    /// Active throttle profile.
    pub throttle: ThrottleProfile,
    /// Whether the browser cache is bypassed.
    pub cache_disabled: bool,
}

// ============================================================================
// CaptureSnapshot
// ============================================================================

/// Full engine state returned to `getAll` callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSnapshot {
    /// Whether a capture is globally active.
    pub attached: bool,
    /// Primary attached root tab, if any.
    pub tab_id: Option<TabId>,
    /// All records, ordered by sequence number.
    pub entries: Vec<RequestRecord>,
}

// ============================================================================
// Engine Messages
// ============================================================================

/// Commands entering the loop from the [`EngineHandle`].
#[derive(Debug)]
pub(super) enum EngineCommand {
    /// Start capturing a tab.
    Start {
        tab_id: TabId,
        reply: oneshot::Sender<bool>,
    },
    /// Stop the whole capture.
    Stop { reply: oneshot::Sender<()> },
    /// Empty the record table.
    Clear { reply: oneshot::Sender<()> },
    /// Snapshot attachment state and all records.
    GetAll {
        reply: oneshot::Sender<CaptureSnapshot>,
    },
    /// Update and reapply the throttle profile.
    SetThrottle {
        profile: ThrottleProfile,
        reply: oneshot::Sender<()>,
    },
    /// Update and reapply the cache-bypass flag.
    SetCacheDisabled {
        value: bool,
        reply: oneshot::Sender<()>,
    },
    /// A top-level navigation was observed in some tab.
    NavigationObserved { tab_id: TabId, url: String },
    /// A tab was opened by another tab.
    TabOpened { opener: TabId, tab_id: TabId },
    /// Bind a protocol target to a logical tab for child resolution.
    RegisterTarget { target_id: TargetId, tab_id: TabId },
}

/// Progress reports from a spawned attach task.
#[derive(Debug)]
pub(super) enum AttachPhase {
    /// The transport-level attach succeeded; events may already flow.
    Opened { tab_id: TabId },
    /// Setup finished (or failed); the caller gets its answer.
    Finished {
        tab_id: TabId,
        success: bool,
        reply: oneshot::Sender<bool>,
    },
}

/// Everything the engine loop consumes.
#[derive(Debug)]
pub(super) enum EngineMessage {
    /// A control command from the handle.
    Command(EngineCommand),
    /// An attach task progressed.
    Attach(AttachPhase),
    /// A body fetch resolved.
    BodyResolved {
        record_id: RecordId,
        outcome: Result<(String, BodyEncoding)>,
    },
}

// ============================================================================
// CaptureEngine
// ============================================================================

/// The capture engine state, exclusively owned by its loop task.
pub struct CaptureEngine {
    /// Protocol command surface.
    pub(super) debugger: Arc<dyn Debugger>,
    /// Identity: attached roots, child sessions, in-flight attaches.
    pub(super) registry: SessionRegistry,
    /// All request records and live correlation slots.
    pub(super) records: RecordTable,
    /// Process-wide desired configuration.
    pub(super) config: CaptureConfig,
    /// Notification fan-out.
    pub(super) bus: BroadcastBus,
    /// Loop-bound sender for spawned tasks to resume through.
    pub(super) msg_tx: mpsc::UnboundedSender<EngineMessage>,
}

impl CaptureEngine {
    /// Initializes an engine and spawns its loop task.
    ///
    /// `transport_rx` is the queue the transport (or a test harness)
    /// pushes [`TransportEvent`]s into. The returned handle is the only
    /// way to command the engine; dropping every handle clone shuts the
    /// loop down once the transport queue ends too.
    #[must_use]
    pub fn spawn(
        debugger: Arc<dyn Debugger>,
        transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> EngineHandle {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let bus = BroadcastBus::new();

        let engine = Self {
            debugger,
            registry: SessionRegistry::new(),
            records: RecordTable::new(),
            config: CaptureConfig::default(),
            bus: bus.clone(),
            msg_tx: msg_tx.clone(),
        };

        tokio::spawn(engine.run(msg_rx, transport_rx));

        EngineHandle { tx: msg_tx, bus }
    }

    /// The engine loop: drains commands, transport events, and task
    /// resumptions until both inputs close.
    async fn run(
        mut self,
        mut msg_rx: mpsc::UnboundedReceiver<EngineMessage>,
        mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        debug!("Capture engine loop started");

        loop {
            tokio::select! {
                message = msg_rx.recv() => match message {
                    Some(message) => self.dispatch(message),
                    None => break,
                },
                event = transport_rx.recv() => match event {
                    Some(event) => self.handle_transport_event(event),
                    None => break,
                },
            }
        }

        debug!("Capture engine loop terminated");
    }

    /// Routes one engine message.
    fn dispatch(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::Command(command) => self.dispatch_command(command),
            EngineMessage::Attach(phase) => self.handle_attach_phase(phase),
            EngineMessage::BodyResolved { record_id, outcome } => {
                self.apply_body_outcome(&record_id, outcome);
            }
        }
    }

    /// Routes one control command.
    fn dispatch_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Start { tab_id, reply } => self.handle_start(tab_id, reply),
            EngineCommand::Stop { reply } => self.handle_stop(reply),
            EngineCommand::Clear { reply } => self.handle_clear(reply),
            EngineCommand::GetAll { reply } => {
                let _ = reply.send(self.snapshot());
            }
            EngineCommand::SetThrottle { profile, reply } => self.handle_set_throttle(profile, reply),
            EngineCommand::SetCacheDisabled { value, reply } => {
                self.handle_set_cache_disabled(value, reply);
            }
            EngineCommand::NavigationObserved { tab_id, url } => {
                self.handle_navigation(tab_id, &url);
            }
            EngineCommand::TabOpened { opener, tab_id } => self.handle_tab_opened(opener, tab_id),
            EngineCommand::RegisterTarget { target_id, tab_id } => {
                self.registry.register_target(target_id, tab_id);
            }
        }
    }

    /// Builds the `getAll` snapshot.
    fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            attached: self.registry.is_active(),
            tab_id: self.registry.primary_tab(),
            entries: self.records.snapshot(),
        }
    }
}

// ============================================================================
// EngineHandle
// ============================================================================

/// Cloneable front door to a running engine.
///
/// Every method enqueues a command onto the engine loop and, where a
/// result exists, awaits its oneshot reply.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineMessage>,
    bus: BroadcastBus,
}

impl EngineHandle {
    /// Starts capturing a tab.
    ///
    /// Returns `false` when the underlying attach failed; already
    /// attached or attach-in-flight both count as success. Safe to call
    /// concurrently for the same tab: at most one attach is issued.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the engine loop is gone.
    pub async fn start(&self, tab_id: TabId) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Start { tab_id, reply })?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Stops the capture, detaching every session best-effort.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the engine loop is gone.
    pub async fn stop(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Stop { reply })?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Empties the record table without touching attachment state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the engine loop is gone.
    pub async fn clear(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Clear { reply })?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Returns attachment state plus the full record table.
    ///
    /// Late stream subscribers call this once for history; the stream
    /// itself never replays.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the engine loop is gone.
    pub async fn get_all(&self) -> Result<CaptureSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::GetAll { reply })?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Sets the throttle profile and reapplies it to all attached roots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the engine loop is gone.
    pub async fn set_throttle(&self, profile: ThrottleProfile) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SetThrottle { profile, reply })?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Sets the cache-bypass flag and reapplies it to all attached roots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the engine loop is gone.
    pub async fn set_cache_disabled(&self, value: bool) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SetCacheDisabled { value, reply })?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Reports a top-level navigation; the engine may auto-start the tab.
    ///
    /// Fire-and-forget: duplicate notifications are harmless because
    /// `start` is idempotent.
    pub fn notify_navigation(&self, tab_id: TabId, url: impl Into<String>) {
        let _ = self.send(EngineCommand::NavigationObserved {
            tab_id,
            url: url.into(),
        });
    }

    /// Reports a tab opened by `opener`; the engine auto-starts it when
    /// the opener is captured. Fire-and-forget.
    pub fn notify_tab_opened(&self, opener: TabId, tab_id: TabId) {
        let _ = self.send(EngineCommand::TabOpened { opener, tab_id });
    }

    /// Binds a protocol target to a logical tab, feeding the registry's
    /// child target list.
    pub fn register_target(&self, target_id: TargetId, tab_id: TabId) {
        let _ = self.send(EngineCommand::RegisterTarget { target_id, tab_id });
    }

    /// Subscribes to the live notification stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.bus.subscribe()
    }

    fn send(&self, command: EngineCommand) -> Result<()> {
        self.tx
            .send(EngineMessage::Command(command))
            .map_err(|_| Error::ConnectionClosed)
    }
}

// ============================================================================
// Body outcome application
// ============================================================================

impl CaptureEngine {
    /// Lands a resolved body fetch on its record.
    ///
    /// Addressed by record id, not slot: a slot rotated by a redirect or
    /// a cleared table simply discards the resolution.
    fn apply_body_outcome(
        &mut self,
        record_id: &RecordId,
        outcome: Result<(String, BodyEncoding)>,
    ) {
        let Some(record) = self.records.get_mut(record_id) else {
            debug!(%record_id, "Discarding body for a record no longer present");
            return;
        };

        match outcome {
            Ok((body, encoding)) => {
                record.response_body = body;
                record.response_body_encoding = encoding;
                record.body_size = Some(record.encoded_data_length);
            }
            Err(e) => {
                warn!(%record_id, error = %e, "Body retrieval failed; storing empty body");
                record.response_body = String::new();
                record.response_body_encoding = BodyEncoding::Utf8;
            }
        }

        record.status = RecordStatus::Completed;
        self.bus.entry(record);
    }
}
