//! CDP Capture - HTTP traffic capture over the Chrome DevTools Protocol.
//!
//! This library attaches to browser tabs via the remote debugging
//! protocol, reconstructs complete request/response records from the
//! interleaved asynchronous event stream, and republishes them as a
//! consistent, incrementally-updated log.
//!
//! # Architecture
//!
//! The core is a session & event correlation engine:
//!
//! - One engine instance owns all mutable state (session registry,
//!   record table, desired config) on a single event-loop task
//! - One WebSocket connection per attached root tab; auto-attached
//!   child targets multiplex over the root via flattened sessions
//! - Partial events keyed by ephemeral request ids merge into stable
//!   records: at most one record per logical request, redirect hops
//!   split into separate records when the protocol recycles an id
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cdp_capture::{CaptureEngine, CdpDebugger, DebuggerEndpoint, Result, TabId};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Wire the transport's event queue into the engine.
//!     let (events_tx, events_rx) = mpsc::unbounded_channel();
//!     let debugger = Arc::new(CdpDebugger::new(
//!         DebuggerEndpoint::new("127.0.0.1", 9222),
//!         events_tx,
//!     ));
//!     let handle = CaptureEngine::spawn(debugger, events_rx);
//!
//!     // Capture a tab and follow the stream.
//!     let mut stream = handle.subscribe();
//!     let attached = handle.start(TabId::new(1).expect("valid tab id")).await?;
//!     println!("attached: {attached}");
//!
//!     while let Ok(notification) = stream.recv().await {
//!         println!("{notification:?}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`capture`] | Engine core: records, registry, correlation, bus |
//! | [`control`] | UI-facing control/stream channel types |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Debugging-protocol message types (internal) |
//! | [`transport`] | WebSocket transport layer (internal) |
//!
//! # Guarantees
//!
//! - **At-most-one record** per logical request; redirect hops get
//!   distinct external record ids
//! - **Monotonic records**: a published field never reverts to empty
//! - **Idempotent start**: concurrent duplicate attach triggers issue
//!   exactly one underlying attach
//! - **Loss-tolerant**: a malformed event, a failed body fetch, or one
//!   unreachable tab never halts the capture

// ============================================================================
// Modules
// ============================================================================

/// Engine core: records, registry, correlation, broadcast bus.
///
/// This module contains the capture state machine:
///
/// - [`CaptureEngine`] - owned state + event loop
/// - [`EngineHandle`] - command front door
/// - [`RequestRecord`] - the unit of output
pub mod capture;

/// UI-facing control and stream channel types.
///
/// JSON command dispatch plus stream-frame wrapping.
pub mod control;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for capture entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Debugging-protocol message types.
///
/// Internal module defining command/response/event structures.
pub mod protocol;

/// WebSocket transport layer.
///
/// Internal module handling per-tab connections and the [`Debugger`]
/// trait seam.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Capture types
pub use capture::{
    BodyEncoding, BroadcastBus, CaptureConfig, CaptureEngine, CaptureSnapshot, EngineHandle,
    Header, Notification, RecordStatus, RequestRecord,
};

// Control types
pub use control::{ControlCommand, StreamFrame, dispatch_control};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CommandId, NetworkRequestId, RecordId, SessionId, TabId, TargetId};

// Protocol types
pub use protocol::{NetworkConditions, ThrottleProfile};

// Transport types
pub use transport::{CdpDebugger, Debugger, DebuggerEndpoint, TransportEvent};
