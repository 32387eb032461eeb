//! The capture engine core.
//!
//! Everything between the raw protocol stream and the published request
//! log lives here:
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | `headers` | Case-insensitive header merging |
//! | `record` | Request records and the record table |
//! | `registry` | Session-to-tab identity and attachment state |
//! | `bus` | Notification fan-out to subscribers |
//! | `engine` | Owned state, event loop, [`EngineHandle`] |
//! | `manager` | Attach/detach/config orchestration |
//! | `correlator` | The event-correlation state machine |
//!
//! The engine is strictly single-writer: one loop task owns the registry
//! and the record table, and every async side-effect resumes by message.

// ============================================================================
// Submodules
// ============================================================================

/// Notification fan-out to subscribers.
pub mod bus;

/// Case-insensitive header merging.
pub mod headers;

/// Request records and the record table.
pub mod record;

/// Session-to-tab identity and attachment state.
pub mod registry;

/// Owned engine state, event loop, and handle.
pub mod engine;

mod correlator;
mod manager;

// ============================================================================
// Re-exports
// ============================================================================

pub use bus::{BroadcastBus, Notification};
pub use engine::{CaptureConfig, CaptureEngine, CaptureSnapshot, EngineHandle};
pub use headers::{Header, headers_from, merge_headers};
pub use record::{BodyEncoding, RecordStatus, RecordTable, RequestRecord};
pub use registry::{ChildSession, SessionRegistry};

// ============================================================================
// Tests
// ============================================================================
