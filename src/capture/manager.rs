//! Capture session management.
//!
//! Attach/detach orchestration, domain enablement, auto-attach
//! configuration, and reapplication of network-condition settings. All
//! protocol I/O runs in spawned tasks; the handlers here only mutate
//! registry state and schedule work, so the loop never blocks.
//!
//! Error policy: attach failure surfaces as `false` to the caller and
//! nothing else; every other command in this module is best-effort per
//! target: a failure is logged and the batch continues.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

use crate::capture::engine::{AttachPhase, CaptureConfig, CaptureEngine, EngineMessage};
use crate::identifiers::{SessionId, TabId};
use crate::protocol::{Command, NetworkCommand, PageCommand, RuntimeCommand, TargetCommand};
use crate::transport::Debugger;

// ============================================================================
// Start / Attach
// ============================================================================

impl CaptureEngine {
    /// Handles a `start` command.
    ///
    /// Idempotent under concurrent and duplicate calls: an already
    /// attached tab and an attach already in flight both answer `true`
    /// without issuing a second attach.
    pub(super) fn handle_start(&mut self, tab_id: TabId, reply: oneshot::Sender<bool>) {
        if self.registry.is_attached(tab_id) {
            let _ = reply.send(true);
            return;
        }
        if !self.registry.begin_attach(tab_id) {
            // Another start owns the in-flight slot; it will finish the job.
            debug!(%tab_id, "Attach already in flight");
            let _ = reply.send(true);
            return;
        }

        let debugger = Arc::clone(&self.debugger);
        let msg_tx = self.msg_tx.clone();
        let config = self.config;

        tokio::spawn(async move {
            match debugger.attach(tab_id).await {
                Err(e) => {
                    warn!(%tab_id, error = %e, "Attach failed");
                    let _ = msg_tx.send(EngineMessage::Attach(AttachPhase::Finished {
                        tab_id,
                        success: false,
                        reply,
                    }));
                }
                Ok(()) => {
                    // Mark the tab attached right away so events racing the
                    // domain enables below already resolve to it.
                    let _ = msg_tx.send(EngineMessage::Attach(AttachPhase::Opened { tab_id }));

                    enable_domains(&debugger, tab_id, None).await;
                    apply_command(
                        &debugger,
                        tab_id,
                        None,
                        Command::Target(TargetCommand::auto_attach()),
                    )
                    .await;
                    apply_config(&debugger, tab_id, config).await;

                    let _ = msg_tx.send(EngineMessage::Attach(AttachPhase::Finished {
                        tab_id,
                        success: true,
                        reply,
                    }));
                }
            }
        });
    }

    /// Applies an attach task's progress to the registry.
    pub(super) fn handle_attach_phase(&mut self, phase: AttachPhase) {
        match phase {
            AttachPhase::Opened { tab_id } => self.registry.mark_attached(tab_id),
            AttachPhase::Finished {
                tab_id,
                success,
                reply,
            } => {
                self.registry.finish_attach(tab_id, success);
                if success {
                    info!(%tab_id, "Capture started");
                    self.bus.started(tab_id);
                }
                let _ = reply.send(success);
            }
        }
    }
}

// ============================================================================
// Stop / Clear
// ============================================================================

impl CaptureEngine {
    /// Handles a `stop` command.
    ///
    /// The registry empties immediately (events arriving from here on
    /// are dropped) while the detach commands run best-effort in the
    /// background; one unreachable tab never blocks the others.
    pub(super) fn handle_stop(&mut self, reply: oneshot::Sender<()>) {
        let tabs = self.registry.attached_tabs();
        self.registry.clear();
        self.bus.stopped();

        let debugger = Arc::clone(&self.debugger);
        tokio::spawn(async move {
            for tab_id in tabs {
                if let Err(e) = debugger.detach(tab_id).await {
                    warn!(%tab_id, error = %e, "Detach failed");
                }
            }
            let _ = reply.send(());
        });
    }

    /// Handles a `clear` command: records only, attachment untouched.
    pub(super) fn handle_clear(&mut self, reply: oneshot::Sender<()>) {
        self.records.clear();
        self.bus.cleared();
        let _ = reply.send(());
    }
}

// ============================================================================
// Configuration
// ============================================================================

impl CaptureEngine {
    /// Updates the throttle profile and reapplies it everywhere.
    pub(super) fn handle_set_throttle(
        &mut self,
        profile: crate::protocol::ThrottleProfile,
        reply: oneshot::Sender<()>,
    ) {
        self.config.throttle = profile;
        self.reapply_config(reply);
    }

    /// Updates the cache-bypass flag and reapplies it everywhere.
    pub(super) fn handle_set_cache_disabled(&mut self, value: bool, reply: oneshot::Sender<()>) {
        self.config.cache_disabled = value;
        self.reapply_config(reply);
    }

    /// Best-effort reapplication of the desired config to every attached
    /// root; per-target failures are swallowed individually.
    fn reapply_config(&self, reply: oneshot::Sender<()>) {
        let tabs = self.registry.attached_tabs();
        let debugger = Arc::clone(&self.debugger);
        let config = self.config;

        tokio::spawn(async move {
            for tab_id in tabs {
                apply_config(&debugger, tab_id, config).await;
            }
            let _ = reply.send(());
        });
    }
}

// ============================================================================
// Auto-attach triggers
// ============================================================================

impl CaptureEngine {
    /// A top-level navigation was observed: when a capture is active and
    /// the URL is plain http(s), start the navigating tab. `start` being
    /// idempotent makes duplicate notifications harmless.
    pub(super) fn handle_navigation(&mut self, tab_id: TabId, url: &str) {
        if !self.registry.is_active() || !is_capturable_url(url) {
            return;
        }
        self.start_silently(tab_id);
    }

    /// A tab was opened by another: follow it when the opener is
    /// captured.
    pub(super) fn handle_tab_opened(&mut self, opener: TabId, tab_id: TabId) {
        if !self.registry.is_active() || !self.registry.is_attached(opener) {
            return;
        }
        debug!(%opener, %tab_id, "Following tab opened by captured tab");
        self.start_silently(tab_id);
    }

    /// Runs `start` with the boolean answer discarded; failures here are
    /// only ever re-triggered by the next notification.
    fn start_silently(&mut self, tab_id: TabId) {
        let (reply, _discarded) = oneshot::channel();
        self.handle_start(tab_id, reply);
    }
}

/// Returns `true` for plain http(s) URLs; everything else (devtools,
/// extension pages, about:blank) stays out of the capture.
fn is_capturable_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

// ============================================================================
// Command helpers
// ============================================================================

/// Enables the three observation domains on a target, best-effort each.
pub(super) async fn enable_domains(
    debugger: &Arc<dyn Debugger>,
    tab_id: TabId,
    session_id: Option<SessionId>,
) {
    for command in [
        Command::Network(NetworkCommand::enable()),
        Command::Page(PageCommand::Enable),
        Command::Runtime(RuntimeCommand::Enable),
    ] {
        apply_command(debugger, tab_id, session_id.clone(), command).await;
    }
}

/// Applies the desired config to one root target, best-effort each.
async fn apply_config(debugger: &Arc<dyn Debugger>, tab_id: TabId, config: CaptureConfig) {
    apply_command(
        debugger,
        tab_id,
        None,
        Command::Network(NetworkCommand::SetCacheDisabled {
            cache_disabled: config.cache_disabled,
        }),
    )
    .await;
    apply_command(
        debugger,
        tab_id,
        None,
        Command::Network(NetworkCommand::EmulateNetworkConditions {
            conditions: config.throttle.conditions(),
        }),
    )
    .await;
}

/// Issues one command, logging and swallowing any failure.
pub(super) async fn apply_command(
    debugger: &Arc<dyn Debugger>,
    tab_id: TabId,
    session_id: Option<SessionId>,
    command: Command,
) {
    let method = command.method();
    if let Err(e) = debugger.command(tab_id, session_id, command).await {
        warn!(%tab_id, method, error = %e, "Best-effort command failed");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_capturable_url() {
        assert!(is_capturable_url("http://example.com/a"));
        assert!(is_capturable_url("https://example.com"));
        assert!(!is_capturable_url("about:blank"));
        assert!(!is_capturable_url("chrome-extension://id/dash.html"));
        assert!(!is_capturable_url("not a url"));
    }
}
