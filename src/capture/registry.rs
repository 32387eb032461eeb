//! Session registry.
//!
//! Single source of truth for identity: which logical tabs are actively
//! captured (directly attached roots), which protocol sessions belong to
//! auto-attached children, and which attach attempts are still in flight.
//! Every event is resolved against this registry exactly once before it
//! reaches the correlator.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::{FxHashMap, FxHashSet};

use crate::identifiers::{SessionId, TabId, TargetId};

// ============================================================================
// ChildSession
// ============================================================================

/// An auto-attached (non-root) target discovered under a root session.
#[derive(Debug, Clone)]
pub struct ChildSession {
    /// Protocol session of the child.
    pub session_id: SessionId,
    /// Root tab whose connection carries this child.
    pub parent_tab: TabId,
    /// Logical tab the child resolved to; write-once.
    resolved_tab: Option<TabId>,
    /// Whether the target is paused awaiting resume.
    pub waiting_for_debugger: bool,
}

impl ChildSession {
    /// Returns the resolved logical tab, if resolution happened.
    #[inline]
    #[must_use]
    pub fn resolved_tab(&self) -> Option<TabId> {
        self.resolved_tab
    }
}

// ============================================================================
// SessionRegistry
// ============================================================================

/// Maps transient protocol sessions to logical tabs and tracks
/// attachment state.
///
/// Owned exclusively by the engine; all mutation happens on the engine's
/// event loop, so no interior locking is needed.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// Directly attached root tabs.
    attached: FxHashSet<TabId>,
    /// Tabs with an attach attempt in flight.
    attaching: FxHashSet<TabId>,
    /// Live child sessions by session id.
    children: FxHashMap<SessionId, ChildSession>,
    /// Known target-to-tab bindings, fed by the manager on attach.
    known_targets: FxHashMap<TargetId, TabId>,
    /// Whether a capture is globally active.
    active: bool,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Attachment state
    // ========================================================================

    /// Returns `true` if the tab is a directly attached root.
    #[inline]
    #[must_use]
    pub fn is_attached(&self, tab_id: TabId) -> bool {
        self.attached.contains(&tab_id)
    }

    /// Returns `true` if a capture is globally active.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Claims an attach slot for the tab.
    ///
    /// Returns `false` when the tab is already attached or an attach is
    /// already in flight; concurrent duplicate `start` calls collapse
    /// through this check.
    pub fn begin_attach(&mut self, tab_id: TabId) -> bool {
        if self.attached.contains(&tab_id) || !self.attaching.insert(tab_id) {
            return false;
        }
        true
    }

    /// Marks a tab attached and the capture active.
    ///
    /// Called as soon as the transport attach succeeds so that events
    /// racing the rest of the setup already resolve; the in-flight slot
    /// stays claimed until [`SessionRegistry::finish_attach`].
    pub fn mark_attached(&mut self, tab_id: TabId) {
        self.attached.insert(tab_id);
        self.active = true;
    }

    /// Releases the in-flight slot and, on success, marks the tab
    /// attached and the capture active.
    pub fn finish_attach(&mut self, tab_id: TabId, success: bool) {
        self.attaching.remove(&tab_id);
        if success {
            self.attached.insert(tab_id);
            self.active = true;
        }
    }

    /// Removes a root tab, e.g. on an out-of-band detach notification.
    pub fn remove_root(&mut self, tab_id: TabId) {
        self.attached.remove(&tab_id);
        self.children.retain(|_, child| child.parent_tab != tab_id);
    }

    /// All directly attached roots, in unspecified order.
    #[must_use]
    pub fn attached_tabs(&self) -> Vec<TabId> {
        self.attached.iter().copied().collect()
    }

    /// The primary attached root, lowest tab id first for stability.
    #[must_use]
    pub fn primary_tab(&self) -> Option<TabId> {
        self.attached.iter().copied().min()
    }

    // ========================================================================
    // Child sessions
    // ========================================================================

    /// Registers a child session discovered under `parent_tab`.
    ///
    /// Resolution consults the known child target list; an unknown target
    /// resolves to the parent tab, keeping the child's traffic attributed
    /// to the capture that spawned it.
    pub fn add_child(
        &mut self,
        session_id: SessionId,
        parent_tab: TabId,
        target_id: &TargetId,
        waiting_for_debugger: bool,
    ) -> &ChildSession {
        let resolved_tab = self
            .known_targets
            .get(target_id)
            .copied()
            .or(Some(parent_tab));

        self.children
            .entry(session_id.clone())
            .or_insert_with(|| ChildSession {
                session_id,
                parent_tab,
                resolved_tab,
                waiting_for_debugger,
            })
    }

    /// Removes a child session, returning it if it existed.
    pub fn remove_child(&mut self, session_id: &SessionId) -> Option<ChildSession> {
        self.children.remove(session_id)
    }

    /// Looks up a live child session.
    #[inline]
    #[must_use]
    pub fn child(&self, session_id: &SessionId) -> Option<&ChildSession> {
        self.children.get(session_id)
    }

    /// Number of live child sessions.
    #[inline]
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Records a target-to-tab binding for later child resolution.
    pub fn register_target(&mut self, target_id: TargetId, tab_id: TabId) {
        self.known_targets.insert(target_id, tab_id);
    }

    // ========================================================================
    // Identity resolution
    // ========================================================================

    /// Resolves an incoming event to a logical tab.
    ///
    /// The session id wins when it maps to a resolved child; otherwise
    /// the root tab the event arrived over is used. Returns `None`, and
    /// the event must be dropped, when no capture is active or the resolved
    /// tab is neither an attached root nor a resolved child.
    #[must_use]
    pub fn resolve_event_tab(&self, session_id: Option<&SessionId>, root: TabId) -> Option<TabId> {
        if !self.active {
            return None;
        }

        let tab = session_id
            .and_then(|s| self.children.get(s))
            .and_then(ChildSession::resolved_tab)
            .unwrap_or(root);

        self.is_capturable(tab).then_some(tab)
    }

    /// Returns `true` when events may be addressed directly to the tab's
    /// own connection (roots only; child traffic rides the parent).
    #[inline]
    #[must_use]
    pub fn is_direct(&self, session_id: Option<&SessionId>) -> bool {
        session_id.is_none()
    }

    fn is_capturable(&self, tab_id: TabId) -> bool {
        self.attached.contains(&tab_id)
            || self
                .children
                .values()
                .any(|child| child.resolved_tab() == Some(tab_id))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Drops all identity state and deactivates the capture.
    pub fn clear(&mut self) {
        self.attached.clear();
        self.attaching.clear();
        self.children.clear();
        self.known_targets.clear();
        self.active = false;
    }

    /// Returns `true` when no roots, children, or in-flight attaches remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.attaching.is_empty() && self.children.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: u32) -> TabId {
        TabId::new(id).unwrap()
    }

    #[test]
    fn test_begin_attach_claims_once() {
        let mut registry = SessionRegistry::new();

        assert!(registry.begin_attach(tab(101)));
        // Second claim while in flight is refused.
        assert!(!registry.begin_attach(tab(101)));

        registry.finish_attach(tab(101), true);
        assert!(registry.is_attached(tab(101)));
        assert!(registry.is_active());

        // Already attached is refused too.
        assert!(!registry.begin_attach(tab(101)));
    }

    #[test]
    fn test_failed_attach_leaves_no_state() {
        let mut registry = SessionRegistry::new();

        assert!(registry.begin_attach(tab(101)));
        registry.finish_attach(tab(101), false);

        assert!(!registry.is_attached(tab(101)));
        assert!(!registry.is_active());
        assert!(registry.begin_attach(tab(101)));
    }

    #[test]
    fn test_resolve_root_events() {
        let mut registry = SessionRegistry::new();
        registry.begin_attach(tab(101));
        registry.finish_attach(tab(101), true);

        assert_eq!(registry.resolve_event_tab(None, tab(101)), Some(tab(101)));
        // Unattached tab is dropped.
        assert_eq!(registry.resolve_event_tab(None, tab(202)), None);
    }

    #[test]
    fn test_resolve_child_session_wins() {
        let mut registry = SessionRegistry::new();
        registry.begin_attach(tab(101));
        registry.finish_attach(tab(101), true);

        let session = SessionId::from("CHILD-1");
        registry.add_child(session.clone(), tab(101), &TargetId::new("TGT-1"), true);

        assert_eq!(
            registry.resolve_event_tab(Some(&session), tab(101)),
            Some(tab(101))
        );

        // Unknown session falls back to the root it arrived over.
        let stranger = SessionId::from("NOPE");
        assert_eq!(
            registry.resolve_event_tab(Some(&stranger), tab(101)),
            Some(tab(101))
        );
    }

    #[test]
    fn test_resolve_after_stop_drops_everything() {
        let mut registry = SessionRegistry::new();
        registry.begin_attach(tab(101));
        registry.finish_attach(tab(101), true);
        registry.clear();

        assert_eq!(registry.resolve_event_tab(None, tab(101)), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_known_target_resolution() {
        let mut registry = SessionRegistry::new();
        registry.begin_attach(tab(101));
        registry.finish_attach(tab(101), true);
        registry.begin_attach(tab(202));
        registry.finish_attach(tab(202), true);

        registry.register_target(TargetId::new("TGT-B"), tab(202));

        let child = registry.add_child(
            SessionId::from("CHILD-2"),
            tab(101),
            &TargetId::new("TGT-B"),
            false,
        );
        assert_eq!(child.resolved_tab(), Some(tab(202)));
    }

    #[test]
    fn test_remove_root_prunes_children() {
        let mut registry = SessionRegistry::new();
        registry.begin_attach(tab(101));
        registry.finish_attach(tab(101), true);

        registry.add_child(SessionId::from("C1"), tab(101), &TargetId::new("T1"), true);
        registry.add_child(SessionId::from("C2"), tab(101), &TargetId::new("T2"), true);
        assert_eq!(registry.child_count(), 2);

        registry.remove_root(tab(101));
        assert_eq!(registry.child_count(), 0);
        assert!(!registry.is_attached(tab(101)));
    }

    #[test]
    fn test_primary_tab_is_stable() {
        let mut registry = SessionRegistry::new();
        for id in [303, 101, 202] {
            registry.begin_attach(tab(id));
            registry.finish_attach(tab(id), true);
        }
        assert_eq!(registry.primary_tab(), Some(tab(101)));
    }
}
