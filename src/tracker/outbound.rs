//! Outbound link tracking.
//!
//! Keeps exactly one click listener on every link under a root whose host
//! differs from the page host, following the tree as it mutates.
//!
//! | Mutation | Handling |
//! |----------|----------|
//! | `href` changed | Untrack the link, then re-evaluate it |
//! | Nodes removed | Untrack them and every link below them |
//! | Nodes added | Track them and every qualifying link below them |
//!
//! A click sends `Outbound Link: Click` as a beacon, cancels the default
//! navigation, and navigates after [`NAVIGATION_DELAY`] so the beacon can
//! leave first. A window without a scheduler cannot defer, so there the
//! click keeps its default action and the link is followed right away.
//!
//! The watcher drives any [`DomHost`]; [`Document`] is the default.

// ============================================================================
// Imports
// ============================================================================

use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::browser::{
    AnchorLike, Document, DomHost, HostClickListener, HostMutationCallback, LinkClick,
    MutationObserverInit, MutationRecord, Node, TimerHandle,
};
use crate::identifiers::{ListenerId, NodeId, ObserverId};
use crate::protocol::EventOptions;

use super::Tracker;
use super::config::EventData;

// ============================================================================
// Constants
// ============================================================================

/// Event name sent for outbound clicks.
pub const OUTBOUND_LINK_CLICK: &str = "Outbound Link: Click";

/// Delay between the click and the real navigation.
pub const NAVIGATION_DELAY: Duration = Duration::from_millis(150);

// ============================================================================
// Qualification
// ============================================================================

/// Returns `true` if `node` is a link pointing off `document_host`.
#[must_use]
pub fn is_outbound<A: AnchorLike>(node: &A, document_host: &str) -> bool {
    node.is_anchor() && node.host() != document_host
}

/// Returns `node` itself if it is a link, followed by every link below it.
#[must_use]
pub fn link_candidates<A: AnchorLike + Clone>(node: &A) -> Vec<A> {
    let mut candidates = Vec::new();
    if node.is_anchor() {
        candidates.push(node.clone());
    }
    candidates.extend(node.anchors());
    candidates
}

/// Every outbound link below `root`, excluding `root` itself.
#[must_use]
pub fn outbound_anchors<A: AnchorLike>(root: &A, document_host: &str) -> Vec<A> {
    root.anchors()
        .into_iter()
        .filter(|anchor| is_outbound(anchor, document_host))
        .collect()
}

// ============================================================================
// TrackedAnchors
// ============================================================================

/// Links currently carrying a click listener, keyed by node identity.
#[derive(Debug)]
pub struct TrackedAnchors<N = Node> {
    entries: FxHashMap<NodeId, (N, ListenerId)>,
}

impl<N> Default for TrackedAnchors<N> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<N: AnchorLike> TrackedAnchors<N> {
    /// Creates an empty set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tracked links.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is tracked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if the node is tracked.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Records a tracked link. Returns `false` if it was already present.
    pub fn insert(&mut self, node: N, listener: ListenerId) -> bool {
        match self.entries.entry(node.node_id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert((node, listener));
                true
            }
        }
    }

    /// Forgets a link, returning it with its listener.
    pub fn remove(&mut self, id: NodeId) -> Option<(N, ListenerId)> {
        self.entries.remove(&id)
    }

    /// Empties the set.
    pub fn drain(&mut self) -> Vec<(N, ListenerId)> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    fn nodes(&self) -> impl Iterator<Item = &N> {
        self.entries.values().map(|(node, _)| node)
    }
}

// ============================================================================
// OutboundLinkWatcher
// ============================================================================

struct WatcherInner<H: DomHost> {
    tracker: Tracker,
    host: H,
    root: H::Node,
    anchors: Mutex<TrackedAnchors<H::Node>>,
    navigations: Mutex<Vec<TimerHandle>>,
    observer: Mutex<Option<ObserverId>>,
    stopped: AtomicBool,
}

/// Handle returned by [`Tracker::enable_auto_outbound_tracking`].
///
/// Tracking continues until [`stop`](Self::stop) is called, even if the
/// handle is dropped.
#[must_use = "dropping the watcher does not stop it; keep it to call stop()"]
pub struct OutboundLinkWatcher<H: DomHost = Document> {
    inner: Arc<WatcherInner<H>>,
}

impl<H: DomHost> fmt::Debug for OutboundLinkWatcher<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundLinkWatcher")
            .field("root", &self.inner.root.node_id())
            .field("tracked", &self.tracked_count())
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl<H: DomHost> OutboundLinkWatcher<H> {
    pub(crate) fn start(
        tracker: &Tracker,
        host: H,
        root: H::Node,
        init: MutationObserverInit,
    ) -> Self {
        let inner = Arc::new(WatcherInner {
            tracker: tracker.clone(),
            host,
            root,
            anchors: Mutex::new(TrackedAnchors::new()),
            navigations: Mutex::new(Vec::new()),
            observer: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });

        for anchor in inner.root.anchors() {
            inner.track(&anchor);
        }

        let observed = Arc::clone(&inner);
        let callback: HostMutationCallback<H::Node> =
            Arc::new(move |records: &[MutationRecord<H::Node>]| observed.on_mutations(records));
        let observer = inner.host.observe(&inner.root, init, callback);
        *inner.observer.lock() = Some(observer);

        debug!(
            root = %inner.root.node_id(),
            tracked = inner.anchors.lock().len(),
            "Outbound link tracking enabled"
        );
        Self { inner }
    }

    /// Removes every listener, clears the set, and disconnects the
    /// observer. Safe to call twice.
    ///
    /// Navigations already scheduled by clicks still happen.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let observer = self.inner.observer.lock().take();
        if let Some(observer) = observer {
            self.inner.host.disconnect(observer);
        }
        let drained = self.inner.anchors.lock().drain();
        let count = drained.len();
        for (node, listener) in drained {
            self.inner.host.remove_click_listener(&node, listener);
        }
        self.inner.navigations.lock().retain(TimerHandle::is_pending);

        debug!(untracked = count, "Outbound link tracking disabled");
    }

    /// Returns the number of tracked links.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.inner.anchors.lock().len()
    }

    /// Returns `true` if `node` carries this watcher's listener.
    #[must_use]
    pub fn is_tracking(&self, node: &H::Node) -> bool {
        self.inner.anchors.lock().contains(node.node_id())
    }

    /// Returns every tracked link.
    #[must_use]
    pub fn tracked(&self) -> Vec<H::Node> {
        self.inner.anchors.lock().nodes().cloned().collect()
    }

    /// Returns the number of scheduled navigations that have not run yet.
    #[must_use]
    pub fn pending_navigations(&self) -> usize {
        self.inner
            .navigations
            .lock()
            .iter()
            .filter(|handle| handle.is_pending())
            .count()
    }

    /// Returns `true` until [`stop`](Self::stop) is called.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.inner.stopped.load(Ordering::SeqCst)
    }
}

// ============================================================================
// WatcherInner - Tracking
// ============================================================================

impl<H: DomHost> WatcherInner<H> {
    fn document_host(&self) -> String {
        self.tracker.window().location().host()
    }

    /// Tracks `node` and the links below it.
    fn track(self: &Arc<Self>, node: &H::Node) {
        let host = self.document_host();
        for anchor in link_candidates(node) {
            if !is_outbound(&anchor, &host) {
                continue;
            }

            let mut anchors = self.anchors.lock();
            if anchors.contains(anchor.node_id()) {
                continue;
            }
            let watcher = Arc::clone(self);
            let listener: HostClickListener<H::Node> =
                Arc::new(move |event: &dyn LinkClick<H::Node>| watcher.on_click(event));
            let id = self.host.add_click_listener(&anchor, listener);
            trace!(node = %anchor.node_id(), href = %anchor.href(), "Tracking outbound link");
            anchors.insert(anchor, id);
        }
    }

    /// Untracks `node` and the links below it.
    fn untrack(&self, node: &H::Node) {
        for anchor in link_candidates(node) {
            let removed = self.anchors.lock().remove(anchor.node_id());
            if let Some((anchor, listener)) = removed {
                self.host.remove_click_listener(&anchor, listener);
                trace!(node = %anchor.node_id(), "Untracked outbound link");
            }
        }
    }

    fn on_mutations(self: &Arc<Self>, records: &[MutationRecord<H::Node>]) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        trace!(count = records.len(), "Outbound mutation batch");

        for record in records {
            match record {
                MutationRecord::Attributes { target, .. } => {
                    self.untrack(target);
                    self.track(target);
                }
                MutationRecord::ChildList {
                    added_nodes,
                    removed_nodes,
                    ..
                } => {
                    for node in removed_nodes {
                        self.untrack(node);
                    }
                    for node in added_nodes {
                        self.track(node);
                    }
                }
            }
        }
    }

    fn on_click(&self, event: &dyn LinkClick<H::Node>) {
        let href = event.current_target().href();

        self.tracker.track_event(
            OUTBOUND_LINK_CLICK,
            EventOptions::new().prop("url", href.clone()),
            EventData::new(),
            true,
        );

        let window = self.tracker.window();
        if window.is_interactive() {
            let Some(scheduler) = window.scheduler() else {
                debug!(href = %href, "No scheduler, following outbound link directly");
                return;
            };
            let target = window.clone();
            let destination = href.clone();
            let handle = scheduler.schedule(
                NAVIGATION_DELAY,
                Box::new(move || {
                    if let Err(e) = target.navigate(&destination) {
                        warn!(error = %e, href = %destination, "Deferred navigation failed");
                    }
                }),
            );

            let mut navigations = self.navigations.lock();
            navigations.retain(TimerHandle::is_pending);
            navigations.push(handle);
        }

        event.prevent_default();
        debug!(href = %href, "Outbound link clicked");
    }
}

// ============================================================================
// Tests
// ============================================================================
