//! Outbound tracking over a DOM bridged from outside the crate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use plausible_tracker::browser::{HostClickListener, HostMutationCallback};
use plausible_tracker::tracker::{NAVIGATION_DELAY, OUTBOUND_LINK_CLICK};
use plausible_tracker::{
    AnchorLike, DomHost, LinkClick, ListenerId, ManualScheduler, MutationObserverInit,
    MutationRecord, NodeId, ObserverId, RecordingTransport, Tracker, Window,
};
use serde_json::json;
use url::Url;

// ============================================================================
// Bridge
// ============================================================================

/// A node mirrored from a page the crate does not own.
#[derive(Debug, Clone)]
struct ForeignNode {
    id: NodeId,
    href: Option<String>,
    children: Vec<ForeignNode>,
}

impl ForeignNode {
    fn element(id: u64, children: Vec<ForeignNode>) -> Self {
        Self {
            id: NodeId::from_raw(id),
            href: None,
            children,
        }
    }

    fn link(id: u64, href: &str) -> Self {
        Self {
            id: NodeId::from_raw(id),
            href: Some(href.to_string()),
            children: Vec::new(),
        }
    }
}

impl AnchorLike for ForeignNode {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn is_anchor(&self) -> bool {
        self.href.is_some()
    }

    fn host(&self) -> String {
        self.href
            .as_deref()
            .and_then(|href| Url::parse(href).ok())
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_default()
    }

    fn href(&self) -> String {
        self.href.clone().unwrap_or_default()
    }

    fn children(&self) -> Vec<Self> {
        self.children.clone()
    }
}

struct ForeignClick {
    target: ForeignNode,
    prevented: AtomicBool,
}

impl LinkClick<ForeignNode> for ForeignClick {
    fn current_target(&self) -> ForeignNode {
        self.target.clone()
    }

    fn prevent_default(&self) {
        self.prevented.store(true, Ordering::SeqCst);
    }
}

type Listeners = Vec<(NodeId, ListenerId, HostClickListener<ForeignNode>)>;
type Observers = Vec<(ObserverId, HostMutationCallback<ForeignNode>)>;

#[derive(Clone, Default)]
struct Bridge {
    listeners: Arc<Mutex<Listeners>>,
    observers: Arc<Mutex<Observers>>,
}

impl Bridge {
    fn click(&self, node: &ForeignNode) -> bool {
        let listeners: Vec<HostClickListener<ForeignNode>> = self
            .listeners
            .lock()
            .iter()
            .filter(|(target, _, _)| *target == node.id)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();

        let click = ForeignClick {
            target: node.clone(),
            prevented: AtomicBool::new(false),
        };
        for listener in listeners {
            listener(&click as &dyn LinkClick<ForeignNode>);
        }
        click.prevented.load(Ordering::SeqCst)
    }

    fn mutate(&self, records: &[MutationRecord<ForeignNode>]) {
        let callbacks: Vec<HostMutationCallback<ForeignNode>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(records);
        }
    }

    fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}

impl DomHost for Bridge {
    type Node = ForeignNode;

    fn add_click_listener(
        &self,
        node: &ForeignNode,
        listener: HostClickListener<ForeignNode>,
    ) -> ListenerId {
        let id = ListenerId::generate();
        self.listeners.lock().push((node.id, id, listener));
        id
    }

    fn remove_click_listener(&self, _node: &ForeignNode, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(_, listener, _)| *listener != id);
        before != listeners.len()
    }

    fn observe(
        &self,
        _target: &ForeignNode,
        _init: MutationObserverInit,
        callback: HostMutationCallback<ForeignNode>,
    ) -> ObserverId {
        let id = ObserverId::generate();
        self.observers.lock().push((id, callback));
        id
    }

    fn disconnect(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(observer, _)| *observer != id);
        before != observers.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_outbound_tracking_through_bridge() {
    let scheduler = Arc::new(ManualScheduler::new());
    let window = Window::builder()
        .url("https://example.com/")
        .scheduler(scheduler.clone())
        .build()
        .expect("window");
    let transport = RecordingTransport::new();
    let tracker = Tracker::builder(window.clone())
        .transport(Arc::new(transport.clone()))
        .build()
        .expect("tracker");

    let external = ForeignNode::link(90_001, "https://partner.org/offer");
    let local = ForeignNode::link(90_002, "https://example.com/about");
    let root = ForeignNode::element(90_000, vec![external.clone(), local.clone()]);
    let bridge = Bridge::default();

    let watcher = tracker.enable_auto_outbound_tracking_on(bridge.clone(), root.clone(), None);
    assert_eq!(watcher.tracked_count(), 1);
    assert!(watcher.is_tracking(&external));
    assert!(!watcher.is_tracking(&local));
    assert_eq!(bridge.listener_count(), 1);
    assert_eq!(bridge.observer_count(), 1);

    let late = ForeignNode::link(90_003, "https://late.org/");
    bridge.mutate(&[MutationRecord::ChildList {
        target: root,
        added_nodes: vec![late.clone()],
        removed_nodes: vec![external.clone()],
    }]);
    assert!(watcher.is_tracking(&late));
    assert!(!watcher.is_tracking(&external));
    assert_eq!(bridge.listener_count(), 1);

    assert!(bridge.click(&late));
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].durable);
    assert_eq!(requests[0].payload().expect("payload").name, OUTBOUND_LINK_CLICK);
    assert_eq!(
        requests[0].props().expect("props"),
        Some(json!({"url": "https://late.org/"}))
    );

    scheduler.advance(NAVIGATION_DELAY);
    assert_eq!(window.location().href(), "https://late.org/");

    watcher.stop();
    assert_eq!(bridge.listener_count(), 0);
    assert_eq!(bridge.observer_count(), 0);
}
