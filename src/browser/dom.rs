//! Document tree, mutation observation and click dispatch.
//!
//! Nodes live in an arena owned by the [`Document`] and are addressed by
//! [`NodeId`]; a [`Node`] is a counted handle. A detached subtree stays
//! walkable while any handle or queued mutation record points into it, and
//! is freed once nothing does.
//!
//! # Example
//!
//! ```ignore
//! let document = Document::new(Location::parse("https://example.com/")?);
//! let link = document.create_anchor("https://other.org/");
//! document.root().append_child(&link)?;
//!
//! let id = document.observe(&document.root(), MutationObserverInit::links(), |records| {
//!     println!("{} mutations", records.len());
//! });
//! link.set_attribute("href", "/local")?;
//! document.flush_mutations();
//! document.disconnect(id);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::{ListenerId, NodeId, ObserverId};

use super::location::{Location, url_host};

// ============================================================================
// Types
// ============================================================================

/// Click listener callback.
pub type ClickListener = Arc<dyn Fn(&ClickEvent) + Send + Sync>;

/// Mutation observer callback, invoked once per delivered batch.
pub type MutationCallback = Arc<dyn Fn(&[MutationRecord]) + Send + Sync>;

/// What a node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document root.
    Document,
    /// An element with a lowercase tag name.
    Element {
        /// Tag name.
        tag: String,
    },
    /// A text node.
    Text {
        /// Character data.
        data: String,
    },
}

// ============================================================================
// AnchorLike
// ============================================================================

/// Capabilities outbound-link tracking needs from a DOM-like tree.
pub trait AnchorLike: Sized {
    /// Identity of the node.
    fn node_id(&self) -> NodeId;

    /// Returns `true` for link elements.
    fn is_anchor(&self) -> bool;

    /// Resolved `host` of the link, empty for non-links.
    fn host(&self) -> String;

    /// Resolved `href` of the link, empty for non-links.
    fn href(&self) -> String;

    /// Direct children in document order.
    fn children(&self) -> Vec<Self>;

    /// Every descendant link in document order, excluding `self`.
    fn anchors(&self) -> Vec<Self> {
        let mut found = Vec::new();
        let mut stack: Vec<Self> = self.children().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            stack.extend(node.children().into_iter().rev());
            if node.is_anchor() {
                found.push(node);
            }
        }
        found
    }
}

// ============================================================================
// DomHost
// ============================================================================

/// A click as seen by a listener attached through a [`DomHost`].
pub trait LinkClick<N> {
    /// The node whose listener is running.
    fn current_target(&self) -> N;

    /// Cancels the default action.
    fn prevent_default(&self);
}

/// Click listener attached through a [`DomHost`].
pub type HostClickListener<N> = Arc<dyn Fn(&dyn LinkClick<N>) + Send + Sync>;

/// Mutation callback registered through a [`DomHost`].
pub type HostMutationCallback<N> = Arc<dyn Fn(&[MutationRecord<N>]) + Send + Sync>;

/// Listener and observer plumbing outbound-link tracking drives.
///
/// [`Document`] implements it for the in-crate tree. A bridge to a real page
/// implements it over its own node handles.
pub trait DomHost: Send + Sync + 'static {
    /// Node handle of this DOM.
    type Node: AnchorLike + Clone + Send + Sync + 'static;

    /// Attaches a click listener to `node`.
    fn add_click_listener(
        &self,
        node: &Self::Node,
        listener: HostClickListener<Self::Node>,
    ) -> ListenerId;

    /// Detaches a click listener. Returns `false` if it was not attached.
    fn remove_click_listener(&self, node: &Self::Node, id: ListenerId) -> bool;

    /// Starts observing mutations under `target`.
    fn observe(
        &self,
        target: &Self::Node,
        init: MutationObserverInit,
        callback: HostMutationCallback<Self::Node>,
    ) -> ObserverId;

    /// Stops an observer. Returns `false` if it was already stopped.
    fn disconnect(&self, id: ObserverId) -> bool;
}

// ============================================================================
// MutationObserverInit
// ============================================================================

/// Which mutations an observer receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationObserverInit {
    /// Also observe descendants of the target.
    pub subtree: bool,
    /// Observe child insertions and removals.
    pub child_list: bool,
    /// Observe attribute changes.
    pub attributes: bool,
    /// Restrict attribute observation to these names.
    pub attribute_filter: Option<Vec<String>>,
}

impl MutationObserverInit {
    /// Subtree, child list, and `href` attribute changes.
    #[must_use]
    pub fn links() -> Self {
        Self {
            subtree: true,
            child_list: true,
            attributes: true,
            attribute_filter: Some(vec!["href".to_string()]),
        }
    }

    fn wants_attribute(&self, name: &str) -> bool {
        self.attributes
            && self
                .attribute_filter
                .as_ref()
                .is_none_or(|filter| filter.iter().any(|f| f == name))
    }
}

// ============================================================================
// MutationRecord
// ============================================================================

/// A single observed mutation.
#[derive(Debug, Clone)]
pub enum MutationRecord<N = Node> {
    /// An attribute was set or removed.
    Attributes {
        /// Element whose attribute changed.
        target: N,
        /// Attribute name.
        attribute_name: String,
        /// Value before the change.
        old_value: Option<String>,
    },

    /// Children were inserted or removed.
    ChildList {
        /// Parent whose child list changed.
        target: N,
        /// Inserted nodes.
        added_nodes: Vec<N>,
        /// Removed nodes.
        removed_nodes: Vec<N>,
    },
}

impl<N> MutationRecord<N> {
    /// Returns the mutated node.
    #[must_use]
    pub fn target(&self) -> &N {
        match self {
            Self::Attributes { target, .. } | Self::ChildList { target, .. } => target,
        }
    }
}

#[derive(Debug, Clone)]
enum PendingRecord {
    Attributes {
        target: NodeId,
        name: String,
        old_value: Option<String>,
    },
    ChildList {
        target: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
}

impl PendingRecord {
    fn target(&self) -> NodeId {
        match self {
            Self::Attributes { target, .. } | Self::ChildList { target, .. } => *target,
        }
    }

    fn node_ids(&self) -> Vec<NodeId> {
        match self {
            Self::Attributes { target, .. } => vec![*target],
            Self::ChildList {
                target,
                added,
                removed,
            } => std::iter::once(*target)
                .chain(added.iter().copied())
                .chain(removed.iter().copied())
                .collect(),
        }
    }
}

// ============================================================================
// ClickEvent
// ============================================================================

/// A click travelling from its target up to the document root.
pub struct ClickEvent {
    target: Node,
    current_target: Node,
    default_prevented: Arc<AtomicBool>,
}

impl fmt::Debug for ClickEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClickEvent")
            .field("target", &self.target.id)
            .field("current_target", &self.current_target.id)
            .field("default_prevented", &self.default_prevented())
            .finish()
    }
}

impl ClickEvent {
    /// The node that was clicked.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &Node {
        &self.target
    }

    /// The node whose listener is running.
    #[inline]
    #[must_use]
    pub fn current_target(&self) -> &Node {
        &self.current_target
    }

    /// Cancels the default action (following the link).
    pub fn prevent_default(&self) {
        self.default_prevented.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once any listener prevented the default.
    #[must_use]
    pub fn default_prevented(&self) -> bool {
        self.default_prevented.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tree
// ============================================================================

struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: Vec<(String, String)>,
    click_listeners: Vec<(ListenerId, ClickListener)>,
    /// Live handles plus queued mutation records naming this node.
    refs: usize,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
            click_listeners: Vec::new(),
            refs: 0,
        }
    }
}

struct ObserverEntry {
    id: ObserverId,
    target: NodeId,
    init: MutationObserverInit,
    callback: MutationCallback,
    queue: Vec<PendingRecord>,
}

struct Tree {
    root: NodeId,
    nodes: FxHashMap<NodeId, NodeData>,
    observers: Vec<ObserverEntry>,
}

impl Tree {
    fn new() -> Self {
        let root = NodeId::generate();
        let mut nodes = FxHashMap::default();
        nodes.insert(root, NodeData::new(NodeKind::Document));
        Self {
            root,
            nodes,
            observers: Vec::new(),
        }
    }

    fn insert(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::generate();
        self.nodes.insert(id, NodeData::new(kind));
        id
    }

    fn node(&self, id: NodeId) -> Result<&NodeData> {
        self.nodes.get(&id).ok_or_else(|| Error::node_not_found(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.nodes.get_mut(&id).ok_or_else(|| Error::node_not_found(id))
    }

    /// `true` if `ancestor` is `node` or one of its ancestors.
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    fn detach(&mut self, child: NodeId) -> Result<Option<NodeId>> {
        let Some(parent) = self.node(child)?.parent else {
            return Ok(None);
        };
        self.node_mut(parent)?.children.retain(|&c| c != child);
        self.node_mut(child)?.parent = None;
        Ok(Some(parent))
    }

    fn retain(&mut self, id: NodeId) {
        if let Some(data) = self.nodes.get_mut(&id) {
            data.refs += 1;
        }
    }

    /// Drops one reference and frees the detached subtree holding `id` if
    /// nothing references it any more.
    ///
    /// Freed data is returned so listeners are dropped after the lock.
    #[must_use]
    fn release(&mut self, id: NodeId) -> Vec<NodeData> {
        if let Some(data) = self.nodes.get_mut(&id) {
            data.refs = data.refs.saturating_sub(1);
        }
        self.collect(id)
    }

    fn collect(&mut self, id: NodeId) -> Vec<NodeData> {
        let mut top = id;
        while let Some(parent) = self.nodes.get(&top).and_then(|n| n.parent) {
            top = parent;
        }
        if top == self.root || !self.nodes.contains_key(&top) {
            return Vec::new();
        }

        let mut subtree = Vec::new();
        let mut stack = vec![top];
        while let Some(current) = stack.pop() {
            let Some(data) = self.nodes.get(&current) else {
                continue;
            };
            if data.refs > 0 {
                return Vec::new();
            }
            stack.extend(data.children.iter().copied());
            subtree.push(current);
        }

        trace!(top = %top, count = subtree.len(), "Freeing detached subtree");
        subtree
            .into_iter()
            .filter_map(|node| self.nodes.remove(&node))
            .collect()
    }

    fn record(&mut self, record: PendingRecord) {
        let target = record.target();
        let mut matching = Vec::new();
        for (index, entry) in self.observers.iter().enumerate() {
            let in_scope = entry.target == target
                || (entry.init.subtree && self.contains(entry.target, target));
            let wanted = match &record {
                PendingRecord::Attributes { name, .. } => entry.init.wants_attribute(name),
                PendingRecord::ChildList { .. } => entry.init.child_list,
            };
            if in_scope && wanted {
                matching.push(index);
            }
        }
        for index in matching {
            for id in record.node_ids() {
                self.retain(id);
            }
            self.observers[index].queue.push(record.clone());
        }
    }

    /// Releases the references queued records hold.
    fn unpin(&mut self, records: &[PendingRecord]) -> Vec<NodeData> {
        let mut garbage = Vec::new();
        for record in records {
            for id in record.node_ids() {
                garbage.extend(self.release(id));
            }
        }
        garbage
    }
}

// ============================================================================
// Document
// ============================================================================

pub(crate) struct DocumentInner {
    root: NodeId,
    location: Arc<RwLock<Location>>,
    tree: Mutex<Tree>,
}

/// A live document tree.
///
/// Clones share the same tree.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.inner.tree.lock();
        f.debug_struct("Document")
            .field("root", &self.inner.root)
            .field("nodes", &tree.nodes.len())
            .field("observers", &tree.observers.len())
            .finish()
    }
}

impl Document {
    /// Creates an empty document at `location`.
    #[must_use]
    pub fn new(location: Location) -> Self {
        Self::with_location(Arc::new(RwLock::new(location)))
    }

    /// Creates a document sharing a window's location.
    pub(crate) fn with_location(location: Arc<RwLock<Location>>) -> Self {
        let tree = Tree::new();
        let root = tree.root;
        Self {
            inner: Arc::new(DocumentInner {
                root,
                location,
                tree: Mutex::new(tree),
            }),
        }
    }

    /// Returns the document node.
    #[must_use]
    pub fn root(&self) -> Node {
        self.node(self.inner.root)
    }

    /// Returns the current location.
    #[must_use]
    pub fn location(&self) -> Location {
        self.inner.location.read().clone()
    }

    /// Creates a detached element.
    #[must_use]
    pub fn create_element(&self, tag: &str) -> Node {
        let id = self.inner.tree.lock().insert(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
        });
        self.node(id)
    }

    /// Creates a detached text node.
    #[must_use]
    pub fn create_text(&self, data: &str) -> Node {
        let id = self.inner.tree.lock().insert(NodeKind::Text {
            data: data.to_string(),
        });
        self.node(id)
    }

    /// Creates a detached `<a href=...>`.
    #[must_use]
    pub fn create_anchor(&self, href: &str) -> Node {
        let mut tree = self.inner.tree.lock();
        let id = tree.insert(NodeKind::Element { tag: "a".into() });
        if let Some(data) = tree.nodes.get_mut(&id) {
            data.attributes.push(("href".into(), href.to_string()));
        }
        drop(tree);
        self.node(id)
    }

    /// Every link in the document.
    #[must_use]
    pub fn anchors(&self) -> Vec<Node> {
        self.root().anchors()
    }

    /// Starts observing mutations under `target`.
    pub fn observe<F>(&self, target: &Node, init: MutationObserverInit, callback: F) -> ObserverId
    where
        F: Fn(&[MutationRecord]) + Send + Sync + 'static,
    {
        let id = ObserverId::generate();
        self.inner.tree.lock().observers.push(ObserverEntry {
            id,
            target: target.id,
            init,
            callback: Arc::new(callback),
            queue: Vec::new(),
        });
        trace!(observer_id = %id, target = %target.id, "Observer registered");
        id
    }

    /// Stops an observer and drops its undelivered records.
    ///
    /// Returns `false` if it was already disconnected.
    pub fn disconnect(&self, id: ObserverId) -> bool {
        let (entry, garbage) = {
            let mut tree = self.inner.tree.lock();
            let Some(index) = tree.observers.iter().position(|entry| entry.id == id) else {
                return false;
            };
            let entry = tree.observers.remove(index);
            let garbage = tree.unpin(&entry.queue);
            (entry, garbage)
        };
        drop(entry);
        drop(garbage);
        true
    }

    /// Returns the number of active observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.tree.lock().observers.len()
    }

    /// Returns the number of nodes held by the document, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.tree.lock().nodes.len()
    }

    /// Delivers queued mutation records, one batch per observer.
    ///
    /// Mutations made by callbacks are delivered in a following round until
    /// nothing is queued. Returns the number of batches delivered.
    pub fn flush_mutations(&self) -> usize {
        let mut delivered = 0;
        loop {
            let batches: Vec<(MutationCallback, Vec<PendingRecord>)> = {
                let mut tree = self.inner.tree.lock();
                tree.observers
                    .iter_mut()
                    .filter(|entry| !entry.queue.is_empty())
                    .map(|entry| (Arc::clone(&entry.callback), std::mem::take(&mut entry.queue)))
                    .collect()
            };
            if batches.is_empty() {
                break;
            }

            for (callback, pending) in batches {
                let records: Vec<MutationRecord> =
                    pending.iter().cloned().map(|r| self.materialize(r)).collect();
                let garbage = self.inner.tree.lock().unpin(&pending);
                drop(garbage);
                trace!(count = records.len(), "Delivering mutation batch");
                callback(&records);
                delivered += 1;
            }
        }
        delivered
    }

    /// Dispatches a click on `target`, bubbling to the root.
    ///
    /// Returns `true` if a listener prevented the default action.
    pub fn dispatch_click(&self, target: &Node) -> bool {
        let default_prevented = Arc::new(AtomicBool::new(false));
        let mut path = vec![target.clone()];
        let mut current = target.parent();
        while let Some(node) = current {
            current = node.parent();
            path.push(node);
        }

        for node in path {
            let listeners = self.click_listeners(node.id);
            if listeners.is_empty() {
                continue;
            }

            let event = ClickEvent {
                target: target.clone(),
                current_target: node,
                default_prevented: Arc::clone(&default_prevented),
            };
            for listener in listeners {
                listener(&event);
            }
        }

        default_prevented.load(Ordering::SeqCst)
    }

    fn click_listeners(&self, id: NodeId) -> Vec<ClickListener> {
        let tree = self.inner.tree.lock();
        tree.nodes
            .get(&id)
            .map(|data| {
                data.click_listeners
                    .iter()
                    .map(|(_, l)| Arc::clone(l))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn node(&self, id: NodeId) -> Node {
        Node::counted(id, &self.inner)
    }

    fn materialize(&self, record: PendingRecord) -> MutationRecord {
        match record {
            PendingRecord::Attributes {
                target,
                name,
                old_value,
            } => MutationRecord::Attributes {
                target: self.node(target),
                attribute_name: name,
                old_value,
            },
            PendingRecord::ChildList {
                target,
                added,
                removed,
            } => MutationRecord::ChildList {
                target: self.node(target),
                added_nodes: added.into_iter().map(|id| self.node(id)).collect(),
                removed_nodes: removed.into_iter().map(|id| self.node(id)).collect(),
            },
        }
    }
}

// ============================================================================
// Node
// ============================================================================

/// Handle to a node of a [`Document`].
///
/// Equality is node identity. A detached node is freed with its subtree
/// once the last handle into that subtree is dropped.
pub struct Node {
    id: NodeId,
    document: Arc<DocumentInner>,
}

impl Node {
    fn counted(id: NodeId, document: &Arc<DocumentInner>) -> Self {
        document.tree.lock().retain(id);
        Self {
            id,
            document: Arc::clone(document),
        }
    }
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Self::counted(self.id, &self.document)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let garbage = self.document.tree.lock().release(self.id);
        drop(garbage);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.document, &other.document)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ============================================================================
// Node - Accessors
// ============================================================================

impl Node {
    /// Returns the node ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the node kind.
    #[must_use]
    pub fn kind(&self) -> Option<NodeKind> {
        self.read(|data| data.kind.clone())
    }

    /// Returns the lowercase tag name of an element.
    #[must_use]
    pub fn tag_name(&self) -> Option<String> {
        self.read(|data| match &data.kind {
            NodeKind::Element { tag } => Some(tag.clone()),
            _ => None,
        })
        .flatten()
    }

    /// Returns `true` for `<a>` elements.
    #[must_use]
    pub fn is_anchor(&self) -> bool {
        self.read(|data| matches!(&data.kind, NodeKind::Element { tag } if tag == "a"))
            .unwrap_or(false)
    }

    /// Returns the parent node.
    #[must_use]
    pub fn parent(&self) -> Option<Node> {
        self.read(|data| data.parent)
            .flatten()
            .map(|id| self.sibling_handle(id))
    }

    /// Returns the children in document order.
    #[must_use]
    pub fn children(&self) -> Vec<Node> {
        self.read(|data| data.children.clone())
            .unwrap_or_default()
            .into_iter()
            .map(|id| self.sibling_handle(id))
            .collect()
    }

    /// Returns every descendant link, excluding `self`.
    #[must_use]
    pub fn anchors(&self) -> Vec<Node> {
        <Self as AnchorLike>::anchors(self)
    }

    /// Returns `true` if `other` is this node or one of its descendants.
    #[must_use]
    pub fn contains(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.document, &other.document)
            && self.document.tree.lock().contains(self.id, other.id)
    }

    /// Returns `true` if the node is attached to its document.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.document.tree.lock().contains(self.document.root, self.id)
    }

    /// Gets an attribute value.
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<String> {
        self.read(|data| {
            data.attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        })
        .flatten()
    }

    /// Resolved link target.
    ///
    /// Empty when the node is not a link or has no `href`; the raw attribute
    /// when it cannot be resolved.
    #[must_use]
    pub fn href(&self) -> String {
        if !self.is_anchor() {
            return String::new();
        }
        let Some(raw) = self.get_attribute("href") else {
            return String::new();
        };
        match self.document.location.read().resolve(&raw) {
            Ok(url) => url.to_string(),
            Err(_) => raw,
        }
    }

    /// `host` of the resolved link target, empty when there is none.
    #[must_use]
    pub fn host(&self) -> String {
        if !self.is_anchor() {
            return String::new();
        }
        let Some(raw) = self.get_attribute("href") else {
            return String::new();
        };
        self.document
            .location
            .read()
            .resolve(&raw)
            .map(|url| url_host(&url))
            .unwrap_or_default()
    }

    /// Returns the number of click listeners on this node.
    #[must_use]
    pub fn click_listener_count(&self) -> usize {
        self.read(|data| data.click_listeners.len()).unwrap_or(0)
    }

    fn read<T>(&self, f: impl FnOnce(&NodeData) -> T) -> Option<T> {
        self.document.tree.lock().nodes.get(&self.id).map(f)
    }

    fn sibling_handle(&self, id: NodeId) -> Node {
        Node::counted(id, &self.document)
    }

    fn same_document(&self, other: &Node) -> Result<()> {
        if Arc::ptr_eq(&self.document, &other.document) {
            Ok(())
        } else {
            Err(Error::node_not_found(other.id))
        }
    }
}

// ============================================================================
// Node - Mutation
// ============================================================================

impl Node {
    /// Sets an attribute on an element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HierarchyRequest`] if the node is not an element.
    pub fn set_attribute(&self, name: &str, value: &str) -> Result<()> {
        let mut tree = self.document.tree.lock();
        let data = tree.node_mut(self.id)?;
        if !matches!(data.kind, NodeKind::Element { .. }) {
            return Err(Error::hierarchy_request("only elements have attributes"));
        }

        let old_value = match data.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => Some(std::mem::replace(v, value.to_string())),
            None => {
                data.attributes.push((name.to_string(), value.to_string()));
                None
            }
        };

        tree.record(PendingRecord::Attributes {
            target: self.id,
            name: name.to_string(),
            old_value,
        });
        Ok(())
    }

    /// Removes an attribute. Removing a missing attribute records nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] if the node does not exist.
    pub fn remove_attribute(&self, name: &str) -> Result<()> {
        let mut tree = self.document.tree.lock();
        let data = tree.node_mut(self.id)?;
        let Some(index) = data.attributes.iter().position(|(k, _)| k == name) else {
            return Ok(());
        };
        let (_, old) = data.attributes.remove(index);

        tree.record(PendingRecord::Attributes {
            target: self.id,
            name: name.to_string(),
            old_value: Some(old),
        });
        Ok(())
    }

    /// Appends `child`, moving it if it already has a parent.
    ///
    /// # Errors
    ///
    /// - [`Error::NodeNotFound`] if `child` belongs to another document
    /// - [`Error::HierarchyRequest`] if `self` is a text node, `child` is
    ///   the document, or `child` contains `self`
    pub fn append_child(&self, child: &Node) -> Result<()> {
        self.same_document(child)?;
        let mut tree = self.document.tree.lock();

        if matches!(tree.node(self.id)?.kind, NodeKind::Text { .. }) {
            return Err(Error::hierarchy_request("text nodes cannot have children"));
        }
        if matches!(tree.node(child.id)?.kind, NodeKind::Document) {
            return Err(Error::hierarchy_request("the document cannot be inserted"));
        }
        if tree.contains(child.id, self.id) {
            return Err(Error::hierarchy_request(
                "a node cannot be inserted into itself or its descendants",
            ));
        }

        if let Some(old_parent) = tree.detach(child.id)? {
            tree.record(PendingRecord::ChildList {
                target: old_parent,
                added: Vec::new(),
                removed: vec![child.id],
            });
        }

        tree.node_mut(self.id)?.children.push(child.id);
        tree.node_mut(child.id)?.parent = Some(self.id);
        tree.record(PendingRecord::ChildList {
            target: self.id,
            added: vec![child.id],
            removed: Vec::new(),
        });
        Ok(())
    }

    /// Removes `child` from this node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] if `child` is not a child of `self`.
    pub fn remove_child(&self, child: &Node) -> Result<()> {
        self.same_document(child)?;
        let mut tree = self.document.tree.lock();
        if tree.node(child.id)?.parent != Some(self.id) {
            return Err(Error::node_not_found(child.id));
        }

        tree.detach(child.id)?;
        tree.record(PendingRecord::ChildList {
            target: self.id,
            added: Vec::new(),
            removed: vec![child.id],
        });
        Ok(())
    }

    /// Detaches this node from its parent. No-op when already detached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] if the node does not exist.
    pub fn remove(&self) -> Result<()> {
        match self.parent() {
            Some(parent) => parent.remove_child(self),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Node - Listeners
// ============================================================================

impl Node {
    /// Registers a click listener.
    pub fn add_click_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ClickEvent) + Send + Sync + 'static,
    {
        self.add_shared_click_listener(Arc::new(listener))
    }

    /// Registers an already shared click listener.
    pub fn add_shared_click_listener(&self, listener: ClickListener) -> ListenerId {
        let id = ListenerId::generate();
        if let Some(data) = self.document.tree.lock().nodes.get_mut(&self.id) {
            data.click_listeners.push((id, listener));
        }
        id
    }

    /// Removes a click listener.
    ///
    /// Returns `false` if it was not registered on this node.
    pub fn remove_click_listener(&self, id: ListenerId) -> bool {
        let removed: Vec<(ListenerId, ClickListener)> = {
            let mut tree = self.document.tree.lock();
            let Some(data) = tree.nodes.get_mut(&self.id) else {
                return false;
            };
            let (removed, kept) = std::mem::take(&mut data.click_listeners)
                .into_iter()
                .partition(|(l, _)| *l == id);
            data.click_listeners = kept;
            removed
        };
        !removed.is_empty()
    }
}

impl AnchorLike for Node {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn is_anchor(&self) -> bool {
        Node::is_anchor(self)
    }

    fn host(&self) -> String {
        Node::host(self)
    }

    fn href(&self) -> String {
        Node::href(self)
    }

    fn children(&self) -> Vec<Self> {
        Node::children(self)
    }
}

impl LinkClick<Node> for ClickEvent {
    fn current_target(&self) -> Node {
        self.current_target.clone()
    }

    fn prevent_default(&self) {
        ClickEvent::prevent_default(self);
    }
}

impl DomHost for Document {
    type Node = Node;

    fn add_click_listener(&self, node: &Node, listener: HostClickListener<Node>) -> ListenerId {
        node.add_click_listener(move |event: &ClickEvent| {
            listener(event as &dyn LinkClick<Node>);
        })
    }

    fn remove_click_listener(&self, node: &Node, id: ListenerId) -> bool {
        node.remove_click_listener(id)
    }

    fn observe(
        &self,
        target: &Node,
        init: MutationObserverInit,
        callback: HostMutationCallback<Node>,
    ) -> ObserverId {
        Document::observe(self, target, init, move |records: &[MutationRecord]| {
            callback(records);
        })
    }

    fn disconnect(&self, id: ObserverId) -> bool {
        Document::disconnect(self, id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> Document {
        Document::new(Location::parse("https://example.com/blog/post").expect("location"))
    }

    fn recorder(
        document: &Document,
        target: &Node,
        init: MutationObserverInit,
    ) -> (ObserverId, Arc<Mutex<Vec<Vec<MutationRecord>>>>) {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        let id = document.observe(target, init, move |records| sink.lock().push(records.to_vec()));
        (id, batches)
    }

    #[test]
    fn test_anchor_resolution() {
        let doc = document();
        let relative = doc.create_anchor("/pricing");
        let external = doc.create_anchor("https://other.org:8080/x");
        let mail = doc.create_anchor("mailto:hi@example.com");
        let bare = doc.create_element("a");

        assert_eq!(relative.href(), "https://example.com/pricing");
        assert_eq!(relative.host(), "example.com");
        assert_eq!(external.host(), "other.org:8080");
        assert_eq!(mail.host(), "");
        assert_eq!(bare.href(), "");
        assert_eq!(bare.host(), "");
    }

    #[test]
    fn test_anchors_in_document_order() {
        let doc = document();
        let root = doc.root();
        let nav = doc.create_element("NAV");
        let first = doc.create_anchor("/1");
        let nested = doc.create_anchor("/2");
        let second = doc.create_anchor("/3");

        root.append_child(&nav).expect("append");
        nav.append_child(&first).expect("append");
        first.append_child(&nested).expect("append");
        root.append_child(&second).expect("append");

        assert_eq!(nav.tag_name().as_deref(), Some("nav"));
        assert_eq!(doc.anchors(), vec![first, nested, second]);
    }

    #[test]
    fn test_hierarchy_errors() {
        let doc = document();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        let text = doc.create_text("hello");
        outer.append_child(&inner).expect("append");

        assert!(inner.append_child(&outer).unwrap_err().is_dom_error());
        assert!(outer.append_child(&outer).unwrap_err().is_dom_error());
        assert!(text.append_child(&inner).unwrap_err().is_dom_error());
        assert!(outer.append_child(&doc.root()).unwrap_err().is_dom_error());
        assert!(text.set_attribute("href", "/").is_err());
    }

    #[test]
    fn test_cross_document_rejected() {
        let a = document();
        let b = document();
        let err = a.root().append_child(&b.create_element("p")).unwrap_err();
        assert!(matches!(err, Error::NodeNotFound { .. }));
    }

    #[test]
    fn test_remove_child_requires_parent() {
        let doc = document();
        let stray = doc.create_element("p");
        assert!(doc.root().remove_child(&stray).is_err());
        assert!(stray.remove().is_ok());
    }

    #[test]
    fn test_detached_subtree_survives() {
        let doc = document();
        let section = doc.create_element("section");
        let link = doc.create_anchor("https://other.org/");
        doc.root().append_child(&section).expect("append");
        section.append_child(&link).expect("append");

        section.remove().expect("remove");
        assert!(!section.is_connected());
        assert!(section.contains(&link));
        assert_eq!(section.anchors(), vec![link]);
    }

    #[test]
    fn test_churn_frees_detached_nodes() {
        let doc = document();
        let root = doc.root();

        for i in 0..1_000 {
            let link = doc.create_anchor(&format!("https://other.org/{i}"));
            root.append_child(&link).expect("append");
            link.remove().expect("remove");
        }
        drop(doc.create_element("div"));

        assert_eq!(doc.node_count(), 1);
    }

    #[test]
    fn test_subtree_kept_while_any_handle_remains() {
        let doc = document();
        let section = doc.create_element("section");
        let link = doc.create_anchor("https://other.org/");
        section.append_child(&link).expect("append");
        doc.root().append_child(&section).expect("append");
        assert_eq!(doc.node_count(), 3);

        section.remove().expect("remove");
        drop(section);
        assert_eq!(doc.node_count(), 3);
        assert_eq!(link.parent().and_then(|p| p.tag_name()).as_deref(), Some("section"));

        drop(link);
        assert_eq!(doc.node_count(), 1);
    }

    #[test]
    fn test_queued_records_keep_removed_nodes() {
        let doc = document();
        let root = doc.root();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        doc.observe(&root, MutationObserverInit::links(), move |records| {
            for record in records {
                if let MutationRecord::ChildList { removed_nodes, .. } = record {
                    sink.lock().extend(removed_nodes.iter().map(Node::is_anchor));
                }
            }
        });

        let link = doc.create_anchor("https://other.org/");
        root.append_child(&link).expect("append");
        link.remove().expect("remove");
        drop(link);
        assert_eq!(doc.node_count(), 2);

        doc.flush_mutations();
        assert_eq!(*seen.lock(), vec![true]);
        assert_eq!(doc.node_count(), 1);
    }

    #[test]
    fn test_disconnect_releases_queued_nodes() {
        let doc = document();
        let root = doc.root();
        let (id, _) = recorder(&doc, &root, MutationObserverInit::links());

        let link = doc.create_anchor("/a");
        root.append_child(&link).expect("append");
        link.remove().expect("remove");
        drop(link);

        assert!(doc.disconnect(id));
        assert_eq!(doc.node_count(), 1);
    }

    #[test]
    fn test_observer_batches_child_list_and_attributes() {
        let doc = document();
        let root = doc.root();
        let (_, batches) = recorder(&doc, &root, MutationObserverInit::links());

        let div = doc.create_element("div");
        let link = doc.create_anchor("/a");
        root.append_child(&div).expect("append");
        div.append_child(&link).expect("append");
        link.set_attribute("href", "https://other.org/").expect("set");
        link.set_attribute("class", "ignored").expect("set");

        assert!(batches.lock().is_empty());
        assert_eq!(doc.flush_mutations(), 1);

        let batches = batches.lock();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.len(), 3);
        assert!(matches!(
            &batch[0],
            MutationRecord::ChildList { added_nodes, .. } if added_nodes == &vec![div.clone()]
        ));
        assert!(matches!(&batch[1], MutationRecord::ChildList { target, .. } if target == &div));
        match &batch[2] {
            MutationRecord::Attributes {
                target,
                attribute_name,
                old_value,
            } => {
                assert_eq!(target, &link);
                assert_eq!(attribute_name, "href");
                assert_eq!(old_value.as_deref(), Some("/a"));
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_observer_without_subtree_sees_direct_children_only() {
        let doc = document();
        let root = doc.root();
        let div = doc.create_element("div");
        root.append_child(&div).expect("append");

        let init = MutationObserverInit {
            child_list: true,
            ..Default::default()
        };
        let (_, batches) = recorder(&doc, &root, init);

        div.append_child(&doc.create_element("p")).expect("append");
        root.append_child(&doc.create_element("p")).expect("append");
        doc.flush_mutations();

        assert_eq!(batches.lock()[0].len(), 1);
    }

    #[test]
    fn test_move_records_removal_then_insertion() {
        let doc = document();
        let root = doc.root();
        let left = doc.create_element("div");
        let right = doc.create_element("div");
        let link = doc.create_anchor("/a");
        root.append_child(&left).expect("append");
        root.append_child(&right).expect("append");
        left.append_child(&link).expect("append");

        let (_, batches) = recorder(&doc, &root, MutationObserverInit::links());
        right.append_child(&link).expect("move");
        doc.flush_mutations();

        let batches = batches.lock();
        let batch = &batches[0];
        assert!(matches!(
            &batch[0],
            MutationRecord::ChildList { target, removed_nodes, .. }
                if target == &left && removed_nodes.len() == 1
        ));
        assert!(matches!(
            &batch[1],
            MutationRecord::ChildList { target, added_nodes, .. }
                if target == &right && added_nodes.len() == 1
        ));
    }

    #[test]
    fn test_disconnect_drops_queue() {
        let doc = document();
        let root = doc.root();
        let (id, batches) = recorder(&doc, &root, MutationObserverInit::links());

        root.append_child(&doc.create_element("p")).expect("append");
        assert!(doc.disconnect(id));
        assert!(!doc.disconnect(id));
        assert_eq!(doc.flush_mutations(), 0);
        assert!(batches.lock().is_empty());
        assert_eq!(doc.observer_count(), 0);
    }

    #[test]
    fn test_click_bubbles_and_prevents() {
        let doc = document();
        let link = doc.create_anchor("https://other.org/");
        let span = doc.create_element("span");
        doc.root().append_child(&link).expect("append");
        link.append_child(&span).expect("append");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = link.add_click_listener(move |event| {
            sink.lock().push((event.target().id(), event.current_target().id()));
            event.prevent_default();
        });

        assert!(doc.dispatch_click(&span));
        assert_eq!(*seen.lock(), vec![(span.id(), link.id())]);

        assert!(link.remove_click_listener(id));
        assert!(!link.remove_click_listener(id));
        assert!(!doc.dispatch_click(&span));
        assert_eq!(link.click_listener_count(), 0);
    }
}
