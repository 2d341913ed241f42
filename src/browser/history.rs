//! Session history.
//!
//! `pushState` lives in a replaceable slot so callers can wrap it the way
//! page scripts patch `history.pushState`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Result;

use super::location::Location;

// ============================================================================
// Types
// ============================================================================

/// Arguments of a `pushState` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PushStateArgs {
    /// State object stored with the entry.
    pub state: Value,
    /// Title, ignored by browsers.
    pub title: String,
    /// New URL, resolved against the current location. `None` keeps it.
    pub url: Option<String>,
}

/// Implementation behind [`History::push_state`].
pub type PushStateFn = Arc<dyn Fn(PushStateArgs) -> Result<()> + Send + Sync>;

/// A session history entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Entry URL.
    pub url: Url,
    /// State object.
    pub state: Value,
}

/// Result of moving through history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Traversal {
    pub from: Url,
    pub to: Url,
}

struct Entries {
    stack: Vec<HistoryEntry>,
    index: usize,
}

struct HistoryInner {
    location: Arc<RwLock<Location>>,
    entries: Mutex<Entries>,
    push_state: RwLock<Option<PushStateFn>>,
}

// ============================================================================
// History
// ============================================================================

/// Session history of a window.
///
/// Clones share the same history.
#[derive(Clone)]
pub struct History {
    inner: Arc<HistoryInner>,
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.inner.entries.lock();
        f.debug_struct("History")
            .field("length", &entries.stack.len())
            .field("index", &entries.index)
            .finish_non_exhaustive()
    }
}

impl History {
    pub(crate) fn new(location: Arc<RwLock<Location>>) -> Self {
        let initial = HistoryEntry {
            url: location.read().as_url().clone(),
            state: Value::Null,
        };
        let history = Self {
            inner: Arc::new(HistoryInner {
                location,
                entries: Mutex::new(Entries {
                    stack: vec![initial],
                    index: 0,
                }),
                push_state: RwLock::new(None),
            }),
        };
        let native = history.native_push_state();
        *history.inner.push_state.write() = Some(native);
        history
    }

    /// Calls the current `pushState` implementation.
    ///
    /// # Errors
    ///
    /// Returns whatever the installed implementation returns; the native one
    /// fails with [`Error::InvalidUrl`](crate::Error::InvalidUrl) for an unresolvable URL.
    pub fn push_state(&self, state: Value, title: &str, url: Option<&str>) -> Result<()> {
        let push = self.push_state_fn();
        push(PushStateArgs {
            state,
            title: title.to_string(),
            url: url.map(str::to_string),
        })
    }

    /// Returns the installed `pushState` implementation.
    #[must_use]
    pub fn push_state_fn(&self) -> PushStateFn {
        match self.inner.push_state.read().as_ref() {
            Some(push) => Arc::clone(push),
            None => self.native_push_state(),
        }
    }

    /// Installs a `pushState` implementation.
    pub fn set_push_state_fn(&self, push: PushStateFn) {
        *self.inner.push_state.write() = Some(push);
    }

    /// Returns the built-in `pushState`.
    ///
    /// It holds the history weakly, so storing it in the slot does not leak.
    #[must_use]
    pub fn native_push_state(&self) -> PushStateFn {
        let weak: Weak<HistoryInner> = Arc::downgrade(&self.inner);
        Arc::new(move |args: PushStateArgs| -> Result<()> {
            let Some(inner) = weak.upgrade() else {
                return Ok(());
            };
            let history = History { inner };
            let url = match args.url.as_deref() {
                Some(reference) => history.inner.location.read().resolve(reference)?,
                None => history.inner.location.read().as_url().clone(),
            };
            debug!(url = %url, "pushState");
            history.push_entry(url, args.state);
            Ok(())
        })
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().stack.len()
    }

    /// Always `false`; history starts with the initial entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().stack.is_empty()
    }

    /// Returns the state of the current entry.
    #[must_use]
    pub fn state(&self) -> Value {
        let entries = self.inner.entries.lock();
        entries
            .stack
            .get(entries.index)
            .map(|e| e.state.clone())
            .unwrap_or(Value::Null)
    }

    /// Returns every entry, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.inner.entries.lock().stack.clone()
    }

    /// Appends an entry after the current one and makes it current.
    ///
    /// Forward entries are discarded.
    pub(crate) fn push_entry(&self, url: Url, state: Value) {
        {
            let mut entries = self.inner.entries.lock();
            let keep = entries.index + 1;
            entries.stack.truncate(keep);
            entries.stack.push(HistoryEntry {
                url: url.clone(),
                state,
            });
            entries.index = keep;
        }
        *self.inner.location.write() = Location::from_url(url);
    }

    /// Moves `delta` entries, updating the location.
    ///
    /// Returns `None` when the move would leave the stack.
    pub(crate) fn traverse(&self, delta: isize) -> Option<Traversal> {
        let (from, to) = {
            let mut entries = self.inner.entries.lock();
            let target = entries.index.checked_add_signed(delta)?;
            if target >= entries.stack.len() {
                return None;
            }
            let from = entries.stack[entries.index].url.clone();
            entries.index = target;
            (from, entries.stack[target].url.clone())
        };
        *self.inner.location.write() = Location::from_url(to.clone());
        Some(Traversal { from, to })
    }
}

/// Returns `true` if `a` and `b` differ only in their fragment.
pub(crate) fn fragment_only_change(a: &Url, b: &Url) -> bool {
    if a.fragment() == b.fragment() {
        return false;
    }
    let mut a = a.clone();
    let mut b = b.clone();
    a.set_fragment(None);
    b.set_fragment(None);
    a == b
}

// ============================================================================
// Tests
// ============================================================================
