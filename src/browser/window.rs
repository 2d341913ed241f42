//! The host window.
//!
//! Each [`Window`] owns:
//! - The current [`Location`], shared with its history and document
//! - A [`Document`] tree
//! - Optional session [`History`]
//! - `localStorage`-like [`Storage`]
//! - A [`Scheduler`] for deferred work, when a timer source exists
//!
//! # Example
//!
//! ```ignore
//! use plausible_tracker::browser::Window;
//!
//! let window = Window::builder()
//!     .url("https://example.com/")
//!     .referrer("https://search.example/")
//!     .inner_width(1280)
//!     .build()?;
//!
//! window.history().expect("history").push_state(Value::Null, "", Some("/next"))?;
//! window.set_hash("#pricing")?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::ListenerId;

use super::dom::{Document, Node};
use super::history::{History, fragment_only_change};
use super::location::Location;
use super::storage::{MemoryStorage, Storage};
use super::timer::{Scheduler, TokioScheduler};

// ============================================================================
// Constants
// ============================================================================

/// Viewport width when none is configured.
pub const DEFAULT_INNER_WIDTH: u32 = 1024;

// ============================================================================
// Types
// ============================================================================

/// Window-level events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowEvent {
    /// Session history traversal.
    PopState,
    /// The fragment of the location changed.
    HashChange,
}

/// Window event listener.
pub type WindowListener = Arc<dyn Fn(WindowEvent) + Send + Sync>;

/// Internal shared state for a window.
struct WindowInner {
    location: Arc<RwLock<Location>>,
    referrer: Option<String>,
    inner_width: AtomicU32,
    storage: Arc<dyn Storage>,
    history: Option<History>,
    document: Document,
    scheduler: Option<Arc<dyn Scheduler>>,
    interactive: bool,
    listeners: Mutex<Vec<(ListenerId, WindowEvent, WindowListener)>>,
}

// ============================================================================
// Window
// ============================================================================

/// A handle to the host window.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct Window {
    inner: Arc<WindowInner>,
}

// ============================================================================
// Window - Display
// ============================================================================

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("location", &self.inner.location.read().href())
            .field("has_history", &self.inner.history.is_some())
            .field("has_scheduler", &self.inner.scheduler.is_some())
            .field("interactive", &self.inner.interactive)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Window - Constructor
// ============================================================================

impl Window {
    /// Creates a window builder.
    #[inline]
    #[must_use]
    pub fn builder() -> WindowBuilder {
        WindowBuilder::new()
    }

    /// Creates a window at `href` with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `href` is not absolute.
    pub fn new(href: &str) -> Result<Self> {
        Self::builder().url(href).build()
    }
}

// ============================================================================
// Window - Accessors
// ============================================================================

impl Window {
    /// Returns the current location.
    #[must_use]
    pub fn location(&self) -> Location {
        self.inner.location.read().clone()
    }

    /// Returns the referrer, `None` when the page was opened directly.
    #[inline]
    #[must_use]
    pub fn referrer(&self) -> Option<&str> {
        self.inner.referrer.as_deref()
    }

    /// Returns the viewport width in CSS pixels.
    #[inline]
    #[must_use]
    pub fn inner_width(&self) -> u32 {
        self.inner.inner_width.load(Ordering::Relaxed)
    }

    /// Updates the viewport width.
    pub fn set_inner_width(&self, width: u32) {
        self.inner.inner_width.store(width, Ordering::Relaxed);
    }

    /// Returns `localStorage`.
    #[inline]
    #[must_use]
    pub fn local_storage(&self) -> &dyn Storage {
        self.inner.storage.as_ref()
    }

    /// Returns session history, `None` when the host has none.
    #[inline]
    #[must_use]
    pub fn history(&self) -> Option<&History> {
        self.inner.history.as_ref()
    }

    /// Returns the document.
    #[inline]
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    /// Returns the timer scheduler, `None` when the window has no timer
    /// source.
    #[inline]
    #[must_use]
    pub fn scheduler(&self) -> Option<&Arc<dyn Scheduler>> {
        self.inner.scheduler.as_ref()
    }

    /// Returns `false` for headless hosts where navigation is not performed
    /// on behalf of the page.
    #[inline]
    #[must_use]
    pub fn is_interactive(&self) -> bool {
        self.inner.interactive
    }
}

// ============================================================================
// Window - Events
// ============================================================================

impl Window {
    /// Registers a window event listener.
    pub fn add_event_listener<F>(&self, event: WindowEvent, listener: F) -> ListenerId
    where
        F: Fn(WindowEvent) + Send + Sync + 'static,
    {
        let id = ListenerId::generate();
        self.inner
            .listeners
            .lock()
            .push((id, event, Arc::new(listener)));
        id
    }

    /// Removes a window event listener.
    ///
    /// Returns `false` if it was not registered.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(l, _, _)| *l != id);
        before != listeners.len()
    }

    /// Returns the number of listeners for `event`.
    #[must_use]
    pub fn listener_count(&self, event: WindowEvent) -> usize {
        self.inner
            .listeners
            .lock()
            .iter()
            .filter(|(_, e, _)| *e == event)
            .count()
    }

    /// Fires `event` on every matching listener in registration order.
    pub fn dispatch_event(&self, event: WindowEvent) {
        let listeners: Vec<WindowListener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .filter(|(_, e, _)| *e == event)
            .map(|(_, _, l)| Arc::clone(l))
            .collect();

        debug!(?event, listeners = listeners.len(), "Dispatching window event");
        for listener in listeners {
            listener(event);
        }
    }
}

// ============================================================================
// Window - Navigation
// ============================================================================

impl Window {
    /// Navigates to `href`, resolved against the current location.
    ///
    /// A change of fragment only behaves like [`set_hash`](Self::set_hash).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `href` cannot be resolved.
    pub fn navigate(&self, href: &str) -> Result<()> {
        let (from, to) = {
            let location = self.inner.location.read();
            (location.as_url().clone(), location.resolve(href)?)
        };
        debug!(url = %to, "Navigating");

        let hash_changed = fragment_only_change(&from, &to);
        self.commit(to);
        if hash_changed {
            self.dispatch_event(WindowEvent::HashChange);
        }
        Ok(())
    }

    /// Sets the fragment, firing `hashchange` if it changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the result cannot be parsed.
    pub fn set_hash(&self, hash: &str) -> Result<()> {
        let fragment = hash.strip_prefix('#').unwrap_or(hash);
        let (from, to) = {
            let location = self.inner.location.read();
            let mut to = location.as_url().clone();
            to.set_fragment(Some(fragment));
            (location.as_url().clone(), to)
        };
        if from == to {
            return Ok(());
        }

        debug!(hash = %fragment, "Setting hash");
        self.commit(to);
        self.dispatch_event(WindowEvent::HashChange);
        Ok(())
    }

    /// Moves back one history entry. Returns `false` if there is none.
    pub fn back(&self) -> bool {
        self.traverse(-1)
    }

    /// Moves forward one history entry. Returns `false` if there is none.
    pub fn forward(&self) -> bool {
        self.traverse(1)
    }

    /// Clicks `node`, following the nearest enclosing link unless a
    /// listener prevented the default action.
    ///
    /// Returns `true` if the default was prevented.
    pub fn click(&self, node: &Node) -> bool {
        if self.inner.document.dispatch_click(node) {
            return true;
        }

        let mut current = Some(node.clone());
        while let Some(candidate) = current {
            if candidate.is_anchor() && candidate.get_attribute("href").is_some() {
                let href = candidate.href();
                if let Err(e) = self.navigate(&href) {
                    warn!(error = %e, href = %href, "Failed to follow link");
                }
                break;
            }
            current = candidate.parent();
        }
        false
    }

    fn traverse(&self, delta: isize) -> bool {
        let Some(history) = self.inner.history.as_ref() else {
            return false;
        };
        let Some(traversal) = history.traverse(delta) else {
            return false;
        };

        debug!(from = %traversal.from, to = %traversal.to, "History traversal");
        self.dispatch_event(WindowEvent::PopState);
        if fragment_only_change(&traversal.from, &traversal.to) {
            self.dispatch_event(WindowEvent::HashChange);
        }
        true
    }

    fn commit(&self, url: url::Url) {
        match self.inner.history.as_ref() {
            Some(history) => history.push_entry(url, Value::Null),
            None => *self.inner.location.write() = Location::from_url(url),
        }
    }
}

// ============================================================================
// WindowBuilder
// ============================================================================

/// Builder for host windows.
///
/// # Example
///
/// ```ignore
/// let scheduler = Arc::new(ManualScheduler::new());
/// let window = Window::builder()
///     .url("https://example.com/")
///     .scheduler(scheduler.clone())
///     .without_history()
///     .build()?;
/// ```
pub struct WindowBuilder {
    url: Option<String>,
    referrer: Option<String>,
    inner_width: u32,
    storage: Option<Arc<dyn Storage>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    history: bool,
    interactive: bool,
}

impl fmt::Debug for WindowBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowBuilder")
            .field("url", &self.url)
            .field("referrer", &self.referrer)
            .field("inner_width", &self.inner_width)
            .field("history", &self.history)
            .field("interactive", &self.interactive)
            .finish_non_exhaustive()
    }
}

impl Default for WindowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// WindowBuilder - Implementation
// ============================================================================

impl WindowBuilder {
    /// Creates a new window builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            url: None,
            referrer: None,
            inner_width: DEFAULT_INNER_WIDTH,
            storage: None,
            scheduler: None,
            history: true,
            interactive: true,
        }
    }

    /// Sets the page URL. Required.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets `document.referrer`. An empty string means no referrer.
    #[must_use]
    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Sets the viewport width.
    #[must_use]
    pub fn inner_width(mut self, width: u32) -> Self {
        self.inner_width = width;
        self
    }

    /// Uses custom storage. Defaults to [`MemoryStorage`].
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Uses a custom scheduler.
    ///
    /// Defaults to a [`TokioScheduler`] on the current runtime. Built
    /// outside a runtime, the window has no scheduler and deferred work is
    /// not scheduled at all.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Builds a window without session history.
    #[must_use]
    pub fn without_history(mut self) -> Self {
        self.history = false;
        self
    }

    /// Marks the host as non-interactive.
    #[must_use]
    pub fn non_interactive(mut self) -> Self {
        self.interactive = false;
        self
    }

    /// Builds the window.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no URL was set
    /// - [`Error::InvalidUrl`] if the URL is not absolute
    pub fn build(self) -> Result<Window> {
        let href = self
            .url
            .ok_or_else(|| Error::config("Window URL is required. Use .url()"))?;
        let location = Arc::new(RwLock::new(Location::parse(&href)?));

        let history = self.history.then(|| History::new(Arc::clone(&location)));
        let document = Document::with_location(Arc::clone(&location));
        let scheduler = self.scheduler.or_else(|| {
            TokioScheduler::new()
                .ok()
                .map(|scheduler| Arc::new(scheduler) as Arc<dyn Scheduler>)
        });

        debug!(
            url = %href,
            history = history.is_some(),
            scheduler = scheduler.is_some(),
            "Window created"
        );

        Ok(Window {
            inner: Arc::new(WindowInner {
                location,
                referrer: self.referrer.filter(|r| !r.is_empty()),
                inner_width: AtomicU32::new(self.inner_width),
                storage: self
                    .storage
                    .unwrap_or_else(|| Arc::new(MemoryStorage::new())),
                history,
                document,
                scheduler,
                interactive: self.interactive,
                listeners: Mutex::new(Vec::new()),
            }),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    fn counting(window: &Window, event: WindowEvent) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        window.add_event_listener(event, move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn test_window_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<Window>();
    }

    #[test]
    fn test_window_is_debug() {
        fn assert_debug<T: std::fmt::Debug>() {}
        assert_debug::<Window>();
    }

    #[test]
    fn test_build_requires_url() {
        let err = Window::builder().build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(Window::new("not a url").is_err());
    }

    #[test]
    fn test_defaults() {
        let window = Window::builder()
            .url("https://example.com/")
            .referrer("")
            .build()
            .expect("window");

        assert_eq!(window.referrer(), None);
        assert_eq!(window.inner_width(), DEFAULT_INNER_WIDTH);
        assert!(window.history().is_some());
        assert!(window.is_interactive());
        assert!(window.scheduler().is_none());
    }

    #[tokio::test]
    async fn test_default_scheduler_in_runtime() {
        let window = Window::new("https://example.com/").expect("window");
        assert!(window.scheduler().is_some());
    }

    #[test]
    fn test_set_hash_fires_hashchange_only() {
        let window = Window::new("https://example.com/docs").expect("window");
        let hash = counting(&window, WindowEvent::HashChange);
        let pop = counting(&window, WindowEvent::PopState);

        window.set_hash("#install").expect("hash");
        window.set_hash("install").expect("same hash");

        assert_eq!(window.location().href(), "https://example.com/docs#install");
        assert_eq!(hash.load(Ordering::SeqCst), 1);
        assert_eq!(pop.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_back_fires_popstate_and_hashchange() {
        let window = Window::new("https://example.com/docs").expect("window");
        window.set_hash("#a").expect("hash");
        let hash = counting(&window, WindowEvent::HashChange);
        let pop = counting(&window, WindowEvent::PopState);

        assert!(window.back());
        assert_eq!(window.location().href(), "https://example.com/docs");
        assert_eq!(pop.load(Ordering::SeqCst), 1);
        assert_eq!(hash.load(Ordering::SeqCst), 1);

        assert!(!window.back());
        assert!(window.forward());
        assert_eq!(pop.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_back_across_documents_fires_popstate_only() {
        let window = Window::new("https://example.com/a").expect("window");
        window
            .history()
            .expect("history")
            .push_state(Value::Null, "", Some("/b"))
            .expect("push");
        let hash = counting(&window, WindowEvent::HashChange);

        assert!(window.back());
        assert_eq!(hash.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_without_history() {
        let window = Window::builder()
            .url("https://example.com/")
            .without_history()
            .build()
            .expect("window");

        assert!(window.history().is_none());
        assert!(!window.back());
        window.navigate("/next").expect("navigate");
        assert_eq!(window.location().href(), "https://example.com/next");
    }

    #[test]
    fn test_remove_event_listener() {
        let window = Window::new("https://example.com/").expect("window");
        let id = window.add_event_listener(WindowEvent::PopState, |_| {});

        assert_eq!(window.listener_count(WindowEvent::PopState), 1);
        assert!(window.remove_event_listener(id));
        assert!(!window.remove_event_listener(id));
        assert_eq!(window.listener_count(WindowEvent::PopState), 0);
    }

    #[test]
    fn test_click_follows_link() {
        let window = Window::new("https://example.com/").expect("window");
        let document = window.document();
        let link = document.create_anchor("/pricing");
        let label = document.create_text("Pricing");
        document.root().append_child(&link).expect("append");
        link.append_child(&label).expect("append");

        assert!(!window.click(&label));
        assert_eq!(window.location().href(), "https://example.com/pricing");
    }

    #[test]
    fn test_click_prevented_stays() {
        let window = Window::new("https://example.com/").expect("window");
        let link = window.document().create_anchor("https://other.org/");
        window.document().root().append_child(&link).expect("append");
        link.add_click_listener(|event| event.prevent_default());

        assert!(window.click(&link));
        assert_eq!(window.location().href(), "https://example.com/");
    }

    #[test]
    fn test_document_shares_location() {
        let window = Window::new("https://example.com/a/").expect("window");
        let link = window.document().create_anchor("b");
        assert_eq!(link.href(), "https://example.com/a/b");

        window.navigate("https://example.com/c/").expect("navigate");
        assert_eq!(link.href(), "https://example.com/c/b");
    }
}
