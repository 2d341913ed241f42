//! Automatic pageview tracking.
//!
//! Starting the watcher wraps `history.pushState`, listens for `popstate`
//! (and `hashchange` in hash mode) and sends one pageview for the current
//! page. Each start wraps the push primitive again; stopping restores the
//! primitive captured by that start only.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::browser::{PushStateArgs, PushStateFn, Window, WindowEvent};
use crate::error::Result;
use crate::identifiers::ListenerId;

use super::Tracker;

// ============================================================================
// PageviewWatcher
// ============================================================================

struct WatcherState {
    original_push_state: Option<PushStateFn>,
    popstate: ListenerId,
    hashchange: Option<ListenerId>,
}

/// Handle returned by [`Tracker::enable_auto_pageviews`].
///
/// Tracking continues until [`stop`](Self::stop) is called, even if the
/// handle is dropped.
#[must_use = "dropping the watcher does not stop it; keep it to call stop()"]
pub struct PageviewWatcher {
    window: Window,
    state: Mutex<Option<WatcherState>>,
}

impl fmt::Debug for PageviewWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageviewWatcher")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl PageviewWatcher {
    pub(crate) fn start(tracker: &Tracker) -> Self {
        let window = tracker.window().clone();
        let hash_mode = tracker.defaults().hash_mode.unwrap_or(false);

        let page: Arc<dyn Fn() + Send + Sync> = {
            let tracker = tracker.clone();
            Arc::new(move || {
                tracker.track_pageview(Default::default(), Default::default());
            })
        };

        let original_push_state = window.history().map(|history| {
            let original = history.push_state_fn();
            let inner = Arc::clone(&original);
            let page = Arc::clone(&page);
            history.set_push_state_fn(Arc::new(move |args: PushStateArgs| -> Result<()> {
                inner(args)?;
                page();
                Ok(())
            }));
            original
        });

        let popstate = {
            let page = Arc::clone(&page);
            window.add_event_listener(WindowEvent::PopState, move |_| page())
        };
        let hashchange = hash_mode.then(|| {
            let page = Arc::clone(&page);
            window.add_event_listener(WindowEvent::HashChange, move |_| page())
        });

        debug!(
            hash_mode,
            wrapped_push_state = original_push_state.is_some(),
            "Auto pageviews enabled"
        );
        page();

        Self {
            window,
            state: Mutex::new(Some(WatcherState {
                original_push_state,
                popstate,
                hashchange,
            })),
        }
    }

    /// Restores `pushState` and removes the listeners. Safe to call twice.
    pub fn stop(&self) {
        let Some(state) = self.state.lock().take() else {
            return;
        };

        if let (Some(original), Some(history)) = (state.original_push_state, self.window.history())
        {
            history.set_push_state_fn(original);
        }
        self.window.remove_event_listener(state.popstate);
        if let Some(id) = state.hashchange {
            self.window.remove_event_listener(id);
        }
        debug!("Auto pageviews disabled");
    }

    /// Returns `true` until [`stop`](Self::stop) is called.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::Value;

    use crate::tracker::EventData;
    use crate::transport::RecordingTransport;

    fn setup(window: &Window, hash_mode: bool) -> (Tracker, RecordingTransport) {
        let transport = RecordingTransport::new();
        let defaults = EventData::new().with_hash_mode(hash_mode);
        let tracker = Tracker::new(window.clone(), defaults, Arc::new(transport.clone()))
            .expect("tracker");
        (tracker, transport)
    }

    fn push(window: &Window, url: &str) {
        window
            .history()
            .expect("history")
            .push_state(Value::Null, "", Some(url))
            .expect("push");
    }

    #[test]
    fn test_initial_pageview() {
        let window = Window::new("https://example.com/").expect("window");
        let (tracker, transport) = setup(&window, false);

        let watcher = tracker.enable_auto_pageviews();
        assert_eq!(transport.len(), 1);
        assert_eq!(transport.requests()[0].payload().expect("payload").name, "pageview");
        watcher.stop();
    }

    #[test]
    fn test_push_state_sends_after_navigation() {
        let window = Window::new("https://example.com/").expect("window");
        let (tracker, transport) = setup(&window, false);
        let watcher = tracker.enable_auto_pageviews();

        push(&window, "/docs");

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].payload().expect("payload").url,
            "https://example.com/docs"
        );
        watcher.stop();
    }

    #[test]
    fn test_popstate_sends() {
        let window = Window::new("https://example.com/").expect("window");
        push(&window, "/next");
        let (tracker, transport) = setup(&window, false);
        let watcher = tracker.enable_auto_pageviews();

        assert!(window.back());
        assert_eq!(transport.len(), 2);
        watcher.stop();
    }

    #[test]
    fn test_hashchange_only_in_hash_mode() {
        let window = Window::new("https://example.com/").expect("window");
        let (tracker, transport) = setup(&window, false);
        let watcher = tracker.enable_auto_pageviews();
        window.set_hash("#a").expect("hash");
        assert_eq!(transport.len(), 1);
        watcher.stop();

        let window = Window::new("https://example.com/").expect("window");
        let (tracker, transport) = setup(&window, true);
        let watcher = tracker.enable_auto_pageviews();
        window.set_hash("#a").expect("hash");
        assert_eq!(transport.len(), 2);
        assert_eq!(transport.requests()[1].payload().expect("payload").hash_mode, 1);
        watcher.stop();
    }

    #[test]
    fn test_stop_restores_and_is_idempotent() {
        let window = Window::new("https://example.com/").expect("window");
        let (tracker, transport) = setup(&window, true);
        let watcher = tracker.enable_auto_pageviews();

        watcher.stop();
        watcher.stop();
        assert!(!watcher.is_active());

        push(&window, "/after");
        window.set_hash("#x").expect("hash");
        assert!(window.back());
        assert_eq!(transport.len(), 1);
        assert_eq!(window.listener_count(WindowEvent::PopState), 0);
        assert_eq!(window.listener_count(WindowEvent::HashChange), 0);
    }

    #[test]
    fn test_without_history_api() {
        let window = Window::builder()
            .url("https://example.com/")
            .without_history()
            .build()
            .expect("window");
        let (tracker, transport) = setup(&window, false);

        let watcher = tracker.enable_auto_pageviews();
        assert_eq!(transport.len(), 1);
        watcher.stop();
        assert_eq!(window.listener_count(WindowEvent::PopState), 0);
    }
}
