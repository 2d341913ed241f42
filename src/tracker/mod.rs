//! Tracker engine.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Tracker`] | Factory result exposing the four tracking operations |
//! | [`TrackerBuilder`] | Validated configuration of a tracker |
//! | [`PageviewWatcher`] | Automatic pageviews on history navigation |
//! | [`OutboundLinkWatcher`] | Automatic outbound link click events |
//!
//! # Example
//!
//! ```ignore
//! use plausible_tracker::{EventOptions, Tracker};
//!
//! let tracker = Tracker::builder(window)
//!     .domain("example.com")
//!     .hash_mode(true)
//!     .build()?;
//!
//! let pageviews = tracker.enable_auto_pageviews();
//! let outbound = tracker.enable_auto_outbound_tracking(None, None);
//! tracker.track_event(
//!     "Signup",
//!     EventOptions::new().prop("plan", "pro"),
//!     Default::default(),
//!     false,
//! );
//!
//! pageviews.stop();
//! outbound.stop();
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Event data and configuration resolution.
pub mod config;

/// Process-wide tracker handle.
pub mod global;

/// Outbound link tracking.
pub mod outbound;

/// Automatic pageviews.
pub mod pageviews;

/// Event composer.
pub mod request;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::browser::{DomHost, MutationObserverInit, Node, Window};
use crate::error::{Error, Result};
use crate::protocol::EventOptions;
use crate::transport::{HttpTransport, Transport};

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{DEFAULT_API_HOST, EventData, TrackerConfig};
pub use outbound::{NAVIGATION_DELAY, OUTBOUND_LINK_CLICK, OutboundLinkWatcher, TrackedAnchors};
pub use pageviews::PageviewWatcher;
pub use request::{OPT_OUT_KEY, SendOutcome};

/// Event name of pageviews.
pub const PAGEVIEW: &str = "pageview";

// ============================================================================
// Tracker
// ============================================================================

struct TrackerInner {
    window: Window,
    defaults: EventData,
    transport: Arc<dyn Transport>,
}

/// An analytics tracker bound to one window.
///
/// Clones share the same configuration and transport.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("window", &self.inner.window)
            .field("defaults", &self.inner.defaults)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tracker - Constructor
// ============================================================================

impl Tracker {
    /// Creates a tracker builder for `window`.
    #[inline]
    #[must_use]
    pub fn builder(window: Window) -> TrackerBuilder {
        TrackerBuilder::new(window)
    }

    /// Creates a tracker and installs it as the global handle.
    ///
    /// `defaults` sit between the built-ins and per-call data. A default
    /// API host is checked the same way [`TrackerBuilder::build`] checks it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API host is not an absolute http(s)
    /// URL.
    pub fn new(
        window: Window,
        mut defaults: EventData,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        if let Some(api_host) = defaults.api_host.take() {
            defaults.api_host = Some(validate_api_host(&api_host)?);
        }

        let tracker = Self {
            inner: Arc::new(TrackerInner {
                window,
                defaults,
                transport,
            }),
        };
        global::install(&tracker);
        Ok(tracker)
    }
}

// ============================================================================
// Tracker - Accessors
// ============================================================================

impl Tracker {
    /// Returns the window.
    #[inline]
    #[must_use]
    pub fn window(&self) -> &Window {
        &self.inner.window
    }

    /// Returns the factory defaults.
    #[inline]
    #[must_use]
    pub fn defaults(&self) -> &EventData {
        &self.inner.defaults
    }

    /// Returns the configuration the next send without overrides would use.
    #[must_use]
    pub fn config(&self) -> TrackerConfig {
        TrackerConfig::resolve(&self.inner.window, &self.inner.defaults, &EventData::new())
    }
}

// ============================================================================
// Tracker - Operations
// ============================================================================

impl Tracker {
    /// Sends a custom event.
    ///
    /// `data` overrides the defaults for this call only. `durable` sends a
    /// beacon instead of a blocking request.
    pub fn track_event(
        &self,
        name: &str,
        options: EventOptions,
        data: EventData,
        durable: bool,
    ) -> SendOutcome {
        let config = TrackerConfig::resolve(&self.inner.window, &self.inner.defaults, &data);
        request::send_event(
            &self.inner.window,
            self.inner.transport.as_ref(),
            name,
            &config,
            &options,
            durable,
        )
    }

    /// Sends a pageview.
    pub fn track_pageview(&self, data: EventData, options: EventOptions) -> SendOutcome {
        self.track_event(PAGEVIEW, options, data, false)
    }

    /// Sends a pageview now and after every navigation until stopped.
    pub fn enable_auto_pageviews(&self) -> PageviewWatcher {
        PageviewWatcher::start(self)
    }

    /// Tracks clicks on outbound links under `root` (the document when
    /// `None`), following the tree as it mutates.
    ///
    /// `init` defaults to [`MutationObserverInit::links`].
    pub fn enable_auto_outbound_tracking(
        &self,
        root: Option<&Node>,
        init: Option<MutationObserverInit>,
    ) -> OutboundLinkWatcher {
        let document = self.inner.window.document().clone();
        let root = root.cloned().unwrap_or_else(|| document.root());
        OutboundLinkWatcher::start(
            self,
            document,
            root,
            init.unwrap_or_else(MutationObserverInit::links),
        )
    }

    /// Tracks clicks on outbound links under `root` of an external DOM.
    ///
    /// Same behavior as
    /// [`enable_auto_outbound_tracking`](Self::enable_auto_outbound_tracking),
    /// with listeners and observers going through `host`.
    pub fn enable_auto_outbound_tracking_on<H: DomHost>(
        &self,
        host: H,
        root: H::Node,
        init: Option<MutationObserverInit>,
    ) -> OutboundLinkWatcher<H> {
        OutboundLinkWatcher::start(
            self,
            host,
            root,
            init.unwrap_or_else(MutationObserverInit::links),
        )
    }
}

// ============================================================================
// TrackerBuilder
// ============================================================================

/// Builder for a [`Tracker`].
///
/// Use [`Tracker::builder()`] to create one.
pub struct TrackerBuilder {
    window: Window,
    defaults: EventData,
    transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for TrackerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerBuilder")
            .field("defaults", &self.defaults)
            .field("transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TrackerBuilder - Implementation
// ============================================================================

impl TrackerBuilder {
    /// Creates a builder with no defaults.
    #[must_use]
    pub fn new(window: Window) -> Self {
        Self {
            window,
            defaults: EventData::new(),
            transport: None,
        }
    }

    /// Sets the site domain.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.defaults.domain = Some(domain.into());
        self
    }

    /// Sets the collection host.
    #[must_use]
    pub fn api_host(mut self, api_host: impl Into<String>) -> Self {
        self.defaults.api_host = Some(api_host.into());
        self
    }

    /// Treats fragment changes as navigations.
    #[must_use]
    pub fn hash_mode(mut self, enabled: bool) -> Self {
        self.defaults.hash_mode = Some(enabled);
        self
    }

    /// Sends events from loopback hosts and `file:` pages.
    #[must_use]
    pub fn track_localhost(mut self, enabled: bool) -> Self {
        self.defaults.track_localhost = Some(enabled);
        self
    }

    /// Adds an arbitrary default key.
    #[must_use]
    pub fn default_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.extra.insert(key.into(), value.into());
        self
    }

    /// Layers a whole [`EventData`] onto the defaults.
    #[must_use]
    pub fn defaults(mut self, defaults: &EventData) -> Self {
        self.defaults = self.defaults.merge(defaults);
        self
    }

    /// Uses a custom transport instead of [`HttpTransport`].
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the tracker with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the API host is not an absolute http(s) URL
    /// - [`Error::Config`] if no transport was set and no tokio runtime is
    ///   running
    pub fn build(self) -> Result<Tracker> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };

        debug!(defaults = ?self.defaults, "Building tracker");
        Tracker::new(self.window, self.defaults, transport)
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validates an API host and strips a trailing slash.
fn validate_api_host(api_host: &str) -> Result<String> {
    let url = Url::parse(api_host).map_err(|e| {
        Error::config(format!(
            "API host must be an absolute URL, got '{api_host}': {e}\n\
             Example: Tracker::builder(window).api_host(\"https://plausible.io\")"
        ))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::config(format!(
            "API host must use http or https, got '{}'",
            url.scheme()
        )));
    }

    Ok(api_host.trim_end_matches('/').to_string())
}

// ============================================================================
// Tests
// ============================================================================
