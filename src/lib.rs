//! Plausible Tracker - privacy-friendly analytics for embedded web documents.
//!
//! This library observes page navigation and outbound link clicks in a web
//! document and reports them as events to a Plausible collection endpoint,
//! without page reloads and without cookies.
//!
//! # Architecture
//!
//! - **Event composer**: checks suppression rules (local host, opt-out
//!   flag), builds the wire payload and hands it to a [`Transport`]
//! - **Navigation watcher**: wraps `history.pushState` and listens for
//!   `popstate` / `hashchange` to send pageviews
//! - **Outbound link watcher**: keeps one click listener on every
//!   off-site link under a root, following the tree as it mutates
//!
//! The host document ([`Window`], [`Document`], [`History`], storage and
//! timers) is modelled in [`browser`] so an embedder can drive it from a
//! wasm bridge, a headless harness or a test.
//!
//! Tracking calls never fail: suppressed or rejected events are logged
//! through `tracing` and reported as a [`SendOutcome`].
//!
//! # Quick Start
//!
//! ```no_run
//! use plausible_tracker::{EventOptions, Result, Tracker, Window};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let window = Window::builder()
//!         .url("https://example.com/")
//!         .inner_width(1280)
//!         .build()?;
//!
//!     let tracker = Tracker::builder(window)
//!         .domain("example.com")
//!         .build()?;
//!
//!     let pageviews = tracker.enable_auto_pageviews();
//!     tracker.track_event(
//!         "Signup",
//!         EventOptions::new().prop("plan", "pro"),
//!         Default::default(),
//!         false,
//!     );
//!
//!     pageviews.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`browser`] | Host document: [`Window`], [`Document`], [`History`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire payload and per-call options |
//! | [`tracker`] | [`Tracker`] and the two watchers |
//! | [`transport`] | Send interface, HTTP and recording transports |

// ============================================================================
// Modules
// ============================================================================

/// Host document model: Window, Document, History.
///
/// - [`Window`] - Location, referrer, viewport, listeners
/// - [`Document`] - Node tree with mutation observation
/// - [`History`] - Session history with a replaceable `pushState`
pub mod browser;

/// Error types and result aliases.
///
/// Fallible seams return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for document entities.
pub mod identifiers;

/// Event protocol types.
pub mod protocol;

/// Tracker engine.
///
/// Use [`Tracker::builder()`] to create a configured tracker.
pub mod tracker;

/// Transport layer.
///
/// The minimal send interface and its implementations.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Browser types
pub use browser::{
    AnchorLike, ClickEvent, Document, DomHost, History, LinkClick, Location, ManualScheduler,
    MemoryStorage, MutationObserverInit, MutationRecord, Node, Scheduler, Storage, TokioScheduler,
    Window, WindowBuilder, WindowEvent,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ListenerId, NodeId, ObserverId, TimerId};

// Protocol types
pub use protocol::{EventOptions, EventPayload, EventResponse};

// Tracker types
pub use tracker::{
    EventData, OutboundLinkWatcher, PageviewWatcher, SendOutcome, Tracker, TrackerBuilder,
    TrackerConfig,
};

// Transport types
pub use transport::{Delivery, HttpTransport, OutgoingRequest, RecordingTransport, Transport};
