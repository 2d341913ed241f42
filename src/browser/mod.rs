//! Host environment module.
//!
//! The page-side surface the tracker reads and patches:
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Window`] | Host window (location, referrer, viewport, listeners) |
//! | [`Document`] | Live node tree with mutation observation |
//! | [`Node`] | Handle to a document node |
//! | [`History`] | Session history with a replaceable `pushState` |
//! | [`Storage`] | `localStorage`-like key/value store |
//! | [`Scheduler`] | `setTimeout`-like deferred work |
//!
//! # Example
//!
//! ```ignore
//! use plausible_tracker::browser::{Window, WindowEvent};
//!
//! let window = Window::new("https://example.com/")?;
//! window.add_event_listener(WindowEvent::HashChange, |_| println!("hash changed"));
//! window.set_hash("#pricing")?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Document tree and mutation observation.
pub mod dom;

/// Session history.
pub mod history;

/// Page location and loopback detection.
pub mod location;

/// Persistent key/value storage.
pub mod storage;

/// Deferred tasks.
pub mod timer;

/// Host window.
pub mod window;

// ============================================================================
// Re-exports
// ============================================================================

pub use dom::{
    AnchorLike, ClickEvent, ClickListener, Document, DomHost, HostClickListener,
    HostMutationCallback, LinkClick, MutationCallback, MutationObserverInit, MutationRecord, Node,
    NodeKind,
};
pub use history::{History, HistoryEntry, PushStateArgs, PushStateFn};
pub use location::{Location, is_loopback_host};
pub use storage::{MemoryStorage, Storage, UnavailableStorage};
pub use timer::{ManualScheduler, Scheduler, Task, TimerHandle, TokioScheduler};
pub use window::{DEFAULT_INNER_WIDTH, Window, WindowBuilder, WindowEvent, WindowListener};
