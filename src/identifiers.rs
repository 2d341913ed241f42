//! Type-safe identifiers for document entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Identifies |
//! |------|------------|
//! | [`NodeId`] | A node in a [`Document`](crate::browser::Document) |
//! | [`ListenerId`] | A registered event listener |
//! | [`ObserverId`] | A mutation observer registration |
//! | [`TimerId`] | A scheduled timer |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Macro
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Allocates a fresh, process-unique ID.
            #[must_use]
            pub fn generate() -> Self {
                static NEXT: AtomicU64 = AtomicU64::new(1);
                Self(NEXT.fetch_add(1, Ordering::Relaxed))
            }

            /// Wraps a raw value.
            #[inline]
            #[must_use]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw value.
            #[inline]
            #[must_use]
            pub const fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

// ============================================================================
// Identifiers
// ============================================================================

define_id!(
    /// Identity of a document node. Two handles are the same element iff
    /// their IDs are equal.
    NodeId,
    "node"
);

define_id!(
    /// Handle returned when registering an event listener.
    ListenerId,
    "listener"
);

define_id!(
    /// Handle returned when starting mutation observation.
    ObserverId,
    "observer"
);

define_id!(
    /// Handle of a scheduled timer.
    TimerId,
    "timer"
);

// ============================================================================
// Tests
// ============================================================================
