//! Transport layer.
//!
//! This module is the minimal send interface between the event composer and
//! the network. A transport performs exactly one attempt per request and
//! never retries.
//!
//! # Delivery Modes
//!
//! | Mode | Behaviour |
//! |------|-----------|
//! | [`Delivery::Beacon`] | One-way, non-blocking, completion not observable |
//! | [`Delivery::Request`] | POST whose completion handler receives the status code |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `http` | reqwest-backed transport on the tokio runtime |
//! | `recording` | In-memory transport that captures requests |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// HTTP transport.
pub mod http;

/// Recording transport.
pub mod recording;

// ============================================================================
// Types
// ============================================================================

/// Receives the HTTP status of a blocking send, `0` on network failure.
pub type CompletionHandler = Box<dyn FnOnce(u16) + Send>;

/// How a request leaves the page.
pub enum Delivery {
    /// Best-effort one-way send that survives page unload.
    Beacon,

    /// Blocking request with an optional completion handler.
    Request {
        /// Called exactly once when the request reaches a terminal state.
        on_complete: Option<CompletionHandler>,
    },
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Beacon => f.write_str("Beacon"),
            Self::Request { on_complete } => f
                .debug_struct("Request")
                .field("on_complete", &on_complete.is_some())
                .finish(),
        }
    }
}

// ============================================================================
// OutgoingRequest
// ============================================================================

/// A serialized event ready to be sent.
#[derive(Debug)]
pub struct OutgoingRequest {
    /// Absolute endpoint URL (`{apiHost}/api/event`).
    pub endpoint: String,

    /// Value of the `Content-Type` header.
    pub content_type: &'static str,

    /// Serialized payload.
    pub body: String,

    /// Delivery mode.
    pub delivery: Delivery,
}

impl OutgoingRequest {
    /// Returns `true` for beacon delivery.
    #[inline]
    #[must_use]
    pub fn is_durable(&self) -> bool {
        matches!(self.delivery, Delivery::Beacon)
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Performs a single fire-and-forget network send.
///
/// Implementations must not block the caller. For [`Delivery::Request`]
/// they must invoke the completion handler exactly once, including on
/// network failure (with status `0`). An `Err` return means the request
/// was rejected before leaving the page.
pub trait Transport: Send + Sync {
    /// Sends one request.
    fn send(&self, request: OutgoingRequest) -> Result<()>;
}

// ============================================================================
// Re-exports
// ============================================================================

pub use http::HttpTransport;
pub use recording::{RecordedRequest, RecordingTransport};

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_durable() {
        let beacon = OutgoingRequest {
            endpoint: "https://plausible.io/api/event".into(),
            content_type: "text/plain",
            body: "{}".into(),
            delivery: Delivery::Beacon,
        };
        assert!(beacon.is_durable());

        let blocking = OutgoingRequest {
            delivery: Delivery::Request { on_complete: None },
            ..beacon
        };

        assert!(!blocking.is_durable());
    }

    #[test]
    fn test_delivery_debug() {
        let delivery = Delivery::Request {
            on_complete: Some(Box::new(|_| {})),
        };
        assert_eq!(format!("{delivery:?}"), "Request { on_complete: true }");
        assert_eq!(format!("{:?}", Delivery::Beacon), "Beacon");
    }
}
