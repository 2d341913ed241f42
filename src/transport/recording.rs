//! In-memory transport.
//!
//! Captures every request instead of sending it. Blocking sends keep their
//! completion handler until [`RecordingTransport::complete_all`] is called,
//! which mirrors a request finishing on a later turn of the event loop.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::EventPayload;

use super::{CompletionHandler, Delivery, OutgoingRequest, Transport};

// ============================================================================
// RecordedRequest
// ============================================================================

/// A request captured by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Endpoint URL.
    pub endpoint: String,
    /// `Content-Type` header value.
    pub content_type: &'static str,
    /// Serialized body.
    pub body: String,
    /// `true` for beacon delivery.
    pub durable: bool,
}

impl RecordedRequest {
    /// Parses the body back into a payload.
    pub fn payload(&self) -> Result<EventPayload> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Parses the string-encoded `p` field, if present.
    pub fn props(&self) -> Result<Option<Value>> {
        match self.payload()?.props {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

// ============================================================================
// RecordingTransport
// ============================================================================

#[derive(Default)]
struct RecordingState {
    requests: Vec<RecordedRequest>,
    pending: Vec<CompletionHandler>,
    rejecting: bool,
}

/// Transport that records requests in memory.
///
/// Clones share the same recording.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    state: Arc<Mutex<RecordingState>>,
}

impl fmt::Debug for RecordingTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RecordingTransport")
            .field("requests", &state.requests.len())
            .field("pending", &state.pending.len())
            .field("rejecting", &state.rejecting)
            .finish()
    }
}

impl RecordingTransport {
    /// Creates an empty recording.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded requests in send order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Returns the number of recorded requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Returns `true` if nothing was sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().requests.is_empty()
    }

    /// Returns the number of blocking sends still awaiting completion.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Forgets recorded requests. Pending completions are kept.
    pub fn clear(&self) {
        self.state.lock().requests.clear();
    }

    /// Makes subsequent sends fail with [`Error::Transport`].
    pub fn set_rejecting(&self, rejecting: bool) {
        self.state.lock().rejecting = rejecting;
    }

    /// Completes every pending blocking send with `status`.
    ///
    /// Returns how many handlers ran.
    pub fn complete_all(&self, status: u16) -> usize {
        let handlers = std::mem::take(&mut self.state.lock().pending);
        let count = handlers.len();
        for handler in handlers {
            handler(status);
        }
        count
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: OutgoingRequest) -> Result<()> {
        let mut state = self.state.lock();
        if state.rejecting {
            return Err(Error::transport("request rejected by recording transport"));
        }

        trace!(endpoint = %request.endpoint, durable = request.is_durable(), "Recording request");

        let durable = request.is_durable();
        state.requests.push(RecordedRequest {
            endpoint: request.endpoint,
            content_type: request.content_type,
            body: request.body,
            durable,
        });

        if let Delivery::Request {
            on_complete: Some(handler),
        } = request.delivery
        {
            state.pending.push(handler);
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU16, Ordering};

    fn blocking(on_complete: Option<CompletionHandler>) -> OutgoingRequest {
        OutgoingRequest {
            endpoint: "https://plausible.io/api/event".into(),
            content_type: "text/plain",
            body: r#"{"n":"x","u":"u","d":"d","r":null,"w":1,"h":0}"#.into(),
            delivery: Delivery::Request { on_complete },
        }
    }

    #[test]
    fn test_records_and_parses() {
        let transport = RecordingTransport::new();
        transport.send(blocking(None)).expect("send");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].durable);

        let payload = requests[0].payload().expect("payload");
        assert_eq!(payload.name, "x");
        assert_eq!(requests[0].props().expect("props"), None);
    }

    #[test]
    fn test_complete_all_runs_each_handler_once() {
        let transport = RecordingTransport::new();
        let seen = Arc::new(AtomicU16::new(0));
        let seen_clone = Arc::clone(&seen);

        transport
            .send(blocking(Some(Box::new(move |status| {
                seen_clone.store(status, Ordering::SeqCst);
            }))))
            .expect("send");

        assert_eq!(transport.pending_count(), 1);
        assert_eq!(transport.complete_all(404), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 404);
        assert_eq!(transport.complete_all(200), 0);
    }

    #[test]
    fn test_rejecting() {
        let transport = RecordingTransport::new();
        transport.set_rejecting(true);

        let err = transport.send(blocking(None)).unwrap_err();
        assert!(err.is_transport_error());
        assert!(transport.is_empty());
    }
}
