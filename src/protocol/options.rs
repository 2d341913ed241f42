//! Per-call event options.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// EventResponse
// ============================================================================

/// Outcome of a blocking send, handed to [`EventOptions::callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResponse {
    /// HTTP status code, `0` when the request never got a response.
    pub status: u16,
}

/// Completion callback for blocking sends.
pub type EventCallback = Arc<dyn Fn(EventResponse) + Send + Sync>;

// ============================================================================
// EventOptions
// ============================================================================

/// Options accepted by `track_event` and `track_pageview`.
///
/// # Example
///
/// ```ignore
/// let options = EventOptions::new()
///     .prop("plan", "pro")
///     .callback(|res| println!("status {}", res.status));
/// ```
#[derive(Clone, Default)]
pub struct EventOptions {
    /// Custom properties, sent JSON-encoded in the `p` field.
    pub props: Option<Map<String, Value>>,

    /// Invoked once when a blocking send completes.
    pub callback: Option<EventCallback>,
}

impl fmt::Debug for EventOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventOptions")
            .field("props", &self.props)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl EventOptions {
    /// Creates empty options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one property.
    #[must_use]
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Replaces the property map.
    #[inline]
    #[must_use]
    pub fn with_props(mut self, props: Map<String, Value>) -> Self {
        self.props = Some(props);
        self
    }

    /// Sets the completion callback.
    #[must_use]
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(EventResponse) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
