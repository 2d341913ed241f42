//! Event composer.
//!
//! Decides whether an event is suppressed, builds its payload and hands it
//! to the transport. Nothing here returns an error to the page: failures
//! are logged and reported as a [`SendOutcome`].

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, warn};

use crate::browser::Window;
use crate::error::Result;
use crate::protocol::{CONTENT_TYPE, EventOptions, EventPayload, EventResponse};
use crate::transport::{CompletionHandler, Delivery, OutgoingRequest, Transport};

use super::config::TrackerConfig;

// ============================================================================
// Constants
// ============================================================================

/// Storage key of the opt-out flag.
pub const OPT_OUT_KEY: &str = "plausible_ignore";

const LOCAL_NOTICE: &str = "[Plausible] Ignoring event because website is running locally";

const OPT_OUT_NOTICE: &str =
    "[Plausible] Ignoring event because \"plausible_ignore\" is set to \"true\" in localStorage";

// ============================================================================
// SendOutcome
// ============================================================================

/// What happened to a tracked event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the transport.
    Sent,
    /// Dropped because the page runs on a local host.
    SuppressedLocal,
    /// Dropped because the visitor opted out.
    SuppressedOptOut,
    /// Could not be serialized or was rejected by the transport.
    Failed,
}

impl SendOutcome {
    /// Returns `true` if the event reached the transport.
    #[inline]
    #[must_use]
    pub fn is_sent(self) -> bool {
        matches!(self, Self::Sent)
    }

    /// Returns `true` if a suppression rule dropped the event.
    #[inline]
    #[must_use]
    pub fn is_suppressed(self) -> bool {
        matches!(self, Self::SuppressedLocal | Self::SuppressedOptOut)
    }
}

// ============================================================================
// Suppression
// ============================================================================

/// Returns `true` if the visitor opted out. Unreadable storage means no.
fn opted_out(window: &Window) -> bool {
    match window.local_storage().get_item(OPT_OUT_KEY) {
        Ok(value) => value.as_deref() == Some("true"),
        Err(e) => {
            debug!(error = %e, "Opt-out flag unreadable, treating as not set");
            false
        }
    }
}

// ============================================================================
// Composition
// ============================================================================

/// Builds the wire payload for `name`.
pub(crate) fn build_payload(
    name: &str,
    config: &TrackerConfig,
    options: &EventOptions,
) -> Result<EventPayload> {
    Ok(EventPayload {
        name: name.to_string(),
        url: config.url.clone(),
        domain: config.domain.clone(),
        referrer: config.referrer.clone(),
        device_width: config.device_width,
        hash_mode: u8::from(config.hash_mode),
        props: EventPayload::encode_props(options.props.as_ref())?,
    })
}

/// Sends one event.
///
/// Durable sends go out as beacons. Blocking sends invoke
/// `options.callback` once with the observed status, `0` when the request
/// never left the page.
pub(crate) fn send_event(
    window: &Window,
    transport: &dyn Transport,
    name: &str,
    config: &TrackerConfig,
    options: &EventOptions,
    durable: bool,
) -> SendOutcome {
    if !config.track_localhost && window.location().is_local() {
        warn!(event = %name, "{LOCAL_NOTICE}");
        return SendOutcome::SuppressedLocal;
    }
    if opted_out(window) {
        warn!(event = %name, "{OPT_OUT_NOTICE}");
        return SendOutcome::SuppressedOptOut;
    }

    let body = match build_payload(name, config, options).and_then(|p| p.to_body()) {
        Ok(body) => body,
        Err(e) => {
            warn!(event = %name, error = %e, "Failed to serialize event");
            return SendOutcome::Failed;
        }
    };

    let delivery = if durable {
        Delivery::Beacon
    } else {
        let on_complete = options.callback.clone().map(|callback| {
            Box::new(move |status: u16| callback(EventResponse { status })) as CompletionHandler
        });
        Delivery::Request { on_complete }
    };

    let request = OutgoingRequest {
        endpoint: config.endpoint(),
        content_type: CONTENT_TYPE,
        body,
        delivery,
    };
    debug!(event = %name, endpoint = %request.endpoint, durable, "Sending event");

    match transport.send(request) {
        Ok(()) => SendOutcome::Sent,
        Err(e) => {
            warn!(event = %name, error = %e, "Transport rejected event");
            if !durable && let Some(callback) = &options.callback {
                callback(EventResponse { status: 0 });
            }
            SendOutcome::Failed
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
