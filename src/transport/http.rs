//! HTTP transport on the tokio runtime.
//!
//! Every send is spawned as a detached task so the caller never waits on
//! the network. Beacon sends discard their outcome; blocking sends report
//! the status code (or `0`) to their completion handler.

// ============================================================================
// Imports
// ============================================================================

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::{Delivery, OutgoingRequest, Transport};

// ============================================================================
// HttpTransport
// ============================================================================

/// Sends events with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Shared HTTP client.
    client: Client,
    /// Runtime that owns in-flight sends.
    runtime: Handle,
}

impl HttpTransport {
    /// Creates a transport bound to the current tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if called outside a tokio runtime
    /// - [`Error::Http`] if the HTTP client cannot be built
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::config(format!("HttpTransport requires a tokio runtime: {e}")))?;
        let client = Client::builder().build()?;
        Ok(Self::with_client(client, runtime))
    }

    /// Creates a transport from an existing client and runtime handle.
    #[inline]
    #[must_use]
    pub fn with_client(client: Client, runtime: Handle) -> Self {
        Self { client, runtime }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: OutgoingRequest) -> Result<()> {
        let OutgoingRequest {
            endpoint,
            content_type,
            body,
            delivery,
        } = request;

        let pending = self
            .client
            .post(&endpoint)
            .header(CONTENT_TYPE, content_type)
            .body(body);

        match delivery {
            Delivery::Beacon => {
                debug!(endpoint = %endpoint, "Sending beacon");
                self.runtime.spawn(async move {
                    if let Err(e) = pending.send().await {
                        debug!(endpoint = %endpoint, error = %e, "Beacon failed");
                    }
                });
            }
            Delivery::Request { on_complete } => {
                debug!(endpoint = %endpoint, "Sending request");
                self.runtime.spawn(async move {
                    let status = match pending.send().await {
                        Ok(response) => response.status().as_u16(),
                        Err(e) => {
                            warn!(endpoint = %endpoint, error = %e, "Event request failed");
                            0
                        }
                    };
                    if let Some(handler) = on_complete {
                        handler(status);
                    }
                });
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
