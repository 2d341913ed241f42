//! Error types for the tracker.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Fallible seams (storage, transport, DOM mutation, configuration) return
//! [`Result<T>`] which uses [`Error`]. The tracking operations themselves
//! never surface errors to the embedding page:
//!
//! ```ignore
//! use plausible_tracker::{Result, Tracker};
//!
//! fn example(window: Window) -> Result<()> {
//!     let tracker = Tracker::builder(window).domain("example.com").build()?;
//!     tracker.track_pageview(Default::default(), Default::default());
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUrl`] |
//! | Storage | [`Error::StorageUnavailable`] |
//! | Transport | [`Error::Transport`], [`Error::Http`] |
//! | Document | [`Error::NodeNotFound`], [`Error::HierarchyRequest`] |
//! | External | [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::NodeId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when tracker configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// A URL could not be parsed.
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        /// The rejected input.
        url: String,
        /// Parser failure.
        #[source]
        source: url::ParseError,
    },

    // ========================================================================
    // Storage Errors
    // ========================================================================
    /// Persistent storage cannot be read or written.
    ///
    /// The tracker treats this as "not opted out".
    #[error("Storage unavailable: {message}")]
    StorageUnavailable {
        /// Description of the storage failure.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The transport rejected a send.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    // ========================================================================
    // Document Errors
    // ========================================================================
    /// Node does not belong to the document.
    #[error("Node not found: {node_id}")]
    NodeNotFound {
        /// The missing node's ID.
        node_id: NodeId,
    },

    /// Tree mutation would produce an invalid hierarchy.
    #[error("Hierarchy request error: {message}")]
    HierarchyRequest {
        /// Description of the rejected mutation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(url: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            source,
        }
    }

    /// Creates a storage unavailable error.
    #[inline]
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a node not found error.
    #[inline]
    pub fn node_not_found(node_id: NodeId) -> Self {
        Self::NodeNotFound { node_id }
    }

    /// Creates a hierarchy request error.
    #[inline]
    pub fn hierarchy_request(message: impl Into<String>) -> Self {
        Self::HierarchyRequest {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a document tree error.
    #[inline]
    #[must_use]
    pub fn is_dom_error(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound { .. } | Self::HierarchyRequest { .. }
        )
    }

    /// Returns `true` if this is a transport error.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Http(_))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::transport("beacon queue full");
        assert_eq!(err.to_string(), "Transport error: beacon queue full");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("apiHost must be absolute");
        assert_eq!(
            err.to_string(),
            "Configuration error: apiHost must be absolute"
        );
    }

    #[test]
    fn test_invalid_url_keeps_source() {
        let source = url::Url::parse("not a url").unwrap_err();
        let err = Error::invalid_url("not a url", source);

        assert!(err.to_string().starts_with("Invalid URL 'not a url'"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_is_dom_error() {
        let missing = Error::node_not_found(NodeId::from_raw(7));
        let hierarchy = Error::hierarchy_request("cycle");
        let other = Error::config("test");

        assert!(missing.is_dom_error());
        assert!(hierarchy.is_dom_error());
        assert!(!other.is_dom_error());
    }

    #[test]
    fn test_is_transport_error() {
        assert!(Error::transport("test").is_transport_error());
        assert!(!Error::storage_unavailable("test").is_transport_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
