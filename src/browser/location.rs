//! Document location.
//!
//! Mirrors the parts of `window.location` the tracker reads: `href`,
//! `hostname`, `host` and `protocol`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// `localhost`, `127.x[.y[.z]]`, and IPv6 loopback spellings.
static LOOPBACK_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^localhost$|^127(?:\.[0-9]+){0,2}\.[0-9]+$|^(?:0*:)*?:?0*1$")
        .expect("loopback pattern is valid")
});

// ============================================================================
// Location
// ============================================================================

/// An absolute page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    url: Url,
}

impl Location {
    /// Parses an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `href` is not an absolute URL.
    pub fn parse(href: &str) -> Result<Self> {
        let url = Url::parse(href).map_err(|e| Error::invalid_url(href, e))?;
        Ok(Self { url })
    }

    /// Wraps an already parsed URL.
    #[inline]
    #[must_use]
    pub fn from_url(url: Url) -> Self {
        Self { url }
    }

    /// Returns the full URL.
    #[inline]
    #[must_use]
    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    /// Returns the scheme with its trailing colon, e.g. `"https:"`.
    #[must_use]
    pub fn protocol(&self) -> String {
        format!("{}:", self.url.scheme())
    }

    /// Returns the host name without port. IPv6 literals keep brackets.
    #[must_use]
    pub fn hostname(&self) -> String {
        self.url.host_str().unwrap_or_default().to_string()
    }

    /// Returns `hostname[:port]`, omitting the scheme's default port.
    #[must_use]
    pub fn host(&self) -> String {
        url_host(&self.url)
    }

    /// Returns the fragment including `#`, or an empty string.
    #[must_use]
    pub fn hash(&self) -> String {
        match self.url.fragment() {
            Some(fragment) if !fragment.is_empty() => format!("#{fragment}"),
            _ => String::new(),
        }
    }

    /// Resolves a possibly relative reference against this location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the reference cannot be resolved.
    pub fn resolve(&self, reference: &str) -> Result<Url> {
        self.url
            .join(reference)
            .map_err(|e| Error::invalid_url(reference, e))
    }

    /// Returns `true` for loopback hosts and `file:` pages.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.url.scheme() == "file" || is_loopback_host(&self.hostname())
    }

    /// Returns the underlying URL.
    #[inline]
    #[must_use]
    pub fn as_url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.href())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Returns `true` if `hostname` names the local machine.
///
/// Accepts bracketed IPv6 literals as produced by [`Location::hostname`].
#[must_use]
pub fn is_loopback_host(hostname: &str) -> bool {
    let bare = hostname
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(hostname);
    LOOPBACK_HOST.is_match(bare)
}

/// `host` of a URL the way browsers report it.
pub(crate) fn url_host(url: &Url) -> String {
    let hostname = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{hostname}:{port}"),
        None => hostname.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
