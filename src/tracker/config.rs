//! Event data and configuration resolution.
//!
//! Every send resolves a fresh [`TrackerConfig`] by layering three
//! [`EventData`] values:
//!
//! | Layer | Source |
//! |-------|--------|
//! | Built-ins | Live window state plus fixed defaults |
//! | Defaults | Passed to the tracker factory |
//! | Overrides | Passed to the individual call |
//!
//! Later layers win field by field. Nothing is cached, so `url`, `referrer`
//! and `deviceWidth` always reflect the page at send time.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::browser::Window;
use crate::protocol::EVENT_PATH;

// ============================================================================
// Constants
// ============================================================================

/// Collection host used when none is configured.
pub const DEFAULT_API_HOST: &str = "https://plausible.io";

// ============================================================================
// EventData
// ============================================================================

/// A partial configuration layer.
///
/// Deserializes from the camelCase object pages pass to the factory; keys
/// the tracker does not know are kept in [`extra`](Self::extra).
///
/// # Example
///
/// ```ignore
/// let data: EventData = serde_json::from_value(json!({
///     "domain": "example.com",
///     "hashMode": true,
///     "referrer": null,
/// }))?;
/// assert_eq!(data.referrer, Some(None));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    /// Site domain reported as `d`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Collection host, e.g. `https://plausible.io`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_host: Option<String>,

    /// Page URL reported as `u`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Referrer reported as `r`. `Some(None)` clears it.
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub referrer: Option<Option<String>>,

    /// Viewport width reported as `w`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_width: Option<u32>,

    /// Treat fragment changes as navigations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_mode: Option<bool>,

    /// Send events from loopback hosts and `file:` pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_localhost: Option<bool>,

    /// Unrecognized keys, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Distinguishes a missing field (`None`) from an explicit `null`
/// (`Some(None)`).
fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl EventData {
    /// Creates an empty layer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets the API host.
    #[must_use]
    pub fn with_api_host(mut self, api_host: impl Into<String>) -> Self {
        self.api_host = Some(api_host.into());
        self
    }

    /// Sets the page URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the referrer; `None` sends `null`.
    #[must_use]
    pub fn with_referrer(mut self, referrer: Option<String>) -> Self {
        self.referrer = Some(referrer);
        self
    }

    /// Sets the device width.
    #[must_use]
    pub fn with_device_width(mut self, width: u32) -> Self {
        self.device_width = Some(width);
        self
    }

    /// Sets hash mode.
    #[must_use]
    pub fn with_hash_mode(mut self, enabled: bool) -> Self {
        self.hash_mode = Some(enabled);
        self
    }

    /// Sets localhost tracking.
    #[must_use]
    pub fn with_track_localhost(mut self, enabled: bool) -> Self {
        self.track_localhost = Some(enabled);
        self
    }

    /// Adds an extra key.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Layers `overrides` on top of `self`.
    #[must_use]
    pub fn merge(mut self, overrides: &EventData) -> Self {
        if let Some(domain) = &overrides.domain {
            self.domain = Some(domain.clone());
        }
        if let Some(api_host) = &overrides.api_host {
            self.api_host = Some(api_host.clone());
        }
        if let Some(url) = &overrides.url {
            self.url = Some(url.clone());
        }
        if let Some(referrer) = &overrides.referrer {
            self.referrer = Some(referrer.clone());
        }
        if let Some(width) = overrides.device_width {
            self.device_width = Some(width);
        }
        if let Some(hash_mode) = overrides.hash_mode {
            self.hash_mode = Some(hash_mode);
        }
        if let Some(track_localhost) = overrides.track_localhost {
            self.track_localhost = Some(track_localhost);
        }
        for (key, value) in &overrides.extra {
            self.extra.insert(key.clone(), value.clone());
        }
        self
    }

    /// The built-in layer for `window`.
    #[must_use]
    pub fn builtin(window: &Window) -> Self {
        let location = window.location();
        Self {
            domain: Some(location.hostname()),
            api_host: Some(DEFAULT_API_HOST.to_string()),
            url: Some(location.href().to_string()),
            referrer: Some(window.referrer().map(str::to_string)),
            device_width: Some(window.inner_width()),
            hash_mode: Some(false),
            track_localhost: Some(false),
            extra: Map::new(),
        }
    }
}

// ============================================================================
// TrackerConfig
// ============================================================================

/// Fully resolved configuration for one send.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Site domain.
    pub domain: String,
    /// Collection host.
    pub api_host: String,
    /// Page URL.
    pub url: String,
    /// Referrer, `None` when absent.
    pub referrer: Option<String>,
    /// Viewport width.
    pub device_width: u32,
    /// Hash-based routing.
    pub hash_mode: bool,
    /// Send from local hosts.
    pub track_localhost: bool,
    /// Caller-supplied extra keys.
    pub extra: Map<String, Value>,
}

impl TrackerConfig {
    /// Resolves built-ins < `defaults` < `overrides` against live window
    /// state.
    #[must_use]
    pub fn resolve(window: &Window, defaults: &EventData, overrides: &EventData) -> Self {
        let merged = EventData::builtin(window).merge(defaults).merge(overrides);
        Self {
            domain: merged.domain.unwrap_or_default(),
            api_host: merged
                .api_host
                .unwrap_or_else(|| DEFAULT_API_HOST.to_string()),
            url: merged.url.unwrap_or_default(),
            referrer: merged.referrer.flatten(),
            device_width: merged.device_width.unwrap_or_default(),
            hash_mode: merged.hash_mode.unwrap_or(false),
            track_localhost: merged.track_localhost.unwrap_or(false),
            extra: merged.extra,
        }
    }

    /// Returns `{apiHost}/api/event`.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.api_host.trim_end_matches('/'), EVENT_PATH)
    }
}

// ============================================================================
// Tests
// ============================================================================
