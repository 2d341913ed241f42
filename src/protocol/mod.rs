//! Event protocol types.
//!
//! This module defines what travels to the collection endpoint and what
//! callers attach to each event.
//!
//! # Protocol Overview
//!
//! | Item | Value |
//! |------|-------|
//! | Endpoint | `POST {apiHost}/api/event` |
//! | Content type | `text/plain` |
//! | Body | JSON object with `n,u,d,r,w,h` and optional `p` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `options` | Per-call props and completion callback |
//! | `payload` | Wire payload |

// ============================================================================
// Submodules
// ============================================================================

/// Per-call event options.
pub mod options;

/// Wire payload.
pub mod payload;

// ============================================================================
// Constants
// ============================================================================

/// Path appended to the API host.
pub const EVENT_PATH: &str = "/api/event";

/// Content type of blocking sends.
pub const CONTENT_TYPE: &str = "text/plain";

// ============================================================================
// Re-exports
// ============================================================================

pub use options::{EventCallback, EventOptions, EventResponse};
pub use payload::EventPayload;
