//! Process-wide tracker handle.
//!
//! Every [`Tracker`] installs itself here when constructed, the way the
//! page script exposes `window.plausible`, so callers without a reference
//! can still send events. There is no teardown; the latest tracker wins.

use parking_lot::RwLock;
use tracing::debug;

use crate::protocol::EventOptions;

use super::Tracker;
use super::config::EventData;
use super::request::SendOutcome;

static GLOBAL: RwLock<Option<Tracker>> = parking_lot::const_rwlock(None);

/// Replaces the installed tracker.
pub(crate) fn install(tracker: &Tracker) {
    *GLOBAL.write() = Some(tracker.clone());
    debug!("Tracker installed as global handle");
}

/// Returns the most recently constructed tracker.
#[must_use]
pub fn installed() -> Option<Tracker> {
    GLOBAL.read().clone()
}

/// Sends a blocking event through the installed tracker.
///
/// Returns `None` when no tracker has been constructed yet.
pub fn track_event(name: &str, options: EventOptions) -> Option<SendOutcome> {
    let tracker = installed()?;
    Some(tracker.track_event(name, options, EventData::new(), false))
}
