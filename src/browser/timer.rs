//! Cancellable timers.
//!
//! The host's `setTimeout` behind a trait so deferred work can be driven by
//! a real runtime ([`TokioScheduler`]) or stepped by hand
//! ([`ManualScheduler`]).

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::TimerId;

// ============================================================================
// Types
// ============================================================================

/// Deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

// ============================================================================
// TimerHandle
// ============================================================================

/// Handle to a scheduled task.
///
/// A timer either fires or is cancelled, never both.
#[derive(Clone)]
pub struct TimerHandle {
    id: TimerId,
    state: Arc<AtomicU8>,
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.id)
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl TimerHandle {
    /// Creates a pending handle. Used by [`Scheduler`] implementations.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: TimerId::generate(),
            state: Arc::new(AtomicU8::new(PENDING)),
        }
    }

    /// Returns the timer ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Cancels the timer.
    ///
    /// Returns `true` if the timer was still pending. Cancelling twice, or
    /// after the timer fired, is a no-op.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns `true` if the timer has neither fired nor been cancelled.
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    /// Returns `true` if the timer was cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Marks the timer fired. Returns `false` if it was cancelled first.
    ///
    /// [`Scheduler`] implementations call this right before running the task.
    pub fn try_fire(&self) -> bool {
        self.state
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for TimerHandle {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Runs a task once after a delay.
pub trait Scheduler: Send + Sync {
    /// Schedules `task` to run after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;
}

// ============================================================================
// ManualScheduler
// ============================================================================

struct Scheduled {
    due: Duration,
    seq: u64,
    handle: TimerHandle,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    seq: u64,
    queue: Vec<Scheduled>,
}

/// Virtual-time scheduler advanced explicitly with [`advance`](Self::advance).
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("queued", &state.queue.len())
            .finish()
    }
}

impl ManualScheduler {
    /// Creates a scheduler at virtual time zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Returns the number of timers that can still fire.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .queue
            .iter()
            .filter(|t| t.handle.is_pending())
            .count()
    }

    /// Moves virtual time forward, running every task that comes due in
    /// order of due time, then scheduling order.
    ///
    /// Tasks scheduled while advancing run too if they come due before the
    /// target time. Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        let mut ran = 0;

        loop {
            let next = {
                let mut state = self.state.lock();
                let index = state
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.seq))
                    .map(|(i, _)| i);

                match index {
                    Some(i) => {
                        let scheduled = state.queue.swap_remove(i);
                        state.now = state.now.max(scheduled.due);
                        Some(scheduled)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };

            let Some(scheduled) = next else { break };
            if scheduled.handle.try_fire() {
                trace!(timer_id = %scheduled.handle.id(), "Running timer");
                (scheduled.task)();
                ran += 1;
            }
        }

        ran
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = self.state.lock();
        state.seq += 1;
        let scheduled = Scheduled {
            due: state.now + delay,
            seq: state.seq,
            handle: handle.clone(),
            task,
        };
        state.queue.push(scheduled);
        handle
    }
}

// ============================================================================
// TokioScheduler
// ============================================================================

/// Scheduler backed by `tokio::time::sleep`.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    /// Creates a scheduler bound to the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if called outside a tokio runtime.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::config(format!("TokioScheduler requires a tokio runtime: {e}")))?;
        Ok(Self { runtime })
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let timer = handle.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if timer.try_fire() {
                task();
            }
        });
        handle
    }
}

// ============================================================================
// Tests
// ============================================================================
