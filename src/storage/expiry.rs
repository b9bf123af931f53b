//! One-Shot Expiry Timers
//!
//! Each key set with a timeout gets its own one-shot timer. The engine only
//! needs two primitives from the host event loop, captured by
//! [`TimerService`]:
//!
//! - schedule a callback after a delay, getting back a [`TimerHandle`]
//! - cancel that callback through the handle
//!
//! [`TokioTimers`] implements them with a spawned task that sleeps and then
//! runs the callback. Cancelling aborts the task.
//!
//! ## Cancellation Is Best-Effort
//!
//! Aborting a task only helps while it is still sleeping. A timer that has
//! already woken up may be blocked on the engine lock while a SET replaces
//! it. The engine guards against this with a per-timer generation id (see
//! [`StorageEngine`](super::StorageEngine)), so a late callback is a no-op.

use std::fmt;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::trace;

/// Callback run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Host facility for one-shot delayed callbacks.
pub trait TimerService: Send + Sync {
    /// Runs `callback` once after `delay`, unless the returned handle is
    /// cancelled first. The callback must not run before `schedule` returns.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}

/// Cancellable capability for one scheduled callback.
///
/// Cancelling is idempotent: cancelling twice, or after the callback ran,
/// does nothing.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    /// Wraps an arbitrary cancel action.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }
}

impl From<AbortHandle> for TimerHandle {
    fn from(handle: AbortHandle) -> Self {
        TimerHandle::new(move || handle.abort())
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Timers backed by the ambient Tokio runtime.
///
/// `schedule` must be called from within a runtime, like `tokio::spawn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimers;

impl TimerService for TokioTimers {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        trace!(delay_ms = delay.as_millis() as u64, "Expiry timer scheduled");
        task.abort_handle().into()
    }
}
