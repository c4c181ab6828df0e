//! Interface to the host event loop.
//!
//! The loop owns scheduling: it calls [`ReadinessHandler::on_ready`] when a
//! registered descriptor may have changed state and runs delayed callbacks
//! scheduled with [`EventLoop::call_later`]. Everything runs on one thread;
//! callbacks run to completion before the next one is dispatched.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::socket::Descriptor;

/// Receiver of readiness notifications for one descriptor.
pub trait ReadinessHandler {
    /// The descriptor may have become readable or writable.
    ///
    /// Returns true if any frame moved in either direction, so the loop can
    /// skip idling.
    fn on_ready(&self) -> bool;
}

/// Callback scheduled for later execution.
pub type DelayedCall = Box<dyn FnOnce()>;

/// The scheduling surface a connection needs from its host loop.
pub trait EventLoop {
    /// Watch a descriptor, invoking `handler` on readiness changes.
    fn add_reader(&self, descriptor: Descriptor, handler: Rc<dyn ReadinessHandler>);

    /// Stop watching a descriptor.
    fn remove_reader(&self, descriptor: Descriptor);

    /// Run `callback` once after `delay`; the returned handle can cancel it.
    fn call_later(&self, delay: Duration, callback: DelayedCall) -> TimerHandle;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Pending,
    Fired,
    Cancelled,
}

/// Handle to a scheduled delayed call.
///
/// Cloning shares the same underlying timer.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    state: Rc<Cell<TimerState>>,
}

impl TimerHandle {
    /// Create a handle in the pending state. Used by event loop implementations.
    pub fn new() -> Self {
        Self {
            state: Rc::new(Cell::new(TimerState::Pending)),
        }
    }

    /// Prevent the callback from running. No-op if it already ran.
    pub fn cancel(&self) {
        if self.state.get() == TimerState::Pending {
            self.state.set(TimerState::Cancelled);
        }
    }

    /// True while the callback is still scheduled.
    pub fn is_active(&self) -> bool {
        self.state.get() == TimerState::Pending
    }

    /// Mark as fired. Returns false if the timer was cancelled, in which
    /// case the loop must not run the callback.
    pub fn fire(&self) -> bool {
        if self.state.get() == TimerState::Pending {
            self.state.set(TimerState::Fired);
            true
        } else {
            false
        }
    }
}

impl Default for TimerHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_prevents_fire() {
        let handle = TimerHandle::new();
        assert!(handle.is_active());
        handle.cancel();
        assert!(!handle.is_active());
        assert!(!handle.fire());
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let handle = TimerHandle::new();
        let shared = handle.clone();
        assert!(handle.fire());
        shared.cancel();
        assert!(!shared.is_active());
        assert!(!handle.fire());
    }
}
