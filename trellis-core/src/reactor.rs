//! Reference single-threaded event loop.
//!
//! `Reactor` implements [`EventLoop`] with a turn-based loop:
//! 1. run every delayed call whose deadline passed (in deadline order)
//! 2. notify every registered reader
//! 3. if nothing moved, sleep until the next timer or `idle_interval`
//!
//! Socket libraries signal readiness through edge-triggered descriptors and a
//! separate bitmask, so readers re-check the bitmask on every notification;
//! notifying all readers each turn is therefore always correct.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::future::Future;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use tracing::trace;

use crate::event_loop::{DelayedCall, EventLoop, ReadinessHandler, TimerHandle};
use crate::socket::Descriptor;

/// Default sleep when a turn made no progress.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(1);

/// Scheduled calls tolerated before cancelled ones are swept.
const MIN_SWEEP_THRESHOLD: usize = 64;

/// Reactor tuning.
#[derive(Debug, Clone, Copy)]
pub struct ReactorConfig {
    /// Upper bound on how long an idle turn sleeps
    pub idle_interval: Duration,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            idle_interval: DEFAULT_IDLE_INTERVAL,
        }
    }
}

struct ScheduledCall {
    handle: TimerHandle,
    callback: DelayedCall,
}

#[derive(Default)]
struct Inner {
    readers: BTreeMap<Descriptor, Rc<dyn ReadinessHandler>>,
    deadlines: BinaryHeap<Reverse<(Instant, u64)>>,
    calls: HashMap<u64, ScheduledCall>,
    next_seq: u64,
    sweep_at: usize,
}

impl Inner {
    /// Drop cancelled calls before their deadline. Runs once the table has
    /// doubled since the last sweep, so the cost stays amortized.
    fn sweep_cancelled(&mut self) {
        if self.calls.len() < self.sweep_at.max(MIN_SWEEP_THRESHOLD) {
            return;
        }
        let before = self.calls.len();
        self.calls.retain(|_, call| call.handle.is_active());
        let calls = &self.calls;
        self.deadlines
            .retain(|Reverse((_, seq))| calls.contains_key(seq));
        self.sweep_at = self.calls.len() * 2;
        trace!(
            swept = before - self.calls.len(),
            live = self.calls.len(),
            "[REACTOR] Swept cancelled timers"
        );
    }
}

/// Single-threaded readiness + timer loop.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
/// use trellis_core::event_loop::EventLoop;
/// use trellis_core::reactor::Reactor;
///
/// let reactor = Reactor::new();
/// let fired = Rc::new(Cell::new(false));
/// let flag = fired.clone();
/// reactor.call_later(Duration::from_millis(5), Box::new(move || flag.set(true)));
/// reactor.run_for(Duration::from_millis(20));
/// assert!(fired.get());
/// ```
pub struct Reactor {
    inner: RefCell<Inner>,
    config: ReactorConfig,
    stopped: Cell<bool>,
}

impl Reactor {
    /// Create a reactor with default configuration.
    pub fn new() -> Self {
        Self::with_config(ReactorConfig::default())
    }

    /// Create a reactor with custom configuration.
    pub fn with_config(config: ReactorConfig) -> Self {
        Self {
            inner: RefCell::new(Inner::default()),
            config,
            stopped: Cell::new(false),
        }
    }

    /// Run one turn. Returns true if a timer fired or a reader made progress.
    pub fn run_once(&self) -> bool {
        let fired = self.fire_due_timers();

        let readers: Vec<Rc<dyn ReadinessHandler>> =
            self.inner.borrow().readers.values().cloned().collect();
        let mut progress = false;
        for reader in readers {
            progress |= reader.on_ready();
        }

        fired || progress
    }

    /// Run turns until `duration` has elapsed or [`stop`](Self::stop) is called.
    pub fn run_for(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        self.stopped.set(false);
        while !self.stopped.get() && Instant::now() < deadline {
            if !self.run_once() {
                self.idle(Some(deadline));
            }
        }
    }

    /// Run turns until [`stop`](Self::stop) is called.
    pub fn run(&self) {
        self.stopped.set(false);
        while !self.stopped.get() {
            if !self.run_once() {
                self.idle(None);
            }
        }
    }

    /// Drive the loop until `future` completes.
    ///
    /// The future is polled between turns with a no-op waker: its progress
    /// comes from callbacks running inside the loop. Returns `None` if
    /// `timeout` elapses or the reactor is stopped first.
    pub fn run_until<F: Future>(&self, future: F, timeout: Option<Duration>) -> Option<F::Output> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut future = std::pin::pin!(future);
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        self.stopped.set(false);

        loop {
            if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                return Some(output);
            }
            if self.stopped.get() || deadline.is_some_and(|d| Instant::now() >= d) {
                return None;
            }
            if !self.run_once() {
                self.idle(deadline);
            }
        }
    }

    /// Make the current `run*` call return after its turn.
    pub fn stop(&self) {
        self.stopped.set(true);
    }

    /// Number of watched descriptors.
    pub fn reader_count(&self) -> usize {
        self.inner.borrow().readers.len()
    }

    /// Number of delayed calls that are still scheduled.
    pub fn active_timers(&self) -> usize {
        self.inner
            .borrow()
            .calls
            .values()
            .filter(|c| c.handle.is_active())
            .count()
    }

    fn fire_due_timers(&self) -> bool {
        let now = Instant::now();
        let mut due = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            while let Some(Reverse((deadline, seq))) = inner.deadlines.peek().copied() {
                if deadline > now {
                    break;
                }
                inner.deadlines.pop();
                if let Some(call) = inner.calls.remove(&seq) {
                    due.push(call);
                }
            }
            inner.sweep_cancelled();
        }

        let mut fired = false;
        for call in due {
            if call.handle.fire() {
                trace!("[REACTOR] Running delayed call");
                (call.callback)();
                fired = true;
            }
        }
        fired
    }

    fn idle(&self, deadline: Option<Instant>) {
        let now = Instant::now();
        let mut wait = self.config.idle_interval;
        {
            let inner = self.inner.borrow();
            if let Some(Reverse((next, _))) = inner.deadlines.peek() {
                wait = wait.min(next.saturating_duration_since(now));
            }
        }
        if let Some(d) = deadline {
            wait = wait.min(d.saturating_duration_since(now));
        }
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop for Reactor {
    fn add_reader(&self, descriptor: Descriptor, handler: Rc<dyn ReadinessHandler>) {
        trace!(%descriptor, "[REACTOR] Adding reader");
        self.inner.borrow_mut().readers.insert(descriptor, handler);
    }

    fn remove_reader(&self, descriptor: Descriptor) {
        trace!(%descriptor, "[REACTOR] Removing reader");
        self.inner.borrow_mut().readers.remove(&descriptor);
    }

    fn call_later(&self, delay: Duration, callback: DelayedCall) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut inner = self.inner.borrow_mut();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.deadlines.push(Reverse((Instant::now() + delay, seq)));
        inner.calls.insert(
            seq,
            ScheduledCall {
                handle: handle.clone(),
                callback,
            },
        );
        handle
    }
}
