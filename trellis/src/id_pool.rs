//! Correlation id allocation.
//!
//! Ids are generated in batches and recycled. Recycling is bounded: when the
//! free list grows past twice the batch size it is trimmed back to one batch.
//!
//! An id whose request ended without a reply (timeout, cancel) may still be
//! answered later by a slow peer. Such ids sit in quarantine for a while
//! before they are handed out again, so a late reply cannot resolve a newer
//! request that reused the id.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use trellis_core::correlation::CorrelationId;

/// Default number of ids generated per refill.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Default time an unanswered id waits before reuse.
pub const DEFAULT_QUARANTINE: Duration = Duration::from_secs(30);

/// Produces fresh correlation ids.
pub type IdGenerator = Box<dyn FnMut() -> CorrelationId>;

/// 16 random bytes.
pub fn random_id() -> CorrelationId {
    CorrelationId::from_u128(rand::random())
}

/// Pool of reusable correlation ids.
pub struct IdPool {
    free: Vec<CorrelationId>,
    quarantined: VecDeque<(Instant, CorrelationId)>,
    batch_size: usize,
    quarantine: Duration,
    generator: IdGenerator,
}

impl IdPool {
    /// Create a pool of random ids.
    pub fn new(batch_size: usize, quarantine: Duration) -> Self {
        Self::with_generator(batch_size, quarantine, Box::new(random_id))
    }

    /// Create a pool drawing fresh ids from `generator`.
    ///
    /// The generator must not repeat ids that may still be in use.
    pub fn with_generator(batch_size: usize, quarantine: Duration, generator: IdGenerator) -> Self {
        Self {
            free: Vec::new(),
            quarantined: VecDeque::new(),
            batch_size: batch_size.max(1),
            quarantine,
            generator,
        }
    }

    /// Replace the id generator. Ids already in the pool are kept.
    pub fn set_generator(&mut self, generator: IdGenerator) {
        self.generator = generator;
    }

    /// Take an id, refilling the pool with a fresh batch when empty.
    pub fn acquire(&mut self) -> CorrelationId {
        self.promote_expired(Instant::now());
        if let Some(id) = self.free.pop() {
            return id;
        }
        let batch: Vec<CorrelationId> = (0..self.batch_size).map(|_| (self.generator)()).collect();
        self.free.extend(batch);
        match self.free.pop() {
            Some(id) => id,
            None => (self.generator)(),
        }
    }

    /// Return an id that was answered; it is reusable right away.
    pub fn release(&mut self, id: CorrelationId) {
        self.free.push(id);
        self.trim();
    }

    /// Return an id that was never answered; it is reusable once the
    /// quarantine period has passed.
    pub fn quarantine(&mut self, id: CorrelationId) {
        if self.quarantine.is_zero() {
            self.release(id);
        } else {
            self.quarantined
                .push_back((Instant::now() + self.quarantine, id));
        }
    }

    /// Ids ready to be handed out.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Ids waiting out their quarantine.
    pub fn quarantined(&self) -> usize {
        self.quarantined.len()
    }

    /// Ids generated per refill.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn promote_expired(&mut self, now: Instant) {
        while let Some((until, _)) = self.quarantined.front() {
            if *until > now {
                break;
            }
            if let Some((_, id)) = self.quarantined.pop_front() {
                self.free.push(id);
            }
        }
        self.trim();
    }

    fn trim(&mut self) {
        if self.free.len() > 2 * self.batch_size {
            self.free.truncate(self.batch_size);
        }
    }
}

impl fmt::Debug for IdPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdPool")
            .field("free", &self.free.len())
            .field("quarantined", &self.quarantined.len())
            .field("batch_size", &self.batch_size)
            .field("quarantine", &self.quarantine)
            .finish()
    }
}
