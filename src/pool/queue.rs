//! Fixed-capacity queue of idle connections

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A connection paired with the time it was returned to the pool
#[derive(Debug)]
pub struct IdleEntry<C> {
    pub conn: C,
    since: Instant,
}

impl<C> IdleEntry<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            since: Instant::now(),
        }
    }

    /// How long this entry has been sitting in the pool
    pub fn age(&self) -> Duration {
        self.since.elapsed()
    }
}

/// Bounded, insertion-ordered container of idle entries.
///
/// Both push and pop are non-blocking: a push against a full queue hands the
/// entry back to the caller instead of waiting, which is what lets release
/// close overflow connections rather than block.
#[derive(Debug)]
pub struct IdleQueue<C> {
    entries: Mutex<VecDeque<IdleEntry<C>>>,
    capacity: usize,
}

impl<C> IdleQueue<C> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Push an entry, returning it to the caller when the queue is full
    pub fn try_push(&self, entry: IdleEntry<C>) -> Result<(), IdleEntry<C>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.capacity {
            return Err(entry);
        }
        entries.push_back(entry);
        Ok(())
    }

    /// Pop the oldest entry, or `None` when the queue is empty
    pub fn pop(&self) -> Option<IdleEntry<C>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Best-effort snapshot of the current queue length
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove and return every queued entry
    pub fn drain(&self) -> Vec<IdleEntry<C>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}
