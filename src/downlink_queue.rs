//! FIFO of downlink payloads shared between the bus thread (producer) and
//! the UDP reactor (consumer).
//!
//! Bounded: when full, the oldest payload is evicted.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub struct DownlinkQueue {
    inner: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl DownlinkQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    // The deque is never left half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a payload. Returns the evicted oldest payload on overflow.
    pub fn push(&self, payload: String) -> Option<String> {
        let mut queue = self.lock();
        let evicted = if queue.len() >= self.capacity {
            queue.pop_front()
        } else {
            None
        };
        queue.push_back(payload);
        evicted
    }

    /// Remove and return the oldest payload, if any.
    pub fn pop_if_any(&self) -> Option<String> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
