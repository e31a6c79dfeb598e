//! Sampling policy shared by the capture streams
//!
//! [`Throttle`] admits at most one event per fixed interval and drops the rest
//! outright. [`BoundedBuffer`] is a FIFO ring that evicts its oldest entry once
//! full; snapshots are always value copies.

use std::collections::VecDeque;

/// Fixed-interval throttle over host timestamps (ms)
#[derive(Debug, Clone)]
pub struct Throttle {
    interval_ms: f64,
    last_admitted: Option<f64>,
}

impl Throttle {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms,
            last_admitted: None,
        }
    }

    /// Admit `now` if at least one interval has elapsed since the last admitted event
    pub fn admit(&mut self, now: f64) -> bool {
        if let Some(last) = self.last_admitted {
            if now - last < self.interval_ms {
                return false;
            }
        }
        self.last_admitted = Some(now);
        true
    }
}

/// Fixed-capacity FIFO buffer
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    evicted: u64,
}

impl<T: Clone> BoundedBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            evicted: 0,
        }
    }

    /// Append `item`, evicting the oldest entry when over capacity
    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
        while self.items.len() > self.capacity {
            self.items.pop_front();
            self.evicted += 1;
        }
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of entries dropped by eviction so far
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
