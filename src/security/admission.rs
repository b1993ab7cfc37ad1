//! Inbound admission control.
//!
//! # Responsibilities
//! - Cap the number of inbound requests processed at once
//! - Refuse immediately when full (no queueing)
//! - Release the slot exactly once when the request finishes
//!
//! # Design Decisions
//! - One mutex serializes the check-and-increment and the decrement
//! - Refused callers get a retry hint upstream; the limiter itself never blocks
//! - `AdmissionSlot` releases on drop, so early returns and panics cannot leak slots

use std::sync::Arc;

use parking_lot::Mutex;

/// Counting limiter for concurrently in-flight inbound requests.
#[derive(Debug)]
pub struct AdmissionLimiter {
    occupied: Mutex<usize>,
    capacity: usize,
}

impl AdmissionLimiter {
    /// Create a limiter admitting at most `capacity` concurrent requests.
    pub fn new(capacity: usize) -> Self {
        Self {
            occupied: Mutex::new(0),
            capacity,
        }
    }

    /// Take a slot if one is free.
    /// Returns true if admitted, false (with no side effect) if the limit is reached.
    pub fn try_acquire(&self) -> bool {
        let mut occupied = self.occupied.lock();
        if *occupied >= self.capacity {
            return false;
        }
        *occupied += 1;
        true
    }

    /// Give back a slot taken by a successful `try_acquire`.
    pub fn release(&self) {
        let mut occupied = self.occupied.lock();
        if *occupied > 0 {
            *occupied -= 1;
        } else {
            tracing::error!("Admission slot released more times than acquired");
        }
    }

    /// Scoped acquisition: the returned slot releases itself when dropped.
    pub fn try_admit(self: &Arc<Self>) -> Option<AdmissionSlot> {
        if self.try_acquire() {
            Some(AdmissionSlot {
                limiter: Arc::clone(self),
            })
        } else {
            None
        }
    }

    /// Number of slots currently held.
    pub fn occupied(&self) -> usize {
        *self.occupied.lock()
    }

    /// Configured maximum.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A RAII guard representing one occupied admission slot.
#[derive(Debug)]
pub struct AdmissionSlot {
    limiter: Arc<AdmissionLimiter>,
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
