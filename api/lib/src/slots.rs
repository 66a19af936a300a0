// Copyright (C) Microsoft Corporation. All rights reserved.

//! Operation slot accounting.
//!
//! The legacy device serves a fixed number of concurrent operations. Slots
//! are claimed here, in front of the device, so that a saturated device is
//! never asked to begin an operation it would have to refuse.

use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug)]
struct SlotCount {
    free: usize,
    capacity: usize,
}

/// Counting pool of operation slots for one device.
#[derive(Debug)]
pub struct SlotPool {
    count: Mutex<SlotCount>,
}

impl SlotPool {
    /// Creates a pool with every slot free.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            count: Mutex::new(SlotCount {
                free: capacity,
                capacity,
            }),
        })
    }

    /// Claims one slot, or `None` when the pool is exhausted.
    pub fn claim(self: &Arc<Self>) -> Option<ClaimedSlot> {
        let mut count = self.count.lock();
        if count.free == 0 {
            return None;
        }
        count.free -= 1;
        Some(ClaimedSlot {
            pool: Arc::clone(self),
            held: true,
        })
    }

    /// Resets the pool to `capacity` slots, all of them free.
    ///
    /// Slots already claimed are unaffected; each still returns exactly one
    /// slot to the resized pool, capped at the new capacity.
    pub fn set_capacity(&self, capacity: usize) {
        let mut count = self.count.lock();
        count.capacity = capacity;
        count.free = capacity;
    }

    /// Number of slots currently free.
    pub fn free(&self) -> usize {
        self.count.lock().free
    }

    /// Total slot capacity.
    pub fn capacity(&self) -> usize {
        self.count.lock().capacity
    }

    fn release(&self) {
        let mut count = self.count.lock();
        if count.free < count.capacity {
            count.free += 1;
        }
    }
}

/// One claimed operation slot. Returns itself to the pool exactly once,
/// on explicit release or on drop.
#[derive(Debug)]
pub struct ClaimedSlot {
    pool: Arc<SlotPool>,
    held: bool,
}

impl ClaimedSlot {
    pub(crate) fn release(&mut self) {
        if self.held {
            self.held = false;
            self.pool.release();
        }
    }
}

impl Drop for ClaimedSlot {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_are_bounded_by_capacity() {
        let pool = SlotPool::new(2);
        let first = pool.claim();
        let second = pool.claim();
        assert!(first.is_some());
        assert!(second.is_some());
        assert!(pool.claim().is_none());
        assert_eq!(pool.free(), 0);
    }

    #[test]
    fn test_release_frees_exactly_one_slot() {
        let pool = SlotPool::new(1);
        let slot = pool.claim();
        assert!(pool.claim().is_none());
        drop(slot);
        assert_eq!(pool.free(), 1);
        assert!(pool.claim().is_some());
    }

    #[test]
    fn test_release_is_idempotent() {
        let pool = SlotPool::new(3);
        let mut slot = pool.claim().unwrap();
        slot.release();
        slot.release();
        drop(slot);
        assert_eq!(pool.free(), 3);
    }

    #[test]
    fn test_set_capacity_resets_the_free_count() {
        let pool = SlotPool::new(4);
        let _held = pool.claim().unwrap();
        pool.set_capacity(2);
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.free(), 2);
    }

    #[test]
    fn test_release_never_exceeds_capacity() {
        let pool = SlotPool::new(4);
        let held = pool.claim().unwrap();
        pool.set_capacity(2);
        drop(held);
        assert_eq!(pool.free(), 2);
    }
}
