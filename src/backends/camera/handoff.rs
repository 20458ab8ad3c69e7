// SPDX-License-Identifier: GPL-3.0-only

//! Latest-wins frame handoff between a capture thread and its consumer
//!
//! The producer never waits: `push` overwrites the slot at the write cursor
//! and marks it unread. The consumer only ever sees the newest frame, and
//! sees it at most once.

use std::sync::{Mutex, PoisonError};

struct RingState<T> {
    slots: Vec<Option<T>>,
    /// Slot the next push writes to
    write: usize,
    /// Slot holding the newest unread item, if any
    unread: Option<usize>,
}

/// Fixed-capacity latest-wins buffer
pub struct FrameRing<T> {
    state: Mutex<RingState<T>>,
    capacity: usize,
}

impl<T> FrameRing<T> {
    /// Create a ring with `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            state: Mutex::new(RingState {
                slots,
                write: 0,
                unread: None,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store `item` as the newest entry; never blocks on the consumer
    pub fn push(&self, item: T) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let index = state.write;
        state.slots[index] = Some(item);
        state.unread = Some(index);
        state.write = (index + 1) % self.capacity;
    }

    /// Take the newest item if it has not been taken yet
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let index = state.unread.take()?;
        state.slots[index].take()
    }

    /// Whether an unread item is waiting
    pub fn has_unread(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unread
            .is_some()
    }

    /// Drop every stored item
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.slots.iter_mut().for_each(|slot| *slot = None);
        state.unread = None;
        state.write = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_pop_returns_latest() {
        let ring = FrameRing::new(3);
        ring.push(1);
        ring.push(2);
        ring.push(3);
        ring.push(4);
        assert_eq!(ring.pop(), Some(4));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_empty_ring() {
        let ring: FrameRing<u32> = FrameRing::new(2);
        assert_eq!(ring.pop(), None);
        assert!(!ring.has_unread());
    }

    #[test]
    fn test_zero_capacity_is_one_slot() {
        let ring = FrameRing::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push("a");
        ring.push("b");
        assert_eq!(ring.pop(), Some("b"));
    }

    #[test]
    fn test_clear_discards_unread() {
        let ring = FrameRing::new(4);
        ring.push(7);
        ring.clear();
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_concurrent_push_never_goes_backwards() {
        let ring = Arc::new(FrameRing::new(4));
        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for i in 1..=10_000u32 {
                    ring.push(i);
                }
            })
        };

        let mut last = 0;
        while !producer.is_finished() {
            if let Some(value) = ring.pop() {
                assert!(value > last, "got {} after {}", value, last);
                last = value;
            }
        }
        producer.join().unwrap();
        if let Some(value) = ring.pop() {
            assert!(value > last);
            last = value;
        }
        assert_eq!(last, 10_000);
    }
}
