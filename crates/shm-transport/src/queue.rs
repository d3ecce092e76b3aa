//! Fixed-capacity message queues over caller-provided slot arrays.
//!
//! Both variants keep `head` and `tail` as monotonically increasing 64-bit
//! counters and index slots with `counter & (capacity - 1)`. A queue is full
//! when `head + 1 - tail == capacity`, so at most `capacity - 1` messages are
//! in flight. Many producers may push concurrently; there must be a single
//! consumer.
//!
//! The header and the slot array are plain structures that can be placed in
//! a shared-memory segment or on the heap; the queue types borrow both.

use std::cell::UnsafeCell;
use std::sync::atomic::AtomicU32;
use std::time::Duration;

use bytemuck::Zeroable;

use crate::error::{Result, TransportError};

pub mod blocking;
pub mod lock_free;

pub use blocking::{BlockingHeader, BlockingQueue};
pub use lock_free::{LockFreeQueue, RingHeader};

/// Operations shared by both queue variants.
pub trait MessageQueue<T: Copy> {
    /// Enqueues `item` unless the queue is full.
    fn try_push(&self, item: T) -> bool;

    /// Enqueues `item`, waiting for space until `cancelled` returns `true`.
    ///
    /// Returns `false` if the push was abandoned.
    fn push_unless(&self, item: T, cancelled: &dyn Fn() -> bool) -> bool;

    /// Enqueues `item`, waiting for space as long as it takes.
    fn push(&self, item: T) {
        self.push_unless(item, &|| false);
    }

    /// Dequeues the oldest available message.
    fn pop(&self) -> Option<T>;

    /// Dequeues every message currently available, oldest first.
    fn pop_all(&self) -> Vec<T>;

    /// Number of claimed slots not yet consumed.
    fn len(&self) -> usize;

    /// Number of slots, one more than the maximum number of queued messages.
    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until a message is available or `timeout` passes.
    fn wait_for_data(&self, timeout: Duration) -> bool;
}

/// Checks that `capacity` is a power of two and at least 2.
pub fn check_capacity(capacity: usize) -> Result<()> {
    if capacity >= 2 && capacity.is_power_of_two() {
        Ok(())
    } else {
        Err(TransportError::InvalidCapacity(capacity))
    }
}

/// Smallest valid capacity that holds one message per producer plus the
/// always-empty slot.
pub fn capacity_for(producers: usize) -> usize {
    (producers + 1).next_power_of_two().max(2)
}

/// One queue cell: a publish flag followed by the payload.
#[repr(C)]
pub struct Slot<T> {
    pub(crate) published: AtomicU32,
    pub(crate) value: UnsafeCell<T>,
}

// SAFETY: an all-zero slot is unpublished and holds a zeroed `T`.
unsafe impl<T: Zeroable> Zeroable for Slot<T> {}

// SAFETY: the payload is written only by the producer that claimed the slot
// and read only by the consumer after the publish flag (or the queue lock)
// orders the two.
unsafe impl<T: Send> Sync for Slot<T> {}

impl<T: Zeroable> Slot<T> {
    pub fn empty() -> Self {
        Slot {
            published: AtomicU32::new(0),
            value: UnsafeCell::new(T::zeroed()),
        }
    }

    /// Heap-allocates `capacity` empty slots.
    pub fn array(capacity: usize) -> Vec<Slot<T>> {
        (0..capacity).map(|_| Slot::empty()).collect()
    }
}

/// Pads its contents to a cache line.
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub(crate) struct CacheLine<T>(pub(crate) T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_capacity() {
        assert!(check_capacity(2).is_ok());
        assert!(check_capacity(1024).is_ok());
        assert!(matches!(check_capacity(0), Err(TransportError::InvalidCapacity(0))));
        assert!(check_capacity(1).is_err());
        assert!(check_capacity(12).is_err());
    }

    #[test]
    fn test_capacity_for() {
        assert_eq!(capacity_for(0), 2);
        assert_eq!(capacity_for(1), 2);
        assert_eq!(capacity_for(3), 4);
        assert_eq!(capacity_for(4), 8);
        assert_eq!(capacity_for(8), 16);
    }

    #[test]
    fn test_slot_layout() {
        assert_eq!(std::mem::size_of::<Slot<u32>>(), 8);
        assert_eq!(std::mem::align_of::<Slot<u64>>(), 8);
    }
}
