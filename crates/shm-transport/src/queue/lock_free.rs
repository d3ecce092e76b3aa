use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytemuck::Zeroable;

use super::{CacheLine, MessageQueue, Slot, check_capacity};
use crate::error::{Result, TransportError};
use crate::futex::{EventCount, WAIT_SLICE};
use crate::spin::SpinWait;

const UNPUBLISHED: u32 = 0;
const PUBLISHED: u32 = 1;

/// Cursor and wait words of a [`LockFreeQueue`].
#[repr(C)]
pub struct RingHeader {
    capacity: u64,
    mask: u64,
    head: CacheLine<AtomicU64>,
    tail: CacheLine<AtomicU64>,
    space: CacheLine<EventCount>,
    data: CacheLine<EventCount>,
}

// SAFETY: all fields are integers or atomics.
unsafe impl Zeroable for RingHeader {}

impl RingHeader {
    pub fn new(capacity: usize) -> Result<Self> {
        check_capacity(capacity)?;
        Ok(RingHeader {
            capacity: capacity as u64,
            mask: capacity as u64 - 1,
            head: CacheLine(AtomicU64::new(0)),
            tail: CacheLine(AtomicU64::new(0)),
            space: CacheLine(EventCount::new()),
            data: CacheLine(EventCount::new()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }
}

/// Multi-producer, single-consumer ring without locks.
///
/// Producers claim a slot by advancing `head` with a CAS, write the payload,
/// then set the slot's publish flag with Release ordering. The consumer reads
/// a slot only after an Acquire load of that flag, so a slot that has been
/// claimed but not yet written reads as "not yet available" and is retried
/// later. Because the counters never wrap in practice, a stale `head` value
/// can never match a recycled one.
pub struct LockFreeQueue<'a, T> {
    header: &'a RingHeader,
    slots: &'a [Slot<T>],
}

impl<'a, T: Copy + Zeroable> LockFreeQueue<'a, T> {
    /// Binds a header to its slot array.
    pub fn new(header: &'a RingHeader, slots: &'a [Slot<T>]) -> Result<Self> {
        check_capacity(header.capacity())?;
        if slots.len() != header.capacity() {
            return Err(TransportError::InvalidCapacity(slots.len()));
        }
        Ok(LockFreeQueue { header, slots })
    }

    #[inline]
    fn slot(&self, counter: u64) -> &Slot<T> {
        &self.slots[(counter & self.header.mask) as usize]
    }

    /// Returns `true` if the oldest unread slot has been published.
    fn front_ready(&self) -> bool {
        let tail = self.header.tail.0.load(Ordering::Relaxed);
        let head = self.header.head.0.load(Ordering::Acquire);
        tail != head && self.slot(tail).published.load(Ordering::Acquire) == PUBLISHED
    }

    fn is_full(&self) -> bool {
        let tail = self.header.tail.0.load(Ordering::Acquire);
        let head = self.header.head.0.load(Ordering::Acquire);
        head.wrapping_sub(tail) + 1 >= self.header.capacity
    }

    /// Reads a published slot, clears it, and returns the payload.
    ///
    /// # Safety
    ///
    /// The caller is the single consumer and has observed the slot's
    /// publish flag set.
    #[inline]
    unsafe fn take(&self, slot: &Slot<T>) -> T {
        let value = unsafe { slot.value.get().read() };
        slot.published.store(UNPUBLISHED, Ordering::Relaxed);
        value
    }
}

impl<T: Copy + Zeroable> MessageQueue<T> for LockFreeQueue<'_, T> {
    fn try_push(&self, item: T) -> bool {
        let header = self.header;
        let claimed = loop {
            let tail = header.tail.0.load(Ordering::Acquire);
            let head = header.head.0.load(Ordering::Acquire);
            if head.wrapping_sub(tail) + 1 >= header.capacity {
                return false;
            }
            if header
                .head
                .0
                .compare_exchange_weak(head, head + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                break head;
            }
        };

        let slot = self.slot(claimed);
        // SAFETY: the CAS gave this producer exclusive ownership of the slot,
        // and the consumer released it (flag cleared before `tail` moved past
        // it) before the capacity check above could succeed.
        unsafe { slot.value.get().write(item) };
        slot.published.store(PUBLISHED, Ordering::Release);
        header.data.0.notify_all();
        true
    }

    fn push_unless(&self, item: T, cancelled: &dyn Fn() -> bool) -> bool {
        let mut spin = SpinWait::new();
        loop {
            if self.try_push(item) {
                return true;
            }
            if !spin.spin() {
                if cancelled() {
                    return false;
                }
                self.header
                    .space
                    .0
                    .wait_unless(WAIT_SLICE, || !self.is_full());
            }
        }
    }

    fn pop(&self) -> Option<T> {
        let header = self.header;
        let tail = header.tail.0.load(Ordering::Relaxed);
        let head = header.head.0.load(Ordering::Acquire);
        if tail == head {
            return None;
        }

        let slot = self.slot(tail);
        if slot.published.load(Ordering::Acquire) != PUBLISHED {
            return None;
        }
        // SAFETY: single consumer, flag observed with Acquire.
        let value = unsafe { self.take(slot) };
        header.tail.0.store(tail + 1, Ordering::Release);
        header.space.0.notify_all();
        Some(value)
    }

    fn pop_all(&self) -> Vec<T> {
        let header = self.header;
        let tail = header.tail.0.load(Ordering::Relaxed);
        let head = header.head.0.load(Ordering::Acquire);

        let ready = (tail..head)
            .take_while(|&c| self.slot(c).published.load(Ordering::Acquire) == PUBLISHED)
            .count();
        if ready == 0 {
            return Vec::new();
        }

        let start = (tail & header.mask) as usize;
        let first = ready.min(self.slots.len() - start);
        let (wrapped, _) = self.slots.split_at(ready - first);
        let mut out = Vec::with_capacity(ready);
        for slot in self.slots[start..start + first].iter().chain(wrapped) {
            // SAFETY: single consumer; every slot in the run was observed
            // published above.
            out.push(unsafe { self.take(slot) });
        }

        header.tail.0.store(tail + ready as u64, Ordering::Release);
        header.space.0.notify_all();
        out
    }

    fn len(&self) -> usize {
        let tail = self.header.tail.0.load(Ordering::Acquire);
        let head = self.header.head.0.load(Ordering::Acquire);
        head.saturating_sub(tail) as usize
    }

    fn capacity(&self) -> usize {
        self.header.capacity()
    }

    fn wait_for_data(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.front_ready() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.header
                .data
                .0
                .wait_unless((deadline - now).min(WAIT_SLICE), || self.front_ready());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_new_rejects_bad_capacity() {
        assert!(matches!(RingHeader::new(6), Err(TransportError::InvalidCapacity(6))));
        let header = RingHeader::new(8).unwrap();
        let slots = Slot::<u32>::array(4);
        assert!(LockFreeQueue::new(&header, &slots).is_err());
    }

    #[test]
    fn test_fifo_and_full() {
        let header = RingHeader::new(4).unwrap();
        let slots = Slot::<u32>::array(4);
        let queue = LockFreeQueue::new(&header, &slots).unwrap();

        assert!(queue.is_empty());
        assert!(queue.try_push(1));
        assert!(queue.try_push(2));
        assert!(queue.try_push(3));
        assert!(!queue.try_push(4));
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop(), Some(1));
        assert!(queue.try_push(4));
        assert_eq!(queue.pop_all(), vec![2, 3, 4]);
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_all_across_wraparound() {
        let header = RingHeader::new(8).unwrap();
        let slots = Slot::<u64>::array(8);
        let queue = LockFreeQueue::new(&header, &slots).unwrap();

        for round in 0..5u64 {
            for i in 0..6 {
                assert!(queue.try_push(round * 10 + i));
            }
            let expected: Vec<u64> = (0..6).map(|i| round * 10 + i).collect();
            assert_eq!(queue.pop_all(), expected);
        }
    }

    #[test]
    fn test_unpublished_slot_is_not_consumed() {
        let header = RingHeader::new(4).unwrap();
        let slots = Slot::<u32>::array(4);
        let queue = LockFreeQueue::new(&header, &slots).unwrap();

        // Claim a slot without publishing it, as a producer stalled between
        // the CAS and the flag store would.
        header.head.0.store(1, Ordering::SeqCst);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop(), None);
        assert!(queue.pop_all().is_empty());
        assert!(!queue.wait_for_data(Duration::from_millis(10)));

        unsafe { slots[0].value.get().write(9) };
        slots[0].published.store(PUBLISHED, Ordering::Release);
        assert!(queue.wait_for_data(Duration::from_millis(10)));
        assert_eq!(queue.pop(), Some(9));
    }

    #[test]
    fn test_concurrent_producers_preserve_order() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 20_000;

        let header = RingHeader::new(16).unwrap();
        let slots = Slot::<u64>::array(16);
        let queue = LockFreeQueue::new(&header, &slots).unwrap();

        let received = std::thread::scope(|s| {
            for p in 0..PRODUCERS {
                let queue = &queue;
                s.spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.push(p << 32 | i);
                    }
                });
            }

            let mut received = Vec::new();
            while received.len() < (PRODUCERS * PER_PRODUCER) as usize {
                if queue.wait_for_data(Duration::from_millis(100)) {
                    received.extend(queue.pop_all());
                }
            }
            received
        });

        let mut next: HashMap<u64, u64> = HashMap::new();
        for value in received {
            let (producer, seq) = (value >> 32, value & 0xFFFF_FFFF);
            let expected = next.entry(producer).or_insert(0);
            assert_eq!(seq, *expected, "producer {producer} out of order");
            *expected += 1;
        }
        assert!(next.values().all(|&n| n == PER_PRODUCER));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_unless_gives_up() {
        let header = RingHeader::new(2).unwrap();
        let slots = Slot::<u32>::array(2);
        let queue = LockFreeQueue::new(&header, &slots).unwrap();
        assert!(queue.try_push(1));
        assert!(!queue.push_unless(2, &|| true));
        assert_eq!(queue.pop(), Some(1));
    }
}
