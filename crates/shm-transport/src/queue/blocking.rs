use std::time::{Duration, Instant};

use bytemuck::Zeroable;

use super::{MessageQueue, Slot, check_capacity};
use crate::condvar::SharedCondvar;
use crate::error::{Result, TransportError};
use crate::futex::WAIT_SLICE;
use crate::spin::{SpinMutex, SpinMutexGuard};

#[derive(Debug, Default, Clone, Copy)]
struct Cursor {
    head: u64,
    tail: u64,
}

/// Lock, cursor and conditions of a [`BlockingQueue`].
#[repr(C)]
pub struct BlockingHeader {
    capacity: u64,
    mask: u64,
    cursor: SpinMutex<Cursor>,
    not_full: SharedCondvar,
    not_empty: SharedCondvar,
}

// SAFETY: zero is an unlocked mutex over a zero cursor, and idle conditions.
unsafe impl Zeroable for BlockingHeader {}

impl BlockingHeader {
    pub fn new(capacity: usize) -> Result<Self> {
        check_capacity(capacity)?;
        Ok(BlockingHeader {
            capacity: capacity as u64,
            mask: capacity as u64 - 1,
            cursor: SpinMutex::new(Cursor::default()),
            not_full: SharedCondvar::new(),
            not_empty: SharedCondvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    fn is_full(&self, cursor: &Cursor) -> bool {
        cursor.head - cursor.tail + 1 >= self.capacity
    }
}

/// Mutex-and-condition ring buffer.
///
/// Every operation takes the header lock. Producers sleep on `not_full`
/// while the ring is full; the consumer signals it after every successful
/// pop and sleeps on `not_empty` in [`MessageQueue::wait_for_data`].
pub struct BlockingQueue<'a, T> {
    header: &'a BlockingHeader,
    slots: &'a [Slot<T>],
}

impl<'a, T: Copy + Zeroable> BlockingQueue<'a, T> {
    /// Binds a header to its slot array.
    pub fn new(header: &'a BlockingHeader, slots: &'a [Slot<T>]) -> Result<Self> {
        check_capacity(header.capacity())?;
        if slots.len() != header.capacity() {
            return Err(TransportError::InvalidCapacity(slots.len()));
        }
        Ok(BlockingQueue { header, slots })
    }

    fn write(&self, cursor: &mut SpinMutexGuard<'_, Cursor>, item: T) {
        let slot = &self.slots[(cursor.head & self.header.mask) as usize];
        // SAFETY: the slot is outside the unread range and the lock is held.
        unsafe { slot.value.get().write(item) };
        cursor.head += 1;
    }

    fn read(&self, counter: u64) -> T {
        let slot = &self.slots[(counter & self.header.mask) as usize];
        // SAFETY: the slot is inside the unread range and the lock is held.
        unsafe { slot.value.get().read() }
    }
}

impl<T: Copy + Zeroable> MessageQueue<T> for BlockingQueue<'_, T> {
    fn try_push(&self, item: T) -> bool {
        let mut cursor = self.header.cursor.lock();
        if self.header.is_full(&cursor) {
            return false;
        }
        self.write(&mut cursor, item);
        drop(cursor);
        self.header.not_empty.notify_all();
        true
    }

    fn push_unless(&self, item: T, cancelled: &dyn Fn() -> bool) -> bool {
        let mut cursor = self.header.cursor.lock();
        while self.header.is_full(&cursor) {
            if cancelled() {
                return false;
            }
            self.header.not_full.wait_for(&mut cursor, WAIT_SLICE);
        }
        self.write(&mut cursor, item);
        drop(cursor);
        self.header.not_empty.notify_all();
        true
    }

    fn pop(&self) -> Option<T> {
        let mut cursor = self.header.cursor.lock();
        if cursor.head == cursor.tail {
            return None;
        }
        let value = self.read(cursor.tail);
        cursor.tail += 1;
        drop(cursor);
        self.header.not_full.notify_all();
        Some(value)
    }

    fn pop_all(&self) -> Vec<T> {
        let mut cursor = self.header.cursor.lock();
        let out: Vec<T> = (cursor.tail..cursor.head).map(|c| self.read(c)).collect();
        cursor.tail = cursor.head;
        drop(cursor);
        if !out.is_empty() {
            self.header.not_full.notify_all();
        }
        out
    }

    fn len(&self) -> usize {
        let cursor = self.header.cursor.lock();
        (cursor.head - cursor.tail) as usize
    }

    fn capacity(&self) -> usize {
        self.header.capacity()
    }

    fn wait_for_data(&self, timeout: Duration) -> bool {
        let mut cursor = self.header.cursor.lock();
        self.header
            .not_empty
            .wait_until(&mut cursor, Some(Instant::now() + timeout), |c| c.head != c.tail)
    }
}
