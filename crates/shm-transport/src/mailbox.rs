//! Single-slot response mailboxes, one per worker.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use bytemuck::Zeroable;

use crate::futex::{self, WAIT_SLICE};

const EMPTY: u32 = 0;
const FULL: u32 = 1;

/// A one-value mailbox carrying a move code from the agent to a worker.
///
/// The agent is the only writer of `FULL` and the worker the only writer of
/// `EMPTY`, so a put never overwrites an unread value and a take never sees
/// a half-written one.
#[repr(C)]
#[derive(Debug, Default)]
pub struct ResponseCell {
    ready: AtomicU32,
    mv: AtomicU8,
}

// SAFETY: zero is an empty cell.
unsafe impl Zeroable for ResponseCell {}

impl ResponseCell {
    pub const fn new() -> Self {
        ResponseCell {
            ready: AtomicU32::new(EMPTY),
            mv: AtomicU8::new(0),
        }
    }

    /// Returns `true` while a value is waiting to be taken.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.ready.load(Ordering::Acquire) == FULL
    }

    /// Stores `mv` if the cell is empty. Returns `false` if it is full.
    pub fn try_put(&self, mv: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.mv.store(mv, Ordering::Relaxed);
        self.ready.store(FULL, Ordering::Release);
        futex::wake_all(&self.ready);
        true
    }

    /// Stores `mv`, waiting up to `timeout` for the worker to empty the cell.
    pub fn put_timeout(&self, mv: u8, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_put(mv) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            futex::wait(&self.ready, FULL, (deadline - now).min(WAIT_SLICE));
        }
    }

    /// Takes the value if one is present.
    pub fn try_take(&self) -> Option<u8> {
        if !self.is_full() {
            return None;
        }
        let mv = self.mv.load(Ordering::Relaxed);
        self.ready.store(EMPTY, Ordering::Release);
        futex::wake_all(&self.ready);
        Some(mv)
    }

    /// Takes the next value, spinning `spin_limit` times before sleeping.
    ///
    /// Returns `None` once `cancelled` reports `true`; it is polled between
    /// sleeps of at most [`WAIT_SLICE`].
    pub fn take_unless(&self, spin_limit: u32, cancelled: impl Fn() -> bool) -> Option<u8> {
        for _ in 0..spin_limit {
            if let Some(mv) = self.try_take() {
                return Some(mv);
            }
            std::hint::spin_loop();
        }
        loop {
            if let Some(mv) = self.try_take() {
                return Some(mv);
            }
            if cancelled() {
                return None;
            }
            futex::wait(&self.ready, EMPTY, WAIT_SLICE);
        }
    }

    /// Empties the cell, discarding any unread value.
    pub fn clear(&self) {
        self.ready.store(EMPTY, Ordering::Release);
        futex::wake_all(&self.ready);
    }
}
