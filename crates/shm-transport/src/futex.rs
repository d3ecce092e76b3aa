//! Blocking waits on 32-bit words that may live in shared memory.
//!
//! On Linux these are non-private futex operations, so a waiter in one
//! process is woken by a waker in another as long as both map the same page.
//! Elsewhere a wait degrades to a short sleep and wakes are no-ops; callers
//! always re-check their condition, so only latency changes.

use std::sync::atomic::{AtomicU32, Ordering, fence};
use std::time::Duration;

/// Upper bound for a single blocking wait.
///
/// Every wait in this crate is sliced to at most this long and then
/// re-checks its condition, so a peer that died without waking still lets
/// the waiter observe shutdown.
pub const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Blocks while `*word == expected`, for at most `timeout`.
///
/// Returns on wake, timeout, signal, or immediately if the word already
/// differs. Spurious returns are possible.
#[cfg(target_os = "linux")]
pub fn wait(word: &AtomicU32, expected: u32, timeout: Duration) {
    let ts = libc::timespec {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as _,
    };
    // SAFETY: the pointer comes from a live AtomicU32 and the timespec
    // outlives the call. The result is ignored because every outcome
    // (woken, EAGAIN, ETIMEDOUT, EINTR) leads to a re-check by the caller.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            &ts as *const libc::timespec,
        );
    }
}

/// Wakes up to `count` waiters blocked on `word`.
#[cfg(target_os = "linux")]
pub fn wake(word: &AtomicU32, count: i32) {
    // SAFETY: FUTEX_WAKE only uses the address as a key.
    unsafe {
        libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, count);
    }
}

#[cfg(not(target_os = "linux"))]
pub fn wait(word: &AtomicU32, expected: u32, timeout: Duration) {
    if word.load(Ordering::Acquire) == expected {
        std::thread::sleep(timeout.min(Duration::from_millis(1)));
    }
}

#[cfg(not(target_os = "linux"))]
pub fn wake(_word: &AtomicU32, _count: i32) {}

/// Wakes every waiter blocked on `word`.
#[inline]
pub fn wake_all(word: &AtomicU32) {
    wake(word, i32::MAX);
}

/// Sequence word with a waiter count, for "something changed" notifications
/// that skip the wake syscall when nobody is blocked.
#[repr(C)]
#[derive(Debug, Default)]
pub struct EventCount {
    seq: AtomicU32,
    waiters: AtomicU32,
}

impl EventCount {
    pub const fn new() -> Self {
        EventCount {
            seq: AtomicU32::new(0),
            waiters: AtomicU32::new(0),
        }
    }

    /// Blocks for at most `timeout` unless `ready` already holds.
    ///
    /// `ready` is evaluated after the waiter has registered, so a
    /// notification that follows the state change it reports is never lost.
    pub fn wait_unless(&self, timeout: Duration, ready: impl FnOnce() -> bool) {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        let seq = self.seq.load(Ordering::SeqCst);
        if !ready() {
            wait(&self.seq, seq, timeout);
        }
        self.waiters.fetch_sub(1, Ordering::SeqCst);
    }

    /// Wakes all registered waiters. Cheap when there are none.
    #[inline]
    pub fn notify_all(&self) {
        fence(Ordering::SeqCst);
        if self.waiters.load(Ordering::SeqCst) > 0 {
            self.seq.fetch_add(1, Ordering::SeqCst);
            wake_all(&self.seq);
        }
    }

    /// Number of threads currently inside [`EventCount::wait_unless`].
    pub fn waiters(&self) -> u32 {
        self.waiters.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    #[test]
    fn test_wait_returns_when_value_differs() {
        let word = AtomicU32::new(1);
        let start = Instant::now();
        wait(&word, 0, Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_times_out() {
        let word = AtomicU32::new(0);
        let start = Instant::now();
        wait(&word, 0, Duration::from_millis(20));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_event_count_wakes_waiter() {
        let event = EventCount::new();
        let flag = AtomicBool::new(false);
        std::thread::scope(|s| {
            s.spawn(|| {
                while !flag.load(Ordering::Acquire) {
                    event.wait_unless(WAIT_SLICE, || flag.load(Ordering::Acquire));
                }
            });
            std::thread::sleep(Duration::from_millis(10));
            flag.store(true, Ordering::Release);
            event.notify_all();
        });
        assert_eq!(event.waiters(), 0);
    }

    #[test]
    fn test_event_count_skips_wait_when_ready() {
        let event = EventCount::new();
        let start = Instant::now();
        event.wait_unless(Duration::from_secs(5), || true);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
