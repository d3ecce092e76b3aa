//! Condition variable usable across processes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use lock_api::MutexGuard;

use crate::futex::{self, WAIT_SLICE};
use crate::spin::RawSpinLock;

/// A futex-backed condition variable paired with a [`SpinMutex`].
///
/// Waiters sample a sequence word while holding the lock, release the lock
/// and sleep until the word changes. Notifiers bump the word after changing
/// the guarded state, so a wakeup between unlock and sleep is not lost.
///
/// [`SpinMutex`]: crate::spin::SpinMutex
#[repr(C)]
#[derive(Debug, Default)]
pub struct SharedCondvar {
    seq: AtomicU32,
    waiters: AtomicU32,
}

impl SharedCondvar {
    pub const fn new() -> Self {
        SharedCondvar {
            seq: AtomicU32::new(0),
            waiters: AtomicU32::new(0),
        }
    }

    /// Releases the lock, sleeps for at most `timeout` or until notified,
    /// then re-acquires the lock. May return spuriously.
    pub fn wait_for<T>(&self, guard: &mut MutexGuard<'_, RawSpinLock, T>, timeout: Duration) {
        let seq = self.seq.load(Ordering::Acquire);
        self.waiters.fetch_add(1, Ordering::AcqRel);
        MutexGuard::unlocked(guard, || futex::wait(&self.seq, seq, timeout));
        self.waiters.fetch_sub(1, Ordering::AcqRel);
    }

    /// Waits until `done` returns `true` or `deadline` passes.
    ///
    /// `done` is evaluated under the lock before every sleep. Sleeps are
    /// sliced to [`WAIT_SLICE`]. Returns the last value of `done`.
    pub fn wait_until<T>(
        &self,
        guard: &mut MutexGuard<'_, RawSpinLock, T>,
        deadline: Option<Instant>,
        mut done: impl FnMut(&T) -> bool,
    ) -> bool {
        loop {
            if done(&**guard) {
                return true;
            }
            let slice = match deadline {
                None => WAIT_SLICE,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    (deadline - now).min(WAIT_SLICE)
                }
            };
            self.wait_for(guard, slice);
        }
    }

    /// Wakes every waiter.
    pub fn notify_all(&self) {
        self.seq.fetch_add(1, Ordering::Release);
        if self.waiters.load(Ordering::Acquire) > 0 {
            futex::wake_all(&self.seq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spin::SpinMutex;

    #[test]
    fn test_notify_releases_waiter() {
        let mutex = SpinMutex::new(false);
        let cond = SharedCondvar::new();
        std::thread::scope(|s| {
            let waiter = s.spawn(|| {
                let mut guard = mutex.lock();
                cond.wait_until(&mut guard, None, |ready| *ready)
            });
            std::thread::sleep(Duration::from_millis(10));
            *mutex.lock() = true;
            cond.notify_all();
            assert!(waiter.join().unwrap());
        });
    }

    #[test]
    fn test_wait_until_times_out() {
        let mutex = SpinMutex::new(0u32);
        let cond = SharedCondvar::new();
        let mut guard = mutex.lock();
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(!cond.wait_until(&mut guard, Some(deadline), |v| *v > 0));
        assert!(Instant::now() >= deadline);
    }
}
