use std::hint::spin_loop;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

use lock_api::{GuardSend, RawMutex};
use tracing::warn;

/// Mutex over a process-shared spin lock.
///
/// The lock word holds the pid of the owning process, so it works unchanged
/// when the mutex is placed in a shared-memory mapping, and a lock left
/// behind by a process that died while holding it can be taken over.
pub type SpinMutex<T> = lock_api::Mutex<RawSpinLock, T>;

/// Guard returned by [`SpinMutex::lock`].
pub type SpinMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;

const UNLOCKED: u32 = 0;

/// Contended spins between two liveness checks of the owner.
const OWNER_CHECK_INTERVAL: u32 = 1 << 12;

/// Spin lock whose word is `0` when free and the owner's pid when held.
///
/// Threads of one process share a pid, so the word identifies the owning
/// process, not the thread. Recovery only ever replaces a pid whose process
/// no longer runs.
#[repr(C, align(64))]
pub struct RawSpinLock {
    owner: AtomicU32,
}

unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinLock {
        owner: AtomicU32::new(UNLOCKED),
    };

    type GuardMarker = GuardSend;

    #[inline]
    fn lock(&self) {
        if !self.try_lock() {
            self.lock_contended();
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.owner
            .compare_exchange(UNLOCKED, current_pid(), Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.owner.store(UNLOCKED, Ordering::Release);
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.owner.load(Ordering::Relaxed) != UNLOCKED
    }
}

impl RawSpinLock {
    /// Pid of the process holding the lock.
    pub fn owner(&self) -> Option<u32> {
        match self.owner.load(Ordering::Relaxed) {
            UNLOCKED => None,
            pid => Some(pid),
        }
    }

    /// Marks the lock as held by `pid`.
    #[cfg(test)]
    pub(crate) fn force_owner(&self, pid: u32) {
        self.owner.store(pid, Ordering::Release);
    }

    #[cold]
    fn lock_contended(&self) {
        let pid = current_pid();
        let mut backoff = 0u32;
        let mut spins = 0u32;

        loop {
            let holder = self.owner.load(Ordering::Relaxed);
            if holder == UNLOCKED {
                if self
                    .owner
                    .compare_exchange_weak(UNLOCKED, pid, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return;
                }
                continue;
            }

            for _ in 0..1u32 << backoff {
                spin_loop();
            }
            backoff = (backoff + 1).min(6);
            spins = spins.wrapping_add(1);

            if spins % OWNER_CHECK_INTERVAL == 0 {
                if holder != pid && !process_alive(holder) && self.take_over(holder, pid) {
                    return;
                }
                std::thread::yield_now();
                backoff = 0;
            }
        }
    }

    /// Replaces a dead owner with `pid`. Fails if the word changed meanwhile.
    fn take_over(&self, dead: u32, pid: u32) -> bool {
        let taken = self
            .owner
            .compare_exchange(dead, pid, Ordering::Acquire, Ordering::Relaxed)
            .is_ok();
        if taken {
            warn!(dead, "recovered spin lock from an exited process");
        }
        taken
    }
}

#[inline]
fn current_pid() -> u32 {
    std::process::id()
}

/// Returns `false` once `pid` has exited, including while it waits to be
/// reaped.
fn process_alive(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 only checks for existence and permission.
    if unsafe { libc::kill(raw, 0) } != 0 {
        return io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH);
    }
    !is_zombie(pid)
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    // The state follows the parenthesised command name, which may itself
    // contain spaces or parentheses.
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            let rest = &stat[stat.rfind(')')? + 1..];
            rest.split_whitespace().next().map(|state| matches!(state, "Z" | "X"))
        })
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: u32) -> bool {
    false
}

/// Bounded spin-then-yield helper for waits that escape to a blocking call.
///
/// Each call to [`SpinWait::spin`] burns an exponentially growing number of
/// `spin_loop` hints, then yields the thread. Once the budget is spent it
/// returns `false` and the caller should block instead.
#[derive(Debug, Default)]
pub struct SpinWait {
    counter: u32,
}

impl SpinWait {
    const SPIN_ROUNDS: u32 = 6;
    const YIELD_ROUNDS: u32 = 10;

    pub const fn new() -> Self {
        SpinWait { counter: 0 }
    }

    /// Spins once. Returns `false` when the caller should block.
    #[inline]
    pub fn spin(&mut self) -> bool {
        if self.counter >= Self::YIELD_ROUNDS {
            return false;
        }
        self.counter += 1;
        if self.counter <= Self::SPIN_ROUNDS {
            for _ in 0..1u32 << self.counter {
                spin_loop();
            }
        } else {
            std::thread::yield_now();
        }
        true
    }

    #[inline]
    pub fn reset(&mut self) {
        self.counter = 0;
    }
}
