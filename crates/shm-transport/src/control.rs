//! Readiness barrier and shutdown flag shared by the manager, the workers and
//! the agent.
//!
//! Phases complete in a fixed order:
//!
//! 1. the manager declares the segment ready,
//! 2. every worker checks in; the last one completes the phase,
//! 3. the agent announces itself.
//!
//! Shutdown forces the later phases complete so nobody stays blocked.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytemuck::Zeroable;
use tracing::debug;

use crate::condvar::SharedCondvar;
use crate::error::{Result, TransportError};
use crate::spin::SpinMutex;

/// Largest process count the check-in set can track.
pub const MAX_WORKERS: usize = 256;

const CHECK_IN_WORDS: usize = MAX_WORKERS / 64;

/// Phase flags, guarded by the control block's lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Phases {
    pub manager_ready: bool,
    pub workers_ready: bool,
    pub agent_attached: bool,
    pub shutdown: bool,
}

/// How a barrier wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    Shutdown,
    TimedOut,
}

/// Result of a worker checking in at the readiness barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckIn {
    /// This worker was the last one missing.
    Last,
    /// Workers that still have to check in.
    Remaining(u32),
    /// This worker id had already checked in, e.g. a respawned worker.
    Repeated,
}

/// Result of decrementing a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    /// This decrement brought the counter to zero.
    Last,
    /// The counter is still positive after this decrement.
    Remaining(u32),
    /// The counter was already zero and was left unchanged.
    AlreadyZero,
}

#[repr(C)]
pub struct ControlBlock {
    phases: SpinMutex<Phases>,
    cond: SharedCondvar,
    process_count: u32,
    shutdown: AtomicU32,
    checked_in: AtomicU32,
    check_ins: [AtomicU64; CHECK_IN_WORDS],
    remaining_moves: AtomicU32,
}

// SAFETY: zero is an unlocked mutex over cleared flags, zero counters and an
// empty check-in set.
unsafe impl Zeroable for ControlBlock {}

fn count_down(counter: &AtomicU32) -> Countdown {
    match counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1)) {
        Ok(1) => Countdown::Last,
        Ok(n) => Countdown::Remaining(n - 1),
        Err(_) => Countdown::AlreadyZero,
    }
}

impl ControlBlock {
    /// Creates a block for `process_count` workers, at most [`MAX_WORKERS`].
    pub fn new(process_count: u32) -> Self {
        ControlBlock {
            phases: SpinMutex::new(Phases {
                workers_ready: process_count == 0,
                ..Phases::default()
            }),
            cond: SharedCondvar::new(),
            process_count,
            shutdown: AtomicU32::new(0),
            checked_in: AtomicU32::new(0),
            check_ins: Default::default(),
            remaining_moves: AtomicU32::new(0),
        }
    }

    pub fn process_count(&self) -> u32 {
        self.process_count
    }

    /// Snapshot of the phase flags.
    pub fn phases(&self) -> Phases {
        *self.phases.lock()
    }

    /// Reads the shutdown flag without taking the lock.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire) != 0
    }

    pub fn declare_manager_ready(&self) {
        self.update(|p| p.manager_ready = true);
        debug!("manager ready");
    }

    pub fn wait_manager_ready(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.wait_phase(timeout, |p| p.manager_ready)
    }

    /// Checks worker `id` in.
    ///
    /// Each id counts once: a worker respawned under an id that already
    /// checked in gets [`CheckIn::Repeated`] and neither completes the barrier
    /// nor holds it back.
    pub fn signal_worker_ready(&self, id: usize) -> Result<CheckIn> {
        if id >= (self.process_count as usize).min(MAX_WORKERS) {
            return Err(TransportError::InvalidWorker {
                id,
                count: self.process_count as usize,
            });
        }
        let bit = 1u64 << (id % 64);
        if self.check_ins[id / 64].fetch_or(bit, Ordering::AcqRel) & bit != 0 {
            return Ok(CheckIn::Repeated);
        }

        let checked_in = self.checked_in.fetch_add(1, Ordering::AcqRel) + 1;
        if checked_in < self.process_count {
            return Ok(CheckIn::Remaining(self.process_count - checked_in));
        }
        self.update(|p| p.workers_ready = true);
        debug!("all workers ready");
        Ok(CheckIn::Last)
    }

    /// Returns `true` if worker `id` has checked in.
    pub fn has_checked_in(&self, id: usize) -> bool {
        id < (self.process_count as usize).min(MAX_WORKERS)
            && self.check_ins[id / 64].load(Ordering::Acquire) & (1u64 << (id % 64)) != 0
    }

    /// Workers that have not checked in yet.
    pub fn workers_waiting(&self) -> u32 {
        self.process_count - self.checked_in.load(Ordering::Acquire)
    }

    pub fn wait_workers_ready(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.wait_phase(timeout, |p| p.workers_ready)
    }

    pub fn mark_agent_attached(&self) {
        self.update(|p| p.agent_attached = true);
        debug!("agent attached");
    }

    pub fn wait_agent_attached(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.wait_phase(timeout, |p| p.agent_attached)
    }

    /// Sets the shutdown flag and releases every barrier wait.
    pub fn request_shutdown(&self) {
        self.shutdown.store(1, Ordering::Release);
        self.update(|p| {
            p.shutdown = true;
            p.workers_ready = true;
            p.agent_attached = true;
        });
        debug!("shutdown requested");
    }

    /// Starts a round in which `moves` mailbox reads are expected.
    pub fn arm_round(&self, moves: u32) {
        self.remaining_moves.store(moves, Ordering::Release);
    }

    /// Records that a worker took its move for the current round.
    pub fn note_move_consumed(&self) -> Countdown {
        let outcome = count_down(&self.remaining_moves);
        if outcome == Countdown::Last {
            // Touch the lock so a waiter between its check and its sleep
            // sees the notification.
            drop(self.phases.lock());
            self.cond.notify_all();
        }
        outcome
    }

    /// Moves of the current round not yet taken by a worker.
    pub fn moves_outstanding(&self) -> u32 {
        self.remaining_moves.load(Ordering::Acquire)
    }

    /// Waits until every move of the current round has been taken.
    pub fn wait_round_complete(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.wait_phase(timeout, |_| self.moves_outstanding() == 0)
    }

    fn update(&self, change: impl FnOnce(&mut Phases)) {
        let mut phases = self.phases.lock();
        change(&mut phases);
        drop(phases);
        self.cond.notify_all();
    }

    fn wait_phase(&self, timeout: Option<Duration>, ready: impl Fn(&Phases) -> bool) -> WaitOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut phases = self.phases.lock();
        let done = self
            .cond
            .wait_until(&mut phases, deadline, |p| p.shutdown || ready(p));
        if phases.shutdown {
            WaitOutcome::Shutdown
        } else if done {
            WaitOutcome::Ready
        } else {
            WaitOutcome::TimedOut
        }
    }
}
