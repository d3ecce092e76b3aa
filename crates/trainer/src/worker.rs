//! One simulated game attached to the shared segment.

use std::fmt;

use anyhow::{Context, Result, bail};
use game_core::simulator::{Simulator, StepOutcome};
use shm_transport::{CheckIn, MessageQueue, ResponseCell, Segment, WaitOutcome};
use tracing::{debug, info};

use crate::shared::SharedState;
use crate::signals::TerminationMask;

/// Spins on the mailbox before falling back to a futex wait.
const MAILBOX_SPIN_LIMIT: u32 = 1_000;

/// Lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Attaching,
    AwaitingBarrier,
    Running,
    Terminated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Attaching => "attaching",
            WorkerState::AwaitingBarrier => "awaiting barrier",
            WorkerState::Running => "running",
            WorkerState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

pub struct Worker<'a> {
    id: u8,
    state: WorkerState,
    shared: SharedState<'a>,
    mailbox: &'a ResponseCell,
    simulator: Simulator<'a>,
    steps: u64,
}

impl<'a> Worker<'a> {
    /// Resolves the shared structures and prepares the game.
    ///
    /// Fails if a structure is missing, a layout does not match, or the id is
    /// outside the manager's process count. The worker's mailbox is cleared
    /// so a move addressed to a dead predecessor with the same id is not
    /// applied to the new game.
    pub fn attach(id: u8, seed: u32, segment: &'a Segment) -> Result<Self> {
        debug!(id, state = %WorkerState::Attaching, "worker state");
        let shared = SharedState::resolve(segment).with_context(|| {
            format!("worker {id}: failed to resolve segment `{}`", segment.name())
        })?;
        let mailbox = shared.cell(id as usize)?;
        mailbox.clear();

        let simulator = Simulator::new(id, seed, shared.table);
        Ok(Worker {
            id,
            state: WorkerState::Attaching,
            shared,
            mailbox,
            simulator,
            steps: 0,
        })
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Moves applied so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn simulator(&self) -> &Simulator<'a> {
        &self.simulator
    }

    fn transition(&mut self, state: WorkerState) {
        debug!(id = self.id, from = %self.state, to = %state, "worker state");
        self.state = state;
    }

    /// Passes the three-phase barrier.
    ///
    /// Returns `false` if shutdown was requested while waiting.
    pub fn await_barrier(&mut self) -> Result<bool> {
        if self.state != WorkerState::Attaching {
            bail!("worker {} cannot enter the barrier while {}", self.id, self.state);
        }
        self.transition(WorkerState::AwaitingBarrier);
        let control = self.shared.control;

        if control.wait_manager_ready(None) == WaitOutcome::Shutdown {
            self.transition(WorkerState::Terminated);
            return Ok(false);
        }

        match control.signal_worker_ready(self.id as usize)? {
            CheckIn::Last => info!(id = self.id, "last worker ready"),
            CheckIn::Remaining(n) => debug!(id = self.id, remaining = n, "worker ready"),
            CheckIn::Repeated => info!(id = self.id, "already checked in, rejoining"),
        }

        if control.wait_agent_attached(None) == WaitOutcome::Shutdown {
            self.transition(WorkerState::Terminated);
            return Ok(false);
        }

        self.transition(WorkerState::Running);
        Ok(true)
    }

    /// Runs the publish / wait / apply loop.
    ///
    /// Stops after `max_steps` moves when given, or when shutdown is
    /// requested. Returns the number of moves applied by this call.
    pub fn run(&mut self, max_steps: Option<u64>) -> Result<u64> {
        if self.state != WorkerState::Running {
            bail!("worker {} cannot run while {}", self.id, self.state);
        }
        let control = self.shared.control;
        let cancelled = || control.is_shutdown();
        let mut applied = 0;

        while max_steps.is_none_or(|max| applied < max) {
            let message = self.simulator.message();
            let published = {
                let _mask = TerminationMask::block().context("failed to mask termination signals")?;
                self.shared.queue.push_unless(message, &cancelled)
            };
            if !published {
                break;
            }

            let Some(code) = self.mailbox.take_unless(MAILBOX_SPIN_LIMIT, cancelled) else {
                break;
            };
            control.note_move_consumed();

            match self.simulator.apply(code) {
                StepOutcome::Reset => debug!(id = self.id, "episode reset"),
                StepOutcome::GameOver => debug!(
                    id = self.id,
                    code,
                    score = self.simulator.score(),
                    "game over"
                ),
                StepOutcome::Moved { .. } => {}
            }
            applied += 1;
            self.steps += 1;
        }

        if control.is_shutdown() {
            self.transition(WorkerState::Terminated);
        }
        Ok(applied)
    }
}
