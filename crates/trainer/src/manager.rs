//! Segment owner and worker supervisor.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};
use rand::Rng;
use shm_transport::{ControlBlock, OwnedSegment, WaitOutcome};
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::shared::{self, CONTROL_BLOCK, SharedState};

/// Creates the shared segment, spawns one worker process per game, drives
/// the readiness barrier and restarts workers that die.
///
/// Dropping the manager shuts every worker down and unlinks the segment.
pub struct Manager {
    config: ManagerConfig,
    worker_bin: PathBuf,
    base_seed: u32,
    segment: OwnedSegment,
    children: Vec<Child>,
    respawns: u64,
}

impl Manager {
    /// Removes any stale segment with the configured name, creates a new one
    /// and constructs every structure in it.
    pub fn create(config: ManagerConfig) -> Result<Self> {
        let worker_bin = config
            .worker_path()
            .context("failed to locate the worker executable")?;
        let size = shared::segment_size(config.processes, config.queue);
        let mut segment = OwnedSegment::create_fresh(&config.shm_name, size)
            .with_context(|| format!("failed to create segment `{}`", config.shm_name))?;
        shared::populate(&mut segment, config.processes, config.queue)
            .context("failed to construct shared structures")?;

        let base_seed = config.seed.unwrap_or_else(|| rand::rng().random());
        info!(
            name = %config.shm_name,
            size,
            processes = config.processes,
            worker = %worker_bin.display(),
            "shared memory ready"
        );

        Ok(Manager {
            config,
            worker_bin,
            base_seed,
            segment,
            children: Vec::new(),
            respawns: 0,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn segment(&self) -> &OwnedSegment {
        &self.segment
    }

    pub fn control(&self) -> Result<&ControlBlock> {
        Ok(self.segment.find_one::<ControlBlock>(CONTROL_BLOCK)?)
    }

    /// Resolves every structure, as a worker or the agent would.
    pub fn shared(&self) -> Result<SharedState<'_>> {
        Ok(SharedState::resolve(&self.segment)?)
    }

    /// Process ids of the current workers, indexed by worker id.
    pub fn worker_pids(&self) -> Vec<u32> {
        self.children.iter().map(Child::id).collect()
    }

    /// Number of workers restarted so far.
    pub fn respawns(&self) -> u64 {
        self.respawns
    }

    fn spawn_worker(&self, id: u8) -> Result<Child> {
        let mut command = Command::new(&self.worker_bin);
        command
            .arg(id.to_string())
            .arg("--shm-name")
            .arg(&self.config.shm_name)
            .arg("--seed")
            .arg(self.base_seed.wrapping_add(id as u32).to_string())
            .stdin(Stdio::null());
        if self.config.verbose {
            command.arg("--verbose");
        }
        command
            .spawn()
            .with_context(|| format!("failed to spawn worker {id} ({})", self.worker_bin.display()))
    }

    /// Spawns one worker per configured process.
    pub fn spawn_workers(&mut self) -> Result<()> {
        for id in 0..self.config.processes {
            let child = self.spawn_worker(id)?;
            debug!(id, pid = child.id(), "spawned worker");
            self.children.push(child);
        }
        info!(count = self.children.len(), "created workers");
        Ok(())
    }

    /// Declares the segment ready and waits for the workers and, if
    /// configured, the agent.
    ///
    /// `stop` is polled between waits; dead workers are restarted meanwhile.
    /// Returns `false` if stopped or shut down before the barrier completed.
    pub fn start(&mut self, stop: impl Fn() -> bool) -> Result<bool> {
        let poll = Some(self.config.poll_interval());
        self.control()?.declare_manager_ready();
        info!("sent ready signal to workers");

        loop {
            match self.control()?.wait_workers_ready(poll) {
                WaitOutcome::Ready => break,
                WaitOutcome::Shutdown => return Ok(false),
                WaitOutcome::TimedOut => {
                    debug!(waiting = self.control()?.workers_waiting(), "waiting for workers");
                }
            }
            if stop() {
                return Ok(false);
            }
            self.restart_dead()?;
        }
        info!("all workers ready");

        if self.config.wait_for_agent {
            info!("waiting for agent to attach");
            loop {
                match self.control()?.wait_agent_attached(poll) {
                    WaitOutcome::Ready => break,
                    WaitOutcome::Shutdown => return Ok(false),
                    WaitOutcome::TimedOut => {}
                }
                if stop() {
                    return Ok(false);
                }
                self.restart_dead()?;
            }
            info!("agent attached");
        }
        Ok(true)
    }

    /// Restarts every worker whose process has exited, with the same id.
    ///
    /// Returns the number of workers restarted.
    pub fn restart_dead(&mut self) -> Result<usize> {
        let mut restarted = 0;
        for id in 0..self.children.len() {
            let status = self.children[id]
                .try_wait()
                .with_context(|| format!("failed to poll worker {id}"))?;
            let Some(status) = status else {
                continue;
            };

            let child = self.spawn_worker(id as u8)?;
            info!(id, %status, pid = child.id(), "restarted dead worker");
            self.children[id] = child;
            restarted += 1;
        }
        self.respawns += restarted as u64;
        Ok(restarted)
    }

    /// Polls worker liveness until `stop` returns `true` or shutdown is
    /// requested on the control block.
    pub fn supervise(&mut self, stop: impl Fn() -> bool) -> Result<()> {
        let poll = self.config.poll_interval();
        while !stop() && !self.control()?.is_shutdown() {
            self.restart_dead()?;
            std::thread::sleep(poll);
        }
        Ok(())
    }

    /// Releases every barrier wait, terminates every worker and waits for
    /// them to exit.
    pub fn shutdown(&mut self) {
        match self.control() {
            Ok(control) => control.request_shutdown(),
            Err(err) => warn!(%err, "control block unavailable during shutdown"),
        }

        for child in &self.children {
            let Ok(pid) = libc::pid_t::try_from(child.id()) else {
                continue;
            };
            // SAFETY: sending a signal has no memory-safety preconditions.
            unsafe { libc::kill(pid, libc::SIGTERM) };
        }
        for (id, mut child) in self.children.drain(..).enumerate() {
            match child.wait() {
                Ok(status) => debug!(id, %status, "worker exited"),
                Err(err) => warn!(id, %err, "failed to wait for worker"),
            }
        }
        info!("all workers stopped");
    }

    /// Runs until `stop` returns `true`, then shuts down.
    pub fn run(&mut self, stop: impl Fn() -> bool) -> Result<()> {
        self.spawn_workers()?;
        if self.start(&stop)? {
            self.supervise(&stop)?;
        }
        self.shutdown();
        Ok(())
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        if !self.children.is_empty() {
            self.shutdown();
        }
    }
}
