//! Command-line configuration for the three binaries.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::shared::{DEFAULT_SHM_NAME, QueueKind};

/// File name of the worker binary, looked up next to the manager.
pub const WORKER_BIN_NAME: &str = "sim-worker";

fn default_process_count() -> u8 {
    num_cpus::get().clamp(1, u8::MAX as usize) as u8
}

/// Configuration of the simulation manager.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Runs 2048 simulation workers that exchange states and moves over shared memory"
)]
pub struct ManagerConfig {
    /// Number of worker processes
    #[arg(short = 'n', long, default_value_t = default_process_count(), value_parser = clap::value_parser!(u8).range(1..))]
    pub processes: u8,

    /// Name of the shared memory segment
    #[arg(long, default_value = DEFAULT_SHM_NAME)]
    pub shm_name: String,

    /// Worker executable (defaults to sim-worker next to this binary)
    #[arg(long)]
    pub worker_bin: Option<PathBuf>,

    /// Message queue variant
    #[arg(long, value_enum, default_value_t = QueueKind::LockFree)]
    pub queue: QueueKind,

    /// Base seed; worker i is seeded with base + i. Random when omitted
    #[arg(long)]
    pub seed: Option<u32>,

    /// Interval between worker liveness checks
    #[arg(long, default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// Block until an agent attaches before supervising workers
    #[arg(long)]
    pub wait_for_agent: bool,

    /// Log at debug level and pass --verbose to workers
    #[arg(short, long)]
    pub verbose: bool,
}

impl ManagerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Resolves the worker executable path.
    pub fn worker_path(&self) -> io::Result<PathBuf> {
        match &self.worker_bin {
            Some(path) => Ok(path.clone()),
            None => Ok(std::env::current_exe()?.with_file_name(WORKER_BIN_NAME)),
        }
    }
}

/// Configuration of one worker process.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Simulates one 2048 game for the manager")]
pub struct WorkerConfig {
    /// Worker id, also the index of its mailbox
    pub id: u8,

    /// Name of the shared memory segment
    #[arg(long, default_value = DEFAULT_SHM_NAME)]
    pub shm_name: String,

    /// RNG seed. Random when omitted
    #[arg(long)]
    pub seed: Option<u32>,

    /// Stop after this many moves
    #[arg(long)]
    pub max_steps: Option<u64>,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

/// Configuration of the random-policy agent.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Plays random valid moves for every attached worker")]
pub struct AgentConfig {
    /// Name of the shared memory segment
    #[arg(long, default_value = DEFAULT_SHM_NAME)]
    pub shm_name: String,

    /// Number of finished games after which the agent exits
    #[arg(short, long, default_value_t = 100)]
    pub episodes: u64,

    /// RNG seed for move selection
    #[arg(long)]
    pub seed: Option<u64>,

    /// How long to retry attaching before giving up
    #[arg(long, default_value_t = 10)]
    pub attach_timeout_secs: u64,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_defaults() {
        let config = ManagerConfig::parse_from(["sim-manager"]);
        assert_eq!(config.shm_name, DEFAULT_SHM_NAME);
        assert_eq!(config.queue, QueueKind::LockFree);
        assert!(config.processes >= 1);
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert!(!config.wait_for_agent);
        assert!(
            config
                .worker_path()
                .unwrap()
                .ends_with(WORKER_BIN_NAME)
        );
    }

    #[test]
    fn test_manager_flags() {
        let config = ManagerConfig::parse_from([
            "sim-manager",
            "--processes",
            "6",
            "--queue",
            "blocking",
            "--seed",
            "7",
            "--worker-bin",
            "/opt/bin/worker",
            "--wait-for-agent",
            "-v",
        ]);
        assert_eq!(config.processes, 6);
        assert_eq!(config.queue, QueueKind::Blocking);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.worker_path().unwrap(), PathBuf::from("/opt/bin/worker"));
        assert!(config.wait_for_agent);
        assert!(config.verbose);
    }

    #[test]
    fn test_manager_rejects_zero_processes() {
        assert!(ManagerConfig::try_parse_from(["sim-manager", "--processes", "0"]).is_err());
    }

    #[test]
    fn test_worker_args() {
        let config = WorkerConfig::parse_from(["sim-worker", "3", "--shm-name", "x", "--verbose"]);
        assert_eq!(config.id, 3);
        assert_eq!(config.shm_name, "x");
        assert!(config.verbose);
        assert!(config.seed.is_none());
    }
}
