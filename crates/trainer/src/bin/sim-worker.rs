use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use shm_transport::Attachment;
use tracing::{Level, info};
use trainer::config::WorkerConfig;
use trainer::logging;
use trainer::worker::Worker;

fn main() -> Result<()> {
    let config = WorkerConfig::parse();
    logging::init(logging::level(config.verbose, Level::WARN));

    let seed = config
        .seed
        .unwrap_or_else(|| rand::rng().random_range(1..=u32::MAX));
    let segment = Attachment::open(&config.shm_name)
        .with_context(|| format!("worker {}: failed to open `{}`", config.id, config.shm_name))?;
    let mut worker = Worker::attach(config.id, seed, &segment)?;

    if !worker.await_barrier()? {
        info!(id = config.id, "shutdown before start");
        return Ok(());
    }
    let steps = worker.run(config.max_steps)?;
    info!(
        id = config.id,
        steps,
        episodes = worker.simulator().episodes(),
        "worker stopped"
    );
    Ok(())
}
