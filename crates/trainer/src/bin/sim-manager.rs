use anyhow::{Context, Result};
use clap::Parser;
use tracing::{Level, info};
use trainer::config::ManagerConfig;
use trainer::logging;
use trainer::manager::Manager;
use trainer::signals;

fn main() -> Result<()> {
    let config = ManagerConfig::parse();
    logging::init(logging::level(config.verbose, Level::INFO));
    signals::install_termination_handlers().context("failed to install signal handlers")?;

    let mut manager = Manager::create(config)?;
    manager.run(signals::termination_requested)?;
    info!(respawns = manager.respawns(), "manager exiting");
    Ok(())
}
