use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use game_core::moves::RESET;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shm_transport::Attachment;
use tracing::{Level, debug, info, warn};
use trainer::agent::Agent;
use trainer::config::AgentConfig;
use trainer::logging;
use trainer::shared::SharedState;
use trainer::signals;

const ATTACH_RETRY: Duration = Duration::from_millis(100);
const MESSAGE_WAIT: Duration = Duration::from_millis(100);

/// Opens the segment once the manager has finished constructing it.
fn open_segment(config: &AgentConfig) -> Result<Attachment> {
    let deadline = Instant::now() + Duration::from_secs(config.attach_timeout_secs);
    loop {
        let error = match Attachment::open(&config.shm_name) {
            Ok(segment) => {
                let resolved = SharedState::resolve(&segment).map(|_| ());
                match resolved {
                    Ok(()) => return Ok(segment),
                    Err(err) => err,
                }
            }
            Err(err) => err,
        };
        if Instant::now() >= deadline {
            return Err(error).with_context(|| format!("failed to attach to `{}`", config.shm_name));
        }
        debug!(%error, "segment not ready, retrying");
        thread::sleep(ATTACH_RETRY);
    }
}

fn main() -> Result<()> {
    let config = AgentConfig::parse();
    logging::init(logging::level(config.verbose, Level::INFO));
    signals::install_termination_handlers().context("failed to install signal handlers")?;

    let segment = open_segment(&config)?;
    let agent = Agent::attach(&segment)?;
    agent.announce();
    info!(
        name = %config.shm_name,
        processes = agent.process_count(),
        "agent attached"
    );

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let started = Instant::now();
    let mut steps = 0u64;
    let mut episodes = 0u64;

    while episodes < config.episodes {
        if signals::termination_requested() || agent.is_shutdown() {
            warn!(episodes, "stopping early");
            break;
        }
        if !agent.wait_for_messages(MESSAGE_WAIT) {
            continue;
        }

        for message in agent.pop_all() {
            let id = message.worker_id() as usize;
            let moves = message.valid_moves();
            let mv = if moves.is_game_over() || moves.count() == 0 {
                episodes += 1;
                info!(
                    id,
                    episodes,
                    max_tile = 1u32 << message.board().max_tile().0,
                    "game finished"
                );
                RESET
            } else {
                let pick = rng.random_range(0..moves.count()) as usize;
                match moves.iter().nth(pick) {
                    Some(direction) => direction.code(),
                    None => bail!("worker {id} sent an inconsistent move set {moves}"),
                }
            };
            if let Err(err) = agent.put_response(id, mv) {
                warn!(id, %err, "dropped response");
            }
            steps += 1;
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    info!(
        steps,
        episodes,
        elapsed = %format!("{elapsed:.2}s"),
        steps_per_sec = %format!("{:.0}", steps as f64 / elapsed.max(f64::EPSILON)),
        "agent finished"
    );
    Ok(())
}
