use tracing::Level;
use tracing_subscriber::prelude::*;

/// Installs the global fmt subscriber at `level`.
pub fn init(level: Level) {
    let registry = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::filter::LevelFilter::from_level(level));
    registry.init();
}

/// `DEBUG` when verbose, `base` otherwise.
pub fn level(verbose: bool, base: Level) -> Level {
    if verbose { Level::DEBUG } else { base }
}
