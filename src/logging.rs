//! Tracing subscriber setup. `RUST_LOG` controls verbosity, defaulting to
//! `info` so a mount run without it still reports sync and upload activity.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
