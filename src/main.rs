//! frame-reactor: a single-threaded length-prefixed echo server
//!
//! Multiplexes many TCP connections on one thread with non-blocking sockets
//! and a readiness-based event loop.
//!
//! Features:
//! - Length-prefixed framing (`u32` little-endian length, then body)
//! - Echo semantics: every frame is answered with an identical frame
//! - Bounded per-event work so one busy peer cannot starve the rest
//! - Configuration via CLI arguments or TOML file

mod config;
mod protocols;
mod runtime;

use config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        max_connections = config.max_connections,
        max_frame_bytes = config.max_frame_bytes,
        read_buffer_size = config.read_buffer_size,
        "Starting frame-reactor server"
    );

    runtime::run(config)?;
    Ok(())
}
