//! Single-threaded readiness-based runtime.
//!
//! One thread multiplexes every connection through mio (epoll on Linux,
//! kqueue on macOS). The pieces, leaves first:
//! - `ByteQueue`: per-connection inbound/outbound buffering
//! - `Connection`: connection state machine driven by intent flags
//! - `request`: framing pass over a connection's buffers
//! - `Listener`: the bound listening socket
//! - `Reactor`: the event loop owning all of the above

mod buffer;
mod connection;
mod listener;
mod reactor;
mod request;
mod token;

pub(crate) use buffer::ByteQueue;
pub(crate) use listener::Listener;
pub(crate) use reactor::Reactor;

use crate::config::Config;
use tracing::info;

/// Bind the listener and run the reactor until it stops.
///
/// Errors before the loop starts (bind, listen, poll setup) are startup
/// failures; the process should exit without serving.
pub fn run(config: Config) -> std::io::Result<()> {
    let listener = Listener::bind(config.listen, config.backlog)?;
    info!(addr = %listener.local_addr(), "Listening");

    let mut reactor = Reactor::new(listener, &config)?;
    reactor.run()
}
