//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready,
//! then we perform non-blocking read/write syscalls.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! ## Cycle
//!
//! Each turn of the loop:
//!
//! 1. Blocks in `Poll::poll` until something is ready.
//! 2. Accepts every pending connection if the listener is ready.
//! 3. Services each ready connection at most once, in event order: a
//!    readable connection gets one bounded read, a framing pass and an
//!    immediate write attempt; a writable one drains as much as it can.
//! 4. Sweeps the connections serviced this turn: closing ones are torn down,
//!    the rest are re-registered with the interest derived from their
//!    current intent flags.
//!
//! mio notifications are edge-triggered. Re-registering every serviced
//! connection re-arms it, so data left in the kernel after a bounded read
//! is reported again on the next turn.

use crate::config::Config;
use crate::runtime::connection::{CloseReason, Connection};
use crate::runtime::listener::Listener;
use crate::runtime::token::{self, EventKind, Readiness, Target};
use mio::{Events, Interest, Poll, Token, Waker};
use slab::Slab;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Single-threaded reactor owning the listener and every live connection.
pub struct Reactor {
    poll: Poll,
    events: Events,
    /// Events of the current turn, detached from `events` for dispatch.
    ready: Vec<(Target, Readiness)>,
    listener: Listener,
    connections: Slab<Connection>,
    /// Connections serviced in the current turn, in dispatch order.
    serviced: Vec<usize>,
    /// Fixed-size scratch buffer bounding each read.
    transfer: Vec<u8>,
    max_connections: usize,
    max_frame_bytes: usize,
    shutdown: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

/// Stops a running reactor from another thread.
#[derive(Debug, Clone)]
#[cfg_attr(not(test), allow(dead_code))]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

#[cfg_attr(not(test), allow(dead_code))]
impl ShutdownHandle {
    /// Ask the reactor to close every connection and return from `run`.
    pub fn shutdown(&self) -> io::Result<()> {
        self.flag.store(true, Ordering::Release);
        self.waker.wake()
    }
}

impl Reactor {
    /// Create a reactor serving `listener`.
    ///
    /// Failures here happen before any connection is served and are fatal
    /// to startup.
    pub fn new(mut listener: Listener, config: &Config) -> io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry()
            .register(listener.source(), token::LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), token::WAKER)?);

        Ok(Self {
            poll,
            events: Events::with_capacity(config.events_capacity),
            ready: Vec::with_capacity(config.events_capacity),
            listener,
            connections: Slab::with_capacity(config.max_connections.min(1024)),
            serviced: Vec::with_capacity(config.events_capacity),
            transfer: vec![0u8; config.read_buffer_size],
            max_connections: config.max_connections,
            max_frame_bytes: config.max_frame_bytes,
            shutdown: Arc::new(AtomicBool::new(false)),
            waker,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            waker: Arc::clone(&self.waker),
        }
    }

    /// Run until shut down. Only a failing poll ends the loop with an error.
    pub fn run(&mut self) -> io::Result<()> {
        info!(
            addr = %self.local_addr(),
            max_connections = self.max_connections,
            max_frame_bytes = self.max_frame_bytes,
            read_buffer_size = self.transfer.len(),
            "Reactor started"
        );

        while !self.shutdown.load(Ordering::Acquire) {
            self.turn(None)?;
        }

        self.close_all();
        info!("Reactor stopped");
        Ok(())
    }

    /// Run a single cycle: wait, dispatch, sweep.
    ///
    /// `None` waits indefinitely.
    pub fn turn(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        let mut ready = std::mem::take(&mut self.ready);
        ready.clear();
        ready.extend(
            self.events
                .iter()
                .map(|event| (Target::from(event.token()), Readiness::of(event))),
        );

        self.serviced.clear();
        for &(target, readiness) in &ready {
            self.dispatch(target, readiness);
        }
        self.ready = ready;

        self.sweep();
        Ok(())
    }

    fn dispatch(&mut self, target: Target, readiness: Readiness) {
        let kind = match target {
            Target::Listener => Some(EventKind::Acceptable),
            Target::Waker => None,
            Target::Connection(id) => match self.connections.get(id) {
                Some(conn) => readiness.select(conn.want_read(), conn.want_write()),
                None => None,
            },
        };

        match (target, kind) {
            (Target::Listener, Some(EventKind::Acceptable)) => self.accept_pending(),
            (Target::Connection(id), Some(EventKind::Readable)) => {
                let conn = &mut self.connections[id];
                conn.on_readable(&mut self.transfer, self.max_frame_bytes);
                self.serviced.push(id);
            }
            (Target::Connection(id), Some(EventKind::Writable)) => {
                self.connections[id].on_writable();
                self.serviced.push(id);
            }
            (Target::Waker, _) => trace!("Reactor woken"),
            _ => {}
        }
    }

    /// Accept until the listener would block.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if self.connections.len() >= self.max_connections {
                        warn!(peer = %peer, "Connection limit reached, rejecting");
                        continue;
                    }

                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let entry = self.connections.vacant_entry();
                    let conn_id = entry.key();
                    let mut conn = Connection::new(conn_id, stream, peer);

                    if let Err(e) = self.poll.registry().register(
                        conn.source(),
                        Token(conn_id),
                        Interest::READABLE,
                    ) {
                        warn!(peer = %peer, error = %e, "Failed to register connection");
                        continue;
                    }

                    entry.insert(conn);
                    info!(conn_id, peer = %peer, "New connection");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Accept error");
                    break;
                }
            }
        }
    }

    /// Tear down closing connections and re-register the rest.
    fn sweep(&mut self) {
        let serviced = std::mem::take(&mut self.serviced);

        for &conn_id in &serviced {
            let Some(conn) = self.connections.get_mut(conn_id) else {
                continue;
            };

            match conn.interest() {
                Some(interest) => {
                    if let Err(e) =
                        self.poll
                            .registry()
                            .reregister(conn.source(), Token(conn_id), interest)
                    {
                        conn.close(CloseReason::Io(e));
                        self.close_connection(conn_id);
                    }
                }
                None => self.close_connection(conn_id),
            }
        }

        self.serviced = serviced;
    }

    /// Remove, deregister and drop a connection, closing its socket.
    fn close_connection(&mut self, conn_id: usize) {
        let Some(mut conn) = self.connections.try_remove(conn_id) else {
            return;
        };

        let _ = self.poll.registry().deregister(conn.source());
        match conn.take_close_reason() {
            Some(reason) => debug!(conn_id, peer = %conn.peer(), reason = %reason, "Connection closed"),
            None => debug!(conn_id, peer = %conn.peer(), "Connection closed"),
        }
    }

    fn close_all(&mut self) {
        let ids: Vec<usize> = self.connections.iter().map(|(id, _)| id).collect();
        for conn_id in ids {
            self.close_connection(conn_id);
        }
    }
}
