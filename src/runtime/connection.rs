//! Connection state machine for managing TCP connections.
//!
//! Each connection owns its socket and two byte queues, and declares what it
//! wants from the reactor through three intent flags. The state is derived
//! from those flags rather than stored separately:
//!
//! - `Reading`: waiting for request bytes (default after accept)
//! - `Writing`: responses are queued and waiting for socket capacity
//! - `Closing`: terminal, the reactor tears the connection down at the end
//!   of the current cycle
//!
//! Handlers never block. Would-block and EINTR leave the state unchanged and
//! the reactor tries again on the next readiness event.

use crate::runtime::request::{process_frames, FrameError, ProcessResult};
use crate::runtime::ByteQueue;
use mio::net::TcpStream;
use mio::Interest;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use tracing::{debug, trace};

/// Current state of a connection, derived from its intent flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Reading,
    Writing,
    Closing,
}

/// Why a connection entered the closing state.
#[derive(Debug)]
pub enum CloseReason {
    /// Peer closed its end with no partial frame buffered.
    PeerClosed,
    /// Peer closed its end in the middle of a frame.
    UnexpectedEof { buffered: usize },
    /// Read or write failed.
    Io(io::Error),
    /// Peer violated the framing protocol.
    Protocol(FrameError),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed connection"),
            CloseReason::UnexpectedEof { buffered } => {
                write!(f, "unexpected EOF with {buffered} bytes of partial frame")
            }
            CloseReason::Io(e) => write!(f, "I/O error: {e}"),
            CloseReason::Protocol(e) => write!(f, "protocol error: {e}"),
        }
    }
}

/// A single client connection.
///
/// Generic over the stream so the state machine can be driven by an
/// in-memory stream in tests; the reactor always uses `TcpStream`.
#[derive(Debug)]
pub struct Connection<S = TcpStream> {
    /// Slab key, also the mio token.
    id: usize,
    stream: S,
    peer: SocketAddr,
    incoming: ByteQueue,
    outgoing: ByteQueue,
    want_read: bool,
    want_write: bool,
    want_close: bool,
    /// Close to apply once `outgoing` drains.
    deferred_close: Option<CloseReason>,
    close_reason: Option<CloseReason>,
}

impl<S> Connection<S> {
    /// Create a new connection in the reading state.
    pub fn new(id: usize, stream: S, peer: SocketAddr) -> Self {
        Self {
            id,
            stream,
            peer,
            incoming: ByteQueue::new(),
            outgoing: ByteQueue::new(),
            want_read: true,
            want_write: false,
            want_close: false,
            deferred_close: None,
            close_reason: None,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn want_read(&self) -> bool {
        self.want_read
    }

    pub fn want_write(&self) -> bool {
        self.want_write
    }

    pub fn want_close(&self) -> bool {
        self.want_close
    }

    pub fn incoming(&self) -> &ByteQueue {
        &self.incoming
    }

    pub fn outgoing(&self) -> &ByteQueue {
        &self.outgoing
    }

    /// Stream access for registry operations.
    pub fn source(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn state(&self) -> ConnState {
        if self.want_close {
            ConnState::Closing
        } else if self.want_write {
            ConnState::Writing
        } else {
            ConnState::Reading
        }
    }

    /// Readiness to wait for, or `None` once closing.
    pub fn interest(&self) -> Option<Interest> {
        match self.state() {
            ConnState::Reading => Some(Interest::READABLE),
            ConnState::Writing => Some(Interest::WRITABLE),
            ConnState::Closing => None,
        }
    }

    /// Mark the connection for closing.
    ///
    /// Closing is absorbing: the first reason wins and no intent is ever
    /// restored afterwards.
    pub fn close(&mut self, reason: CloseReason) {
        if self.want_close {
            return;
        }
        self.want_close = true;
        self.want_read = false;
        self.want_write = false;
        self.close_reason = Some(reason);
    }

    /// Take the recorded close reason, for logging on teardown.
    pub fn take_close_reason(&mut self) -> Option<CloseReason> {
        self.close_reason.take()
    }
}

impl<S: Read + Write> Connection<S> {
    /// Handle read readiness.
    ///
    /// Performs at most one read of `transfer.len()` bytes, so the work done
    /// per event stays bounded however much the peer has sent. Complete
    /// frames are echoed and an immediate write is attempted.
    pub fn on_readable(&mut self, transfer: &mut [u8], max_frame_bytes: usize) {
        if !self.want_read {
            return;
        }

        let n = match self.stream.read(transfer) {
            Ok(0) => {
                let reason = if self.incoming.is_empty() {
                    CloseReason::PeerClosed
                } else {
                    CloseReason::UnexpectedEof {
                        buffered: self.incoming.len(),
                    }
                };
                self.close(reason);
                return;
            }
            Ok(n) => n,
            Err(ref e) if is_transient(e) => return,
            Err(e) => {
                self.close(CloseReason::Io(e));
                return;
            }
        };

        trace!(conn_id = self.id, bytes = n, "Read");
        self.incoming.append(&transfer[..n]);

        match process_frames(
            self.id,
            &mut self.incoming,
            &mut self.outgoing,
            max_frame_bytes,
        ) {
            ProcessResult::NeedData => {}
            ProcessResult::Response { frames, .. } => {
                trace!(conn_id = self.id, frames, "Frames echoed");
            }
            ProcessResult::Error { frames, error } => {
                debug!(conn_id = self.id, frames, error = %error, "Protocol violation");
                self.want_read = false;
                self.deferred_close = Some(CloseReason::Protocol(error));
            }
        }

        if !self.outgoing.is_empty() {
            self.want_read = false;
            self.want_write = true;
            self.flush();
        } else if let Some(reason) = self.deferred_close.take() {
            self.close(reason);
        }
    }

    /// Handle write readiness.
    pub fn on_writable(&mut self) {
        if self.want_write {
            self.flush();
        }
    }

    /// Write as much of `outgoing` as the socket accepts.
    ///
    /// Once drained the connection returns to reading, or closes if a close
    /// was deferred until the responses went out.
    fn flush(&mut self) {
        while !self.outgoing.is_empty() {
            match self.stream.write(self.outgoing.as_slice()) {
                Ok(0) => {
                    self.close(CloseReason::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "write returned 0",
                    )));
                    return;
                }
                Ok(n) => {
                    trace!(conn_id = self.id, bytes = n, "Wrote");
                    self.outgoing.consume(n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.close(CloseReason::Io(e));
                    return;
                }
            }
        }

        self.want_write = false;
        match self.deferred_close.take() {
            Some(reason) => self.close(reason),
            None => self.want_read = true,
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
