//! Event tokens and dispatch tags.
//!
//! Connections are registered with their slab key as the mio token. The
//! listener and the shutdown waker use reserved tokens at the top of the
//! range, which the slab never reaches.

use mio::event::Event;
use mio::Token;

/// Token for the listening socket.
pub const LISTENER: Token = Token(usize::MAX);

/// Token for the shutdown waker.
pub const WAKER: Token = Token(usize::MAX - 1);

/// Entity an event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Listener,
    Waker,
    /// Connection identified by its slab key.
    Connection(usize),
}

impl From<Token> for Target {
    fn from(token: Token) -> Self {
        match token {
            LISTENER => Target::Listener,
            WAKER => Target::Waker,
            Token(id) => Target::Connection(id),
        }
    }
}

/// Kind of readiness being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Listener has pending connections.
    Acceptable,
    Readable,
    Writable,
}

/// Readiness reported by a single poll event.
///
/// Error and hang-up conditions count as both readable and writable: the
/// next read or write surfaces the actual error (or EOF) to the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

impl Readiness {
    pub fn of(event: &Event) -> Self {
        let failed = event.is_error();
        Self {
            readable: event.is_readable() || event.is_read_closed() || failed,
            writable: event.is_writable() || event.is_write_closed() || failed,
        }
    }

    /// Pick the kind to service for a connection with the given intent.
    ///
    /// At most one kind is chosen, so a connection is serviced at most once
    /// per event.
    pub fn select(self, want_read: bool, want_write: bool) -> Option<EventKind> {
        if want_read && self.readable {
            Some(EventKind::Readable)
        } else if want_write && self.writable {
            Some(EventKind::Writable)
        } else {
            None
        }
    }
}
