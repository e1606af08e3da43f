//! Passive listening socket.

use mio::net::{TcpListener, TcpStream};
use std::io;
use std::net::SocketAddr;

/// Bound, non-blocking listening socket.
///
/// Immutable after startup; the reactor owns it for its whole lifetime.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Create, bind and listen on `addr`.
    ///
    /// `SO_REUSEADDR` is set so a restarted server can rebind while old
    /// connections linger in TIME_WAIT.
    pub fn bind(addr: SocketAddr, backlog: i32) -> io::Result<Self> {
        let socket = socket2::Socket::new(
            match addr {
                SocketAddr::V4(_) => socket2::Domain::IPV4,
                SocketAddr::V6(_) => socket2::Domain::IPV6,
            },
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;

        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(backlog)?;

        let std_listener: std::net::TcpListener = socket.into();
        let local_addr = std_listener.local_addr()?;

        Ok(Self {
            inner: TcpListener::from_std(std_listener),
            local_addr,
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept one pending connection. The returned stream is non-blocking.
    pub fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.inner.accept()
    }

    /// Socket access for registry operations.
    pub fn source(&mut self) -> &mut TcpListener {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral_port() {
        let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        assert!(listener.local_addr().ip().is_loopback());
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[test]
    fn test_accept_without_pending_would_block() {
        let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        let err = listener.accept().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_bind_conflict_is_an_error() {
        let first = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = first.local_addr().unwrap();
        assert!(Listener::bind(addr, 16).is_err());
    }
}
