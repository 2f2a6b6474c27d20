// src/connection/transport.rs

//! The byte pipe under a connection: a plain TCP socket or a WebSocket
//! session running over one.

use super::ws_stream::WsStream;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;
use tungstenite::WebSocket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    WebSocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "tcp"),
            TransportKind::WebSocket => write!(f, "websocket"),
        }
    }
}

/// A TCP stream is used through `&TcpStream` for both directions. A WebSocket
/// session keeps protocol state, so reads and writes share its mutex.
pub enum Transport {
    Tcp(TcpStream),
    WebSocket(Mutex<WebSocket<WsStream>>),
}

impl Transport {
    pub fn tcp(stream: TcpStream) -> Self {
        Transport::Tcp(stream)
    }

    pub fn websocket(ws: WebSocket<WsStream>) -> Self {
        Transport::WebSocket(Mutex::new(ws))
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Tcp(_) => TransportKind::Tcp,
            Transport::WebSocket(_) => TransportKind::WebSocket,
        }
    }

    /// Runs `f` on the underlying socket. For WebSocket this takes the
    /// session lock, so it is meant for setup and teardown, not hot paths.
    pub(crate) fn with_socket<R>(&self, f: impl FnOnce(&TcpStream) -> R) -> R {
        match self {
            Transport::Tcp(stream) => f(stream),
            Transport::WebSocket(ws) => f(ws.lock().get_ref().get_ref()),
        }
    }

    /// The file descriptor, which doubles as the connection id.
    pub fn raw_fd(&self) -> RawFd {
        self.with_socket(|s| s.as_raw_fd())
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.with_socket(|s| s.peer_addr())
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.with_socket(|s| s.local_addr())
    }

    /// Puts the socket in blocking mode with per-call deadlines. Readiness
    /// comes from epoll; the deadlines only bound how long one call may wait.
    pub fn configure(&self, read_timeout: Duration, write_timeout: Duration) -> io::Result<()> {
        self.with_socket(|s| {
            s.set_nonblocking(false)?;
            s.set_nodelay(true)?;
            s.set_read_timeout(Some(read_timeout))?;
            s.set_write_timeout(Some(write_timeout))
        })
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transport({})", self.kind())
    }
}

/// Waits up to `timeout` for `fd` to have input, end of stream, or an error
/// pending. An interrupted wait reports nothing pending.
pub(crate) fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    // SAFETY: `pfd` is a valid, exclusively borrowed pollfd for the call.
    let n = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if n < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(n > 0)
}
