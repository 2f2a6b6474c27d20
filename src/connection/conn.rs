// src/connection/conn.rs

//! Defines `Connection`, the engine's handle on one peer.

use super::state::{Aging, AtomicState, ConnState};
use super::transport::{Transport, TransportKind, wait_readable};
use super::ws_stream::WsStream;
use crate::config::EngineConfig;
use crate::core::errors::is_transient;
use crate::core::metrics;
use crate::core::pipeline::Request;
use crate::core::protocol::{TcpFrameCodec, pack_tcp, pack_websocket, unpack_websocket};
use crate::core::{Message, NetError, Result};
use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::RawFd;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};
use tungstenite::{Message as WsMessage, WebSocket};

/// Upper bound on a single socket read. Reads never go past the frame that
/// is currently being assembled, so this only caps large payloads.
const READ_CHUNK: usize = 8 * 1024;

/// The per-connection I/O settings, copied out of the engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnOptions {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub write_retry_interval: Duration,
    pub read_attempts: usize,
    pub max_packet_size: usize,
}

impl From<&EngineConfig> for ConnOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            write_retry_interval: config.write_retry_interval(),
            read_attempts: config.read_attempts,
            max_packet_size: config.max_packet_size,
        }
    }
}

impl Default for ConnOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// What one read attempt produced.
enum Inbound {
    Frame(Message),
    /// A non-data WebSocket frame. It only proves the peer is alive.
    Pulse,
}

/// One registered peer.
///
/// The id is the socket's file descriptor. It selects the registry shard,
/// the ready queue, the task queue, and the signal queue, which is what
/// keeps all work for one connection in order.
pub struct Connection<P = ()> {
    id: u64,
    transport: Transport,
    state: AtomicState,
    write_lock: Mutex<()>,
    read_buf: Mutex<BytesMut>,
    codec: TcpFrameCodec,
    opts: ConnOptions,
    task_queue: mpsc::Sender<Request<P>>,
    property: RwLock<P>,
    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
}

impl<P> Connection<P> {
    /// Wraps `transport`, configuring its socket deadlines from `opts`.
    /// Requests decoded from this connection are pushed to `task_queue`.
    pub fn new(
        transport: Transport,
        opts: ConnOptions,
        task_queue: mpsc::Sender<Request<P>>,
        property: P,
    ) -> Result<Self> {
        transport.configure(opts.read_timeout, opts.write_timeout)?;
        let id = transport.raw_fd() as u64;
        Ok(Self {
            id,
            peer_addr: transport.peer_addr().ok(),
            local_addr: transport.local_addr().ok(),
            transport,
            state: AtomicState::default(),
            write_lock: Mutex::new(()),
            read_buf: Mutex::new(BytesMut::new()),
            codec: TcpFrameCodec::new(opts.max_packet_size),
            opts,
            task_queue,
            property: RwLock::new(property),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ConnState {
        self.state.load()
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    pub fn transport(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn options(&self) -> &ConnOptions {
        &self.opts
    }

    /// Read access to the application's per-connection value.
    pub fn property(&self) -> RwLockReadGuard<'_, P> {
        self.property.read()
    }

    pub fn property_mut(&self) -> RwLockWriteGuard<'_, P> {
        self.property.write()
    }

    /// Records inbound activity. Returns true if this revived the connection.
    pub fn touch(&self) -> bool {
        self.state.mark_active()
    }

    /// Applies one keepalive tick to this connection's state.
    pub fn age(&self) -> Aging {
        self.state.age()
    }

    /// Sends raw bytes. On a WebSocket they become one binary frame.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        let state = self.state.load();
        if !state.is_writable() {
            return Err(NetError::NotWritable {
                id: self.id,
                state: state.as_str(),
            });
        }

        let data: Bytes = data.into();
        let _guard = self.write_lock.lock();
        match &self.transport {
            Transport::Tcp(stream) => self.write_tcp(stream, &data)?,
            Transport::WebSocket(ws) => self.write_ws(ws, data)?,
        }
        metrics::FRAMES_SENT_TOTAL.inc();
        Ok(())
    }

    /// Frames `payload` under `msg_id` for this connection's transport and sends it.
    pub fn send_msg(&self, msg_id: u32, payload: impl Into<Bytes>) -> Result<()> {
        let msg = Message::new(msg_id, payload);
        let frame = match self.transport.kind() {
            TransportKind::Tcp => pack_tcp(&msg)?,
            TransportKind::WebSocket => pack_websocket(&msg),
        };
        self.send(frame)
    }

    fn write_tcp(&self, mut stream: &TcpStream, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            match stream.write(data) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => data = &data[n..],
                Err(e) if is_transient(&e) => thread::sleep(self.opts.write_retry_interval),
                Err(e) => {
                    debug!("Write to connection {} failed: {}", self.id, e);
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn write_ws(&self, ws: &Mutex<WebSocket<WsStream>>, frame: Bytes) -> Result<()> {
        let mut ws = ws.lock();
        let mut result = ws.send(WsMessage::Binary(frame));
        loop {
            match result {
                Ok(()) => return Ok(()),
                // The frame is already queued inside the session; only the
                // flush needs repeating.
                Err(tungstenite::Error::Io(e)) if is_transient(&e) => {
                    thread::sleep(self.opts.write_retry_interval);
                    result = ws.flush();
                }
                Err(e) => {
                    debug!("WebSocket write to connection {} failed: {}", self.id, e);
                    return Err(e.into());
                }
            }
        }
    }

    /// Closes the connection. Only the first call has any effect.
    pub fn stop(&self) {
        if !self.state.close() {
            return;
        }

        match &self.transport {
            Transport::Tcp(stream) => {
                if let Err(e) = stream.shutdown(Shutdown::Both) {
                    trace!("Shutdown of connection {} returned: {}", self.id, e);
                }
            }
            Transport::WebSocket(ws) => {
                let mut ws = ws.lock();
                if let Err(e) = ws.close(None).and_then(|_| ws.flush()) {
                    trace!("WebSocket close of connection {} returned: {}", self.id, e);
                }
                if let Err(e) = ws.get_ref().get_ref().shutdown(Shutdown::Both) {
                    trace!("Shutdown of connection {} returned: {}", self.id, e);
                }
            }
        }
        debug!("Connection {} closed.", self.id);
    }

    /// Reads one frame or pulse. `Ok(None)` means the read deadline expired
    /// with nothing complete; a partial TCP frame stays buffered.
    fn read_inbound(&self) -> Result<Option<Inbound>> {
        match &self.transport {
            Transport::Tcp(stream) => Ok(self.read_tcp(stream)?.map(Inbound::Frame)),
            Transport::WebSocket(ws) => self.read_ws(ws),
        }
    }

    fn read_tcp(&self, mut stream: &TcpStream) -> Result<Option<Message>> {
        let mut buf = self.read_buf.lock();
        let mut codec = self.codec.clone();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(msg) = codec.decode(&mut buf)? {
                return Ok(Some(msg));
            }

            let want = codec.remaining(&buf).min(READ_CHUNK);
            match stream.read(&mut chunk[..want]) {
                Ok(0) => return Err(NetError::PeerClosed(self.id)),
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) if is_transient(&e) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// The session lock is only taken once the socket has bytes pending, so
    /// replies from task workers are not held up by an idle read.
    fn read_ws(&self, ws: &Mutex<WebSocket<WsStream>>) -> Result<Option<Inbound>> {
        // The id is the socket's descriptor.
        if !wait_readable(self.id as RawFd, self.opts.read_timeout)? {
            return Ok(None);
        }

        let mut ws = ws.lock();
        match ws.read() {
            Ok(WsMessage::Binary(data)) => Ok(Some(Inbound::Frame(unpack_websocket(data)?))),
            Ok(WsMessage::Close(_)) => Err(NetError::PeerClosed(self.id)),
            Ok(_) => {
                // Sends the queued pong, if any, without waiting for more input.
                match ws.flush() {
                    Ok(()) => {}
                    Err(tungstenite::Error::Io(e)) if is_transient(&e) => {}
                    Err(e) => return Err(e.into()),
                }
                Ok(Some(Inbound::Pulse))
            }
            Err(tungstenite::Error::Io(e)) if is_transient(&e) => Ok(None),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Err(NetError::PeerClosed(self.id))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<P: Send + Sync + 'static> Connection<P> {
    /// Drains what the socket has ready, up to `read_attempts` frames, and
    /// pushes each decoded frame to the connection's task queue.
    ///
    /// An expired read deadline ends the cycle successfully. Any other error
    /// is returned and the caller is expected to deregister the connection.
    pub fn batch_commit(self: &Arc<Self>) -> Result<()> {
        if self.is_closed() {
            return Err(NetError::Closed(self.id));
        }

        for _ in 0..self.opts.read_attempts {
            match self.read_inbound()? {
                None => return Ok(()),
                Some(Inbound::Pulse) => {
                    self.touch();
                }
                Some(Inbound::Frame(msg)) => {
                    self.touch();
                    metrics::FRAMES_RECEIVED_TOTAL.inc();
                    trace!(
                        "Connection {} received message {} ({} bytes).",
                        self.id,
                        msg.id(),
                        msg.len()
                    );
                    self.task_queue
                        .blocking_send(Request::new(Arc::clone(self), msg))
                        .map_err(|_| NetError::QueueClosed(self.id))?;
                }
            }
        }
        Ok(())
    }
}

impl<P> fmt::Debug for Connection<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("transport", &self.transport.kind())
            .field("state", &self.state.load())
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}
