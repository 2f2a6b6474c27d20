// src/server/gateway.rs

//! Accept loops that turn inbound sockets into engine connections.

use super::engine::Engine;
use crate::config::{Config, NetworkMode};
use crate::connection::{FrameBounded, WsStream};
use crate::core::{NetError, Result};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tungstenite::WebSocket;

/// Listens on one address and admits every accepted socket into an engine,
/// as plain TCP or after a WebSocket upgrade.
pub struct Gateway<P = ()> {
    engine: Arc<Engine<P>>,
    listener: TcpListener,
    mode: NetworkMode,
    max_conns: usize,
    handshake_timeout: Duration,
    in_flight: Arc<AtomicUsize>,
}

/// Counts one admission running off the accept loop until it is dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(count))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<P: Default + Send + Sync + 'static> Gateway<P> {
    pub async fn bind(
        addr: &str,
        engine: Arc<Engine<P>>,
        mode: NetworkMode,
        max_conns: usize,
        handshake_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            engine,
            listener,
            mode,
            max_conns,
            handshake_timeout,
            in_flight: Arc::default(),
        })
    }

    /// Binds to `host:port` with the mode and limits from `config`.
    pub async fn from_config(config: &Config, engine: Arc<Engine<P>>) -> Result<Self> {
        Self::bind(
            &config.bind_addr(),
            engine,
            config.network_mode,
            config.max_conns,
            config.ws_handshake_timeout(),
        )
        .await
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts until the engine stops.
    pub async fn run(self) {
        let mut shutdown_rx = self.engine.subscribe_shutdown();
        if let Ok(addr) = self.listener.local_addr() {
            info!("Gateway listening on {} ({:?}).", addr, self.mode);
        }

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("Gateway shutting down.");
                    break;
                }

                res = self.listener.accept() => match res {
                    Ok((socket, addr)) => self.admit(socket, addr),
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }
    }

    /// Admissions still running in the blocking pool count against
    /// `max_conns`, so a burst of accepts cannot overshoot the limit.
    fn admit(&self, socket: tokio::net::TcpStream, addr: SocketAddr) {
        let pending = self.in_flight.load(Ordering::Acquire);
        if self.max_conns > 0 && self.engine.conn_count() + pending >= self.max_conns {
            warn!(
                "Refusing connection from {}: {}",
                addr,
                NetError::TooManyConnections(self.max_conns)
            );
            return;
        }

        let stream = match socket.into_std() {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to detach socket from {}: {}", addr, e);
                return;
            }
        };

        // Admission blocks (socket setup, signal queue, handshake), so it
        // runs off the async workers.
        let engine = Arc::clone(&self.engine);
        let mode = self.mode;
        let handshake_timeout = self.handshake_timeout;
        let in_flight = InFlight::enter(&self.in_flight);
        tokio::task::spawn_blocking(move || {
            let _in_flight = in_flight;
            let admitted = match mode {
                NetworkMode::Tcp => engine.admit_tcp(stream),
                NetworkMode::WebSocket => {
                    upgrade(stream, handshake_timeout).and_then(|ws| engine.admit_websocket(ws))
                }
            };
            match admitted {
                Ok(conn) => info!("Accepted connection {} from {}.", conn.id(), addr),
                Err(e) => warn!("Could not admit connection from {}: {}", addr, e),
            }
        });
    }
}

/// Runs the server side of the WebSocket handshake with `timeout` as the
/// deadline for each socket read and write. Once upgraded, reads on the
/// session stop at frame boundaries.
pub fn upgrade(stream: TcpStream, timeout: Duration) -> Result<WebSocket<WsStream>> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    let mut ws = tungstenite::accept(FrameBounded::new(stream))
        .map_err(|e| NetError::WebSocket(e.to_string()))?;
    ws.get_mut().track_frames();
    debug!("WebSocket handshake completed.");
    Ok(ws)
}
