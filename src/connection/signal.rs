// src/connection/signal.rs

use super::Connection;
use std::fmt;
use std::sync::Arc;

/// The lifecycle events delivered to user hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Start,
    Stop,
    NotActive,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Start => write!(f, "start"),
            SignalKind::Stop => write!(f, "stop"),
            SignalKind::NotActive => write!(f, "not-active"),
        }
    }
}

/// A lifecycle event for one connection, consumed exactly once by a signal worker.
pub struct ConnSignal<P = ()> {
    pub conn: Arc<Connection<P>>,
    pub kind: SignalKind,
}

impl<P> ConnSignal<P> {
    pub fn new(conn: Arc<Connection<P>>, kind: SignalKind) -> Self {
        Self { conn, kind }
    }
}

impl<P> fmt::Debug for ConnSignal<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnSignal")
            .field("conn_id", &self.conn.id())
            .field("kind", &self.kind)
            .finish()
    }
}
