// src/core/errors.rs

//! Defines the primary error type of the engine.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Convenience alias used throughout the engine.
pub type Result<T, E = NetError> = std::result::Result<T, E>;

/// Every failure the engine can report. Most variants are fatal to a single
/// connection only; the reactor and the worker pools log them and move on.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("IO Error: {0}")]
    Io(Arc<io::Error>),

    #[error("WebSocket Error: {0}")]
    WebSocket(String),

    #[error("frame too short: got {len} bytes, need at least {min}")]
    FrameTooShort { len: usize, min: usize },

    #[error("frame payload of {len} bytes exceeds the limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("connection {0} closed by peer")]
    PeerClosed(u64),

    #[error("connection {0} is closed")]
    Closed(u64),

    #[error("connection {id} is not writable in state {state}")]
    NotWritable { id: u64, state: &'static str },

    #[error("connection {0} is already registered")]
    AlreadyRegistered(u64),

    #[error("connection {0} is not registered")]
    NotRegistered(u64),

    #[error("engine is not running")]
    EngineStopped,

    #[error("task queue for connection {0} is closed")]
    QueueClosed(u64),

    #[error("connection limit of {0} reached")]
    TooManyConnections(usize),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

// `io::Error` is not cloneable, so it is shared behind an `Arc`.
impl Clone for NetError {
    fn clone(&self) -> Self {
        match self {
            NetError::Io(e) => NetError::Io(Arc::clone(e)),
            NetError::WebSocket(s) => NetError::WebSocket(s.clone()),
            NetError::FrameTooShort { len, min } => NetError::FrameTooShort {
                len: *len,
                min: *min,
            },
            NetError::FrameTooLarge { len, max } => NetError::FrameTooLarge {
                len: *len,
                max: *max,
            },
            NetError::PeerClosed(id) => NetError::PeerClosed(*id),
            NetError::Closed(id) => NetError::Closed(*id),
            NetError::NotWritable { id, state } => NetError::NotWritable { id: *id, state },
            NetError::AlreadyRegistered(id) => NetError::AlreadyRegistered(*id),
            NetError::NotRegistered(id) => NetError::NotRegistered(*id),
            NetError::EngineStopped => NetError::EngineStopped,
            NetError::QueueClosed(id) => NetError::QueueClosed(*id),
            NetError::TooManyConnections(n) => NetError::TooManyConnections(*n),
            NetError::Config(s) => NetError::Config(s.clone()),
        }
    }
}

impl NetError {
    /// True for read/write deadlines expiring on a socket. These end a read
    /// cycle cleanly and are never treated as connection failures.
    pub fn is_timeout(&self) -> bool {
        match self {
            NetError::Io(e) => is_transient(e),
            _ => false,
        }
    }
}

/// Returns true if the error only means "nothing available right now".
pub fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

// --- From trait implementations for easy error conversion ---

impl From<io::Error> for NetError {
    fn from(e: io::Error) -> Self {
        NetError::Io(Arc::new(e))
    }
}

impl From<tungstenite::Error> for NetError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::Io(io_err) => NetError::Io(Arc::new(io_err)),
            other => NetError::WebSocket(other.to_string()),
        }
    }
}
