// src/connection/mod.rs

//! A single peer connection: its transport, its liveness state machine, its
//! read loop, and the lifecycle signals raised about it.

mod conn;
mod signal;
mod state;
mod transport;
mod ws_stream;

pub use conn::{ConnOptions, Connection};
pub use signal::{ConnSignal, SignalKind};
pub use state::{Aging, AtomicState, ConnState};
pub use transport::{Transport, TransportKind};
pub use ws_stream::{FrameBounded, WsStream};
