// src/core/protocol/mod.rs

//! Wire framing for the two supported transports.
//!
//! TCP frames are `[4B length][4B msg-id][payload]`; WebSocket frames carry
//! `[4B msg-id][payload]` inside a single binary frame. All integers are big-endian.

pub mod message;
pub mod tcp_frame;
pub mod ws_frame;

pub use message::Message;
pub use tcp_frame::{TCP_HEADER_LEN, TcpFrameCodec, pack_tcp, unpack_tcp};
pub use ws_frame::{WS_HEADER_LEN, pack_websocket, unpack_websocket};
