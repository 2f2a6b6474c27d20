// src/core/protocol/ws_frame.rs

//! WebSocket framing. The transport already delimits messages, so a frame is
//! just the 4-byte message id followed by the payload.

use super::Message;
use crate::core::NetError;
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the message id prefix inside a binary WebSocket frame.
pub const WS_HEADER_LEN: usize = 4;

/// Encodes a message into the body of one binary WebSocket frame.
pub fn pack_websocket(msg: &Message) -> Bytes {
    let mut dst = BytesMut::with_capacity(WS_HEADER_LEN + msg.data().len());
    dst.put_u32(msg.id());
    dst.extend_from_slice(msg.data());
    dst.freeze()
}

/// Decodes the body of one binary WebSocket frame.
pub fn unpack_websocket(frame: Bytes) -> Result<Message, NetError> {
    if frame.len() < WS_HEADER_LEN {
        return Err(NetError::FrameTooShort {
            len: frame.len(),
            min: WS_HEADER_LEN,
        });
    }

    let id = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
    Ok(Message::new(id, frame.slice(WS_HEADER_LEN..)))
}
