// src/core/protocol/tcp_frame.rs

//! TCP framing: an 8-byte header (payload length, message id) followed by the payload.
//!
//! Two entry points are provided. `pack_tcp`/`unpack_tcp` work on whole frames
//! over any `Read`, and `TcpFrameCodec` is the streaming `Decoder`/`Encoder`
//! used by connections, which buffer partial frames between reads.

use super::Message;
use crate::core::NetError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{self, Read};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the fixed TCP frame header.
pub const TCP_HEADER_LEN: usize = 8;

/// Payload buffer reserved up front by `unpack_tcp`.
const INITIAL_PAYLOAD_CAPACITY: usize = 64 * 1024;

/// Encodes a message into a complete TCP frame. Fails only for payloads
/// too long for the 32-bit length field.
pub fn pack_tcp(msg: &Message) -> Result<Bytes, NetError> {
    let mut dst = BytesMut::with_capacity(TCP_HEADER_LEN + msg.len());
    put_frame(msg, &mut dst)?;
    Ok(dst.freeze())
}

/// Reads exactly one TCP frame from `reader`. A short read of either the
/// header or the payload is an error.
///
/// The payload buffer grows with the bytes actually received, so a header
/// announcing a huge length costs nothing until the data shows up.
pub fn unpack_tcp<R: Read>(reader: &mut R) -> Result<Message, NetError> {
    let mut header = [0u8; TCP_HEADER_LEN];
    reader.read_exact(&mut header)?;

    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let id = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

    let mut data = Vec::with_capacity(len.min(INITIAL_PAYLOAD_CAPACITY));
    reader.take(len as u64).read_to_end(&mut data)?;
    if data.len() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("frame payload truncated at {} of {} bytes", data.len(), len),
        )
        .into());
    }

    Ok(Message::new(id, data))
}

fn put_frame(msg: &Message, dst: &mut BytesMut) -> Result<(), NetError> {
    let len = msg.wire_len()?;
    dst.reserve(TCP_HEADER_LEN + msg.len());
    dst.put_u32(len);
    dst.put_u32(msg.id());
    dst.extend_from_slice(msg.data());
    Ok(())
}

/// A `tokio_util::codec` implementation for TCP frames.
#[derive(Debug, Clone)]
pub struct TcpFrameCodec {
    max_payload: usize,
}

impl Default for TcpFrameCodec {
    fn default() -> Self {
        Self {
            max_payload: u32::MAX as usize,
        }
    }
}

impl TcpFrameCodec {
    /// Creates a codec that rejects frames announcing more than `max_payload` bytes.
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    /// Number of bytes still missing before the frame at the head of `src`
    /// can be decoded. Returns 0 when a full frame is buffered.
    ///
    /// Readers use this to never pull bytes of the following frame off the
    /// socket, so nothing is left stranded in the buffer once the socket
    /// stops reporting readiness.
    pub fn remaining(&self, src: &BytesMut) -> usize {
        if src.len() < TCP_HEADER_LEN {
            return TCP_HEADER_LEN - src.len();
        }
        let len = peek_len(src);
        (TCP_HEADER_LEN + len).saturating_sub(src.len())
    }
}

fn peek_len(src: &BytesMut) -> usize {
    u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize
}

impl Decoder for TcpFrameCodec {
    type Item = Message;
    type Error = NetError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < TCP_HEADER_LEN {
            return Ok(None);
        }

        let len = peek_len(src);
        if len > self.max_payload {
            return Err(NetError::FrameTooLarge {
                len,
                max: self.max_payload,
            });
        }

        if src.len() < TCP_HEADER_LEN + len {
            src.reserve(TCP_HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let id = src.get_u32();
        let data = src.split_to(len).freeze();
        Ok(Some(Message::new(id, data)))
    }
}

impl Encoder<Message> for TcpFrameCodec {
    type Error = NetError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.data().len() > self.max_payload {
            return Err(NetError::FrameTooLarge {
                len: item.data().len(),
                max: self.max_payload,
            });
        }
        put_frame(&item, dst)
    }
}
