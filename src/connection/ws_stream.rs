// src/connection/ws_stream.rs

//! The socket under a WebSocket session, with reads bounded at frame edges.
//!
//! tungstenite reads whatever the socket offers into its own buffer. Frames
//! parked there are invisible to epoll, so a connection that spent its read
//! budget would not be woken for them again. `FrameBounded` follows frame
//! headers through the inbound byte stream and never hands the session more
//! than the rest of the current frame, which leaves the following frames in
//! the kernel where the reactor can see them.

use std::io::{self, Read, Write};
use std::net::TcpStream;

/// First two header bytes: FIN/opcode and MASK/length.
const BASE_HEADER_LEN: usize = 2;

/// Base header, 8-byte extended length, and the 4-byte masking key.
const MAX_HEADER_LEN: usize = BASE_HEADER_LEN + 8 + 4;

/// The stream type every engine WebSocket session runs over.
pub type WsStream = FrameBounded<TcpStream>;

#[derive(Debug)]
pub struct FrameBounded<S> {
    inner: S,
    tracking: bool,
    header: [u8; MAX_HEADER_LEN],
    have: usize,
    need: usize,
    payload_left: u64,
}

impl<S> FrameBounded<S> {
    /// Wraps `inner` with reads passed through unbounded. The HTTP upgrade
    /// runs in this mode; call [`FrameBounded::track_frames`] afterwards.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            tracking: false,
            header: [0; MAX_HEADER_LEN],
            have: 0,
            need: BASE_HEADER_LEN,
            payload_left: 0,
        }
    }

    /// Wraps `inner`, which must be positioned at the start of a frame.
    pub fn bounded(inner: S) -> Self {
        let mut stream = Self::new(inner);
        stream.track_frames();
        stream
    }

    /// Starts bounding reads at the current position, which is taken to be
    /// a frame boundary.
    pub fn track_frames(&mut self) {
        self.tracking = true;
        self.have = 0;
        self.need = BASE_HEADER_LEN;
        self.payload_left = 0;
    }

    /// True when the bytes read so far end exactly on a frame edge.
    pub fn at_frame_boundary(&self) -> bool {
        self.payload_left == 0 && self.have == 0
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// How many bytes may be read before crossing into the next frame.
    fn limit(&self) -> u64 {
        if self.payload_left > 0 {
            self.payload_left
        } else {
            (self.need - self.have) as u64
        }
    }

    /// Advances the frame tracker over `bytes`, which never exceed `limit()`.
    fn consume(&mut self, bytes: &[u8]) {
        if self.payload_left > 0 {
            self.payload_left -= bytes.len() as u64;
            return;
        }

        self.header[self.have..self.have + bytes.len()].copy_from_slice(bytes);
        self.have += bytes.len();
        if self.have == BASE_HEADER_LEN && self.need == BASE_HEADER_LEN {
            self.need = BASE_HEADER_LEN + extension_len(self.header[1]);
        }
        if self.have == self.need {
            self.payload_left = payload_len(&self.header[..self.need]);
            self.have = 0;
            self.need = BASE_HEADER_LEN;
        }
    }
}

/// Extended-length and masking-key bytes announced by the second header byte.
fn extension_len(second: u8) -> usize {
    let mask = if second & 0x80 != 0 { 4 } else { 0 };
    let len = match second & 0x7F {
        126 => 2,
        127 => 8,
        _ => 0,
    };
    mask + len
}

fn payload_len(header: &[u8]) -> u64 {
    match header[1] & 0x7F {
        126 => u64::from(u16::from_be_bytes([header[2], header[3]])),
        127 => {
            let mut len = [0u8; 8];
            len.copy_from_slice(&header[2..10]);
            u64::from_be_bytes(len)
        }
        n => u64::from(n),
    }
}

impl<S: Read> Read for FrameBounded<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.tracking {
            return self.inner.read(buf);
        }

        let want = usize::try_from(self.limit())
            .unwrap_or(usize::MAX)
            .min(buf.len());
        let n = self.inner.read(&mut buf[..want])?;
        self.consume(&buf[..n]);
        Ok(n)
    }
}

impl<S: Write> Write for FrameBounded<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
