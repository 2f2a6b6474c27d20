// src/core/protocol/message.rs

use crate::core::NetError;
use bytes::Bytes;

/// The decoded unit of application data: a message id plus its payload.
///
/// The payload length is always derived from the payload itself, so a
/// `Message` can never disagree with its own length field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: u32,
    data: Bytes,
}

impl Message {
    pub fn new(id: u32, data: impl Into<Bytes>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }

    /// The message id used for routing.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Payload length as carried in a 32-bit length field. Payloads that do
    /// not fit cannot be framed.
    pub fn wire_len(&self) -> Result<u32, NetError> {
        u32::try_from(self.data.len()).map_err(|_| NetError::FrameTooLarge {
            len: self.data.len(),
            max: u32::MAX as usize,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }
}
