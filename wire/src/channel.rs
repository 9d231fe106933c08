//! Framing for the host/guest message channels.
//!
//! Each message is preceded by an 8-byte header, host-endian: a word holding the command code
//! in its low 31 bits and a response flag in its top bit, then the payload size.

use crate::Error;

/// Bit of the first header word that marks a response.
pub const RESPONSE_BIT: u32 = 1 << 31;

/// Upper bound on a single payload.
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub cmd: u32,
    pub is_response: bool,
    pub payload_size: u32,
}

impl FrameHeader {
    pub const SIZE: usize = 8;

    pub fn request(cmd: u32, payload_size: u32) -> Self {
        FrameHeader { cmd, is_response: false, payload_size }
    }

    pub fn response(cmd: u32, payload_size: u32) -> Self {
        FrameHeader { cmd, is_response: true, payload_size }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut word = self.cmd & !RESPONSE_BIT;
        if self.is_response {
            word |= RESPONSE_BIT;
        }
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&word.to_ne_bytes());
        out[4..].copy_from_slice(&self.payload_size.to_ne_bytes());
        out
    }

    pub fn decode(data: &[u8; Self::SIZE]) -> Result<Self, Error> {
        let mut word = [0u8; 4];
        word.copy_from_slice(&data[..4]);
        let word = u32::from_ne_bytes(word);
        let mut size = [0u8; 4];
        size.copy_from_slice(&data[4..]);
        let payload_size = u32::from_ne_bytes(size);
        if payload_size > MAX_PAYLOAD_SIZE {
            return Err(Error::AllocationFailed);
        }
        Ok(FrameHeader {
            cmd: word & !RESPONSE_BIT,
            is_response: word & RESPONSE_BIT != 0,
            payload_size,
        })
    }
}
