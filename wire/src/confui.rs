//! Confirmation-UI sign protocol: `u8 error ‖ u32 payload_size ‖ payload`, host-endian.

use crate::Error;
use enumn::N;

/// Domain separation prefix for confirmation tokens.
pub const CONFIRMATION_TOKEN_PREFIX: &[u8] = b"confirmation token";

#[derive(Clone, Copy, Debug, PartialEq, Eq, N)]
#[repr(u8)]
pub enum SignMessageError {
    Ok = 0,
    UnknownError = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignHeader {
    pub error: SignMessageError,
    pub payload_size: u32,
}

impl SignHeader {
    pub const SIZE: usize = 5;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0] = self.error as u8;
        out[1..].copy_from_slice(&self.payload_size.to_ne_bytes());
        out
    }

    pub fn decode(data: &[u8; Self::SIZE]) -> Result<Self, Error> {
        let error = SignMessageError::n(data[0]).ok_or(Error::InvalidEnumValue(data[0] as u32))?;
        let mut size = [0u8; 4];
        size.copy_from_slice(&data[1..]);
        Ok(SignHeader { error, payload_size: u32::from_ne_bytes(size) })
    }
}
