//! Triple-DES key material and block modes.

use super::{nonce, Rng};
use crate::{
    km_err, tag,
    wire::keymint::{BlockMode, KeyParam, KeySizeInBits, PaddingMode},
    Error,
};
use alloc::vec::Vec;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a DES block in bytes.
pub const BLOCK_SIZE: usize = 8;

/// The effective size of a 3-DES key. Each of the 24 key bytes carries a parity bit.
pub const KEY_SIZE_BITS: KeySizeInBits = KeySizeInBits(168);

pub const KEY_SIZE_BYTES: usize = 24;

#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Key(pub [u8; KEY_SIZE_BYTES]);

impl Key {
    pub fn new_from(data: &[u8]) -> Result<Key, Error> {
        let bytes: [u8; KEY_SIZE_BYTES] = data.try_into().map_err(|_e| {
            km_err!(UnsupportedKeySize, "3-DES keys are 24 bytes not {}", data.len())
        })?;
        Ok(Key(bytes))
    }

    pub fn generate(rng: &mut dyn Rng) -> Self {
        let mut key = Key([0; KEY_SIZE_BYTES]);
        rng.fill_bytes(&mut key.0);
        key
    }
}

/// Mode of DES operation, carrying the IV for CBC.
#[derive(Clone, Copy, Debug)]
pub enum Mode {
    EcbNoPadding,
    EcbPkcs7Padding,
    CbcNoPadding { nonce: [u8; BLOCK_SIZE] },
    CbcPkcs7Padding { nonce: [u8; BLOCK_SIZE] },
}

impl Mode {
    /// Determine the [`Mode`] from operation parameters. CBC uses `caller_nonce` when given and a
    /// fresh random IV otherwise.
    pub fn new(
        params: &[KeyParam],
        caller_nonce: Option<&Vec<u8>>,
        rng: &mut dyn Rng,
    ) -> Result<Self, Error> {
        let mode = tag::get_block_mode(params)?;
        let padding = tag::get_padding_mode(params)?;
        let padded = match padding {
            PaddingMode::None => false,
            PaddingMode::Pkcs7 => true,
            p => return Err(km_err!(IncompatiblePaddingMode, "{:?} not valid for 3-DES", p)),
        };
        match mode {
            BlockMode::Ecb => {
                if caller_nonce.is_some() {
                    return Err(km_err!(InvalidNonce, "nonce unexpectedly provided"));
                }
                Ok(if padded { Mode::EcbPkcs7Padding } else { Mode::EcbNoPadding })
            }
            BlockMode::Cbc => {
                let nonce: [u8; BLOCK_SIZE] = nonce(BLOCK_SIZE, caller_nonce, rng)?
                    .try_into()
                    .map_err(|_e| km_err!(InvalidNonce, "want {} byte nonce", BLOCK_SIZE))?;
                Ok(if padded {
                    Mode::CbcPkcs7Padding { nonce }
                } else {
                    Mode::CbcNoPadding { nonce }
                })
            }
            m => Err(km_err!(UnsupportedBlockMode, "{:?} not valid for 3-DES", m)),
        }
    }

    /// IV to report back to the caller, if the mode has one.
    pub fn nonce(&self) -> Option<&[u8]> {
        match self {
            Mode::CbcNoPadding { nonce } | Mode::CbcPkcs7Padding { nonce } => Some(&nonce[..]),
            _ => None,
        }
    }
}
