//! Functionality related to AES encryption

use super::{nonce, Rng};
use crate::{
    get_tag_value, km_err, tag,
    wire::keymint::{BlockMode, ErrorCode, KeyParam, KeySizeInBits, PaddingMode},
    Error,
};
use alloc::vec::Vec;
use core::convert::TryInto;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of an AES block in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Size of AES-GCM nonce in bytes.
pub const GCM_NONCE_SIZE: usize = 12; // 96 bits

/// AES variant.
#[derive(Clone, Copy, Debug)]
pub enum Variant {
    Aes128,
    Aes192,
    Aes256,
}

/// An AES-128, AES-192 or AES-256 key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub enum Key {
    Aes128([u8; 16]),
    Aes192([u8; 24]),
    Aes256([u8; 32]),
}

impl Key {
    /// Create a new [`Key`] from raw data, which must be 16, 24 or 32 bytes long.
    pub fn new_from(data: &[u8]) -> Result<Self, Error> {
        let wrong_len = |_e| km_err!(UnsupportedKeySize, "AES keys must be 16, 24 or 32 bytes");
        match data.len() {
            16 => Ok(Key::Aes128(data.try_into().map_err(wrong_len)?)),
            24 => Ok(Key::Aes192(data.try_into().map_err(wrong_len)?)),
            32 => Ok(Key::Aes256(data.try_into().map_err(wrong_len)?)),
            l => Err(km_err!(UnsupportedKeySize, "AES keys must be 16, 24 or 32 bytes not {}", l)),
        }
    }

    /// Generate a random key of the given variant.
    pub fn generate(variant: Variant, rng: &mut dyn Rng) -> Self {
        let mut key = match variant {
            Variant::Aes128 => Key::Aes128([0; 16]),
            Variant::Aes192 => Key::Aes192([0; 24]),
            Variant::Aes256 => Key::Aes256([0; 32]),
        };
        match &mut key {
            Key::Aes128(k) => rng.fill_bytes(k),
            Key::Aes192(k) => rng.fill_bytes(k),
            Key::Aes256(k) => rng.fill_bytes(k),
        }
        key
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Key::Aes128(k) => k,
            Key::Aes192(k) => k,
            Key::Aes256(k) => k,
        }
    }

    /// Indicate the size of the key in bits.
    pub fn size(&self) -> KeySizeInBits {
        KeySizeInBits(match self {
            Key::Aes128(_) => 128,
            Key::Aes192(_) => 192,
            Key::Aes256(_) => 256,
        })
    }
}

/// Mode of AES plain cipher operation.  Associated value is the nonce.
#[derive(Clone, Copy, Debug)]
pub enum CipherMode {
    EcbNoPadding,
    EcbPkcs7Padding,
    CbcNoPadding { nonce: [u8; BLOCK_SIZE] },
    CbcPkcs7Padding { nonce: [u8; BLOCK_SIZE] },
    Ctr { nonce: [u8; BLOCK_SIZE] },
}

/// AES-GCM operation parameters.
#[derive(Clone, Copy, Debug)]
pub struct GcmMode {
    pub nonce: [u8; GCM_NONCE_SIZE],
    /// Tag length in bytes, 12 to 16.
    pub tag_len: usize,
}

/// Mode of AES operation.
#[derive(Clone, Copy, Debug)]
pub enum Mode {
    Cipher(CipherMode),
    Aead(GcmMode),
}

impl Mode {
    /// Determine the [`Mode`], rejecting invalid parameters. Use `caller_nonce` if provided,
    /// otherwise generate a new nonce using the provided [`Rng`] instance.
    pub fn new(
        params: &[KeyParam],
        caller_nonce: Option<&Vec<u8>>,
        rng: &mut dyn Rng,
    ) -> Result<Self, Error> {
        let mode = tag::get_block_mode(params)?;
        let padding = tag::get_padding_mode(params)?;
        match mode {
            BlockMode::Ecb => {
                if caller_nonce.is_some() {
                    return Err(km_err!(InvalidNonce, "nonce unexpectedly provided for AES-ECB"));
                }
                match padding {
                    PaddingMode::None => Ok(Mode::Cipher(CipherMode::EcbNoPadding)),
                    PaddingMode::Pkcs7 => Ok(Mode::Cipher(CipherMode::EcbPkcs7Padding)),
                    _ => Err(km_err!(
                        IncompatiblePaddingMode,
                        "expected NONE/PKCS7 padding for AES-ECB"
                    )),
                }
            }
            BlockMode::Cbc => {
                let nonce = block_nonce(caller_nonce, rng)?;
                match padding {
                    PaddingMode::None => Ok(Mode::Cipher(CipherMode::CbcNoPadding { nonce })),
                    PaddingMode::Pkcs7 => Ok(Mode::Cipher(CipherMode::CbcPkcs7Padding { nonce })),
                    _ => Err(km_err!(
                        IncompatiblePaddingMode,
                        "expected NONE/PKCS7 padding for AES-CBC"
                    )),
                }
            }
            BlockMode::Ctr => {
                if padding != PaddingMode::None {
                    return Err(km_err!(
                        IncompatiblePaddingMode,
                        "expected NONE padding for AES-CTR"
                    ));
                }
                Ok(Mode::Cipher(CipherMode::Ctr { nonce: block_nonce(caller_nonce, rng)? }))
            }
            BlockMode::Gcm => {
                if padding != PaddingMode::None {
                    return Err(km_err!(
                        IncompatiblePaddingMode,
                        "expected NONE padding for AES-GCM"
                    ));
                }
                let nonce: [u8; GCM_NONCE_SIZE] = nonce(GCM_NONCE_SIZE, caller_nonce, rng)?
                    .try_into()
                    .map_err(|_e| km_err!(InvalidNonce, "want 12 byte nonce for AES-GCM"))?;
                let tag_bits = get_tag_value!(params, MacLength, ErrorCode::MissingMacLength)?;
                if tag_bits % 8 != 0 || !(96..=128).contains(&tag_bits) {
                    return Err(km_err!(
                        UnsupportedMacLength,
                        "want 96-128 bit tag for AES-GCM not {} bits",
                        tag_bits
                    ));
                }
                Ok(Mode::Aead(GcmMode { nonce, tag_len: (tag_bits / 8) as usize }))
            }
        }
    }

    /// Nonce to report back to the caller, if the mode has one.
    pub fn nonce(&self) -> Option<&[u8]> {
        match self {
            Mode::Cipher(CipherMode::EcbNoPadding) | Mode::Cipher(CipherMode::EcbPkcs7Padding) => {
                None
            }
            Mode::Cipher(CipherMode::CbcNoPadding { nonce })
            | Mode::Cipher(CipherMode::CbcPkcs7Padding { nonce })
            | Mode::Cipher(CipherMode::Ctr { nonce }) => Some(nonce),
            Mode::Aead(GcmMode { nonce, .. }) => Some(nonce),
        }
    }
}

fn block_nonce(
    caller_nonce: Option<&Vec<u8>>,
    rng: &mut dyn Rng,
) -> Result<[u8; BLOCK_SIZE], Error> {
    nonce(BLOCK_SIZE, caller_nonce, rng)?
        .try_into()
        .map_err(|_e| km_err!(InvalidNonce, "want {} byte nonce", BLOCK_SIZE))
}
