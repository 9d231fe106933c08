//! HMAC key material and the size rules KeyMint applies to it.

use crate::{km_err, wire::keymint::{Digest, KeySizeInBits}, Error};
use alloc::vec::Vec;
use core::ops::RangeInclusive;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Accepted key sizes, and accepted `MIN_MAC_LENGTH` values, in bits.
const KEY_BITS: RangeInclusive<u32> = 64..=512;
const MIN_MAC_BITS: RangeInclusive<u32> = 64..=512;

#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Key(pub Vec<u8>);

impl Key {
    pub fn new_from(data: &[u8]) -> Key {
        Key(data.to_vec())
    }

    pub fn size(&self) -> KeySizeInBits {
        KeySizeInBits((self.0.len() * 8) as u32)
    }
}

fn whole_bytes_in(bits: u32, range: &RangeInclusive<u32>) -> bool {
    bits % 8 == 0 && range.contains(&bits)
}

pub fn valid_hal_size(key_size: KeySizeInBits) -> Result<(), Error> {
    if !whole_bytes_in(key_size.0, &KEY_BITS) {
        return Err(km_err!(UnsupportedKeySize, "HMAC key of {} bits", key_size.0));
    }
    Ok(())
}

pub fn valid_min_mac_len(min_mac_len: u32) -> Result<(), Error> {
    if !whole_bytes_in(min_mac_len, &MIN_MAC_BITS) {
        return Err(km_err!(UnsupportedMinMacLength, "MIN_MAC_LENGTH of {} bits", min_mac_len));
    }
    Ok(())
}

/// Output size in bits of `digest`, which must be usable with HMAC.
pub fn digest_len(digest: Digest) -> Result<u32, Error> {
    Ok(match digest {
        Digest::Sha1 => 160,
        Digest::Sha224 => 224,
        Digest::Sha256 => 256,
        Digest::Sha384 => 384,
        Digest::Sha512 => 512,
        Digest::None | Digest::Md5 => {
            return Err(km_err!(UnsupportedDigest, "{:?} cannot be used with HMAC", digest))
        }
    })
}
