//! Abstractions and related types for accessing cryptographic primitives
//! and related functionality.

use crate::{
    km_err, try_to_vec, vec_try,
    wire::keymint::{Algorithm, Digest, KeySizeInBits, RsaExponent},
    Error,
};
use alloc::vec::Vec;
use zeroize::Zeroize;

pub mod aes;
pub mod des;
pub mod ec;
pub mod hmac;
pub mod rsa;
mod traits;
pub use traits::*;

/// Size of SHA-256 output in bytes.
pub const SHA256_DIGEST_LEN: usize = 32;

/// Milliseconds since an arbitrary epoch.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MillisecondsSinceEpoch(pub i64);

/// Information for key generation.
#[derive(Clone, Debug)]
pub enum KeyGenInfo {
    Aes(aes::Variant),
    TripleDes,
    Hmac(KeySizeInBits),
    Rsa(KeySizeInBits, RsaExponent),
    NistEc(ec::NistCurve),
}

/// Plaintext key material.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Aes(aes::Key),
    TripleDes(des::Key),
    Hmac(hmac::Key),
    Rsa(rsa::Key),
    Ec(ec::Key),
}

impl KeyMaterial {
    /// Rebuild key material from the bytes held in a key blob: raw bytes for symmetric keys,
    /// PKCS#1 DER for RSA and SEC1 DER for EC.
    pub fn from_raw(algorithm: Algorithm, raw: &[u8]) -> Result<Self, Error> {
        match algorithm {
            Algorithm::Aes => Ok(KeyMaterial::Aes(aes::Key::new_from(raw)?)),
            Algorithm::TripleDes => Ok(KeyMaterial::TripleDes(des::Key::new_from(raw)?)),
            Algorithm::Hmac => Ok(KeyMaterial::Hmac(hmac::Key::new_from(raw))),
            Algorithm::Rsa => Ok(KeyMaterial::Rsa(rsa::Key(try_to_vec(raw)?))),
            Algorithm::Ec => Ok(KeyMaterial::Ec(ec::Key::from_sec1(raw)?)),
        }
    }

    /// Key bytes, as stored in a key blob.
    pub fn raw(&self) -> &[u8] {
        match self {
            KeyMaterial::Aes(k) => k.as_bytes(),
            KeyMaterial::TripleDes(k) => &k.0,
            KeyMaterial::Hmac(k) => &k.0,
            KeyMaterial::Rsa(k) => &k.0,
            KeyMaterial::Ec(k) => k.private_key_der(),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            KeyMaterial::Aes(_) => Algorithm::Aes,
            KeyMaterial::TripleDes(_) => Algorithm::TripleDes,
            KeyMaterial::Hmac(_) => Algorithm::Hmac,
            KeyMaterial::Rsa(_) => Algorithm::Rsa,
            KeyMaterial::Ec(_) => Algorithm::Ec,
        }
    }

    /// The public half as an X.509 `SubjectPublicKeyInfo`, for asymmetric keys.
    pub fn subject_public_key_info(&self) -> Result<spki::SubjectPublicKeyInfoOwned, Error> {
        match self {
            KeyMaterial::Rsa(k) => k.subject_public_key_info(),
            KeyMaterial::Ec(k) => k.subject_public_key_info(),
            _ => Err(km_err!(
                IncompatibleAlgorithm,
                "no public key for {:?}",
                self.algorithm()
            )),
        }
    }
}

/// Manual implementation of [`Debug`] that skips emitting plaintext key material.
impl core::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Aes(k) => match k {
                aes::Key::Aes128(_) => f.write_str("Aes128(...)"),
                aes::Key::Aes192(_) => f.write_str("Aes192(...)"),
                aes::Key::Aes256(_) => f.write_str("Aes256(...)"),
            },
            Self::TripleDes(_) => f.write_str("TripleDes(...)"),
            Self::Hmac(_) => f.write_str("Hmac(...)"),
            Self::Rsa(_) => f.write_str("Rsa(...)"),
            Self::Ec(k) => write!(f, "Ec({:?}, ...)", k.curve()),
        }
    }
}

/// Direction of cipher operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymmetricOperation {
    Encrypt,
    Decrypt,
}

/// Extract or generate a nonce of the given size.
pub fn nonce(
    size: usize,
    caller_nonce: Option<&Vec<u8>>,
    rng: &mut dyn Rng,
) -> Result<Vec<u8>, Error> {
    match caller_nonce {
        Some(n) => match n.len() {
            l if l == size => Ok(n.clone()),
            _ => Err(km_err!(InvalidNonce, "want {} byte nonce", size)),
        },
        None => {
            let mut n = vec_try![0; size]?;
            rng.fill_bytes(&mut n);
            Ok(n)
        }
    }
}

/// Convenience wrapper to perform one-shot HMAC-SHA256.
pub fn hmac_sha256(hmac: &dyn Hmac, key: &[u8], chunks: &[&[u8]]) -> Result<Vec<u8>, Error> {
    let mut op = hmac.begin(hmac::Key::new_from(key), Digest::Sha256)?;
    for chunk in chunks {
        op.update(chunk)?;
    }
    op.finish()
}

/// Zeroizing wrapper for a fixed-size secret.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Secret<const N: usize>(pub [u8; N]);

impl<const N: usize> Secret<N> {
    pub fn random(rng: &mut dyn Rng) -> Self {
        let mut s = Secret([0u8; N]);
        rng.fill_bytes(&mut s.0);
        s
    }
}
