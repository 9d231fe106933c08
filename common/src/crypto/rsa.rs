//! RSA key material, and the padding modes KeyMint offers for it.

use super::KeyMaterial;
use crate::{
    km_err, tag, try_to_vec,
    wire::keymint::{Digest, KeyParam, KeySizeInBits, PaddingMode, RsaExponent},
    Error,
};
use alloc::vec::Vec;
use der::{
    asn1::{BitString, UintRef},
    Any, AnyRef, Decode, Encode,
};
use spki::{AlgorithmIdentifierOwned, ObjectIdentifier, SubjectPublicKeyInfoOwned};
use zeroize::ZeroizeOnDrop;

/// Overhead for PKCS#1 v1.5 signature padding of undigested messages.
pub const PKCS1_UNDIGESTED_SIGNATURE_PADDING_OVERHEAD: usize = 11;

/// OID of PKCS#1 RSA keys held in PKCS#8 and X.509; see RFC 3447 A.1.
pub const X509_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// OID of PKCS#1 signatures with SHA-256; see RFC 4055 s5.
pub const SHA256_PKCS1_SIGNATURE_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

/// An RSA key, held as the DER encoding of a PKCS#1 `RSAPrivateKey` (RFC 3447 A.1.2).
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct Key(pub Vec<u8>);

fn uint_bits(value: UintRef<'_>) -> u32 {
    match value.as_bytes().first() {
        Some(top) => (value.as_bytes().len() as u32) * 8 - top.leading_zeros(),
        None => 0,
    }
}

impl Key {
    /// The public half as an X.509 `SubjectPublicKeyInfo`, with NULL algorithm parameters and a
    /// PKCS#1 `RSAPublicKey` as the key bits (RFC 3279 s2.3.1).
    pub fn subject_public_key_info(&self) -> Result<SubjectPublicKeyInfoOwned, Error> {
        let private = pkcs1::RsaPrivateKey::from_der(&self.0)?;
        let public = private.public_key().to_der()?;
        Ok(SubjectPublicKeyInfoOwned {
            algorithm: AlgorithmIdentifierOwned {
                oid: X509_OID,
                parameters: Some(Any::from(AnyRef::NULL)),
            },
            subject_public_key: BitString::from_bytes(&public)?,
        })
    }

    /// Size of the modulus.
    pub fn size(&self) -> Result<KeySizeInBits, Error> {
        let private = pkcs1::RsaPrivateKey::from_der(&self.0)?;
        Ok(KeySizeInBits(uint_bits(private.modulus)))
    }

    pub fn exponent(&self) -> Result<RsaExponent, Error> {
        let private = pkcs1::RsaPrivateKey::from_der(&self.0)?;
        let bytes = private.public_exponent.as_bytes();
        if bytes.len() > 8 {
            return Err(km_err!(UnsupportedKeySize, "public exponent of {} bytes", bytes.len()));
        }
        Ok(RsaExponent(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))))
    }
}

/// Import an RSA key in PKCS#8 format, returning it with its size and public exponent.
pub fn import_pkcs8_key(data: &[u8]) -> Result<(KeyMaterial, KeySizeInBits, RsaExponent), Error> {
    let key_info = pkcs8::PrivateKeyInfo::try_from(data)
        .map_err(|e| km_err!(InvalidArgument, "failed to parse PKCS#8 RSA key: {:?}", e))?;
    if key_info.algorithm.oid != X509_OID {
        return Err(km_err!(
            InvalidArgument,
            "unexpected OID {:?} for PKCS#8 RSA key import",
            key_info.algorithm.oid
        ));
    }
    let key = Key(try_to_vec(key_info.private_key)?);
    let key_size = key.size()?;
    let exponent = key.exponent()?;
    Ok((KeyMaterial::Rsa(key), key_size, exponent))
}

/// RSA decryption mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptionMode {
    NoPadding,
    OaepPadding { msg_digest: Digest, mgf_digest: Digest },
    Pkcs1_1_5Padding,
}

impl DecryptionMode {
    pub fn new(params: &[KeyParam]) -> Result<Self, Error> {
        let padding = tag::get_padding_mode(params)?;
        match padding {
            PaddingMode::None => Ok(DecryptionMode::NoPadding),
            PaddingMode::RsaOaep => {
                let msg_digest = tag::get_digest(params)?;
                let mgf_digest = tag::get_mgf_digest(params)?;
                Ok(DecryptionMode::OaepPadding { msg_digest, mgf_digest })
            }
            PaddingMode::RsaPkcs115Encrypt => Ok(DecryptionMode::Pkcs1_1_5Padding),
            _ => Err(km_err!(
                UnsupportedPaddingMode,
                "padding mode {:?} not supported for RSA decryption",
                padding
            )),
        }
    }
}

/// RSA signature mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignMode {
    NoPadding,
    PssPadding(Digest),
    Pkcs1_1_5Padding(Digest),
}

impl SignMode {
    pub fn new(params: &[KeyParam]) -> Result<Self, Error> {
        let padding = tag::get_padding_mode(params)?;
        match padding {
            PaddingMode::None => Ok(SignMode::NoPadding),
            PaddingMode::RsaPss => Ok(SignMode::PssPadding(tag::get_digest(params)?)),
            PaddingMode::RsaPkcs115Sign => Ok(SignMode::Pkcs1_1_5Padding(tag::get_digest(params)?)),
            _ => Err(km_err!(
                UnsupportedPaddingMode,
                "padding mode {:?} not supported for RSA signing",
                padding
            )),
        }
    }
}
