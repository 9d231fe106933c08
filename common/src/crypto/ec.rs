//! Elliptic curve key material. Only the NIST P-256 and P-384 curves are offered.

use crate::{
    km_err, try_to_vec,
    wire::keymint::{EcCurve, KeySizeInBits},
    Error,
};
use alloc::vec::Vec;
use coset::{cbor::value::Value, iana, CoseKey, CoseKeyBuilder};
use der::{asn1::BitString, Any, AnyRef, Decode};
use spki::{AlgorithmIdentifierOwned, ObjectIdentifier, SubjectPublicKeyInfoOwned};
use zeroize::ZeroizeOnDrop;

/// Marker value used to indicate that a public key is for RKP test mode.
pub const RKP_TEST_KEY_CBOR_MARKER: i64 = -70000;

/// Initial byte of SEC1 public key encoding that indicates an uncompressed point.
pub const SEC1_UNCOMPRESSED_PREFIX: u8 = 0x04;

/// OID of NIST EC keys held in PKCS#8 and X.509; see RFC 5480 s2.1.1.
pub const X509_NIST_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// OID of ECDSA signatures with SHA-256; see RFC 5758 s3.2.
pub const ECDSA_SHA256_SIGNATURE_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

pub const ALGO_PARAM_P256_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
pub const ALGO_PARAM_P384_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// The subset of [`EcCurve`] values that keys can be generated or imported on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NistCurve {
    P256,
    P384,
}

impl NistCurve {
    /// Curve coordinate size in bytes.
    pub fn coord_len(&self) -> usize {
        match self {
            NistCurve::P256 => 32,
            NistCurve::P384 => 48,
        }
    }

    pub fn key_size(&self) -> KeySizeInBits {
        KeySizeInBits(match self {
            NistCurve::P256 => 256,
            NistCurve::P384 => 384,
        })
    }

    /// OID naming the curve in `AlgorithmIdentifier` parameters.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            NistCurve::P256 => ALGO_PARAM_P256_OID,
            NistCurve::P384 => ALGO_PARAM_P384_OID,
        }
    }
}

impl From<NistCurve> for EcCurve {
    fn from(nist: NistCurve) -> EcCurve {
        match nist {
            NistCurve::P256 => EcCurve::P256,
            NistCurve::P384 => EcCurve::P384,
        }
    }
}

impl TryFrom<EcCurve> for NistCurve {
    type Error = Error;
    fn try_from(curve: EcCurve) -> Result<NistCurve, Error> {
        match curve {
            EcCurve::P256 => Ok(NistCurve::P256),
            EcCurve::P384 => Ok(NistCurve::P384),
            c => Err(km_err!(UnsupportedEcCurve, "curve {:?} not supported", c)),
        }
    }
}

/// A NIST EC key, held as the DER encoding of a SEC1 `ECPrivateKey` (RFC 5915 s3) that carries
/// both the named curve and the public point.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct NistKey(pub Vec<u8>);

/// Elliptic curve private key material.
#[derive(Clone, PartialEq, Eq)]
pub enum Key {
    P256(NistKey),
    P384(NistKey),
}

impl Key {
    /// Rebuild a key from its SEC1 encoding, taking the curve from the named-curve parameter.
    pub fn from_sec1(data: &[u8]) -> Result<Self, Error> {
        let parsed = sec1::EcPrivateKey::from_der(data)?;
        let oid = parsed
            .parameters
            .and_then(|p| p.named_curve())
            .ok_or_else(|| km_err!(InvalidKeyBlob, "EC key without a named curve"))?;
        let key = NistKey(try_to_vec(data)?);
        if oid == ALGO_PARAM_P256_OID {
            Ok(Key::P256(key))
        } else if oid == ALGO_PARAM_P384_OID {
            Ok(Key::P384(key))
        } else {
            Err(km_err!(UnsupportedEcCurve, "EC key on unknown curve {:?}", oid))
        }
    }

    pub fn curve(&self) -> NistCurve {
        match self {
            Key::P256(_) => NistCurve::P256,
            Key::P384(_) => NistCurve::P384,
        }
    }

    /// The SEC1 `ECPrivateKey` encoding.
    pub fn private_key_der(&self) -> &[u8] {
        match self {
            Key::P256(k) | Key::P384(k) => &k.0,
        }
    }

    /// Uncompressed SEC1 encoding of the public point.
    pub fn public_point(&self) -> Result<Vec<u8>, Error> {
        let parsed = sec1::EcPrivateKey::from_der(self.private_key_der())?;
        let point = parsed
            .public_key
            .ok_or_else(|| km_err!(InvalidKeyBlob, "EC key without a public point"))?;
        let coord_len = self.curve().coord_len();
        if point.len() != 1 + 2 * coord_len || point[0] != SEC1_UNCOMPRESSED_PREFIX {
            return Err(km_err!(
                UnknownError,
                "unexpected SEC1 public point of {} bytes for {:?}",
                point.len(),
                self.curve()
            ));
        }
        try_to_vec(point)
    }

    /// The public half as an X.509 `SubjectPublicKeyInfo` (RFC 5480 s2.1).
    pub fn subject_public_key_info(&self) -> Result<SubjectPublicKeyInfoOwned, Error> {
        let point = self.public_point()?;
        let curve_oid = self.curve().oid();
        Ok(SubjectPublicKeyInfoOwned {
            algorithm: AlgorithmIdentifierOwned {
                oid: X509_NIST_OID,
                parameters: Some(Any::from(AnyRef::from(&curve_oid))),
            },
            subject_public_key: BitString::from_bytes(&point)?,
        })
    }

    /// The public half as a COSE_Key, optionally marked as an RKP test key.
    pub fn public_cose_key(&self, test_mode: bool) -> Result<CoseKey, Error> {
        let point = self.public_point()?;
        let coord_len = self.curve().coord_len();
        let x = try_to_vec(&point[1..1 + coord_len])?;
        let y = try_to_vec(&point[1 + coord_len..])?;
        let mut builder = match self {
            Key::P256(_) => CoseKeyBuilder::new_ec2_pub_key(iana::EllipticCurve::P_256, x, y)
                .algorithm(iana::Algorithm::ES256),
            Key::P384(_) => CoseKeyBuilder::new_ec2_pub_key(iana::EllipticCurve::P_384, x, y)
                .algorithm(iana::Algorithm::ES384),
        };
        if test_mode {
            builder = builder.param(RKP_TEST_KEY_CBOR_MARKER, Value::Null);
        }
        Ok(builder.build())
    }
}
