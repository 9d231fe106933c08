use crate::rng::RngAdapter;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use pkcs8::{DecodePrivateKey, DecodePublicKey};
use senv_common::{
    crypto::{self, ec::NistCurve, KeyMaterial},
    km_err, Error,
};
use senv_wire::keymint::Digest;
use sha1::Sha1;
use sha2::{Digest as _, Sha224, Sha256, Sha384, Sha512};
use zeroize::Zeroize;

/// Expand to the same code once for each supported curve crate.
macro_rules! with_curve {
    { $key:expr, |$curve:ident, $der:ident| $body:expr } => {
        match $key {
            crypto::ec::Key::P256(k) => {
                use p256 as $curve;
                let $der = &k.0;
                $body
            }
            crypto::ec::Key::P384(k) => {
                use p384 as $curve;
                let $der = &k.0;
                $body
            }
        }
    }
}

fn key_err<E: core::fmt::Debug>(e: E) -> Error {
    km_err!(InvalidKeyBlob, "failed to parse EC key: {:?}", e)
}

fn encode_err<E: core::fmt::Debug>(e: E) -> Error {
    km_err!(UnknownError, "failed to encode EC key: {:?}", e)
}

/// [`crypto::Ec`] implementation based on the `p256` and `p384` crates.
pub struct RustCryptoEc;

impl crypto::Ec for RustCryptoEc {
    fn generate_nist_key(
        &self,
        rng: &mut dyn crypto::Rng,
        curve: NistCurve,
    ) -> Result<KeyMaterial, Error> {
        let mut rng = RngAdapter(rng);
        let key = match curve {
            NistCurve::P256 => {
                let der = p256::SecretKey::random(&mut rng).to_sec1_der().map_err(encode_err)?;
                crypto::ec::Key::P256(crypto::ec::NistKey(der.to_vec()))
            }
            NistCurve::P384 => {
                let der = p384::SecretKey::random(&mut rng).to_sec1_der().map_err(encode_err)?;
                crypto::ec::Key::P384(crypto::ec::NistKey(der.to_vec()))
            }
        };
        Ok(KeyMaterial::Ec(key))
    }

    fn import_pkcs8_key(&self, data: &[u8]) -> Result<KeyMaterial, Error> {
        let key = if let Ok(k) = p256::SecretKey::from_pkcs8_der(data) {
            let der = k.to_sec1_der().map_err(encode_err)?;
            crypto::ec::Key::P256(crypto::ec::NistKey(der.to_vec()))
        } else if let Ok(k) = p384::SecretKey::from_pkcs8_der(data) {
            let der = k.to_sec1_der().map_err(encode_err)?;
            crypto::ec::Key::P384(crypto::ec::NistKey(der.to_vec()))
        } else {
            return Err(km_err!(InvalidArgument, "PKCS#8 data is not a P-256 or P-384 key"));
        };
        Ok(KeyMaterial::Ec(key))
    }

    fn begin_agree(
        &self,
        key: crypto::ec::Key,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        Ok(Box::new(EcOperation { key, action: Action::Agree, data: Vec::new() }))
    }

    fn begin_sign(
        &self,
        key: crypto::ec::Key,
        digest: Digest,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        if digest == Digest::Md5 {
            return Err(km_err!(UnsupportedDigest, "MD5 not supported for ECDSA"));
        }
        Ok(Box::new(EcOperation { key, action: Action::Sign(digest), data: Vec::new() }))
    }
}

enum Action {
    Agree,
    Sign(Digest),
}

/// EC operation, which buffers all input until `finish()`.
struct EcOperation {
    key: crypto::ec::Key,
    action: Action,
    data: Vec<u8>,
}

impl Drop for EcOperation {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

impl crypto::AccumulatingOperation for EcOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error> {
        match self.action {
            Action::Agree => agree(&self.key, &self.data),
            Action::Sign(digest) => {
                let field_len = self.key.curve().coord_len();
                let prehash = prehash(digest, &self.data, field_len)?;
                sign(&self.key, &prehash)
            }
        }
    }
}

/// Digest the message and fit it to the curve's field size: longer values keep their leftmost
/// bytes and shorter ones are left-padded with zeros.
fn prehash(digest: Digest, data: &[u8], field_len: usize) -> Result<Vec<u8>, Error> {
    let mut hash = match digest {
        Digest::None => data.to_vec(),
        Digest::Sha1 => Sha1::digest(data).to_vec(),
        Digest::Sha224 => Sha224::digest(data).to_vec(),
        Digest::Sha256 => Sha256::digest(data).to_vec(),
        Digest::Sha384 => Sha384::digest(data).to_vec(),
        Digest::Sha512 => Sha512::digest(data).to_vec(),
        d => return Err(km_err!(UnsupportedDigest, "digest {:?} not supported for ECDSA", d)),
    };
    if hash.len() > field_len {
        hash.truncate(field_len);
    } else if hash.len() < field_len {
        let mut padded = vec![0u8; field_len - hash.len()];
        padded.extend_from_slice(&hash);
        hash = padded;
    }
    Ok(hash)
}

fn sign(key: &crypto::ec::Key, prehash: &[u8]) -> Result<Vec<u8>, Error> {
    with_curve!(key, |curve, der| {
        let secret = curve::SecretKey::from_sec1_der(der).map_err(key_err)?;
        let signer = curve::ecdsa::SigningKey::from(&secret);
        let sig: curve::ecdsa::Signature = signer
            .sign_prehash(prehash)
            .map_err(|e| km_err!(UnknownError, "ECDSA signing failed: {:?}", e))?;
        Ok(sig.to_der().as_bytes().to_vec())
    })
}

fn agree(key: &crypto::ec::Key, peer_spki: &[u8]) -> Result<Vec<u8>, Error> {
    with_curve!(key, |curve, der| {
        let secret = curve::SecretKey::from_sec1_der(der).map_err(key_err)?;
        let peer = curve::PublicKey::from_public_key_der(peer_spki).map_err(|e| {
            km_err!(InvalidArgument, "peer key is not a {:?} key: {:?}", key.curve(), e)
        })?;
        let shared = curve::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
        Ok(shared.raw_secret_bytes().to_vec())
    })
}
