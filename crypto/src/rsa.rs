use crate::rng::RngAdapter;
use der::oid::AssociatedOid;
use rand::rngs::OsRng;
use rsa::{
    hazmat::rsa_decrypt_and_check,
    pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey},
    traits::PublicKeyParts,
    BigUint, Oaep, Pkcs1v15Encrypt, Pkcs1v15Sign, Pss, RsaPrivateKey,
};
use senv_common::{
    crypto::{self, rsa::DecryptionMode, rsa::SignMode, KeyMaterial},
    km_err, Error,
};
use senv_wire::keymint::{Digest, KeySizeInBits, RsaExponent};
use sha1::Sha1;
use sha2::{digest::DynDigest, Sha224, Sha256, Sha384, Sha512};
use zeroize::Zeroize;

/// Dispatch to a function generic over the hash named by a [`Digest`].
macro_rules! with_digest {
    { $digest:expr, $func:ident $(, $arg:expr)* } => {
        match $digest {
            Digest::Sha1 => $func::<Sha1>($($arg),*),
            Digest::Sha224 => $func::<Sha224>($($arg),*),
            Digest::Sha256 => $func::<Sha256>($($arg),*),
            Digest::Sha384 => $func::<Sha384>($($arg),*),
            Digest::Sha512 => $func::<Sha512>($($arg),*),
            d => Err(km_err!(UnsupportedDigest, "digest {:?} not supported for RSA", d)),
        }
    }
}

fn rsa_err(e: rsa::Error) -> Error {
    match e {
        rsa::Error::Decryption => km_err!(InvalidArgument, "RSA decryption failed"),
        rsa::Error::MessageTooLong => km_err!(InvalidInputLength, "RSA input too long"),
        e => km_err!(UnknownError, "RSA failure: {:?}", e),
    }
}

fn private_key(key: &crypto::rsa::Key) -> Result<RsaPrivateKey, Error> {
    RsaPrivateKey::from_pkcs1_der(&key.0)
        .map_err(|e| km_err!(InvalidKeyBlob, "failed to parse RSA key: {:?}", e))
}

/// [`crypto::Rsa`] implementation based on the `rsa` crate.
pub struct RustCryptoRsa;

impl crypto::Rsa for RustCryptoRsa {
    fn generate_key(
        &self,
        rng: &mut dyn crypto::Rng,
        key_size: KeySizeInBits,
        exponent: RsaExponent,
    ) -> Result<KeyMaterial, Error> {
        let mut rng = RngAdapter(rng);
        let key = RsaPrivateKey::new_with_exp(
            &mut rng,
            key_size.0 as usize,
            &BigUint::from(exponent.0),
        )
        .map_err(rsa_err)?;
        let der = key
            .to_pkcs1_der()
            .map_err(|e| km_err!(UnknownError, "failed to encode RSA key: {:?}", e))?;
        Ok(KeyMaterial::Rsa(crypto::rsa::Key(der.as_bytes().to_vec())))
    }

    fn begin_decrypt(
        &self,
        key: crypto::rsa::Key,
        mode: DecryptionMode,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        let key = private_key(&key)?;
        Ok(Box::new(RsaOperation { key, action: Action::Decrypt(mode), data: Vec::new() }))
    }

    fn begin_sign(
        &self,
        key: crypto::rsa::Key,
        mode: SignMode,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        let key = private_key(&key)?;
        Ok(Box::new(RsaOperation { key, action: Action::Sign(mode), data: Vec::new() }))
    }
}

enum Action {
    Decrypt(DecryptionMode),
    Sign(SignMode),
}

/// RSA operation, which buffers all input until `finish()`.
struct RsaOperation {
    key: RsaPrivateKey,
    action: Action,
    data: Vec<u8>,
}

impl Drop for RsaOperation {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

impl crypto::AccumulatingOperation for RsaOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        let max = self.max_input_size();
        if self.data.len() + data.len() > max {
            return Err(km_err!(
                InvalidInputLength,
                "RSA input of {} bytes exceeds {} byte limit",
                self.data.len() + data.len(),
                max
            ));
        }
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error> {
        let key = &self.key;
        let data = &self.data;
        match self.action {
            Action::Decrypt(DecryptionMode::NoPadding) => raw_private(key, data),
            Action::Decrypt(DecryptionMode::Pkcs1_1_5Padding) => {
                key.decrypt(Pkcs1v15Encrypt, data).map_err(rsa_err)
            }
            Action::Decrypt(DecryptionMode::OaepPadding { msg_digest, mgf_digest }) => {
                let padding = Oaep {
                    digest: dyn_digest(msg_digest)?,
                    mgf_digest: dyn_digest(mgf_digest)?,
                    label: None,
                };
                key.decrypt(padding, data).map_err(rsa_err)
            }
            Action::Sign(SignMode::NoPadding) => raw_private(key, data),
            Action::Sign(SignMode::Pkcs1_1_5Padding(Digest::None)) => {
                key.sign(Pkcs1v15Sign::new_unprefixed(), data).map_err(rsa_err)
            }
            Action::Sign(SignMode::Pkcs1_1_5Padding(digest)) => {
                with_digest!(digest, pkcs1_sign, key, data)
            }
            Action::Sign(SignMode::PssPadding(digest)) => {
                with_digest!(digest, pss_sign, key, data)
            }
        }
    }
}

impl RsaOperation {
    /// Digesting signatures take unbounded input; everything else is limited by the modulus.
    fn max_input_size(&self) -> usize {
        let size = self.key.size();
        match self.action {
            Action::Sign(SignMode::Pkcs1_1_5Padding(Digest::None)) => {
                size.saturating_sub(crypto::rsa::PKCS1_UNDIGESTED_SIGNATURE_PADDING_OVERHEAD)
            }
            Action::Sign(SignMode::Pkcs1_1_5Padding(_) | SignMode::PssPadding(_)) => usize::MAX,
            _ => size,
        }
    }
}

/// Apply the private key to `data`, left-padded to the modulus size.
fn raw_private(key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, Error> {
    let size = key.size();
    let input = BigUint::from_bytes_be(data);
    if &input >= key.n() {
        return Err(km_err!(InvalidArgument, "RSA input exceeds modulus"));
    }
    let output = rsa_decrypt_and_check(key, Some(&mut OsRng), &input).map_err(rsa_err)?;
    let bytes = output.to_bytes_be();
    let mut result = vec![0u8; size - bytes.len()];
    result.extend_from_slice(&bytes);
    Ok(result)
}

fn dyn_digest(digest: Digest) -> Result<Box<dyn DynDigest + Send + Sync>, Error> {
    Ok(match digest {
        Digest::Sha1 => Box::new(Sha1::default()),
        Digest::Sha224 => Box::new(Sha224::default()),
        Digest::Sha256 => Box::new(Sha256::default()),
        Digest::Sha384 => Box::new(Sha384::default()),
        Digest::Sha512 => Box::new(Sha512::default()),
        d => return Err(km_err!(UnsupportedDigest, "digest {:?} not supported for OAEP", d)),
    })
}

fn pkcs1_sign<D>(key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, Error>
where
    D: sha2::Digest + AssociatedOid,
{
    let hashed = D::digest(data);
    key.sign(Pkcs1v15Sign::new::<D>(), &hashed).map_err(rsa_err)
}

fn pss_sign<D>(key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, Error>
where
    D: sha2::Digest + DynDigest + Send + Sync + 'static,
{
    let hashed = <D as sha2::Digest>::digest(data);
    key.sign_with_rng(&mut OsRng, Pss::new::<D>(), &hashed).map_err(rsa_err)
}
