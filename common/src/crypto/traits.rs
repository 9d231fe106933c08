//! The crypto primitives the engines consume, and the device-key HMAC shared between them.

use super::*;
use crate::Error;
use alloc::{boxed::Box, vec::Vec};
use log::warn;

/// Primitives an engine is built from.
pub struct Implementation {
    pub rng: Box<dyn Rng>,
    /// Boot-relative time, shared with auth token timestamps.
    pub clock: Box<dyn MonotonicClock>,
    pub compare: Box<dyn ConstTimeEq>,
    pub aes: Box<dyn Aes>,
    pub des: Box<dyn Des>,
    pub hmac: Box<dyn Hmac>,
    pub rsa: Box<dyn Rsa>,
    pub ec: Box<dyn Ec>,
    pub sha256: Box<dyn Sha256>,
}

/// Cryptographically secure randomness that accepts extra entropy from the guest.
pub trait Rng {
    fn add_entropy(&mut self, data: &[u8]);
    fn fill_bytes(&mut self, dest: &mut [u8]);
    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }
}

/// Comparison whose timing does not depend on where the inputs differ.
pub trait ConstTimeEq {
    fn eq(&self, left: &[u8], right: &[u8]) -> bool;
    fn ne(&self, left: &[u8], right: &[u8]) -> bool {
        !self.eq(left, right)
    }
}

pub trait MonotonicClock {
    /// Milliseconds since boot, advancing across host suspend.
    fn now(&self) -> MillisecondsSinceEpoch;
}

pub trait Aes {
    /// Unpadded ECB and CBC operations fail with `InvalidInputLength` unless the total input is
    /// whole blocks.
    fn begin(
        &self,
        key: aes::Key,
        mode: aes::CipherMode,
        dir: SymmetricOperation,
    ) -> Result<Box<dyn EmittingOperation>, Error>;

    fn begin_aead(
        &self,
        key: aes::Key,
        mode: aes::GcmMode,
        dir: SymmetricOperation,
    ) -> Result<Box<dyn AadOperation>, Error>;
}

pub trait Des {
    fn begin(
        &self,
        key: des::Key,
        mode: des::Mode,
        dir: SymmetricOperation,
    ) -> Result<Box<dyn EmittingOperation>, Error>;
}

pub trait Hmac {
    /// `digest` is always one of the SHA family.
    fn begin(
        &self,
        key: hmac::Key,
        digest: Digest,
    ) -> Result<Box<dyn AccumulatingOperation>, Error>;
}

pub trait Rsa {
    fn generate_key(
        &self,
        rng: &mut dyn Rng,
        key_size: KeySizeInBits,
        exponent: RsaExponent,
    ) -> Result<KeyMaterial, Error>;

    /// Import a PKCS#8 key, returning it with its size and public exponent.
    fn import_pkcs8_key(
        &self,
        data: &[u8],
    ) -> Result<(KeyMaterial, KeySizeInBits, RsaExponent), Error> {
        rsa::import_pkcs8_key(data)
    }

    fn begin_decrypt(
        &self,
        key: rsa::Key,
        mode: rsa::DecryptionMode,
    ) -> Result<Box<dyn AccumulatingOperation>, Error>;

    /// The input is the message itself, which is digested according to `mode`.
    fn begin_sign(
        &self,
        key: rsa::Key,
        mode: rsa::SignMode,
    ) -> Result<Box<dyn AccumulatingOperation>, Error>;
}

pub trait Ec {
    fn generate_nist_key(
        &self,
        rng: &mut dyn Rng,
        curve: ec::NistCurve,
    ) -> Result<KeyMaterial, Error>;

    /// Import a PKCS#8 key on one of the [`ec::NistCurve`]s.
    fn import_pkcs8_key(&self, data: &[u8]) -> Result<KeyMaterial, Error>;

    /// ECDH. The input is the peer's DER-encoded `SubjectPublicKeyInfo` and the output is the
    /// raw shared secret.
    fn begin_agree(&self, key: ec::Key) -> Result<Box<dyn AccumulatingOperation>, Error>;

    /// ECDSA. The output is a DER-encoded `ECDSA-Sig-Value`.
    fn begin_sign(
        &self,
        key: ec::Key,
        digest: Digest,
    ) -> Result<Box<dyn AccumulatingOperation>, Error>;
}

pub trait Sha256 {
    fn hash(&self, data: &[u8]) -> Result<[u8; 32], Error>;
}

/// Operation producing output as input arrives.
pub trait EmittingOperation {
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>, Error>;
    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error>;
}

pub trait AadOperation: EmittingOperation {
    /// Only called before the first `update()` or `finish()`.
    fn update_aad(&mut self, aad: &[u8]) -> Result<(), Error>;
}

/// Operation producing output only at the end, such as a MAC.
pub trait AccumulatingOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error>;
    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error>;
}

/// Device-bound keys that never leave the secure environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKey {
    /// Key feeding the shared-secret negotiation.
    KeymasterEnforcement,
    /// Key authenticating hardware auth tokens.
    AuthToken,
    /// Key authenticating confirmation tokens.
    ConfirmationToken,
    /// Key signing gatekeeper password handles.
    Password,
    /// Key authenticating public keys produced for remote provisioning.
    RkpMac,
}

impl DeviceKey {
    pub const COUNT: usize = 5;

    fn index(&self) -> usize {
        match self {
            DeviceKey::KeymasterEnforcement => 0,
            DeviceKey::AuthToken => 1,
            DeviceKey::ConfirmationToken => 2,
            DeviceKey::Password => 3,
            DeviceKey::RkpMac => 4,
        }
    }

    /// Unique data distinguishing the device key.
    pub fn label(&self) -> &'static [u8] {
        match self {
            DeviceKey::KeymasterEnforcement => b"TpmKeymasterEnforcement",
            DeviceKey::AuthToken => b"auth_token",
            DeviceKey::ConfirmationToken => b"confirmation_token",
            DeviceKey::Password => b"password_key",
            DeviceKey::RkpMac => b"rkp_mac",
        }
    }
}

/// HMAC-SHA256 under a device-bound key.
pub trait DeviceHmac {
    fn hmac(&self, key: DeviceKey, data: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Device keys held in process memory, generated afresh at startup.
pub struct SoftwareDeviceHmac {
    hmac: Box<dyn Hmac>,
    keys: [Secret<32>; DeviceKey::COUNT],
}

impl SoftwareDeviceHmac {
    pub fn new(hmac: Box<dyn Hmac>, rng: &mut dyn Rng) -> Self {
        Self::with_keys(hmac, Self::random_keys(rng))
    }

    /// Fresh keys, one per [`DeviceKey`], for handing to several instances.
    pub fn random_keys(rng: &mut dyn Rng) -> [Secret<32>; DeviceKey::COUNT] {
        core::array::from_fn(|_| Secret::random(rng))
    }

    pub fn with_keys(hmac: Box<dyn Hmac>, keys: [Secret<32>; DeviceKey::COUNT]) -> Self {
        warn!("Device keys are held in process memory");
        Self { hmac, keys }
    }
}

impl DeviceHmac for SoftwareDeviceHmac {
    fn hmac(&self, key: DeviceKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        hmac_sha256(&*self.hmac, &self.keys[key.index()].0, &[data])
    }
}
