//! Traits representing access to device-specific functionality.

use alloc::{boxed::Box, vec::Vec};
use senv_common::{
    crypto::{DeviceHmac, KeyMaterial},
    keyblob::{KeyBlobMaker, SecureDeletionSecretManager},
    Error,
};
use senv_wire::keymint::DateTime;

/// Combined collection of trait implementations that must be provided.
pub struct Implementation {
    /// Wrapping and unwrapping of key blobs.
    pub keyblobs: Box<dyn KeyBlobMaker>,

    /// Secure storage for the secrets that rollback-resistant and single-use keys depend on.
    /// Without it such keys cannot be created.
    pub sdd_mgr: Option<Box<dyn SecureDeletionSecretManager>>,

    /// HMAC under device-bound keys, for auth tokens and confirmation tokens.
    pub keys: Box<dyn DeviceHmac>,

    /// Retrieval of bootloader status.
    pub bootloader: Box<dyn BootloaderStatus>,

    /// Wall-clock time, against which key validity dates are checked.
    pub wall_clock: Box<dyn WallClock>,

    /// Attestation keys and their certificate chains.
    pub sign_info: Box<dyn RetrieveCertSigningInfo>,
}

impl Implementation {
    /// The key blob maker, along with the secret store that new blobs are bound to.
    pub(crate) fn sealing(
        &mut self,
    ) -> (&mut dyn KeyBlobMaker, Option<&mut dyn SecureDeletionSecretManager>) {
        let secrets: Option<&mut dyn SecureDeletionSecretManager> = match &mut self.sdd_mgr {
            Some(mgr) => Some(mgr.as_mut()),
            None => None,
        };
        (self.keyblobs.as_mut(), secrets)
    }

    /// The key blob maker, along with the secret store that existing blobs are checked against.
    pub(crate) fn unsealing(
        &mut self,
    ) -> (&mut dyn KeyBlobMaker, Option<&dyn SecureDeletionSecretManager>) {
        let secrets = match &self.sdd_mgr {
            Some(mgr) => Some(mgr.as_ref()),
            None => None,
        };
        (self.keyblobs.as_mut(), secrets)
    }
}

/// Functionality for determining whether the bootloader has completed.
pub trait BootloaderStatus {
    /// Indication of whether bootloader processing is complete
    fn done(&self) -> bool {
        // By default assume that the bootloader is done before the TA starts.
        true
    }
}

/// Bootloader status for a TA that only starts once the host OS is running.
pub struct BootloaderDone;
impl BootloaderStatus for BootloaderDone {}

/// Abstraction of a real-time clock.
pub trait WallClock {
    /// Return the current time since the Unix epoch.
    fn now(&self) -> DateTime;
}

/// Algorithm of an attestation signing key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigningAlgorithm {
    Ec,
    Rsa,
}

/// Retrieval of the device's attestation signing keys.
pub trait RetrieveCertSigningInfo {
    /// Private key used to sign attestation certificates.
    fn signing_key(&self, algo: SigningAlgorithm) -> Result<KeyMaterial, Error>;

    /// DER certificates vouching for [`Self::signing_key`], leaf first.
    fn cert_chain(&self, algo: SigningAlgorithm) -> Result<Vec<Vec<u8>>, Error>;
}
