//! TA functionality for shared secret negotiation.

use alloc::vec::Vec;
use senv_common::{
    crypto::{self, DeviceKey},
    km_err, Error, FallibleAllocExt,
};
use senv_wire::legacy::{HmacSharingParameters, HMAC_SHARING_NONCE_SIZE};
use log::info;
use zeroize::Zeroizing;

/// Label mixed into the derivation of the shared HMAC key.
pub const KEY_AGREEMENT_LABEL: &[u8] = b"KeymasterSharedMac";

/// Label over which the sharing check value is computed.
pub const KEY_CHECK_LABEL: &[u8] = b"Keymaster HMAC Verification";

impl crate::KeyMintTa {
    pub(crate) fn get_shared_secret_params(&mut self) -> Result<HmacSharingParameters, Error> {
        let params = match &self.shared_secret_params {
            Some(params) => params.clone(),
            None => {
                let mut nonce = [0u8; HMAC_SHARING_NONCE_SIZE];
                self.imp.rng.fill_bytes(&mut nonce);
                let params = HmacSharingParameters { seed: Vec::new(), nonce };
                self.shared_secret_params = Some(params.clone());
                params
            }
        };
        Ok(params)
    }

    pub(crate) fn compute_shared_secret(
        &mut self,
        params: &[HmacSharingParameters],
    ) -> Result<Vec<u8>, Error> {
        info!("Setting HMAC key from {} shared secret parameters", params.len());
        let local_params = match &self.shared_secret_params {
            Some(params) => params,
            None => return Err(km_err!(HardwareNotYetAvailable, "no local shared secret params")),
        };

        let context = shared_secret_context(params, local_params)?;
        let mut kdf_input = Vec::new();
        kdf_input.try_extend_from_slice(KEY_AGREEMENT_LABEL)?;
        kdf_input.try_extend_from_slice(&context)?;
        let key = self.dev.keys.hmac(DeviceKey::KeymasterEnforcement, &kdf_input)?;
        if key.len() != crypto::SHA256_DIGEST_LEN {
            return Err(km_err!(UnknownError, "derived HMAC key has length {}", key.len()));
        }
        self.hmac_key = Some(Zeroizing::new(key));
        self.device_hmac(KEY_CHECK_LABEL)
    }
}

/// Build the shared secret context from the given `params`, which
/// is required to include `must_include` (our own parameters).
pub fn shared_secret_context(
    params: &[HmacSharingParameters],
    must_include: &HmacSharingParameters,
) -> Result<Vec<u8>, Error> {
    let mut result = Vec::new();
    let mut seen = false;
    for param in params {
        result.try_extend_from_slice(&param.seed)?;
        result.try_extend_from_slice(&param.nonce)?;
        if param == must_include {
            seen = true;
        }
    }
    if !seen {
        Err(km_err!(InvalidArgument, "shared secret params missing local value"))
    } else {
        Ok(result)
    }
}
