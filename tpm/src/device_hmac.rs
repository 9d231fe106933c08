use crate::{hmac::tpm_hmac, primary::PrimaryKeyBuilder, ResourceManager};
use senv_common::{
    crypto::{DeviceHmac, DeviceKey},
    Error,
};
use std::sync::Arc;

/// Device keys held by the TPM as signing primaries, one per [`DeviceKey`] label. Every
/// process sharing the TPM derives the same keys.
pub struct TpmDeviceHmac {
    manager: Arc<ResourceManager>,
}

impl TpmDeviceHmac {
    pub fn new(manager: Arc<ResourceManager>) -> Self {
        Self { manager }
    }
}

impl DeviceHmac for TpmDeviceHmac {
    fn hmac(&self, key: DeviceKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        let slot = PrimaryKeyBuilder::signing(key.label()).create(&self.manager)?;
        let mac = tpm_hmac(&self.manager, slot.key().map_err(crate::Error::from)?, data)?;
        Ok(mac.to_vec())
    }
}
