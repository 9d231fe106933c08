//! Secure deletion secrets kept in TPM NV indices.

use crate::{Error, ResourceManager, TpmError};
use log::{debug, info, warn};
use senv_common::{
    crypto::Rng,
    keyblob::{SecureDeletionData, SecureDeletionSecretManager, SecureDeletionSlot, SlotPurpose},
    km_err,
};
use std::sync::Arc;
use tss_esapi::{handles::NvIndexTpmHandle, structures::MaxNvBuffer};


/// NV index of the factory reset secret. Per-key slots follow it.
pub const SECURE_DELETION_NV_BASE: u32 = 0x0130_0000;

/// Number of per-key slots.
pub const SLOT_COUNT: u32 = 32;

const FACTORY_SECRET_SIZE: u16 = 32;
const SLOT_SECRET_SIZE: u16 = 16;

fn km(e: TpmError) -> senv_common::Error {
    Error::from(e).into()
}

/// Secure deletion secrets stored in the TPM, so deleting a key survives restarts and
/// cannot be undone by restoring host files.
pub struct NvSlotManager {
    manager: Arc<ResourceManager>,
}

impl NvSlotManager {
    pub fn new(manager: Arc<ResourceManager>) -> Self {
        Self { manager }
    }

    fn factory_index() -> Result<NvIndexTpmHandle, TpmError> {
        Ok(NvIndexTpmHandle::new(SECURE_DELETION_NV_BASE)?)
    }

    fn slot_index(slot: SecureDeletionSlot) -> Result<NvIndexTpmHandle, TpmError> {
        if slot.0 >= SLOT_COUNT {
            return Err(TpmError::Malformed("secure deletion slot out of range"));
        }
        Ok(NvIndexTpmHandle::new(SECURE_DELETION_NV_BASE + 1 + slot.0)?)
    }

    fn read(&self, index: NvIndexTpmHandle, size: u16) -> Result<Vec<u8>, TpmError> {
        let data = self.manager.with_tpm(|tpm| tpm.nv_read(index, 0, size))?;
        Ok(data.value().to_vec())
    }

    fn write(&self, index: NvIndexTpmHandle, data: &[u8]) -> Result<(), TpmError> {
        let buffer = MaxNvBuffer::try_from(data.to_vec())?;
        self.manager.with_tpm(|tpm| tpm.nv_write(index, 0, buffer))
    }

    fn define(&self, index: NvIndexTpmHandle, size: u16) -> Result<(), TpmError> {
        self.manager.with_tpm(|tpm| tpm.nv_define_space(index, size))
    }

    fn undefine(&self, index: NvIndexTpmHandle) -> Result<(), TpmError> {
        self.manager.with_tpm(|tpm| tpm.nv_undefine_space(index))
    }

    /// Take `slot` if it is free, or was defined but never written.
    fn claim(&self, slot: SecureDeletionSlot) -> Result<bool, TpmError> {
        let index = Self::slot_index(slot)?;
        match self.define(index, SLOT_SECRET_SIZE) {
            Ok(()) => Ok(true),
            Err(TpmError::NvDefined) => match self.read(index, SLOT_SECRET_SIZE) {
                Err(TpmError::NvUninitialized) => {
                    info!("reclaiming unwritten secure deletion slot {}", slot.0);
                    Ok(true)
                }
                _ => Ok(false),
            },
            Err(e) => Err(e),
        }
    }

    fn factory_secret(&self) -> Result<[u8; 32], TpmError> {
        let data = self.read(Self::factory_index()?, FACTORY_SECRET_SIZE)?;
        let mut secret = [0u8; 32];
        if data.len() != secret.len() {
            return Err(TpmError::Malformed("factory reset secret has the wrong size"));
        }
        secret.copy_from_slice(&data);
        Ok(secret)
    }
}

impl SecureDeletionSecretManager for NvSlotManager {
    fn get_or_create_factory_reset_secret(
        &mut self,
        rng: &mut dyn Rng,
    ) -> Result<SecureDeletionData, senv_common::Error> {
        let index = Self::factory_index().map_err(km)?;
        let fresh = match self.factory_secret() {
            Ok(_) => false,
            Err(TpmError::NvUninitialized) => true,
            // Not defined yet. Defining fails for a secret that exists but could not be read.
            Err(_) => {
                self.define(index, FACTORY_SECRET_SIZE).map_err(km)?;
                true
            }
        };
        if fresh {
            let mut secret = SecureDeletionData::default();
            rng.fill_bytes(&mut secret.factory_reset_secret);
            self.write(index, &secret.factory_reset_secret).map_err(km)?;
            info!("created factory reset secret");
        }
        self.get_factory_reset_secret()
    }

    fn get_factory_reset_secret(&self) -> Result<SecureDeletionData, senv_common::Error> {
        let factory_reset_secret = self.factory_secret().map_err(km)?;
        Ok(SecureDeletionData { factory_reset_secret, secure_deletion_secret: [0; 16] })
    }

    fn new_secret(
        &mut self,
        rng: &mut dyn Rng,
        purpose: SlotPurpose,
    ) -> Result<(SecureDeletionSlot, SecureDeletionData), senv_common::Error> {
        let mut sdd = self.get_or_create_factory_reset_secret(rng)?;
        for n in 0..SLOT_COUNT {
            let slot = SecureDeletionSlot(n);
            if !self.claim(slot).map_err(km)? {
                continue;
            }
            rng.fill_bytes(&mut sdd.secure_deletion_secret);
            let written = Self::slot_index(slot)
                .and_then(|index| self.write(index, &sdd.secure_deletion_secret));
            if let Err(e) = written {
                if let Err(e) = Self::slot_index(slot).and_then(|index| self.undefine(index)) {
                    warn!("failed to release secure deletion slot {}: {}", n, e);
                }
                return Err(km(e));
            }
            debug!("secure deletion slot {} allocated for {:?}", n, purpose);
            return Ok((slot, sdd));
        }
        Err(km_err!(RollbackResistanceUnavailable, "all {} secure deletion slots used", SLOT_COUNT))
    }

    fn get_secret(
        &self,
        slot: SecureDeletionSlot,
    ) -> Result<SecureDeletionData, senv_common::Error> {
        let mut sdd = self
            .get_factory_reset_secret()
            .map_err(|e| km_err!(InvalidKeyBlob, "no factory reset secret: {:?}", e))?;
        let data = Self::slot_index(slot)
            .and_then(|index| self.read(index, SLOT_SECRET_SIZE))
            .map_err(|e| km_err!(InvalidKeyBlob, "secure deletion slot {}: {}", slot.0, e))?;
        if data.len() != sdd.secure_deletion_secret.len() {
            return Err(km_err!(InvalidKeyBlob, "slot {} holds {} bytes", slot.0, data.len()));
        }
        sdd.secure_deletion_secret.copy_from_slice(&data);
        Ok(sdd)
    }

    fn delete_secret(&mut self, slot: SecureDeletionSlot) -> Result<(), senv_common::Error> {
        Self::slot_index(slot)
            .and_then(|index| self.undefine(index))
            .map_err(|e| km_err!(InvalidKeyBlob, "secure deletion slot {}: {}", slot.0, e))?;
        info!("deleted secure deletion slot {}", slot.0);
        Ok(())
    }

    fn delete_all(&mut self) {
        let indices = (0..SLOT_COUNT)
            .map(|n| Self::slot_index(SecureDeletionSlot(n)))
            .chain(core::iter::once(Self::factory_index()));
        for index in indices {
            if let Err(e) = index.and_then(|index| self.undefine(index)) {
                debug!("nothing to undefine: {}", e);
            }
        }
        warn!("all secure deletion secrets wiped");
    }
}
