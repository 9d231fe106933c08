//! Secure deletion secrets held in memory.

use super::{SecureDeletionData, SecureDeletionSecretManager, SecureDeletionSlot, SlotPurpose};
use crate::{crypto::Rng, km_err, Error};
use log::debug;

/// Secure deletion secret manager that keeps `N` slots in memory. Everything is lost when the
/// process exits, and every key blob bound to it with it.
pub struct InMemorySlotManager<const N: usize> {
    factory_secret: Option<[u8; 32]>,
    slots: [Option<SecureDeletionData>; N],
}

impl<const N: usize> Default for InMemorySlotManager<N> {
    fn default() -> Self {
        Self { factory_secret: None, slots: [(); N].map(|_| None) }
    }
}

impl<const N: usize> InMemorySlotManager<N> {
    /// Number of slots in use.
    pub fn used(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn slot(&self, slot: SecureDeletionSlot) -> Result<usize, Error> {
        let idx = slot.0 as usize;
        if idx >= N {
            return Err(km_err!(InvalidKeyBlob, "slot {} out of range", slot.0));
        }
        Ok(idx)
    }
}

impl<const N: usize> SecureDeletionSecretManager for InMemorySlotManager<N> {
    fn get_or_create_factory_reset_secret(
        &mut self,
        rng: &mut dyn Rng,
    ) -> Result<SecureDeletionData, Error> {
        if self.factory_secret.is_none() {
            let mut secret = [0; 32];
            rng.fill_bytes(&mut secret);
            self.factory_secret = Some(secret);
        }
        self.get_factory_reset_secret()
    }

    fn get_factory_reset_secret(&self) -> Result<SecureDeletionData, Error> {
        match self.factory_secret {
            Some(secret) => Ok(SecureDeletionData {
                factory_reset_secret: secret,
                secure_deletion_secret: [0; 16],
            }),
            None => Err(km_err!(UnknownError, "no factory reset secret")),
        }
    }

    fn new_secret(
        &mut self,
        rng: &mut dyn Rng,
        purpose: SlotPurpose,
    ) -> Result<(SecureDeletionSlot, SecureDeletionData), Error> {
        let idx = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or_else(|| km_err!(RollbackResistanceUnavailable, "all {} slots in use", N))?;
        let mut sdd = self.get_or_create_factory_reset_secret(rng)?;
        rng.fill_bytes(&mut sdd.secure_deletion_secret);
        self.slots[idx] = Some(sdd.clone());
        debug!("slot {} allocated for {:?}", idx, purpose);
        Ok((SecureDeletionSlot(idx as u32), sdd))
    }

    fn get_secret(&self, slot: SecureDeletionSlot) -> Result<SecureDeletionData, Error> {
        match &self.slots[self.slot(slot)?] {
            Some(data) => Ok(data.clone()),
            None => Err(km_err!(InvalidKeyBlob, "slot {} empty", slot.0)),
        }
    }

    fn delete_secret(&mut self, slot: SecureDeletionSlot) -> Result<(), Error> {
        let idx = self.slot(slot)?;
        match self.slots[idx].take() {
            Some(_) => Ok(()),
            None => Err(km_err!(InvalidKeyBlob, "slot {} empty", slot.0)),
        }
    }

    fn delete_all(&mut self) {
        self.factory_secret = None;
        self.slots.iter_mut().for_each(|s| *s = None);
    }
}
