//! HMAC-SHA256 computed inside the TPM.

use crate::{Error, ResourceManager, MAX_BUFFER};
use rand::RngCore;
use std::sync::Arc;
use tss_esapi::{
    handles::KeyHandle,
    structures::{Auth, MaxBuffer},
};
use zeroize::Zeroizing;

pub const SHA256_DIGEST_SIZE: usize = 32;

const SEQUENCE_AUTH_SIZE: usize = 16;

/// HMAC `data` with the loaded keyed-hash key `key`. Input larger than one TPM buffer is fed
/// through an HMAC sequence, which needs one free slot.
pub fn tpm_hmac(
    manager: &Arc<ResourceManager>,
    key: KeyHandle,
    data: &[u8],
) -> Result<[u8; SHA256_DIGEST_SIZE], Error> {
    let mac = if data.len() <= MAX_BUFFER {
        let buffer = MaxBuffer::try_from(data.to_vec())?;
        manager.with_tpm(|tpm| tpm.hmac(key, buffer))?
    } else {
        let mut secret = Zeroizing::new([0u8; SEQUENCE_AUTH_SIZE]);
        rand::thread_rng().fill_bytes(&mut secret[..]);
        let auth = Auth::try_from(secret.to_vec())?;
        let mut slot = manager.reserve_slot().ok_or(Error::NoSlot)?;
        let sequence = manager.with_tpm(|tpm| tpm.hmac_start(key, auth))?;
        slot.set(sequence);

        let mut chunks = data.chunks(MAX_BUFFER).peekable();
        let mut mac = None;
        while let Some(chunk) = chunks.next() {
            let buffer = MaxBuffer::try_from(chunk.to_vec())?;
            if chunks.peek().is_some() {
                manager.with_tpm(|tpm| tpm.sequence_update(sequence, buffer))?;
            } else {
                mac = Some(manager.with_tpm(|tpm| tpm.sequence_complete(sequence, buffer))?);
                // The TPM flushes a completed sequence.
                slot.clear();
            }
        }
        mac.ok_or(Error::HmacLength(0))?
    };
    let mac = mac.value();
    mac.try_into().map_err(|_e| Error::HmacLength(mac.len()))
}
