//! AES-128-CFB under a loaded TPM key, over data of any length.

use crate::{Error, ResourceManager, TpmError, AES_BLOCK_SIZE, MAX_BUFFER};
use std::sync::Arc;
use tss_esapi::{
    handles::KeyHandle,
    structures::{InitialValue, MaxBuffer},
};

fn tpm_crypt(
    manager: &Arc<ResourceManager>,
    key: KeyHandle,
    decrypt: bool,
    data: &mut [u8],
) -> Result<(), Error> {
    let mut iv = InitialValue::try_from(vec![0u8; AES_BLOCK_SIZE])?;
    manager.with_tpm(|tpm| -> Result<(), Error> {
        for chunk in data.chunks_mut(MAX_BUFFER) {
            let input = MaxBuffer::try_from(chunk.to_vec())?;
            let (output, iv_out) = tpm.encrypt_decrypt(key, decrypt, iv.clone(), input)?;
            if output.len() != chunk.len() {
                return Err(TpmError::Malformed("cipher output length mismatch").into());
            }
            chunk.copy_from_slice(output.value());
            iv = iv_out;
        }
        Ok(())
    })
}

/// Encrypt `data` in place.
pub fn tpm_encrypt(
    manager: &Arc<ResourceManager>,
    key: KeyHandle,
    data: &mut [u8],
) -> Result<(), Error> {
    tpm_crypt(manager, key, false, data)
}

/// Decrypt `data` in place.
pub fn tpm_decrypt(
    manager: &Arc<ResourceManager>,
    key: KeyHandle,
    data: &mut [u8],
) -> Result<(), Error> {
    tpm_crypt(manager, key, true, data)
}
