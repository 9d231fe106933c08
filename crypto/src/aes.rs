use crate::block::{BlockOperation, BlockProcessor, Decrypting, Encrypting};
use aes::cipher::{
    consts::{U12, U13, U14, U15, U16},
    generic_array::GenericArray,
    BlockCipher, BlockDecrypt, BlockEncrypt, BlockSizeUser, KeyInit, KeyIvInit, StreamCipher,
};
use aes::{Aes128, Aes192, Aes256};
use aes_gcm::{aead::AeadInPlace, AesGcm};
use senv_common::{
    crypto::{self, aes::BLOCK_SIZE, SymmetricOperation},
    km_err, Error,
};
use zeroize::Zeroize;

/// Dispatch to a function generic over the AES variant matching `key`.
macro_rules! with_key {
    { $key:expr, $func:ident $(, $arg:expr)* } => {
        match &$key {
            crypto::aes::Key::Aes128(k) => $func::<Aes128>(k $(, $arg)*),
            crypto::aes::Key::Aes192(k) => $func::<Aes192>(k $(, $arg)*),
            crypto::aes::Key::Aes256(k) => $func::<Aes256>(k $(, $arg)*),
        }
    }
}

/// [`crypto::Aes`] implementation based on the RustCrypto crates.
pub struct RustCryptoAes;

impl crypto::Aes for RustCryptoAes {
    fn begin(
        &self,
        key: crypto::aes::Key,
        mode: crypto::aes::CipherMode,
        dir: SymmetricOperation,
    ) -> Result<Box<dyn crypto::EmittingOperation>, Error> {
        use crypto::aes::CipherMode;
        let (padding, blocks): (bool, Box<dyn BlockProcessor>) = match mode {
            CipherMode::EcbNoPadding => (false, with_key!(key, ecb, dir)?),
            CipherMode::EcbPkcs7Padding => (true, with_key!(key, ecb, dir)?),
            CipherMode::CbcNoPadding { nonce } => (false, with_key!(key, cbc, &nonce, dir)?),
            CipherMode::CbcPkcs7Padding { nonce } => (true, with_key!(key, cbc, &nonce, dir)?),
            CipherMode::Ctr { nonce } => {
                let stream = with_key!(key, ctr, &nonce)?;
                return Ok(Box::new(AesCtrOperation { stream }));
            }
        };
        Ok(Box::new(BlockOperation::new(blocks, BLOCK_SIZE, dir, padding)))
    }

    fn begin_aead(
        &self,
        key: crypto::aes::Key,
        mode: crypto::aes::GcmMode,
        dir: SymmetricOperation,
    ) -> Result<Box<dyn crypto::AadOperation>, Error> {
        if !(12..=16).contains(&mode.tag_len) {
            let tag_len = mode.tag_len;
            return Err(km_err!(UnsupportedMacLength, "GCM tag length {} unsupported", tag_len));
        }
        Ok(Box::new(AesGcmOperation {
            key,
            mode,
            dir,
            aad: Vec::new(),
            data: Vec::new(),
            seen_data: false,
        }))
    }
}

fn init_err<E: core::fmt::Debug>(e: E) -> Error {
    km_err!(UnknownError, "failed to initialize AES: {:?}", e)
}

fn ecb<C>(key: &[u8], dir: SymmetricOperation) -> Result<Box<dyn BlockProcessor>, Error>
where
    C: BlockEncrypt + BlockDecrypt + BlockSizeUser<BlockSize = U16> + KeyInit + 'static,
{
    let cipher = C::new_from_slice(key).map_err(init_err)?;
    Ok(match dir {
        SymmetricOperation::Encrypt => Box::new(Encrypting(cipher)),
        SymmetricOperation::Decrypt => Box::new(Decrypting(cipher)),
    })
}

fn cbc<C>(
    key: &[u8],
    iv: &[u8; BLOCK_SIZE],
    dir: SymmetricOperation,
) -> Result<Box<dyn BlockProcessor>, Error>
where
    C: BlockCipher
        + BlockEncrypt
        + BlockDecrypt
        + BlockSizeUser<BlockSize = U16>
        + KeyInit
        + 'static,
{
    Ok(match dir {
        SymmetricOperation::Encrypt => Box::new(Encrypting(
            cbc::Encryptor::<C>::new_from_slices(key, iv).map_err(init_err)?,
        )),
        SymmetricOperation::Decrypt => Box::new(Decrypting(
            cbc::Decryptor::<C>::new_from_slices(key, iv).map_err(init_err)?,
        )),
    })
}

fn ctr<C>(key: &[u8], iv: &[u8; BLOCK_SIZE]) -> Result<Box<dyn KeyStream>, Error>
where
    C: BlockCipher + BlockEncrypt + BlockSizeUser<BlockSize = U16> + KeyInit + 'static,
{
    Ok(Box::new(ctr::Ctr128BE::<C>::new_from_slices(key, iv).map_err(init_err)?))
}

trait KeyStream {
    fn apply(&mut self, data: &mut [u8]);
}

impl<S: StreamCipher> KeyStream for S {
    fn apply(&mut self, data: &mut [u8]) {
        self.apply_keystream(data);
    }
}

/// CTR mode operation, which emits output for every input byte.
struct AesCtrOperation {
    stream: Box<dyn KeyStream>,
}

impl crypto::EmittingOperation for AesCtrOperation {
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut output = data.to_vec();
        self.stream.apply(&mut output);
        Ok(output)
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error> {
        Ok(Vec::new())
    }
}

/// GCM operation. All data is held until `finish`, so that no plaintext is released before the
/// tag has been checked.
struct AesGcmOperation {
    key: crypto::aes::Key,
    mode: crypto::aes::GcmMode,
    dir: SymmetricOperation,
    aad: Vec<u8>,
    data: Vec<u8>,
    seen_data: bool,
}

impl Drop for AesGcmOperation {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

impl crypto::AadOperation for AesGcmOperation {
    fn update_aad(&mut self, aad: &[u8]) -> Result<(), Error> {
        if self.seen_data {
            return Err(km_err!(InvalidTag, "associated data after message data"));
        }
        self.aad.extend_from_slice(aad);
        Ok(())
    }
}

impl crypto::EmittingOperation for AesGcmOperation {
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        self.seen_data = true;
        self.data.extend_from_slice(data);
        Ok(Vec::new())
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>, Error> {
        let mut data = core::mem::take(&mut self.data);
        match with_key!(self.key, gcm, &self.mode, self.dir, &self.aad, &mut data) {
            Ok(()) => Ok(data),
            Err(e) => {
                data.zeroize();
                Err(e)
            }
        }
    }
}

fn gcm<C>(
    key: &[u8],
    mode: &crypto::aes::GcmMode,
    dir: SymmetricOperation,
    aad: &[u8],
    data: &mut Vec<u8>,
) -> Result<(), Error>
where
    C: BlockCipher + BlockEncrypt + BlockSizeUser<BlockSize = U16> + KeyInit,
{
    match mode.tag_len {
        12 => gcm_tagged::<C, U12>(key, mode, dir, aad, data),
        13 => gcm_tagged::<C, U13>(key, mode, dir, aad, data),
        14 => gcm_tagged::<C, U14>(key, mode, dir, aad, data),
        15 => gcm_tagged::<C, U15>(key, mode, dir, aad, data),
        16 => gcm_tagged::<C, U16>(key, mode, dir, aad, data),
        l => Err(km_err!(UnsupportedMacLength, "GCM tag length {} unsupported", l)),
    }
}

fn gcm_tagged<C, T>(
    key: &[u8],
    mode: &crypto::aes::GcmMode,
    dir: SymmetricOperation,
    aad: &[u8],
    data: &mut Vec<u8>,
) -> Result<(), Error>
where
    C: BlockCipher + BlockEncrypt + BlockSizeUser<BlockSize = U16> + KeyInit,
    T: aes_gcm::TagSize,
{
    let cipher = AesGcm::<C, U12, T>::new_from_slice(key).map_err(init_err)?;
    let nonce = GenericArray::from_slice(&mode.nonce);
    match dir {
        SymmetricOperation::Encrypt => {
            let tag = cipher
                .encrypt_in_place_detached(nonce, aad, data)
                .map_err(|e| km_err!(UnknownError, "GCM encryption failed: {:?}", e))?;
            data.extend_from_slice(&tag);
        }
        SymmetricOperation::Decrypt => {
            let tag_len = mode.tag_len;
            if data.len() < tag_len {
                return Err(km_err!(InvalidInputLength, "input shorter than {} byte tag", tag_len));
            }
            let tag = data.split_off(data.len() - tag_len);
            cipher
                .decrypt_in_place_detached(nonce, aad, data, GenericArray::from_slice(&tag))
                .map_err(|_e| km_err!(VerificationFailed, "GCM tag mismatch"))?;
        }
    }
    Ok(())
}
