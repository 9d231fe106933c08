use crate::block::{BlockOperation, BlockProcessor, Decrypting, Encrypting};
use aes::cipher::{KeyInit, KeyIvInit};
use des::TdesEde3;
use senv_common::{
    crypto::{self, des::BLOCK_SIZE, SymmetricOperation},
    km_err, Error,
};

/// [`crypto::Des`] implementation based on the `des` crate.
pub struct RustCryptoDes;

fn init_err<E: core::fmt::Debug>(e: E) -> Error {
    km_err!(UnknownError, "failed to initialize 3-DES: {:?}", e)
}

impl crypto::Des for RustCryptoDes {
    fn begin(
        &self,
        key: crypto::des::Key,
        mode: crypto::des::Mode,
        dir: SymmetricOperation,
    ) -> Result<Box<dyn crypto::EmittingOperation>, Error> {
        use crypto::des::Mode;
        let padding = matches!(mode, Mode::EcbPkcs7Padding | Mode::CbcPkcs7Padding { .. });
        let blocks: Box<dyn BlockProcessor> = match (mode, dir) {
            (Mode::EcbNoPadding | Mode::EcbPkcs7Padding, dir) => {
                let cipher = TdesEde3::new_from_slice(&key.0).map_err(init_err)?;
                match dir {
                    SymmetricOperation::Encrypt => Box::new(Encrypting(cipher)),
                    SymmetricOperation::Decrypt => Box::new(Decrypting(cipher)),
                }
            }
            (
                Mode::CbcNoPadding { nonce } | Mode::CbcPkcs7Padding { nonce },
                SymmetricOperation::Encrypt,
            ) => Box::new(Encrypting(
                cbc::Encryptor::<TdesEde3>::new_from_slices(&key.0, &nonce).map_err(init_err)?,
            )),
            (
                Mode::CbcNoPadding { nonce } | Mode::CbcPkcs7Padding { nonce },
                SymmetricOperation::Decrypt,
            ) => Box::new(Decrypting(
                cbc::Decryptor::<TdesEde3>::new_from_slices(&key.0, &nonce).map_err(init_err)?,
            )),
        };
        Ok(Box::new(BlockOperation::new(blocks, BLOCK_SIZE, dir, padding)))
    }
}
