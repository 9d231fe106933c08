use senv_common::{crypto, Error};
use sha2::{Digest, Sha256};

/// [`crypto::Sha256`] implementation based on `sha2`.
pub struct RustCryptoSha256;

impl crypto::Sha256 for RustCryptoSha256 {
    fn hash(&self, data: &[u8]) -> Result<[u8; 32], Error> {
        Ok(Sha256::digest(data).into())
    }
}
