use senv_common::crypto;
use subtle::ConstantTimeEq;

/// Constant time comparator based on `subtle`.
#[derive(Clone)]
pub struct RustCryptoEq;

impl crypto::ConstTimeEq for RustCryptoEq {
    fn eq(&self, left: &[u8], right: &[u8]) -> bool {
        if left.len() != right.len() {
            return false;
        }
        left.ct_eq(right).into()
    }
}
