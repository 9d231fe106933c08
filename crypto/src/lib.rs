//! Implementations of [`senv_common::crypto`] traits based on the RustCrypto crates.

extern crate alloc;

use senv_common::crypto::Implementation;

pub mod aes;
mod block;
pub mod clock;
pub mod des;
pub mod ec;
pub mod eq;
pub mod hmac;
pub mod rng;
pub mod rsa;
pub mod sha256;


/// Build the full set of crypto trait implementations.
pub fn implementation() -> Result<Implementation, getrandom::Error> {
    Ok(Implementation {
        rng: Box::new(rng::RustCryptoRng::new()?),
        clock: Box::new(clock::BootClock),
        compare: Box::new(eq::RustCryptoEq),
        aes: Box::new(aes::RustCryptoAes),
        des: Box::new(des::RustCryptoDes),
        hmac: Box::new(hmac::RustCryptoHmac),
        rsa: Box::new(rsa::RustCryptoRsa),
        ec: Box::new(ec::RustCryptoEc),
        sha256: Box::new(sha256::RustCryptoSha256),
    })
}
