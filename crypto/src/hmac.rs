use hmac::{Hmac, Mac};
use senv_common::{crypto, km_err, Error};
use senv_wire::keymint::Digest;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

/// [`crypto::Hmac`] implementation based on the `hmac` crate.
pub struct RustCryptoHmac;

impl crypto::Hmac for RustCryptoHmac {
    fn begin(
        &self,
        key: crypto::hmac::Key,
        digest: Digest,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        Ok(match digest {
            Digest::Sha1 => op::<Hmac<Sha1>>(&key)?,
            Digest::Sha224 => op::<Hmac<Sha224>>(&key)?,
            Digest::Sha256 => op::<Hmac<Sha256>>(&key)?,
            Digest::Sha384 => op::<Hmac<Sha384>>(&key)?,
            Digest::Sha512 => op::<Hmac<Sha512>>(&key)?,
            d => return Err(km_err!(UnsupportedDigest, "unknown digest {:?}", d)),
        })
    }
}

fn op<M: Mac + hmac::digest::KeyInit + 'static>(
    key: &crypto::hmac::Key,
) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
    let mac = <M as Mac>::new_from_slice(&key.0)
        .map_err(|e| km_err!(InvalidArgument, "failed to create HMAC: {:?}", e))?;
    Ok(Box::new(RustCryptoHmacOperation { mac }))
}

/// [`crypto::AccumulatingOperation`] implementation for HMAC.
pub struct RustCryptoHmacOperation<M: Mac> {
    mac: M,
}

impl<M: Mac> crypto::AccumulatingOperation for RustCryptoHmacOperation<M> {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.mac.update(data);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error> {
        Ok(self.mac.finalize().into_bytes().to_vec())
    }
}
