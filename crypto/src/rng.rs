use rand::{rngs::StdRng, CryptoRng, RngCore, SeedableRng};
use senv_common::crypto;
use sha2::{Digest, Sha256};

/// [`crypto::Rng`] implementation seeded from the OS, which folds added entropy into its state.
pub struct RustCryptoRng {
    rng: StdRng,
}

impl RustCryptoRng {
    pub fn new() -> Result<Self, getrandom::Error> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed)?;
        Ok(Self { rng: StdRng::from_seed(seed) })
    }
}

impl crypto::Rng for RustCryptoRng {
    fn add_entropy(&mut self, data: &[u8]) {
        let mut current = [0u8; 32];
        self.rng.fill_bytes(&mut current);
        let mut hasher = Sha256::new();
        hasher.update(current);
        hasher.update(data);
        self.rng = StdRng::from_seed(hasher.finalize().into());
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);
    }
}

/// Presents a [`crypto::Rng`] to RustCrypto APIs that take a `rand_core` generator.
pub(crate) struct RngAdapter<'a>(pub &'a mut dyn crypto::Rng);

impl RngCore for RngAdapter<'_> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.0.fill_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }
    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for RngAdapter<'_> {}
