//! ECB and CBC processing shared by the block ciphers.

use aes::cipher::{generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut};
use senv_common::{crypto, crypto::SymmetricOperation, km_err, Error};
use zeroize::Zeroize;

/// Transforms whole blocks in place, carrying any chaining state.
pub(crate) trait BlockProcessor {
    fn process(&mut self, block: &mut [u8]);
}

pub(crate) struct Encrypting<C>(pub C);
pub(crate) struct Decrypting<C>(pub C);

impl<C: BlockEncryptMut> BlockProcessor for Encrypting<C> {
    fn process(&mut self, block: &mut [u8]) {
        self.0.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

impl<C: BlockDecryptMut> BlockProcessor for Decrypting<C> {
    fn process(&mut self, block: &mut [u8]) {
        self.0.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// ECB or CBC operation, which emits whole blocks as they become available.
pub(crate) struct BlockOperation {
    blocks: Box<dyn BlockProcessor>,
    block_size: usize,
    dir: SymmetricOperation,
    padding: bool,
    pending: Vec<u8>,
}

impl BlockOperation {
    pub(crate) fn new(
        blocks: Box<dyn BlockProcessor>,
        block_size: usize,
        dir: SymmetricOperation,
        padding: bool,
    ) -> Self {
        Self { blocks, block_size, dir, padding, pending: Vec::new() }
    }
}

impl Drop for BlockOperation {
    fn drop(&mut self) {
        self.pending.zeroize();
    }
}

impl crypto::EmittingOperation for BlockOperation {
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let bs = self.block_size;
        self.pending.extend_from_slice(data);
        let mut ready = (self.pending.len() / bs) * bs;
        if self.padding && self.dir == SymmetricOperation::Decrypt && ready == self.pending.len() {
            // The final block carries padding, so hold it back until finish.
            ready = ready.saturating_sub(bs);
        }
        let mut output: Vec<u8> = self.pending.drain(..ready).collect();
        for block in output.chunks_mut(bs) {
            self.blocks.process(block);
        }
        Ok(output)
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>, Error> {
        let bs = self.block_size;
        let mut output = core::mem::take(&mut self.pending);
        match (self.padding, self.dir) {
            (true, SymmetricOperation::Encrypt) => {
                let pad = bs - (output.len() % bs);
                output.resize(output.len() + pad, pad as u8);
            }
            _ => {
                if output.len() % bs != 0 {
                    return Err(km_err!(
                        InvalidInputLength,
                        "input not a multiple of block size, {} bytes left",
                        output.len()
                    ));
                }
            }
        }
        for block in output.chunks_mut(bs) {
            self.blocks.process(block);
        }
        if self.padding && self.dir == SymmetricOperation::Decrypt {
            let pad = match output.last() {
                Some(&p) if (1..=bs).contains(&(p as usize)) => p as usize,
                _ => return Err(km_err!(InvalidArgument, "invalid PKCS#7 padding")),
            };
            let padding_ok = output.len() >= pad
                && output[output.len() - pad..].iter().all(|b| *b as usize == pad);
            if !padding_ok {
                output.zeroize();
                return Err(km_err!(InvalidArgument, "invalid PKCS#7 padding"));
            }
            output.truncate(output.len() - pad);
        }
        Ok(output)
    }
}
