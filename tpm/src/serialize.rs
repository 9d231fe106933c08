//! Layered serializers used to wrap key blobs and persisted state.
//!
//! Each layer borrows the value it wraps, so a pipeline is built on the stack for one operation:
//! `Hmac(Encrypted(Composite(a, b, c)))`.

use crate::{
    cipher::{tpm_decrypt, tpm_encrypt},
    hmac::tpm_hmac,
    primary::{cipher_child_template, PrimaryKeyBuilder},
    Error, ResourceManager, AES_BLOCK_SIZE,
};
use senv_common::wire::{keymint::KeyParam, legacy::InnerSerialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tss_esapi::{
    structures::{Private, Public},
    traits::{Marshall, UnMarshall},
};
use zeroize::Zeroizing;

#[cfg(test)]
mod tests;

/// A value with a binary encoding.
pub trait Serializable {
    /// Append the encoding of `self` to `out`.
    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error>;

    /// Replace `self` with the value encoded at the front of `data`, returning the rest.
    fn deserialize<'a>(&mut self, data: &'a [u8]) -> Result<&'a [u8], Error>;

    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        self.serialize(&mut out)?;
        Ok(out)
    }
}

impl Serializable for Vec<u8> {
    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        Ok(InnerSerialize::serialize_into(self, out)?)
    }

    fn deserialize<'a>(&mut self, data: &'a [u8]) -> Result<&'a [u8], Error> {
        let (value, rest) = <Vec<u8> as InnerSerialize>::deserialize(data)?;
        *self = value;
        Ok(rest)
    }
}

impl Serializable for Vec<KeyParam> {
    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        Ok(InnerSerialize::serialize_into(self, out)?)
    }

    fn deserialize<'a>(&mut self, data: &'a [u8]) -> Result<&'a [u8], Error> {
        let (value, rest) = <Vec<KeyParam> as InnerSerialize>::deserialize(data)?;
        *self = value;
        Ok(rest)
    }
}

fn read_u32(data: &[u8]) -> Result<(u32, &[u8]), Error> {
    if data.len() < 4 {
        return Err(Error::Truncated);
    }
    let (head, rest) = data.split_at(4);
    Ok((u32::from_ne_bytes([head[0], head[1], head[2], head[3]]), rest))
}

fn read_sized(data: &[u8]) -> Result<(&[u8], &[u8]), Error> {
    let (len, rest) = read_u32(data)?;
    let len = len as usize;
    if rest.len() < len {
        return Err(Error::Truncated);
    }
    Ok(rest.split_at(len))
}

fn write_sized(out: &mut Vec<u8>, data: &[u8]) -> Result<(), Error> {
    let len = u32::try_from(data.len()).map_err(|_e| Error::Truncated)?;
    out.extend_from_slice(&len.to_ne_bytes());
    out.extend_from_slice(data);
    Ok(())
}

/// Members concatenated in order with no framing of their own.
pub struct Composite<'m> {
    members: Vec<&'m mut dyn Serializable>,
}

impl<'m> Composite<'m> {
    pub fn new(members: Vec<&'m mut dyn Serializable>) -> Self {
        Self { members }
    }
}

impl Serializable for Composite<'_> {
    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        for member in &self.members {
            member.serialize(out)?;
        }
        Ok(())
    }

    fn deserialize<'a>(&mut self, mut data: &'a [u8]) -> Result<&'a [u8], Error> {
        for member in self.members.iter_mut() {
            data = member.deserialize(data)?;
        }
        Ok(data)
    }
}

fn round_up(len: usize) -> usize {
    len.div_ceil(AES_BLOCK_SIZE) * AES_BLOCK_SIZE
}

/// Encrypts the inner value under a fresh AES-128-CFB key, itself wrapped by a parent primary.
///
/// ```text
/// [u32 size][TPMT_PUBLIC child public][u32 size][child private]
/// [u32 block_size = 16][u32 inner size][ciphertext, padded to the block size]
/// ```
pub struct EncryptedSerializable<'a> {
    manager: &'a Arc<ResourceManager>,
    parent: &'a PrimaryKeyBuilder,
    inner: &'a mut dyn Serializable,
}

impl<'a> EncryptedSerializable<'a> {
    pub fn new(
        manager: &'a Arc<ResourceManager>,
        parent: &'a PrimaryKeyBuilder,
        inner: &'a mut dyn Serializable,
    ) -> Self {
        Self { manager, parent, inner }
    }
}

impl Serializable for EncryptedSerializable<'_> {
    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        let parent = self.parent.create(self.manager)?;
        let parent_key = parent.key()?;
        let template = cipher_child_template()?;
        let (private, public) = self.manager.with_tpm(|tpm| tpm.create(parent_key, template))?;
        let mut child = self.manager.reserve_slot().ok_or(Error::NoSlot)?;
        let key = self
            .manager
            .with_tpm(|tpm| tpm.load(parent_key, private.clone(), public.clone()))?;
        child.set(key);
        drop(parent);

        let mut data = Zeroizing::new(Vec::new());
        self.inner.serialize(&mut data)?;
        let size = u32::try_from(data.len()).map_err(|_e| Error::Truncated)?;
        data.resize(round_up(data.len()), 0);
        tpm_encrypt(self.manager, key, &mut data)?;

        write_sized(out, &public.marshall()?)?;
        write_sized(out, private.value())?;
        out.extend_from_slice(&(AES_BLOCK_SIZE as u32).to_ne_bytes());
        out.extend_from_slice(&size.to_ne_bytes());
        out.extend_from_slice(&data);
        Ok(())
    }

    fn deserialize<'b>(&mut self, data: &'b [u8]) -> Result<&'b [u8], Error> {
        let (public, rest) = read_sized(data)?;
        let (private, rest) = read_sized(rest)?;
        let public = Public::unmarshall(public)?;
        let private = Private::try_from(private.to_vec())?;
        let (block_size, rest) = read_u32(rest)?;
        if block_size as usize != AES_BLOCK_SIZE {
            return Err(Error::BlockSize(block_size));
        }
        let (size, rest) = read_u32(rest)?;
        let size = size as usize;
        let padded = round_up(size);
        if rest.len() < padded {
            return Err(Error::Truncated);
        }
        let (ciphertext, rest) = rest.split_at(padded);

        let parent = self.parent.create(self.manager)?;
        let parent_key = parent.key()?;
        let mut child = self.manager.reserve_slot().ok_or(Error::NoSlot)?;
        let key = self.manager.with_tpm(|tpm| tpm.load(parent_key, private, public))?;
        child.set(key);
        drop(parent);

        let mut plain = Zeroizing::new(ciphertext.to_vec());
        tpm_decrypt(self.manager, key, &mut plain)?;
        drop(child);
        let leftover = self.inner.deserialize(&plain[..size])?;
        if !leftover.is_empty() {
            return Err(Error::Leftover(leftover.len()));
        }
        Ok(rest)
    }
}

/// Authenticates the inner value with an HMAC under a signing primary.
///
/// ```text
/// [u32 inner size][inner][u32 signature size][signature]
/// ```
///
/// The hidden bytes take part in the HMAC but are never emitted.
pub struct HmacSerializable<'a> {
    manager: &'a Arc<ResourceManager>,
    signing: &'a PrimaryKeyBuilder,
    inner: &'a mut dyn Serializable,
    hidden: &'a [u8],
}

impl<'a> HmacSerializable<'a> {
    pub fn new(
        manager: &'a Arc<ResourceManager>,
        signing: &'a PrimaryKeyBuilder,
        inner: &'a mut dyn Serializable,
        hidden: &'a [u8],
    ) -> Self {
        Self { manager, signing, inner, hidden }
    }

    fn sign(&self, span: &[u8]) -> Result<[u8; 32], Error> {
        let key = self.signing.create(self.manager)?;
        let mut message = Zeroizing::new(Vec::with_capacity(span.len() + self.hidden.len()));
        message.extend_from_slice(span);
        message.extend_from_slice(self.hidden);
        tpm_hmac(self.manager, key.key()?, &message)
    }
}

impl Serializable for HmacSerializable<'_> {
    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        let mut inner = Vec::new();
        self.inner.serialize(&mut inner)?;
        let signature = self.sign(&inner)?;
        write_sized(out, &inner)?;
        write_sized(out, &signature)
    }

    fn deserialize<'b>(&mut self, data: &'b [u8]) -> Result<&'b [u8], Error> {
        let (span, rest) = read_sized(data)?;
        let (signature, rest) = read_sized(rest)?;
        let expected = self.sign(span)?;
        if !bool::from(expected.as_slice().ct_eq(signature)) {
            return Err(Error::Integrity);
        }
        let leftover = self.inner.deserialize(span)?;
        if !leftover.is_empty() {
            return Err(Error::Leftover(leftover.len()));
        }
        Ok(rest)
    }
}
