//! Software model of the subset of TPM 2.0 used by the secure environment, for tests.
//!
//! It behaves like a TPM where it matters to callers: primaries are derived deterministically
//! from an owner seed, children leave the TPM only in wrapped form, and the transient object pool
//! is bounded. Templates and handles are the `tss_esapi` types the real backend uses.

use crate::{Tpm, TpmError, AES_BLOCK_SIZE, DEFAULT_MAX_TRANSIENT_OBJECTS, MAX_BUFFER};
use aes::Aes128;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest as _, Sha256};
use std::collections::HashMap;
use tss_esapi::{
    handles::{KeyHandle, NvIndexTpmHandle, ObjectHandle},
    structures::{Auth, Digest, InitialValue, MaxBuffer, MaxNvBuffer, Private, Public},
    traits::Marshall,
};
use zeroize::Zeroizing;

#[cfg(test)]
mod tests;

type HmacSha256 = Hmac<Sha256>;

const FIRST_TRANSIENT: u32 = 0x8000_0000;
const MAX_NV_SIZE: u16 = 2048;
const SEED_SIZE: usize = 32;
const DIGEST_SIZE: usize = 32;

/// `KDFa` from TPM 2.0 Part 1 §11.4.10.2, using HMAC-SHA256.
pub fn kdfa(key: &[u8], label: &str, context_u: &[u8], context_v: &[u8], bits: u32) -> Vec<u8> {
    let len = (bits as usize).div_ceil(8);
    let mut out = Vec::with_capacity(len + DIGEST_SIZE);
    let mut counter = 1u32;
    while out.len() < len {
        // HMAC accepts keys of any length.
        let Ok(mut mac) = HmacSha256::new_from_slice(key) else { break };
        mac.update(&counter.to_be_bytes());
        mac.update(label.as_bytes());
        mac.update(&[0]);
        mac.update(context_u);
        mac.update(context_v);
        mac.update(&bits.to_be_bytes());
        out.extend_from_slice(&mac.finalize().into_bytes());
        counter += 1;
    }
    out.truncate(len);
    out
}

fn rejected(mnemonic: &'static str) -> TpmError {
    TpmError::Response(mnemonic)
}

fn new_mac(key: &[u8]) -> Result<HmacSha256, TpmError> {
    HmacSha256::new_from_slice(key).map_err(|_e| rejected("TPM_RC_KEY"))
}

fn cfb(key: &[u8], iv: &[u8], decrypt: bool, data: &mut [u8]) -> Result<(), TpmError> {
    if decrypt {
        cfb_mode::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_e| rejected("TPM_RC_KEY"))?
            .decrypt(data);
    } else {
        cfb_mode::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_e| rejected("TPM_RC_KEY"))?
            .encrypt(data);
    }
    Ok(())
}

struct Key {
    public: Public,
    sensitive: Zeroizing<Vec<u8>>,
    /// Seed protecting children of this key.
    seed: Zeroizing<Vec<u8>>,
}

enum Object {
    Key(Key),
    Sequence(Box<HmacSha256>),
}

struct NvIndex {
    data: Vec<u8>,
    written: bool,
}

/// In-process TPM model.
pub struct MockTpm {
    owner_seed: Zeroizing<[u8; SEED_SIZE]>,
    started: bool,
    max_transient: u32,
    next_handle: u32,
    objects: HashMap<u32, Object>,
    nv: HashMap<u32, NvIndex>,
}

impl Default for MockTpm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTpm {
    pub fn new() -> Self {
        Self::with_max_transient_objects(DEFAULT_MAX_TRANSIENT_OBJECTS)
    }

    pub fn with_max_transient_objects(max_transient: u32) -> Self {
        let mut owner_seed = Zeroizing::new([0u8; SEED_SIZE]);
        rand::thread_rng().fill_bytes(&mut owner_seed[..]);
        Self {
            owner_seed,
            started: false,
            max_transient,
            next_handle: FIRST_TRANSIENT,
            objects: HashMap::new(),
            nv: HashMap::new(),
        }
    }

    /// Number of NV indices currently defined.
    pub fn nv_defined(&self) -> usize {
        self.nv.len()
    }

    fn check_started(&self) -> Result<(), TpmError> {
        if self.started {
            Ok(())
        } else {
            Err(TpmError::Initialize)
        }
    }

    fn insert(&mut self, object: Object) -> Result<u32, TpmError> {
        if self.objects.len() >= self.max_transient as usize {
            return Err(TpmError::ObjectMemory);
        }
        let mut handle = self.next_handle;
        while self.objects.contains_key(&handle) {
            handle = FIRST_TRANSIENT | (handle.wrapping_add(1) & 0x00FF_FFFF);
        }
        self.next_handle = FIRST_TRANSIENT | (handle.wrapping_add(1) & 0x00FF_FFFF);
        self.objects.insert(handle, object);
        Ok(handle)
    }

    fn key(&self, handle: KeyHandle) -> Result<&Key, TpmError> {
        match self.objects.get(&u32::from(ObjectHandle::from(handle))) {
            Some(Object::Key(key)) => Ok(key),
            _ => Err(rejected("TPM_RC_HANDLE")),
        }
    }

    fn sequence(&mut self, handle: ObjectHandle) -> Result<&mut HmacSha256, TpmError> {
        match self.objects.get_mut(&u32::from(handle)) {
            Some(Object::Sequence(mac)) => Ok(&mut **mac),
            _ => Err(rejected("TPM_RC_HANDLE")),
        }
    }

    fn nv_index(&mut self, index: NvIndexTpmHandle) -> Result<&mut NvIndex, TpmError> {
        self.nv.get_mut(&u32::from(index)).ok_or_else(|| rejected("TPM_RC_HANDLE"))
    }
}

/// Size in bytes of the sensitive value for objects built from `template`.
fn sensitive_size(template: &Public) -> Result<usize, TpmError> {
    match template {
        Public::SymCipher { unique, .. } if unique.len() <= DIGEST_SIZE => Ok(16),
        Public::KeyedHash { unique, .. } if unique.len() <= DIGEST_SIZE => Ok(DIGEST_SIZE),
        Public::SymCipher { .. } | Public::KeyedHash { .. } => Err(rejected("TPM_RC_SIZE")),
        _ => Err(rejected("TPM_RC_TYPE")),
    }
}

fn is_storage_parent(key: &Key) -> bool {
    let attributes = key.public.object_attributes();
    matches!(key.public, Public::SymCipher { .. })
        && attributes.restricted()
        && attributes.decrypt()
}

fn is_hmac_key(key: &Key) -> bool {
    matches!(key.public, Public::KeyedHash { .. }) && key.public.object_attributes().sign_encrypt()
}

fn name(public: &Public) -> Result<Vec<u8>, TpmError> {
    Ok(Sha256::digest(public.marshall()?).to_vec())
}

/// Encrypt and integrity-protect a child's sensitive area under its parent's seed:
/// `integrity ‖ CFB(sensitive ‖ seed)`.
fn wrap(parent: &Key, name: &[u8], sensitive: &[u8], seed: &[u8]) -> Result<Vec<u8>, TpmError> {
    let mut enc = Zeroizing::new([sensitive, seed].concat());
    let storage_key = Zeroizing::new(kdfa(&parent.seed, "STORAGE", name, &[], 128));
    cfb(&storage_key, &[0; AES_BLOCK_SIZE], false, &mut enc)?;
    let integrity_key = Zeroizing::new(kdfa(&parent.seed, "INTEGRITY", &[], &[], 256));
    let mut mac = new_mac(&integrity_key)?;
    mac.update(&enc);
    mac.update(name);
    Ok([&mac.finalize().into_bytes()[..], &enc[..]].concat())
}

/// Inverse of [`wrap`], returning the sensitive value and the child's seed.
fn unwrap(
    parent: &Key,
    name: &[u8],
    private: &[u8],
    size: usize,
) -> Result<(Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>), TpmError> {
    if private.len() != DIGEST_SIZE + size + SEED_SIZE {
        return Err(rejected("TPM_RC_SIZE"));
    }
    let (integrity, enc) = private.split_at(DIGEST_SIZE);
    let integrity_key = Zeroizing::new(kdfa(&parent.seed, "INTEGRITY", &[], &[], 256));
    let mut mac = new_mac(&integrity_key)?;
    mac.update(enc);
    mac.update(name);
    mac.verify_slice(integrity).map_err(|_e| rejected("TPM_RC_INTEGRITY"))?;

    let mut plain = Zeroizing::new(enc.to_vec());
    let storage_key = Zeroizing::new(kdfa(&parent.seed, "STORAGE", name, &[], 128));
    cfb(&storage_key, &[0; AES_BLOCK_SIZE], true, &mut plain)?;
    let (sensitive, seed) = plain.split_at(size);
    Ok((Zeroizing::new(sensitive.to_vec()), Zeroizing::new(seed.to_vec())))
}

fn with_unique(public: &Public, value: Vec<u8>) -> Result<Public, TpmError> {
    let mut public = public.clone();
    match &mut public {
        Public::SymCipher { unique, .. } | Public::KeyedHash { unique, .. } => {
            *unique = Digest::try_from(value)?;
        }
        _ => return Err(rejected("TPM_RC_TYPE")),
    }
    Ok(public)
}

impl Tpm for MockTpm {
    fn startup(&mut self) -> Result<(), TpmError> {
        self.started = true;
        Ok(())
    }

    fn dictionary_attack_lock_reset(&mut self) -> Result<(), TpmError> {
        self.check_started()
    }

    fn max_transient_objects(&mut self) -> Result<u32, TpmError> {
        self.check_started()?;
        Ok(self.max_transient)
    }

    fn create_primary(&mut self, template: Public) -> Result<KeyHandle, TpmError> {
        self.check_started()?;
        let size = sensitive_size(&template)?;
        let marshalled = template.marshall()?;
        let bits = size as u32 * 8;
        let owner_seed = &self.owner_seed[..];
        let sensitive = Zeroizing::new(kdfa(owner_seed, "Primary", &marshalled, &[], bits));
        let seed = Zeroizing::new(kdfa(owner_seed, "Seed", &marshalled, &[], 256));
        let handle = self.insert(Object::Key(Key { public: template, sensitive, seed }))?;
        Ok(KeyHandle::from(handle))
    }

    fn create(
        &mut self,
        parent: KeyHandle,
        template: Public,
    ) -> Result<(Private, Public), TpmError> {
        self.check_started()?;
        let size = sensitive_size(&template)?;
        let mut sensitive = Zeroizing::new(vec![0u8; size]);
        let mut seed = Zeroizing::new(vec![0u8; SEED_SIZE]);
        rand::thread_rng().fill_bytes(&mut sensitive);
        rand::thread_rng().fill_bytes(&mut seed);

        let unique = Sha256::new().chain_update(&*seed).chain_update(&*sensitive).finalize();
        let public = with_unique(&template, unique.to_vec())?;
        let parent_key = self.key(parent)?;
        if !is_storage_parent(parent_key) {
            return Err(rejected("TPM_RC_TYPE"));
        }
        let private = wrap(parent_key, &name(&public)?, &sensitive, &seed)?;
        Ok((Private::try_from(private)?, public))
    }

    fn load(
        &mut self,
        parent: KeyHandle,
        private: Private,
        public: Public,
    ) -> Result<KeyHandle, TpmError> {
        self.check_started()?;
        let parent_key = self.key(parent)?;
        if !is_storage_parent(parent_key) {
            return Err(rejected("TPM_RC_TYPE"));
        }
        let size = sensitive_size(&public)?;
        let (sensitive, seed) = unwrap(parent_key, &name(&public)?, private.value(), size)?;
        let handle = self.insert(Object::Key(Key { public, sensitive, seed }))?;
        Ok(KeyHandle::from(handle))
    }

    fn flush_context(&mut self, handle: ObjectHandle) -> Result<(), TpmError> {
        self.check_started()?;
        match self.objects.remove(&u32::from(handle)) {
            Some(_) => Ok(()),
            None => Err(rejected("TPM_RC_HANDLE")),
        }
    }

    fn hmac(&mut self, key: KeyHandle, data: MaxBuffer) -> Result<Digest, TpmError> {
        self.check_started()?;
        let key = self.key(key)?;
        if !is_hmac_key(key) {
            return Err(rejected("TPM_RC_TYPE"));
        }
        let mut mac = new_mac(&key.sensitive)?;
        mac.update(data.value());
        Ok(Digest::try_from(mac.finalize().into_bytes().to_vec())?)
    }

    fn hmac_start(&mut self, key: KeyHandle, _auth: Auth) -> Result<ObjectHandle, TpmError> {
        self.check_started()?;
        let key = self.key(key)?;
        if !is_hmac_key(key) {
            return Err(rejected("TPM_RC_TYPE"));
        }
        let mac = new_mac(&key.sensitive)?;
        let handle = self.insert(Object::Sequence(Box::new(mac)))?;
        Ok(ObjectHandle::from(handle))
    }

    fn sequence_update(&mut self, sequence: ObjectHandle, data: MaxBuffer) -> Result<(), TpmError> {
        self.check_started()?;
        self.sequence(sequence)?.update(data.value());
        Ok(())
    }

    fn sequence_complete(
        &mut self,
        sequence: ObjectHandle,
        data: MaxBuffer,
    ) -> Result<Digest, TpmError> {
        self.check_started()?;
        self.sequence(sequence)?.update(data.value());
        match self.objects.remove(&u32::from(sequence)) {
            Some(Object::Sequence(mac)) => {
                Ok(Digest::try_from((*mac).finalize().into_bytes().to_vec())?)
            }
            _ => Err(rejected("TPM_RC_HANDLE")),
        }
    }

    fn encrypt_decrypt(
        &mut self,
        key: KeyHandle,
        decrypt: bool,
        iv: InitialValue,
        data: MaxBuffer,
    ) -> Result<(MaxBuffer, InitialValue), TpmError> {
        self.check_started()?;
        let key = self.key(key)?;
        if !matches!(key.public, Public::SymCipher { .. }) {
            return Err(rejected("TPM_RC_TYPE"));
        }
        let attributes = key.public.object_attributes();
        let allowed = if decrypt { attributes.decrypt() } else { attributes.sign_encrypt() };
        if attributes.restricted() || !allowed {
            return Err(rejected("TPM_RC_ATTRIBUTES"));
        }
        if iv.len() != AES_BLOCK_SIZE || data.len() > MAX_BUFFER {
            return Err(rejected("TPM_RC_SIZE"));
        }
        let mut output = data.value().to_vec();
        cfb(&key.sensitive, iv.value(), decrypt, &mut output)?;

        // The next IV is the final block of the ciphertext stream.
        let ciphertext = if decrypt { data.value() } else { &output[..] };
        let chain = [iv.value(), ciphertext].concat();
        let iv_out = chain[chain.len() - AES_BLOCK_SIZE..].to_vec();
        Ok((MaxBuffer::try_from(output)?, InitialValue::try_from(iv_out)?))
    }

    fn nv_define_space(&mut self, index: NvIndexTpmHandle, size: u16) -> Result<(), TpmError> {
        self.check_started()?;
        if size > MAX_NV_SIZE {
            return Err(rejected("TPM_RC_SIZE"));
        }
        let index = u32::from(index);
        if self.nv.contains_key(&index) {
            return Err(TpmError::NvDefined);
        }
        self.nv.insert(index, NvIndex { data: vec![0; size as usize], written: false });
        Ok(())
    }

    fn nv_write(
        &mut self,
        index: NvIndexTpmHandle,
        offset: u16,
        data: MaxNvBuffer,
    ) -> Result<(), TpmError> {
        self.check_started()?;
        let nv = self.nv_index(index)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > nv.data.len() {
            return Err(rejected("TPM_RC_NV_RANGE"));
        }
        nv.data[start..end].copy_from_slice(data.value());
        nv.written = true;
        Ok(())
    }

    fn nv_read(
        &mut self,
        index: NvIndexTpmHandle,
        offset: u16,
        size: u16,
    ) -> Result<MaxNvBuffer, TpmError> {
        self.check_started()?;
        let nv = self.nv_index(index)?;
        if !nv.written {
            return Err(TpmError::NvUninitialized);
        }
        let start = offset as usize;
        let end = start + size as usize;
        if end > nv.data.len() {
            return Err(rejected("TPM_RC_NV_RANGE"));
        }
        Ok(MaxNvBuffer::try_from(nv.data[start..end].to_vec())?)
    }

    fn nv_undefine_space(&mut self, index: NvIndexTpmHandle) -> Result<(), TpmError> {
        self.check_started()?;
        match self.nv.remove(&u32::from(index)) {
            Some(_) => Ok(()),
            None => Err(rejected("TPM_RC_HANDLE")),
        }
    }

    fn get_random(&mut self, size: usize) -> Result<Digest, TpmError> {
        self.check_started()?;
        let mut out = vec![0u8; size.min(DIGEST_SIZE)];
        rand::thread_rng().fill_bytes(&mut out);
        Ok(Digest::try_from(out)?)
    }
}
