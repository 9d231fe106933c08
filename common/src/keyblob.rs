//! Key blob manipulation functionality.

use crate::{
    crypto::{self, aes, Aes, Hmac, Rng, SymmetricOperation},
    km_err, tag, try_to_vec,
    wire::{
        keymint::{ErrorCode, KeyOrigin, KeyParam},
        legacy::InnerSerialize,
    },
    Error, FallibleAllocExt,
};
use alloc::{boxed::Box, vec::Vec};
use log::{error, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

mod sdd_mem;
pub use sdd_mem::InMemorySlotManager;

#[cfg(test)]
mod tests;

/// Identifier of a slot in secure storage holding a per-key secret.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SecureDeletionSlot(pub u32);

/// Secrets mixed into the sealing context of a key blob. Once they are gone the blob can no longer
/// be unwrapped.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecureDeletionData {
    /// Shared by every key, wiped on factory reset.
    pub factory_reset_secret: [u8; 32],
    /// Per-key secret, wiped when the key is deleted. All zeroes for keys without a slot.
    pub secure_deletion_secret: [u8; 16],
}

impl core::fmt::Debug for SecureDeletionData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SecureDeletionData").finish_non_exhaustive()
    }
}

/// Why a secure deletion slot is being requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotPurpose {
    KeyGeneration,
    KeyImport,
    KeyUpgrade,
}

/// Store of the secrets that key blobs depend on.
pub trait SecureDeletionSecretManager {
    /// Return the factory reset secret, with an all-zero per-key secret, creating it on first use.
    fn get_or_create_factory_reset_secret(
        &mut self,
        rng: &mut dyn Rng,
    ) -> Result<SecureDeletionData, Error>;

    /// Return the factory reset secret, with an all-zero per-key secret.
    fn get_factory_reset_secret(&self) -> Result<SecureDeletionData, Error>;

    /// Fill an empty slot with a fresh per-key secret. Upgrades delete the original key's slot
    /// afterwards, so implementations should keep room for that.
    fn new_secret(
        &mut self,
        rng: &mut dyn Rng,
        purpose: SlotPurpose,
    ) -> Result<(SecureDeletionSlot, SecureDeletionData), Error>;

    fn get_secret(&self, slot: SecureDeletionSlot) -> Result<SecureDeletionData, Error>;

    fn delete_secret(&mut self, slot: SecureDeletionSlot) -> Result<(), Error>;

    /// Delete every secret, the factory reset secret included.
    fn delete_all(&mut self);
}

/// The secure storage secret a sealed blob depends on. Encoded as a prefix of the blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    /// Sealed without secure storage.
    Unbound,
    FactoryReset,
    Slot(SecureDeletionSlot),
}

impl Binding {
    const UNBOUND: u8 = 0;
    const FACTORY_RESET: u8 = 1;
    const SLOT: u8 = 2;

    fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        match self {
            Binding::Unbound => buf.try_push(Self::UNBOUND)?,
            Binding::FactoryReset => buf.try_push(Self::FACTORY_RESET)?,
            Binding::Slot(slot) => {
                buf.try_push(Self::SLOT)?;
                buf.try_extend_from_slice(&slot.0.to_le_bytes())?;
            }
        }
        Ok(buf)
    }

    /// Split a key blob into its binding and the sealed contents.
    pub fn parse(blob: &[u8]) -> Result<(Binding, &[u8]), Error> {
        match blob.split_first() {
            Some((&Self::UNBOUND, rest)) => Ok((Binding::Unbound, rest)),
            Some((&Self::FACTORY_RESET, rest)) => Ok((Binding::FactoryReset, rest)),
            Some((&Self::SLOT, rest)) if rest.len() >= 4 => {
                let (slot, rest) = rest.split_at(4);
                let mut raw = [0u8; 4];
                raw.copy_from_slice(slot);
                Ok((Binding::Slot(SecureDeletionSlot(u32::from_le_bytes(raw))), rest))
            }
            Some((b, _)) => Err(km_err!(InvalidKeyBlob, "unknown key blob binding {}", b)),
            None => Err(km_err!(InvalidKeyBlob, "empty key blob")),
        }
    }
}

/// The secure deletion slot a key blob depends on, if any.
pub fn secure_deletion_slot(blob: &[u8]) -> Option<SecureDeletionSlot> {
    match Binding::parse(blob) {
        Ok((Binding::Slot(slot), _)) => Some(slot),
        _ => None,
    }
}

/// Whether a key with these authorizations needs a per-key secret of its own.
pub fn requires_slot(hw_enforced: &[KeyParam], sw_enforced: &[KeyParam]) -> bool {
    hw_enforced.contains(&KeyParam::RollbackResistance)
        || hw_enforced.iter().chain(sw_enforced).any(|p| *p == KeyParam::UsageCountLimit(1))
}

fn bind(
    needs_slot: bool,
    secrets: Option<&mut (dyn SecureDeletionSecretManager + '_)>,
    rng: &mut dyn Rng,
    purpose: SlotPurpose,
) -> Result<(Binding, SecureDeletionData), Error> {
    match (secrets, needs_slot) {
        (Some(mgr), true) => {
            let (slot, sdd) = mgr.new_secret(rng, purpose)?;
            Ok((Binding::Slot(slot), sdd))
        }
        (Some(mgr), false) => {
            Ok((Binding::FactoryReset, mgr.get_or_create_factory_reset_secret(rng)?))
        }
        (None, true) => Err(km_err!(
            RollbackResistanceUnavailable,
            "key needs a secure deletion slot but there is no secure storage"
        )),
        (None, false) => Ok((Binding::Unbound, SecureDeletionData::default())),
    }
}

fn lookup(
    binding: Binding,
    secrets: Option<&dyn SecureDeletionSecretManager>,
) -> Result<SecureDeletionData, Error> {
    match (binding, secrets) {
        (Binding::Unbound, _) => Ok(SecureDeletionData::default()),
        (Binding::FactoryReset, Some(mgr)) => mgr.get_factory_reset_secret(),
        (Binding::Slot(slot), Some(mgr)) => mgr.get_secret(slot),
        (_, None) => Err(km_err!(InvalidKeyBlob, "key blob bound to absent secure storage")),
    }
}

/// `hidden ‖ binding ‖ factory_reset_secret ‖ secure_deletion_secret`
fn bound_context(
    hidden: &[u8],
    binding: Binding,
    sdd: &SecureDeletionData,
) -> Result<Vec<u8>, Error> {
    let mut context = try_to_vec(hidden)?;
    context.try_extend_from_slice(&binding.encode()?)?;
    context.try_extend_from_slice(&sdd.factory_reset_secret)?;
    context.try_extend_from_slice(&sdd.secure_deletion_secret)?;
    Ok(context)
}

/// Contents of a key blob once unwrapped.
#[derive(Clone, Debug, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyBlob {
    /// Raw key material.
    pub key_material: Vec<u8>,
    #[zeroize(skip)]
    pub hw_enforced: Vec<KeyParam>,
    #[zeroize(skip)]
    pub sw_enforced: Vec<KeyParam>,
}

impl KeyBlob {
    /// Encode as `key_material ‖ hw_enforced ‖ sw_enforced`.
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        self.key_material.serialize_into(&mut buf)?;
        self.hw_enforced.serialize_into(&mut buf)?;
        self.sw_enforced.serialize_into(&mut buf)?;
        Ok(buf)
    }

    /// Decode from the encoding produced by [`KeyBlob::serialize`], which must be consumed in
    /// full.
    pub fn deserialize(data: &[u8]) -> Result<Self, Error> {
        let (key_material, data) = <Vec<u8>>::deserialize(data)?;
        let (hw_enforced, data) = <Vec<KeyParam>>::deserialize(data)?;
        let (sw_enforced, data) = <Vec<KeyParam>>::deserialize(data)?;
        if !data.is_empty() {
            return Err(km_err!(InvalidKeyBlob, "{} bytes left after key blob", data.len()));
        }
        Ok(KeyBlob { key_material, hw_enforced, sw_enforced })
    }
}

/// System version state bound into every key blob.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Versions {
    pub os_version: u32,
    pub os_patchlevel: u32,
    pub vendor_patchlevel: Option<u32>,
    pub boot_patchlevel: Option<u32>,
}

impl Versions {
    /// Add the origin and version tags to a new key's hardware-enforced authorizations.
    pub fn add_to(&self, hw_enforced: &mut Vec<KeyParam>, origin: KeyOrigin) -> Result<(), Error> {
        hw_enforced.try_push(KeyParam::Origin(origin))?;
        hw_enforced.try_push(KeyParam::OsVersion(self.os_version))?;
        hw_enforced.try_push(KeyParam::OsPatchlevel(self.os_patchlevel))?;
        if let Some(v) = self.vendor_patchlevel {
            hw_enforced.try_push(KeyParam::VendorPatchlevel(v))?;
        }
        if let Some(v) = self.boot_patchlevel {
            hw_enforced.try_push(KeyParam::BootPatchlevel(v))?;
        }
        Ok(())
    }

    /// Check the versions stored in a key against the current state.
    pub fn check(&self, hw_enforced: &[KeyParam]) -> Result<(), Error> {
        for param in hw_enforced {
            match param {
                KeyParam::OsVersion(v) if *v != 0 && *v != self.os_version => {
                    return Err(km_err!(
                        KeyRequiresUpgrade,
                        "key OS version {} != current {}",
                        v,
                        self.os_version
                    ));
                }
                KeyParam::OsPatchlevel(v) => check_patchlevel("OS", *v, Some(self.os_patchlevel))?,
                KeyParam::VendorPatchlevel(v) => {
                    check_patchlevel("vendor", *v, self.vendor_patchlevel)?
                }
                KeyParam::BootPatchlevel(v) => check_patchlevel("boot", *v, self.boot_patchlevel)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Bring the version tags of `hw_enforced` up to the current state. Returns whether anything
    /// changed.
    pub fn upgrade(&self, hw_enforced: &mut Vec<KeyParam>) -> Result<bool, Error> {
        let mut changed = false;
        if self.os_version == 0 {
            // A numbered release may move to an unnumbered development build.
            for param in hw_enforced.iter_mut() {
                if let KeyParam::OsVersion(v) = param {
                    if *v != 0 {
                        *v = 0;
                        changed = true;
                    }
                }
            }
        }
        changed |= upgrade_tag(hw_enforced, KeyParam::OsVersion(self.os_version))?;
        changed |= upgrade_tag(hw_enforced, KeyParam::OsPatchlevel(self.os_patchlevel))?;
        if let Some(v) = self.vendor_patchlevel {
            changed |= upgrade_tag(hw_enforced, KeyParam::VendorPatchlevel(v))?;
        }
        if let Some(v) = self.boot_patchlevel {
            changed |= upgrade_tag(hw_enforced, KeyParam::BootPatchlevel(v))?;
        }
        Ok(changed)
    }
}

fn check_patchlevel(which: &str, stored: u32, current: Option<u32>) -> Result<(), Error> {
    let current = match current {
        Some(0) | None => return Ok(()),
        Some(v) => v,
    };
    if stored < current {
        Err(km_err!(KeyRequiresUpgrade, "key {} patchlevel {} < {}", which, stored, current))
    } else if stored > current {
        Err(km_err!(InvalidKeyBlob, "key {} patchlevel {} > {}", which, stored, current))
    } else {
        Ok(())
    }
}

fn integer_value(param: &KeyParam) -> Option<u32> {
    match param {
        KeyParam::OsVersion(v)
        | KeyParam::OsPatchlevel(v)
        | KeyParam::VendorPatchlevel(v)
        | KeyParam::BootPatchlevel(v) => Some(*v),
        _ => None,
    }
}

fn upgrade_tag(params: &mut Vec<KeyParam>, want: KeyParam) -> Result<bool, Error> {
    let new_value = integer_value(&want).unwrap_or(0);
    match params.iter_mut().find(|p| p.tag() == want.tag()) {
        None => {
            params.try_push(want)?;
            Ok(true)
        }
        Some(existing) => {
            let old_value = integer_value(existing).unwrap_or(0);
            if old_value > new_value {
                Err(km_err!(
                    InvalidArgument,
                    "{:?} would downgrade from {} to {}",
                    want.tag(),
                    old_value,
                    new_value
                ))
            } else if old_value != new_value {
                *existing = want;
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }
}

/// Newly created key blob, along with the authorizations it carries.
#[derive(Debug)]
pub struct CreatedBlob {
    pub blob: Vec<u8>,
    pub hw_enforced: Vec<KeyParam>,
    pub sw_enforced: Vec<KeyParam>,
}

/// Wraps key material and its authorizations into opaque blobs handed out to the guest.
pub trait KeyBlobMaker {
    /// Protect the contents of a key blob, binding in the `hidden` context.
    fn seal(&mut self, key: &KeyBlob, hidden: &[u8]) -> Result<Vec<u8>, Error>;

    /// Recover the contents of a key blob sealed with the same `hidden` context.
    fn unseal(&mut self, blob: &[u8], hidden: &[u8]) -> Result<KeyBlob, Error>;

    /// Current system version state.
    fn versions(&self) -> &Versions;

    /// Mutable access to the system version state.
    fn versions_mut(&mut self) -> &mut Versions;

    /// Create a key blob for new key material described by `description`. Keys that need a
    /// secure deletion slot get one from `secrets`.
    fn create(
        &mut self,
        description: &[KeyParam],
        origin: KeyOrigin,
        key_material: &[u8],
        secrets: Option<&mut dyn SecureDeletionSecretManager>,
        rng: &mut dyn Rng,
        purpose: SlotPurpose,
    ) -> Result<CreatedBlob, Error> {
        for param in description {
            if tag::AUTO_ADDED_TAGS.contains(&param.tag()) {
                return Err(km_err!(
                    InvalidTag,
                    "tag {:?} not allowed in key description",
                    param.tag()
                ));
            }
        }
        let (mut hw_enforced, sw_enforced) = tag::split_authorizations(description)?;
        let hidden = tag::hidden(description)?;
        self.versions().add_to(&mut hw_enforced, origin)?;
        let mut key =
            KeyBlob { key_material: try_to_vec(key_material)?, hw_enforced, sw_enforced };
        let blob = self.unvalidated_create(&key, &hidden, secrets, rng, purpose)?;
        Ok(CreatedBlob {
            blob,
            hw_enforced: core::mem::take(&mut key.hw_enforced),
            sw_enforced: core::mem::take(&mut key.sw_enforced),
        })
    }

    /// Create a key blob from existing authorizations without checking them.
    fn unvalidated_create(
        &mut self,
        key: &KeyBlob,
        hidden: &[u8],
        mut secrets: Option<&mut dyn SecureDeletionSecretManager>,
        rng: &mut dyn Rng,
        purpose: SlotPurpose,
    ) -> Result<Vec<u8>, Error> {
        let needs_slot = requires_slot(&key.hw_enforced, &key.sw_enforced);
        let (binding, sdd) = bind(needs_slot, secrets.as_deref_mut(), rng, purpose)?;
        let sealed = bound_context(hidden, binding, &sdd).and_then(|mut context| {
            let sealed = self.seal(key, &context);
            context.zeroize();
            sealed
        });
        match sealed {
            Ok(sealed) => {
                let mut blob = binding.encode()?;
                blob.try_extend_from_slice(&sealed)?;
                Ok(blob)
            }
            Err(e) => {
                if let (Binding::Slot(slot), Some(mgr)) = (binding, secrets) {
                    if let Err(del) = mgr.delete_secret(slot) {
                        error!("failed to release secure deletion slot {:?}: {:?}", slot, del);
                    }
                }
                Err(e)
            }
        }
    }

    /// Unwrap a key blob, using the `ApplicationId`/`ApplicationData` values found in `params`.
    fn unwrap(
        &mut self,
        blob: &[u8],
        params: &[KeyParam],
        secrets: Option<&dyn SecureDeletionSecretManager>,
    ) -> Result<KeyBlob, Error> {
        let (binding, sealed) = Binding::parse(blob)?;
        let sdd = lookup(binding, secrets).map_err(|e| {
            warn!("key blob secret unavailable: {:?}", e);
            km_err!(InvalidKeyBlob, "key blob secret unavailable")
        })?;
        let mut context = bound_context(&tag::hidden(params)?, binding, &sdd)?;
        let key = self.unseal(sealed, &context);
        context.zeroize();
        key.map_err(|e| match e.code() {
            ErrorCode::MemoryAllocationFailed => e,
            _ => {
                warn!("failed to unwrap key blob: {:?}", e);
                km_err!(InvalidKeyBlob, "key blob failed to unwrap")
            }
        })
    }

    fn set_system_version(&mut self, os_version: u32, os_patchlevel: u32) {
        let versions = self.versions_mut();
        versions.os_version = os_version;
        versions.os_patchlevel = os_patchlevel;
    }

    fn set_vendor_patchlevel(&mut self, patchlevel: u32) {
        self.versions_mut().vendor_patchlevel = Some(patchlevel);
    }

    fn set_boot_patchlevel(&mut self, patchlevel: u32) {
        self.versions_mut().boot_patchlevel = Some(patchlevel);
    }
}

/// Fixed root from which software key-blob keys are derived.
const SOFTWARE_ROOT_KEY: &[u8; 32] = b"SoftwareKeyBlobRootKey--NotSafe!";

/// Key blob maker that seals with AES-256-GCM under a key derived from a fixed root and the
/// hidden context. Offers no confidentiality against the host.
pub struct SoftwareKeyBlobMaker {
    aes: Box<dyn Aes>,
    hmac: Box<dyn Hmac>,
    rng: Box<dyn Rng>,
    versions: Versions,
}

impl SoftwareKeyBlobMaker {
    pub fn new(aes: Box<dyn Aes>, hmac: Box<dyn Hmac>, rng: Box<dyn Rng>) -> Self {
        warn!("Key blobs are sealed with a software key");
        Self { aes, hmac, rng, versions: Versions::default() }
    }

    fn derive_key(&self, hidden: &[u8]) -> Result<aes::Key, Error> {
        let mut raw = crypto::hmac_sha256(&*self.hmac, SOFTWARE_ROOT_KEY, &[hidden])?;
        let key = aes::Key::new_from(&raw);
        raw.zeroize();
        key
    }
}

impl KeyBlobMaker for SoftwareKeyBlobMaker {
    fn seal(&mut self, key: &KeyBlob, hidden: &[u8]) -> Result<Vec<u8>, Error> {
        let mut payload = key.serialize()?;
        let mut nonce = [0u8; aes::GCM_NONCE_SIZE];
        self.rng.fill_bytes(&mut nonce);
        let mode = aes::GcmMode { nonce, tag_len: 16 };
        let key = self.derive_key(hidden)?;
        let mut op = self.aes.begin_aead(key, mode, SymmetricOperation::Encrypt)?;
        let mut blob = Vec::new();
        blob.try_extend_from_slice(&nonce)?;
        blob.try_extend_from_slice(&op.update(&payload)?)?;
        payload.zeroize();
        blob.try_extend_from_slice(&op.finish()?)?;
        Ok(blob)
    }

    fn unseal(&mut self, blob: &[u8], hidden: &[u8]) -> Result<KeyBlob, Error> {
        if blob.len() < aes::GCM_NONCE_SIZE + 16 {
            return Err(km_err!(InvalidKeyBlob, "key blob too short ({} bytes)", blob.len()));
        }
        let (nonce, ciphertext) = blob.split_at(aes::GCM_NONCE_SIZE);
        let mut mode = aes::GcmMode { nonce: [0; aes::GCM_NONCE_SIZE], tag_len: 16 };
        mode.nonce.copy_from_slice(nonce);
        let key = self.derive_key(hidden)?;
        let mut op = self.aes.begin_aead(key, mode, SymmetricOperation::Decrypt)?;
        let mut payload = op.update(ciphertext)?;
        payload.try_extend_from_slice(&op.finish()?)?;
        let key = KeyBlob::deserialize(&payload);
        payload.zeroize();
        key
    }

    fn versions(&self) -> &Versions {
        &self.versions
    }

    fn versions_mut(&mut self) -> &mut Versions {
        &mut self.versions
    }
}
