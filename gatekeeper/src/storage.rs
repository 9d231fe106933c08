//! Key-value stores holding gatekeeper failure records.
//!
//! Neither persistent store detects replay: restoring an older state file (or, for the TPM
//! store, an older NV index map) silently rolls the stored values back. Losing the state file
//! loses the data.

use crate::Error;
use senv_tpm::{
    hmac::tpm_hmac,
    primary::PrimaryKeyBuilder,
    serialize::{EncryptedSerializable, HmacSerializable, Serializable},
    ResourceManager,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

mod fragile_tpm;
mod insecure_json;

pub use fragile_tpm::FragileTpmStorage;
pub use insecure_json::InsecureJsonStorage;


/// Fixed-capacity byte slots addressed by string keys.
pub trait Storage {
    /// Reserve `size` bytes for `key`. A key that already exists keeps its allocation.
    fn allocate(&mut self, key: &str, size: usize) -> Result<(), Error>;

    fn has_key(&self, key: &str) -> Result<bool, Error>;

    /// Contents of `key`, or `None` if it has never been written.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), Error>;
}

/// Process-lifetime store used by the software gatekeeper.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: BTreeMap<String, Slot>,
}

#[derive(Debug)]
struct Slot {
    capacity: usize,
    data: Option<Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn allocate(&mut self, key: &str, size: usize) -> Result<(), Error> {
        self.slots.entry(key.to_owned()).or_insert(Slot { capacity: size, data: None });
        Ok(())
    }

    fn has_key(&self, key: &str) -> Result<bool, Error> {
        Ok(self.slots.contains_key(key))
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let slot = self.slots.get(key).ok_or_else(|| Error::UnknownKey(key.to_owned()))?;
        Ok(slot.data.clone())
    }

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), Error> {
        let slot = self.slots.get_mut(key).ok_or_else(|| Error::UnknownKey(key.to_owned()))?;
        check_capacity(key, data.len(), slot.capacity)?;
        slot.data = Some(data.to_vec());
        Ok(())
    }
}

fn check_capacity(key: &str, size: usize, capacity: usize) -> Result<(), Error> {
    if size > capacity {
        return Err(Error::TooLarge { key: key.to_owned(), size, capacity });
    }
    Ok(())
}

/// A JSON document kept on disk, encrypted and then authenticated by TPM primaries.
pub(crate) struct WrappedJsonFile {
    path: PathBuf,
    manager: Arc<ResourceManager>,
    parent: PrimaryKeyBuilder,
    signing: PrimaryKeyBuilder,
}

impl WrappedJsonFile {
    pub(crate) fn new(manager: Arc<ResourceManager>, path: &Path, unique: &[u8]) -> Self {
        Self {
            path: path.to_owned(),
            manager,
            parent: PrimaryKeyBuilder::parent(unique),
            signing: PrimaryKeyBuilder::signing(unique),
        }
    }

    pub(crate) fn manager(&self) -> &Arc<ResourceManager> {
        &self.manager
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// HMAC of `data` under the signing primary that authenticates the file.
    pub(crate) fn mac(&self, data: &[u8]) -> Result<[u8; 32], Error> {
        let key = self.signing.create(&self.manager)?;
        let handle = key.key()?;
        Ok(tpm_hmac(&self.manager, handle, data)?)
    }

    /// Read the document. A missing file is an empty document.
    pub(crate) fn load<T: DeserializeOwned + Default>(&self) -> Result<T, Error> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(e.into()),
        };
        let mut json = Vec::new();
        {
            let mut encrypted = EncryptedSerializable::new(&self.manager, &self.parent, &mut json);
            let mut hmac =
                HmacSerializable::new(&self.manager, &self.signing, &mut encrypted, &[]);
            let rest = hmac.deserialize(&data)?;
            if !rest.is_empty() {
                return Err(senv_tpm::Error::Leftover(rest.len()).into());
            }
        }
        Ok(serde_json::from_slice(&json)?)
    }

    pub(crate) fn store<T: Serialize>(&self, value: &T) -> Result<(), Error> {
        let mut json = serde_json::to_vec(value)?;
        let data = {
            let mut encrypted = EncryptedSerializable::new(&self.manager, &self.parent, &mut json);
            HmacSerializable::new(&self.manager, &self.signing, &mut encrypted, &[]).to_bytes()?
        };
        fs::write(&self.path, data)?;
        Ok(())
    }

    /// Like [`Self::load`], but an unreadable document is logged and replaced by an empty one.
    pub(crate) fn load_or_reset<T: DeserializeOwned + Default>(&self) -> T {
        match self.load() {
            Ok(value) => value,
            Err(e) => {
                log::warn!("discarding unreadable state file {}: {}", self.path.display(), e);
                T::default()
            }
        }
    }
}
