use super::{check_capacity, Storage, WrappedJsonFile};
use crate::Error;
use log::{info, warn};
use senv_tpm::{ResourceManager, TpmError, NV_INDEX_FIRST};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, sync::Arc};
use tss_esapi::{handles::NvIndexTpmHandle, structures::MaxNvBuffer};

#[cfg(test)]
mod tests;

const UNIQUE: &[u8] = b"gatekeeper_secure_index";

/// Candidate indices per key before giving up.
const MAX_INDEX_ATTEMPTS: u32 = 16;

/// Candidates stay in the owner-assigned part of the NV index range.
const OWNER_NV_SPAN: u32 = 0x0030_0000;

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
struct NvEntry {
    index: u32,
    size: u16,
}

impl NvEntry {
    fn handle(&self) -> Result<NvIndexTpmHandle, Error> {
        Ok(NvIndexTpmHandle::new(self.index).map_err(senv_tpm::Error::from)?)
    }
}

/// Values live in TPM NV indices; only the key-to-index map is on disk.
///
/// The map is the fragile part: an old copy of it is accepted as readily as the current one.
/// Each key only ever uses indices derived from the key under a TPM primary, so a map that had
/// to be discarded leaves nothing behind: the next allocation of a key takes back the indices
/// that key may have defined before.
pub struct FragileTpmStorage {
    file: WrappedJsonFile,
    index: BTreeMap<String, NvEntry>,
    /// The map on disk was unreadable and has been replaced.
    reset: bool,
}

impl FragileTpmStorage {
    pub fn open(manager: Arc<ResourceManager>, path: &Path) -> Self {
        let file = WrappedJsonFile::new(manager, path, UNIQUE);
        let (index, reset) = match file.load::<BTreeMap<String, NvEntry>>() {
            Ok(index) => (index, false),
            Err(e) => {
                warn!("discarding unreadable NV index map {}: {}", file.path().display(), e);
                (BTreeMap::new(), true)
            }
        };
        info!("secure gatekeeper storage holds {} entries", index.len());
        Self { file, index, reset }
    }

    fn entry(&self, key: &str) -> Result<NvEntry, Error> {
        self.index.get(key).copied().ok_or_else(|| Error::UnknownKey(key.to_owned()))
    }

    /// The `attempt`th NV index `key` may live in.
    fn candidate(&self, key: &str, attempt: u32) -> Result<u32, Error> {
        let mut data = attempt.to_be_bytes().to_vec();
        data.extend_from_slice(key.as_bytes());
        let mac = self.file.mac(&data)?;
        let raw = u32::from_be_bytes([mac[0], mac[1], mac[2], mac[3]]);
        Ok(NV_INDEX_FIRST + raw % OWNER_NV_SPAN)
    }

    fn in_use(&self, index: u32) -> bool {
        self.index.values().any(|entry| entry.index == index)
    }

    fn define(&self, entry: NvEntry) -> Result<(), TpmError> {
        let handle = NvIndexTpmHandle::new(entry.index)?;
        self.file.manager().with_tpm(|tpm| tpm.nv_define_space(handle, entry.size))
    }

    fn undefine(&self, entry: NvEntry) {
        let result = NvIndexTpmHandle::new(entry.index)
            .map_err(TpmError::from)
            .and_then(|handle| self.file.manager().with_tpm(|tpm| tpm.nv_undefine_space(handle)));
        if let Err(e) = result {
            warn!("failed to undefine NV index {:#010x}: {}", entry.index, e);
        }
    }

    /// Define `entry`, taking it back first if it is left over from a discarded map.
    fn claim(&self, entry: NvEntry) -> Result<bool, Error> {
        match self.define(entry) {
            Ok(()) => Ok(true),
            Err(TpmError::NvDefined) if self.reset && !self.in_use(entry.index) => {
                info!("reclaiming NV index {:#010x} from a discarded map", entry.index);
                self.undefine(entry);
                self.define(entry)?;
                Ok(true)
            }
            Err(TpmError::NvDefined) => {
                warn!("NV index {:#010x} already defined, trying the next one", entry.index);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Storage for FragileTpmStorage {
    fn allocate(&mut self, key: &str, size: usize) -> Result<(), Error> {
        if self.index.contains_key(key) {
            return Ok(());
        }
        let size = u16::try_from(size).map_err(|_e| Error::TooLarge {
            key: key.to_owned(),
            size,
            capacity: u16::MAX as usize,
        })?;
        for attempt in 0..MAX_INDEX_ATTEMPTS {
            let entry = NvEntry { index: self.candidate(key, attempt)?, size };
            if !self.claim(entry)? {
                continue;
            }
            self.index.insert(key.to_owned(), entry);
            if let Err(e) = self.file.store(&self.index) {
                self.index.remove(key);
                self.undefine(entry);
                return Err(e);
            }
            return Ok(());
        }
        Err(Error::NvExhausted(MAX_INDEX_ATTEMPTS))
    }

    fn has_key(&self, key: &str) -> Result<bool, Error> {
        Ok(self.index.contains_key(key))
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let entry = self.entry(key)?;
        let handle = entry.handle()?;
        let result = self.file.manager().with_tpm(|tpm| tpm.nv_read(handle, 0, entry.size));
        match result {
            Ok(data) => Ok(Some(data.value().to_vec())),
            Err(TpmError::NvUninitialized) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), Error> {
        let entry = self.entry(key)?;
        check_capacity(key, data.len(), entry.size as usize)?;
        let handle = entry.handle()?;
        let buffer = MaxNvBuffer::try_from(data.to_vec()).map_err(senv_tpm::Error::from)?;
        self.file.manager().with_tpm(|tpm| tpm.nv_write(handle, 0, buffer))?;
        Ok(())
    }
}
