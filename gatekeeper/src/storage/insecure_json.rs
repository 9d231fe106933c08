use super::{check_capacity, Storage, WrappedJsonFile};
use crate::Error;
use log::info;
use senv_tpm::ResourceManager;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, sync::Arc};

const UNIQUE: &[u8] = b"gatekeeper_insecure_index";

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
struct Entry {
    capacity: usize,
    data: Option<Vec<u8>>,
}

/// Values live in the state file itself, which is rewritten on every change.
pub struct InsecureJsonStorage {
    file: WrappedJsonFile,
    entries: BTreeMap<String, Entry>,
}

impl InsecureJsonStorage {
    pub fn open(manager: Arc<ResourceManager>, path: &Path) -> Self {
        let file = WrappedJsonFile::new(manager, path, UNIQUE);
        let entries: BTreeMap<String, Entry> = file.load_or_reset();
        info!("insecure gatekeeper storage holds {} entries", entries.len());
        Self { file, entries }
    }
}

impl Storage for InsecureJsonStorage {
    fn allocate(&mut self, key: &str, size: usize) -> Result<(), Error> {
        if self.entries.contains_key(key) {
            return Ok(());
        }
        self.entries.insert(key.to_owned(), Entry { capacity: size, data: None });
        self.file.store(&self.entries)
    }

    fn has_key(&self, key: &str) -> Result<bool, Error> {
        Ok(self.entries.contains_key(key))
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let entry = self.entries.get(key).ok_or_else(|| Error::UnknownKey(key.to_owned()))?;
        Ok(entry.data.clone())
    }

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), Error> {
        let entry =
            self.entries.get_mut(key).ok_or_else(|| Error::UnknownKey(key.to_owned()))?;
        check_capacity(key, data.len(), entry.capacity)?;
        entry.data = Some(data.to_vec());
        self.file.store(&self.entries)
    }
}
