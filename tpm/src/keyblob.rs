//! Key blobs sealed by the TPM.

use crate::{
    primary::PrimaryKeyBuilder,
    serialize::{Composite, EncryptedSerializable, HmacSerializable, Serializable},
    Error as TpmLayerError, ResourceManager,
};
use senv_common::{
    keyblob::{KeyBlob, KeyBlobMaker, Versions},
    wire::keymint::KeyParam,
    Error,
};
use std::sync::Arc;
use zeroize::Zeroize;

/// Unique data of the primaries protecting key blobs.
const KEY_BLOB_UNIQUE: &[u8] = b"TpmKeyBlobMaker";

/// Key blob maker that wraps `key_material ‖ hw_enforced ‖ sw_enforced` first in TPM
/// encryption and then in a TPM HMAC that also covers the hidden context.
pub struct TpmKeyBlobMaker {
    manager: Arc<ResourceManager>,
    parent: PrimaryKeyBuilder,
    signing: PrimaryKeyBuilder,
    versions: Versions,
}

impl TpmKeyBlobMaker {
    pub fn new(manager: Arc<ResourceManager>) -> Self {
        Self {
            manager,
            parent: PrimaryKeyBuilder::parent(KEY_BLOB_UNIQUE),
            signing: PrimaryKeyBuilder::signing(KEY_BLOB_UNIQUE),
            versions: Versions::default(),
        }
    }
}

impl KeyBlobMaker for TpmKeyBlobMaker {
    fn seal(&mut self, key: &KeyBlob, hidden: &[u8]) -> Result<Vec<u8>, Error> {
        let mut key_material = key.key_material.clone();
        let mut hw_enforced: Vec<KeyParam> = key.hw_enforced.clone();
        let mut sw_enforced: Vec<KeyParam> = key.sw_enforced.clone();
        let result = {
            let mut composite = Composite::new(vec![
                &mut key_material as &mut dyn Serializable,
                &mut hw_enforced as &mut dyn Serializable,
                &mut sw_enforced as &mut dyn Serializable,
            ]);
            let mut encrypted =
                EncryptedSerializable::new(&self.manager, &self.parent, &mut composite);
            HmacSerializable::new(&self.manager, &self.signing, &mut encrypted, hidden).to_bytes()
        };
        key_material.zeroize();
        Ok(result?)
    }

    fn unseal(&mut self, blob: &[u8], hidden: &[u8]) -> Result<KeyBlob, Error> {
        let mut key_material = Vec::new();
        let mut hw_enforced: Vec<KeyParam> = Vec::new();
        let mut sw_enforced: Vec<KeyParam> = Vec::new();
        let result = {
            let mut composite = Composite::new(vec![
                &mut key_material as &mut dyn Serializable,
                &mut hw_enforced as &mut dyn Serializable,
                &mut sw_enforced as &mut dyn Serializable,
            ]);
            let mut encrypted =
                EncryptedSerializable::new(&self.manager, &self.parent, &mut composite);
            let mut hmac =
                HmacSerializable::new(&self.manager, &self.signing, &mut encrypted, hidden);
            hmac.deserialize(blob).and_then(|rest| match rest.len() {
                0 => Ok(()),
                n => Err(TpmLayerError::Leftover(n)),
            })
        };
        let key = KeyBlob { key_material, hw_enforced, sw_enforced };
        result?;
        Ok(key)
    }

    fn versions(&self) -> &Versions {
        &self.versions
    }

    fn versions_mut(&mut self) -> &mut Versions {
        &mut self.versions
    }
}
