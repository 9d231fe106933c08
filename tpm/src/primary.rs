//! Deterministic primary keys in the owner hierarchy, and the templates of their children.

use crate::{Error, ResourceManager, Slot};
use std::sync::Arc;
use tss_esapi::{
    attributes::ObjectAttributesBuilder,
    interface_types::{algorithm::HashingAlgorithm, algorithm::PublicAlgorithm},
    structures::{
        Digest, KeyedHashScheme, Public, PublicBuilder, PublicKeyedHashParameters,
        SymmetricCipherParameters, SymmetricDefinitionObject,
    },
};

/// Largest unique value a primary template may carry.
pub const MAX_UNIQUE_SIZE: usize = 32;

/// What a primary key is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPurpose {
    /// HMAC-SHA256 keyed-hash key.
    Signing,
    /// Restricted AES-128-CFB storage key that wraps children.
    Parent,
}

/// Recipe for a primary key: the same recipe on the same TPM always yields the same key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimaryKeyBuilder {
    purpose: KeyPurpose,
    unique: Vec<u8>,
}

impl PrimaryKeyBuilder {
    pub fn signing(unique: &[u8]) -> Self {
        Self { purpose: KeyPurpose::Signing, unique: unique.to_vec() }
    }

    pub fn parent(unique: &[u8]) -> Self {
        Self { purpose: KeyPurpose::Parent, unique: unique.to_vec() }
    }

    pub fn purpose(&self) -> KeyPurpose {
        self.purpose
    }

    pub fn template(&self) -> Result<Public, Error> {
        if self.unique.len() > MAX_UNIQUE_SIZE {
            return Err(Error::UniqueTooLong(self.unique.len()));
        }
        let unique = Digest::try_from(self.unique.clone())?;
        let builder = PublicBuilder::new().with_name_hashing_algorithm(HashingAlgorithm::Sha256);
        let public = match self.purpose {
            KeyPurpose::Signing => builder
                .with_public_algorithm(PublicAlgorithm::KeyedHash)
                .with_object_attributes(
                    ObjectAttributesBuilder::new()
                        .with_sign_encrypt(true)
                        .with_user_with_auth(true)
                        .with_sensitive_data_origin(true)
                        .build()?,
                )
                .with_keyed_hash_parameters(PublicKeyedHashParameters::new(
                    KeyedHashScheme::HMAC_SHA_256,
                ))
                .with_keyed_hash_unique_identifier(unique)
                .build()?,
            KeyPurpose::Parent => builder
                .with_public_algorithm(PublicAlgorithm::SymCipher)
                .with_object_attributes(
                    ObjectAttributesBuilder::new()
                        .with_user_with_auth(true)
                        .with_restricted(true)
                        .with_decrypt(true)
                        .with_fixed_tpm(true)
                        .with_fixed_parent(true)
                        .with_sensitive_data_origin(true)
                        .build()?,
                )
                .with_symmetric_cipher_parameters(SymmetricCipherParameters::new(
                    SymmetricDefinitionObject::AES_128_CFB,
                ))
                .with_symmetric_cipher_unique_identifier(unique)
                .build()?,
        };
        Ok(public)
    }

    /// Create and load the primary key into a freshly reserved slot.
    pub fn create(&self, manager: &Arc<ResourceManager>) -> Result<Slot, Error> {
        let template = self.template()?;
        let mut slot = manager.reserve_slot().ok_or(Error::NoSlot)?;
        let handle = manager.with_tpm(|tpm| tpm.create_primary(template))?;
        slot.set(handle);
        Ok(slot)
    }
}

/// Unrestricted AES-128-CFB key usable for both directions, created under a parent primary.
pub fn cipher_child_template() -> Result<Public, Error> {
    Ok(PublicBuilder::new()
        .with_public_algorithm(PublicAlgorithm::SymCipher)
        .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
        .with_object_attributes(
            ObjectAttributesBuilder::new()
                .with_user_with_auth(true)
                .with_decrypt(true)
                .with_sign_encrypt(true)
                .with_fixed_tpm(true)
                .with_fixed_parent(true)
                .with_sensitive_data_origin(true)
                .build()?,
        )
        .with_symmetric_cipher_parameters(SymmetricCipherParameters::new(
            SymmetricDefinitionObject::AES_128_CFB,
        ))
        .with_symmetric_cipher_unique_identifier(Digest::default())
        .build()?)
}
