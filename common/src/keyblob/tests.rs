use super::*;
use crate::wire::keymint::{Algorithm, KeySizeInBits, Tag};
use alloc::vec;

/// Sealer that appends the hidden context in the clear.
#[derive(Default)]
struct ClearKeyBlobMaker {
    versions: Versions,
}

impl KeyBlobMaker for ClearKeyBlobMaker {
    fn seal(&mut self, key: &KeyBlob, hidden: &[u8]) -> Result<Vec<u8>, Error> {
        let mut blob = key.serialize()?;
        blob.extend_from_slice(hidden);
        Ok(blob)
    }
    fn unseal(&mut self, blob: &[u8], hidden: &[u8]) -> Result<KeyBlob, Error> {
        let body = blob
            .strip_suffix(hidden)
            .ok_or_else(|| km_err!(UnknownError, "hidden context mismatch"))?;
        KeyBlob::deserialize(body)
    }
    fn versions(&self) -> &Versions {
        &self.versions
    }
    fn versions_mut(&mut self) -> &mut Versions {
        &mut self.versions
    }
}

/// Rng that counts upwards.
#[derive(Default)]
struct FakeRng(u8);

impl Rng for FakeRng {
    fn add_entropy(&mut self, _data: &[u8]) {}
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for b in dest {
            *b = self.0;
            self.0 = self.0.wrapping_add(1);
        }
    }
}

fn create(
    maker: &mut ClearKeyBlobMaker,
    description: &[KeyParam],
    secrets: Option<&mut dyn SecureDeletionSecretManager>,
) -> Result<CreatedBlob, Error> {
    let mut rng = FakeRng::default();
    let purpose = SlotPurpose::KeyGeneration;
    maker.create(description, KeyOrigin::Generated, &[7; 16], secrets, &mut rng, purpose)
}

fn aes_description() -> Vec<KeyParam> {
    vec![KeyParam::Algorithm(Algorithm::Aes), KeyParam::KeySize(KeySizeInBits(128))]
}

#[test]
fn test_key_blob_encoding() {
    let key = KeyBlob {
        key_material: vec![1, 2, 3],
        hw_enforced: aes_description(),
        sw_enforced: vec![KeyParam::UsageCountLimit(1)],
    };
    let data = key.serialize().unwrap();
    assert_eq!(&data[..7], &[3, 0, 0, 0, 1, 2, 3]);
    assert_eq!(KeyBlob::deserialize(&data).unwrap(), key);

    let mut longer = data.clone();
    longer.push(0);
    assert_eq!(KeyBlob::deserialize(&longer).unwrap_err().code(), ErrorCode::InvalidKeyBlob);
    assert!(KeyBlob::deserialize(&data[..data.len() - 1]).is_err());
}

#[test]
fn test_create_adds_versions() {
    let mut maker = ClearKeyBlobMaker::default();
    maker.set_system_version(13, 202301);
    maker.set_vendor_patchlevel(20230105);
    let mut description = aes_description();
    description.push(KeyParam::ApplicationId(b"app".to_vec()));
    let created = create(&mut maker, &description, None).unwrap();
    assert_eq!(created.blob[0], 0);

    let mut want = aes_description();
    want.extend_from_slice(&[
        KeyParam::Origin(KeyOrigin::Generated),
        KeyParam::OsVersion(13),
        KeyParam::OsPatchlevel(202301),
        KeyParam::VendorPatchlevel(20230105),
    ]);
    assert_eq!(created.hw_enforced, want);
    assert!(created.sw_enforced.is_empty());

    let key = maker.unwrap(&created.blob, &description, None).unwrap();
    assert_eq!(key.key_material, vec![7; 16]);
    assert_eq!(key.hw_enforced, want);

    let err = maker.unwrap(&created.blob, &aes_description(), None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidKeyBlob);
}

#[test]
fn test_create_rejects_auto_added_tags() {
    let mut maker = ClearKeyBlobMaker::default();
    for param in [
        KeyParam::Origin(KeyOrigin::Imported),
        KeyParam::RootOfTrust(vec![1]),
        KeyParam::OsVersion(1),
        KeyParam::OsPatchlevel(1),
        KeyParam::VendorPatchlevel(1),
        KeyParam::BootPatchlevel(1),
    ] {
        let mut description = aes_description();
        description.push(param);
        let err = create(&mut maker, &description, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTag);
    }
}

#[test]
fn test_versions_check() {
    let current = Versions {
        os_version: 14,
        os_patchlevel: 202402,
        vendor_patchlevel: Some(20240201),
        boot_patchlevel: None,
    };
    let tests = vec![
        (vec![KeyParam::OsVersion(14), KeyParam::OsPatchlevel(202402)], None),
        (vec![KeyParam::OsVersion(0)], None),
        (vec![KeyParam::OsVersion(13)], Some(ErrorCode::KeyRequiresUpgrade)),
        (vec![KeyParam::OsPatchlevel(202401)], Some(ErrorCode::KeyRequiresUpgrade)),
        (vec![KeyParam::OsPatchlevel(202403)], Some(ErrorCode::InvalidKeyBlob)),
        (vec![KeyParam::VendorPatchlevel(20230101)], Some(ErrorCode::KeyRequiresUpgrade)),
        (vec![KeyParam::BootPatchlevel(1)], None),
    ];
    for (hw_enforced, want) in tests {
        let got = current.check(&hw_enforced).err().map(|e| e.code());
        assert_eq!(got, want, "for {:?}", hw_enforced);
    }
}

#[test]
fn test_versions_upgrade() {
    let current = Versions { os_version: 14, os_patchlevel: 202402, ..Default::default() };
    let mut hw = vec![KeyParam::OsVersion(14), KeyParam::OsPatchlevel(202402)];
    assert!(!current.upgrade(&mut hw).unwrap());

    let mut hw = vec![KeyParam::OsVersion(13), KeyParam::OsPatchlevel(202301)];
    assert!(current.upgrade(&mut hw).unwrap());
    assert_eq!(hw, vec![KeyParam::OsVersion(14), KeyParam::OsPatchlevel(202402)]);

    let mut hw = vec![KeyParam::OsVersion(15)];
    assert_eq!(current.upgrade(&mut hw).unwrap_err().code(), ErrorCode::InvalidArgument);

    let dev = Versions { os_version: 0, os_patchlevel: 202402, ..Default::default() };
    let mut hw = vec![KeyParam::OsVersion(14), KeyParam::OsPatchlevel(202402)];
    assert!(dev.upgrade(&mut hw).unwrap());
    assert_eq!(hw[0], KeyParam::OsVersion(0));
    assert!(hw.iter().all(|p| p.tag() != Tag::VendorPatchlevel));
}

#[test]
fn test_binding_parse() {
    let tests: Vec<(&[u8], Option<(Binding, usize)>)> = vec![
        (&[0, 9, 9], Some((Binding::Unbound, 2))),
        (&[1], Some((Binding::FactoryReset, 0))),
        (&[2, 5, 0, 0, 0, 9], Some((Binding::Slot(SecureDeletionSlot(5)), 1))),
        (&[2, 5, 0, 0], None),
        (&[3, 0], None),
        (&[], None),
    ];
    for (blob, want) in tests {
        let got = Binding::parse(blob).ok().map(|(b, rest)| (b, rest.len()));
        assert_eq!(got, want, "for {:?}", blob);
    }
    assert_eq!(secure_deletion_slot(&[2, 1, 1, 0, 0]), Some(SecureDeletionSlot(0x101)));
    assert_eq!(secure_deletion_slot(&[1, 1, 1, 0, 0]), None);
}

#[test]
fn test_single_use_key_needs_slot() {
    let mut maker = ClearKeyBlobMaker::default();
    let mut description = aes_description();
    description.push(KeyParam::UsageCountLimit(1));
    let err = create(&mut maker, &description, None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::RollbackResistanceUnavailable);

    let mut description = aes_description();
    description.push(KeyParam::RollbackResistance);
    let err = create(&mut maker, &description, None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::RollbackResistanceUnavailable);

    let mut description = aes_description();
    description.push(KeyParam::UsageCountLimit(2));
    assert!(create(&mut maker, &description, None).is_ok());
}

#[test]
fn test_deleted_slot_invalidates_blob() {
    let mut maker = ClearKeyBlobMaker::default();
    let mut mgr = InMemorySlotManager::<4>::default();
    let mut description = aes_description();
    description.push(KeyParam::RollbackResistance);
    let a = create(&mut maker, &description, Some(&mut mgr)).unwrap();
    let b = create(&mut maker, &description, Some(&mut mgr)).unwrap();
    let plain = create(&mut maker, &aes_description(), Some(&mut mgr)).unwrap();
    assert_eq!(mgr.used(), 2);
    assert_eq!(plain.blob[0], 1);
    let slot_a = secure_deletion_slot(&a.blob).unwrap();
    assert_ne!(Some(slot_a), secure_deletion_slot(&b.blob));

    assert!(maker.unwrap(&a.blob, &[], Some(&mgr)).is_ok());
    // Without its secrets the blob does not unwrap.
    assert_eq!(maker.unwrap(&a.blob, &[], None).unwrap_err().code(), ErrorCode::InvalidKeyBlob);
    let mut unbound = a.blob.clone();
    unbound.drain(..5);
    unbound.insert(0, 0);
    let err = maker.unwrap(&unbound, &[], Some(&mgr)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidKeyBlob);

    mgr.delete_secret(slot_a).unwrap();
    let err = maker.unwrap(&a.blob, &[], Some(&mgr)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidKeyBlob);
    assert!(maker.unwrap(&b.blob, &[], Some(&mgr)).is_ok());
    assert!(maker.unwrap(&plain.blob, &[], Some(&mgr)).is_ok());

    mgr.delete_all();
    assert_eq!(mgr.used(), 0);
    for blob in [&b.blob, &plain.blob] {
        let err = maker.unwrap(blob, &[], Some(&mgr)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidKeyBlob);
    }
}

#[test]
fn test_slots_exhausted() {
    let mut maker = ClearKeyBlobMaker::default();
    let mut mgr = InMemorySlotManager::<1>::default();
    let mut description = aes_description();
    description.push(KeyParam::UsageCountLimit(1));
    create(&mut maker, &description, Some(&mut mgr)).unwrap();
    let err = create(&mut maker, &description, Some(&mut mgr)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::RollbackResistanceUnavailable);
    let err = mgr.delete_secret(SecureDeletionSlot(7)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidKeyBlob);
}

/// Sealer that always fails.
#[derive(Default)]
struct FailingKeyBlobMaker {
    versions: Versions,
}

impl KeyBlobMaker for FailingKeyBlobMaker {
    fn seal(&mut self, _key: &KeyBlob, _hidden: &[u8]) -> Result<Vec<u8>, Error> {
        Err(km_err!(UnknownError, "seal failed"))
    }
    fn unseal(&mut self, _blob: &[u8], _hidden: &[u8]) -> Result<KeyBlob, Error> {
        Err(km_err!(UnknownError, "unseal failed"))
    }
    fn versions(&self) -> &Versions {
        &self.versions
    }
    fn versions_mut(&mut self) -> &mut Versions {
        &mut self.versions
    }
}

#[test]
fn test_failed_seal_releases_slot() {
    let mut maker = FailingKeyBlobMaker::default();
    let mut mgr = InMemorySlotManager::<2>::default();
    let mut description = aes_description();
    description.push(KeyParam::RollbackResistance);
    let mut rng = FakeRng::default();
    let err = maker
        .create(
            &description,
            KeyOrigin::Imported,
            &[1; 16],
            Some(&mut mgr),
            &mut rng,
            SlotPurpose::KeyImport,
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnknownError);
    assert_eq!(mgr.used(), 0);
}
