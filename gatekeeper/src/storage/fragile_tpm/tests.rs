use super::*;
use senv_tpm::{mock::MockTpm, Tpm};
use std::fs;

fn manager() -> Arc<ResourceManager> {
    let mut tpm = MockTpm::new();
    tpm.startup().unwrap();
    Arc::new(ResourceManager::new(Box::new(tpm)))
}

fn is_defined(rm: &ResourceManager, index: u32) -> bool {
    let handle = NvIndexTpmHandle::new(index).unwrap();
    match rm.with_tpm(|tpm| tpm.nv_read(handle, 0, 1)) {
        Ok(_) | Err(TpmError::NvUninitialized) => true,
        Err(TpmError::Response("TPM_RC_HANDLE")) => false,
        Err(e) => panic!("unexpected error {:?}", e),
    }
}

#[test]
fn test_candidates_are_per_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = FragileTpmStorage::open(manager(), &dir.path().join("map"));
    let first = store.candidate("10", 0).unwrap();
    assert_eq!(first, store.candidate("10", 0).unwrap());
    assert_ne!(first, store.candidate("10", 1).unwrap());
    assert_ne!(first, store.candidate("11", 0).unwrap());
    assert!((NV_INDEX_FIRST..NV_INDEX_FIRST + OWNER_NV_SPAN).contains(&first));
}

#[test]
fn test_failed_store_releases_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map");
    let rm = manager();
    let mut store = FragileTpmStorage::open(Arc::clone(&rm), &path);
    // The map can no longer be written once a directory takes its place.
    fs::create_dir(&path).unwrap();

    assert!(matches!(store.allocate("10", 4), Err(Error::Io(_))));
    assert!(!store.has_key("10").unwrap());
    assert!(!is_defined(&rm, store.candidate("10", 0).unwrap()));

    fs::remove_dir(&path).unwrap();
    store.allocate("10", 4).unwrap();
    assert_eq!(store.entry("10").unwrap().index, store.candidate("10", 0).unwrap());
    assert_eq!(rm.used(), 0);
}

#[test]
fn test_discarded_map_indices_are_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map");
    let rm = manager();
    let index = {
        let mut store = FragileTpmStorage::open(Arc::clone(&rm), &path);
        store.allocate("10", 4).unwrap();
        store.write("10", &[1, 2, 3, 4]).unwrap();
        store.entry("10").unwrap().index
    };

    fs::write(&path, b"not a wrapped map").unwrap();
    let mut store = FragileTpmStorage::open(Arc::clone(&rm), &path);
    assert!(store.reset);
    assert!(!store.has_key("10").unwrap());
    assert!(is_defined(&rm, index));

    store.allocate("10", 4).unwrap();
    assert_eq!(store.entry("10").unwrap().index, index);
    // The reclaimed index starts out unwritten.
    assert_eq!(store.read("10").unwrap(), None);
}

#[test]
fn test_foreign_index_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let rm = manager();
    let mut store = FragileTpmStorage::open(Arc::clone(&rm), &dir.path().join("map"));
    let taken = store.candidate("10", 0).unwrap();
    let handle = NvIndexTpmHandle::new(taken).unwrap();
    rm.with_tpm(|tpm| tpm.nv_define_space(handle, 4)).unwrap();

    store.allocate("10", 4).unwrap();
    assert_eq!(store.entry("10").unwrap().index, store.candidate("10", 1).unwrap());
    assert!(is_defined(&rm, taken));
}
