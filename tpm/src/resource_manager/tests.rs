use super::*;
use crate::{mock::MockTpm, primary::PrimaryKeyBuilder};
use std::{sync::atomic::AtomicU32, thread};

fn manager(max: u32) -> Arc<ResourceManager> {
    let mut tpm = MockTpm::with_max_transient_objects(max);
    tpm.startup().unwrap();
    Arc::new(ResourceManager::new(Box::new(tpm)))
}

#[test]
fn test_capacity_from_tpm() {
    assert_eq!(manager(5).capacity(), 5);
    assert_eq!(manager(3).capacity(), 3);
}

#[test]
fn test_reserve_until_full() {
    let rm = manager(3);
    let a = rm.reserve_slot().unwrap();
    let b = rm.reserve_slot().unwrap();
    let c = rm.reserve_slot().unwrap();
    assert_eq!(rm.used(), 3);
    assert!(rm.reserve_slot().is_none());
    assert_eq!(rm.used(), 3);
    // Release order is arbitrary.
    drop(b);
    assert_eq!(rm.used(), 2);
    let d = rm.reserve_slot().unwrap();
    drop(a);
    drop(d);
    drop(c);
    assert_eq!(rm.used(), 0);
}

#[test]
fn test_drop_flushes() {
    let rm = manager(1);
    for _ in 0..5 {
        // Without the flush the single object slot in the TPM would stay occupied.
        let slot = PrimaryKeyBuilder::signing(b"flush").create(&rm).unwrap();
        assert!(slot.get().is_some());
    }
    assert_eq!(rm.used(), 0);
}

#[test]
fn test_cleared_slot_not_flushed() {
    let rm = manager(2);
    let mut slot = rm.reserve_slot().unwrap();
    let template = PrimaryKeyBuilder::signing(b"x").template().unwrap();
    let handle = rm.with_tpm(|tpm| tpm.create_primary(template)).unwrap();
    slot.set(handle);
    rm.with_tpm(|tpm| tpm.flush_context(handle.into())).unwrap();
    slot.clear();
    assert!(slot.key().is_err());
    drop(slot);
    assert_eq!(rm.used(), 0);
}

#[test]
fn test_concurrent_slots() {
    const THREADS: usize = 8;
    let rm = manager(3);
    let held = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let rm = Arc::clone(&rm);
            let held = Arc::clone(&held);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                let mut refused = 0;
                for _ in 0..500 {
                    match rm.reserve_slot() {
                        Some(slot) => {
                            let now = held.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            thread::yield_now();
                            held.fetch_sub(1, Ordering::SeqCst);
                            drop(slot);
                        }
                        None => refused += 1,
                    }
                }
                refused
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(rm.used(), 0);
    assert!(rm.reserve_slot().is_some());
}
