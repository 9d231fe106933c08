//! Rationing of the TPM's transient object slots.

use crate::{Tpm, TpmError, DEFAULT_MAX_TRANSIENT_OBJECTS};
use log::{error, info, warn};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
};

#[cfg(test)]
mod tests;

/// Sole owner of the TPM context. Hands out [`Slot`]s so that callers never hold more transient
/// objects than the TPM can store.
pub struct ResourceManager {
    tpm: Mutex<Box<dyn Tpm>>,
    used: AtomicU32,
    max: u32,
}

impl ResourceManager {
    /// Take ownership of a started TPM, sizing the slot pool from its capabilities.
    pub fn new(mut tpm: Box<dyn Tpm>) -> Self {
        let max = match tpm.max_transient_objects() {
            Ok(0) | Err(_) => {
                let assumed = DEFAULT_MAX_TRANSIENT_OBJECTS;
                warn!("TPM transient object limit unknown, assuming {}", assumed);
                assumed
            }
            Ok(n) => n,
        };
        info!("TPM allows {} transient objects", max);
        Self::with_capacity(tpm, max)
    }

    pub fn with_capacity(tpm: Box<dyn Tpm>, max: u32) -> Self {
        Self { tpm: Mutex::new(tpm), used: AtomicU32::new(0), max }
    }

    pub fn capacity(&self) -> u32 {
        self.max
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    /// Reserve one transient object slot, or `None` if all are in use.
    pub fn reserve_slot(self: &Arc<Self>) -> Option<Slot> {
        let previous = self.used.fetch_add(1, Ordering::SeqCst);
        if previous >= self.max {
            self.used.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Slot { manager: Arc::clone(self), handle: None })
    }

    /// Run `f` with exclusive access to the TPM.
    pub fn with_tpm<R>(&self, f: impl FnOnce(&mut dyn Tpm) -> R) -> R {
        let mut tpm = match self.tpm.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("TPM lock poisoned, continuing");
                poisoned.into_inner()
            }
        };
        f(tpm.as_mut())
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        let used = *self.used.get_mut();
        if used != 0 {
            error!("ResourceManager dropped with {} slots in use", used);
        }
        debug_assert_eq!(used, 0);
    }
}

/// A reserved transient object slot. Dropping it flushes the object it holds and frees the slot.
pub struct Slot {
    manager: Arc<ResourceManager>,
    handle: Option<ObjectHandle>,
}

impl Slot {
    pub fn set(&mut self, handle: impl Into<ObjectHandle>) {
        self.handle = Some(handle.into());
    }

    pub fn get(&self) -> Option<ObjectHandle> {
        self.handle
    }

    /// Forget the held object, for objects the TPM has already flushed.
    pub fn clear(&mut self) {
        self.handle = None;
    }

    /// Held object as a key, or an error for an empty slot.
    pub fn key(&self) -> Result<KeyHandle, TpmError> {
        self.handle.map(KeyHandle::from).ok_or(TpmError::Malformed("slot holds no object"))
    }

    pub fn manager(&self) -> &Arc<ResourceManager> {
        &self.manager
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.manager.with_tpm(|tpm| tpm.flush_context(handle)) {
                error!("failed to flush TPM object {:#x}: {}", u32::from(handle), e);
            }
        }
        self.manager.used.fetch_sub(1, Ordering::SeqCst);
    }
}
