//! TPM 2.0 access for the secure environment: backends, slot rationing, and the layered
//! serializers that wrap everything handed back to the guest.

extern crate alloc;

pub mod cipher;
pub mod device_hmac;
pub mod error;
pub mod esys;
pub mod hmac;
pub mod keyblob;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod nv;
pub mod primary;
pub mod resource_manager;
pub mod serialize;
pub mod simulator;

pub use device_hmac::TpmDeviceHmac;
pub use error::{Error, TpmError};
pub use esys::EsysTpm;
pub use keyblob::TpmKeyBlobMaker;
pub use resource_manager::{ResourceManager, Slot};

use tss_esapi::{
    handles::{KeyHandle, NvIndexTpmHandle, ObjectHandle},
    structures::{Auth, Digest, InitialValue, MaxBuffer, MaxNvBuffer, Private, Public},
};


/// First and last handles of the NV index range.
pub const NV_INDEX_FIRST: u32 = 0x0100_0000;
pub const NV_INDEX_LAST: u32 = 0x01FF_FFFF;

/// Largest buffer accepted by a single TPM command (`TPM2_MAX_DIGEST_BUFFER`).
pub const MAX_BUFFER: usize = 1024;

/// AES block size used by the TPM's CFB keys.
pub const AES_BLOCK_SIZE: usize = 16;

/// Pool size used when the TPM does not report its transient object limit.
pub const DEFAULT_MAX_TRANSIENT_OBJECTS: u32 = 3;

/// The TPM commands used by the secure environment. All authorization uses an empty password.
pub trait Tpm: Send {
    /// `TPM2_Startup(TPM_SU_CLEAR)`. A TPM that is already running is not an error.
    fn startup(&mut self) -> Result<(), TpmError>;

    fn dictionary_attack_lock_reset(&mut self) -> Result<(), TpmError>;

    /// Value of the `TPM_PT_HR_TRANSIENT_MIN` property, zero if not reported.
    fn max_transient_objects(&mut self) -> Result<u32, TpmError>;

    /// Create a primary key in the owner hierarchy and load it.
    fn create_primary(&mut self, template: Public) -> Result<KeyHandle, TpmError>;

    /// Create a child of `parent`, returning it wrapped by the parent.
    fn create(&mut self, parent: KeyHandle, template: Public)
        -> Result<(Private, Public), TpmError>;

    fn load(&mut self, parent: KeyHandle, private: Private, public: Public)
        -> Result<KeyHandle, TpmError>;

    fn flush_context(&mut self, handle: ObjectHandle) -> Result<(), TpmError>;

    /// Single-shot HMAC-SHA256.
    fn hmac(&mut self, key: KeyHandle, data: MaxBuffer) -> Result<Digest, TpmError>;

    /// Open an HMAC-SHA256 sequence protected by `auth`.
    fn hmac_start(&mut self, key: KeyHandle, auth: Auth) -> Result<ObjectHandle, TpmError>;

    fn sequence_update(&mut self, sequence: ObjectHandle, data: MaxBuffer)
        -> Result<(), TpmError>;

    /// Finish an HMAC sequence. The TPM flushes the sequence object.
    fn sequence_complete(&mut self, sequence: ObjectHandle, data: MaxBuffer)
        -> Result<Digest, TpmError>;

    /// CFB encryption or decryption, returning the output and the chaining IV.
    fn encrypt_decrypt(
        &mut self,
        key: KeyHandle,
        decrypt: bool,
        iv: InitialValue,
        data: MaxBuffer,
    ) -> Result<(MaxBuffer, InitialValue), TpmError>;

    /// Define an owner-readable, owner-writable ordinary NV index of `size` bytes.
    fn nv_define_space(&mut self, index: NvIndexTpmHandle, size: u16) -> Result<(), TpmError>;

    fn nv_write(&mut self, index: NvIndexTpmHandle, offset: u16, data: MaxNvBuffer)
        -> Result<(), TpmError>;

    fn nv_read(&mut self, index: NvIndexTpmHandle, offset: u16, size: u16)
        -> Result<MaxNvBuffer, TpmError>;

    fn nv_undefine_space(&mut self, index: NvIndexTpmHandle) -> Result<(), TpmError>;

    /// Up to `size` random bytes. The TPM may return fewer.
    fn get_random(&mut self, size: usize) -> Result<Digest, TpmError>;
}
