//! KeyMint trusted application (TA) implementation, speaking the legacy keymaster message
//! protocol used by the guest's KeyMint HAL.

#![no_std]
extern crate alloc;

use alloc::{vec, vec::Vec};
use core::cell::RefCell;
use senv_common::{
    crypto::{self, MillisecondsSinceEpoch},
    keyblob::KeyBlob,
    km_err, Error,
};
use senv_wire::{
    keymint::{BootInfo, Digest, ErrorCode, KeyParam, SecurityLevel, VerifiedBootState},
    legacy::{
        self, GetHwInfoResponse, GetVersionResponse, HmacSharingParameters, List, MessageId,
        PerformOpReq, PerformOpRsp, SetAttestationIdsRequest,
    },
};
use log::{debug, error, info, warn};
use zeroize::Zeroizing;

mod cert;
mod clock;
pub mod device;
mod keys;
mod operation;
mod rkp;
mod secret;

use keys::AttestationKey;
use operation::{OpHandle, Operation};


/// Maximum number of parallel operations.
const MAX_OPERATIONS: usize = 16;

/// Maximum number of keys whose use count can be tracked.
const MAX_USE_COUNTED_KEYS: usize = 32;

/// Maximum amount of entropy accepted in a single `AddRngEntropy` request.
const MAX_ENTROPY_LEN: usize = 2048;

/// Size of the verified boot key reported in the root of trust.
const VERIFIED_BOOT_KEY_LEN: usize = 32;

/// Size of the key that attestation unique IDs are derived from.
const UNIQUE_ID_HBK_LEN: usize = 16;

/// Per-key ID use count.
struct UseCount {
    key_id: KeyId,
    count: u64,
}

/// KeyMint device implementation, running in the secure environment.
pub struct KeyMintTa {
    /**
     * State that is fixed on construction.
     */

    /// Trait objects that hold this device's implementations of the abstract cryptographic
    /// functionality traits.
    imp: crypto::Implementation,

    /// Trait objects that hold this device's implementations of per-device functionality.
    dev: device::Implementation,

    /// Information about this particular KeyMint implementation's hardware.
    hw_info: HardwareInfo,

    /**
     * State that is set after the TA starts, but latched thereafter.
     */

    /// Parameters for shared secret negotiation.
    shared_secret_params: Option<HmacSharingParameters>,

    /// Verified boot information provided by the HAL service.
    boot_info: Option<BootInfo>,

    /// Attestation ID information, set once by the HAL service.
    attestation_ids: Option<AttestationIds>,

    /// Whether the device is still in early-boot.
    in_early_boot: bool,

    /// Negotiated key for checking HMAC-ed data.
    hmac_key: Option<Zeroizing<Vec<u8>>>,

    /**
     * State that changes during operation.
     */

    /// Whether the device's screen is locked.
    device_locked: RefCell<LockState>,

    /// The operation table.
    operations: Vec<Option<Operation>>,

    /// Use counts for keys where this is tracked.
    use_count: [Option<UseCount>; MAX_USE_COUNTED_KEYS],

    /// Key at the root of the DICE chain in certificate requests, generated on first use.
    rkp_uds_key: Option<crypto::ec::Key>,

    /// Random per-boot key that attestation unique IDs are derived from.
    unique_id_hbk: Zeroizing<[u8; UNIQUE_ID_HBK_LEN]>,
}

/// Device lock state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LockState {
    /// Device is unlocked.
    Unlocked,
    /// Device has been locked since the given time.
    LockedSince(MillisecondsSinceEpoch),
    /// Device has been locked since the given time, and can only be unlocked with a password
    /// (rather than a biometric).
    PasswordLockedSince(MillisecondsSinceEpoch),
}

/// Hardware information.
#[derive(Clone, Debug)]
pub struct HardwareInfo {
    pub security_level: SecurityLevel,
    pub version_number: u32,
    pub impl_name: &'static str,
    pub author_name: &'static str,
}

/// Attestation ID values, as provided by the HAL service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttestationIds {
    pub brand: Vec<u8>,
    pub device: Vec<u8>,
    pub product: Vec<u8>,
    pub serial: Vec<u8>,
    pub imei: Vec<u8>,
    pub second_imei: Vec<u8>,
    pub meid: Vec<u8>,
    pub manufacturer: Vec<u8>,
    pub model: Vec<u8>,
}

impl AttestationIds {
    fn new(req: &mut SetAttestationIdsRequest, second_imei: Vec<u8>) -> Self {
        use core::mem::take;
        Self {
            brand: take(&mut req.brand),
            device: take(&mut req.device),
            product: take(&mut req.product),
            serial: take(&mut req.serial),
            imei: take(&mut req.imei),
            second_imei,
            meid: take(&mut req.meid),
            manufacturer: take(&mut req.manufacturer),
            model: take(&mut req.model),
        }
    }
}

/// Identifier for a keyblob.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
struct KeyId([u8; 32]);

impl KeyMintTa {
    /// Create a new [`KeyMintTa`] instance.
    pub fn new(
        hw_info: HardwareInfo,
        mut imp: crypto::Implementation,
        dev: device::Implementation,
    ) -> Self {
        let mut unique_id_hbk = Zeroizing::new([0; UNIQUE_ID_HBK_LEN]);
        imp.rng.fill_bytes(&mut unique_id_hbk[..]);
        Self {
            imp,
            dev,
            hw_info,
            in_early_boot: true,
            device_locked: RefCell::new(LockState::Unlocked),
            hmac_key: None,
            // Work around Rust limitation that `vec![None; n]` doesn't work.
            operations: (0..MAX_OPERATIONS).map(|_| None).collect(),
            use_count: Default::default(),
            shared_secret_params: None,
            boot_info: None,
            attestation_ids: None,
            rkp_uds_key: None,
            unique_id_hbk,
        }
    }

    /// Verified boot information, once configured.
    pub fn boot_info(&self) -> Option<&BootInfo> {
        self.boot_info.as_ref()
    }

    /// Attestation IDs, once configured.
    pub fn attestation_ids(&self) -> Option<&AttestationIds> {
        self.attestation_ids.as_ref()
    }

    /// Unwrap a key blob and check that its version tags match the current system state.
    fn load_key(&mut self, key_blob: &[u8], params: &[KeyParam]) -> Result<KeyBlob, Error> {
        let (keyblobs, secrets) = self.dev.unsealing();
        let key = keyblobs.unwrap(key_blob, params, secrets)?;
        keyblobs.versions().check(&key.hw_enforced)?;
        Ok(key)
    }

    /// Generate a unique identifier for a keyblob.
    fn key_id(&self, keyblob: &[u8]) -> Result<KeyId, Error> {
        Ok(KeyId(self.imp.sha256.hash(keyblob)?))
    }

    /// Increment the use count for the given key ID, failing if `max_uses` is reached.
    fn update_use_count(&mut self, key_id: KeyId, max_uses: u32) -> Result<(), Error> {
        let mut free_idx = None;
        let mut slot_idx = None;
        for idx in 0..self.use_count.len() {
            match &self.use_count[idx] {
                None if free_idx.is_none() => free_idx = Some(idx),
                None => {}
                Some(UseCount { key_id: k, count: _count }) if *k == key_id => {
                    slot_idx = Some(idx);
                    break;
                }
                Some(_) => {}
            }
        }
        if slot_idx.is_none() {
            // First use of this key ID; use a free slot if available.
            if let Some(idx) = free_idx {
                self.use_count[idx] = Some(UseCount { key_id, count: 0 });
                slot_idx = Some(idx);
            }
        }

        match slot_idx.and_then(|idx| self.use_count[idx].as_mut()) {
            Some(c) if c.count >= max_uses as u64 => {
                Err(km_err!(KeyMaxOpsExceeded, "use count {} >= limit {}", c.count, max_uses))
            }
            Some(c) => {
                c.count += 1;
                Ok(())
            }
            None => Err(km_err!(TooManyOperations, "too many use-counted keys already in play")),
        }
    }

    /// Configure the verified boot information, as reported by the bootloader properties.
    fn set_verified_boot_info(
        &mut self,
        boot_state: &[u8],
        bootloader_state: &[u8],
        vbmeta_digest: Vec<u8>,
    ) -> Result<(), Error> {
        let verified_boot_state = VerifiedBootState::from_property(boot_state).ok_or_else(|| {
            km_err!(InvalidArgument, "unrecognized verified boot state {:?}", boot_state)
        })?;
        // The boot chain exposes no key, so report an all-zero one.
        let boot_info = BootInfo {
            verified_boot_key: vec![0; VERIFIED_BOOT_KEY_LEN],
            device_boot_locked: bootloader_state == b"locked",
            verified_boot_state,
            verified_boot_hash: vbmeta_digest,
            boot_patchlevel: self.dev.keyblobs.versions().boot_patchlevel.unwrap_or(0),
        };
        if self.boot_info.is_none() {
            info!("Setting boot_info to {:?}", boot_info);
            self.boot_info = Some(boot_info);
        } else {
            warn!(
                "Boot info already set to {:?}, ignoring new values {:?}",
                self.boot_info, boot_info
            );
        }
        Ok(())
    }

    /// Configure attestation IDs externally.
    fn set_attestation_ids(&mut self, ids: AttestationIds) {
        if self.attestation_ids.is_some() {
            error!("Attempt to set attestation IDs when already set");
        } else {
            info!("Setting attestation IDs");
            self.attestation_ids = Some(ids);
        }
    }

    /// Process a single serialized request for command `cmd`, returning a serialized response.
    pub fn process(&mut self, cmd: u32, req_data: &[u8]) -> Vec<u8> {
        let rsp = match PerformOpReq::from_code_and_data(cmd, req_data) {
            Ok(req) => {
                debug!("-> TA: received request {:?}", req.code());
                let code = req.code();
                self.process_req(req).map_err(|e| op_error(code, e))
            }
            Err(e) => {
                error!("failed to decode request for command {}: {:?}", cmd, e);
                Err(ErrorCode::UnknownError)
            }
        };
        let encoded = match &rsp {
            Ok(rsp) => {
                debug!("<- TA: send response {:?}", rsp.code());
                legacy::serialize_rsp(rsp)
            }
            Err(rc) => {
                debug!("<- TA: send error {:?}", rc);
                legacy::serialize_error_rsp(*rc)
            }
        };
        match encoded {
            Ok(rsp_data) => rsp_data,
            Err(e) => {
                error!("failed to encode response: {:?}", e);
                unknown_error_rsp_data().to_vec()
            }
        }
    }

    /// Process a single request, returning a [`PerformOpRsp`].
    ///
    /// Select the appropriate method based on the request type, and use the
    /// request fields as parameters to the method.  In the opposite direction,
    /// build a response message from the values returned by the method.
    fn process_req(&mut self, req: PerformOpReq) -> Result<PerformOpRsp, Error> {
        use legacy::*;
        Ok(match req {
            // Informational messages.
            PerformOpReq::GetVersion(_req) => PerformOpRsp::GetVersion(GetVersionResponse {
                major_ver: 2,
                minor_ver: 0,
                subminor_ver: 0,
            }),
            PerformOpReq::GetHwInfo(_req) => PerformOpRsp::GetHwInfo(self.get_hardware_info()),
            PerformOpReq::GetSupportedAlgorithms(_req) => {
                PerformOpRsp::GetSupportedAlgorithms(SupportedAlgorithmsResponse {
                    algorithms: List(keys::supported_algorithms()?),
                })
            }
            PerformOpReq::GetSupportedBlockModes(req) => {
                PerformOpRsp::GetSupportedBlockModes(SupportedBlockModesResponse {
                    block_modes: List(keys::supported_block_modes(req.algorithm, req.purpose)?),
                })
            }
            PerformOpReq::GetSupportedPaddingModes(req) => {
                PerformOpRsp::GetSupportedPaddingModes(SupportedPaddingModesResponse {
                    padding_modes: List(keys::supported_padding_modes(req.algorithm, req.purpose)?),
                })
            }
            PerformOpReq::GetSupportedDigests(req) => {
                PerformOpRsp::GetSupportedDigests(SupportedDigestsResponse {
                    digests: List(keys::supported_digests(req.algorithm, req.purpose)?),
                })
            }
            PerformOpReq::GetSupportedImportFormats(req) => {
                PerformOpRsp::GetSupportedImportFormats(SupportedFormatsResponse {
                    formats: List(keys::supported_import_formats(req.algorithm)?),
                })
            }
            PerformOpReq::GetSupportedExportFormats(req) => {
                PerformOpRsp::GetSupportedExportFormats(SupportedFormatsResponse {
                    formats: List(keys::supported_export_formats(req.algorithm)?),
                })
            }

            // Configuration messages.
            PerformOpReq::AddRngEntropy(req) => {
                self.add_rng_entropy(&req.random_data)?;
                PerformOpRsp::AddRngEntropy(EmptyResponse {})
            }
            PerformOpReq::Configure(req) => {
                info!("Configure OS version {} patchlevel {}", req.os_version, req.os_patchlevel);
                self.dev.keyblobs.set_system_version(req.os_version, req.os_patchlevel);
                PerformOpRsp::Configure(EmptyResponse {})
            }
            PerformOpReq::ConfigureVendorPatchlevel(req) => {
                info!("Configure vendor patchlevel {}", req.vendor_patchlevel);
                self.dev.keyblobs.set_vendor_patchlevel(req.vendor_patchlevel);
                PerformOpRsp::ConfigureVendorPatchlevel(EmptyResponse {})
            }
            PerformOpReq::ConfigureBootPatchlevel(req) => {
                info!("Configure boot patchlevel {}", req.boot_patchlevel);
                self.dev.keyblobs.set_boot_patchlevel(req.boot_patchlevel);
                PerformOpRsp::ConfigureBootPatchlevel(EmptyResponse {})
            }
            PerformOpReq::ConfigureVerifiedBootInfo(req) => {
                self.set_verified_boot_info(
                    &req.boot_state,
                    &req.bootloader_state,
                    req.vbmeta_digest,
                )?;
                PerformOpRsp::ConfigureVerifiedBootInfo(EmptyResponse {})
            }
            PerformOpReq::SetAttestationIds(mut req) => {
                self.set_attestation_ids(AttestationIds::new(&mut req, Vec::new()));
                PerformOpRsp::SetAttestationIds(EmptyResponse {})
            }
            PerformOpReq::SetAttestationIdsKM3(mut req) => {
                let second_imei = core::mem::take(&mut req.second_imei);
                self.set_attestation_ids(AttestationIds::new(&mut req.base, second_imei));
                PerformOpRsp::SetAttestationIdsKM3(EmptyResponse {})
            }
            PerformOpReq::EarlyBootEnded(_req) => {
                self.early_boot_ended();
                PerformOpRsp::EarlyBootEnded(EmptyResponse {})
            }
            PerformOpReq::DeviceLocked(req) => {
                self.device_locked(req.password_only.0, &req.token)?;
                PerformOpRsp::DeviceLocked(EmptyResponse {})
            }

            // Shared secret and secure clock messages.
            PerformOpReq::GetHmacSharingParameters(_req) => {
                PerformOpRsp::GetHmacSharingParameters(GetHmacSharingParametersResponse {
                    params: self.get_shared_secret_params()?,
                })
            }
            PerformOpReq::ComputeSharedHmac(req) => {
                PerformOpRsp::ComputeSharedHmac(ComputeSharedHmacResponse {
                    sharing_check: self.compute_shared_secret(&req.params_array.0)?,
                })
            }
            PerformOpReq::GenerateTimestampToken(req) => {
                PerformOpRsp::GenerateTimestampToken(GenerateTimestampTokenResponse {
                    token: self.generate_timestamp(req.challenge)?,
                })
            }
            PerformOpReq::VerifyAuthorization(req) => {
                PerformOpRsp::VerifyAuthorization(VerifyAuthorizationResponse {
                    token: self.verify_authorization(req.challenge, req.parameters_to_verify)?,
                })
            }

            // Key management messages.
            PerformOpReq::GenerateKey(req) => PerformOpRsp::GenerateKey(self.generate_key(
                &req.key_description,
                AttestationKey::from_request(
                    &req.attestation_signing_key_blob,
                    &req.attest_key_params,
                    &req.issuer_subject,
                ),
            )?),
            PerformOpReq::ImportKey(req) => PerformOpRsp::ImportKey(self.import_key(
                &req.key_description,
                req.key_format,
                &req.key_data,
                AttestationKey::from_request(
                    &req.attestation_signing_key_blob,
                    &req.attest_key_params,
                    &req.issuer_subject,
                ),
            )?),
            PerformOpReq::ImportWrappedKey(req) => {
                PerformOpRsp::ImportWrappedKey(self.import_wrapped_key(
                    &req.wrapped_key,
                    &req.wrapping_key,
                    &req.masking_key,
                    &req.additional_params,
                    req.password_sid,
                    req.biometric_sid,
                )?)
            }
            PerformOpReq::GetKeyCharacteristics(req) => PerformOpRsp::GetKeyCharacteristics(
                self.get_key_characteristics(&req.key_blob, &req.additional_params)?,
            ),
            PerformOpReq::ExportKey(req) => PerformOpRsp::ExportKey(self.export_key(
                req.key_format,
                &req.key_blob,
                &req.additional_params,
            )?),
            PerformOpReq::AttestKey(req) => PerformOpRsp::AttestKey(self.attest_key(
                &req.key_blob,
                &req.attest_params,
                AttestationKey::from_request(
                    &req.attestation_signing_key_blob,
                    &req.attest_key_params,
                    &req.issuer_subject,
                ),
            )?),
            PerformOpReq::UpgradeKey(req) => PerformOpRsp::UpgradeKey(UpgradeKeyResponse {
                upgraded_key: self.upgrade_key(&req.key_blob, &req.upgrade_params)?,
            }),
            PerformOpReq::DeleteKey(req) => {
                self.delete_key(&req.key_blob)?;
                PerformOpRsp::DeleteKey(EmptyResponse {})
            }
            PerformOpReq::DeleteAllKeys(_req) => {
                self.delete_all_keys();
                PerformOpRsp::DeleteAllKeys(EmptyResponse {})
            }

            // Operation messages.
            PerformOpReq::BeginOperation(req) => PerformOpRsp::BeginOperation(
                self.begin_operation(req.purpose, &req.key_blob, req.additional_params)?,
            ),
            PerformOpReq::UpdateOperation(req) => {
                PerformOpRsp::UpdateOperation(self.op_update(
                    OpHandle(req.op_handle),
                    &req.input,
                    &req.additional_params,
                )?)
            }
            PerformOpReq::FinishOperation(req) => {
                PerformOpRsp::FinishOperation(self.op_finish(
                    OpHandle(req.op_handle),
                    &req.input,
                    &req.signature,
                    &req.additional_params,
                )?)
            }
            PerformOpReq::AbortOperation(req) => {
                self.op_abort(OpHandle(req.op_handle))?;
                PerformOpRsp::AbortOperation(EmptyResponse {})
            }

            // Remote provisioning messages.
            PerformOpReq::GenerateRkpKey(req) => {
                let (key_blob, maced_public_key) = self.generate_rkp_key(req.test_mode.0)?;
                PerformOpRsp::GenerateRkpKey(GenerateRkpKeyResponse { key_blob, maced_public_key })
            }
            PerformOpReq::GenerateCsr(req) => PerformOpRsp::GenerateCsr(self.generate_cert_req(
                req.test_mode.0,
                &req.keys_to_sign.0,
                &req.endpoint_enc_cert_chain,
                &req.challenge,
            )?),
            PerformOpReq::GenerateCsrV2(req) => {
                PerformOpRsp::GenerateCsrV2(GenerateCsrV2Response {
                    csr: self.generate_cert_req_v2(&req.keys_to_sign.0, &req.challenge)?,
                })
            }
            PerformOpReq::GetRootOfTrust(req) => {
                PerformOpRsp::GetRootOfTrust(GetRootOfTrustResponse {
                    root_of_trust: self.get_root_of_trust(&req.challenge)?,
                })
            }
        })
    }

    fn get_hardware_info(&self) -> GetHwInfoResponse {
        GetHwInfoResponse {
            version: self.hw_info.version_number,
            security_level: self.hw_info.security_level,
            name: self.hw_info.impl_name.as_bytes().to_vec(),
            author: self.hw_info.author_name.as_bytes().to_vec(),
            timestamp_token_required: false,
        }
    }

    fn add_rng_entropy(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() > MAX_ENTROPY_LEN {
            return Err(km_err!(InvalidInputLength, "entropy size {} too large", data.len()));
        }
        info!("add {} bytes of entropy", data.len());
        self.imp.rng.add_entropy(data);
        Ok(())
    }

    fn early_boot_ended(&mut self) {
        if self.in_early_boot {
            info!("early boot ended");
        }
        self.in_early_boot = false;
    }

    /// Generate an HMAC-SHA256 value over the data using the device's HMAC key (if available).
    fn device_hmac(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let hmac_key = match &self.hmac_key {
            Some(k) => k,
            None => {
                error!("HMAC requested but no key available!");
                return Err(km_err!(HardwareNotYetAvailable, "HMAC key not agreed"));
            }
        };
        let mut hmac_op =
            self.imp.hmac.begin(crypto::hmac::Key::new_from(hmac_key), Digest::Sha256)?;
        hmac_op.update(data)?;
        hmac_op.finish()
    }

    /// Verify an HMAC-SHA256 value over the data using the device's HMAC key (if available).
    fn verify_device_hmac(&self, data: &[u8], mac: &[u8]) -> Result<bool, Error> {
        let remac = self.device_hmac(data)?;
        Ok(self.imp.compare.eq(mac, &remac))
    }

    /// Verify an HMAC-SHA256 value over the data using a device-bound key.
    fn verify_device_key_hmac(
        &self,
        key: crypto::DeviceKey,
        data: &[u8],
        mac: &[u8],
    ) -> Result<bool, Error> {
        let remac = self.dev.keys.hmac(key, data)?;
        Ok(self.imp.compare.eq(mac, &remac))
    }
}

/// Log and convert an error for the given request.
fn op_error(op: legacy::KeymasterCommand, err: Error) -> ErrorCode {
    warn!("failing {:?} request with error {:?}", op, err);
    err.into()
}

/// Hand-encoded response data for [`ErrorCode::UnknownError`], for use when serialization
/// itself fails.
fn unknown_error_rsp_data() -> [u8; 4] {
    (ErrorCode::UnknownError as i32 as u32).to_ne_bytes()
}
