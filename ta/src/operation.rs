//! TA functionality related to in-progress crypto operations.

use crate::LockState;
use alloc::{boxed::Box, vec::Vec};
use core::ops::RangeInclusive;
use senv_common::{
    crypto::{
        self, aes, des, hmac, rsa, AadOperation, AccumulatingOperation, DeviceKey,
        EmittingOperation, KeyMaterial, MillisecondsSinceEpoch,
    },
    contains_tag_value, get_bool_tag_value, get_opt_tag_value, get_tag_value,
    keyblob::{self, SecureDeletionSlot},
    km_err, tag, try_to_vec, Error, FallibleAllocExt,
};
use senv_wire::{
    confui::CONFIRMATION_TOKEN_PREFIX,
    gatekeeper::HwAuthToken,
    keymint::{BlockMode, DateTime, ErrorCode, HardwareAuthenticatorType, KeyParam, KeyPurpose},
    legacy::{BeginOperationResponse, FinishOperationResponse, UpdateOperationResponse},
};
use log::{error, info, warn};

/// A trusted confirmation token should be the size of HMAC-SHA256 output.
const CONFIRMATION_TOKEN_SIZE: usize = 32;

/// Maximum size of messages with `Tag::TrustedConfirmationRequired` set.
const CONFIRMATION_MESSAGE_MAX_LEN: usize = 6144;

/// Union holder for in-progress cryptographic operations, each of which is an instance
/// of the relevant trait.
pub(crate) enum CryptoOperation {
    Aes(Box<dyn EmittingOperation>),
    AesGcm(Box<dyn AadOperation>),
    Des(Box<dyn EmittingOperation>),
    HmacSign(Box<dyn AccumulatingOperation>, usize), // tag length in bytes
    HmacVerify(Box<dyn AccumulatingOperation>, RangeInclusive<usize>),
    RsaDecrypt(Box<dyn AccumulatingOperation>),
    RsaSign(Box<dyn AccumulatingOperation>),
    EcAgree(Box<dyn AccumulatingOperation>),
    EcSign(Box<dyn AccumulatingOperation>),
}

/// Current state of an operation.
pub(crate) struct Operation {
    /// Random handle used to identify the operation, also used as a challenge.
    pub handle: OpHandle,

    /// Whether associated data is allowed (only ever true for AEADs before data has arrived).
    pub aad_allowed: bool,

    /// Buffer to accumulate data being signed that must have a trusted confirmation, starting
    /// with the confirmation token prefix.
    pub trusted_conf_data: Option<Vec<u8>>,

    /// Authentication data to check on every subsequent invocation.
    pub auth_info: Option<AuthInfo>,

    /// Secure deletion slot of a single-use key, deleted when the operation succeeds.
    pub slot_to_delete: Option<SecureDeletionSlot>,

    pub crypto_op: CryptoOperation,
}

/// Newtype for operation handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpHandle(pub u64);

/// Authentication requirements associated with an operation.
pub(crate) struct AuthInfo {
    secure_ids: Vec<u64>,
    auth_type: u32,
    timeout_secs: Option<u32>,
}

impl AuthInfo {
    /// Optionally build an `AuthInfo` from key characteristics. If no authentication is needed on
    /// `update()`/`finish()`, return `None`.
    fn new(key_chars: &[KeyParam]) -> Result<Option<AuthInfo>, Error> {
        let mut secure_ids = Vec::new();
        let mut auth_type = None;
        let mut timeout_secs = None;
        let mut no_auth_required = false;

        for param in key_chars {
            match param {
                KeyParam::UserSecureId(sid) => secure_ids.try_push(*sid)?,
                KeyParam::UserAuthType(atype) => {
                    if auth_type.is_none() {
                        auth_type = Some(*atype);
                    } else {
                        return Err(km_err!(InvalidKeyBlob, "duplicate UserAuthType tag found"));
                    }
                }
                KeyParam::AuthTimeout(secs) => {
                    if timeout_secs.is_none() {
                        timeout_secs = Some(*secs)
                    } else {
                        return Err(km_err!(InvalidKeyBlob, "duplicate AuthTimeout tag found"));
                    }
                }
                KeyParam::NoAuthRequired => no_auth_required = true,
                _ => {}
            }
        }

        if secure_ids.is_empty() {
            Ok(None)
        } else if let Some(auth_type) = auth_type {
            if no_auth_required {
                Err(km_err!(InvalidKeyBlob, "found both NO_AUTH_REQUIRED and USER_SECURE_ID"))
            } else {
                Ok(Some(AuthInfo { secure_ids, auth_type, timeout_secs }))
            }
        } else {
            Err(km_err!(KeyUserNotAuthenticated, "found USER_SECURE_ID but no USER_AUTH_TYPE"))
        }
    }
}

/// Return the single `AUTH_TOKEN` carried in a set of operation parameters, if any.
fn auth_token_param(params: &[KeyParam]) -> Result<Option<HwAuthToken>, Error> {
    match get_opt_tag_value!(params, AuthToken)? {
        Some(data) => HwAuthToken::from_bytes(data).map(Some).map_err(|e| {
            km_err!(KeyUserNotAuthenticated, "malformed auth token in params: {:?}", e)
        }),
        None => Ok(None),
    }
}

impl crate::KeyMintTa {
    pub(crate) fn begin_operation(
        &mut self,
        purpose: KeyPurpose,
        key_blob: &[u8],
        params: Vec<KeyParam>,
    ) -> Result<BeginOperationResponse, Error> {
        let op_idx = self.new_operation_index()?;

        let mut key = self.load_key(key_blob, &params)?;
        let mut key_chars = core::mem::take(&mut key.hw_enforced);
        key_chars.try_extend_from_slice(&key.sw_enforced)?;
        tag::check_begin_params(&key_chars, purpose, &params)?;
        let auth_token = auth_token_param(&params)?;
        self.check_begin_auths(&key_chars, purpose, key_blob, auth_token.as_ref())?;

        let trusted_conf_data = if purpose == KeyPurpose::Sign
            && get_bool_tag_value!(&key_chars, TrustedConfirmationRequired)?
        {
            // Trusted confirmation is required; accumulate the signed data in an extra buffer,
            // starting with a prefix.
            Some(try_to_vec(CONFIRMATION_TOKEN_PREFIX)?)
        } else {
            None
        };

        let mut op_auth_info = AuthInfo::new(&key_chars)?;
        if let Some(auth_info) = &op_auth_info {
            if let Some(timeout_secs) = auth_info.timeout_secs {
                // Timeout-bound keys are authenticated once, on begin().
                let auth_token = auth_token
                    .ok_or_else(|| km_err!(KeyUserNotAuthenticated, "no auth token on begin()"))?;
                let now = self.imp.clock.now();
                self.check_auth_token(&auth_token, auth_info, Some((now, timeout_secs)), None)?;
                op_auth_info = None;
            }
        }

        // The operation handle doubles as the challenge for per-operation auth tokens.
        let op_handle = self.new_op_handle();
        let mut output_params = Vec::new();
        let algo = tag::get_algorithm(&key_chars)?;
        let crypto_op = match KeyMaterial::from_raw(algo, &key.key_material)? {
            KeyMaterial::Aes(key) => {
                let caller_nonce = get_opt_tag_value!(&params, Nonce)?;
                if purpose == KeyPurpose::Decrypt
                    && caller_nonce.is_none()
                    && tag::get_block_mode(&params)? != BlockMode::Ecb
                {
                    return Err(km_err!(MissingNonce, "no nonce provided for decryption"));
                }
                let mode = aes::Mode::new(&params, caller_nonce, &mut *self.imp.rng)?;
                let dir = match purpose {
                    KeyPurpose::Encrypt => crypto::SymmetricOperation::Encrypt,
                    KeyPurpose::Decrypt => crypto::SymmetricOperation::Decrypt,
                    _ => {
                        return Err(km_err!(
                            IncompatiblePurpose,
                            "invalid purpose {:?} for AES key",
                            purpose
                        ))
                    }
                };
                if caller_nonce.is_none() {
                    // Need to return any randomly-generated nonce to the caller.
                    if let Some(nonce) = mode.nonce() {
                        output_params.try_push(KeyParam::Nonce(try_to_vec(nonce)?))?;
                    }
                }
                match mode {
                    aes::Mode::Cipher(mode) => {
                        CryptoOperation::Aes(self.imp.aes.begin(key, mode, dir)?)
                    }
                    aes::Mode::Aead(mode) => {
                        CryptoOperation::AesGcm(self.imp.aes.begin_aead(key, mode, dir)?)
                    }
                }
            }
            KeyMaterial::TripleDes(key) => {
                let caller_nonce = get_opt_tag_value!(&params, Nonce)?;
                if purpose == KeyPurpose::Decrypt
                    && caller_nonce.is_none()
                    && tag::get_block_mode(&params)? == BlockMode::Cbc
                {
                    return Err(km_err!(MissingNonce, "no IV provided for 3-DES decryption"));
                }
                let mode = des::Mode::new(&params, caller_nonce, &mut *self.imp.rng)?;
                let dir = match purpose {
                    KeyPurpose::Encrypt => crypto::SymmetricOperation::Encrypt,
                    KeyPurpose::Decrypt => crypto::SymmetricOperation::Decrypt,
                    _ => {
                        return Err(km_err!(
                            IncompatiblePurpose,
                            "invalid purpose {:?} for 3-DES key",
                            purpose
                        ))
                    }
                };
                if caller_nonce.is_none() {
                    if let Some(nonce) = mode.nonce() {
                        output_params.try_push(KeyParam::Nonce(try_to_vec(nonce)?))?;
                    }
                }
                CryptoOperation::Des(self.imp.des.begin(key, mode, dir)?)
            }
            KeyMaterial::Hmac(key) => {
                let digest = tag::get_digest(&params)?;
                match purpose {
                    KeyPurpose::Sign => {
                        let tag_len =
                            get_tag_value!(&params, MacLength, ErrorCode::MissingMacLength)?
                                as usize
                                / 8;
                        CryptoOperation::HmacSign(self.imp.hmac.begin(key, digest)?, tag_len)
                    }
                    KeyPurpose::Verify => {
                        // Remember the acceptable tag lengths.
                        let min_tag_len = get_tag_value!(
                            &key_chars,
                            MinMacLength,
                            ErrorCode::MissingMinMacLength
                        )? as usize
                            / 8;
                        let max_tag_len = hmac::digest_len(digest)? as usize / 8;
                        CryptoOperation::HmacVerify(
                            self.imp.hmac.begin(key, digest)?,
                            min_tag_len..=max_tag_len,
                        )
                    }
                    _ => {
                        return Err(km_err!(
                            IncompatiblePurpose,
                            "invalid purpose {:?} for HMAC key",
                            purpose
                        ))
                    }
                }
            }
            KeyMaterial::Rsa(key) => match purpose {
                KeyPurpose::Decrypt => {
                    let mode = rsa::DecryptionMode::new(&params)?;
                    CryptoOperation::RsaDecrypt(self.imp.rsa.begin_decrypt(key, mode)?)
                }
                KeyPurpose::Sign => {
                    let mode = rsa::SignMode::new(&params)?;
                    CryptoOperation::RsaSign(self.imp.rsa.begin_sign(key, mode)?)
                }
                _ => {
                    return Err(km_err!(
                        IncompatiblePurpose,
                        "invalid purpose {:?} for RSA key",
                        purpose
                    ))
                }
            },
            KeyMaterial::Ec(key) => match purpose {
                KeyPurpose::AgreeKey => CryptoOperation::EcAgree(self.imp.ec.begin_agree(key)?),
                KeyPurpose::Sign => {
                    let digest = tag::get_digest(&params)?;
                    CryptoOperation::EcSign(self.imp.ec.begin_sign(key, digest)?)
                }
                _ => {
                    return Err(km_err!(
                        IncompatiblePurpose,
                        "invalid purpose {:?} for EC key",
                        purpose
                    ))
                }
            },
        };
        let aad_allowed = matches!(crypto_op, CryptoOperation::AesGcm(_));
        let slot_to_delete = if contains_tag_value!(&key_chars, UsageCountLimit, 1) {
            keyblob::secure_deletion_slot(key_blob)
        } else {
            None
        };
        self.operations[op_idx] = Some(Operation {
            handle: op_handle,
            aad_allowed,
            trusted_conf_data,
            auth_info: op_auth_info,
            slot_to_delete,
            crypto_op,
        });
        info!("began {:?} operation {:?} on {:?} key", purpose, op_handle, algo);
        Ok(BeginOperationResponse { op_handle: op_handle.0, output_params })
    }

    pub(crate) fn op_update(
        &mut self,
        op_handle: OpHandle,
        data: &[u8],
        params: &[KeyParam],
    ) -> Result<UpdateOperationResponse, Error> {
        let auth_token = auth_token_param(params)?;
        let aad = get_opt_tag_value!(params, AssociatedData)?;
        let output = self.with_authed_operation(op_handle, auth_token.as_ref(), |op| {
            if let Some(aad) = aad {
                if !op.aad_allowed {
                    return Err(km_err!(InvalidTag, "associated data not allowed"));
                }
                match &mut op.crypto_op {
                    CryptoOperation::AesGcm(op) => op.update_aad(aad)?,
                    _ => {
                        return Err(km_err!(InvalidTag, "operation does not take associated data"))
                    }
                }
            }
            if data.is_empty() {
                return Ok(Vec::new());
            }
            if let Some(trusted_conf_data) = &mut op.trusted_conf_data {
                append_conf_data(trusted_conf_data, data)?;
            }
            op.aad_allowed = false;
            match &mut op.crypto_op {
                CryptoOperation::Aes(op) => op.update(data),
                CryptoOperation::AesGcm(op) => op.update(data),
                CryptoOperation::Des(op) => op.update(data),
                CryptoOperation::HmacSign(op, _)
                | CryptoOperation::HmacVerify(op, _)
                | CryptoOperation::RsaDecrypt(op)
                | CryptoOperation::RsaSign(op)
                | CryptoOperation::EcAgree(op)
                | CryptoOperation::EcSign(op) => {
                    op.update(data)?;
                    Ok(Vec::new())
                }
            }
        })?;
        Ok(UpdateOperationResponse {
            output,
            input_consumed: data.len() as u32,
            output_params: Vec::new(),
        })
    }

    pub(crate) fn op_finish(
        &mut self,
        op_handle: OpHandle,
        data: &[u8],
        signature: &[u8],
        params: &[KeyParam],
    ) -> Result<FinishOperationResponse, Error> {
        let mut op = self.take_operation(op_handle)?;
        let auth_token = auth_token_param(params)?;
        self.check_subsequent_auth(&op, auth_token.as_ref())?;

        if let Some(aad) = get_opt_tag_value!(params, AssociatedData)? {
            match &mut op.crypto_op {
                CryptoOperation::AesGcm(gcm) if op.aad_allowed => gcm.update_aad(aad)?,
                _ => return Err(km_err!(InvalidTag, "associated data not allowed")),
            }
        }
        if let Some(trusted_conf_data) = &mut op.trusted_conf_data {
            append_conf_data(trusted_conf_data, data)?;
        }

        let output = match op.crypto_op {
            CryptoOperation::Aes(mut op) => {
                let mut result = op.update(data)?;
                result.try_extend_from_slice(&op.finish()?)?;
                result
            }
            CryptoOperation::AesGcm(mut op) => {
                let mut result = op.update(data)?;
                result.try_extend_from_slice(&op.finish()?)?;
                result
            }
            CryptoOperation::Des(mut op) => {
                let mut result = op.update(data)?;
                result.try_extend_from_slice(&op.finish()?)?;
                result
            }
            CryptoOperation::HmacSign(mut op, tag_len) => {
                op.update(data)?;
                let mut tag = op.finish()?;
                tag.truncate(tag_len);
                tag
            }
            CryptoOperation::HmacVerify(mut op, tag_len_range) => {
                if !tag_len_range.contains(&signature.len()) {
                    return Err(km_err!(
                        InvalidArgument,
                        "signature length invalid: {} not in {:?}",
                        signature.len(),
                        tag_len_range
                    ));
                }
                op.update(data)?;
                let got = op.finish()?;
                if !self.imp.compare.eq(&got[..signature.len()], signature) {
                    return Err(km_err!(VerificationFailed, "HMAC verify failed"));
                }
                Vec::new()
            }
            CryptoOperation::RsaDecrypt(mut op)
            | CryptoOperation::RsaSign(mut op)
            | CryptoOperation::EcAgree(mut op)
            | CryptoOperation::EcSign(mut op) => {
                op.update(data)?;
                op.finish()?
            }
        };
        if let Some(trusted_conf_data) = op.trusted_conf_data {
            // Accumulated input must be checked against the trusted confirmation token.
            let token = get_opt_tag_value!(params, ConfirmationToken)?;
            self.verify_confirmation_token(&trusted_conf_data, token.map(|t| t.as_slice()))?;
        }
        if let (Some(slot), Some(mgr)) = (op.slot_to_delete, self.dev.sdd_mgr.as_mut()) {
            info!("deleting single-use key after use");
            if let Err(e) = mgr.delete_secret(slot) {
                error!("failed to delete single-use key in slot {:?}: {:?}", slot, e);
            }
        }
        Ok(FinishOperationResponse { output, output_params: Vec::new() })
    }

    pub(crate) fn op_abort(&mut self, op_handle: OpHandle) -> Result<(), Error> {
        let _op = self.take_operation(op_handle)?;
        info!("aborted operation {:?}", op_handle);
        Ok(())
    }

    /// Check TA-specific key authorizations on `begin()`.
    fn check_begin_auths(
        &mut self,
        key_chars: &[KeyParam],
        purpose: KeyPurpose,
        key_blob: &[u8],
        auth_token: Option<&HwAuthToken>,
    ) -> Result<(), Error> {
        if self.dev.bootloader.done() && get_bool_tag_value!(key_chars, BootloaderOnly)? {
            return Err(km_err!(
                InvalidKeyBlob,
                "attempt to use bootloader-only key after bootloader done"
            ));
        }
        if !self.in_early_boot && get_bool_tag_value!(key_chars, EarlyBootOnly)? {
            return Err(km_err!(EarlyBootEnded, "attempt to use EARLY_BOOT key after early boot"));
        }
        if get_bool_tag_value!(key_chars, UnlockedDeviceRequired)? {
            // A valid auth token presented with this request may unlock the device first.
            if let Some(token) = auth_token {
                if self.auth_token_mac_valid(token)? {
                    self.maybe_unlock(token);
                }
            }
            if *self.device_locked.borrow() != LockState::Unlocked {
                return Err(km_err!(DeviceLocked, "device locked for UNLOCKED_DEVICE_REQUIRED key"));
            }
        }
        self.check_validity_dates(key_chars, purpose)?;

        // Without rollback-resistant storage, USAGE_COUNT_LIMIT is only enforced per boot.
        let max_uses = get_opt_tag_value!(key_chars, MaxUsesPerBoot)?;
        let usage_limit = get_opt_tag_value!(key_chars, UsageCountLimit)?;
        let limit = match (max_uses, usage_limit) {
            (Some(a), Some(b)) => Some(core::cmp::min(*a, *b)),
            (Some(a), None) | (None, Some(a)) => Some(*a),
            (None, None) => None,
        };
        if let Some(limit) = limit {
            // Track the use count for this key.
            let key_id = self.key_id(key_blob)?;
            self.update_use_count(key_id, limit)?;
        }
        Ok(())
    }

    /// Check the key's validity window against the wall clock.
    fn check_validity_dates(
        &self,
        key_chars: &[KeyParam],
        purpose: KeyPurpose,
    ) -> Result<(), Error> {
        let active = get_opt_tag_value!(key_chars, ActiveDatetime)?;
        let origination_expire = get_opt_tag_value!(key_chars, OriginationExpireDatetime)?;
        let usage_expire = get_opt_tag_value!(key_chars, UsageExpireDatetime)?;
        if active.is_none() && origination_expire.is_none() && usage_expire.is_none() {
            return Ok(());
        }
        let now: DateTime = self.dev.wall_clock.now();
        if let Some(active) = active {
            if now < *active {
                return Err(km_err!(KeyNotYetValid, "key not active until {:?}", active));
            }
        }
        let expiry = match purpose {
            KeyPurpose::Encrypt | KeyPurpose::Sign => origination_expire,
            _ => usage_expire,
        };
        if let Some(expiry) = expiry {
            if now > *expiry {
                return Err(km_err!(KeyExpired, "key expired at {:?} for {:?}", expiry, purpose));
            }
        }
        Ok(())
    }

    /// Check whether the MAC on an auth token was produced with the shared auth token key.
    fn auth_token_mac_valid(&self, auth_token: &HwAuthToken) -> Result<bool, Error> {
        self.verify_device_key_hmac(DeviceKey::AuthToken, &auth_token.mac_input(), &auth_token.hmac)
    }

    /// Validate a [`HwAuthToken`] against the key's authentication requirements.
    fn check_auth_token(
        &self,
        auth_token: &HwAuthToken,
        auth_info: &AuthInfo,
        timeout: Option<(MillisecondsSinceEpoch, u32)>,
        challenge: Option<u64>,
    ) -> Result<(), Error> {
        // Common check: confirm the HMAC tag in the token is valid.
        if !self.auth_token_mac_valid(auth_token)? {
            return Err(km_err!(KeyUserNotAuthenticated, "failed to authenticate auth_token"));
        }
        // Common check: token's auth type should match key's USER_AUTH_TYPE.
        if auth_info.auth_type != 0 && (auth_token.authenticator_type & auth_info.auth_type) == 0 {
            return Err(km_err!(
                KeyUserNotAuthenticated,
                "token auth type {:?} doesn't overlap with key auth type {:?}",
                auth_token.authenticator_type,
                auth_info.auth_type,
            ));
        }

        // Common check: token's authenticator or user ID should match key's USER_SECURE_ID.
        if !auth_info
            .secure_ids
            .iter()
            .any(|sid| auth_token.user_id == *sid || auth_token.authenticator_id == *sid)
        {
            return Err(km_err!(
                KeyUserNotAuthenticated,
                "neither user id {:?} nor authenticator id {:?} matches key",
                auth_token.user_id,
                auth_token.authenticator_id
            ));
        }

        // Optional check: token is in time range.
        if let Some((now, timeout_secs)) = timeout {
            let expiry = auth_token.timestamp as i64 + 1000 * timeout_secs as i64;
            if now.0 > expiry {
                return Err(km_err!(
                    KeyUserNotAuthenticated,
                    "now {:?} is later than auth token time {} + {} seconds",
                    now,
                    auth_token.timestamp,
                    timeout_secs,
                ));
            }
        }

        // Optional check: challenge matches.
        if let Some(challenge) = challenge {
            if auth_token.challenge != challenge {
                return Err(km_err!(KeyUserNotAuthenticated, "challenge mismatch"));
            }
        }

        // The accompanying auth token may trigger an unlock, regardless of whether the operation
        // succeeds.
        self.maybe_unlock(auth_token);
        Ok(())
    }

    /// Update the device unlock state based on an authenticated auth token.
    fn maybe_unlock(&self, auth_token: &HwAuthToken) {
        let (lock_time, need_password) = match *self.device_locked.borrow() {
            LockState::Unlocked => return,
            LockState::LockedSince(t) => (t, false),
            LockState::PasswordLockedSince(t) => (t, true),
        };

        if auth_token.timestamp as i64 >= lock_time.0
            && (!need_password
                || (auth_token.authenticator_type & (HardwareAuthenticatorType::Password as u32)
                    != 0))
        {
            info!("auth token indicates device unlocked");
            *self.device_locked.borrow_mut() = LockState::Unlocked;
        }
    }

    /// Verify that an optional confirmation token matches the provided `data`.
    fn verify_confirmation_token(&self, data: &[u8], token: Option<&[u8]>) -> Result<(), Error> {
        let token = token
            .ok_or_else(|| km_err!(NoUserConfirmation, "no trusted confirmation token provided"))?;
        if token.len() != CONFIRMATION_TOKEN_SIZE {
            return Err(km_err!(
                InvalidArgument,
                "confirmation token wrong length {}",
                token.len()
            ));
        }
        if self.verify_device_key_hmac(DeviceKey::ConfirmationToken, data, token)? {
            Ok(())
        } else {
            Err(km_err!(NoUserConfirmation, "trusted confirmation token did not match"))
        }
    }

    /// Return the index of a free slot in the operations table.
    fn new_operation_index(&mut self) -> Result<usize, Error> {
        self.operations.iter().position(Option::is_none).ok_or_else(|| {
            km_err!(TooManyOperations, "current op count {} >= limit", self.operations.len())
        })
    }

    /// Return a new non-zero operation handle value that is not currently in use in the
    /// operations table.
    fn new_op_handle(&mut self) -> OpHandle {
        loop {
            let op_handle = OpHandle(self.imp.rng.next_u64());
            if op_handle.0 != 0 && self.op_index(op_handle).is_err() {
                return op_handle;
            }
        }
    }

    /// Return the index into the operations table of an operation identified by `op_handle`.
    fn op_index(&self, op_handle: OpHandle) -> Result<usize, Error> {
        self.operations
            .iter()
            .position(|op| matches!(op, Some(op) if op.handle == op_handle))
            .ok_or_else(|| {
                km_err!(InvalidOperationHandle, "operation handle {:?} not found", op_handle)
            })
    }

    /// Execute the provided lambda over the associated [`Operation`], destroying the operation
    /// if either authentication or the lambda fails.
    fn with_authed_operation<F, T>(
        &mut self,
        op_handle: OpHandle,
        auth_token: Option<&HwAuthToken>,
        f: F,
    ) -> Result<T, Error>
    where
        F: FnOnce(&mut Operation) -> Result<T, Error>,
    {
        let op_idx = self.op_index(op_handle)?;
        let mut op = self.operations[op_idx]
            .take()
            .ok_or_else(|| km_err!(InvalidOperationHandle, "operation {:?} gone", op_handle))?;
        self.check_subsequent_auth(&op, auth_token)?;
        let result = f(&mut op);
        match &result {
            Ok(_) => self.operations[op_idx] = Some(op),
            Err(e) => warn!("operation {:?} failed and is destroyed: {:?}", op_handle, e),
        }
        result
    }

    /// Return the associated [`Operation`], removing it.
    fn take_operation(&mut self, op_handle: OpHandle) -> Result<Operation, Error> {
        let op_idx = self.op_index(op_handle)?;
        self.operations[op_idx]
            .take()
            .ok_or_else(|| km_err!(InvalidOperationHandle, "operation {:?} gone", op_handle))
    }

    /// Check authentication for an operation that has already begun.
    fn check_subsequent_auth(
        &self,
        op: &Operation,
        auth_token: Option<&HwAuthToken>,
    ) -> Result<(), Error> {
        match &op.auth_info {
            // Keys without AUTH_TIMEOUT need a token bound to this operation on every call.
            Some(auth_info) => {
                let auth_token = auth_token.ok_or_else(|| {
                    km_err!(KeyUserNotAuthenticated, "no auth token for operation")
                })?;
                self.check_auth_token(auth_token, auth_info, None, Some(op.handle.0))
            }
            None => Ok(()),
        }
    }
}

/// Accumulate data that will be checked against a confirmation token, up to a size limit.
fn append_conf_data(buf: &mut Vec<u8>, data: &[u8]) -> Result<(), Error> {
    if buf.len() + data.len() > CONFIRMATION_TOKEN_PREFIX.len() + CONFIRMATION_MESSAGE_MAX_LEN {
        return Err(km_err!(
            InvalidArgument,
            "trusted confirmation data of size {} + {} too big",
            buf.len(),
            data.len()
        ));
    }
    buf.try_extend_from_slice(data)?;
    Ok(())
}
