//! TA functionality for secure clocks and authorization verification.

use alloc::vec::Vec;
use core::mem::size_of;
use senv_common::{km_err, vec_try_with_capacity, Error, FallibleAllocExt};
use senv_wire::{
    authset,
    keymint::KeyParam,
    legacy::{TimestampToken, VerificationToken},
};
use log::info;

/// Label prefixed to the MAC input of timestamp and verification tokens.
pub const TIME_STAMP_MAC_LABEL: &[u8] = b"Auth Verification";

impl crate::KeyMintTa {
    pub(crate) fn generate_timestamp(&self, challenge: u64) -> Result<TimestampToken, Error> {
        let mut ret = TimestampToken {
            challenge,
            timestamp: self.imp.clock.now().0 as u64,
            security_level: self.hw_info.security_level as i32 as u32,
            mac: Vec::new(),
        };
        let mac_input = timestamp_token_mac_input(&ret)?;
        ret.mac = self.device_hmac(&mac_input)?;
        Ok(ret)
    }

    pub(crate) fn verify_authorization(
        &self,
        challenge: u64,
        parameters_verified: Vec<KeyParam>,
    ) -> Result<VerificationToken, Error> {
        let mut ret = VerificationToken {
            challenge,
            timestamp: self.imp.clock.now().0 as u64,
            parameters_verified,
            security_level: self.hw_info.security_level as i32 as u32,
            mac: Vec::new(),
        };
        let mac_input = verification_token_mac_input(&ret)?;
        ret.mac = self.device_hmac(&mac_input)?;
        Ok(ret)
    }

    /// Record that the device has been locked, after checking any accompanying timestamp token.
    pub(crate) fn device_locked(
        &mut self,
        password_only: bool,
        token: &TimestampToken,
    ) -> Result<(), Error> {
        if token.challenge != 0 {
            let mac_input = timestamp_token_mac_input(token)?;
            if !self.verify_device_hmac(&mac_input, &token.mac)? {
                return Err(km_err!(VerificationFailed, "timestamp token MAC not verified"));
            }
        }
        let now = self.imp.clock.now();
        info!("device locked at {:?}, password only: {}", now, password_only);
        *self.device_locked.borrow_mut() = if password_only {
            crate::LockState::PasswordLockedSince(now)
        } else {
            crate::LockState::LockedSince(now)
        };
        Ok(())
    }
}

/// Build the HMAC input for a [`TimestampToken`]
pub fn timestamp_token_mac_input(token: &TimestampToken) -> Result<Vec<u8>, Error> {
    let mut result = vec_try_with_capacity!(
        TIME_STAMP_MAC_LABEL.len() +
        size_of::<u64>() + // challenge (BE)
        size_of::<u64>() + // timestamp (BE)
        size_of::<u32>() // security_level (BE)
    )?;
    result.extend_from_slice(TIME_STAMP_MAC_LABEL);
    result.extend_from_slice(&token.challenge.to_be_bytes()[..]);
    result.extend_from_slice(&token.timestamp.to_be_bytes()[..]);
    result.extend_from_slice(&token.security_level.to_be_bytes()[..]);
    Ok(result)
}

/// Build the HMAC input for a [`VerificationToken`], which extends the timestamp input with the
/// serialized verified parameters (if any).
pub fn verification_token_mac_input(token: &VerificationToken) -> Result<Vec<u8>, Error> {
    let mut result = vec_try_with_capacity!(
        TIME_STAMP_MAC_LABEL.len() + 2 * size_of::<u64>() + size_of::<u32>()
    )?;
    result.extend_from_slice(TIME_STAMP_MAC_LABEL);
    result.extend_from_slice(&token.challenge.to_be_bytes()[..]);
    result.extend_from_slice(&token.timestamp.to_be_bytes()[..]);
    result.extend_from_slice(&token.security_level.to_be_bytes()[..]);
    if !token.parameters_verified.is_empty() {
        result.try_extend_from_slice(&authset::serialize(&token.parameters_verified)?)?;
    }
    Ok(result)
}
