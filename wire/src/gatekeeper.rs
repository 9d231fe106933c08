//! Gatekeeper messages and fixed-layout structures.
//!
//! Messages follow `system/gatekeeper/include/gatekeeper/gatekeeper_messages.h`: every message
//! starts with a `u32` error code and a `u32` user id, both host-endian. Failed responses hold a
//! `u32` retry timeout after the error code in place of the user id.

use crate::{legacy::InnerSerialize, take, Error};
use alloc::vec::Vec;
use enumn::N;
use senv_derive::LegacySerialize;

/// Length of an HMAC-SHA256 tag.
pub const HMAC_SIZE: usize = 32;

/// Current password handle layout version.
pub const HANDLE_VERSION: u8 = 2;

/// Current authentication token layout version.
pub const AUTH_TOKEN_VERSION: u8 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, N)]
#[repr(u32)]
pub enum GatekeeperError {
    None = 0,
    Invalid = 1,
    Retry = 2,
    Unknown = 3,
    MemoryAllocationFailed = 4,
    NotImplemented = 5,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, N)]
#[repr(u32)]
pub enum GatekeeperCommand {
    Enroll = 0,
    Verify = 1,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, LegacySerialize)]
pub struct EnrollRequest {
    pub provided_password: Vec<u8>,
    pub enrolled_password: Vec<u8>,
    pub password_handle: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, LegacySerialize)]
pub struct EnrollResponse {
    pub enrolled_password_handle: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, LegacySerialize)]
pub struct VerifyRequest {
    pub challenge: u64,
    pub password_handle: Vec<u8>,
    pub provided_password: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyResponse {
    pub auth_token: Vec<u8>,
    pub request_reenroll: bool,
}

impl InnerSerialize for VerifyResponse {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (auth_token, rest) = <Vec<u8>>::deserialize(data)?;
        // Reenroll flag is a single byte.
        let (flag, rest) = <u8>::deserialize(rest)?;
        Ok((VerifyResponse { auth_token, request_reenroll: flag != 0 }, rest))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        self.auth_token.serialize_into(buf)?;
        (self.request_reenroll as u8).serialize_into(buf)
    }
}

/// A decoded request, with the user id from its header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatekeeperRequest {
    Enroll { user_id: u32, req: EnrollRequest },
    Verify { user_id: u32, req: VerifyRequest },
}

impl GatekeeperRequest {
    pub fn from_code_and_data(cmd: u32, data: &[u8]) -> Result<Self, Error> {
        let cmd = GatekeeperCommand::n(cmd).ok_or(Error::UnknownCommand(cmd))?;
        let (_error, rest) = <u32>::deserialize(data)?;
        let (user_id, rest) = <u32>::deserialize(rest)?;
        let (req, rest) = match cmd {
            GatekeeperCommand::Enroll => {
                let (req, rest) = EnrollRequest::deserialize(rest)?;
                (GatekeeperRequest::Enroll { user_id, req }, rest)
            }
            GatekeeperCommand::Verify => {
                let (req, rest) = VerifyRequest::deserialize(rest)?;
                (GatekeeperRequest::Verify { user_id, req }, rest)
            }
        };
        if !rest.is_empty() {
            return Err(Error::ExcessData(rest.len()));
        }
        Ok(req)
    }

    pub fn code(&self) -> GatekeeperCommand {
        match self {
            GatekeeperRequest::Enroll { .. } => GatekeeperCommand::Enroll,
            GatekeeperRequest::Verify { .. } => GatekeeperCommand::Verify,
        }
    }

    pub fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        (GatekeeperError::None as u32).serialize_into(buf)?;
        match self {
            GatekeeperRequest::Enroll { user_id, req } => {
                user_id.serialize_into(buf)?;
                req.serialize_into(buf)
            }
            GatekeeperRequest::Verify { user_id, req } => {
                user_id.serialize_into(buf)?;
                req.serialize_into(buf)
            }
        }
    }
}

/// Outcome of a gatekeeper command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatekeeperResponse {
    Enroll { user_id: u32, rsp: EnrollResponse },
    Verify { user_id: u32, rsp: VerifyResponse },
    /// Failed request. `retry_timeout` is how many milliseconds the caller must wait before the
    /// next attempt, zero unless repeated wrong passwords earned a timeout.
    Error { code: GatekeeperError, retry_timeout: u32 },
}

impl GatekeeperResponse {
    pub fn error(code: GatekeeperError) -> Self {
        Self::Error { code, retry_timeout: 0 }
    }

    /// Wrong password, with the timeout earned by the failure count so far.
    pub fn wrong_password(retry_timeout: u32) -> Self {
        Self::Error { code: GatekeeperError::Invalid, retry_timeout }
    }

    /// Attempt refused while an earlier timeout is still pending.
    pub fn retry(retry_timeout: u32) -> Self {
        Self::Error { code: GatekeeperError::Retry, retry_timeout }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        match self {
            GatekeeperResponse::Enroll { user_id, rsp } => {
                (GatekeeperError::None as u32).serialize_into(&mut buf)?;
                user_id.serialize_into(&mut buf)?;
                rsp.serialize_into(&mut buf)?;
            }
            GatekeeperResponse::Verify { user_id, rsp } => {
                (GatekeeperError::None as u32).serialize_into(&mut buf)?;
                user_id.serialize_into(&mut buf)?;
                rsp.serialize_into(&mut buf)?;
            }
            GatekeeperResponse::Error { code, retry_timeout } => {
                (*code as u32).serialize_into(&mut buf)?;
                retry_timeout.serialize_into(&mut buf)?;
            }
        }
        Ok(buf)
    }

    pub fn deserialize(cmd: GatekeeperCommand, data: &[u8]) -> Result<Self, Error> {
        let (raw_error, rest) = <u32>::deserialize(data)?;
        let error = GatekeeperError::n(raw_error).ok_or(Error::InvalidEnumValue(raw_error))?;
        let (rsp, rest) = match error {
            GatekeeperError::None => {
                let (user_id, rest) = <u32>::deserialize(rest)?;
                match cmd {
                    GatekeeperCommand::Enroll => {
                        let (rsp, rest) = EnrollResponse::deserialize(rest)?;
                        (GatekeeperResponse::Enroll { user_id, rsp }, rest)
                    }
                    GatekeeperCommand::Verify => {
                        let (rsp, rest) = VerifyResponse::deserialize(rest)?;
                        (GatekeeperResponse::Verify { user_id, rsp }, rest)
                    }
                }
            }
            code => {
                let (retry_timeout, rest) = <u32>::deserialize(rest)?;
                (GatekeeperResponse::Error { code, retry_timeout }, rest)
            }
        };
        if !rest.is_empty() {
            return Err(Error::ExcessData(rest.len()));
        }
        Ok(rsp)
    }
}

/// Stored password handle, 58 bytes when packed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordHandle {
    pub version: u8,
    pub user_id: u64,
    pub flags: u64,
    pub salt: u64,
    pub signature: [u8; HMAC_SIZE],
    pub hardware_backed: bool,
}

impl PasswordHandle {
    pub const SIZE: usize = 1 + 8 + 8 + 8 + HMAC_SIZE + 1;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.push(self.version);
        out.extend_from_slice(&self.user_id.to_ne_bytes());
        out.extend_from_slice(&self.flags.to_ne_bytes());
        out.extend_from_slice(&self.salt.to_ne_bytes());
        out.extend_from_slice(&self.signature);
        out.push(self.hardware_backed as u8);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() != Self::SIZE {
            return Err(if data.len() < Self::SIZE {
                Error::DataTruncated
            } else {
                Error::ExcessData(data.len() - Self::SIZE)
            });
        }
        let (version, rest) = <u8>::deserialize(data)?;
        let (user_id, rest) = ne_u64(rest)?;
        let (flags, rest) = ne_u64(rest)?;
        let (salt, rest) = ne_u64(rest)?;
        let (signature, rest) = <[u8; HMAC_SIZE]>::deserialize(rest)?;
        let (hardware_backed, _) = <u8>::deserialize(rest)?;
        Ok(PasswordHandle {
            version,
            user_id,
            flags,
            salt,
            signature,
            hardware_backed: hardware_backed != 0,
        })
    }

    /// Bytes covered by the handle signature, less the leading uid and trailing password.
    pub fn signed_fields(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 8 + 8 + 8);
        out.push(self.version);
        out.extend_from_slice(&self.user_id.to_ne_bytes());
        out.extend_from_slice(&self.flags.to_ne_bytes());
        out.extend_from_slice(&self.salt.to_ne_bytes());
        out
    }
}

/// Packed `hw_auth_token_t`, 69 bytes.
///
/// `authenticator_type` and `timestamp` are big-endian; the other integers are host-endian.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HwAuthToken {
    pub version: u8,
    pub challenge: u64,
    pub user_id: u64,
    pub authenticator_id: u64,
    pub authenticator_type: u32,
    pub timestamp: u64,
    pub hmac: [u8; HMAC_SIZE],
}

impl HwAuthToken {
    pub const SIZE: usize = Self::MAC_INPUT_SIZE + HMAC_SIZE;
    /// Number of leading bytes covered by the MAC.
    pub const MAC_INPUT_SIZE: usize = 1 + 8 + 8 + 8 + 4 + 8;

    pub fn mac_input(&self) -> [u8; Self::MAC_INPUT_SIZE] {
        let mut out = [0u8; Self::MAC_INPUT_SIZE];
        out[0] = self.version;
        out[1..9].copy_from_slice(&self.challenge.to_ne_bytes());
        out[9..17].copy_from_slice(&self.user_id.to_ne_bytes());
        out[17..25].copy_from_slice(&self.authenticator_id.to_ne_bytes());
        out[25..29].copy_from_slice(&self.authenticator_type.to_be_bytes());
        out[29..37].copy_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.mac_input());
        out.extend_from_slice(&self.hmac);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::DataTruncated);
        }
        if data.len() > Self::SIZE {
            return Err(Error::ExcessData(data.len() - Self::SIZE));
        }
        let (version, rest) = <u8>::deserialize(data)?;
        let (challenge, rest) = ne_u64(rest)?;
        let (user_id, rest) = ne_u64(rest)?;
        let (authenticator_id, rest) = ne_u64(rest)?;
        let (auth_type, rest) = take(rest, 4)?;
        let (timestamp, rest) = take(rest, 8)?;
        let (hmac, _) = <[u8; HMAC_SIZE]>::deserialize(rest)?;
        Ok(HwAuthToken {
            version,
            challenge,
            user_id,
            authenticator_id,
            authenticator_type: u32::from_be_bytes(
                auth_type.try_into().map_err(|_e| Error::DataTruncated)?,
            ),
            timestamp: u64::from_be_bytes(timestamp.try_into().map_err(|_e| Error::DataTruncated)?),
            hmac,
        })
    }
}

fn ne_u64(data: &[u8]) -> Result<(u64, &[u8]), Error> {
    <u64>::deserialize(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_auth_token_layout() {
        let token = HwAuthToken {
            version: 0,
            challenge: 0x0102030405060708,
            user_id: 9,
            authenticator_id: 0,
            authenticator_type: 1,
            timestamp: 0x1122334455667788,
            hmac: [0xaa; HMAC_SIZE],
        };
        let data = token.to_bytes();
        assert_eq!(data.len(), 69);
        assert_eq!(&data[25..29], &[0, 0, 0, 1]);
        assert_eq!(&data[29..37], &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
        assert_eq!(&data[37..], &[0xaa; HMAC_SIZE]);
        assert_eq!(HwAuthToken::from_bytes(&data).unwrap(), token);
        assert_eq!(HwAuthToken::from_bytes(&data[..68]), Err(Error::DataTruncated));
    }

    #[test]
    fn test_password_handle_layout() {
        let handle = PasswordHandle {
            version: HANDLE_VERSION,
            user_id: 0x42,
            flags: 0,
            salt: 7,
            signature: [3; HMAC_SIZE],
            hardware_backed: true,
        };
        let data = handle.to_bytes();
        assert_eq!(data.len(), 58);
        assert_eq!(data[0], 2);
        assert_eq!(data[57], 1);
        assert_eq!(PasswordHandle::from_bytes(&data).unwrap(), handle);
        assert!(PasswordHandle::from_bytes(&data[1..]).is_err());
    }

    #[test]
    fn test_retry_response() {
        let rsp = GatekeeperResponse::retry(30000);
        let data = rsp.serialize().unwrap();
        assert_eq!(data.len(), 8);
        assert_eq!(&data[..4], &2u32.to_ne_bytes());
        assert_eq!(GatekeeperResponse::deserialize(GatekeeperCommand::Verify, &data).unwrap(), rsp);
    }

    #[test]
    fn test_wrong_password_response_carries_timeout() {
        let rsp = GatekeeperResponse::wrong_password(30000);
        let data = rsp.serialize().unwrap();
        assert_eq!(&data[..4], &1u32.to_ne_bytes());
        assert_eq!(&data[4..], &30000u32.to_ne_bytes());
        let got = GatekeeperResponse::deserialize(GatekeeperCommand::Verify, &data).unwrap();
        assert_eq!(
            got,
            GatekeeperResponse::Error { code: GatekeeperError::Invalid, retry_timeout: 30000 }
        );
    }

    #[test]
    fn test_verify_request() {
        let req = GatekeeperRequest::Verify {
            user_id: 10,
            req: VerifyRequest {
                challenge: 5,
                password_handle: vec![1, 2],
                provided_password: b"pw".to_vec(),
            },
        };
        let mut data = Vec::new();
        req.serialize_into(&mut data).unwrap();
        assert_eq!(data.len(), 4 + 4 + 8 + 4 + 2 + 4 + 2);
        let got =
            GatekeeperRequest::from_code_and_data(GatekeeperCommand::Verify as u32, &data).unwrap();
        assert_eq!(got, req);
        assert_eq!(
            GatekeeperRequest::from_code_and_data(2, &data),
            Err(Error::UnknownCommand(2))
        );
    }

    #[test]
    fn test_verify_response_reenroll_is_one_byte() {
        let rsp = GatekeeperResponse::Verify {
            user_id: 3,
            rsp: VerifyResponse { auth_token: vec![0; 69], request_reenroll: false },
        };
        let data = rsp.serialize().unwrap();
        assert_eq!(data.len(), 4 + 4 + 4 + 69 + 1);
        assert_eq!(GatekeeperResponse::deserialize(GatekeeperCommand::Verify, &data).unwrap(), rsp);
    }
}
