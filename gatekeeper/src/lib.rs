//! Gatekeeper engine: password enrollment and verification with throttling, minting hardware
//! auth tokens the KeyMint engine accepts.

use log::{error, info, warn};
use senv_common::{
    crypto::{DeviceHmac, DeviceKey, MonotonicClock, Rng},
    wire::{
        gatekeeper::{
            EnrollRequest, EnrollResponse, GatekeeperError, GatekeeperRequest, GatekeeperResponse,
            HwAuthToken, PasswordHandle, VerifyRequest, VerifyResponse, AUTH_TOKEN_VERSION,
            HANDLE_VERSION, HMAC_SIZE,
        },
        keymint::HardwareAuthenticatorType,
    },
};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

mod error;
pub mod failure_record;
pub mod storage;

pub use error::Error;
pub use failure_record::FailureRecord;
pub use storage::{FragileTpmStorage, InsecureJsonStorage, MemoryStorage, Storage};


/// Password handles from this version on are throttled.
const HANDLE_VERSION_THROTTLE: u8 = 2;

/// Result of a gatekeeper step that may end the request early with a protocol response.
type Outcome<T> = Result<T, GatekeeperResponse>;

pub struct Gatekeeper {
    keys: Box<dyn DeviceHmac>,
    clock: Box<dyn MonotonicClock>,
    rng: Box<dyn Rng>,
    /// Whether handles enrolled here are marked hardware backed.
    hardware_backed: bool,
    secure: Box<dyn Storage>,
    insecure: Box<dyn Storage>,
}

impl Gatekeeper {
    pub fn new(
        keys: Box<dyn DeviceHmac>,
        clock: Box<dyn MonotonicClock>,
        rng: Box<dyn Rng>,
        hardware_backed: bool,
        secure: Box<dyn Storage>,
        insecure: Box<dyn Storage>,
    ) -> Self {
        Self { keys, clock, rng, hardware_backed, secure, insecure }
    }

    /// Gatekeeper with in-memory failure records whose handles are not hardware backed. `keys`
    /// are expected to be process-random, so handles and tokens do not survive a restart.
    pub fn software(
        keys: Box<dyn DeviceHmac>,
        clock: Box<dyn MonotonicClock>,
        rng: Box<dyn Rng>,
    ) -> Self {
        Self::new(
            keys,
            clock,
            rng,
            false,
            Box::new(MemoryStorage::new()),
            Box::new(MemoryStorage::new()),
        )
    }

    /// Process a single serialized request, returning the serialized response.
    pub fn process(&mut self, cmd: u32, req_data: &[u8]) -> Vec<u8> {
        let rsp = match GatekeeperRequest::from_code_and_data(cmd, req_data) {
            Ok(req) => self.process_req(req),
            Err(e) => {
                warn!("failed to decode gatekeeper request {}: {:?}", cmd, e);
                GatekeeperResponse::error(GatekeeperError::Unknown)
            }
        };
        match rsp.serialize() {
            Ok(data) => data,
            Err(e) => {
                error!("failed to encode gatekeeper response: {:?}", e);
                let mut data = (GatekeeperError::Unknown as u32).to_ne_bytes().to_vec();
                data.extend_from_slice(&0u32.to_ne_bytes());
                data
            }
        }
    }

    pub fn process_req(&mut self, req: GatekeeperRequest) -> GatekeeperResponse {
        let result = match req {
            GatekeeperRequest::Enroll { user_id, req } => self.enroll(user_id, &req),
            GatekeeperRequest::Verify { user_id, req } => self.verify(user_id, &req),
        };
        result.unwrap_or_else(|rsp| rsp)
    }

    pub fn enroll(&mut self, uid: u32, req: &EnrollRequest) -> Outcome<GatekeeperResponse> {
        let secure_user_id = if req.password_handle.is_empty() {
            self.rng.next_u64()
        } else {
            let old = parse_handle(&req.password_handle)?;
            let now = self.now();
            let mut record = self.failure_record(uid, old.user_id, old.hardware_backed)?;
            if !self.password_matches(uid, &old, &req.enrolled_password)? {
                info!("enroll for uid {} rejected: current password did not verify", uid);
                return Err(self.record_failure(uid, now, &mut record, old.hardware_backed)?);
            }
            self.clear_failure_record(uid, old.user_id, old.hardware_backed)?;
            old.user_id
        };

        let mut handle = PasswordHandle {
            version: HANDLE_VERSION,
            user_id: secure_user_id,
            flags: 0,
            salt: self.rng.next_u64(),
            signature: [0; HMAC_SIZE],
            hardware_backed: self.hardware_backed,
        };
        handle.signature = self.password_signature(uid, &handle, &req.provided_password)?;
        info!("enrolled password for uid {}", uid);
        Ok(GatekeeperResponse::Enroll {
            user_id: uid,
            rsp: EnrollResponse { enrolled_password_handle: handle.to_bytes() },
        })
    }

    pub fn verify(&mut self, uid: u32, req: &VerifyRequest) -> Outcome<GatekeeperResponse> {
        let handle = parse_handle(&req.password_handle)?;
        let now = self.now();
        let mut record = if handle.version >= HANDLE_VERSION_THROTTLE {
            Some(self.failure_record(uid, handle.user_id, handle.hardware_backed)?)
        } else {
            None
        };

        if !self.password_matches(uid, &handle, &req.provided_password)? {
            info!("password for uid {} did not verify", uid);
            return Err(match record.as_mut() {
                Some(record) => self.record_failure(uid, now, record, handle.hardware_backed)?,
                None => GatekeeperResponse::error(GatekeeperError::Invalid),
            });
        }

        let token = self.mint_auth_token(req.challenge, handle.user_id, now)?;
        if record.is_some() {
            self.clear_failure_record(uid, handle.user_id, handle.hardware_backed)?;
        }
        Ok(GatekeeperResponse::Verify {
            user_id: uid,
            rsp: VerifyResponse {
                auth_token: token.to_bytes(),
                request_reenroll: handle.version < HANDLE_VERSION,
            },
        })
    }

    fn now(&self) -> u64 {
        self.clock.now().0.max(0) as u64
    }

    fn store(&mut self, secure: bool) -> &mut dyn Storage {
        if secure {
            &mut *self.secure
        } else {
            &mut *self.insecure
        }
    }

    /// Stored record for `uid`, or a clean one if none exists or it belongs to another secure
    /// user id.
    fn failure_record(
        &mut self,
        uid: u32,
        secure_user_id: u64,
        secure: bool,
    ) -> Outcome<FailureRecord> {
        let key = uid.to_string();
        let store = self.store(secure);
        store.allocate(&key, FailureRecord::SIZE).map_err(internal)?;
        match store.read(&key).map_err(internal)? {
            Some(data) => {
                let record = FailureRecord::from_bytes(&data).map_err(internal)?;
                if record.secure_user_id == secure_user_id {
                    return Ok(record);
                }
                Ok(FailureRecord::new(secure_user_id))
            }
            None => Ok(FailureRecord::new(secure_user_id)),
        }
    }

    fn write_failure_record(
        &mut self,
        uid: u32,
        record: &FailureRecord,
        secure: bool,
    ) -> Outcome<()> {
        let key = uid.to_string();
        let store = self.store(secure);
        store.allocate(&key, FailureRecord::SIZE).map_err(internal)?;
        store.write(&key, &record.to_bytes()).map_err(internal)
    }

    fn clear_failure_record(&mut self, uid: u32, secure_user_id: u64, secure: bool) -> Outcome<()> {
        self.write_failure_record(uid, &FailureRecord::new(secure_user_id), secure)
    }

    /// Account for a wrong password. While an earlier timeout is still pending the attempt is
    /// refused with the remaining wait and not counted; otherwise it is counted and the response
    /// carries the timeout the new count earns, zero for the first few failures.
    fn record_failure(
        &mut self,
        uid: u32,
        now: u64,
        record: &mut FailureRecord,
        secure: bool,
    ) -> Outcome<GatekeeperResponse> {
        let timeout = record.retry_timeout();
        let last = record.last_checked_timestamp;
        if timeout != 0 {
            if now < last {
                // The boot clock restarted; the whole timeout applies again from now.
                record.last_checked_timestamp = now;
                self.write_failure_record(uid, record, secure)?;
                return Ok(GatekeeperResponse::retry(timeout));
            }
            let elapsed = now - last;
            if elapsed < timeout as u64 {
                let remaining = timeout - elapsed as u32;
                info!("uid {} throttled for another {} ms", uid, remaining);
                return Ok(GatekeeperResponse::retry(remaining));
            }
        }
        record.failure_counter = record.failure_counter.saturating_add(1);
        record.last_checked_timestamp = now;
        self.write_failure_record(uid, record, secure)?;
        Ok(GatekeeperResponse::wrong_password(record.retry_timeout()))
    }

    fn password_signature(
        &self,
        uid: u32,
        handle: &PasswordHandle,
        password: &[u8],
    ) -> Outcome<[u8; HMAC_SIZE]> {
        let mut input = Zeroizing::new(Vec::with_capacity(4 + 25 + password.len()));
        input.extend_from_slice(&uid.to_ne_bytes());
        input.extend_from_slice(&handle.signed_fields());
        input.extend_from_slice(password);
        let mac = self.keys.hmac(DeviceKey::Password, &input).map_err(Error::from);
        to_mac(mac.map_err(internal)?)
    }

    fn password_matches(
        &self,
        uid: u32,
        handle: &PasswordHandle,
        password: &[u8],
    ) -> Outcome<bool> {
        if password.is_empty() {
            return Ok(false);
        }
        let expected = self.password_signature(uid, handle, password)?;
        Ok(bool::from(expected.as_slice().ct_eq(handle.signature.as_slice())))
    }

    fn mint_auth_token(
        &self,
        challenge: u64,
        secure_user_id: u64,
        timestamp: u64,
    ) -> Outcome<HwAuthToken> {
        let mut token = HwAuthToken {
            version: AUTH_TOKEN_VERSION,
            challenge,
            user_id: secure_user_id,
            authenticator_id: 0,
            authenticator_type: HardwareAuthenticatorType::Password as i32 as u32,
            timestamp,
            hmac: [0; HMAC_SIZE],
        };
        let mac = self.keys.hmac(DeviceKey::AuthToken, &token.mac_input()).map_err(Error::from);
        token.hmac = to_mac(mac.map_err(internal)?)?;
        Ok(token)
    }
}

fn parse_handle(data: &[u8]) -> Outcome<PasswordHandle> {
    let handle = PasswordHandle::from_bytes(data).map_err(|e| {
        warn!("malformed password handle: {:?}", e);
        GatekeeperResponse::error(GatekeeperError::Invalid)
    })?;
    if handle.version > HANDLE_VERSION {
        warn!("password handle version {} not supported", handle.version);
        return Err(GatekeeperResponse::error(GatekeeperError::Invalid));
    }
    Ok(handle)
}

fn to_mac(mac: Vec<u8>) -> Outcome<[u8; HMAC_SIZE]> {
    let len = mac.len();
    mac.try_into().map_err(|_e| internal(Error::MacLength(len)))
}

fn internal(e: Error) -> GatekeeperResponse {
    error!("gatekeeper failure: {}", e);
    GatekeeperResponse::error(e.into())
}
