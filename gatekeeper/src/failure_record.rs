use crate::Error;
use senv_common::wire;

/// Failed-attempt bookkeeping for one Android user, stored as 20 host-endian bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FailureRecord {
    pub secure_user_id: u64,
    pub last_checked_timestamp: u64,
    pub failure_counter: u32,
}

impl FailureRecord {
    pub const SIZE: usize = 8 + 8 + 4;

    /// A clean record for `secure_user_id`.
    pub fn new(secure_user_id: u64) -> Self {
        Self { secure_user_id, ..Default::default() }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..8].copy_from_slice(&self.secure_user_id.to_ne_bytes());
        out[8..16].copy_from_slice(&self.last_checked_timestamp.to_ne_bytes());
        out[16..].copy_from_slice(&self.failure_counter.to_ne_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        let data: &[u8; Self::SIZE] = data.try_into().map_err(|_e| {
            if data.len() < Self::SIZE {
                wire::Error::DataTruncated
            } else {
                wire::Error::ExcessData(data.len() - Self::SIZE)
            }
        })?;
        let mut sid = [0u8; 8];
        let mut last = [0u8; 8];
        let mut counter = [0u8; 4];
        sid.copy_from_slice(&data[..8]);
        last.copy_from_slice(&data[8..16]);
        counter.copy_from_slice(&data[16..]);
        Ok(Self {
            secure_user_id: u64::from_ne_bytes(sid),
            last_checked_timestamp: u64::from_ne_bytes(last),
            failure_counter: u32::from_ne_bytes(counter),
        })
    }

    /// Milliseconds the user must wait after this many consecutive failures.
    pub fn retry_timeout(&self) -> u32 {
        retry_timeout(self.failure_counter)
    }
}

const MIN_TIMEOUT_MS: u32 = 30_000;
const ONE_DAY_MS: u32 = 24 * 60 * 60 * 1000;

/// Back-off schedule: every fifth failure among the first ten waits 30s, then every failure
/// waits 30s, doubling every ten failures from the 30th and capped at a day from the 140th.
pub fn retry_timeout(counter: u32) -> u32 {
    match counter {
        0 => 0,
        1..=10 if counter % 5 == 0 => MIN_TIMEOUT_MS,
        1..=10 => 0,
        11..=29 => MIN_TIMEOUT_MS,
        30..=139 => MIN_TIMEOUT_MS << ((counter - 30) / 10),
        _ => ONE_DAY_MS,
    }
}
