//! Errors raised while enrolling, verifying or persisting gatekeeper state.

use senv_common::wire::gatekeeper::GatekeeperError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Tpm(#[from] senv_tpm::Error),
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("state index is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("device key HMAC failed: {0:?}")]
    DeviceKey(senv_common::Error),
    #[error("malformed message or record: {0:?}")]
    Wire(senv_common::wire::Error),
    #[error("no storage allocated for {0:?}")]
    UnknownKey(String),
    #[error("{size} bytes do not fit in the {capacity} allocated for {key:?}")]
    TooLarge { key: String, size: usize, capacity: usize },
    #[error("no free NV index after {0} attempts")]
    NvExhausted(u32),
    #[error("unexpected HMAC length {0}")]
    MacLength(usize),
}

impl From<senv_common::Error> for Error {
    fn from(e: senv_common::Error) -> Self {
        Error::DeviceKey(e)
    }
}

impl From<senv_common::wire::Error> for Error {
    fn from(e: senv_common::wire::Error) -> Self {
        Error::Wire(e)
    }
}

impl From<senv_tpm::TpmError> for Error {
    fn from(e: senv_tpm::TpmError) -> Self {
        Error::Tpm(e.into())
    }
}

impl From<Error> for GatekeeperError {
    fn from(e: Error) -> Self {
        match e {
            Error::Tpm(senv_tpm::Error::NoSlot) => GatekeeperError::MemoryAllocationFailed,
            _ => GatekeeperError::Unknown,
        }
    }
}
