//! Error types for TPM access and the serializers built on it.

use thiserror::Error;
use tss_esapi::{constants::response_code::Tss2ResponseCodeKind, Error as EsysError};

/// Failure reported by, or while talking to, a TPM.
#[derive(Debug, Error)]
pub enum TpmError {
    #[error("TPM_RC_NV_DEFINED: NV index already defined")]
    NvDefined,
    #[error("TPM_RC_NV_UNINITIALIZED: NV index never written")]
    NvUninitialized,
    #[error("TPM_RC_OBJECT_MEMORY: out of transient object memory")]
    ObjectMemory,
    #[error("TPM_RC_INITIALIZE: TPM already started")]
    Initialize,
    /// A response code from a software TPM, by mnemonic.
    #[error("TPM returned {0}")]
    Response(&'static str),
    #[error(transparent)]
    Esys(EsysError),
    #[error("malformed TPM data: {0}")]
    Malformed(&'static str),
}

impl From<EsysError> for TpmError {
    fn from(e: EsysError) -> Self {
        let kind = match &e {
            EsysError::Tss2Error(rc) => rc.kind(),
            _ => None,
        };
        match kind {
            Some(Tss2ResponseCodeKind::NvDefined) => TpmError::NvDefined,
            Some(Tss2ResponseCodeKind::NvUninitialized) => TpmError::NvUninitialized,
            Some(Tss2ResponseCodeKind::ObjectMemory) => TpmError::ObjectMemory,
            Some(Tss2ResponseCodeKind::Initialize) => TpmError::Initialize,
            _ => TpmError::Esys(e),
        }
    }
}

/// Failure of one of the TPM-backed primitives or serializers.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Tpm(#[from] TpmError),
    #[error("no free TPM object slot")]
    NoSlot,
    #[error("primary key unique data is {0} bytes, at most 32 allowed")]
    UniqueTooLong(usize),
    #[error("serialized data truncated")]
    Truncated,
    #[error("unexpected block size {0}")]
    BlockSize(u32),
    #[error("{0} bytes left over after the inner value")]
    Leftover(usize),
    #[error("integrity check failed")]
    Integrity,
    #[error("unexpected HMAC length {0}")]
    HmacLength(usize),
    #[error("inner value malformed: {0:?}")]
    Wire(senv_common::wire::Error),
}

impl From<senv_common::wire::Error> for Error {
    fn from(e: senv_common::wire::Error) -> Self {
        Error::Wire(e)
    }
}

impl From<EsysError> for Error {
    fn from(e: EsysError) -> Self {
        Error::Tpm(e.into())
    }
}

impl From<Error> for senv_common::Error {
    fn from(e: Error) -> Self {
        use senv_common::km_err;
        match e {
            Error::NoSlot | Error::Tpm(TpmError::ObjectMemory) => {
                km_err!(MemoryAllocationFailed, "{}", e)
            }
            Error::Tpm(_) => km_err!(UnknownError, "{}", e),
            _ => km_err!(InvalidKeyBlob, "{}", e),
        }
    }
}
