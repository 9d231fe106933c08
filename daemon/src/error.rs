use std::os::fd::RawFd;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("fd {0} is not an open inherited descriptor")]
    FdNotInherited(RawFd),
    #[error("fd {0} was already taken")]
    FdTaken(RawFd),
    #[error("fcntl on fd {0} failed: {1}")]
    Fcntl(RawFd, nix::Error),
    #[error("lock poisoned by a panicked thread")]
    Poisoned,
    #[error(transparent)]
    Tpm(#[from] senv_tpm::Error),
    #[error(transparent)]
    TpmDevice(#[from] senv_tpm::TpmError),
    #[error("no TPM device could be opened")]
    NoTpmDevice,
    #[error("failed to start the TPM simulator: {0}")]
    Simulator(std::io::Error),
    #[error("failed to seed the random number generator: {0}")]
    Entropy(getrandom::Error),
    #[error("malformed frame: {0:?}")]
    Frame(senv_common::wire::Error),
    #[error("attestation keys unavailable: {0:?}")]
    Attestation(senv_common::Error),
}

impl From<getrandom::Error> for Error {
    fn from(e: getrandom::Error) -> Self {
        Error::Entropy(e)
    }
}

impl From<senv_common::wire::Error> for Error {
    fn from(e: senv_common::wire::Error) -> Self {
        Error::Frame(e)
    }
}
