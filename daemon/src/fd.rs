//! Adoption of file descriptors inherited from the launcher.

use crate::Error;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use std::{
    collections::HashSet,
    os::fd::{FromRawFd, OwnedFd, RawFd},
    sync::{Mutex, OnceLock},
};

static TAKEN: OnceLock<Mutex<HashSet<RawFd>>> = OnceLock::new();

/// Take ownership of an inherited descriptor, marking it close-on-exec. Each descriptor can be
/// taken once.
pub fn take_inherited(raw_fd: RawFd) -> Result<OwnedFd, Error> {
    if raw_fd <= libc::STDERR_FILENO {
        return Err(Error::FdNotInherited(raw_fd));
    }
    let taken = TAKEN.get_or_init(Default::default);
    let mut taken = taken.lock().map_err(|_e| Error::Poisoned)?;
    if taken.contains(&raw_fd) {
        return Err(Error::FdTaken(raw_fd));
    }
    fcntl(raw_fd, FcntlArg::F_GETFD).map_err(|_e| Error::FdNotInherited(raw_fd))?;
    fcntl(raw_fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(|e| Error::Fcntl(raw_fd, e))?;
    taken.insert(raw_fd);
    // SAFETY: the descriptor is open (F_GETFD succeeded), was handed to us by the launcher, and
    // the set above guarantees no other `OwnedFd` has been made from it.
    Ok(unsafe { OwnedFd::from_raw_fd(raw_fd) })
}
