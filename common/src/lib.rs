//! Functionality shared by the KeyMint engine and the key-blob handlers.

#![no_std]
extern crate alloc;

use alloc::{string::String, vec::Vec};
use core::convert::From;
use wire::keymint::ErrorCode;

pub use senv_wire as wire;

pub mod crypto;
pub mod keyblob;
pub mod tag;

/// General error type.
#[derive(Debug)]
pub enum Error {
    Hal(ErrorCode, String),
    Wire(wire::Error),
    Der(der::Error),
    Cbor(coset::CoseError),
}

// The following macros for error generation allow the message portion to be automatically
// compiled out in future, avoiding potential information leakage and allocation.

/// Macro to build an [`Error::Hal`] instance for an [`ErrorCode`] known at compile time:
/// `km_err!(InvalidTag, "some {} format", arg)`.
#[macro_export]
macro_rules! km_err {
    { $error_code:ident, $($arg:tt)+ } => {
        $crate::Error::Hal($crate::wire::keymint::ErrorCode::$error_code,
                           alloc::format!("{}:{}: {}", file!(), line!(), format_args!($($arg)+))) };
}

/// Macro to build an [`Error::Hal`] instance:
/// `km_verr!(rc, "some {} format", arg)`.
#[macro_export]
macro_rules! km_verr {
    { $error_code:expr, $($arg:tt)+ } => {
        $crate::Error::Hal($error_code,
                           alloc::format!("{}:{}: {}", file!(), line!(), format_args!($($arg)+))) };
}

impl Error {
    /// Return the protocol error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Hal(rc, _msg) => *rc,
            Error::Wire(wire::Error::AllocationFailed) => ErrorCode::MemoryAllocationFailed,
            Error::Wire(wire::Error::InvalidTag(_)) => ErrorCode::InvalidTag,
            Error::Wire(_) | Error::Der(_) | Error::Cbor(_) => ErrorCode::InvalidArgument,
        }
    }
}

impl From<Error> for ErrorCode {
    fn from(e: Error) -> Self {
        e.code()
    }
}

impl From<wire::Error> for Error {
    fn from(e: wire::Error) -> Self {
        Error::Wire(e)
    }
}

impl From<der::Error> for Error {
    fn from(e: der::Error) -> Self {
        Error::Der(e)
    }
}

impl From<coset::CoseError> for Error {
    fn from(e: coset::CoseError) -> Self {
        Error::Cbor(e)
    }
}

/// Check for an expected error.
#[macro_export]
macro_rules! expect_err {
    ($result:expr, $err_msg:expr) => {
        assert!(
            $result.is_err(),
            "Expected error containing '{}', got success {:?}",
            $err_msg,
            $result
        );
        let err = $result.err();
        assert!(
            alloc::format!("{:?}", err).contains($err_msg),
            "Unexpected error {:?}, doesn't contain '{}'",
            err,
            $err_msg
        );
    };
}

/// Function that mimics `slice.to_vec()` but which detects allocation failures.
#[inline]
pub fn try_to_vec<T: Clone>(s: &[T]) -> Result<Vec<T>, Error> {
    let mut v = vec_try_with_capacity!(s.len())?;
    v.extend_from_slice(s);
    Ok(v)
}

/// Extension trait to provide fallible-allocation variants of `Vec` methods.
pub trait FallibleAllocExt<T> {
    /// Try to add the `value` to the collection, failing on memory exhaustion.
    fn try_push(&mut self, value: T) -> Result<(), alloc::collections::TryReserveError>;
    /// Try to extend the collection with the contents of `other`, failing on memory exhaustion.
    fn try_extend_from_slice(
        &mut self,
        other: &[T],
    ) -> Result<(), alloc::collections::TryReserveError>
    where
        T: Clone;
}

impl<T> FallibleAllocExt<T> for Vec<T> {
    fn try_push(&mut self, value: T) -> Result<(), alloc::collections::TryReserveError> {
        self.try_reserve(1)?;
        self.push(value);
        Ok(())
    }
    fn try_extend_from_slice(
        &mut self,
        other: &[T],
    ) -> Result<(), alloc::collections::TryReserveError>
    where
        T: Clone,
    {
        self.try_reserve(other.len())?;
        self.extend_from_slice(other);
        Ok(())
    }
}

impl From<alloc::collections::TryReserveError> for Error {
    fn from(_e: alloc::collections::TryReserveError) -> Self {
        Error::Hal(ErrorCode::MemoryAllocationFailed, String::from("allocation of Vec failed"))
    }
}

/// Macro that mimics `vec!` but which detects allocation failure.
#[macro_export]
macro_rules! vec_try {
    { $elem:expr ; $len:expr } => {
        $crate::wire::vec_try_fill($elem, $len).map_err($crate::Error::from)
    };
    { $x1:expr, $x2:expr, $x3:expr $(,)? } => {
        {
            let mut v = $crate::vec_try_with_capacity!(3)?;
            v.push($x1);
            v.push($x2);
            v.push($x3);
            Result::<_, $crate::Error>::Ok(v)
        }
    };
    { $x1:expr, $x2:expr $(,)? } => {
        {
            let mut v = $crate::vec_try_with_capacity!(2)?;
            v.push($x1);
            v.push($x2);
            Result::<_, $crate::Error>::Ok(v)
        }
    };
    { $x1:expr $(,)? } => {
        {
            let mut v = $crate::vec_try_with_capacity!(1)?;
            v.push($x1);
            Result::<_, $crate::Error>::Ok(v)
        }
    };
}

/// Macro that mimics `Vec::with_capacity` but which detects allocation failure.
#[macro_export]
macro_rules! vec_try_with_capacity {
    { $len:expr } => {
        {
            let mut v = alloc::vec::Vec::new();
            match v.try_reserve($len) {
                Err(_e) => Err($crate::km_err!(MemoryAllocationFailed, "allocation of Vec failed")),
                Ok(_) => Ok(v),
            }
        }
    }
}
