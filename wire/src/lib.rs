//! Types and codecs for the messages that cross the host/guest channels of the secure
//! environment.

#![no_std]
extern crate alloc;

use alloc::vec::Vec;

pub mod authset;
pub mod channel;
pub mod confui;
pub mod gatekeeper;
pub mod keymint;
pub mod legacy;

#[cfg(test)]
mod tests;

/// Marker type indicating failure to convert into a wire enum.
#[derive(Debug)]
pub struct ValueNotRecognized;

/// Macro that emits an implementation of `TryFrom<i32>` for an enum type that has
/// `[derive(N)]` attached to it.
#[macro_export]
macro_rules! try_from_n {
    { $ename:ident } => {
        impl core::convert::TryFrom<i32> for $ename {
            type Error = $crate::ValueNotRecognized;
            fn try_from(value: i32) -> Result<Self, Self::Error> {
                Self::n(value).ok_or($crate::ValueNotRecognized)
            }
        }
    };
}

/// Errors encountered when [de-]serializing wire messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    DataTruncated,
    ExcessData(usize),
    AllocationFailed,
    UnexpectedResponse,
    UnknownCommand(u32),
    InvalidEnumValue(u32),
    InvalidTag(u32),
    InvalidIndirectData,
}

/// Function that mimics `vec![<val>; <len>]` but which detects allocation failure.
pub fn vec_try_fill<T: Clone>(elem: T, len: usize) -> Result<Vec<T>, Error> {
    let mut v = Vec::new();
    v.try_reserve(len).map_err(|_e| Error::AllocationFailed)?;
    v.resize(len, elem);
    Ok(v)
}

/// Split `len` bytes off the front of `data`.
pub(crate) fn take(data: &[u8], len: usize) -> Result<(&[u8], &[u8]), Error> {
    if data.len() < len {
        return Err(Error::DataTruncated);
    }
    Ok(data.split_at(len))
}

/// Copy a slice into a freshly allocated vector, detecting allocation failure.
pub(crate) fn try_to_vec(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut v = Vec::new();
    v.try_reserve(data.len()).map_err(|_e| Error::AllocationFailed)?;
    v.extend_from_slice(data);
    Ok(v)
}
