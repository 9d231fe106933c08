//! Codec for the `AuthorizationSet` encoding used inside legacy KeyMint messages.
//!
//! ```text
//! [0..4]              Size B of the indirect data, host order.
//! [4..4+B]            Concatenated contents of every `Bytes`/`Bignum` parameter.
//! [4+B..8+B]          Count N of parameters.
//! [8+B..12+B]         Size Z of the encoded parameters.
//! [12+B..12+B+Z]      Parameters, each a `u32` tag followed by a value whose shape depends
//!                     on the tag type: `u32` (enum/uint), `u8` (bool), `u64` (ulong/date),
//!                     or `u32 len, u32 offset` into the indirect data (bytes/bignum).
//! ```

use crate::{
    keymint::{
        enum_from_u32, tag_type, DateTime, KeyParam, KeySizeInBits, RsaExponent, Tag, TagType,
    },
    take, try_to_vec, Error,
};
use alloc::vec::Vec;

/// Value shapes that can appear on the wire.
pub enum Value<'a> {
    Int(u32),
    Long(u64),
    True,
    Bytes(&'a [u8]),
}

/// The wire shape of a parameter's value.
pub fn value_of(param: &KeyParam) -> Value<'_> {
    use KeyParam::*;
    match param {
        Purpose(v) => Value::Int(*v as u32),
        Algorithm(v) => Value::Int(*v as u32),
        BlockMode(v) => Value::Int(*v as u32),
        Digest(v) | RsaOaepMgfDigest(v) => Value::Int(*v as u32),
        Padding(v) => Value::Int(*v as u32),
        EcCurve(v) => Value::Int(*v as u32),
        Origin(v) => Value::Int(*v as u32),
        KeySize(v) => Value::Int(v.0),
        MinMacLength(v) | MaxUsesPerBoot(v) | UsageCountLimit(v) | UserId(v) | UserAuthType(v)
        | AuthTimeout(v) | OsVersion(v) | OsPatchlevel(v) | VendorPatchlevel(v)
        | BootPatchlevel(v) | MacLength(v) | MaxBootLevel(v) => Value::Int(*v),
        RsaPublicExponent(v) => Value::Long(v.0),
        UserSecureId(v) => Value::Long(*v),
        ActiveDatetime(v)
        | OriginationExpireDatetime(v)
        | UsageExpireDatetime(v)
        | CreationDatetime(v)
        | CertificateNotBefore(v)
        | CertificateNotAfter(v) => Value::Long(v.ms_since_epoch as u64),
        CallerNonce
        | IncludeUniqueId
        | BootloaderOnly
        | RollbackResistance
        | EarlyBootOnly
        | NoAuthRequired
        | AllowWhileOnBody
        | TrustedUserPresenceRequired
        | TrustedConfirmationRequired
        | UnlockedDeviceRequired
        | DeviceUniqueAttestation
        | StorageKey
        | ResetSinceIdRotation => Value::True,
        ApplicationId(v)
        | ApplicationData(v)
        | RootOfTrust(v)
        | UniqueId(v)
        | AttestationChallenge(v)
        | AttestationApplicationId(v)
        | AttestationIdBrand(v)
        | AttestationIdDevice(v)
        | AttestationIdProduct(v)
        | AttestationIdSerial(v)
        | AttestationIdImei(v)
        | AttestationIdSecondImei(v)
        | AttestationIdMeid(v)
        | AttestationIdManufacturer(v)
        | AttestationIdModel(v)
        | AssociatedData(v)
        | Nonce(v)
        | ConfirmationToken(v)
        | AuthToken(v)
        | CertificateSerial(v)
        | CertificateSubject(v) => Value::Bytes(v),
    }
}

/// Build the parameter for `tag`, failing if `value` has the wrong shape for it.
pub fn param_from(tag: Tag, value: Value) -> Result<KeyParam, Error> {
    let int = |v: &Value| match v {
        Value::Int(i) => Ok(*i),
        _ => Err(Error::InvalidTag(tag as u32)),
    };
    let long = |v: &Value| match v {
        Value::Long(l) => Ok(*l),
        _ => Err(Error::InvalidTag(tag as u32)),
    };
    let bytes = |v: &Value| match v {
        Value::Bytes(b) => try_to_vec(b),
        _ => Err(Error::InvalidTag(tag as u32)),
    };
    let date = |v: &Value| long(v).map(|l| DateTime { ms_since_epoch: l as i64 });
    Ok(match tag {
        Tag::Purpose => KeyParam::Purpose(enum_from_u32(int(&value)?)?),
        Tag::Algorithm => KeyParam::Algorithm(enum_from_u32(int(&value)?)?),
        Tag::BlockMode => KeyParam::BlockMode(enum_from_u32(int(&value)?)?),
        Tag::Digest => KeyParam::Digest(enum_from_u32(int(&value)?)?),
        Tag::RsaOaepMgfDigest => KeyParam::RsaOaepMgfDigest(enum_from_u32(int(&value)?)?),
        Tag::Padding => KeyParam::Padding(enum_from_u32(int(&value)?)?),
        Tag::EcCurve => KeyParam::EcCurve(enum_from_u32(int(&value)?)?),
        Tag::Origin => KeyParam::Origin(enum_from_u32(int(&value)?)?),
        Tag::KeySize => KeyParam::KeySize(KeySizeInBits(int(&value)?)),
        Tag::MinMacLength => KeyParam::MinMacLength(int(&value)?),
        Tag::MaxUsesPerBoot => KeyParam::MaxUsesPerBoot(int(&value)?),
        Tag::UsageCountLimit => KeyParam::UsageCountLimit(int(&value)?),
        Tag::UserId => KeyParam::UserId(int(&value)?),
        Tag::UserAuthType => KeyParam::UserAuthType(int(&value)?),
        Tag::AuthTimeout => KeyParam::AuthTimeout(int(&value)?),
        Tag::OsVersion => KeyParam::OsVersion(int(&value)?),
        Tag::OsPatchlevel => KeyParam::OsPatchlevel(int(&value)?),
        Tag::VendorPatchlevel => KeyParam::VendorPatchlevel(int(&value)?),
        Tag::BootPatchlevel => KeyParam::BootPatchlevel(int(&value)?),
        Tag::MacLength => KeyParam::MacLength(int(&value)?),
        Tag::MaxBootLevel => KeyParam::MaxBootLevel(int(&value)?),
        Tag::RsaPublicExponent => KeyParam::RsaPublicExponent(RsaExponent(long(&value)?)),
        Tag::UserSecureId => KeyParam::UserSecureId(long(&value)?),
        Tag::ActiveDatetime => KeyParam::ActiveDatetime(date(&value)?),
        Tag::OriginationExpireDatetime => KeyParam::OriginationExpireDatetime(date(&value)?),
        Tag::UsageExpireDatetime => KeyParam::UsageExpireDatetime(date(&value)?),
        Tag::CreationDatetime => KeyParam::CreationDatetime(date(&value)?),
        Tag::CertificateNotBefore => KeyParam::CertificateNotBefore(date(&value)?),
        Tag::CertificateNotAfter => KeyParam::CertificateNotAfter(date(&value)?),
        Tag::CallerNonce => KeyParam::CallerNonce,
        Tag::IncludeUniqueId => KeyParam::IncludeUniqueId,
        Tag::BootloaderOnly => KeyParam::BootloaderOnly,
        Tag::RollbackResistance => KeyParam::RollbackResistance,
        Tag::EarlyBootOnly => KeyParam::EarlyBootOnly,
        Tag::NoAuthRequired => KeyParam::NoAuthRequired,
        Tag::AllowWhileOnBody => KeyParam::AllowWhileOnBody,
        Tag::TrustedUserPresenceRequired => KeyParam::TrustedUserPresenceRequired,
        Tag::TrustedConfirmationRequired => KeyParam::TrustedConfirmationRequired,
        Tag::UnlockedDeviceRequired => KeyParam::UnlockedDeviceRequired,
        Tag::DeviceUniqueAttestation => KeyParam::DeviceUniqueAttestation,
        Tag::StorageKey => KeyParam::StorageKey,
        Tag::ResetSinceIdRotation => KeyParam::ResetSinceIdRotation,
        Tag::ApplicationId => KeyParam::ApplicationId(bytes(&value)?),
        Tag::ApplicationData => KeyParam::ApplicationData(bytes(&value)?),
        Tag::RootOfTrust => KeyParam::RootOfTrust(bytes(&value)?),
        Tag::UniqueId => KeyParam::UniqueId(bytes(&value)?),
        Tag::AttestationChallenge => KeyParam::AttestationChallenge(bytes(&value)?),
        Tag::AttestationApplicationId => KeyParam::AttestationApplicationId(bytes(&value)?),
        Tag::AttestationIdBrand => KeyParam::AttestationIdBrand(bytes(&value)?),
        Tag::AttestationIdDevice => KeyParam::AttestationIdDevice(bytes(&value)?),
        Tag::AttestationIdProduct => KeyParam::AttestationIdProduct(bytes(&value)?),
        Tag::AttestationIdSerial => KeyParam::AttestationIdSerial(bytes(&value)?),
        Tag::AttestationIdImei => KeyParam::AttestationIdImei(bytes(&value)?),
        Tag::AttestationIdSecondImei => KeyParam::AttestationIdSecondImei(bytes(&value)?),
        Tag::AttestationIdMeid => KeyParam::AttestationIdMeid(bytes(&value)?),
        Tag::AttestationIdManufacturer => KeyParam::AttestationIdManufacturer(bytes(&value)?),
        Tag::AttestationIdModel => KeyParam::AttestationIdModel(bytes(&value)?),
        Tag::AssociatedData => KeyParam::AssociatedData(bytes(&value)?),
        Tag::Nonce => KeyParam::Nonce(bytes(&value)?),
        Tag::ConfirmationToken => KeyParam::ConfirmationToken(bytes(&value)?),
        Tag::AuthToken => KeyParam::AuthToken(bytes(&value)?),
        Tag::CertificateSerial => KeyParam::CertificateSerial(bytes(&value)?),
        Tag::CertificateSubject => KeyParam::CertificateSubject(bytes(&value)?),
        Tag::Invalid
        | Tag::HardwareType
        | Tag::MinSecondsBetweenOps
        | Tag::IdentityCredentialKey => return Err(Error::InvalidTag(tag as u32)),
    })
}

fn push(buf: &mut Vec<u8>, data: &[u8]) -> Result<(), Error> {
    buf.try_reserve(data.len()).map_err(|_e| Error::AllocationFailed)?;
    buf.extend_from_slice(data);
    Ok(())
}

/// Number of bytes that [`serialize_into`] will emit for `params`.
pub fn serialized_size(params: &[KeyParam]) -> usize {
    let mut indirect = 0;
    let mut elems = 0;
    for param in params {
        elems += 4 + match value_of(param) {
            Value::Int(_) => 4,
            Value::Long(_) => 8,
            Value::True => 1,
            Value::Bytes(b) => {
                indirect += b.len();
                8
            }
        };
    }
    4 + indirect + 4 + 4 + elems
}

/// Append the encoding of `params` to `buf`.
pub fn serialize_into(params: &[KeyParam], buf: &mut Vec<u8>) -> Result<(), Error> {
    buf.try_reserve(serialized_size(params)).map_err(|_e| Error::AllocationFailed)?;

    let indirect_len: usize = params
        .iter()
        .map(|p| match value_of(p) {
            Value::Bytes(b) => b.len(),
            _ => 0,
        })
        .sum();
    push(buf, &(indirect_len as u32).to_ne_bytes())?;
    for param in params {
        if let Value::Bytes(b) = value_of(param) {
            push(buf, b)?;
        }
    }

    push(buf, &(params.len() as u32).to_ne_bytes())?;
    let elems_size_offset = buf.len();
    push(buf, &[0u8; 4])?;
    let first_elem_offset = buf.len();

    let mut indirect_offset = 0u32;
    for param in params {
        push(buf, &(param.tag() as u32).to_ne_bytes())?;
        match value_of(param) {
            Value::Int(v) => push(buf, &v.to_ne_bytes())?,
            Value::Long(v) => push(buf, &v.to_ne_bytes())?,
            Value::True => push(buf, &[1u8])?,
            Value::Bytes(b) => {
                push(buf, &(b.len() as u32).to_ne_bytes())?;
                push(buf, &indirect_offset.to_ne_bytes())?;
                indirect_offset += b.len() as u32;
            }
        }
    }
    let elems_size = (buf.len() - first_elem_offset) as u32;
    buf[elems_size_offset..elems_size_offset + 4].copy_from_slice(&elems_size.to_ne_bytes());
    Ok(())
}

/// Encode `params` into a new buffer.
pub fn serialize(params: &[KeyParam]) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    serialize_into(params, &mut buf)?;
    Ok(buf)
}

fn read_u32(data: &mut &[u8]) -> Result<u32, Error> {
    let (head, rest) = take(data, 4)?;
    *data = rest;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(head);
    Ok(u32::from_ne_bytes(raw))
}

fn read_u64(data: &mut &[u8]) -> Result<u64, Error> {
    let (head, rest) = take(data, 8)?;
    *data = rest;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(head);
    Ok(u64::from_ne_bytes(raw))
}

/// Decode an authorization set from the front of `data`, returning the remainder.
pub fn deserialize(data: &[u8]) -> Result<(Vec<KeyParam>, &[u8]), Error> {
    let mut data = data;
    let indirect_len = read_u32(&mut data)? as usize;
    let (indirect, rest) = take(data, indirect_len)?;
    data = rest;

    let count = read_u32(&mut data)? as usize;
    let elems_size = read_u32(&mut data)? as usize;
    let (mut elems, rest) = take(data, elems_size)?;

    // Each element occupies at least 5 bytes, which bounds a hostile count.
    if count > elems_size / 5 + 1 {
        return Err(Error::DataTruncated);
    }
    let mut params = Vec::new();
    params.try_reserve(count).map_err(|_e| Error::AllocationFailed)?;
    for _ in 0..count {
        let raw_tag = read_u32(&mut elems)?;
        let tag = enum_from_u32::<Tag>(raw_tag).map_err(|_e| Error::InvalidTag(raw_tag))?;
        let value = match tag_type(tag) {
            TagType::Enum | TagType::EnumRep | TagType::Uint | TagType::UintRep => {
                Value::Int(read_u32(&mut elems)?)
            }
            TagType::Ulong | TagType::UlongRep | TagType::Date => {
                Value::Long(read_u64(&mut elems)?)
            }
            TagType::Bool => {
                let (b, rest) = take(elems, 1)?;
                elems = rest;
                if b[0] == 0 {
                    // A false boolean is represented by absence.
                    continue;
                }
                Value::True
            }
            TagType::Bytes | TagType::Bignum => {
                let len = read_u32(&mut elems)? as usize;
                let offset = read_u32(&mut elems)? as usize;
                let end = offset.checked_add(len).ok_or(Error::InvalidIndirectData)?;
                if end > indirect.len() {
                    return Err(Error::InvalidIndirectData);
                }
                Value::Bytes(&indirect[offset..end])
            }
            TagType::Invalid => return Err(Error::InvalidTag(raw_tag)),
        };
        params.push(param_from(tag, value)?);
    }
    if !elems.is_empty() {
        return Err(Error::ExcessData(elems.len()));
    }
    Ok((params, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymint::{Algorithm, BlockMode, KeyPurpose, PaddingMode};
    use alloc::vec;

    #[test]
    fn test_empty_set() {
        let data = serialize(&[]).unwrap();
        assert_eq!(hex::encode(&data), "000000000000000000000000");
        let (got, rest) = deserialize(&data).unwrap();
        assert!(got.is_empty());
        assert!(rest.is_empty());
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_serialize_layout() {
        let params = vec![
            KeyParam::Algorithm(Algorithm::Aes),
            KeyParam::CallerNonce,
            KeyParam::ApplicationId(vec![0x41, 0x42]),
            KeyParam::UserSecureId(0x0102030405060708),
        ];
        let want = concat!(
            "02000000", "4142", // indirect data
            "04000000", // count
            "25000000", // elems size = 8 + 5 + 12 + 12
            "02000010", "20000000", // ALGORITHM = AES
            "07000070", "01", // CALLER_NONCE
            "59020090", "02000000", "00000000", // APPLICATION_ID len 2 @ 0
            "f60100a0", "0807060504030201", // USER_SECURE_ID
        );
        let data = serialize(&params).unwrap();
        assert_eq!(hex::encode(&data), want);
        assert_eq!(serialized_size(&params), data.len());
        let (got, rest) = deserialize(&data).unwrap();
        assert_eq!(got, params);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_trailing_data_is_returned() {
        let params = vec![
            KeyParam::Purpose(KeyPurpose::Encrypt),
            KeyParam::BlockMode(BlockMode::Cbc),
            KeyParam::Padding(PaddingMode::None),
        ];
        let mut data = serialize(&params).unwrap();
        data.extend_from_slice(&[9, 9]);
        let (got, rest) = deserialize(&data).unwrap();
        assert_eq!(got, params);
        assert_eq!(rest, &[9, 9]);
    }

    #[test]
    fn test_deserialize_fail() {
        let params = vec![KeyParam::ApplicationData(vec![1, 2, 3])];
        let data = serialize(&params).unwrap();
        for len in 0..data.len() {
            assert!(deserialize(&data[..len]).is_err(), "truncated to {}", len);
        }

        // Indirect reference beyond the indirect data.
        let mut bad = data.clone();
        let offset_pos = bad.len() - 4;
        bad[offset_pos..].copy_from_slice(&7u32.to_ne_bytes());
        assert_eq!(deserialize(&bad), Err(Error::InvalidIndirectData));

        // Unknown tag number.
        let mut bad = serialize(&[KeyParam::MacLength(128)]).unwrap();
        let tag_pos = bad.len() - 8;
        bad[tag_pos..tag_pos + 4].copy_from_slice(&0x3000_7777u32.to_ne_bytes());
        assert_eq!(deserialize(&bad), Err(Error::InvalidTag(0x3000_7777)));
    }
}
