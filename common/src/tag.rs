//! Helper functionality for working with tags.

use crate::{
    crypto::{aes, des, ec, hmac, rsa::DecryptionMode, Ec, KeyGenInfo, KeyMaterial, Rsa},
    km_err, try_to_vec, vec_try_with_capacity,
    wire::{
        authset,
        keymint::{
            self, Algorithm, BlockMode, Digest, EcCurve, ErrorCode, KeyFormat, KeyParam,
            KeyPurpose, KeySizeInBits, PaddingMode, Tag,
        },
    },
    Error, FallibleAllocExt,
};
use alloc::vec::Vec;
use log::warn;

#[cfg(test)]
mod tests;

/// Tags that are enforced by the host side of the secure environment rather than inside it, and
/// so are reported as software-enforced.
pub const SOFTWARE_ENFORCED_TAGS: &[Tag] = &[
    Tag::ActiveDatetime,
    Tag::OriginationExpireDatetime,
    Tag::UsageExpireDatetime,
    Tag::UserId,
    Tag::CreationDatetime,
    Tag::IncludeUniqueId,
    Tag::UsageCountLimit,
    Tag::MaxBootLevel,
    Tag::TrustedConfirmationRequired,
];

/// Tags that may be present in a key description but are never stored in the key's
/// characteristics.
pub const UNSTORED_TAGS: &[Tag] = &[
    Tag::ApplicationId,
    Tag::ApplicationData,
    Tag::AttestationChallenge,
    Tag::AttestationApplicationId,
    Tag::AttestationIdBrand,
    Tag::AttestationIdDevice,
    Tag::AttestationIdProduct,
    Tag::AttestationIdSerial,
    Tag::AttestationIdImei,
    Tag::AttestationIdSecondImei,
    Tag::AttestationIdMeid,
    Tag::AttestationIdManufacturer,
    Tag::AttestationIdModel,
    Tag::CertificateSerial,
    Tag::CertificateSubject,
    Tag::CertificateNotBefore,
    Tag::CertificateNotAfter,
    Tag::ResetSinceIdRotation,
];

/// Tags that only make sense as operation parameters.
pub const OPERATION_ONLY_TAGS: &[Tag] = &[
    Tag::Nonce,
    Tag::MacLength,
    Tag::AssociatedData,
    Tag::ConfirmationToken,
    Tag::UniqueId,
    Tag::AuthToken,
];

/// Tags that the key-blob handler adds itself, and which are rejected in a key description.
pub const AUTO_ADDED_TAGS: &[Tag] = &[
    Tag::Origin,
    Tag::RootOfTrust,
    Tag::OsVersion,
    Tag::OsPatchlevel,
    Tag::VendorPatchlevel,
    Tag::BootPatchlevel,
];

/// Macro to retrieve a copy of the (single) value of a tag in a collection of `KeyParam`s.  There
/// can be only one.  Only works for variants whose data type implements `Copy`.
#[macro_export]
macro_rules! get_tag_value {
    { $params:expr, $variant:ident, $err:expr } => {
        {
            let mut result = None;
            let mut count = 0;
            for param in $params {
                if let $crate::wire::keymint::KeyParam::$variant(v) = param {
                    count += 1;
                    result = Some(*v);
                }
            }
            match (count, result) {
                (1, Some(v)) => Ok(v),
                (0, _) => Err($crate::km_verr!($err, "missing tag {}", stringify!($variant))),
                _ => Err($crate::km_verr!($err, "duplicate tag {}", stringify!($variant))),
            }
        }
    }
}

/// Macro to retrieve the value of an optional single-valued tag in a collection of `KeyParam`s.  It
/// may or may not be present, but multiple instances of the tag are assumed to be invalid.
#[macro_export]
macro_rules! get_opt_tag_value {
    { $params:expr, $variant:ident } => {
        $crate::get_opt_tag_value!($params, $variant, InvalidTag)
    };
    { $params:expr, $variant:ident, $dup_error:ident } => {
        {
            let mut result = None;
            let mut count = 0;
            for param in $params {
                if let $crate::wire::keymint::KeyParam::$variant(v) = param {
                    count += 1;
                    result = Some(v);
                }
            }
            match count {
                0 | 1 => Ok(result),
                _ => Err($crate::km_err!($dup_error, "duplicate tag {}", stringify!($variant))),
            }
        }
    }
}

/// Macro to retrieve a `bool` tag value, returning `false` if the tag is absent
#[macro_export]
macro_rules! get_bool_tag_value {
    { $params:expr, $variant:ident } => {
        {
            let mut count = 0;
            for param in $params {
                if let $crate::wire::keymint::KeyParam::$variant = param {
                    count += 1;
                }
            }
            match count {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err($crate::km_err!(InvalidTag, "duplicate tag {}", stringify!($variant))),
            }
        }
    }
}

/// Macro to check a collection of `KeyParam`s holds a value matching the given value.
#[macro_export]
macro_rules! contains_tag_value {
    { $params:expr, $variant:ident, $value:expr } => {
        {
            let mut found = false;
            for param in $params {
                if let $crate::wire::keymint::KeyParam::$variant(v) = param {
                    if *v == $value {
                        found = true;
                    }
                }
            }
            found
        }
    }
}

/// Get the configured algorithm from a set of parameters.
pub fn get_algorithm(params: &[KeyParam]) -> Result<Algorithm, Error> {
    get_tag_value!(params, Algorithm, ErrorCode::UnsupportedAlgorithm)
}

/// Get the configured block mode from a set of parameters.
pub fn get_block_mode(params: &[KeyParam]) -> Result<BlockMode, Error> {
    get_tag_value!(params, BlockMode, ErrorCode::UnsupportedBlockMode)
}

/// Get the configured padding mode from a set of parameters.
pub fn get_padding_mode(params: &[KeyParam]) -> Result<PaddingMode, Error> {
    get_tag_value!(params, Padding, ErrorCode::UnsupportedPaddingMode)
}

/// Get the configured digest from a set of parameters.
pub fn get_digest(params: &[KeyParam]) -> Result<Digest, Error> {
    get_tag_value!(params, Digest, ErrorCode::UnsupportedDigest)
}

/// Get the configured elliptic curve from a set of parameters.
pub fn get_ec_curve(params: &[KeyParam]) -> Result<EcCurve, Error> {
    get_tag_value!(params, EcCurve, ErrorCode::UnsupportedKeySize)
}

/// Get the configured MGF digest from a set of parameters, defaulting to SHA-1.
pub fn get_mgf_digest(params: &[KeyParam]) -> Result<Digest, Error> {
    Ok(*get_opt_tag_value!(params, RsaOaepMgfDigest)?.unwrap_or(&Digest::Sha1))
}

/// Get the certificate serial number, falling back to the default of 1.
pub fn get_cert_serial(params: &[KeyParam]) -> Result<&[u8], Error> {
    match get_opt_tag_value!(params, CertificateSerial)? {
        Some(serial) => Ok(serial),
        None => Ok(keymint::DEFAULT_CERT_SERIAL),
    }
}

/// Get the DER-encoded certificate subject, falling back to `CN=Android Keystore Key`.
pub fn get_cert_subject(params: &[KeyParam]) -> Result<&[u8], Error> {
    match get_opt_tag_value!(params, CertificateSubject)? {
        Some(subject) if !subject.is_empty() => Ok(subject),
        _ => Ok(keymint::DEFAULT_CERT_SUBJECT),
    }
}

/// Find the first purpose value in the parameters.
pub fn primary_purpose(params: &[KeyParam]) -> Result<KeyPurpose, Error> {
    params
        .iter()
        .find_map(|param| match param {
            KeyParam::Purpose(purpose) => Some(*purpose),
            _ => None,
        })
        .ok_or_else(|| km_err!(IncompatiblePurpose, "no purpose found for key"))
}

/// Build the hidden input that binds a key blob to its caller: the serialized authorization set
/// holding the non-empty `ApplicationId` and `ApplicationData` values.
pub fn hidden(params: &[KeyParam]) -> Result<Vec<u8>, Error> {
    let mut hidden = vec_try_with_capacity!(2)?;
    if let Some(app_id) = get_opt_tag_value!(params, ApplicationId)? {
        if !app_id.is_empty() {
            hidden.try_push(KeyParam::ApplicationId(try_to_vec(app_id)?))?;
        }
    }
    if let Some(app_data) = get_opt_tag_value!(params, ApplicationData)? {
        if !app_data.is_empty() {
            hidden.try_push(KeyParam::ApplicationData(try_to_vec(app_data)?))?;
        }
    }
    Ok(authset::serialize(&hidden)?)
}

/// Split a key description into hardware-enforced and software-enforced authorizations.
///
/// Tags that are never stored are dropped, and operation-only tags are rejected.
pub fn split_authorizations(
    description: &[KeyParam],
) -> Result<(Vec<KeyParam>, Vec<KeyParam>), Error> {
    let mut hw_enforced = Vec::new();
    let mut sw_enforced = Vec::new();
    for param in description {
        let tag = param.tag();
        if OPERATION_ONLY_TAGS.contains(&tag) {
            return Err(km_err!(InvalidTag, "operation tag {:?} in key description", tag));
        }
        if UNSTORED_TAGS.contains(&tag) {
            continue;
        }
        if SOFTWARE_ENFORCED_TAGS.contains(&tag) {
            sw_enforced.try_push(param.clone())?;
        } else {
            hw_enforced.try_push(param.clone())?;
        }
    }
    Ok((hw_enforced, sw_enforced))
}

/// Check key generation parameters, returning the information needed to generate the key.
pub fn check_key_gen_params(params: &[KeyParam]) -> Result<KeyGenInfo, Error> {
    reject_device_unique(params)?;
    match get_algorithm(params)? {
        Algorithm::Aes => {
            // For key generation, the size must be explicitly specified.
            let key_size = get_tag_value!(params, KeySize, ErrorCode::UnsupportedKeySize)?;
            let variant = match key_size {
                KeySizeInBits(128) => aes::Variant::Aes128,
                KeySizeInBits(192) => aes::Variant::Aes192,
                KeySizeInBits(256) => aes::Variant::Aes256,
                _ => {
                    return Err(km_err!(
                        UnsupportedKeySize,
                        "unsupported KEY_SIZE {:?} bits for AES",
                        key_size
                    ))
                }
            };
            check_aes_params(params)?;
            Ok(KeyGenInfo::Aes(variant))
        }
        Algorithm::TripleDes => {
            let key_size = get_tag_value!(params, KeySize, ErrorCode::UnsupportedKeySize)?;
            if key_size != des::KEY_SIZE_BITS {
                return Err(km_err!(
                    UnsupportedKeySize,
                    "unsupported KEY_SIZE {:?} bits for TRIPLE_DES",
                    key_size
                ));
            }
            reject_incompatible_auth(params)?;
            Ok(KeyGenInfo::TripleDes)
        }
        Algorithm::Hmac => {
            let key_size = get_tag_value!(params, KeySize, ErrorCode::UnsupportedKeySize)?;
            check_hmac_params(params, key_size)?;
            Ok(KeyGenInfo::Hmac(key_size))
        }
        Algorithm::Rsa => {
            // Size and public exponent must both be given.
            let key_size = get_tag_value!(params, KeySize, ErrorCode::UnsupportedKeySize)?;
            check_rsa_key_size(key_size)?;
            let exponent = get_tag_value!(params, RsaPublicExponent, ErrorCode::InvalidArgument)?;
            check_rsa_params(params)?;
            Ok(KeyGenInfo::Rsa(key_size, exponent))
        }
        Algorithm::Ec => {
            let curve = ec::NistCurve::try_from(get_ec_curve(params)?)?;
            check_ec_params(curve, params)?;
            Ok(KeyGenInfo::NistEc(curve))
        }
    }
}

/// Check key import parameters and material. Returns the key material and any parameters deduced
/// from it that the caller left out.
pub fn check_key_import_params(
    rsa: &dyn Rsa,
    ec: &dyn Ec,
    params: &[KeyParam],
    key_format: KeyFormat,
    key_data: &[u8],
) -> Result<(KeyMaterial, Vec<KeyParam>), Error> {
    reject_device_unique(params)?;
    let algo = get_algorithm(params)?;
    let mut deduced = Vec::new();
    let material = match algo {
        Algorithm::Aes | Algorithm::TripleDes | Algorithm::Hmac => {
            require_raw(key_format)?;
            let material = KeyMaterial::from_raw(algo, key_data)?;
            let key_size = match &material {
                KeyMaterial::Aes(k) => k.size(),
                KeyMaterial::Hmac(k) => k.size(),
                // Each of the 24 key bytes carries a parity bit.
                _ => des::KEY_SIZE_BITS,
            };
            deduced.try_extend_from_slice(&require_matching_key_size(params, key_size)?)?;
            match algo {
                Algorithm::Aes => check_aes_params(params)?,
                Algorithm::Hmac => check_hmac_params(params, key_size)?,
                _ => reject_incompatible_auth(params)?,
            }
            material
        }
        Algorithm::Rsa => {
            require_pkcs8(key_format)?;
            let (material, key_size, exponent) = rsa.import_pkcs8_key(key_data)?;
            deduced.try_extend_from_slice(&require_matching_key_size(params, key_size)?)?;
            match get_opt_tag_value!(params, RsaPublicExponent)? {
                Some(param_exponent) if *param_exponent != exponent => {
                    return Err(km_err!(
                        ImportParameterMismatch,
                        "specified RSA_PUBLIC_EXPONENT {:?} != actual exponent {:?}",
                        param_exponent,
                        exponent
                    ));
                }
                Some(_) => {}
                None => deduced.try_push(KeyParam::RsaPublicExponent(exponent))?,
            }
            check_rsa_key_size(key_size)?;
            check_rsa_params(params)?;
            material
        }
        Algorithm::Ec => {
            require_pkcs8(key_format)?;
            let material = ec.import_pkcs8_key(key_data)?;
            let curve = match &material {
                KeyMaterial::Ec(k) => k.curve(),
                _ => return Err(km_err!(ImportParameterMismatch, "EC import gave other key")),
            };
            match get_opt_tag_value!(params, EcCurve)? {
                Some(param_curve) if *param_curve != EcCurve::from(curve) => {
                    return Err(km_err!(
                        ImportParameterMismatch,
                        "imported EC key claimed curve {:?} but is {:?}",
                        param_curve,
                        curve
                    ));
                }
                Some(_) => {}
                None => deduced.try_push(KeyParam::EcCurve(curve.into()))?,
            }
            deduced.try_extend_from_slice(&require_matching_key_size(params, curve.key_size())?)?;
            check_ec_params(curve, params)?;
            material
        }
    };
    Ok((material, deduced))
}

fn require_raw(key_format: KeyFormat) -> Result<(), Error> {
    if key_format != KeyFormat::Raw {
        return Err(km_err!(
            UnsupportedKeyFormat,
            "unsupported import format {:?}, expect RAW",
            key_format
        ));
    }
    Ok(())
}

fn require_pkcs8(key_format: KeyFormat) -> Result<(), Error> {
    if key_format != KeyFormat::Pkcs8 {
        return Err(km_err!(
            UnsupportedKeyFormat,
            "unsupported import format {:?}, expect PKCS8",
            key_format
        ));
    }
    Ok(())
}

/// A given `KEY_SIZE` must match the imported key. A missing one is returned for the caller to add.
fn require_matching_key_size(
    params: &[KeyParam],
    key_size: KeySizeInBits,
) -> Result<Vec<KeyParam>, Error> {
    let mut deduced = Vec::new();
    match get_opt_tag_value!(params, KeySize)? {
        Some(param_key_size) if *param_key_size != key_size => {
            return Err(km_err!(
                ImportParameterMismatch,
                "specified KEY_SIZE {:?} bits != actual key size {:?}",
                param_key_size,
                key_size
            ));
        }
        Some(_) => {}
        None => deduced.try_push(KeyParam::KeySize(key_size))?,
    }
    Ok(deduced)
}

fn check_rsa_key_size(key_size: KeySizeInBits) -> Result<(), Error> {
    match key_size.0 {
        512 | 768 | 1024 | 2048 | 3072 | 4096 => Ok(()),
        _ => Err(km_err!(UnsupportedKeySize, "unsupported KEY_SIZE {:?} bits for RSA", key_size)),
    }
}

/// Check the purposes of an RSA key that is about to be generated or imported.
fn check_rsa_params(params: &[KeyParam]) -> Result<(), Error> {
    let mut seen_attest = false;
    let mut seen_non_attest = false;
    for param in params {
        if let KeyParam::Purpose(purpose) = param {
            match purpose {
                KeyPurpose::Sign | KeyPurpose::Decrypt | KeyPurpose::WrapKey => {
                    seen_non_attest = true
                }
                KeyPurpose::AttestKey => seen_attest = true,
                KeyPurpose::Verify | KeyPurpose::Encrypt => {}
                KeyPurpose::AgreeKey => warn!("RSA key with invalid purpose {:?}", purpose),
            }
        }
    }
    if seen_attest && seen_non_attest {
        return Err(km_err!(
            IncompatiblePurpose,
            "keys with ATTEST_KEY must have no other purpose"
        ));
    }
    reject_incompatible_auth(params)
}

/// Check the size and purposes of an EC key that is about to be generated or imported.
fn check_ec_params(curve: ec::NistCurve, params: &[KeyParam]) -> Result<(), Error> {
    if let Some(key_size) = get_opt_tag_value!(params, KeySize)? {
        if *key_size != curve.key_size() {
            return Err(km_err!(
                InvalidArgument,
                "invalid curve ({:?}) / key size ({:?}) combination",
                curve,
                key_size
            ));
        }
    }
    let mut seen_attest = false;
    let mut seen_other = false;
    for param in params {
        if let KeyParam::Purpose(purpose) = param {
            match purpose {
                KeyPurpose::Sign | KeyPurpose::AgreeKey => seen_other = true,
                KeyPurpose::AttestKey => seen_attest = true,
                KeyPurpose::Verify => {}
                _ => warn!("EC key with invalid purpose {:?}", purpose),
            }
        }
    }
    if seen_attest && seen_other {
        return Err(km_err!(
            IncompatiblePurpose,
            "keys with ATTEST_KEY must have no other purpose"
        ));
    }
    reject_incompatible_auth(params)
}

fn reject_device_unique(params: &[KeyParam]) -> Result<(), Error> {
    if get_bool_tag_value!(params, DeviceUniqueAttestation)? {
        return Err(km_err!(InvalidArgument, "device unique attestation not supported"));
    }
    Ok(())
}

/// Check the parameter validity for an AES key that is about to be generated or imported.
fn check_aes_params(params: &[KeyParam]) -> Result<(), Error> {
    let gcm_support = params.iter().any(|p| *p == KeyParam::BlockMode(BlockMode::Gcm));
    if gcm_support {
        let min_mac_len = get_tag_value!(params, MinMacLength, ErrorCode::MissingMinMacLength)?;
        if (min_mac_len % 8 != 0) || !(96..=128).contains(&min_mac_len) {
            return Err(km_err!(
                UnsupportedMinMacLength,
                "unsupported MIN_MAC_LENGTH {} bits",
                min_mac_len
            ));
        }
    }
    reject_incompatible_auth(params)
}

/// Check the parameter validity for an HMAC key that is about to be generated or imported.
fn check_hmac_params(params: &[KeyParam], key_size: KeySizeInBits) -> Result<(), Error> {
    hmac::valid_hal_size(key_size)?;
    let digest = get_tag_value!(params, Digest, ErrorCode::UnsupportedDigest)?;
    hmac::digest_len(digest)?;
    let min_mac_len = get_tag_value!(params, MinMacLength, ErrorCode::MissingMinMacLength)?;
    hmac::valid_min_mac_len(min_mac_len)?;
    reject_incompatible_auth(params)
}

/// Reject incompatible combinations of authentication tags.
fn reject_incompatible_auth(params: &[KeyParam]) -> Result<(), Error> {
    let mut seen_user_secure_id = false;
    let mut seen_auth_type = false;
    let mut seen_no_auth = false;

    for param in params {
        match param {
            KeyParam::UserSecureId(_sid) => seen_user_secure_id = true,
            KeyParam::UserAuthType(_atype) => seen_auth_type = true,
            KeyParam::NoAuthRequired => seen_no_auth = true,
            _ => {}
        }
    }

    if seen_no_auth && seen_user_secure_id {
        return Err(km_err!(InvalidTag, "found both NO_AUTH_REQUIRED and USER_SECURE_ID"));
    }
    if seen_user_secure_id && !seen_auth_type {
        return Err(km_err!(InvalidTag, "found USER_SECURE_ID but no USER_AUTH_TYPE"));
    }
    Ok(())
}

/// Return an error if any of the `exclude` tags are found in `params`.
fn reject_tags(params: &[KeyParam], exclude: &[Tag]) -> Result<(), Error> {
    for param in params {
        if exclude.contains(&param.tag()) {
            return Err(km_err!(InvalidTag, "tag {:?} not allowed", param.tag()));
        }
    }
    Ok(())
}

/// Check that an operation with the given `purpose` and `params` can validly be started
/// using a key with characteristics `chars`.
pub fn check_begin_params(
    chars: &[KeyParam],
    purpose: KeyPurpose,
    params: &[KeyParam],
) -> Result<(), Error> {
    let algo = get_algorithm(chars)?;
    let valid_purpose = matches!(
        (algo, purpose),
        (Algorithm::Aes, KeyPurpose::Encrypt)
            | (Algorithm::Aes, KeyPurpose::Decrypt)
            | (Algorithm::TripleDes, KeyPurpose::Encrypt)
            | (Algorithm::TripleDes, KeyPurpose::Decrypt)
            | (Algorithm::Hmac, KeyPurpose::Sign)
            | (Algorithm::Hmac, KeyPurpose::Verify)
            | (Algorithm::Ec, KeyPurpose::Sign)
            | (Algorithm::Ec, KeyPurpose::AttestKey)
            | (Algorithm::Ec, KeyPurpose::AgreeKey)
            | (Algorithm::Rsa, KeyPurpose::Sign)
            | (Algorithm::Rsa, KeyPurpose::Decrypt)
            | (Algorithm::Rsa, KeyPurpose::AttestKey)
    );
    if !valid_purpose {
        return Err(km_err!(
            UnsupportedPurpose,
            "invalid purpose {:?} for {:?} key",
            purpose,
            algo
        ));
    }
    if !contains_tag_value!(chars, Purpose, purpose) {
        return Err(km_err!(
            IncompatiblePurpose,
            "purpose {:?} not in key characteristics",
            purpose
        ));
    }
    if purpose == KeyPurpose::AttestKey {
        return Err(km_err!(IncompatiblePurpose, "attestation keys only sign certificates"));
    }
    if get_bool_tag_value!(chars, StorageKey)? {
        return Err(km_err!(StorageKeyUnsupported, "attempt to use storage key"));
    }
    let nonce = get_opt_tag_value!(params, Nonce)?;
    let caller_nonce_allowed = get_bool_tag_value!(chars, CallerNonce)?;
    if nonce.is_some() && purpose == KeyPurpose::Encrypt && !caller_nonce_allowed {
        return Err(km_err!(CallerNonceProhibited, "caller nonce not allowed for encryption"));
    }

    let bmode_to_find = get_opt_tag_value!(params, BlockMode, UnsupportedBlockMode)?;
    let pmode_to_find = get_opt_tag_value!(params, Padding, UnsupportedPaddingMode)?;
    let digest_to_find = get_opt_tag_value!(params, Digest, UnsupportedDigest)?;
    let mut mgf_digest_to_find =
        get_opt_tag_value!(params, RsaOaepMgfDigest, UnsupportedMgfDigest)?;
    let chars_have_mgf_digest = chars.iter().any(|p| matches!(p, KeyParam::RsaOaepMgfDigest(_)));
    let oaep = pmode_to_find == Some(&PaddingMode::RsaOaep);
    if chars_have_mgf_digest && oaep && mgf_digest_to_find.is_none() {
        // The default SHA-1 must then be among the key's MGF digests.
        mgf_digest_to_find = Some(&Digest::Sha1);
    }

    match algo {
        Algorithm::Rsa => check_begin_rsa_params(chars, purpose, params)?,
        Algorithm::Ec => check_begin_ec_params(purpose, params)?,
        Algorithm::Aes => check_begin_aes_params(chars, params, nonce.map(|v| v.as_ref()))?,
        Algorithm::TripleDes => check_begin_3des_params(params, nonce.map(|v| v.as_ref()))?,
        Algorithm::Hmac => check_begin_hmac_params(chars, purpose, params)?,
    }

    if let Some(bmode) = bmode_to_find {
        if !contains_tag_value!(chars, BlockMode, *bmode) {
            return Err(km_err!(
                IncompatibleBlockMode,
                "block mode {:?} not in key characteristics",
                bmode,
            ));
        }
    }
    if let Some(pmode) = pmode_to_find {
        if !contains_tag_value!(chars, Padding, *pmode) {
            return Err(km_err!(
                IncompatiblePaddingMode,
                "padding mode {:?} not in key characteristics",
                pmode,
            ));
        }
    }
    if let Some(digest) = digest_to_find {
        if !contains_tag_value!(chars, Digest, *digest) {
            return Err(km_err!(
                IncompatibleDigest,
                "digest {:?} not in key characteristics",
                digest,
            ));
        }
    }
    if let Some(mgf_digest) = mgf_digest_to_find {
        if algo == Algorithm::Rsa && !contains_tag_value!(chars, RsaOaepMgfDigest, *mgf_digest) {
            return Err(km_err!(
                IncompatibleMgfDigest,
                "MGF digest {:?} not in key characteristics",
                mgf_digest,
            ));
        }
    }
    Ok(())
}

fn for_encryption(purpose: KeyPurpose) -> bool {
    matches!(purpose, KeyPurpose::Encrypt | KeyPurpose::Decrypt | KeyPurpose::WrapKey)
}

fn check_begin_rsa_params(
    chars: &[KeyParam],
    purpose: KeyPurpose,
    params: &[KeyParam],
) -> Result<(), Error> {
    reject_tags(params, &[Tag::BlockMode])?;
    let padding = get_padding_mode(params)?;
    let signing = purpose == KeyPurpose::Sign;
    let mut digest = None;
    if signing || (for_encryption(purpose) && padding == PaddingMode::RsaOaep) {
        digest = Some(get_digest(params)?);
    }
    if signing && padding == PaddingMode::None && digest != Some(Digest::None) {
        return Err(km_err!(
            IncompatibleDigest,
            "unpadded RSA sign requires Digest::None not {:?}",
            digest
        ));
    }
    match (padding, digest) {
        (PaddingMode::None, _) => {}
        (PaddingMode::RsaOaep, digest) if for_encryption(purpose) => {
            if digest.is_none() || digest == Some(Digest::None) {
                return Err(km_err!(IncompatibleDigest, "digest required for RSA-OAEP"));
            }
            if get_mgf_digest(params)? == Digest::None {
                return Err(km_err!(
                    UnsupportedMgfDigest,
                    "MGF digest cannot be NONE for RSA-OAEP"
                ));
            }
        }
        (PaddingMode::RsaPss, Some(digest)) if signing => {
            let key_size = get_tag_value!(chars, KeySize, ErrorCode::InvalidArgument)?;
            let d = hmac::digest_len(digest)
                .map_err(|_e| km_err!(IncompatibleDigest, "digest required for RSA-PSS"))?;
            if key_size < KeySizeInBits(2 * d + 9) {
                return Err(km_err!(
                    IncompatibleDigest,
                    "key size {:?} < 2*8*D={} + 9",
                    key_size,
                    d
                ));
            }
        }
        (PaddingMode::RsaPkcs115Encrypt, digest) if for_encryption(purpose) => {
            if digest.is_some() && digest != Some(Digest::None) {
                warn!("ignoring digest {:?} provided for PKCS#1 v1.5 decryption", digest);
            }
        }
        (PaddingMode::RsaPkcs115Sign, Some(_)) if signing => {}
        _ => {
            return Err(km_err!(
                UnsupportedPaddingMode,
                "purpose {:?} incompatible with padding {:?}",
                purpose,
                padding
            ))
        }
    }
    Ok(())
}

fn check_begin_ec_params(purpose: KeyPurpose, params: &[KeyParam]) -> Result<(), Error> {
    reject_tags(params, &[Tag::BlockMode])?;
    if purpose == KeyPurpose::Sign && get_digest(params)? == Digest::Md5 {
        return Err(km_err!(UnsupportedDigest, "Digest::MD5 unsupported for EC signing"));
    }
    Ok(())
}

fn check_begin_3des_params(
    params: &[KeyParam],
    caller_nonce: Option<&[u8]>,
) -> Result<(), Error> {
    reject_tags(params, &[Tag::Digest, Tag::RsaOaepMgfDigest])?;
    let bmode = get_block_mode(params)?;
    let _padding = get_padding_mode(params)?;
    if !matches!(bmode, BlockMode::Cbc | BlockMode::Ecb) {
        return Err(km_err!(UnsupportedBlockMode, "block mode {:?} not valid for 3-DES", bmode));
    }
    if let Some(nonce) = caller_nonce {
        if bmode != BlockMode::Cbc || nonce.len() != des::BLOCK_SIZE {
            return Err(km_err!(
                InvalidNonce,
                "invalid caller nonce len {} for {:?}",
                nonce.len(),
                bmode
            ));
        }
    }
    Ok(())
}

fn check_begin_aes_params(
    chars: &[KeyParam],
    params: &[KeyParam],
    caller_nonce: Option<&[u8]>,
) -> Result<(), Error> {
    reject_tags(params, &[Tag::Digest, Tag::RsaOaepMgfDigest])?;
    let bmode = get_block_mode(params)?;
    let padding = get_padding_mode(params)?;

    if bmode == BlockMode::Gcm {
        let mac_len = get_tag_value!(params, MacLength, ErrorCode::MissingMacLength)?;
        if mac_len % 8 != 0 || mac_len > 128 {
            return Err(km_err!(UnsupportedMacLength, "invalid mac len {}", mac_len));
        }
        let min_mac_len = get_tag_value!(chars, MinMacLength, ErrorCode::MissingMinMacLength)?;
        if mac_len < min_mac_len {
            return Err(km_err!(
                InvalidMacLength,
                "mac len {} less than min {}",
                mac_len,
                min_mac_len
            ));
        }
    }
    let padding_ok = match bmode {
        BlockMode::Gcm | BlockMode::Ctr => padding == PaddingMode::None,
        BlockMode::Ecb | BlockMode::Cbc => {
            matches!(padding, PaddingMode::None | PaddingMode::Pkcs7)
        }
    };
    if !padding_ok {
        return Err(km_err!(
            IncompatiblePaddingMode,
            "padding {:?} not valid for AES {:?}",
            padding,
            bmode
        ));
    }

    if let Some(nonce) = caller_nonce {
        match bmode {
            BlockMode::Cbc | BlockMode::Ctr if nonce.len() == 16 => {}
            BlockMode::Gcm if nonce.len() == 12 => {}
            _ => {
                return Err(km_err!(
                    InvalidNonce,
                    "invalid caller nonce len {} for {:?}",
                    nonce.len(),
                    bmode
                ))
            }
        }
    }
    Ok(())
}

fn check_begin_hmac_params(
    chars: &[KeyParam],
    purpose: KeyPurpose,
    params: &[KeyParam],
) -> Result<(), Error> {
    reject_tags(params, &[Tag::BlockMode, Tag::Padding, Tag::RsaOaepMgfDigest])?;
    let digest = get_digest(params)?;
    if purpose == KeyPurpose::Sign {
        let mac_len = get_tag_value!(params, MacLength, ErrorCode::MissingMacLength)?;
        if mac_len % 8 != 0 || mac_len > hmac::digest_len(digest)? {
            return Err(km_err!(UnsupportedMacLength, "invalid mac len {}", mac_len));
        }
        let min_mac_len = get_tag_value!(chars, MinMacLength, ErrorCode::MissingMinMacLength)?;
        if mac_len < min_mac_len {
            return Err(km_err!(
                InvalidMacLength,
                "mac len {} less than min {}",
                mac_len,
                min_mac_len
            ));
        }
    }
    Ok(())
}

/// Check an RSA key is fit for unwrapping an imported key, returning the OAEP mode to use.
pub fn check_rsa_wrapping_key_params(
    chars: &[KeyParam],
    params: &[KeyParam],
) -> Result<DecryptionMode, Error> {
    if !contains_tag_value!(chars, Purpose, KeyPurpose::WrapKey) {
        return Err(km_err!(IncompatiblePurpose, "no wrap key purpose for the wrapping key"));
    }
    let padding_mode = get_tag_value!(params, Padding, ErrorCode::IncompatiblePaddingMode)?;
    if padding_mode != PaddingMode::RsaOaep {
        return Err(km_err!(
            IncompatiblePaddingMode,
            "invalid padding mode {:?} for RSA wrapping key",
            padding_mode
        ));
    }
    let msg_digest = get_tag_value!(params, Digest, ErrorCode::IncompatibleDigest)?;
    if msg_digest != Digest::Sha256 {
        return Err(km_err!(
            IncompatibleDigest,
            "invalid digest {:?} for RSA wrapping key",
            msg_digest
        ));
    }
    let opt_mgf_digest = get_opt_tag_value!(params, RsaOaepMgfDigest)?;
    if opt_mgf_digest == Some(&Digest::None) {
        return Err(km_err!(UnsupportedMgfDigest, "MGF digest cannot be NONE for RSA-OAEP"));
    }
    if !contains_tag_value!(chars, Padding, padding_mode) {
        return Err(km_err!(
            IncompatiblePaddingMode,
            "padding mode {:?} not in key characteristics",
            padding_mode,
        ));
    }
    if !contains_tag_value!(chars, Digest, msg_digest) {
        return Err(km_err!(
            IncompatibleDigest,
            "digest {:?} not in key characteristics",
            msg_digest,
        ));
    }
    if let Some(mgf_digest) = opt_mgf_digest {
        if !contains_tag_value!(chars, RsaOaepMgfDigest, *mgf_digest) {
            return Err(km_err!(
                IncompatibleMgfDigest,
                "MGF digest {:?} not in key characteristics",
                mgf_digest,
            ));
        }
    }
    let mgf_digest = *opt_mgf_digest.unwrap_or(&Digest::Sha1);
    Ok(DecryptionMode::OaepPadding { msg_digest, mgf_digest })
}
