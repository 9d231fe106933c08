//! Generation of certificates and attestation extensions, and parsing of securely wrapped keys.

use crate::AttestationIds;
use alloc::vec::Vec;
use core::time::Duration;
use der::{
    asn1::{BitString, GeneralizedTime, Null, OctetString, OctetStringRef, SetOfVec, UtcTime},
    oid::AssociatedOid,
    Decode, DecodeValue, Encode, EncodeValue, Enumerated, ErrorKind, FixedTag, Header, Length,
    Reader, Sequence, SliceReader, Writer,
};
use flagset::FlagSet;
use senv_common::{
    crypto::{self, KeyMaterial},
    get_tag_value, km_err, tag, Error, FallibleAllocExt,
};
use senv_wire::{
    authset::{self, Value},
    keymint::{
        self, raw_tag_value, tag_from_raw, tag_type, BootInfo, ErrorCode, KeyParam, KeyPurpose,
        Tag, TagType,
    },
};
use spki::{AlgorithmIdentifierOwned, ObjectIdentifier, SubjectPublicKeyInfoOwned};
use x509_cert::{
    certificate::{Certificate, TbsCertificate, Version},
    ext::{
        pkix::{BasicConstraints, KeyUsage, KeyUsages},
        Extension,
    },
    name::Name,
    serial_number::SerialNumber,
    time::{Time, Validity},
};

#[cfg(test)]
mod tests;

/// Attestation and KeyMint version reported in attestation extensions.
pub const KEYMINT_V2_VERSION: i32 = 200;

/// OID value for the Android Attestation extension.
pub const ATTESTATION_EXTENSION_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.11129.2.1.17");

/// Key that signs a certificate, and the name it issues under.
pub(crate) struct SigningInfo<'a> {
    pub issuer_subject: &'a [u8],
    pub signing_key: KeyMaterial,
}

/// OID of the signature algorithm used with a signing key.
pub(crate) fn signature_oid(key: &KeyMaterial) -> Result<ObjectIdentifier, Error> {
    match key {
        KeyMaterial::Rsa(_) => Ok(crypto::rsa::SHA256_PKCS1_SIGNATURE_OID),
        KeyMaterial::Ec(_) => Ok(crypto::ec::ECDSA_SHA256_SIGNATURE_OID),
        _ => Err(km_err!(UnknownError, "unexpected cert signing key type")),
    }
}

/// Build an ASN.1 DER-encodable `Certificate`.
pub(crate) fn certificate(tbs_cert: TbsCertificate, sig_val: &[u8]) -> Result<Certificate, Error> {
    Ok(Certificate {
        signature_algorithm: tbs_cert.signature.clone(),
        tbs_certificate: tbs_cert,
        signature: BitString::from_bytes(sig_val)?,
    })
}

/// Build an ASN.1 DER-encodable `tbsCertificate`. Without `info` the certificate is issued
/// under its own subject, with `sig_alg_oid` naming the algorithm of the (absent) signature.
pub(crate) fn tbs_certificate(
    info: Option<&SigningInfo>,
    sig_alg_oid: ObjectIdentifier,
    spki: SubjectPublicKeyInfoOwned,
    key_usage: KeyUsage,
    basic_constraints: Option<BasicConstraints>,
    attestation_ext: Option<Vec<u8>>,
    params: &[KeyParam],
) -> Result<TbsCertificate, Error> {
    let cert_serial = tag::get_cert_serial(params)?;
    let cert_subject = tag::get_cert_subject(params)?;
    let not_before = get_tag_value!(params, CertificateNotBefore, ErrorCode::MissingNotBefore)?;
    let not_after = get_tag_value!(params, CertificateNotAfter, ErrorCode::MissingNotAfter)?;
    let cert_issuer = match info {
        Some(info) => info.issuer_subject,
        None => cert_subject,
    };

    let mut extensions = Vec::new();
    extensions.try_push(Extension {
        extn_id: KeyUsage::OID,
        critical: true,
        extn_value: OctetString::new(key_usage.to_der()?)?,
    })?;
    if let Some(basic_constraints) = basic_constraints {
        extensions.try_push(Extension {
            extn_id: BasicConstraints::OID,
            critical: true,
            extn_value: OctetString::new(basic_constraints.to_der()?)?,
        })?;
    }
    if let Some(attest_ext) = attestation_ext {
        extensions.try_push(Extension {
            extn_id: AttestationExtension::OID,
            critical: false,
            extn_value: OctetString::new(attest_ext)?,
        })?;
    }

    Ok(TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(cert_serial)?,
        signature: AlgorithmIdentifierOwned { oid: sig_alg_oid, parameters: None },
        issuer: Name::from_der(cert_issuer)?,
        validity: Validity {
            not_before: validity_time(not_before)?,
            not_after: validity_time(not_after)?,
        },
        subject: Name::from_der(cert_subject)?,
        subject_public_key_info: spki,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(extensions),
    })
}

/// Extract the DER-encoded Subject of a DER-encoded certificate.
pub(crate) fn extract_subject(cert: &[u8]) -> Result<Vec<u8>, Error> {
    let cert = Certificate::from_der(cert)
        .map_err(|e| km_err!(UnknownError, "failed to parse certificate: {:?}", e))?;
    cert.tbs_certificate
        .subject
        .to_der()
        .map_err(|e| km_err!(UnknownError, "failed to DER-encode subject: {:?}", e))
}

/// RFC 5280 s4.1.2.5: UtcTime up to 2049, GeneralizedTime from 2050 onwards.
fn validity_time(when: keymint::DateTime) -> Result<Time, Error> {
    const MAX_UTC_TIME: Duration = Duration::from_secs(2524608000); // 2050-01-01T00:00:00Z
    let ms = u64::try_from(when.ms_since_epoch)
        .map_err(|_| Error::Der(ErrorKind::DateTime.into()))?;
    let duration = Duration::from_millis(ms);
    if duration >= MAX_UTC_TIME {
        Ok(Time::GeneralTime(GeneralizedTime::from_unix_duration(duration)?))
    } else {
        Ok(Time::UtcTime(UtcTime::from_unix_duration(duration)?))
    }
}

/// Key usage bits for the purposes a key allows.
pub(crate) fn key_usage_extension_bits(params: &[KeyParam]) -> KeyUsage {
    let mut key_usage_bits = FlagSet::<KeyUsages>::default();
    for param in params {
        if let KeyParam::Purpose(purpose) = param {
            match purpose {
                KeyPurpose::Sign => key_usage_bits |= KeyUsages::DigitalSignature,
                KeyPurpose::Decrypt => key_usage_bits |= KeyUsages::DataEncipherment,
                KeyPurpose::WrapKey => key_usage_bits |= KeyUsages::KeyEncipherment,
                KeyPurpose::AgreeKey => key_usage_bits |= KeyUsages::KeyAgreement,
                KeyPurpose::AttestKey => key_usage_bits |= KeyUsages::KeyCertSign,
                KeyPurpose::Encrypt | KeyPurpose::Verify => {}
            }
        }
    }
    KeyUsage(key_usage_bits)
}

/// Attestation extension contents
///
/// ```asn1
/// KeyDescription ::= SEQUENCE {
///     attestationVersion         INTEGER, # Value 200
///     attestationSecurityLevel   SecurityLevel,
///     keyMintVersion             INTEGER, # Value 200
///     keymintSecurityLevel       SecurityLevel,
///     attestationChallenge       OCTET_STRING,
///     uniqueId                   OCTET_STRING,
///     softwareEnforced           AuthorizationList,
///     hardwareEnforced           AuthorizationList,
/// }
/// ```
#[derive(Debug, Clone, Sequence)]
pub struct AttestationExtension<'a> {
    pub attestation_version: i32,
    pub attestation_security_level: SecurityLevel,
    pub keymint_version: i32,
    pub keymint_security_level: SecurityLevel,
    pub attestation_challenge: OctetStringRef<'a>,
    pub unique_id: OctetStringRef<'a>,
    pub sw_enforced: AuthorizationList,
    pub hw_enforced: AuthorizationList,
}

impl<'a> AssociatedOid for AttestationExtension<'a> {
    const OID: ObjectIdentifier = ATTESTATION_EXTENSION_OID;
}

/// ```asn1
/// SecurityLevel ::= ENUMERATED {
///     Software                   (0),
///     TrustedEnvironment         (1),
///     StrongBox                  (2),
/// }
/// ```
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enumerated)]
pub enum SecurityLevel {
    Software = 0,
    TrustedEnvironment = 1,
    Strongbox = 2,
}

impl TryFrom<keymint::SecurityLevel> for SecurityLevel {
    type Error = Error;
    fn try_from(level: keymint::SecurityLevel) -> Result<Self, Error> {
        match level {
            keymint::SecurityLevel::Software => Ok(SecurityLevel::Software),
            keymint::SecurityLevel::TrustedEnvironment => Ok(SecurityLevel::TrustedEnvironment),
            keymint::SecurityLevel::Strongbox => Ok(SecurityLevel::Strongbox),
            l => Err(km_err!(UnknownError, "invalid security level {:?}", l)),
        }
    }
}

/// Inputs to an attestation extension that are not key characteristics.
pub(crate) struct AttestationInfo<'a> {
    pub challenge: &'a [u8],
    pub app_id: &'a [u8],
    pub unique_id: &'a [u8],
    /// Attestation ID parameters, already checked against the provisioned values.
    pub attestation_ids: &'a [KeyParam],
    pub boot_info: Option<&'a BootInfo>,
}

/// Build the DER-encoded attestation extension for a key with the given characteristics.
pub(crate) fn attestation_extension(
    security_level: keymint::SecurityLevel,
    hw_enforced: &[KeyParam],
    sw_enforced: &[KeyParam],
    info: &AttestationInfo,
) -> Result<Vec<u8>, Error> {
    let sec_level = SecurityLevel::try_from(security_level)?;
    let ext = AttestationExtension {
        attestation_version: KEYMINT_V2_VERSION,
        attestation_security_level: sec_level,
        keymint_version: KEYMINT_V2_VERSION,
        keymint_security_level: sec_level,
        attestation_challenge: OctetStringRef::new(info.challenge)?,
        unique_id: OctetStringRef::new(info.unique_id)?,
        sw_enforced: AuthorizationList::new(sw_enforced, &[], None, Some(info.app_id))?,
        hw_enforced: AuthorizationList::new(
            hw_enforced,
            info.attestation_ids,
            info.boot_info,
            None,
        )?,
    };
    Ok(ext.to_der()?)
}

/// Check requested attestation IDs against the provisioned values, returning the ID
/// parameters to attest to.
pub(crate) fn check_attestation_ids(
    params: &[KeyParam],
    provisioned: Option<&AttestationIds>,
) -> Result<Vec<KeyParam>, Error> {
    let mut ids = Vec::new();
    for param in params {
        let (requested, want) = match param {
            KeyParam::AttestationIdBrand(v) => (v, provisioned.map(|p| &p.brand)),
            KeyParam::AttestationIdDevice(v) => (v, provisioned.map(|p| &p.device)),
            KeyParam::AttestationIdProduct(v) => (v, provisioned.map(|p| &p.product)),
            KeyParam::AttestationIdSerial(v) => (v, provisioned.map(|p| &p.serial)),
            KeyParam::AttestationIdImei(v) => (v, provisioned.map(|p| &p.imei)),
            KeyParam::AttestationIdSecondImei(v) => (v, provisioned.map(|p| &p.second_imei)),
            KeyParam::AttestationIdMeid(v) => (v, provisioned.map(|p| &p.meid)),
            KeyParam::AttestationIdManufacturer(v) => (v, provisioned.map(|p| &p.manufacturer)),
            KeyParam::AttestationIdModel(v) => (v, provisioned.map(|p| &p.model)),
            _ => continue,
        };
        match want {
            None => {
                return Err(km_err!(AttestationIdsNotProvisioned, "no attestation IDs provisioned"))
            }
            Some(want) if want.is_empty() || want != requested => {
                return Err(km_err!(
                    CannotAttestIds,
                    "attestation ID mismatch for {:?}",
                    param.tag()
                ))
            }
            Some(_) => ids.try_push(param.clone())?,
        }
    }
    Ok(ids)
}

/// Tags that appear in an `AuthorizationList`, in encoding order.
///
/// ```asn1
/// AuthorizationList ::= SEQUENCE {
///     purpose                    [1] EXPLICIT SET OF INTEGER OPTIONAL,
///     algorithm                  [2] EXPLICIT INTEGER OPTIONAL,
///     keySize                    [3] EXPLICIT INTEGER OPTIONAL,
///     blockMode                  [4] EXPLICIT SET OF INTEGER OPTIONAL,
///     digest                     [5] EXPLICIT SET OF INTEGER OPTIONAL,
///     padding                    [6] EXPLICIT SET OF INTEGER OPTIONAL,
///     callerNonce                [7] EXPLICIT NULL OPTIONAL,
///     minMacLength               [8] EXPLICIT INTEGER OPTIONAL,
///     ecCurve                    [10] EXPLICIT INTEGER OPTIONAL,
///     rsaPublicExponent          [200] EXPLICIT INTEGER OPTIONAL,
///     mgfDigest                  [203] EXPLICIT SET OF INTEGER OPTIONAL,
///     rollbackResistance         [303] EXPLICIT NULL OPTIONAL,
///     earlyBootOnly              [305] EXPLICIT NULL OPTIONAL,
///     activeDateTime             [400] EXPLICIT INTEGER OPTIONAL,
///     originationExpireDateTime  [401] EXPLICIT INTEGER OPTIONAL,
///     usageExpireDateTime        [402] EXPLICIT INTEGER OPTIONAL,
///     usageCountLimit            [405] EXPLICIT INTEGER OPTIONAL,
///     userSecureId               [502] EXPLICIT INTEGER OPTIONAL,
///     noAuthRequired             [503] EXPLICIT NULL OPTIONAL,
///     userAuthType               [504] EXPLICIT INTEGER OPTIONAL,
///     authTimeout                [505] EXPLICIT INTEGER OPTIONAL,
///     allowWhileOnBody           [506] EXPLICIT NULL OPTIONAL,
///     trustedUserPresenceReq     [507] EXPLICIT NULL OPTIONAL,
///     trustedConfirmationReq     [508] EXPLICIT NULL OPTIONAL,
///     unlockedDeviceReq          [509] EXPLICIT NULL OPTIONAL,
///     creationDateTime           [701] EXPLICIT INTEGER OPTIONAL,
///     origin                     [702] EXPLICIT INTEGER OPTIONAL,
///     rootOfTrust                [704] EXPLICIT RootOfTrust OPTIONAL,
///     osVersion                  [705] EXPLICIT INTEGER OPTIONAL,
///     osPatchLevel               [706] EXPLICIT INTEGER OPTIONAL,
///     attestationApplicationId   [709] EXPLICIT OCTET_STRING OPTIONAL,
///     attestationIdBrand         [710] EXPLICIT OCTET_STRING OPTIONAL,
///     attestationIdDevice        [711] EXPLICIT OCTET_STRING OPTIONAL,
///     attestationIdProduct       [712] EXPLICIT OCTET_STRING OPTIONAL,
///     attestationIdSerial        [713] EXPLICIT OCTET_STRING OPTIONAL,
///     attestationIdImei          [714] EXPLICIT OCTET_STRING OPTIONAL,
///     attestationIdMeid          [715] EXPLICIT OCTET_STRING OPTIONAL,
///     attestationIdManufacturer  [716] EXPLICIT OCTET_STRING OPTIONAL,
///     attestationIdModel         [717] EXPLICIT OCTET_STRING OPTIONAL,
///     vendorPatchLevel           [718] EXPLICIT INTEGER OPTIONAL,
///     bootPatchLevel             [719] EXPLICIT INTEGER OPTIONAL,
///     deviceUniqueAttestation    [720] EXPLICIT NULL OPTIONAL,
///     attestationIdSecondImei    [723] EXPLICIT OCTET_STRING OPTIONAL,
/// }
/// ```
const AUTHORIZATION_LIST_TAGS: &[Tag] = &[
    Tag::Purpose,
    Tag::Algorithm,
    Tag::KeySize,
    Tag::BlockMode,
    Tag::Digest,
    Tag::Padding,
    Tag::CallerNonce,
    Tag::MinMacLength,
    Tag::EcCurve,
    Tag::RsaPublicExponent,
    Tag::RsaOaepMgfDigest,
    Tag::RollbackResistance,
    Tag::EarlyBootOnly,
    Tag::ActiveDatetime,
    Tag::OriginationExpireDatetime,
    Tag::UsageExpireDatetime,
    Tag::UsageCountLimit,
    Tag::UserSecureId,
    Tag::NoAuthRequired,
    Tag::UserAuthType,
    Tag::AuthTimeout,
    Tag::AllowWhileOnBody,
    Tag::TrustedUserPresenceRequired,
    Tag::TrustedConfirmationRequired,
    Tag::UnlockedDeviceRequired,
    Tag::CreationDatetime,
    Tag::Origin,
    Tag::RootOfTrust,
    Tag::OsVersion,
    Tag::OsPatchlevel,
    Tag::AttestationApplicationId,
    Tag::AttestationIdBrand,
    Tag::AttestationIdDevice,
    Tag::AttestationIdProduct,
    Tag::AttestationIdSerial,
    Tag::AttestationIdImei,
    Tag::AttestationIdMeid,
    Tag::AttestationIdManufacturer,
    Tag::AttestationIdModel,
    Tag::VendorPatchlevel,
    Tag::BootPatchlevel,
    Tag::DeviceUniqueAttestation,
    Tag::AttestationIdSecondImei,
];

/// DER contents of an `AuthorizationList` SEQUENCE.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorizationList(Vec<u8>);

impl AuthorizationList {
    /// Encode the attestable parameters among `auths` and `attestation_ids`, along with the
    /// root of trust and attestation application ID when given.
    pub(crate) fn new(
        auths: &[KeyParam],
        attestation_ids: &[KeyParam],
        boot_info: Option<&BootInfo>,
        app_id: Option<&[u8]>,
    ) -> Result<Self, Error> {
        let mut contents = Vec::new();
        for &tag in AUTHORIZATION_LIST_TAGS {
            let raw_tag = raw_tag_value(tag);
            let encoded = match tag {
                Tag::RootOfTrust => match boot_info {
                    Some(info) => Some(
                        ExplicitTaggedValue { tag: raw_tag, val: RootOfTrust::try_from(info)? }
                            .to_der()?,
                    ),
                    None => None,
                },
                Tag::AttestationApplicationId => match app_id {
                    Some(id) => Some(
                        ExplicitTaggedValue { tag: raw_tag, val: OctetStringRef::new(id)? }
                            .to_der()?,
                    ),
                    None => None,
                },
                _ => {
                    let values: Vec<Value> = auths
                        .iter()
                        .chain(attestation_ids.iter())
                        .filter(|p| p.tag() == tag)
                        .map(authset::value_of)
                        .collect();
                    encode_values(tag, &values)?
                }
            };
            if let Some(encoded) = encoded {
                contents.try_extend_from_slice(&encoded)?;
            }
        }
        Ok(Self(contents))
    }

    /// Decode the contents back into key parameters.
    pub(crate) fn params(&self) -> Result<Vec<KeyParam>, Error> {
        let mut params = Vec::new();
        let mut reader = SliceReader::new(&self.0)?;
        while !reader.is_finished() {
            let raw_tag = read_explicit_tag(&mut reader)?;
            let len = Length::decode(&mut reader)?;
            let inner = reader.read_slice(len)?;
            let tag = tag_from_raw(raw_tag).ok_or_else(|| {
                km_err!(InvalidTag, "unknown tag {} in AuthorizationList", raw_tag)
            })?;
            match tag_type(tag) {
                TagType::EnumRep | TagType::UintRep | TagType::UlongRep => {
                    let mut set = SliceReader::new(inner)?;
                    let header = Header::decode(&mut set)?;
                    if header.tag != der::Tag::Set {
                        return Err(km_err!(InvalidArgument, "{:?} is not a SET OF", tag));
                    }
                    let mut items = SliceReader::new(set.read_slice(header.length)?)?;
                    while !items.is_finished() {
                        let val = u64::decode(&mut items)?;
                        params.try_push(authset::param_from(tag, int_value(tag, val)?)?)?;
                    }
                }
                TagType::Enum | TagType::Uint | TagType::Ulong | TagType::Date => {
                    let val = u64::from_der(inner)?;
                    params.try_push(authset::param_from(tag, int_value(tag, val)?)?)?;
                }
                TagType::Bool => {
                    Null::from_der(inner)?;
                    params.try_push(authset::param_from(tag, Value::True)?)?;
                }
                TagType::Bytes | TagType::Bignum if tag != Tag::RootOfTrust => {
                    let val = OctetStringRef::from_der(inner)?;
                    params.try_push(authset::param_from(tag, Value::Bytes(val.as_bytes()))?)?;
                }
                _ => return Err(km_err!(InvalidTag, "unexpected {:?} in AuthorizationList", tag)),
            }
        }
        Ok(params)
    }
}

impl FixedTag for AuthorizationList {
    const TAG: der::Tag = der::Tag::Sequence;
}

impl EncodeValue for AuthorizationList {
    fn value_len(&self) -> der::Result<Length> {
        Length::try_from(self.0.len())
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        writer.write(&self.0)
    }
}

impl<'a> DecodeValue<'a> for AuthorizationList {
    fn decode_value<R: Reader<'a>>(reader: &mut R, header: Header) -> der::Result<Self> {
        Ok(Self(reader.read_vec(header.length)?))
    }
}

/// Encode the values of one tag as an explicitly tagged element.
fn encode_values(tag: Tag, values: &[Value]) -> Result<Option<Vec<u8>>, Error> {
    if values.is_empty() {
        return Ok(None);
    }
    let tag_num = raw_tag_value(tag);
    let encoded = match tag_type(tag) {
        TagType::EnumRep | TagType::UintRep | TagType::UlongRep => {
            let mut ints = Vec::new();
            for value in values {
                ints.try_push(value_as_u64(tag, value)?)?;
            }
            ints.sort_unstable();
            ints.dedup();
            ExplicitTaggedValue { tag: tag_num, val: SetOfVec::try_from(ints)? }.to_der()?
        }
        TagType::Enum | TagType::Uint | TagType::Ulong | TagType::Date => {
            ExplicitTaggedValue { tag: tag_num, val: value_as_u64(tag, &values[0])? }.to_der()?
        }
        TagType::Bool => ExplicitTaggedValue { tag: tag_num, val: Null }.to_der()?,
        TagType::Bytes | TagType::Bignum => match &values[0] {
            Value::Bytes(b) => {
                ExplicitTaggedValue { tag: tag_num, val: OctetStringRef::new(b)? }.to_der()?
            }
            _ => return Err(km_err!(InvalidTag, "non-bytes value for {:?}", tag)),
        },
        TagType::Invalid => return Err(km_err!(InvalidTag, "invalid tag {:?}", tag)),
    };
    Ok(Some(encoded))
}

fn value_as_u64(tag: Tag, value: &Value) -> Result<u64, Error> {
    match value {
        Value::Int(i) => Ok(*i as u64),
        Value::Long(l) => Ok(*l),
        _ => Err(km_err!(InvalidTag, "non-integer value for {:?}", tag)),
    }
}

fn int_value(tag: Tag, val: u64) -> Result<Value<'static>, Error> {
    match tag_type(tag) {
        TagType::Ulong | TagType::UlongRep | TagType::Date => Ok(Value::Long(val)),
        _ => u32::try_from(val)
            .map(Value::Int)
            .map_err(|_| km_err!(InvalidArgument, "value {} out of range for {:?}", val, tag)),
    }
}

/// Read the identifier octets of a context-specific constructed element, returning its tag
/// number.
fn read_explicit_tag<'a>(reader: &mut impl Reader<'a>) -> Result<u32, Error> {
    let first = reader.read_byte()?;
    if first & 0b1110_0000 != 0b1010_0000 {
        return Err(km_err!(InvalidArgument, "unexpected identifier {:#04x}", first));
    }
    if first & 0b0001_1111 != 0b0001_1111 {
        return Ok((first & 0b0001_1111) as u32);
    }
    let mut tag = 0u32;
    for _ in 0..4 {
        let byte = reader.read_byte()?;
        tag = (tag << 7) | (byte & 0x7f) as u32;
        if byte & 0x80 == 0 {
            return Ok(tag);
        }
    }
    Err(km_err!(InvalidArgument, "tag number too long"))
}

/// The der library does not support `TagNumber` values bigger than 30, which are required here,
/// so the explicit tag is encoded by hand.
struct ExplicitTaggedValue<T: Encode> {
    pub tag: u32,
    pub val: T,
}

impl<T: Encode> ExplicitTaggedValue<T> {
    fn explicit_tag_len(&self) -> der::Result<Length> {
        match self.tag {
            0..=0x1e => Ok(Length::ONE),
            0x1f..=0x7f => Ok(Length::new(2)),
            0x80..=0x3fff => Ok(Length::new(3)),
            _ => Err(ErrorKind::Overflow.into()),
        }
    }

    fn explicit_tag_encode(&self, encoder: &mut impl Writer) -> der::Result<()> {
        match self.tag {
            // b101vvvvv is context-specific+constructed
            0..=0x1e => encoder.write_byte(0b10100000u8 | (self.tag as u8)),
            // b101 11111 indicates a context-specific+constructed long-form tag number
            0x1f..=0x7f => {
                encoder.write_byte(0b10111111)?;
                encoder.write_byte(self.tag as u8)
            }
            0x80..=0x3fff => {
                encoder.write_byte(0b10111111)?;
                encoder.write_byte((self.tag >> 7) as u8 | 0x80u8)?;
                encoder.write_byte((self.tag & 0x007f) as u8)
            }
            _ => Err(ErrorKind::Overflow.into()),
        }
    }
}

impl<T: Encode> Encode for ExplicitTaggedValue<T> {
    fn encoded_len(&self) -> der::Result<Length> {
        let inner_len = self.val.encoded_len()?;
        self.explicit_tag_len() + inner_len.encoded_len()? + inner_len
    }

    fn encode(&self, encoder: &mut impl Writer) -> der::Result<()> {
        let inner_len = self.val.encoded_len()?;
        self.explicit_tag_encode(encoder)?;
        inner_len.encode(encoder)?;
        self.val.encode(encoder)
    }
}

/// ```asn1
/// RootOfTrust ::= SEQUENCE {
///     verifiedBootKey            OCTET_STRING,
///     deviceLocked               BOOLEAN,
///     verifiedBootState          VerifiedBootState,
///     verifiedBootHash           OCTET_STRING,
/// }
/// ```
#[derive(Debug, Clone, Sequence)]
struct RootOfTrust<'a> {
    verified_boot_key: OctetStringRef<'a>,
    device_locked: bool,
    verified_boot_state: VerifiedBootState,
    verified_boot_hash: OctetStringRef<'a>,
}

impl<'a> TryFrom<&'a BootInfo> for RootOfTrust<'a> {
    type Error = Error;
    fn try_from(info: &'a BootInfo) -> Result<Self, Error> {
        Ok(RootOfTrust {
            verified_boot_key: OctetStringRef::new(&info.verified_boot_key)?,
            device_locked: info.device_boot_locked,
            verified_boot_state: info.verified_boot_state.into(),
            verified_boot_hash: OctetStringRef::new(&info.verified_boot_hash)?,
        })
    }
}

/// ```asn1
/// VerifiedBootState ::= ENUMERATED {
///     Verified                   (0),
///     SelfSigned                 (1),
///     Unverified                 (2),
///     Failed                     (3),
/// }
/// ```
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enumerated)]
enum VerifiedBootState {
    Verified = 0,
    SelfSigned = 1,
    Unverified = 2,
    Failed = 3,
}

impl From<keymint::VerifiedBootState> for VerifiedBootState {
    fn from(state: keymint::VerifiedBootState) -> VerifiedBootState {
        match state {
            keymint::VerifiedBootState::Verified => VerifiedBootState::Verified,
            keymint::VerifiedBootState::SelfSigned => VerifiedBootState::SelfSigned,
            keymint::VerifiedBootState::Unverified => VerifiedBootState::Unverified,
            keymint::VerifiedBootState::Failed => VerifiedBootState::Failed,
        }
    }
}

/// Version of the [`SecureKeyWrapper`] format that can be imported.
pub(crate) const SECURE_KEY_WRAPPER_VERSION: i32 = 0;

/// ```asn1
/// SecureKeyWrapper ::= SEQUENCE {
///     version                    INTEGER, # Value 0
///     encryptedTransportKey      OCTET_STRING,
///     initializationVector       OCTET_STRING,
///     keyDescription             KeyDescription,
///     encryptedKey               OCTET_STRING,
///     tag                        OCTET_STRING
/// }
/// ```
#[derive(Debug, Clone, Sequence)]
pub struct SecureKeyWrapper<'a> {
    pub version: i32,
    pub encrypted_transport_key: OctetStringRef<'a>,
    pub initialization_vector: OctetStringRef<'a>,
    pub key_description: KeyDescription,
    pub encrypted_key: OctetStringRef<'a>,
    pub tag: OctetStringRef<'a>,
}

/// ```asn1
/// KeyDescription ::= SEQUENCE {
///     keyFormat                  INTEGER, # Values from KeyFormat enum.
///     keyParams                  AuthorizationList,
/// }
/// ```
#[derive(Debug, Clone, Sequence)]
pub struct KeyDescription {
    pub key_format: i32,
    pub key_params: AuthorizationList,
}
