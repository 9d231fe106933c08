//! Functionality for remote key provisioning, and the MAC-ed root of trust.

use crate::KeyMintTa;
use alloc::{
    boxed::Box,
    string::{String, ToString},
    vec,
    vec::Vec,
};
use coset::{
    cbor::value::Value, iana, AsCborValue, CborSerializable, CoseKey, CoseMac0, CoseMac0Builder,
    CoseSign1Builder, HeaderBuilder, Label,
};
use der::{asn1::UintRef, Decode, Sequence};
use senv_common::{
    crypto::{
        ec::{self, RKP_TEST_KEY_CBOR_MARKER},
        DeviceKey, KeyMaterial,
    },
    keyblob::SlotPurpose,
    km_err, vec_try, Error, FallibleAllocExt,
};
use senv_wire::{
    keymint::{
        Algorithm, DateTime, Digest, EcCurve, KeyOrigin, KeyParam, KeyPurpose, KeySizeInBits,
        SecurityLevel, VerifiedBootState,
    },
    legacy::GenerateCsrResponse,
};
use log::info;


/// Version of the remote provisioning interface whose CSR format is produced.
pub const IRPC_V3: i32 = 3;

/// Version of the `AuthenticatedRequest` schema.
pub const AUTH_REQ_SCHEMA_V1: i32 = 1;

/// Certificate type named in a `CsrPayload`.
pub const CERT_TYPE_KEYMINT: &str = "keymint";

/// CBOR tag wrapping a `RootOfTrust` array.
pub const ROOT_OF_TRUST_CBOR_TAG: u64 = 40001;

/// Size of the challenge that a root of trust is bound to.
pub const ROOT_OF_TRUST_CHALLENGE_LEN: usize = 16;

/// Largest challenge accepted in a certificate request.
pub const MAX_CSR_CHALLENGE_LEN: usize = 64;

/// CWT claim holding the subject public key of a DICE chain entry.
const DICE_SUBJECT_PUBLIC_KEY: i64 = -4670552;

/// CWT claim holding the key usage of a DICE chain entry.
const DICE_KEY_USAGE: i64 = -4670553;

/// Key usage bits of a DICE chain entry: keyCertSign.
const DICE_KEY_USAGE_CERT_SIGN: u8 = 0x20;

pub(crate) const RPC_P256_KEYGEN_PARAMS: [KeyParam; 8] = [
    KeyParam::Purpose(KeyPurpose::AttestKey),
    KeyParam::Algorithm(Algorithm::Ec),
    KeyParam::KeySize(KeySizeInBits(256)),
    KeyParam::EcCurve(EcCurve::P256),
    KeyParam::NoAuthRequired,
    KeyParam::Digest(Digest::Sha256),
    KeyParam::CertificateNotBefore(DateTime { ms_since_epoch: 0 }),
    KeyParam::CertificateNotAfter(DateTime { ms_since_epoch: 253402300799000 }),
];

impl KeyMintTa {
    /// Generate a P-256 attestation key for remote provisioning, returning its key blob and its
    /// public key as a `MacedPublicKey`.
    pub(crate) fn generate_rkp_key(
        &mut self,
        test_mode: bool,
    ) -> Result<(Vec<u8>, Vec<u8>), Error> {
        let material = self.imp.ec.generate_nist_key(&mut *self.imp.rng, ec::NistCurve::P256)?;
        let KeyMaterial::Ec(key) = &material else {
            return Err(km_err!(UnknownError, "EC generation gave other key"));
        };
        let pub_cose_key = key.public_cose_key(test_mode)?.to_vec()?;
        let maced_pub_key = build_maced_pub_key(pub_cose_key, |data| {
            self.dev.keys.hmac(DeviceKey::RkpMac, data)
        })?;

        let (keyblobs, secrets) = self.dev.sealing();
        let created = keyblobs.create(
            &RPC_P256_KEYGEN_PARAMS,
            KeyOrigin::Generated,
            material.raw(),
            secrets,
            &mut *self.imp.rng,
            SlotPurpose::KeyGeneration,
        )?;
        info!("generated RKP key, test mode {}", test_mode);
        Ok((created.blob, maced_pub_key))
    }

    /// The first version of certificate requests, with protected data encrypted to an endpoint
    /// key, is not offered.
    pub(crate) fn generate_cert_req(
        &self,
        _test_mode: bool,
        _keys_to_sign: &[Vec<u8>],
        _eek_chain: &[u8],
        _challenge: &[u8],
    ) -> Result<GenerateCsrResponse, Error> {
        Err(km_err!(Unimplemented, "GenerateCsr not supported, use GenerateCsrV2"))
    }

    /// Build an `AuthenticatedRequest<CsrPayload>` for the given `MacedPublicKey`s.
    pub(crate) fn generate_cert_req_v2(
        &mut self,
        keys_to_sign: &[Vec<u8>],
        challenge: &[u8],
    ) -> Result<Vec<u8>, Error> {
        if challenge.len() > MAX_CSR_CHALLENGE_LEN {
            return Err(km_err!(
                InvalidArgument,
                "challenge of {} bytes exceeds {}",
                challenge.len(),
                MAX_CSR_CHALLENGE_LEN
            ));
        }
        // Validate each MAC and extract the public keys to sign.
        let mut pub_cose_keys: Vec<Value> = Vec::new();
        for maced_pub_key in keys_to_sign {
            let cose_mac0 = CoseMac0::from_slice(maced_pub_key)?;
            cose_mac0.verify_tag(&[], |expected_tag, data| -> Result<(), Error> {
                if self.verify_device_key_hmac(DeviceKey::RkpMac, data, expected_tag)? {
                    Ok(())
                } else {
                    Err(km_err!(InvalidArgument, "invalid tag found in a MacedPublicKey"))
                }
            })?;
            let payload = cose_mac0
                .payload
                .ok_or_else(|| km_err!(InvalidArgument, "no payload found in a MacedPublicKey"))?;
            let pub_cose_key = CoseKey::from_slice(&payload)?;
            let test_marker = Label::Int(RKP_TEST_KEY_CBOR_MARKER);
            if pub_cose_key.params.iter().any(|(label, _)| *label == test_marker) {
                return Err(km_err!(InvalidArgument, "test mode key in certificate request"));
            }
            pub_cose_keys.try_push(pub_cose_key.to_cbor_value()?)?;
        }

        let csr_payload = Value::Array(vec![
            Value::Integer(IRPC_V3.into()),
            Value::Text(String::from(CERT_TYPE_KEYMINT)),
            self.rpc_device_info()?,
            Value::Array(pub_cose_keys),
        ]);
        let csr_payload_data = serialize_cbor(&csr_payload)?;
        let signed_data_payload = Value::Array(vec_try![
            Value::Bytes(challenge.to_vec()),
            Value::Bytes(csr_payload_data),
        ]?);
        let signed_data_payload_data = serialize_cbor(&signed_data_payload)?;

        let uds_key = self.rkp_uds_key()?;
        let uds_pub_key = uds_key.public_cose_key(false)?;
        let dice_chain = Value::Array(vec_try![
            uds_pub_key.clone().to_cbor_value()?,
            self.dice_chain_entry(&uds_key, &uds_pub_key)?,
        ]?);

        let protected = HeaderBuilder::new().algorithm(iana::Algorithm::ES256).build();
        let signed_data = CoseSign1Builder::new()
            .protected(protected)
            .payload(signed_data_payload_data)
            .try_create_signature(&[], |input| self.rkp_sign(&uds_key, input))?
            .build();

        let authn_req = Value::Array(vec![
            Value::Integer(AUTH_REQ_SCHEMA_V1.into()),
            Value::Map(Vec::new()),
            dice_chain,
            signed_data.to_cbor_value()?,
        ]);
        serialize_cbor(&authn_req)
    }

    /// Build the COSE_Mac0-wrapped `RootOfTrust` for the given challenge, authenticated with
    /// the negotiated shared key.
    pub(crate) fn get_root_of_trust(&self, challenge: &[u8]) -> Result<Vec<u8>, Error> {
        if challenge.len() != ROOT_OF_TRUST_CHALLENGE_LEN {
            return Err(km_err!(
                InvalidArgument,
                "root of trust challenge of {} bytes, expect {}",
                challenge.len(),
                ROOT_OF_TRUST_CHALLENGE_LEN
            ));
        }
        let boot_info = self
            .boot_info
            .as_ref()
            .ok_or_else(|| km_err!(HardwareNotYetAvailable, "boot info not available"))?;
        let root_of_trust = Value::Tag(
            ROOT_OF_TRUST_CBOR_TAG,
            Box::new(Value::Array(vec![
                Value::Bytes(boot_info.verified_boot_key.clone()),
                Value::Bool(boot_info.device_boot_locked),
                Value::Integer((boot_info.verified_boot_state as i32).into()),
                Value::Bytes(boot_info.verified_boot_hash.clone()),
                Value::Integer(boot_info.boot_patchlevel.into()),
            ])),
        );
        let payload = serialize_cbor(&root_of_trust)?;
        let protected = HeaderBuilder::new().algorithm(iana::Algorithm::HMAC_256_256).build();
        let cose_mac0 = CoseMac0Builder::new()
            .protected(protected)
            .payload(payload)
            .try_create_tag(challenge, |data| self.device_hmac(data))?
            .build();
        Ok(cose_mac0.to_vec()?)
    }

    /// The key at the root of the DICE chain, generated on first use.
    fn rkp_uds_key(&mut self) -> Result<ec::Key, Error> {
        if let Some(key) = &self.rkp_uds_key {
            return Ok(key.clone());
        }
        let material = self.imp.ec.generate_nist_key(&mut *self.imp.rng, ec::NistCurve::P256)?;
        let KeyMaterial::Ec(key) = material else {
            return Err(km_err!(UnknownError, "EC generation gave other key"));
        };
        info!("generated DICE root key");
        self.rkp_uds_key = Some(key.clone());
        Ok(key)
    }

    /// A self-issued DICE chain entry certifying `pub_key` under `key`.
    fn dice_chain_entry(&self, key: &ec::Key, pub_key: &CoseKey) -> Result<Value, Error> {
        let claims = Value::Map(vec![
            (Value::Integer(1.into()), Value::Text("Issuer".to_string())),
            (Value::Integer(2.into()), Value::Text("Subject".to_string())),
            (
                Value::Integer(DICE_SUBJECT_PUBLIC_KEY.into()),
                Value::Bytes(pub_key.clone().to_vec()?),
            ),
            (Value::Integer(DICE_KEY_USAGE.into()), Value::Bytes(vec![DICE_KEY_USAGE_CERT_SIGN])),
        ]);
        let protected = HeaderBuilder::new().algorithm(iana::Algorithm::ES256).build();
        let entry = CoseSign1Builder::new()
            .protected(protected)
            .payload(serialize_cbor(&claims)?)
            .try_create_signature(&[], |input| self.rkp_sign(key, input))?
            .build();
        Ok(entry.to_cbor_value()?)
    }

    /// ES256 signature over `data`, in the raw `r ‖ s` form that COSE uses.
    fn rkp_sign(&self, key: &ec::Key, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut op = self.imp.ec.begin_sign(key.clone(), Digest::Sha256)?;
        op.update(data)?;
        let sig = op.finish()?;
        ecdsa_der_to_raw(&sig, key.curve().coord_len())
    }

    /// The `DeviceInfo` map describing this device.
    fn rpc_device_info(&self) -> Result<Value, Error> {
        let ids = self
            .attestation_ids
            .as_ref()
            .ok_or_else(|| km_err!(UnknownError, "attestation ID info not available"))?;
        let boot_info = self
            .boot_info
            .as_ref()
            .ok_or_else(|| km_err!(UnknownError, "boot info not available"))?;
        let versions = self.dev.keyblobs.versions();

        let text = |data: &[u8]| Value::Text(String::from_utf8_lossy(data).into_owned());
        let bootloader_state = if boot_info.device_boot_locked { "locked" } else { "unlocked" };
        let vb_state = match boot_info.verified_boot_state {
            VerifiedBootState::Verified => "green",
            VerifiedBootState::SelfSigned => "yellow",
            VerifiedBootState::Unverified => "orange",
            VerifiedBootState::Failed => "red",
        };
        let security_level = match self.hw_info.security_level {
            SecurityLevel::Software | SecurityLevel::TrustedEnvironment => "tee",
            SecurityLevel::Strongbox => "strongbox",
            l => return Err(km_err!(UnknownError, "security level {:?} not supported", l)),
        };

        // Keys are in RFC 7049 canonical order: shorter encodings first, then lexicographic.
        let entry = |k: &str, v: Value| (Value::Text(k.to_string()), v);
        Ok(Value::Map(vec![
            entry("brand", text(&ids.brand)),
            entry("fused", Value::Integer(0.into())),
            entry("model", text(&ids.model)),
            entry("device", text(&ids.device)),
            entry("product", text(&ids.product)),
            entry("version", Value::Integer(IRPC_V3.into())),
            entry("vb_state", Value::Text(vb_state.to_string())),
            entry("os_version", Value::Integer(versions.os_version.into())),
            entry("manufacturer", text(&ids.manufacturer)),
            entry("vbmeta_digest", Value::Bytes(boot_info.verified_boot_hash.clone())),
            entry("security_level", Value::Text(security_level.to_string())),
            entry("boot_patch_level", Value::Integer(boot_info.boot_patchlevel.into())),
            entry("bootloader_state", Value::Text(bootloader_state.to_string())),
            entry("system_patch_level", Value::Integer(versions.os_patchlevel.into())),
            entry(
                "vendor_patch_level",
                Value::Integer(versions.vendor_patchlevel.unwrap_or(0).into()),
            ),
        ]))
    }
}

/// Helper function to construct `MacedPublicKey` in MacedPublicKey.aidl
fn build_maced_pub_key<F>(pub_cose_key: Vec<u8>, compute_mac: F) -> Result<Vec<u8>, Error>
where
    F: FnOnce(&[u8]) -> Result<Vec<u8>, Error>,
{
    let protected = HeaderBuilder::new().algorithm(iana::Algorithm::HMAC_256_256).build();
    let cose_mac_0 = CoseMac0Builder::new()
        .protected(protected)
        .payload(pub_cose_key)
        .try_create_tag(&[], compute_mac)?
        .build();
    Ok(cose_mac_0.to_vec()?)
}

/// Helper function to serialize a `cbor::value::Value` into bytes.
fn serialize_cbor(cbor_value: &Value) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(cbor_value, &mut buf)
        .map_err(|e| km_err!(UnknownError, "CBOR encoding failed: {:?}", e))?;
    Ok(buf)
}

/// ```asn1
/// ECDSA-Sig-Value ::= SEQUENCE {
///     r  INTEGER,
///     s  INTEGER
/// }
/// ```
#[derive(Sequence)]
struct EcdsaSigValue<'a> {
    r: UintRef<'a>,
    s: UintRef<'a>,
}

/// Convert a DER `ECDSA-Sig-Value` into fixed-width big-endian `r ‖ s`.
fn ecdsa_der_to_raw(der_sig: &[u8], coord_len: usize) -> Result<Vec<u8>, Error> {
    let sig = EcdsaSigValue::from_der(der_sig)?;
    let mut raw = vec_try![0; 2 * coord_len]?;
    for (i, int) in [sig.r, sig.s].iter().enumerate() {
        let bytes = int.as_bytes();
        if bytes.len() > coord_len {
            return Err(km_err!(UnknownError, "ECDSA signature component too long"));
        }
        let end = (i + 1) * coord_len;
        raw[end - bytes.len()..end].copy_from_slice(bytes);
    }
    Ok(raw)
}
