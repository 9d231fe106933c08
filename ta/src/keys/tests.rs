use super::*;
use crate::KeyMintTa;
use crate::tests::{
    begin, call, expect_error, finish, generate_key, generate_req, new_ta, new_ta_with_signer,
    TestSignInfo, BATCH_SUBJECT,
};
use alloc::{boxed::Box, vec, vec::Vec};
use der::asn1::OctetStringRef;
use p256::ecdsa::signature::Verifier;
use p256::pkcs8::DecodePublicKey;
use rand::rngs::OsRng;
use senv_common::{crypto::Aes, keyblob::InMemorySlotManager};
use senv_crypto::aes::RustCryptoAes;
use senv_wire::{
    keymint::{EcCurve, KeySizeInBits, RsaExponent},
    legacy::*,
};
use x509_cert::Certificate;

const NOT_AFTER_MS: i64 = 4_000_000_000_000;

fn validity() -> [KeyParam; 2] {
    [
        KeyParam::CertificateNotBefore(DateTime { ms_since_epoch: 0 }),
        KeyParam::CertificateNotAfter(DateTime { ms_since_epoch: NOT_AFTER_MS }),
    ]
}

fn ec_key_params(purpose: KeyPurpose) -> Vec<KeyParam> {
    let mut params = vec![
        KeyParam::Algorithm(Algorithm::Ec),
        KeyParam::EcCurve(EcCurve::P256),
        KeyParam::Purpose(purpose),
        KeyParam::Digest(Digest::Sha256),
        KeyParam::NoAuthRequired,
    ];
    params.extend(validity());
    params
}

fn rsa_wrapping_key_params() -> Vec<KeyParam> {
    let mut params = vec![
        KeyParam::Algorithm(Algorithm::Rsa),
        KeyParam::KeySize(KeySizeInBits(1024)),
        KeyParam::RsaPublicExponent(RsaExponent(65537)),
        KeyParam::Purpose(KeyPurpose::WrapKey),
        KeyParam::Padding(PaddingMode::RsaOaep),
        KeyParam::Digest(Digest::Sha256),
        KeyParam::RsaOaepMgfDigest(Digest::Sha256),
        KeyParam::NoAuthRequired,
    ];
    params.extend(validity());
    params
}

fn attest_params(challenge: &[u8]) -> [KeyParam; 2] {
    [
        KeyParam::AttestationChallenge(challenge.to_vec()),
        KeyParam::AttestationApplicationId(b"com.example.app".to_vec()),
    ]
}

fn configure_boot(ta: &mut KeyMintTa) {
    let req = PerformOpReq::ConfigureVerifiedBootInfo(ConfigureVerifiedBootInfoRequest {
        boot_state: b"green".to_vec(),
        bootloader_state: b"locked".to_vec(),
        vbmeta_digest: vec![0xaa; 32],
    });
    assert!(call(ta, req).is_ok());
}

fn verify_cert(cert: &Certificate, signer_spki: &[u8]) {
    let verifier = p256::ecdsa::VerifyingKey::from_public_key_der(signer_spki).unwrap();
    let sig = p256::ecdsa::Signature::from_der(cert.signature.raw_bytes()).unwrap();
    let tbs = cert.tbs_certificate.to_der().unwrap();
    verifier.verify(&tbs, &sig).unwrap();
}

fn attestation_challenge(cert: &Certificate) -> Vec<u8> {
    let ext = cert
        .tbs_certificate
        .extensions
        .as_ref()
        .and_then(|exts| exts.iter().find(|e| e.extn_id == cert::ATTESTATION_EXTENSION_OID))
        .expect("no attestation extension");
    let attestation = cert::AttestationExtension::from_der(ext.extn_value.as_bytes()).unwrap();
    attestation.attestation_challenge.as_bytes().to_vec()
}

fn export_spki(ta: &mut KeyMintTa, key_blob: &[u8]) -> Vec<u8> {
    let req = PerformOpReq::ExportKey(ExportKeyRequest {
        additional_params: vec![],
        key_format: KeyFormat::X509,
        key_blob: key_blob.to_vec(),
    });
    match call(ta, req) {
        Ok(PerformOpRsp::ExportKey(rsp)) => rsp.key_data,
        other => panic!("unexpected export response {:?}", other.map(|r| r.code())),
    }
}

#[test]
fn test_ec_key_self_signed() {
    let mut ta = new_ta();
    let key = generate_key(&mut ta, ec_key_params(KeyPurpose::Sign));
    assert_eq!(key.certificate_chain.0.len(), 1);
    let cert = Certificate::from_der(&key.certificate_chain.0[0]).unwrap();
    assert_eq!(cert.tbs_certificate.issuer, cert.tbs_certificate.subject);

    let spki = export_spki(&mut ta, &key.key_blob);
    assert_eq!(cert.tbs_certificate.subject_public_key_info.to_der().unwrap(), spki);
    verify_cert(&cert, &spki);

    let msg = b"message to sign";
    let op_params = vec![KeyParam::Digest(Digest::Sha256)];
    let op = begin(&mut ta, KeyPurpose::Sign, &key.key_blob, op_params).unwrap();
    let sig = finish(&mut ta, op.op_handle, msg, &[], vec![]).unwrap();
    let verifier = p256::ecdsa::VerifyingKey::from_public_key_der(&spki).unwrap();
    verifier.verify(msg, &p256::ecdsa::Signature::from_der(&sig).unwrap()).unwrap();
}

#[test]
fn test_rsa_wrapping_key_unsigned_cert() {
    let mut ta = new_ta();
    let key = generate_key(&mut ta, rsa_wrapping_key_params());
    let cert = Certificate::from_der(&key.certificate_chain.0[0]).unwrap();
    assert!(cert.signature.raw_bytes().is_empty());
    assert!(key.enforced.contains(&KeyParam::RsaOaepMgfDigest(Digest::Sha256)));
    assert!(!key.enforced.iter().any(|p| matches!(p, KeyParam::CertificateNotAfter(_))));
}

#[test]
fn test_asymmetric_key_needs_validity() {
    let mut ta = new_ta();
    let mut params = ec_key_params(KeyPurpose::Sign);
    params.retain(|p| !matches!(p, KeyParam::CertificateNotBefore(_)));
    assert_eq!(expect_error(&mut ta, generate_req(params)), ErrorCode::MissingNotBefore);

    let mut params = ec_key_params(KeyPurpose::Sign);
    params.retain(|p| !matches!(p, KeyParam::CertificateNotAfter(_)));
    assert_eq!(expect_error(&mut ta, generate_req(params)), ErrorCode::MissingNotAfter);
}

#[test]
fn test_batch_attestation() {
    let signer = TestSignInfo::new();
    let batch_spki = signer.key().subject_public_key_info().unwrap().to_der().unwrap();
    let mut ta = new_ta_with_signer(Some(Box::new(InMemorySlotManager::<8>::default())), signer);

    let mut params = ec_key_params(KeyPurpose::Sign);
    params.extend(attest_params(b"challenge"));
    // No root of trust yet.
    assert_eq!(
        expect_error(&mut ta, generate_req(params.clone())),
        ErrorCode::HardwareNotYetAvailable
    );

    configure_boot(&mut ta);
    let key = generate_key(&mut ta, params);
    let chain = &key.certificate_chain.0;
    assert_eq!(chain.len(), 2);
    let leaf = Certificate::from_der(&chain[0]).unwrap();
    assert_eq!(leaf.tbs_certificate.issuer.to_der().unwrap(), hex::decode(BATCH_SUBJECT).unwrap());
    verify_cert(&leaf, &batch_spki);
    assert_eq!(attestation_challenge(&leaf), b"challenge".to_vec());

    let batch = Certificate::from_der(&chain[1]).unwrap();
    assert_eq!(batch.tbs_certificate.subject_public_key_info.to_der().unwrap(), batch_spki);
}

#[test]
fn test_attestation_param_errors() {
    let mut ta = new_ta();
    configure_boot(&mut ta);

    let mut params = ec_key_params(KeyPurpose::Sign);
    params.push(KeyParam::AttestationChallenge(b"challenge".to_vec()));
    let rc = expect_error(&mut ta, generate_req(params));
    assert_eq!(rc, ErrorCode::AttestationApplicationIdMissing);

    let mut params = ec_key_params(KeyPurpose::Sign);
    params.extend(attest_params(&[0x01; MAX_ATTESTATION_CHALLENGE_LEN + 1]));
    assert_eq!(expect_error(&mut ta, generate_req(params)), ErrorCode::InvalidInputLength);
}

#[test]
fn test_caller_attestation_key() {
    let mut ta = new_ta();
    configure_boot(&mut ta);
    let attest_key = generate_key(&mut ta, ec_key_params(KeyPurpose::AttestKey));
    let attest_spki = export_spki(&mut ta, &attest_key.key_blob);
    let issuer = hex::decode(BATCH_SUBJECT).unwrap();

    let mut params = ec_key_params(KeyPurpose::Sign);
    params.extend(attest_params(b"caller key"));
    let req = |params: Vec<KeyParam>, key_blob: &[u8], issuer: &[u8]| {
        PerformOpReq::GenerateKey(GenerateKeyRequest {
            key_description: params,
            attestation_signing_key_blob: key_blob.to_vec(),
            attest_key_params: vec![],
            issuer_subject: issuer.to_vec(),
        })
    };

    let rsp = match call(&mut ta, req(params.clone(), &attest_key.key_blob, &issuer)) {
        Ok(PerformOpRsp::GenerateKey(rsp)) => rsp,
        other => panic!("unexpected response {:?}", other.map(|r| r.code())),
    };
    assert_eq!(rsp.certificate_chain.0.len(), 1);
    let leaf = Certificate::from_der(&rsp.certificate_chain.0[0]).unwrap();
    assert_eq!(leaf.tbs_certificate.issuer.to_der().unwrap(), issuer);
    verify_cert(&leaf, &attest_spki);
    assert_eq!(attestation_challenge(&leaf), b"caller key".to_vec());

    let rc = expect_error(&mut ta, req(params.clone(), &attest_key.key_blob, &[]));
    assert_eq!(rc, ErrorCode::InvalidArgument);

    let no_challenge = ec_key_params(KeyPurpose::Sign);
    let rc = expect_error(&mut ta, req(no_challenge, &attest_key.key_blob, &issuer));
    assert_eq!(rc, ErrorCode::AttestationChallengeMissing);

    let signing_key = generate_key(&mut ta, ec_key_params(KeyPurpose::Sign));
    let rc = expect_error(&mut ta, req(params, &signing_key.key_blob, &issuer));
    assert_eq!(rc, ErrorCode::IncompatiblePurpose);
}

#[test]
fn test_attest_existing_key() {
    let mut ta = new_ta();
    configure_boot(&mut ta);
    let key = generate_key(&mut ta, ec_key_params(KeyPurpose::Sign));
    let req = PerformOpReq::AttestKey(AttestKeyRequest {
        key_blob: key.key_blob.clone(),
        attest_params: attest_params(b"later").to_vec(),
        attestation_signing_key_blob: vec![],
        attest_key_params: vec![],
        issuer_subject: vec![],
    });
    let chain = match call(&mut ta, req) {
        Ok(PerformOpRsp::AttestKey(rsp)) => rsp.certificate_chain.0,
        other => panic!("unexpected response {:?}", other.map(|r| r.code())),
    };
    assert_eq!(chain.len(), 2);
    let leaf = Certificate::from_der(&chain[0]).unwrap();
    assert_eq!(attestation_challenge(&leaf), b"later".to_vec());
    assert_eq!(
        leaf.tbs_certificate.subject_public_key_info.to_der().unwrap(),
        export_spki(&mut ta, &key.key_blob)
    );
}

#[test]
fn test_unique_id() {
    let ta = new_ta();
    let created = |ms_since_epoch| {
        vec![KeyParam::IncludeUniqueId, KeyParam::CreationDatetime(DateTime { ms_since_epoch })]
    };
    assert!(ta.calculate_unique_id(b"app", &[]).unwrap().is_empty());

    let id = ta.calculate_unique_id(b"app", &created(1_000)).unwrap();
    assert_eq!(id.len(), UNIQUE_ID_LEN);
    // Stable within a rotation period.
    assert_eq!(ta.calculate_unique_id(b"app", &created(2_000)).unwrap(), id);
    assert_ne!(ta.calculate_unique_id(b"other", &created(1_000)).unwrap(), id);
    let next_period = created(1_000 + UNIQUE_ID_ROTATION_MS);
    assert_ne!(ta.calculate_unique_id(b"app", &next_period).unwrap(), id);

    let mut reset = created(1_000);
    reset.push(KeyParam::ResetSinceIdRotation);
    assert_ne!(ta.calculate_unique_id(b"app", &reset).unwrap(), id);

    let rc = ta.calculate_unique_id(b"app", &[KeyParam::IncludeUniqueId]).unwrap_err();
    assert_eq!(rc.code(), ErrorCode::InvalidArgument);
}

#[test]
fn test_triple_des_roundtrip() {
    let mut ta = new_ta();
    let params = vec![
        KeyParam::Algorithm(Algorithm::TripleDes),
        KeyParam::KeySize(des::KEY_SIZE_BITS),
        KeyParam::Purpose(KeyPurpose::Encrypt),
        KeyParam::Purpose(KeyPurpose::Decrypt),
        KeyParam::BlockMode(BlockMode::Ecb),
        KeyParam::Padding(PaddingMode::Pkcs7),
        KeyParam::NoAuthRequired,
    ];
    let key = generate_key(&mut ta, params);
    assert!(key.certificate_chain.0.is_empty());
    let op_params =
        vec![KeyParam::BlockMode(BlockMode::Ecb), KeyParam::Padding(PaddingMode::Pkcs7)];
    let msg = b"eleven byte";

    let op = begin(&mut ta, KeyPurpose::Encrypt, &key.key_blob, op_params.clone()).unwrap();
    let ciphertext = finish(&mut ta, op.op_handle, msg, &[], vec![]).unwrap();
    assert_eq!(ciphertext.len(), 16);
    let op = begin(&mut ta, KeyPurpose::Decrypt, &key.key_blob, op_params).unwrap();
    assert_eq!(finish(&mut ta, op.op_handle, &ciphertext, &[], vec![]).unwrap(), msg.to_vec());

    let bad_size = vec![
        KeyParam::Algorithm(Algorithm::TripleDes),
        KeyParam::KeySize(KeySizeInBits(192)),
        KeyParam::Purpose(KeyPurpose::Encrypt),
    ];
    assert_eq!(expect_error(&mut ta, generate_req(bad_size)), ErrorCode::UnsupportedKeySize);
}

/// Wrapped AES-256 key material, with the transport key encrypted to `wrapping_spki`.
fn wrap_key(
    wrapping_spki: &[u8],
    key_params: &[KeyParam],
    key_data: &[u8],
    masking_key: &[u8],
) -> Vec<u8> {
    let transport_key = [0x5a; 32];
    let masked: Vec<u8> = transport_key.iter().zip(masking_key).map(|(x, y)| x ^ y).collect();
    let public = ::rsa::RsaPublicKey::from_public_key_der(wrapping_spki).unwrap();
    let encrypted_transport_key =
        public.encrypt(&mut OsRng, ::rsa::Oaep::new::<sha2::Sha256>(), &masked).unwrap();

    let key_description = cert::KeyDescription {
        key_format: KeyFormat::Raw as i32,
        key_params: cert::AuthorizationList::new(key_params, &[], None, None).unwrap(),
    };
    let nonce = [0x0c; aes::GCM_NONCE_SIZE];
    let mut op = RustCryptoAes
        .begin_aead(
            aes::Key::new_from(&transport_key).unwrap(),
            aes::GcmMode { nonce, tag_len: 16 },
            SymmetricOperation::Encrypt,
        )
        .unwrap();
    op.update_aad(&key_description.to_der().unwrap()).unwrap();
    let mut encrypted = op.update(key_data).unwrap();
    encrypted.extend_from_slice(&op.finish().unwrap());
    let tag = encrypted.split_off(encrypted.len() - 16);

    cert::SecureKeyWrapper {
        version: cert::SECURE_KEY_WRAPPER_VERSION,
        encrypted_transport_key: OctetStringRef::new(&encrypted_transport_key).unwrap(),
        initialization_vector: OctetStringRef::new(&nonce).unwrap(),
        key_description,
        encrypted_key: OctetStringRef::new(&encrypted).unwrap(),
        tag: OctetStringRef::new(&tag).unwrap(),
    }
    .to_der()
    .unwrap()
}

fn import_wrapped_req(wrapped_key: Vec<u8>, wrapping_key: &[u8], mask: &[u8]) -> PerformOpReq {
    PerformOpReq::ImportWrappedKey(ImportWrappedKeyRequest {
        wrapped_key,
        wrapping_key: wrapping_key.to_vec(),
        masking_key: mask.to_vec(),
        additional_params: vec![
            KeyParam::Padding(PaddingMode::RsaOaep),
            KeyParam::Digest(Digest::Sha256),
            KeyParam::RsaOaepMgfDigest(Digest::Sha256),
        ],
        password_sid: 0x1111,
        biometric_sid: 0x2222,
    })
}

#[test]
fn test_import_wrapped_key() {
    let mut ta = new_ta();
    let wrapping_key = generate_key(&mut ta, rsa_wrapping_key_params());
    let wrapping_spki = export_spki(&mut ta, &wrapping_key.key_blob);
    let mask = [0x3c; 32];
    let aes_params = vec![
        KeyParam::Purpose(KeyPurpose::Encrypt),
        KeyParam::Purpose(KeyPurpose::Decrypt),
        KeyParam::Algorithm(Algorithm::Aes),
        KeyParam::KeySize(KeySizeInBits(256)),
        KeyParam::BlockMode(BlockMode::Ecb),
        KeyParam::Padding(PaddingMode::None),
        KeyParam::NoAuthRequired,
    ];
    // FIPS-197 C.3 AES-256 vector.
    let key_data = hex::decode(concat!(
        "000102030405060708090a0b0c0d0e0f",
        "101112131415161718191a1b1c1d1e1f",
    ))
    .unwrap();
    let wrapped = wrap_key(&wrapping_spki, &aes_params, &key_data, &mask);

    let req = import_wrapped_req(wrapped.clone(), &wrapping_key.key_blob, &mask);
    let key = match call(&mut ta, req) {
        Ok(PerformOpRsp::ImportWrappedKey(rsp)) => rsp,
        other => panic!("unexpected response {:?}", other.map(|r| r.code())),
    };
    assert!(key.enforced.contains(&KeyParam::Origin(KeyOrigin::SecurelyImported)));
    let op_params =
        vec![KeyParam::BlockMode(BlockMode::Ecb), KeyParam::Padding(PaddingMode::None)];
    let op = begin(&mut ta, KeyPurpose::Encrypt, &key.key_blob, op_params).unwrap();
    let plaintext = hex::decode("00112233445566778899aabbccddeeff").unwrap();
    let ciphertext = finish(&mut ta, op.op_handle, &plaintext, &[], vec![]).unwrap();
    assert_eq!(hex::encode(ciphertext), "8ea2b7ca516745bfeafc49904b496089");

    // A different mask yields a different transport key, which fails the GCM tag.
    let req = import_wrapped_req(wrapped.clone(), &wrapping_key.key_blob, &[0x3d; 32]);
    assert_eq!(expect_error(&mut ta, req), ErrorCode::VerificationFailed);
    let req = import_wrapped_req(wrapped, &wrapping_key.key_blob, &[0x3c; 16]);
    assert_eq!(expect_error(&mut ta, req), ErrorCode::InvalidArgument);
}

#[test]
fn test_import_wrapped_key_secure_id() {
    let mut ta = new_ta();
    let wrapping_key = generate_key(&mut ta, rsa_wrapping_key_params());
    let wrapping_spki = export_spki(&mut ta, &wrapping_key.key_blob);
    let mask = [0; 32];
    let aes_params = vec![
        KeyParam::Purpose(KeyPurpose::Encrypt),
        KeyParam::Algorithm(Algorithm::Aes),
        KeyParam::KeySize(KeySizeInBits(128)),
        KeyParam::BlockMode(BlockMode::Ecb),
        KeyParam::Padding(PaddingMode::None),
        KeyParam::UserSecureId(HardwareAuthenticatorType::Password as u64),
        KeyParam::UserAuthType(HardwareAuthenticatorType::Password as u32),
    ];
    let wrapped = wrap_key(&wrapping_spki, &aes_params, &[0x42; 16], &mask);
    let key = match call(&mut ta, import_wrapped_req(wrapped, &wrapping_key.key_blob, &mask)) {
        Ok(PerformOpRsp::ImportWrappedKey(rsp)) => rsp,
        other => panic!("unexpected response {:?}", other.map(|r| r.code())),
    };
    assert!(key.enforced.contains(&KeyParam::UserSecureId(0x1111)));
    assert!(!key.enforced.contains(&KeyParam::UserSecureId(1)));
}

#[test]
fn test_import_wrapped_key_needs_wrap_purpose() {
    let mut ta = new_ta();
    let not_wrapping = generate_key(&mut ta, ec_key_params(KeyPurpose::Sign));
    let wrapping_key = generate_key(&mut ta, rsa_wrapping_key_params());
    let wrapping_spki = export_spki(&mut ta, &wrapping_key.key_blob);
    let params = vec![
        KeyParam::Purpose(KeyPurpose::Encrypt),
        KeyParam::Algorithm(Algorithm::Aes),
        KeyParam::KeySize(KeySizeInBits(128)),
        KeyParam::NoAuthRequired,
    ];
    let wrapped = wrap_key(&wrapping_spki, &params, &[0x42; 16], &[0; 32]);
    let req = import_wrapped_req(wrapped, &not_wrapping.key_blob, &[0; 32]);
    assert_eq!(expect_error(&mut ta, req), ErrorCode::IncompatibleAlgorithm);
}
