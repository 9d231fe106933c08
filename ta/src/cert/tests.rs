use super::*;
use alloc::vec;
use senv_wire::keymint::{Algorithm, BlockMode, KeyFormat, PaddingMode, VerifiedBootState};

#[test]
fn test_encode() {
    let sec_level = SecurityLevel::TrustedEnvironment;
    let boot_info = BootInfo {
        verified_boot_key: vec![0xbb; 32],
        device_boot_locked: false,
        verified_boot_state: VerifiedBootState::Unverified,
        verified_boot_hash: vec![0xee; 32],
        boot_patchlevel: 20220919,
    };
    let ext = AttestationExtension {
        attestation_version: KEYMINT_V2_VERSION,
        attestation_security_level: sec_level,
        keymint_version: KEYMINT_V2_VERSION,
        keymint_security_level: sec_level,
        attestation_challenge: OctetStringRef::new(b"abc").unwrap(),
        unique_id: OctetStringRef::new(b"xxx").unwrap(),
        sw_enforced: AuthorizationList::new(&[], &[], None, None).unwrap(),
        hw_enforced: AuthorizationList::new(
            &[KeyParam::Algorithm(Algorithm::Ec)],
            &[],
            Some(&boot_info),
            None,
        )
        .unwrap(),
    };
    let got = ext.to_der().unwrap();
    let want = concat!(
        "3071",   // SEQUENCE
        "0202",   // INTEGER len 2
        "00c8",   // 200
        "0a01",   // ENUM len 1
        "01",     // 1 (TrustedEnvironment)
        "0202",   // INTEGER len 2
        "00c8",   // 200
        "0a01",   // ENUM len 1
        "01",     // 1 (TrustedEnvironment)
        "0403",   // BYTE STRING len 3
        "616263", // b"abc"
        "0403",   // BYTE STRING len 3
        "787878", // b"xxx"
        "3000",   // SEQUENCE len 0
        "3055",   // SEQUENCE len 0x55
        "a203",   // EXPLICIT [2]
        "0201",   // INTEGER len 1
        "03",     // 3 (Algorithm::Ec)
        "bf8540",
        "4c",   // EXPLICIT [704] len 0x4c
        "304a", // SEQUENCE len x4a
        "0420", // OCTET STRING len 32
        "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
        "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
        "0101", // BOOLEAN len 1
        "00",   // false
        "0a01", // ENUMERATED len 1
        "02",   // Unverified(2)
        "0420", // OCTET STRING len 32
        "eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee",
        "eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee",
    );
    assert_eq!(hex::encode(&got), want);
}

#[test]
fn test_explicit_tagged_value() {
    let tests: Vec<(Vec<u8>, &'static str)> = vec![
        (ExplicitTaggedValue { tag: 2, val: 16u64 }.to_der().unwrap(), "a203020110"),
        (ExplicitTaggedValue { tag: 2, val: Null }.to_der().unwrap(), "a2020500"),
        (ExplicitTaggedValue { tag: 503, val: 16u64 }.to_der().unwrap(), "bf837703020110"),
    ];
    for (got, want) in tests {
        assert_eq!(hex::encode(&got), want);
    }
}

#[test]
fn test_authorization_list_set_order() {
    let params = vec![
        KeyParam::Purpose(KeyPurpose::Sign),
        KeyParam::Purpose(KeyPurpose::Encrypt),
        KeyParam::NoAuthRequired,
    ];
    let list = AuthorizationList::new(&params, &[], None, None).unwrap();
    assert_eq!(
        hex::encode(&list.0),
        concat!(
            "a108",   // [1]
            "3106",   // SET
            "020100", // Encrypt
            "020102", // Sign
            "bf837702",
            "0500", // [503] NULL
        )
    );
    let decoded = list.params().unwrap();
    assert_eq!(
        decoded,
        vec![
            KeyParam::Purpose(KeyPurpose::Encrypt),
            KeyParam::Purpose(KeyPurpose::Sign),
            KeyParam::NoAuthRequired,
        ]
    );
}

#[test]
fn test_authorization_list_rejects_unknown_tag() {
    // [1000] INTEGER 1
    let list = AuthorizationList(hex::decode("bf876803020101").unwrap());
    let result = list.params();
    assert_eq!(result.unwrap_err().code(), ErrorCode::InvalidTag);
}

#[test]
fn test_secure_key_wrapper() {
    let encoded_str = concat!(
        "30820179", // SEQUENCE length 0x179 (SecureKeyWrapper) {
        "020100",   // INTEGER length 1 value 0x00 (version)
        "04820100", // OCTET STRING length 0x100 (encryptedTransportKey)
        "aad93ed5924f283b4bb5526fbe7a1412",
        "f9d9749ec30db9062b29e574a8546f33",
        "c88732452f5b8e6a391ee76c39ed1712",
        "c61d8df6213dec1cffbc17a8c6d04c7b",
        "30893d8daa9b2015213e219468215532",
        "07f8f9931c4caba23ed3bee28b36947e",
        "47f10e0a5c3dc51c988a628daad3e5e1",
        "f4005e79c2d5a96c284b4b8d7e4948f3",
        "31e5b85dd5a236f85579f3ea1d1b8484",
        "87470bdb0ab4f81a12bee42c99fe0df4",
        "bee3759453e69ad1d68a809ce06b949f",
        "7694a990429b2fe81e066ff43e56a216",
        "02db70757922a4bcc23ab89f1e35da77",
        "586775f423e519c2ea394caf48a28d0c",
        "8020f1dcf6b3a68ec246f615ae96dae9",
        "a079b1f6eb959033c1af5c125fd94168",
        "040c", // OCTET STRING length 0x0c (initializationVector)
        "6d9721d08589581ab49204a3",
        "302e",   // SEQUENCE length 0x2e (KeyDescription) {
        "020103", // INTEGER length 1 value 0x03 (keyFormat = RAW)
        "3029",   // SEQUENCE length 0x29 (AuthorizationList) {
        "a108",   // [1] { (purpose)
        "3106",   // SET length 0x06
        "020100", // INTEGER 0x00 (Encrypt)
        "020101", // INTEGER 0x01 (Decrypt)
        "a203",   // [2] { (algorithm)
        "020120", // INTEGER 0x20 (AES)
        "a304",     // [3] { (keySize)
        "02020100", // INTEGER 0x100
        "a405",   // [4] { (blockMode)
        "3103",   // SET
        "020101", // INTEGER 0x01 (ECB)
        "a605",   // [6] { (padding)
        "3103",   // SET
        "020140", // INTEGER 0x40 (PKCS7)
        "bf837702", // [503] { (noAuthRequired)
        "0500",     // NULL
        "0420", // OCTET STRING length 0x20 (encryptedKey)
        "a61c6e247e25b3e6e69aa78eb03c2d4a",
        "c20d1f99a9a024a76f35c8e2cab9b68d",
        "0410", // OCTET STRING length 0x10 (tag)
        "2560c70109ae67c030f00b98b512a670",
    );
    let encoded_bytes = hex::decode(encoded_str).unwrap();
    let wrapper = SecureKeyWrapper::from_der(&encoded_bytes).unwrap();
    assert_eq!(wrapper.version, SECURE_KEY_WRAPPER_VERSION);
    assert_eq!(wrapper.initialization_vector.as_bytes().len(), 12);
    assert_eq!(wrapper.tag.as_bytes().len(), 16);
    assert_eq!(wrapper.key_description.key_format, KeyFormat::Raw as i32);
    let params = wrapper.key_description.key_params.params().unwrap();
    assert_eq!(
        params,
        vec![
            KeyParam::Purpose(KeyPurpose::Encrypt),
            KeyParam::Purpose(KeyPurpose::Decrypt),
            KeyParam::Algorithm(Algorithm::Aes),
            KeyParam::KeySize(keymint::KeySizeInBits(256)),
            KeyParam::BlockMode(BlockMode::Ecb),
            KeyParam::Padding(PaddingMode::Pkcs7),
            KeyParam::NoAuthRequired,
        ]
    );

    // The description re-encodes to the exact bytes that were authenticated.
    let description = hex::encode(wrapper.key_description.to_der().unwrap());
    assert!(description.starts_with("302e020103"));
    assert!(encoded_str.contains(&description));
}

#[test]
fn test_check_attestation_ids() {
    let params = vec![
        KeyParam::Algorithm(Algorithm::Ec),
        KeyParam::AttestationIdBrand(b"brand".to_vec()),
    ];
    let err = check_attestation_ids(&params, None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::AttestationIdsNotProvisioned);

    let mut ids = AttestationIds { brand: b"other".to_vec(), ..Default::default() };
    let err = check_attestation_ids(&params, Some(&ids)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CannotAttestIds);

    ids.brand = b"brand".to_vec();
    let got = check_attestation_ids(&params, Some(&ids)).unwrap();
    assert_eq!(got, vec![KeyParam::AttestationIdBrand(b"brand".to_vec())]);

    // Nothing requested, nothing needed.
    assert!(check_attestation_ids(&[], None).unwrap().is_empty());
}

#[test]
fn test_key_usage_bits() {
    let params = vec![
        KeyParam::Purpose(KeyPurpose::Sign),
        KeyParam::Purpose(KeyPurpose::AttestKey),
        KeyParam::Purpose(KeyPurpose::Verify),
    ];
    let usage = key_usage_extension_bits(&params);
    assert!(usage.0.contains(KeyUsages::DigitalSignature));
    assert!(usage.0.contains(KeyUsages::KeyCertSign));
    assert!(!usage.0.contains(KeyUsages::KeyAgreement));
}
