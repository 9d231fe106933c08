use super::*;
use crate::{contains_tag_value, get_bool_tag_value};
use crate::crypto::{rsa, AccumulatingOperation, Rng};
use crate::expect_err;
use crate::wire::keymint::{DateTime, KeyOrigin, RsaExponent};
use alloc::{boxed::Box, vec};

/// Asymmetric primitives for checks that never reach the key material.
struct NoAsymmetric;

impl Rsa for NoAsymmetric {
    fn generate_key(
        &self,
        _rng: &mut dyn Rng,
        _key_size: KeySizeInBits,
        _exponent: RsaExponent,
    ) -> Result<KeyMaterial, Error> {
        Err(km_err!(Unimplemented, "no RSA"))
    }
    fn begin_decrypt(
        &self,
        _key: rsa::Key,
        _mode: rsa::DecryptionMode,
    ) -> Result<Box<dyn AccumulatingOperation>, Error> {
        Err(km_err!(Unimplemented, "no RSA"))
    }
    fn begin_sign(
        &self,
        _key: rsa::Key,
        _mode: rsa::SignMode,
    ) -> Result<Box<dyn AccumulatingOperation>, Error> {
        Err(km_err!(Unimplemented, "no RSA"))
    }
}

impl Ec for NoAsymmetric {
    fn generate_nist_key(
        &self,
        _rng: &mut dyn Rng,
        _curve: ec::NistCurve,
    ) -> Result<KeyMaterial, Error> {
        Err(km_err!(Unimplemented, "no EC"))
    }
    fn import_pkcs8_key(&self, _data: &[u8]) -> Result<KeyMaterial, Error> {
        Err(km_err!(Unimplemented, "no EC"))
    }
    fn begin_agree(&self, _key: ec::Key) -> Result<Box<dyn AccumulatingOperation>, Error> {
        Err(km_err!(Unimplemented, "no EC"))
    }
    fn begin_sign(
        &self,
        _key: ec::Key,
        _digest: Digest,
    ) -> Result<Box<dyn AccumulatingOperation>, Error> {
        Err(km_err!(Unimplemented, "no EC"))
    }
}

fn import(
    params: &[KeyParam],
    format: KeyFormat,
    data: &[u8],
) -> Result<(KeyMaterial, Vec<KeyParam>), Error> {
    check_key_import_params(&NoAsymmetric, &NoAsymmetric, params, format, data)
}

fn aes_gcm_chars() -> Vec<KeyParam> {
    vec![
        KeyParam::Algorithm(Algorithm::Aes),
        KeyParam::KeySize(KeySizeInBits(128)),
        KeyParam::BlockMode(BlockMode::Gcm),
        KeyParam::Padding(PaddingMode::None),
        KeyParam::MinMacLength(96),
        KeyParam::Purpose(KeyPurpose::Encrypt),
        KeyParam::Purpose(KeyPurpose::Decrypt),
        KeyParam::NoAuthRequired,
    ]
}

#[test]
fn test_get_tag_value() {
    let params = aes_gcm_chars();
    assert_eq!(get_algorithm(&params).unwrap(), Algorithm::Aes);
    assert_eq!(get_block_mode(&params).unwrap(), BlockMode::Gcm);
    expect_err!(get_digest(&params), "UnsupportedDigest");

    let dup = vec![KeyParam::Algorithm(Algorithm::Aes), KeyParam::Algorithm(Algorithm::Hmac)];
    expect_err!(get_algorithm(&dup), "duplicate tag");
    assert!(get_bool_tag_value!(&params, NoAuthRequired).unwrap());
    assert!(!get_bool_tag_value!(&params, CallerNonce).unwrap());
    assert!(contains_tag_value!(&params, Purpose, KeyPurpose::Decrypt));
    assert!(!contains_tag_value!(&params, Purpose, KeyPurpose::Sign));
}

#[test]
fn test_split_authorizations() {
    let mut desc = aes_gcm_chars();
    desc.push(KeyParam::ApplicationId(b"app".to_vec()));
    desc.push(KeyParam::CreationDatetime(DateTime { ms_since_epoch: 1000 }));
    desc.push(KeyParam::UsageCountLimit(1));
    desc.push(KeyParam::AttestationChallenge(b"chal".to_vec()));
    let (hw, sw) = split_authorizations(&desc).unwrap();
    assert_eq!(hw, aes_gcm_chars());
    assert_eq!(
        sw,
        vec![
            KeyParam::CreationDatetime(DateTime { ms_since_epoch: 1000 }),
            KeyParam::UsageCountLimit(1)
        ]
    );

    let mut desc = aes_gcm_chars();
    desc.push(KeyParam::Nonce(vec![0; 12]));
    let result = split_authorizations(&desc);
    expect_err!(result, "operation tag");
    assert_eq!(split_authorizations(&desc).unwrap_err().code(), ErrorCode::InvalidTag);
}

#[test]
fn test_split_keeps_origin_for_caller_check() {
    let desc = vec![KeyParam::Origin(KeyOrigin::Generated)];
    let (hw, sw) = split_authorizations(&desc).unwrap();
    assert_eq!(hw.len(), 1);
    assert!(sw.is_empty());
}

#[test]
fn test_hidden() {
    assert_eq!(hidden(&[]).unwrap(), authset::serialize(&[]).unwrap());
    // Empty values are not bound into the blob.
    let params = vec![KeyParam::ApplicationId(vec![]), KeyParam::ApplicationData(vec![])];
    assert_eq!(hidden(&params).unwrap(), hidden(&[]).unwrap());

    let params = vec![
        KeyParam::ApplicationData(b"data".to_vec()),
        KeyParam::Algorithm(Algorithm::Aes),
        KeyParam::ApplicationId(b"id".to_vec()),
    ];
    let want = authset::serialize(&[
        KeyParam::ApplicationId(b"id".to_vec()),
        KeyParam::ApplicationData(b"data".to_vec()),
    ])
    .unwrap();
    assert_eq!(hidden(&params).unwrap(), want);
}

#[test]
fn test_check_key_gen_params() {
    assert!(matches!(
        check_key_gen_params(&aes_gcm_chars()).unwrap(),
        KeyGenInfo::Aes(aes::Variant::Aes128)
    ));

    let hmac = vec![
        KeyParam::Algorithm(Algorithm::Hmac),
        KeyParam::KeySize(KeySizeInBits(256)),
        KeyParam::Digest(Digest::Sha256),
        KeyParam::MinMacLength(128),
        KeyParam::Purpose(KeyPurpose::Sign),
    ];
    assert!(matches!(
        check_key_gen_params(&hmac).unwrap(),
        KeyGenInfo::Hmac(KeySizeInBits(256))
    ));

    let tests = vec![
        (vec![KeyParam::Algorithm(Algorithm::Rsa)], ErrorCode::UnsupportedKeySize),
        (vec![KeyParam::KeySize(KeySizeInBits(128))], ErrorCode::UnsupportedAlgorithm),
        (
            vec![KeyParam::Algorithm(Algorithm::Aes), KeyParam::KeySize(KeySizeInBits(100))],
            ErrorCode::UnsupportedKeySize,
        ),
        (
            vec![
                KeyParam::Algorithm(Algorithm::Aes),
                KeyParam::KeySize(KeySizeInBits(128)),
                KeyParam::BlockMode(BlockMode::Gcm),
            ],
            ErrorCode::MissingMinMacLength,
        ),
        (
            vec![
                KeyParam::Algorithm(Algorithm::Aes),
                KeyParam::KeySize(KeySizeInBits(128)),
                KeyParam::BlockMode(BlockMode::Gcm),
                KeyParam::MinMacLength(136),
            ],
            ErrorCode::UnsupportedMinMacLength,
        ),
        (
            vec![
                KeyParam::Algorithm(Algorithm::Hmac),
                KeyParam::KeySize(KeySizeInBits(256)),
                KeyParam::MinMacLength(128),
            ],
            ErrorCode::UnsupportedDigest,
        ),
        (
            vec![
                KeyParam::Algorithm(Algorithm::Aes),
                KeyParam::KeySize(KeySizeInBits(128)),
                KeyParam::DeviceUniqueAttestation,
            ],
            ErrorCode::InvalidArgument,
        ),
        (
            vec![
                KeyParam::Algorithm(Algorithm::Aes),
                KeyParam::KeySize(KeySizeInBits(128)),
                KeyParam::NoAuthRequired,
                KeyParam::UserSecureId(1),
            ],
            ErrorCode::InvalidTag,
        ),
    ];
    for (params, want) in tests {
        let got = check_key_gen_params(&params).unwrap_err().code();
        assert_eq!(got, want, "for {:?}", params);
    }
}

#[test]
fn test_check_key_import_params() {
    let params = vec![
        KeyParam::Algorithm(Algorithm::Aes),
        KeyParam::BlockMode(BlockMode::Ecb),
        KeyParam::Padding(PaddingMode::Pkcs7),
    ];
    let (material, deduced) = import(&params, KeyFormat::Raw, &[1; 24]).unwrap();
    assert_eq!(material.algorithm(), Algorithm::Aes);
    assert_eq!(deduced, vec![KeyParam::KeySize(KeySizeInBits(192))]);

    let mut sized = params.clone();
    sized.push(KeyParam::KeySize(KeySizeInBits(256)));
    let err = import(&sized, KeyFormat::Raw, &[1; 16]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ImportParameterMismatch);

    let err = import(&params, KeyFormat::Pkcs8, &[1; 16]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedKeyFormat);
    let err = import(&params, KeyFormat::Raw, &[1; 15]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedKeySize);
}

#[test]
fn test_check_begin_params() {
    let chars = aes_gcm_chars();
    let good = vec![
        KeyParam::BlockMode(BlockMode::Gcm),
        KeyParam::Padding(PaddingMode::None),
        KeyParam::MacLength(128),
    ];
    check_begin_params(&chars, KeyPurpose::Encrypt, &good).unwrap();

    let mut nonce = good.clone();
    nonce.push(KeyParam::Nonce(vec![0; 12]));
    let err = check_begin_params(&chars, KeyPurpose::Encrypt, &nonce).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CallerNonceProhibited);
    // Decryption always takes the caller's nonce.
    check_begin_params(&chars, KeyPurpose::Decrypt, &nonce).unwrap();

    let short = vec![
        KeyParam::BlockMode(BlockMode::Gcm),
        KeyParam::Padding(PaddingMode::None),
        KeyParam::MacLength(64),
    ];
    let err = check_begin_params(&chars, KeyPurpose::Encrypt, &short).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidMacLength);

    let ecb = vec![KeyParam::BlockMode(BlockMode::Ecb), KeyParam::Padding(PaddingMode::None)];
    let err = check_begin_params(&chars, KeyPurpose::Encrypt, &ecb).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IncompatibleBlockMode);
}

#[test]
fn test_check_begin_params_fail() {
    let chars = vec![
        KeyParam::NoAuthRequired,
        KeyParam::Algorithm(Algorithm::Hmac),
        KeyParam::KeySize(KeySizeInBits(128)),
        KeyParam::Digest(Digest::Sha256),
        KeyParam::Purpose(KeyPurpose::Sign),
        KeyParam::Purpose(KeyPurpose::Verify),
        KeyParam::MinMacLength(160),
    ];

    let tests = vec![
        (
            KeyPurpose::Encrypt,
            vec![KeyParam::Digest(Digest::Sha256), KeyParam::MacLength(160)],
            "invalid purpose Encrypt",
        ),
        (KeyPurpose::Sign, vec![KeyParam::Digest(Digest::Sha256)], "MissingMacLength"),
        (
            KeyPurpose::Sign,
            vec![KeyParam::Digest(Digest::Sha512), KeyParam::MacLength(160)],
            "not in key characteristics",
        ),
        (
            KeyPurpose::Sign,
            vec![KeyParam::Digest(Digest::Sha256), KeyParam::MacLength(264)],
            "invalid mac len",
        ),
    ];
    for (purpose, params, msg) in tests {
        expect_err!(check_begin_params(&chars, purpose, &params), msg);
    }
}

#[test]
fn test_check_asymmetric_gen_params() {
    let rsa = vec![
        KeyParam::Algorithm(Algorithm::Rsa),
        KeyParam::KeySize(KeySizeInBits(2048)),
        KeyParam::RsaPublicExponent(RsaExponent(65537)),
        KeyParam::Purpose(KeyPurpose::Sign),
    ];
    assert!(matches!(
        check_key_gen_params(&rsa).unwrap(),
        KeyGenInfo::Rsa(KeySizeInBits(2048), RsaExponent(65537))
    ));
    let ec = vec![
        KeyParam::Algorithm(Algorithm::Ec),
        KeyParam::EcCurve(EcCurve::P384),
        KeyParam::Purpose(KeyPurpose::AttestKey),
    ];
    assert!(matches!(
        check_key_gen_params(&ec).unwrap(),
        KeyGenInfo::NistEc(ec::NistCurve::P384)
    ));
    let des =
        vec![KeyParam::Algorithm(Algorithm::TripleDes), KeyParam::KeySize(KeySizeInBits(168))];
    assert!(matches!(check_key_gen_params(&des).unwrap(), KeyGenInfo::TripleDes));

    let tests = vec![
        (
            vec![KeyParam::Algorithm(Algorithm::Rsa), KeyParam::KeySize(KeySizeInBits(2048))],
            ErrorCode::InvalidArgument,
        ),
        (
            vec![
                KeyParam::Algorithm(Algorithm::Rsa),
                KeyParam::KeySize(KeySizeInBits(1000)),
                KeyParam::RsaPublicExponent(RsaExponent(3)),
            ],
            ErrorCode::UnsupportedKeySize,
        ),
        (
            vec![
                KeyParam::Algorithm(Algorithm::Rsa),
                KeyParam::KeySize(KeySizeInBits(2048)),
                KeyParam::RsaPublicExponent(RsaExponent(65537)),
                KeyParam::Purpose(KeyPurpose::AttestKey),
                KeyParam::Purpose(KeyPurpose::Decrypt),
            ],
            ErrorCode::IncompatiblePurpose,
        ),
        (vec![KeyParam::Algorithm(Algorithm::Ec)], ErrorCode::UnsupportedKeySize),
        (
            vec![KeyParam::Algorithm(Algorithm::Ec), KeyParam::EcCurve(EcCurve::P224)],
            ErrorCode::UnsupportedEcCurve,
        ),
        (
            vec![
                KeyParam::Algorithm(Algorithm::Ec),
                KeyParam::EcCurve(EcCurve::P256),
                KeyParam::KeySize(KeySizeInBits(384)),
            ],
            ErrorCode::InvalidArgument,
        ),
        (
            vec![
                KeyParam::Algorithm(Algorithm::Ec),
                KeyParam::EcCurve(EcCurve::P256),
                KeyParam::Purpose(KeyPurpose::AttestKey),
                KeyParam::Purpose(KeyPurpose::Sign),
            ],
            ErrorCode::IncompatiblePurpose,
        ),
        (
            vec![KeyParam::Algorithm(Algorithm::TripleDes), KeyParam::KeySize(KeySizeInBits(192))],
            ErrorCode::UnsupportedKeySize,
        ),
    ];
    for (params, want) in tests {
        let got = check_key_gen_params(&params).unwrap_err().code();
        assert_eq!(got, want, "for {:?}", params);
    }
}

#[test]
fn test_check_asymmetric_import_params() {
    let des = vec![KeyParam::Algorithm(Algorithm::TripleDes)];
    let (material, deduced) = import(&des, KeyFormat::Raw, &[3; 24]).unwrap();
    assert_eq!(material.algorithm(), Algorithm::TripleDes);
    assert_eq!(deduced, vec![KeyParam::KeySize(KeySizeInBits(168))]);

    // Asymmetric keys arrive as PKCS#8, checked before the material is parsed.
    for algo in [Algorithm::Rsa, Algorithm::Ec] {
        let err = import(&[KeyParam::Algorithm(algo)], KeyFormat::Raw, &[1; 32]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedKeyFormat);
    }
    let err = import(&[KeyParam::Algorithm(Algorithm::Rsa)], KeyFormat::Pkcs8, b"junk");
    assert_eq!(err.unwrap_err().code(), ErrorCode::InvalidArgument);
}

fn rsa_chars(key_size: u32) -> Vec<KeyParam> {
    vec![
        KeyParam::Algorithm(Algorithm::Rsa),
        KeyParam::KeySize(KeySizeInBits(key_size)),
        KeyParam::RsaPublicExponent(RsaExponent(65537)),
        KeyParam::Purpose(KeyPurpose::Sign),
        KeyParam::Purpose(KeyPurpose::Decrypt),
        KeyParam::Purpose(KeyPurpose::WrapKey),
        KeyParam::Digest(Digest::None),
        KeyParam::Digest(Digest::Sha256),
        KeyParam::Digest(Digest::Sha512),
        KeyParam::Padding(PaddingMode::None),
        KeyParam::Padding(PaddingMode::RsaPss),
        KeyParam::Padding(PaddingMode::RsaOaep),
        KeyParam::Padding(PaddingMode::RsaPkcs115Sign),
        KeyParam::RsaOaepMgfDigest(Digest::Sha256),
    ]
}

#[test]
fn test_check_begin_rsa_params() {
    let chars = rsa_chars(1024);
    let pss = vec![KeyParam::Padding(PaddingMode::RsaPss), KeyParam::Digest(Digest::Sha256)];
    check_begin_params(&chars, KeyPurpose::Sign, &pss).unwrap();
    let oaep = vec![
        KeyParam::Padding(PaddingMode::RsaOaep),
        KeyParam::Digest(Digest::Sha256),
        KeyParam::RsaOaepMgfDigest(Digest::Sha256),
    ];
    check_begin_params(&chars, KeyPurpose::Decrypt, &oaep).unwrap();

    let tests = vec![
        (
            KeyPurpose::Sign,
            vec![KeyParam::Padding(PaddingMode::RsaPss), KeyParam::Digest(Digest::Sha512)],
            ErrorCode::IncompatibleDigest,
        ),
        (
            KeyPurpose::Sign,
            vec![KeyParam::Padding(PaddingMode::None), KeyParam::Digest(Digest::Sha256)],
            ErrorCode::IncompatibleDigest,
        ),
        (
            KeyPurpose::Decrypt,
            vec![KeyParam::Padding(PaddingMode::RsaOaep)],
            ErrorCode::UnsupportedDigest,
        ),
        (
            // The default SHA-1 MGF digest is not among the key's.
            KeyPurpose::Decrypt,
            vec![KeyParam::Padding(PaddingMode::RsaOaep), KeyParam::Digest(Digest::Sha256)],
            ErrorCode::IncompatibleMgfDigest,
        ),
        (
            KeyPurpose::Sign,
            vec![KeyParam::Padding(PaddingMode::RsaOaep), KeyParam::Digest(Digest::Sha256)],
            ErrorCode::UnsupportedPaddingMode,
        ),
        (KeyPurpose::Verify, vec![], ErrorCode::UnsupportedPurpose),
        (KeyPurpose::Encrypt, vec![], ErrorCode::UnsupportedPurpose),
    ];
    for (purpose, params, want) in tests {
        let got = check_begin_params(&chars, purpose, &params).unwrap_err().code();
        assert_eq!(got, want, "for {:?} {:?}", purpose, params);
    }

    let attest = vec![
        KeyParam::Algorithm(Algorithm::Rsa),
        KeyParam::KeySize(KeySizeInBits(2048)),
        KeyParam::Purpose(KeyPurpose::AttestKey),
    ];
    let err = check_begin_params(&attest, KeyPurpose::AttestKey, &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IncompatiblePurpose);
}

#[test]
fn test_check_begin_ec_and_3des_params() {
    let ec = vec![
        KeyParam::Algorithm(Algorithm::Ec),
        KeyParam::EcCurve(EcCurve::P256),
        KeyParam::Purpose(KeyPurpose::Sign),
        KeyParam::Digest(Digest::Md5),
        KeyParam::Digest(Digest::Sha256),
    ];
    check_begin_params(&ec, KeyPurpose::Sign, &[KeyParam::Digest(Digest::Sha256)]).unwrap();
    let err = check_begin_params(&ec, KeyPurpose::Sign, &[KeyParam::Digest(Digest::Md5)]);
    assert_eq!(err.unwrap_err().code(), ErrorCode::UnsupportedDigest);

    let des = vec![
        KeyParam::Algorithm(Algorithm::TripleDes),
        KeyParam::KeySize(KeySizeInBits(168)),
        KeyParam::Purpose(KeyPurpose::Encrypt),
        KeyParam::BlockMode(BlockMode::Cbc),
        KeyParam::BlockMode(BlockMode::Ctr),
        KeyParam::Padding(PaddingMode::Pkcs7),
        KeyParam::CallerNonce,
    ];
    let cbc = vec![
        KeyParam::BlockMode(BlockMode::Cbc),
        KeyParam::Padding(PaddingMode::Pkcs7),
        KeyParam::Nonce(vec![0; 8]),
    ];
    check_begin_params(&des, KeyPurpose::Encrypt, &cbc).unwrap();
    let long_nonce = vec![
        KeyParam::BlockMode(BlockMode::Cbc),
        KeyParam::Padding(PaddingMode::Pkcs7),
        KeyParam::Nonce(vec![0; 16]),
    ];
    let err = check_begin_params(&des, KeyPurpose::Encrypt, &long_nonce).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidNonce);
    let ctr = vec![KeyParam::BlockMode(BlockMode::Ctr), KeyParam::Padding(PaddingMode::None)];
    let err = check_begin_params(&des, KeyPurpose::Encrypt, &ctr).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedBlockMode);
}

#[test]
fn test_check_rsa_wrapping_key_params() {
    let chars = rsa_chars(2048);
    let params = vec![
        KeyParam::Padding(PaddingMode::RsaOaep),
        KeyParam::Digest(Digest::Sha256),
        KeyParam::RsaOaepMgfDigest(Digest::Sha256),
    ];
    assert_eq!(
        check_rsa_wrapping_key_params(&chars, &params).unwrap(),
        DecryptionMode::OaepPadding { msg_digest: Digest::Sha256, mgf_digest: Digest::Sha256 }
    );

    let pss = vec![KeyParam::Padding(PaddingMode::RsaPss), KeyParam::Digest(Digest::Sha256)];
    let err = check_rsa_wrapping_key_params(&chars, &pss).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IncompatiblePaddingMode);
    let sha512 = vec![KeyParam::Padding(PaddingMode::RsaOaep), KeyParam::Digest(Digest::Sha512)];
    let err = check_rsa_wrapping_key_params(&chars, &sha512).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IncompatibleDigest);

    let no_wrap: Vec<KeyParam> =
        chars.into_iter().filter(|p| *p != KeyParam::Purpose(KeyPurpose::WrapKey)).collect();
    let err = check_rsa_wrapping_key_params(&no_wrap, &params).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IncompatiblePurpose);
}

#[test]
fn test_primary_purpose_and_mgf_default() {
    let params = vec![
        KeyParam::Algorithm(Algorithm::Ec),
        KeyParam::Purpose(KeyPurpose::AgreeKey),
        KeyParam::Purpose(KeyPurpose::Sign),
    ];
    assert_eq!(primary_purpose(&params).unwrap(), KeyPurpose::AgreeKey);
    assert_eq!(primary_purpose(&[]).unwrap_err().code(), ErrorCode::IncompatiblePurpose);
    assert_eq!(get_mgf_digest(&params).unwrap(), Digest::Sha1);
    let explicit = vec![KeyParam::RsaOaepMgfDigest(Digest::Sha256)];
    assert_eq!(get_mgf_digest(&explicit).unwrap(), Digest::Sha256);
}

#[test]
fn test_cert_serial_and_subject_defaults() {
    assert_eq!(get_cert_serial(&[]).unwrap(), &[0x01]);
    assert_eq!(get_cert_subject(&[]).unwrap(), keymint::DEFAULT_CERT_SUBJECT);
    let params = vec![
        KeyParam::CertificateSerial(vec![0x12, 0x34]),
        KeyParam::CertificateSubject(vec![0x30, 0x00]),
    ];
    assert_eq!(get_cert_serial(&params).unwrap(), &[0x12, 0x34]);
    assert_eq!(get_cert_subject(&params).unwrap(), &[0x30, 0x00]);
    // An empty subject is treated as absent.
    let empty = vec![KeyParam::CertificateSubject(vec![])];
    assert_eq!(get_cert_subject(&empty).unwrap(), keymint::DEFAULT_CERT_SUBJECT);
    let dup = vec![KeyParam::CertificateSerial(vec![1]), KeyParam::CertificateSerial(vec![2])];
    expect_err!(get_cert_serial(&dup), "duplicate tag");
}
