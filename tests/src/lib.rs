//! Test methods to confirm basic functionality of trait implementations.

use senv_common::crypto::{
    aes, des, hmac, Aes, ConstTimeEq, Des, DeviceHmac, DeviceKey, Hmac, MonotonicClock, Rng,
    SymmetricOperation,
};
use senv_common::keyblob::{
    secure_deletion_slot, InMemorySlotManager, KeyBlobMaker, SecureDeletionSecretManager,
    SlotPurpose,
};
use senv_wire::keymint::{Algorithm, Digest, ErrorCode, KeyOrigin, KeyParam, KeySizeInBits};

/// Test basic [`Rng`] functionality.
pub fn test_rng<R: Rng>(rng: &mut R) {
    let u1 = rng.next_u64();
    let u2 = rng.next_u64();
    assert_ne!(u1, u2);

    let mut b1 = [0u8; 16];
    let mut b2 = [0u8; 16];
    rng.fill_bytes(&mut b1);
    rng.fill_bytes(&mut b2);
    assert_ne!(b1, b2);

    rng.add_entropy(&b1);
    rng.add_entropy(&[]);
    rng.fill_bytes(&mut b1);
    assert_ne!(b1, b2);
}

/// Test basic [`ConstTimeEq`] functionality. Does not test the key constant-time property though.
pub fn test_eq<E: ConstTimeEq>(comparator: E) {
    let b0 = [];
    let b1 = [0u8, 1u8, 2u8];
    let b2 = [1u8, 1u8, 2u8];
    let b3 = [0u8, 1u8, 2u8, 3u8];
    let b4 = [42; 4096];
    let mut b5 = [42; 4096];
    b5[4095] = 43;
    assert!(comparator.eq(&b0, &b0));
    assert!(comparator.eq(&b4, &b4));
    assert!(comparator.eq(&b1, &b1));

    assert!(comparator.ne(&b0, &b1));
    assert!(comparator.ne(&b1, &b2));
    assert!(comparator.ne(&b1, &b3));
    assert!(comparator.ne(&b4, &b5));
}

/// Test basic [`MonotonicClock`] functionality.
pub fn test_clock<C: MonotonicClock>(clock: C) {
    let t1 = clock.now();
    let t2 = clock.now();
    assert!(t2.0 >= t1.0);
    std::thread::sleep(std::time::Duration::from_millis(400));
    let t3 = clock.now();
    assert!(t3.0 > (t1.0 + 200));
}

/// Test basic HMAC functionality.
pub fn test_hmac<H: Hmac>(hmac: H) {
    struct TestCase {
        digest: Digest,
        key: &'static [u8],
        data: &'static [u8],
        expected_mac: &'static str,
    }

    // Test cases from RFC 2202 and RFC 4231.
    let tests = [
        TestCase {
            digest: Digest::Sha1,
            key: &[0x0b; 20],
            data: b"Hi There",
            expected_mac: "b617318655057264e28bc0b6fb378c8ef146be00",
        },
        TestCase {
            digest: Digest::Sha256,
            key: &[0x0b; 20],
            data: b"Hi There",
            expected_mac: "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7",
        },
        TestCase {
            digest: Digest::Sha224,
            key: b"Jefe",
            data: b"what do ya want for nothing?",
            expected_mac: "a30e01098bc6dbbf45690f3a7e9e6d0f8bbea2a39e6148008fd05e44",
        },
        TestCase {
            digest: Digest::Sha256,
            key: b"Jefe",
            data: b"what do ya want for nothing?",
            expected_mac: "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843",
        },
        TestCase {
            digest: Digest::Sha384,
            key: &[0xaa; 20],
            data: &[0xdd; 50],
            expected_mac: concat!(
                "88062608d3e6ad8a0aa2ace014c8a86f",
                "0aa635d947ac9febe83ef4e55966144b",
                "2a5ab39dc13814b94e3ab6e101a34f27"
            ),
        },
        TestCase {
            digest: Digest::Sha512,
            key: &[0xaa; 20],
            data: &[0xdd; 50],
            expected_mac: concat!(
                "fa73b0089d56a284efb0f0756c890be9",
                "b1b5dbdd8ee81a3655f83e33b2279d39",
                "bf3e848279a722c806b485a47e67c807",
                "b946a337bee8942674278859e13292fb"
            ),
        },
    ];

    for (i, test) in tests.iter().enumerate() {
        let mut op = hmac.begin(hmac::Key::new_from(test.key), test.digest).unwrap();
        // Feed the data in two pieces to exercise accumulation.
        let (first, second) = test.data.split_at(test.data.len() / 2);
        op.update(first).unwrap();
        op.update(second).unwrap();
        let mac = op.finish().unwrap();
        assert_eq!(hex::encode(&mac), test.expected_mac, "incorrect mac in test case {}", i);
    }

    let result = hmac.begin(hmac::Key::new_from(b"key"), Digest::Md5);
    assert!(result.is_err());
}

fn aes_key(hex_key: &str) -> aes::Key {
    aes::Key::new_from(&hex::decode(hex_key).unwrap()).unwrap()
}

fn run_emitting(
    aes: &dyn Aes,
    key: aes::Key,
    mode: aes::CipherMode,
    dir: SymmetricOperation,
    chunks: &[&[u8]],
) -> Result<Vec<u8>, senv_common::Error> {
    let mut op = aes.begin(key, mode, dir)?;
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend_from_slice(&op.update(chunk)?);
    }
    out.extend_from_slice(&op.finish()?);
    Ok(out)
}

/// Test AES-ECB, AES-CBC and AES-CTR functionality.
pub fn test_aes_modes<A: Aes>(aes: A) {
    // Test vectors from NIST SP 800-38A, Appendix F.
    let key = "2b7e151628aed2a6abf7158809cf4f3c";
    let msg = hex::decode("6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51")
        .unwrap();
    let iv: [u8; 16] = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap().try_into().unwrap();
    let ctr: [u8; 16] =
        hex::decode("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff").unwrap().try_into().unwrap();

    let tests = [
        (
            aes::CipherMode::EcbNoPadding,
            "3ad77bb40d7a3660a89ecaf32466ef97f5d3d58503b9699de785895a96fdbaaf",
        ),
        (
            aes::CipherMode::CbcNoPadding { nonce: iv },
            "7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2",
        ),
        (
            aes::CipherMode::Ctr { nonce: ctr },
            "874d6191b620e3261bef6864990db6ce9806f66b7970fdff8617187bb9fffdff",
        ),
    ];
    for (mode, want) in tests {
        // Split input at an odd boundary to exercise buffering.
        let chunks: [&[u8]; 3] = [&msg[..5], &msg[5..21], &msg[21..]];
        let got = run_emitting(&aes, aes_key(key), mode, SymmetricOperation::Encrypt, &chunks)
            .unwrap();
        assert_eq!(hex::encode(&got), want, "for {:?}", mode);

        let ct = hex::decode(want).unwrap();
        let got = run_emitting(&aes, aes_key(key), mode, SymmetricOperation::Decrypt, &[&ct])
            .unwrap();
        assert_eq!(got, msg, "for {:?}", mode);
    }

    // PKCS#7 padding adds a full block when the input is block-aligned.
    for mode in [aes::CipherMode::EcbPkcs7Padding, aes::CipherMode::CbcPkcs7Padding { nonce: iv }] {
        for len in [0usize, 1, 15, 16, 17, 32] {
            let pt = vec![0x5a; len];
            let ct = run_emitting(&aes, aes_key(key), mode, SymmetricOperation::Encrypt, &[&pt])
                .unwrap();
            assert_eq!(ct.len(), (len / 16 + 1) * 16);
            let got = run_emitting(&aes, aes_key(key), mode, SymmetricOperation::Decrypt, &[&ct])
                .unwrap();
            assert_eq!(got, pt);
        }
    }

    // Unpadded block modes reject partial blocks.
    let result = run_emitting(
        &aes,
        aes_key(key),
        aes::CipherMode::EcbNoPadding,
        SymmetricOperation::Encrypt,
        &[&msg[..20]],
    );
    assert_eq!(result.unwrap_err().code(), ErrorCode::InvalidInputLength);
}

/// Test basic AES-GCM functionality.
pub fn test_aes_gcm<A: Aes>(aes: A) {
    struct TestCase {
        key: &'static str,
        iv: &'static str,
        aad: &'static str,
        msg: &'static str,
        ct: &'static str,
        tag: &'static str,
    }
    // Test vectors from Wycheproof:
    // https://github.com/google/wycheproof/blob/master/testvectors/aes_gcm_test.json
    let tests = vec![
        TestCase {
            key: "5b9604fe14eadba931b0ccf34843dab9",
            iv: "028318abc1824029138141a2",
            aad: "",
            msg: "001d0c231287c1182784554ca3a21908",
            ct: "26073cc1d851beff176384dc9896d5ff",
            tag: "0a3ea7a5487cb5f7d70fb6c58d038554",
        },
        TestCase {
            key: "5b9604fe14eadba931b0ccf34843dab9",
            iv: "921d2507fa8007b7bd067d34",
            aad: "00112233445566778899aabbccddeeff",
            msg: "001d0c231287c1182784554ca3a21908",
            ct: "49d8b9783e911913d87094d1f63cc765",
            tag: "1e348ba07cca2cf04c618cb4d43a5b92",
        },
    ];
    for test in tests {
        let nonce: [u8; 12] = hex::decode(test.iv).unwrap().try_into().unwrap();
        let aad = hex::decode(test.aad).unwrap();
        let msg = hex::decode(test.msg).unwrap();

        let mode = aes::GcmMode { nonce, tag_len: 16 };
        let mut op = aes.begin_aead(aes_key(test.key), mode, SymmetricOperation::Encrypt).unwrap();
        op.update_aad(&aad).unwrap();
        let mut got_ct = op.update(&msg).unwrap();
        got_ct.extend_from_slice(&op.finish().unwrap());
        assert_eq!(format!("{}{}", test.ct, test.tag), hex::encode(&got_ct));

        let mut op = aes.begin_aead(aes_key(test.key), mode, SymmetricOperation::Decrypt).unwrap();
        op.update_aad(&aad).unwrap();
        let mut got_pt = op.update(&got_ct).unwrap();
        got_pt.extend_from_slice(&op.finish().unwrap());
        assert_eq!(test.msg, hex::encode(&got_pt));

        // Truncated tag should still decrypt.
        let mode = aes::GcmMode { nonce, tag_len: 12 };
        let mut op = aes.begin_aead(aes_key(test.key), mode, SymmetricOperation::Decrypt).unwrap();
        op.update_aad(&aad).unwrap();
        let mut got_pt = op.update(&got_ct[..got_ct.len() - 4]).unwrap();
        got_pt.extend_from_slice(&op.finish().unwrap());
        assert_eq!(test.msg, hex::encode(&got_pt));

        // Corrupted ciphertext should not decrypt.
        let mut op = aes.begin_aead(aes_key(test.key), mode, SymmetricOperation::Decrypt).unwrap();
        op.update_aad(&aad).unwrap();
        let mut corrupt_ct = got_ct[..got_ct.len() - 4].to_vec();
        corrupt_ct[0] ^= 0x01;
        let _corrupt_pt = op.update(&corrupt_ct).unwrap();
        let result = op.finish();
        assert!(result.is_err());
    }
}

/// Test 3-DES in ECB and CBC modes.
pub fn test_des<D: Des>(des: D) {
    // Example from NIST SP 800-67 Rev. 1, Appendix B.
    let key = des::Key::new_from(
        &hex::decode("0123456789abcdef23456789abcdef01456789abcdef0123").unwrap(),
    )
    .unwrap();
    let msg = b"The qufck brown fox jump";
    let want = "a826fd8ce53b855fcce21c8112256fe668d5c05dd9b6b900";
    let run = |mode: des::Mode, dir: SymmetricOperation, chunks: &[&[u8]]| {
        let mut op = des.begin(key.clone(), mode, dir)?;
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend_from_slice(&op.update(chunk)?);
        }
        out.extend_from_slice(&op.finish()?);
        Ok::<_, senv_common::Error>(out)
    };

    let ecb = des::Mode::EcbNoPadding;
    let ct = run(ecb, SymmetricOperation::Encrypt, &[&msg[..3], &msg[3..]]).unwrap();
    assert_eq!(hex::encode(&ct), want);
    let pt = run(ecb, SymmetricOperation::Decrypt, &[&ct]).unwrap();
    assert_eq!(pt, msg.to_vec());

    // CBC chains blocks, so repeated plaintext blocks encrypt differently.
    let cbc = des::Mode::CbcPkcs7Padding { nonce: [7; des::BLOCK_SIZE] };
    let repeated = [0x33u8; 16];
    let ct = run(cbc, SymmetricOperation::Encrypt, &[&repeated]).unwrap();
    assert_eq!(ct.len(), 24);
    assert_ne!(ct[..8], ct[8..16]);
    let pt = run(cbc, SymmetricOperation::Decrypt, &[&ct[..5], &ct[5..]]).unwrap();
    assert_eq!(pt, repeated.to_vec());

    let result = run(ecb, SymmetricOperation::Encrypt, &[&msg[..20]]);
    assert_eq!(result.unwrap_err().code(), ErrorCode::InvalidInputLength);
}

/// Test that device keys are deterministic and independent of each other.
pub fn test_device_hmac<D: DeviceHmac>(device: &D) {
    let a1 = device.hmac(DeviceKey::AuthToken, b"data").unwrap();
    let a2 = device.hmac(DeviceKey::AuthToken, b"data").unwrap();
    assert_eq!(a1.len(), 32);
    assert_eq!(a1, a2);
    assert_ne!(a1, device.hmac(DeviceKey::AuthToken, b"datb").unwrap());
    assert_ne!(a1, device.hmac(DeviceKey::ConfirmationToken, b"data").unwrap());
    assert_ne!(a1, device.hmac(DeviceKey::Password, b"data").unwrap());
    assert_ne!(a1, device.hmac(DeviceKey::KeymasterEnforcement, b"data").unwrap());
}

/// Test the round trip and integrity properties of a [`KeyBlobMaker`].
pub fn test_key_blob_maker<K: KeyBlobMaker, R: Rng>(maker: &mut K, rng: &mut R) {
    let mut secrets = InMemorySlotManager::<4>::default();
    maker.set_system_version(14, 202403);
    let description = vec![
        KeyParam::Algorithm(Algorithm::Aes),
        KeyParam::KeySize(KeySizeInBits(128)),
        KeyParam::UsageCountLimit(1),
        KeyParam::ApplicationId(b"app_id".to_vec()),
        KeyParam::ApplicationData(b"app_data".to_vec()),
    ];
    let material = [0x42u8; 16];
    let created = maker
        .create(
            &description,
            KeyOrigin::Imported,
            &material,
            Some(&mut secrets),
            &mut *rng,
            SlotPurpose::KeyImport,
        )
        .unwrap();
    assert!(created.hw_enforced.contains(&KeyParam::Origin(KeyOrigin::Imported)));
    assert!(created.hw_enforced.contains(&KeyParam::OsPatchlevel(202403)));
    assert_eq!(created.sw_enforced, vec![KeyParam::UsageCountLimit(1)]);
    let slot = secure_deletion_slot(&created.blob).unwrap();

    let key = maker.unwrap(&created.blob, &description, Some(&secrets)).unwrap();
    assert_eq!(key.key_material, material.to_vec());
    assert_eq!(key.hw_enforced, created.hw_enforced);
    assert_eq!(key.sw_enforced, created.sw_enforced);

    // Each blob gets fresh protection.
    let again = maker
        .create(
            &description,
            KeyOrigin::Imported,
            &material,
            Some(&mut secrets),
            &mut *rng,
            SlotPurpose::KeyImport,
        )
        .unwrap();
    assert_ne!(again.blob, created.blob);
    assert_ne!(secure_deletion_slot(&again.blob), Some(slot));

    let wrong_app = vec![
        KeyParam::ApplicationId(b"other".to_vec()),
        KeyParam::ApplicationData(b"app_data".to_vec()),
    ];
    let err = maker.unwrap(&created.blob, &wrong_app, Some(&secrets)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidKeyBlob);
    let err = maker.unwrap(&created.blob, &[], Some(&secrets)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidKeyBlob);

    for idx in [0, 1, created.blob.len() / 2, created.blob.len() - 1] {
        let mut corrupt = created.blob.clone();
        corrupt[idx] ^= 0x01;
        let err = maker.unwrap(&corrupt, &description, Some(&secrets)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidKeyBlob, "flipped byte {}", idx);
    }
    let truncated = &created.blob[..created.blob.len() - 1];
    let err = maker.unwrap(truncated, &description, Some(&secrets)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidKeyBlob);

    // Re-wrapping keeps the contents.
    let hidden = senv_common::tag::hidden(&description).unwrap();
    let purpose = SlotPurpose::KeyUpgrade;
    let blob =
        maker.unvalidated_create(&key, &hidden, Some(&mut secrets), &mut *rng, purpose).unwrap();
    let rewrapped = maker.unwrap(&blob, &description, Some(&secrets)).unwrap();
    assert_eq!(rewrapped, key);

    // Deleting the slot makes the blob unusable.
    secrets.delete_secret(slot).unwrap();
    let err = maker.unwrap(&created.blob, &description, Some(&secrets)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidKeyBlob);
    assert!(maker.unwrap(&again.blob, &description, Some(&secrets)).is_ok());
}
