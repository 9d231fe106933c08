use super::*;
use crate::{primary::cipher_child_template, primary::PrimaryKeyBuilder, NV_INDEX_FIRST};

fn started(max: u32) -> MockTpm {
    let mut tpm = MockTpm::with_max_transient_objects(max);
    tpm.startup().unwrap();
    tpm
}

fn signing(unique: &[u8]) -> Public {
    PrimaryKeyBuilder::signing(unique).template().unwrap()
}

fn parent(unique: &[u8]) -> Public {
    PrimaryKeyBuilder::parent(unique).template().unwrap()
}

fn buffer(data: &[u8]) -> MaxBuffer {
    MaxBuffer::try_from(data.to_vec()).unwrap()
}

fn zero_iv() -> InitialValue {
    InitialValue::try_from(vec![0u8; AES_BLOCK_SIZE]).unwrap()
}

fn mnemonic<T: std::fmt::Debug>(result: Result<T, TpmError>) -> &'static str {
    match result.unwrap_err() {
        TpmError::Response(m) => m,
        TpmError::NvDefined => "TPM_RC_NV_DEFINED",
        TpmError::NvUninitialized => "TPM_RC_NV_UNINITIALIZED",
        TpmError::ObjectMemory => "TPM_RC_OBJECT_MEMORY",
        TpmError::Initialize => "TPM_RC_INITIALIZE",
        e => panic!("unexpected error {:?}", e),
    }
}

#[test]
fn test_kdfa() {
    let k1 = kdfa(b"key", "label", b"u", b"v", 128);
    assert_eq!(k1.len(), 16);
    assert_eq!(k1, kdfa(b"key", "label", b"u", b"v", 128));
    assert_ne!(k1, kdfa(b"key", "other", b"u", b"v", 128));
    assert_ne!(k1, kdfa(b"key", "label", b"x", b"v", 128));
    let long = kdfa(b"key", "label", b"u", b"v", 520);
    assert_eq!(long.len(), 65);
}

#[test]
fn test_requires_startup() {
    let mut tpm = MockTpm::new();
    assert_eq!(mnemonic(tpm.create_primary(signing(b"x"))), "TPM_RC_INITIALIZE");
    tpm.startup().unwrap();
    // Starting a running TPM is tolerated.
    tpm.startup().unwrap();
    assert_eq!(tpm.max_transient_objects().unwrap(), 3);
}

#[test]
fn test_primary_deterministic() {
    let mut tpm = started(3);
    let a = tpm.create_primary(signing(b"first")).unwrap();
    let b = tpm.create_primary(signing(b"first")).unwrap();
    let c = tpm.create_primary(signing(b"second")).unwrap();
    assert_ne!(a, b);
    let mac_a = tpm.hmac(a, buffer(b"data")).unwrap();
    assert_eq!(mac_a.len(), 32);
    assert_eq!(mac_a, tpm.hmac(b, buffer(b"data")).unwrap());
    assert_ne!(mac_a, tpm.hmac(c, buffer(b"data")).unwrap());

    // A different TPM has a different owner seed.
    let mut other = started(3);
    let d = other.create_primary(signing(b"first")).unwrap();
    assert_ne!(mac_a, other.hmac(d, buffer(b"data")).unwrap());
}

#[test]
fn test_transient_limit() {
    let mut tpm = started(2);
    let a = tpm.create_primary(signing(b"a")).unwrap();
    let _b = tpm.create_primary(signing(b"b")).unwrap();
    assert_eq!(mnemonic(tpm.create_primary(signing(b"c"))), "TPM_RC_OBJECT_MEMORY");
    tpm.flush_context(a.into()).unwrap();
    tpm.create_primary(signing(b"c")).unwrap();
    assert_eq!(mnemonic(tpm.flush_context(a.into())), "TPM_RC_HANDLE");
}

#[test]
fn test_child_wrap_and_load() {
    let mut tpm = started(3);
    let p = tpm.create_primary(parent(b"")).unwrap();
    let (private, public) = tpm.create(p, cipher_child_template().unwrap()).unwrap();
    let child = tpm.load(p, private.clone(), public.clone()).unwrap();
    let msg = b"a message that spans more than one block";
    let (ct, _) = tpm.encrypt_decrypt(child, false, zero_iv(), buffer(msg)).unwrap();
    assert_ne!(ct.value(), &msg[..]);
    tpm.flush_context(child.into()).unwrap();

    let loaded = tpm.load(p, private.clone(), public.clone()).unwrap();
    let (pt, _) = tpm.encrypt_decrypt(loaded, true, zero_iv(), ct).unwrap();
    assert_eq!(pt.value(), &msg[..]);
    tpm.flush_context(loaded.into()).unwrap();

    let mut tampered = private.value().to_vec();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    let tampered = Private::try_from(tampered).unwrap();
    assert_eq!(mnemonic(tpm.load(p, tampered, public.clone())), "TPM_RC_INTEGRITY");

    // The public area is bound to the private one.
    let other_public = with_unique(&public, vec![0x01; 32]).unwrap();
    assert_eq!(mnemonic(tpm.load(p, private.clone(), other_public)), "TPM_RC_INTEGRITY");

    // Children cannot be loaded under a different parent.
    tpm.flush_context(p.into()).unwrap();
    let p2 = tpm.create_primary(parent(b"other parent")).unwrap();
    assert_eq!(mnemonic(tpm.load(p2, private, public)), "TPM_RC_INTEGRITY");
}

#[test]
fn test_restricted_key_cannot_encrypt() {
    let mut tpm = started(3);
    let p = tpm.create_primary(parent(b"")).unwrap();
    let result = tpm.encrypt_decrypt(p, false, zero_iv(), buffer(b"data"));
    assert_eq!(mnemonic(result), "TPM_RC_ATTRIBUTES");
    let s = tpm.create_primary(signing(b"")).unwrap();
    assert_eq!(mnemonic(tpm.create(s, cipher_child_template().unwrap())), "TPM_RC_TYPE");
}

#[test]
fn test_cfb_chaining() {
    let mut tpm = started(3);
    let p = tpm.create_primary(parent(b"")).unwrap();
    let (private, public) = tpm.create(p, cipher_child_template().unwrap()).unwrap();
    let key = tpm.load(p, private, public).unwrap();
    let data: Vec<u8> = (0..80u8).collect();
    let (whole, _) = tpm.encrypt_decrypt(key, false, zero_iv(), buffer(&data)).unwrap();

    let mut iv = zero_iv();
    let mut pieces = Vec::new();
    for chunk in data.chunks(32) {
        let (out, next) = tpm.encrypt_decrypt(key, false, iv, buffer(chunk)).unwrap();
        pieces.extend_from_slice(out.value());
        iv = next;
    }
    assert_eq!(whole.value(), &pieces[..]);

    let mut iv = zero_iv();
    let mut plain = Vec::new();
    for chunk in whole.value().chunks(48) {
        let (out, next) = tpm.encrypt_decrypt(key, true, iv, buffer(chunk)).unwrap();
        plain.extend_from_slice(out.value());
        iv = next;
    }
    assert_eq!(plain, data);
}

#[test]
fn test_hmac_sequence() {
    let mut tpm = started(3);
    let key = tpm.create_primary(signing(b"seq")).unwrap();
    let data = vec![0x5au8; 1000];
    let single = tpm.hmac(key, buffer(&data)).unwrap();

    let auth = Auth::try_from(b"auth".to_vec()).unwrap();
    let seq = tpm.hmac_start(key, auth).unwrap();
    tpm.sequence_update(seq, buffer(&data[..300])).unwrap();
    tpm.sequence_update(seq, buffer(&data[300..600])).unwrap();
    assert_eq!(tpm.sequence_complete(seq, buffer(&data[600..])).unwrap(), single);
    // Completing the sequence flushed it.
    assert_eq!(mnemonic(tpm.flush_context(seq)), "TPM_RC_HANDLE");
}

#[test]
fn test_nv() {
    let mut tpm = started(3);
    let index = NvIndexTpmHandle::new(NV_INDEX_FIRST + 0x1234).unwrap();
    let nv = |data: &[u8]| MaxNvBuffer::try_from(data.to_vec()).unwrap();
    tpm.nv_define_space(index, 8).unwrap();
    assert_eq!(tpm.nv_defined(), 1);
    assert_eq!(mnemonic(tpm.nv_define_space(index, 8)), "TPM_RC_NV_DEFINED");
    assert_eq!(mnemonic(tpm.nv_read(index, 0, 8)), "TPM_RC_NV_UNINITIALIZED");
    tpm.nv_write(index, 2, nv(b"abc")).unwrap();
    assert_eq!(tpm.nv_read(index, 2, 3).unwrap().value(), b"abc");
    assert_eq!(tpm.nv_read(index, 0, 2).unwrap().value(), &[0, 0]);
    assert_eq!(mnemonic(tpm.nv_write(index, 6, nv(b"abc"))), "TPM_RC_NV_RANGE");
    assert_eq!(mnemonic(tpm.nv_read(index, 4, 5)), "TPM_RC_NV_RANGE");
    tpm.nv_undefine_space(index).unwrap();
    assert_eq!(mnemonic(tpm.nv_read(index, 0, 1)), "TPM_RC_HANDLE");
    assert_eq!(mnemonic(tpm.nv_undefine_space(index)), "TPM_RC_HANDLE");
    assert_eq!(tpm.nv_defined(), 0);
}

#[test]
fn test_get_random() {
    let mut tpm = started(3);
    let a = tpm.get_random(16).unwrap();
    assert_eq!(a.len(), 16);
    assert_ne!(a, tpm.get_random(16).unwrap());
    assert_eq!(tpm.get_random(100).unwrap().len(), 32);
}
