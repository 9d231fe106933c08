use super::*;
use crate::mock::MockTpm;
use crate::Tpm;
use std::cell::Cell;

fn manager() -> Arc<ResourceManager> {
    let mut tpm = MockTpm::new();
    tpm.startup().unwrap();
    Arc::new(ResourceManager::new(Box::new(tpm)))
}

/// Records whether it was asked to parse anything.
#[derive(Default)]
struct Recorder {
    data: Vec<u8>,
    parsed: Cell<bool>,
}

impl Serializable for Recorder {
    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        self.data.serialize(out)
    }

    fn deserialize<'a>(&mut self, data: &'a [u8]) -> Result<&'a [u8], Error> {
        self.parsed.set(true);
        self.data.deserialize(data)
    }
}

#[test]
fn test_composite() {
    let mut a = b"first".to_vec();
    let mut b = vec![0xffu8; 100];
    let mut c = vec![KeyParam::KeySize(senv_common::wire::keymint::KeySizeInBits(256))];
    let encoded = Composite::new(vec![&mut a as &mut dyn Serializable, &mut b, &mut c])
        .to_bytes()
        .unwrap();
    assert_eq!(
        encoded.len(),
        a.to_bytes().unwrap().len() + b.to_bytes().unwrap().len() + c.to_bytes().unwrap().len()
    );

    let mut a2 = Vec::new();
    let mut b2 = Vec::new();
    let mut c2: Vec<KeyParam> = Vec::new();
    let mut input = encoded.clone();
    input.extend_from_slice(b"tail");
    let rest = Composite::new(vec![&mut a2 as &mut dyn Serializable, &mut b2, &mut c2])
        .deserialize(&input)
        .unwrap();
    assert_eq!(rest, b"tail");
    assert_eq!((a2, b2, c2), (a, b, c));
}

#[test]
fn test_encrypted_round_trip() {
    let rm = manager();
    let parent = PrimaryKeyBuilder::parent(b"encrypted test");
    for len in [0usize, 1, 11, 12, 28, 2000] {
        let mut value = vec![0x33u8; len];
        let blob = EncryptedSerializable::new(&rm, &parent, &mut value).to_bytes().unwrap();

        let (public, rest) = read_sized(&blob).unwrap();
        let (private, _) = read_sized(rest).unwrap();
        let inner = value.to_bytes().unwrap().len();
        let framing = 4 + public.len() + 4 + private.len() + 8;
        assert_eq!(blob.len(), framing + round_up(inner), "length {}", len);
        assert!(Public::unmarshall(public).is_ok());

        let mut out = Vec::new();
        let rest = EncryptedSerializable::new(&rm, &parent, &mut out).deserialize(&blob).unwrap();
        assert!(rest.is_empty());
        assert_eq!(out, value);
        assert_eq!(rm.used(), 0);
    }
}

#[test]
fn test_encrypted_fresh_key() {
    let rm = manager();
    let parent = PrimaryKeyBuilder::parent(b"encrypted test");
    let mut value = b"same value".to_vec();
    let a = EncryptedSerializable::new(&rm, &parent, &mut value).to_bytes().unwrap();
    let b = EncryptedSerializable::new(&rm, &parent, &mut value).to_bytes().unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_encrypted_corruption() {
    let rm = manager();
    let parent = PrimaryKeyBuilder::parent(b"encrypted test");
    let mut value = vec![0x11u8; 40];
    let blob = EncryptedSerializable::new(&rm, &parent, &mut value).to_bytes().unwrap();
    let (_, rest) = read_sized(&blob).unwrap();
    let (_, rest) = read_sized(rest).unwrap();
    let block_size_offset = blob.len() - rest.len();

    let mut bad = blob.clone();
    bad[block_size_offset..block_size_offset + 4].copy_from_slice(&8u32.to_ne_bytes());
    let mut out = Vec::new();
    let err = EncryptedSerializable::new(&rm, &parent, &mut out).deserialize(&bad).unwrap_err();
    assert!(matches!(err, Error::BlockSize(8)), "{:?}", err);

    // No integrity at this layer: a flipped ciphertext byte corrupts the value silently.
    let mut flipped = blob.clone();
    flipped[block_size_offset + 8 + 10] ^= 0x80;
    let mut out = Vec::new();
    EncryptedSerializable::new(&rm, &parent, &mut out).deserialize(&flipped).unwrap();
    assert_eq!(out.len(), value.len());
    assert_ne!(out, value);

    let mut out = Vec::new();
    let err = EncryptedSerializable::new(&rm, &parent, &mut out)
        .deserialize(&blob[..blob.len() - 1])
        .unwrap_err();
    assert!(matches!(err, Error::Truncated), "{:?}", err);

    // A different parent cannot load the per-blob key.
    let other = PrimaryKeyBuilder::parent(b"other parent");
    let mut out = Vec::new();
    let err = EncryptedSerializable::new(&rm, &other, &mut out).deserialize(&blob).unwrap_err();
    assert!(matches!(err, Error::Tpm(_)), "{:?}", err);
    assert_eq!(rm.used(), 0);
}

#[test]
fn test_encrypted_leftover() {
    let rm = manager();
    let parent = PrimaryKeyBuilder::parent(b"encrypted test");
    let mut first = b"one".to_vec();
    let mut second = b"two".to_vec();
    let mut composite = Composite::new(vec![&mut first as &mut dyn Serializable, &mut second]);
    let blob = EncryptedSerializable::new(&rm, &parent, &mut composite).to_bytes().unwrap();

    let mut only = Vec::new();
    let err = EncryptedSerializable::new(&rm, &parent, &mut only).deserialize(&blob).unwrap_err();
    assert!(matches!(err, Error::Leftover(7)), "{:?}", err);
}

#[test]
fn test_hmac_round_trip() {
    let rm = manager();
    let signing = PrimaryKeyBuilder::signing(b"hmac test");
    for len in [0usize, 10, 1100, 3000] {
        let mut value = vec![0x77u8; len];
        let blob =
            HmacSerializable::new(&rm, &signing, &mut value, b"hidden").to_bytes().unwrap();
        assert_eq!(blob.len(), 4 + 4 + len + 4 + 32);

        let mut out = Vec::new();
        let rest = HmacSerializable::new(&rm, &signing, &mut out, b"hidden")
            .deserialize(&blob)
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(out, value);
    }
    assert_eq!(rm.used(), 0);
}

#[test]
fn test_hmac_integrity() {
    let rm = manager();
    let signing = PrimaryKeyBuilder::signing(b"hmac test");
    let mut value = Recorder { data: b"protected".to_vec(), ..Default::default() };
    let blob = HmacSerializable::new(&rm, &signing, &mut value, b"").to_bytes().unwrap();

    for idx in 0..blob.len() {
        let mut corrupt = blob.clone();
        corrupt[idx] ^= 0x04;
        let mut recorder = Recorder::default();
        let result = HmacSerializable::new(&rm, &signing, &mut recorder, b"").deserialize(&corrupt);
        assert!(result.is_err(), "flipped byte {}", idx);
        assert!(!recorder.parsed.get(), "inner parsed after flipping byte {}", idx);
    }

    let mut recorder = Recorder::default();
    let err = HmacSerializable::new(&rm, &signing, &mut recorder, b"extra")
        .deserialize(&blob)
        .unwrap_err();
    assert!(matches!(err, Error::Integrity), "{:?}", err);
    assert!(!recorder.parsed.get());

    let other = PrimaryKeyBuilder::signing(b"other key");
    let mut recorder = Recorder::default();
    let mut wrapper = HmacSerializable::new(&rm, &other, &mut recorder, b"");
    let err = wrapper.deserialize(&blob).unwrap_err();
    assert!(matches!(err, Error::Integrity), "{:?}", err);

    let mut recorder = Recorder::default();
    HmacSerializable::new(&rm, &signing, &mut recorder, b"").deserialize(&blob).unwrap();
    assert!(recorder.parsed.get());
    assert_eq!(recorder.data, b"protected");
}

#[test]
fn test_hidden_not_emitted() {
    let rm = manager();
    let signing = PrimaryKeyBuilder::signing(b"hmac test");
    let mut value = b"v".to_vec();
    let with =
        HmacSerializable::new(&rm, &signing, &mut value, b"a secret").to_bytes().unwrap();
    let without = HmacSerializable::new(&rm, &signing, &mut value, b"").to_bytes().unwrap();
    assert_eq!(with.len(), without.len());
    assert_eq!(with[..with.len() - 32], without[..without.len() - 32]);
    assert!(!with.windows(8).any(|w| w == b"a secret"));
}

#[test]
fn test_full_pipeline_slot_usage() {
    // Three slots suffice for every layer, including an HMAC sequence.
    let mut tpm = MockTpm::with_max_transient_objects(3);
    tpm.startup().unwrap();
    let rm = Arc::new(ResourceManager::new(Box::new(tpm)));
    let parent = PrimaryKeyBuilder::parent(b"pipeline");
    let signing = PrimaryKeyBuilder::signing(b"pipeline");

    let mut value = vec![0xabu8; 4096];
    let blob = {
        let mut encrypted = EncryptedSerializable::new(&rm, &parent, &mut value);
        HmacSerializable::new(&rm, &signing, &mut encrypted, b"ctx").to_bytes().unwrap()
    };
    let mut out = Vec::new();
    {
        let mut encrypted = EncryptedSerializable::new(&rm, &parent, &mut out);
        HmacSerializable::new(&rm, &signing, &mut encrypted, b"ctx").deserialize(&blob).unwrap();
    }
    assert_eq!(out, value);
    assert_eq!(rm.used(), 0);
}
