use super::*;
use senv_common::crypto::{hmac_sha256, SoftwareDeviceHmac};
use senv_crypto::{hmac::RustCryptoHmac, rng::RustCryptoRng};
use std::{os::unix::net::UnixStream, thread};

struct ShortMac;

impl DeviceHmac for ShortMac {
    fn hmac(&self, _key: DeviceKey, _data: &[u8]) -> Result<Vec<u8>, senv_common::Error> {
        Ok(vec![0; 16])
    }
}

fn sign(keys: &dyn DeviceHmac, message: &[u8]) -> (SignHeader, Vec<u8>) {
    let (mut client, server) = UnixStream::pair().unwrap();
    thread::scope(|s| {
        let guest = s.spawn(move || {
            let header =
                SignHeader { error: SignMessageError::Ok, payload_size: message.len() as u32 };
            client.write_all(&header.encode()).unwrap();
            client.write_all(message).unwrap();

            let mut reply = [0u8; SignHeader::SIZE];
            client.read_exact(&mut reply).unwrap();
            let reply = SignHeader::decode(&reply).unwrap();
            let mut mac = vec![0u8; reply.payload_size as usize];
            client.read_exact(&mut mac).unwrap();
            (reply, mac)
        });
        handle_connection(server, keys).unwrap();
        guest.join().unwrap()
    })
}

fn software_keys() -> SoftwareDeviceHmac {
    SoftwareDeviceHmac::new(Box::new(RustCryptoHmac), &mut RustCryptoRng::new().unwrap())
}

#[test]
fn test_sign_is_deterministic() {
    let keys = software_keys();
    let (hdr1, mac1) = sign(&keys, b"Confirm transfer of 10 coins?");
    let (hdr2, mac2) = sign(&keys, b"Confirm transfer of 10 coins?");
    assert_eq!(hdr1.error, SignMessageError::Ok);
    assert_eq!(hdr2.error, SignMessageError::Ok);
    assert_eq!(mac1.len(), 32);
    assert_eq!(mac1, mac2);

    let (_, other) = sign(&keys, b"Confirm transfer of 11 coins?");
    assert_ne!(mac1, other);
}

#[test]
fn test_mac_covers_prefix() {
    struct LabelKeys;
    impl DeviceHmac for LabelKeys {
        fn hmac(&self, key: DeviceKey, data: &[u8]) -> Result<Vec<u8>, senv_common::Error> {
            hmac_sha256(&RustCryptoHmac, key.label(), &[data])
        }
    }
    let (_, mac) = sign(&LabelKeys, b"hello");
    let expected = hmac_sha256(
        &RustCryptoHmac,
        b"confirmation_token",
        &[&b"confirmation token"[..], &b"hello"[..]],
    )
    .unwrap();
    assert_eq!(mac, expected);
    let bare = hmac_sha256(&RustCryptoHmac, b"confirmation_token", &[&b"hello"[..]]).unwrap();
    assert_ne!(mac, bare);
}

#[test]
fn test_empty_message() {
    let (hdr, mac) = sign(&software_keys(), b"");
    assert_eq!(hdr.error, SignMessageError::Ok);
    assert_eq!(mac.len(), 32);
}

#[test]
fn test_bad_mac_length_is_unknown_error() {
    let (hdr, mac) = sign(&ShortMac, b"hello");
    assert_eq!(hdr.error, SignMessageError::UnknownError);
    assert_eq!(hdr.payload_size, 0);
    assert!(mac.is_empty());
}

#[test]
fn test_truncated_request() {
    let (mut client, server) = UnixStream::pair().unwrap();
    let header = SignHeader { error: SignMessageError::Ok, payload_size: 10 };
    client.write_all(&header.encode()).unwrap();
    client.write_all(b"short").unwrap();
    drop(client);
    let keys = software_keys();
    assert!(handle_connection(server, &keys).is_err());
}
