use super::*;
use crate::keymint::{Algorithm, BlockMode, KeyParam, KeyPurpose, KeySizeInBits, PaddingMode};
use crate::legacy::{
    deserialize_rsp, serialize_rsp, GenerateKeyResponse, KeymasterCommand, List, PerformOpRsp,
};
use alloc::vec;

#[test]
fn test_take() {
    let data = [1u8, 2, 3];
    assert_eq!(take(&data, 2).unwrap(), (&data[..2], &data[2..]));
    assert_eq!(take(&data, 4), Err(Error::DataTruncated));
}

#[test]
fn test_vec_try_fill() {
    assert_eq!(vec_try_fill(0u8, 3).unwrap(), vec![0, 0, 0]);
}

#[test]
fn test_generate_key_response_through_dispatch() {
    let rsp = PerformOpRsp::GenerateKey(GenerateKeyResponse {
        key_blob: vec![0xab; 10],
        enforced: vec![
            KeyParam::Algorithm(Algorithm::Aes),
            KeyParam::KeySize(KeySizeInBits(128)),
            KeyParam::Purpose(KeyPurpose::Encrypt),
            KeyParam::BlockMode(BlockMode::Ecb),
            KeyParam::Padding(PaddingMode::None),
        ],
        unenforced: vec![],
        certificate_chain: List(vec![]),
    });
    let data = serialize_rsp(&rsp).unwrap();
    match deserialize_rsp(KeymasterCommand::GenerateKey as u32, &data).unwrap() {
        Ok(PerformOpRsp::GenerateKey(got)) => {
            assert_eq!(got.key_blob, vec![0xab; 10]);
            assert_eq!(got.enforced.len(), 5);
            assert!(got.unenforced.is_empty());
            assert!(got.certificate_chain.0.is_empty());
        }
        _ => panic!("unexpected response"),
    }
}

#[test]
fn test_raw_tag_value_mapping() {
    use crate::keymint::{raw_tag_value, tag_from_raw, Tag};
    assert_eq!(raw_tag_value(Tag::Purpose), 1);
    assert_eq!(raw_tag_value(Tag::NoAuthRequired), 503);
    assert_eq!(raw_tag_value(Tag::RootOfTrust), 704);
    for tag in [Tag::Purpose, Tag::RsaPublicExponent, Tag::CreationDatetime, Tag::UserSecureId] {
        assert_eq!(tag_from_raw(raw_tag_value(tag)), Some(tag));
    }
    assert_eq!(tag_from_raw(9999), None);
    assert_eq!(tag_from_raw(0x1000_0001), None);
}
