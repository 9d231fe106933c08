//! Legacy KeyMint messages, as exchanged with the guest's KeyMint HAL.
//!
//! The inner messages are defined by the classes deriving from `KeymasterMessage` in
//! `system/keymaster/include/keymaster/android_keymaster_messages.h`. Each message has a
//! fixed field order and is encoded with host byte order, at message version 4 (KeyMint).
//!
//! The opaque message bytes do not identify which message is involved; the command code
//! travels separately in the channel header (see [`crate::channel`]). Every response begins
//! with a `u32` error code, and the message body is only present if that code is
//! [`ErrorCode::Ok`].

use crate::{
    authset,
    keymint::{
        Algorithm, BlockMode, Digest, ErrorCode, HardwareAuthToken, KeyFormat, KeyParam,
        KeyPurpose, PaddingMode, SecurityLevel,
    },
    take, try_to_vec, Error,
};
use alloc::vec::Vec;
use enumn::N;
use senv_derive::LegacySerialize;
use zeroize::ZeroizeOnDrop;

/// Message format version implemented.
pub const MESSAGE_VERSION: u32 = 4;

/// Size of the nonce in HMAC sharing parameters.
pub const HMAC_SHARING_NONCE_SIZE: usize = 32;

/// Trait that serializes an inner message to/from the format used by the legacy C++ Keymaster code.
pub trait InnerSerialize: Sized {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error>;
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error>;
}

impl InnerSerialize for u32 {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (head, rest) = take(data, 4)?;
        let int_data: [u8; 4] = head.try_into().map_err(|_e| Error::DataTruncated)?;
        Ok((<u32>::from_ne_bytes(int_data), rest))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.try_reserve(4).map_err(|_e| Error::AllocationFailed)?;
        buf.extend_from_slice(&self.to_ne_bytes());
        Ok(())
    }
}

impl InnerSerialize for u64 {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (head, rest) = take(data, 8)?;
        let int_data: [u8; 8] = head.try_into().map_err(|_e| Error::DataTruncated)?;
        Ok((<u64>::from_ne_bytes(int_data), rest))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.try_reserve(8).map_err(|_e| Error::AllocationFailed)?;
        buf.extend_from_slice(&self.to_ne_bytes());
        Ok(())
    }
}

impl InnerSerialize for u8 {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (head, rest) = take(data, 1)?;
        Ok((head[0], rest))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.try_reserve(1).map_err(|_e| Error::AllocationFailed)?;
        buf.push(*self);
        Ok(())
    }
}

impl InnerSerialize for bool {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (v, rest) = <u32>::deserialize(data)?;
        Ok((v != 0, rest))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        (*self as u32).serialize_into(buf)
    }
}

/// A boolean that is encoded as a single byte rather than a `u32`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ByteBool(pub bool);

impl InnerSerialize for ByteBool {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (v, rest) = <u8>::deserialize(data)?;
        Ok((ByteBool(v != 0), rest))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        (self.0 as u8).serialize_into(buf)
    }
}

impl InnerSerialize for Vec<u8> {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (len, rest) = <u32>::deserialize(data)?;
        let (contents, rest) = take(rest, len as usize)?;
        Ok((try_to_vec(contents)?, rest))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.try_reserve(4 + self.len()).map_err(|_e| Error::AllocationFailed)?;
        let len = self.len() as u32;
        buf.extend_from_slice(&len.to_ne_bytes());
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl<const N: usize> InnerSerialize for [u8; N] {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (head, rest) = take(data, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(head);
        Ok((out, rest))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.try_reserve(N).map_err(|_e| Error::AllocationFailed)?;
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl InnerSerialize for Vec<KeyParam> {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        authset::deserialize(data)
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        authset::serialize_into(self, buf)
    }
}

/// Counted list of `u32`-encoded values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct List<T>(pub Vec<T>);

impl<T: InnerSerialize> InnerSerialize for List<T> {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (count, mut rest) = <u32>::deserialize(data)?;
        // Every entry needs at least one byte.
        if count as usize > rest.len() {
            return Err(Error::DataTruncated);
        }
        let mut items = Vec::new();
        items.try_reserve(count as usize).map_err(|_e| Error::AllocationFailed)?;
        for _ in 0..count {
            let (item, more) = T::deserialize(rest)?;
            items.push(item);
            rest = more;
        }
        Ok((List(items), rest))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        (self.0.len() as u32).serialize_into(buf)?;
        for item in &self.0 {
            item.serialize_into(buf)?;
        }
        Ok(())
    }
}

/// Certificate chain, as a counted list of DER blobs.
pub type CertificateChain = List<Vec<u8>>;

/// Timestamp token produced by the secure clock.
#[derive(Clone, Debug, Default, PartialEq, Eq, LegacySerialize)]
pub struct TimestampToken {
    pub challenge: u64,
    pub timestamp: u64,
    pub security_level: u32,
    pub mac: Vec<u8>,
}

/// Token returned from authorization verification.
#[derive(Clone, Debug, Default, PartialEq, Eq, LegacySerialize)]
pub struct VerificationToken {
    pub challenge: u64,
    pub timestamp: u64,
    pub parameters_verified: Vec<KeyParam>,
    pub security_level: u32,
    pub mac: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, LegacySerialize)]
pub struct HmacSharingParameters {
    pub seed: Vec<u8>,
    pub nonce: [u8; HMAC_SHARING_NONCE_SIZE],
}

#[derive(Clone, Debug, Default, PartialEq, Eq, LegacySerialize)]
pub struct EmptyRequest {}
#[derive(Clone, Debug, Default, PartialEq, Eq, LegacySerialize)]
pub struct EmptyResponse {}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GetVersionResponse {
    pub major_ver: u8,
    pub minor_ver: u8,
    pub subminor_ver: u8,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct SupportedByAlgorithmAndPurposeRequest {
    pub algorithm: Algorithm,
    pub purpose: KeyPurpose,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct SupportedByAlgorithmRequest {
    pub algorithm: Algorithm,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct SupportedAlgorithmsResponse {
    pub algorithms: List<Algorithm>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct SupportedBlockModesResponse {
    pub block_modes: List<BlockMode>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct SupportedPaddingModesResponse {
    pub padding_modes: List<PaddingMode>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct SupportedDigestsResponse {
    pub digests: List<Digest>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct SupportedFormatsResponse {
    pub formats: List<KeyFormat>,
}

#[derive(Clone, PartialEq, Eq, LegacySerialize, ZeroizeOnDrop)]
pub struct AddEntropyRequest {
    pub random_data: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct ConfigureRequest {
    pub os_version: u32,
    pub os_patchlevel: u32, // YYYYMM
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GenerateKeyRequest {
    pub key_description: Vec<KeyParam>,
    pub attestation_signing_key_blob: Vec<u8>,
    pub attest_key_params: Vec<KeyParam>,
    pub issuer_subject: Vec<u8>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GenerateKeyResponse {
    pub key_blob: Vec<u8>,
    pub enforced: Vec<KeyParam>,
    pub unenforced: Vec<KeyParam>,
    pub certificate_chain: CertificateChain,
}

#[derive(Clone, PartialEq, Eq, LegacySerialize, ZeroizeOnDrop)]
pub struct ImportKeyRequest {
    #[zeroize(skip)]
    pub key_description: Vec<KeyParam>,
    #[zeroize(skip)]
    pub key_format: KeyFormat,
    pub key_data: Vec<u8>,
    #[zeroize(skip)]
    pub attestation_signing_key_blob: Vec<u8>,
    #[zeroize(skip)]
    pub attest_key_params: Vec<KeyParam>,
    #[zeroize(skip)]
    pub issuer_subject: Vec<u8>,
}
pub type ImportKeyResponse = GenerateKeyResponse;

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GetKeyCharacteristicsRequest {
    pub key_blob: Vec<u8>,
    pub additional_params: Vec<KeyParam>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GetKeyCharacteristicsResponse {
    pub enforced: Vec<KeyParam>,
    pub unenforced: Vec<KeyParam>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct ExportKeyRequest {
    pub additional_params: Vec<KeyParam>,
    pub key_format: KeyFormat,
    pub key_blob: Vec<u8>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct ExportKeyResponse {
    pub key_data: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct AttestKeyRequest {
    pub key_blob: Vec<u8>,
    pub attest_params: Vec<KeyParam>,
    pub attestation_signing_key_blob: Vec<u8>,
    pub attest_key_params: Vec<KeyParam>,
    pub issuer_subject: Vec<u8>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct AttestKeyResponse {
    pub certificate_chain: CertificateChain,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct UpgradeKeyRequest {
    pub key_blob: Vec<u8>,
    pub upgrade_params: Vec<KeyParam>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct UpgradeKeyResponse {
    pub upgraded_key: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct DeleteKeyRequest {
    pub key_blob: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct BeginOperationRequest {
    pub purpose: KeyPurpose,
    pub key_blob: Vec<u8>,
    pub additional_params: Vec<KeyParam>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct BeginOperationResponse {
    pub op_handle: u64,
    pub output_params: Vec<KeyParam>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct UpdateOperationRequest {
    pub op_handle: u64,
    pub input: Vec<u8>,
    pub additional_params: Vec<KeyParam>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct UpdateOperationResponse {
    pub output: Vec<u8>,
    pub input_consumed: u32,
    pub output_params: Vec<KeyParam>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct FinishOperationRequest {
    pub op_handle: u64,
    pub signature: Vec<u8>,
    pub additional_params: Vec<KeyParam>,
    pub input: Vec<u8>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct FinishOperationResponse {
    pub output: Vec<u8>,
    pub output_params: Vec<KeyParam>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct AbortOperationRequest {
    pub op_handle: u64,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GetHmacSharingParametersResponse {
    pub params: HmacSharingParameters,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct ComputeSharedHmacRequest {
    pub params_array: List<HmacSharingParameters>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct ComputeSharedHmacResponse {
    pub sharing_check: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct VerifyAuthorizationRequest {
    pub challenge: u64,
    pub parameters_to_verify: Vec<KeyParam>,
    pub auth_token: HardwareAuthToken,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct VerifyAuthorizationResponse {
    pub token: VerificationToken,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct DeviceLockedRequest {
    pub password_only: ByteBool,
    pub token: TimestampToken,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct ConfigureVendorPatchlevelRequest {
    pub vendor_patchlevel: u32, // YYYYMMDD
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct ConfigureBootPatchlevelRequest {
    pub boot_patchlevel: u32, // YYYYMMDD
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct ConfigureVerifiedBootInfoRequest {
    pub boot_state: Vec<u8>,
    pub bootloader_state: Vec<u8>,
    pub vbmeta_digest: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GenerateTimestampTokenRequest {
    pub challenge: u64,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GenerateTimestampTokenResponse {
    pub token: TimestampToken,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GetHwInfoResponse {
    pub version: u32,
    pub security_level: SecurityLevel,
    pub name: Vec<u8>,
    pub author: Vec<u8>,
    pub timestamp_token_required: bool,
}

#[derive(Clone, PartialEq, Eq, LegacySerialize, ZeroizeOnDrop)]
pub struct SetAttestationIdsRequest {
    pub brand: Vec<u8>,
    pub device: Vec<u8>,
    pub product: Vec<u8>,
    pub serial: Vec<u8>,
    pub imei: Vec<u8>,
    pub meid: Vec<u8>,
    pub manufacturer: Vec<u8>,
    pub model: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, LegacySerialize, ZeroizeOnDrop)]
pub struct SetAttestationIdsKM3Request {
    pub base: SetAttestationIdsRequest,
    pub second_imei: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, LegacySerialize, ZeroizeOnDrop)]
pub struct ImportWrappedKeyRequest {
    pub wrapped_key: Vec<u8>,
    #[zeroize(skip)]
    pub wrapping_key: Vec<u8>,
    pub masking_key: Vec<u8>,
    #[zeroize(skip)]
    pub additional_params: Vec<KeyParam>,
    #[zeroize(skip)]
    pub password_sid: u64,
    #[zeroize(skip)]
    pub biometric_sid: u64,
}
pub type ImportWrappedKeyResponse = GenerateKeyResponse;

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GenerateRkpKeyRequest {
    pub test_mode: ByteBool,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GenerateRkpKeyResponse {
    pub key_blob: Vec<u8>,
    pub maced_public_key: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GenerateCsrRequest {
    pub test_mode: ByteBool,
    pub keys_to_sign: List<Vec<u8>>,
    pub endpoint_enc_cert_chain: Vec<u8>,
    pub challenge: Vec<u8>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GenerateCsrResponse {
    pub keys_to_sign_mac: Vec<u8>,
    pub device_info_blob: Vec<u8>,
    pub protected_data_blob: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GenerateCsrV2Request {
    pub keys_to_sign: List<Vec<u8>>,
    pub challenge: Vec<u8>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GenerateCsrV2Response {
    pub csr: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GetRootOfTrustRequest {
    pub challenge: Vec<u8>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GetRootOfTrustResponse {
    pub root_of_trust: Vec<u8>,
}

/// Identification of request/response messages.
pub trait MessageId {
    type Code;
    fn code(&self) -> Self::Code;
}

macro_rules! declare_req_rsp_enums {
    {
        $cenum:ident => ($reqenum:ident, $rspenum:ident)
        {
            $( $cname:ident = $cvalue:expr => ($reqtyp:ty, $rsptyp:ty) , )*
        }
    } => {
        #[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, N)]
        #[repr(u32)]
        pub enum $cenum {
            $( $cname = $cvalue, )*
        }
        pub enum $reqenum {
            $( $cname($reqtyp), )*
        }
        #[derive(Debug)]
        pub enum $rspenum {
            $( $cname($rsptyp), )*
        }
        impl MessageId for $reqenum {
            type Code = $cenum;
            fn code(&self) -> $cenum {
                match self {
                    $( Self::$cname(_) => $cenum::$cname, )*
                }
            }
        }
        impl MessageId for $rspenum {
            type Code = $cenum;
            fn code(&self) -> $cenum {
                match self {
                    $( Self::$cname(_) => $cenum::$cname, )*
                }
            }
        }
        impl $reqenum {
            /// Decode a request given the command code it arrived with.
            pub fn from_code_and_data(cmd: u32, data: &[u8]) -> Result<Self, Error> {
                let (req, rest) = match $cenum::n(cmd) {
                    $(
                        Some($cenum::$cname) => {
                            let (req, rest) = <$reqtyp>::deserialize(data)?;
                            ($reqenum::$cname(req), rest)
                        }
                    )*
                    None => return Err(Error::UnknownCommand(cmd)),
                };
                if !rest.is_empty() {
                    return Err(Error::ExcessData(rest.len()));
                }
                Ok(req)
            }
            /// Encode the request body (without any channel header).
            pub fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
                match self {
                    $( Self::$cname(req) => req.serialize_into(buf), )*
                }
            }
        }
        impl $rspenum {
            /// Decode a successful response body given the command code.
            pub fn from_code_and_data(cmd: u32, data: &[u8]) -> Result<Self, Error> {
                let (rsp, rest) = match $cenum::n(cmd) {
                    $(
                        Some($cenum::$cname) => {
                            let (rsp, rest) = <$rsptyp>::deserialize(data)?;
                            ($rspenum::$cname(rsp), rest)
                        }
                    )*
                    None => return Err(Error::UnknownCommand(cmd)),
                };
                if !rest.is_empty() {
                    return Err(Error::ExcessData(rest.len()));
                }
                Ok(rsp)
            }
            fn serialize_body(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
                match self {
                    $( Self::$cname(rsp) => rsp.serialize_into(buf), )*
                }
            }
        }
    };
}

// Keymint operation requests, as:
// - an enum value with an explicit numeric value, taken from `AndroidKeymasterCommand`
// - a request enum which has an operation code associated to each variant
// - a response enum which has the same operation code associated to each variant.
declare_req_rsp_enums! { KeymasterCommand => (PerformOpReq, PerformOpRsp) {
    GenerateKey = 0 =>                   (GenerateKeyRequest, GenerateKeyResponse),
    BeginOperation = 1 =>                (BeginOperationRequest, BeginOperationResponse),
    UpdateOperation = 2 =>               (UpdateOperationRequest, UpdateOperationResponse),
    FinishOperation = 3 =>               (FinishOperationRequest, FinishOperationResponse),
    AbortOperation = 4 =>                (AbortOperationRequest, EmptyResponse),
    ImportKey = 5 =>                     (ImportKeyRequest, ImportKeyResponse),
    ExportKey = 6 =>                     (ExportKeyRequest, ExportKeyResponse),
    GetVersion = 7 =>                    (EmptyRequest, GetVersionResponse),
    AddRngEntropy = 8 =>                 (AddEntropyRequest, EmptyResponse),
    GetSupportedAlgorithms = 9 =>        (EmptyRequest, SupportedAlgorithmsResponse),
    GetSupportedBlockModes = 10 =>
        (SupportedByAlgorithmAndPurposeRequest, SupportedBlockModesResponse),
    GetSupportedPaddingModes = 11 =>
        (SupportedByAlgorithmAndPurposeRequest, SupportedPaddingModesResponse),
    GetSupportedDigests = 12 =>
        (SupportedByAlgorithmAndPurposeRequest, SupportedDigestsResponse),
    GetSupportedImportFormats = 13 =>    (SupportedByAlgorithmRequest, SupportedFormatsResponse),
    GetSupportedExportFormats = 14 =>    (SupportedByAlgorithmRequest, SupportedFormatsResponse),
    GetKeyCharacteristics = 15 =>
        (GetKeyCharacteristicsRequest, GetKeyCharacteristicsResponse),
    AttestKey = 16 =>                    (AttestKeyRequest, AttestKeyResponse),
    UpgradeKey = 17 =>                   (UpgradeKeyRequest, UpgradeKeyResponse),
    Configure = 18 =>                    (ConfigureRequest, EmptyResponse),
    GetHmacSharingParameters = 19 =>     (EmptyRequest, GetHmacSharingParametersResponse),
    ComputeSharedHmac = 20 =>            (ComputeSharedHmacRequest, ComputeSharedHmacResponse),
    VerifyAuthorization = 21 =>          (VerifyAuthorizationRequest, VerifyAuthorizationResponse),
    DeleteKey = 22 =>                    (DeleteKeyRequest, EmptyResponse),
    DeleteAllKeys = 23 =>                (EmptyRequest, EmptyResponse),
    ImportWrappedKey = 25 =>             (ImportWrappedKeyRequest, ImportWrappedKeyResponse),
    EarlyBootEnded = 26 =>               (EmptyRequest, EmptyResponse),
    DeviceLocked = 27 =>                 (DeviceLockedRequest, EmptyResponse),
    GenerateRkpKey = 29 =>               (GenerateRkpKeyRequest, GenerateRkpKeyResponse),
    GenerateCsr = 30 =>                  (GenerateCsrRequest, GenerateCsrResponse),
    GenerateTimestampToken = 31 =>
        (GenerateTimestampTokenRequest, GenerateTimestampTokenResponse),
    ConfigureVendorPatchlevel = 32 =>    (ConfigureVendorPatchlevelRequest, EmptyResponse),
    ConfigureBootPatchlevel = 33 =>      (ConfigureBootPatchlevelRequest, EmptyResponse),
    ConfigureVerifiedBootInfo = 34 =>    (ConfigureVerifiedBootInfoRequest, EmptyResponse),
    GetRootOfTrust = 35 =>               (GetRootOfTrustRequest, GetRootOfTrustResponse),
    GetHwInfo = 36 =>                    (EmptyRequest, GetHwInfoResponse),
    GenerateCsrV2 = 37 =>                (GenerateCsrV2Request, GenerateCsrV2Response),
    SetAttestationIds = 38 =>            (SetAttestationIdsRequest, EmptyResponse),
    SetAttestationIdsKM3 = 39 =>         (SetAttestationIdsKM3Request, EmptyResponse),
} }

/// Serialize a successful response: `ErrorCode::Ok` followed by the body.
pub fn serialize_rsp(rsp: &PerformOpRsp) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    (ErrorCode::Ok as i32 as u32).serialize_into(&mut buf)?;
    rsp.serialize_body(&mut buf)?;
    Ok(buf)
}

/// Serialize an error response, which holds only the error code.
pub fn serialize_error_rsp(rc: ErrorCode) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    (rc as i32 as u32).serialize_into(&mut buf)?;
    Ok(buf)
}

/// Deserialize a response for the given command, separating out the error code.
pub fn deserialize_rsp(cmd: u32, data: &[u8]) -> Result<Result<PerformOpRsp, ErrorCode>, Error> {
    let (raw_rc, rest) = <u32>::deserialize(data)?;
    let rc = ErrorCode::n(raw_rc as i32).ok_or(Error::InvalidEnumValue(raw_rc))?;
    if rc != ErrorCode::Ok {
        return Ok(Err(rc));
    }
    Ok(Ok(PerformOpRsp::from_code_and_data(cmd, rest)?))
}
