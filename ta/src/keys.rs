//! TA functionality related to key generation/import/upgrade.

use crate::{cert, device::SigningAlgorithm};
use alloc::vec::Vec;
use der::{Decode, Encode};
use senv_common::{
    contains_tag_value,
    crypto::{self, aes, des, rsa, KeyGenInfo, KeyMaterial, SymmetricOperation},
    get_bool_tag_value, get_opt_tag_value, get_tag_value,
    keyblob::{self, CreatedBlob, SlotPurpose},
    km_err, tag, try_to_vec, vec_try, vec_try_with_capacity, Error, FallibleAllocExt,
};
use senv_wire::{
    keymint::{
        Algorithm, BlockMode, DateTime, Digest, ErrorCode, HardwareAuthenticatorType, KeyFormat,
        KeyOrigin, KeyParam, KeyPurpose, PaddingMode,
    },
    legacy::{
        AttestKeyResponse, ExportKeyResponse, GenerateKeyResponse, GetKeyCharacteristicsResponse,
        List,
    },
};
use log::{debug, error, info, warn};
use x509_cert::ext::pkix::{BasicConstraints, KeyUsages};
use zeroize::Zeroizing;

/// Maximum size of an attestation challenge.
const MAX_ATTESTATION_CHALLENGE_LEN: usize = 128;

/// Size of an attestation unique ID.
const UNIQUE_ID_LEN: usize = 16;

/// Period after which attestation unique IDs rotate, in milliseconds (30 days).
const UNIQUE_ID_ROTATION_MS: i64 = 2_592_000_000;

/// Validity end used when attesting a key whose request names none: 9999-12-31T23:59:59Z.
const UNDEFINED_NOT_AFTER: DateTime = DateTime { ms_since_epoch: 253402300799000 };

/// Caller-provided key to sign an attestation certificate with, in place of the batch key.
pub(crate) struct AttestationKey<'a> {
    pub key_blob: &'a [u8],
    pub attest_key_params: &'a [KeyParam],
    pub issuer_subject: &'a [u8],
}

impl<'a> AttestationKey<'a> {
    /// An empty key blob means no attestation key was given.
    pub(crate) fn from_request(
        key_blob: &'a [u8],
        attest_key_params: &'a [KeyParam],
        issuer_subject: &'a [u8],
    ) -> Option<Self> {
        if key_blob.is_empty() {
            None
        } else {
            Some(Self { key_blob, attest_key_params, issuer_subject })
        }
    }
}

/// Key that signs a new certificate, with the chain that vouches for it.
struct CertSigner {
    signing_key: KeyMaterial,
    issuer_subject: Vec<u8>,
    chain: Vec<Vec<u8>>,
    /// Challenge and application ID, present when the certificate carries an attestation.
    attestation: Option<(Vec<u8>, Vec<u8>)>,
}

impl crate::KeyMintTa {
    pub(crate) fn generate_key(
        &mut self,
        params: &[KeyParam],
        attestation_key: Option<AttestationKey>,
    ) -> Result<GenerateKeyResponse, Error> {
        self.check_new_key_params(params)?;
        let material = match tag::check_key_gen_params(params)? {
            KeyGenInfo::Aes(variant) => {
                KeyMaterial::Aes(aes::Key::generate(variant, &mut *self.imp.rng))
            }
            KeyGenInfo::TripleDes => {
                KeyMaterial::TripleDes(des::Key::generate(&mut *self.imp.rng))
            }
            KeyGenInfo::Hmac(key_size) => {
                let mut raw = Zeroizing::new(vec_try![0; (key_size.0 / 8) as usize]?);
                self.imp.rng.fill_bytes(&mut raw);
                KeyMaterial::from_raw(Algorithm::Hmac, &raw)?
            }
            KeyGenInfo::Rsa(key_size, exponent) => {
                self.imp.rsa.generate_key(&mut *self.imp.rng, key_size, exponent)?
            }
            KeyGenInfo::NistEc(curve) => {
                self.imp.ec.generate_nist_key(&mut *self.imp.rng, curve)?
            }
        };
        self.finish_key_creation(
            params,
            KeyOrigin::Generated,
            material,
            attestation_key,
            SlotPurpose::KeyGeneration,
        )
    }

    pub(crate) fn import_key(
        &mut self,
        params: &[KeyParam],
        key_format: KeyFormat,
        key_data: &[u8],
        attestation_key: Option<AttestationKey>,
    ) -> Result<GenerateKeyResponse, Error> {
        self.import_key_with_origin(
            params,
            key_format,
            key_data,
            attestation_key,
            KeyOrigin::Imported,
        )
    }

    fn import_key_with_origin(
        &mut self,
        params: &[KeyParam],
        key_format: KeyFormat,
        key_data: &[u8],
        attestation_key: Option<AttestationKey>,
        origin: KeyOrigin,
    ) -> Result<GenerateKeyResponse, Error> {
        self.check_new_key_params(params)?;
        let (material, deduced) = tag::check_key_import_params(
            &*self.imp.rsa,
            &*self.imp.ec,
            params,
            key_format,
            key_data,
        )?;
        let mut description = Vec::new();
        description.try_extend_from_slice(params)?;
        description.try_extend_from_slice(&deduced)?;
        self.finish_key_creation(
            &description,
            origin,
            material,
            attestation_key,
            SlotPurpose::KeyImport,
        )
    }

    /// Seal new key material into a key blob and, for asymmetric keys, certify its public key.
    fn finish_key_creation(
        &mut self,
        description: &[KeyParam],
        origin: KeyOrigin,
        material: KeyMaterial,
        attestation_key: Option<AttestationKey>,
        slot_purpose: SlotPurpose,
    ) -> Result<GenerateKeyResponse, Error> {
        // Work out who signs the certificate before committing a secure deletion slot.
        let signer = match material.algorithm() {
            Algorithm::Rsa | Algorithm::Ec => {
                self.cert_signer(description, &material, attestation_key)?
            }
            _ => None,
        };

        let (keyblobs, secrets) = self.dev.sealing();
        let created = keyblobs.create(
            description,
            origin,
            material.raw(),
            secrets,
            &mut *self.imp.rng,
            slot_purpose,
        )?;
        info!(
            "created {:?} {:?} key with {} hw-enforced params",
            origin,
            material.algorithm(),
            created.hw_enforced.len()
        );

        let certificate_chain = match material.algorithm() {
            Algorithm::Rsa | Algorithm::Ec => {
                match self.certificate_chain(&material, description, &created, signer) {
                    Ok(chain) => chain,
                    Err(e) => {
                        self.release_slot(&created.blob);
                        return Err(e);
                    }
                }
            }
            _ => Vec::new(),
        };
        Ok(GenerateKeyResponse {
            key_blob: created.blob,
            enforced: created.hw_enforced,
            unenforced: created.sw_enforced,
            certificate_chain: List(certificate_chain),
        })
    }

    /// Determine the key that signs a new key's certificate, if any.
    fn cert_signer(
        &mut self,
        params: &[KeyParam],
        material: &KeyMaterial,
        attestation_key: Option<AttestationKey>,
    ) -> Result<Option<CertSigner>, Error> {
        let Some(challenge) = get_opt_tag_value!(params, AttestationChallenge)? else {
            if attestation_key.is_some() {
                return Err(km_err!(
                    AttestationChallengeMissing,
                    "got attestation key but no challenge"
                ));
            }
            // Keys that can sign certify themselves; others get an unsigned certificate.
            let self_signed = contains_tag_value!(params, Purpose, KeyPurpose::Sign)
                || contains_tag_value!(params, Purpose, KeyPurpose::AttestKey);
            if !self_signed {
                return Ok(None);
            }
            return Ok(Some(CertSigner {
                signing_key: material.clone(),
                issuer_subject: try_to_vec(tag::get_cert_subject(params)?)?,
                chain: Vec::new(),
                attestation: None,
            }));
        };
        if challenge.len() > MAX_ATTESTATION_CHALLENGE_LEN {
            return Err(km_err!(
                InvalidInputLength,
                "attestation challenge too large: {} bytes",
                challenge.len()
            ));
        }
        let app_id = get_opt_tag_value!(params, AttestationApplicationId)?
            .ok_or_else(|| km_err!(AttestationApplicationIdMissing, "attestation requested"))?;
        let attestation = Some((try_to_vec(challenge)?, try_to_vec(app_id)?));

        if let Some(attest_key) = attestation_key {
            let key = self.load_key(attest_key.key_blob, attest_key.attest_key_params)?;
            if !contains_tag_value!(&key.hw_enforced, Purpose, KeyPurpose::AttestKey) {
                return Err(km_err!(IncompatiblePurpose, "attestation key lacks ATTEST_KEY"));
            }
            if attest_key.issuer_subject.is_empty() {
                return Err(km_err!(InvalidArgument, "empty subject name"));
            }
            let algo = tag::get_algorithm(&key.hw_enforced)?;
            return Ok(Some(CertSigner {
                signing_key: KeyMaterial::from_raw(algo, &key.key_material)?,
                issuer_subject: try_to_vec(attest_key.issuer_subject)?,
                chain: Vec::new(),
                attestation,
            }));
        }

        // Batch attestation, with a device key matching the new key's algorithm.
        let algo = match material {
            KeyMaterial::Rsa(_) => SigningAlgorithm::Rsa,
            _ => SigningAlgorithm::Ec,
        };
        let chain = self.dev.sign_info.cert_chain(algo)?;
        let issuer_subject = cert::extract_subject(
            chain.first().ok_or_else(|| km_err!(UnknownError, "empty attestation chain"))?,
        )?;
        Ok(Some(CertSigner {
            signing_key: self.dev.sign_info.signing_key(algo)?,
            issuer_subject,
            chain,
            attestation,
        }))
    }

    /// Build the certificate chain for a new asymmetric key, leaf first.
    fn certificate_chain(
        &self,
        material: &KeyMaterial,
        params: &[KeyParam],
        created: &CreatedBlob,
        signer: Option<CertSigner>,
    ) -> Result<Vec<Vec<u8>>, Error> {
        let key_usage = cert::key_usage_extension_bits(params);
        let basic_constraints = if key_usage.0.contains(KeyUsages::KeyCertSign) {
            Some(BasicConstraints { ca: true, path_len_constraint: None })
        } else {
            None
        };

        let attestation_ext = match signer.as_ref().and_then(|s| s.attestation.as_ref()) {
            Some((challenge, app_id)) => {
                let unique_id = self.calculate_unique_id(app_id, params)?;
                let attestation_ids =
                    cert::check_attestation_ids(params, self.attestation_ids.as_ref())?;
                let boot_info = self
                    .boot_info
                    .as_ref()
                    .ok_or_else(|| km_err!(HardwareNotYetAvailable, "root of trust not set"))?;
                Some(cert::attestation_extension(
                    self.hw_info.security_level,
                    &created.hw_enforced,
                    &created.sw_enforced,
                    &cert::AttestationInfo {
                        challenge,
                        app_id,
                        unique_id: &unique_id,
                        attestation_ids: &attestation_ids,
                        boot_info: Some(boot_info),
                    },
                )?)
            }
            None => None,
        };

        let info = signer.as_ref().map(|s| cert::SigningInfo {
            issuer_subject: &s.issuer_subject,
            signing_key: s.signing_key.clone(),
        });
        let sig_alg_oid = match &info {
            Some(info) => cert::signature_oid(&info.signing_key)?,
            None => cert::signature_oid(material)?,
        };
        let tbs = cert::tbs_certificate(
            info.as_ref(),
            sig_alg_oid,
            material.subject_public_key_info()?,
            key_usage,
            basic_constraints,
            attestation_ext,
            params,
        )?;
        let sig = match info {
            Some(info) => self.sign_cert_data(info.signing_key, &tbs.to_der()?)?,
            None => Vec::new(),
        };
        let leaf = cert::certificate(tbs, &sig)?.to_der()?;

        let mut chain = vec_try_with_capacity!(1 + signer.as_ref().map_or(0, |s| s.chain.len()))?;
        chain.push(leaf);
        if let Some(signer) = signer {
            chain.extend(signer.chain);
        }
        Ok(chain)
    }

    /// Sign certificate data with SHA-256, in the signature scheme of the signing key.
    fn sign_cert_data(&self, signing_key: KeyMaterial, tbs_data: &[u8]) -> Result<Vec<u8>, Error> {
        match signing_key {
            KeyMaterial::Rsa(key) => {
                let mut op = self
                    .imp
                    .rsa
                    .begin_sign(key, rsa::SignMode::Pkcs1_1_5Padding(Digest::Sha256))?;
                op.update(tbs_data)?;
                op.finish()
            }
            KeyMaterial::Ec(key) => {
                let mut op = self.imp.ec.begin_sign(key, Digest::Sha256)?;
                op.update(tbs_data)?;
                op.finish()
            }
            _ => Err(km_err!(UnknownError, "unexpected cert signing key type")),
        }
    }

    /// Calculate the `UNIQUE_ID` value for the parameters, if requested.
    fn calculate_unique_id(&self, app_id: &[u8], params: &[KeyParam]) -> Result<Vec<u8>, Error> {
        if !get_bool_tag_value!(params, IncludeUniqueId)? {
            return Ok(Vec::new());
        }
        let creation_datetime =
            get_tag_value!(params, CreationDatetime, ErrorCode::InvalidArgument)?;
        let rounded_datetime = creation_datetime.ms_since_epoch / UNIQUE_ID_ROTATION_MS;
        let datetime_data = rounded_datetime.to_ne_bytes();

        let mut combined_input = vec_try_with_capacity!(datetime_data.len() + app_id.len() + 1)?;
        combined_input.extend_from_slice(&datetime_data[..]);
        combined_input.extend_from_slice(app_id);
        combined_input.push(u8::from(get_bool_tag_value!(params, ResetSinceIdRotation)?));

        let tag =
            crypto::hmac_sha256(&*self.imp.hmac, &self.unique_id_hbk[..], &[&combined_input])?;
        try_to_vec(&tag[..UNIQUE_ID_LEN])
    }

    /// Give back the secure deletion slot of a key blob that is not being handed out.
    fn release_slot(&mut self, key_blob: &[u8]) {
        if let (Some(slot), Some(mgr)) =
            (keyblob::secure_deletion_slot(key_blob), self.dev.sdd_mgr.as_mut())
        {
            if let Err(e) = mgr.delete_secret(slot) {
                error!("failed to delete secret for slot {:?} ({:?}): slot leaked", slot, e);
            }
        }
    }

    /// Import a key that arrives encrypted under a transport key, itself encrypted to an RSA
    /// wrapping key held in `wrapping_key_blob`.
    pub(crate) fn import_wrapped_key(
        &mut self,
        wrapped_key_data: &[u8],
        wrapping_key_blob: &[u8],
        masking_key: &[u8],
        unwrapping_params: &[KeyParam],
        password_sid: u64,
        biometric_sid: u64,
    ) -> Result<GenerateKeyResponse, Error> {
        let wrapping_key = self.load_key(wrapping_key_blob, unwrapping_params)?;
        let wrapper = cert::SecureKeyWrapper::from_der(wrapped_key_data)?;
        if wrapper.version != cert::SECURE_KEY_WRAPPER_VERSION {
            return Err(km_err!(InvalidArgument, "invalid version in Secure Key Wrapper."));
        }

        // Decrypt the masked transport key.
        let algo = tag::get_algorithm(&wrapping_key.hw_enforced)?;
        let masked_transport_key = match KeyMaterial::from_raw(algo, &wrapping_key.key_material)? {
            KeyMaterial::Rsa(key) => {
                let mode = tag::check_rsa_wrapping_key_params(
                    &wrapping_key.hw_enforced,
                    unwrapping_params,
                )?;
                let mut op = self.imp.rsa.begin_decrypt(key, mode)?;
                op.update(wrapper.encrypted_transport_key.as_bytes())?;
                Zeroizing::new(op.finish()?)
            }
            _ => {
                return Err(km_err!(
                    IncompatibleAlgorithm,
                    "wrapping key must be RSA not {:?}",
                    algo
                ))
            }
        };
        if masked_transport_key.len() != masking_key.len() {
            return Err(km_err!(
                InvalidArgument,
                "masked transport key is {} bytes, but masking key is {} bytes",
                masked_transport_key.len(),
                masking_key.len()
            ));
        }
        let transport_key: Zeroizing<Vec<u8>> = Zeroizing::new(
            masked_transport_key.iter().zip(masking_key).map(|(x, y)| x ^ y).collect(),
        );
        let transport_key = match aes::Key::new_from(&transport_key)? {
            key @ aes::Key::Aes256(_) => key,
            _ => {
                return Err(km_err!(
                    InvalidArgument,
                    "transport key of {} bytes is not AES-256",
                    transport_key.len()
                ))
            }
        };

        let iv = wrapper.initialization_vector.as_bytes();
        let nonce: [u8; aes::GCM_NONCE_SIZE] = iv.try_into().map_err(|_e| {
            km_err!(InvalidArgument, "IV of {} bytes, want {}", iv.len(), aes::GCM_NONCE_SIZE)
        })?;
        let tag_len = wrapper.tag.as_bytes().len();
        if !(12..=16).contains(&tag_len) {
            return Err(km_err!(
                InvalidMacLength,
                "want 12-16 byte tag for AES-GCM not {}",
                tag_len
            ));
        }

        // The DER re-encoding of the key description is the AAD.
        let mut op = self.imp.aes.begin_aead(
            transport_key,
            aes::GcmMode { nonce, tag_len },
            SymmetricOperation::Decrypt,
        )?;
        op.update_aad(&wrapper.key_description.to_der()?)?;
        let mut key_data = Zeroizing::new(op.update(wrapper.encrypted_key.as_bytes())?);
        key_data.try_extend_from_slice(&op.update(wrapper.tag.as_bytes())?)?;
        key_data.try_extend_from_slice(&op.finish()?)?;

        let mut params = wrapper.key_description.key_params.params()?;
        if let Some(secure_id) = get_opt_tag_value!(&params, UserSecureId)?.copied() {
            // Biometric auth tokens carry the password SID too, so the password SID wins.
            let password = HardwareAuthenticatorType::Password as u64;
            let fingerprint = HardwareAuthenticatorType::Fingerprint as u64;
            let sid = if secure_id & password == password {
                Some(password_sid)
            } else if secure_id & fingerprint == fingerprint {
                Some(biometric_sid)
            } else {
                None
            };
            if let Some(sid) = sid {
                params.retain(|p| !matches!(p, KeyParam::UserSecureId(_)));
                params.try_push(KeyParam::UserSecureId(sid))?;
            }
        }
        let key_format = KeyFormat::try_from(wrapper.key_description.key_format).map_err(|_e| {
            km_err!(
                UnsupportedKeyFormat,
                "unknown wrapped key format {}",
                wrapper.key_description.key_format
            )
        })?;
        self.import_key_with_origin(
            &params,
            key_format,
            &key_data,
            None,
            KeyOrigin::SecurelyImported,
        )
    }

    /// Checks on a new key's description that depend on TA state rather than the key type.
    fn check_new_key_params(&self, params: &[KeyParam]) -> Result<(), Error> {
        if get_bool_tag_value!(params, EarlyBootOnly)? && !self.in_early_boot {
            return Err(km_err!(EarlyBootEnded, "EARLY_BOOT_ONLY key after early boot ended"));
        }
        match get_opt_tag_value!(params, UsageCountLimit)? {
            Some(1) | None => Ok(()),
            Some(n) => Err(km_err!(
                InvalidArgument,
                "USAGE_COUNT_LIMIT {} needs rollback-resistant storage",
                n
            )),
        }
    }

    pub(crate) fn get_key_characteristics(
        &mut self,
        key_blob: &[u8],
        params: &[KeyParam],
    ) -> Result<GetKeyCharacteristicsResponse, Error> {
        let mut key = self.load_key(key_blob, params)?;
        Ok(GetKeyCharacteristicsResponse {
            enforced: core::mem::take(&mut key.hw_enforced),
            unenforced: core::mem::take(&mut key.sw_enforced),
        })
    }

    /// Export the public half of an asymmetric key as a DER `SubjectPublicKeyInfo`.
    pub(crate) fn export_key(
        &mut self,
        key_format: KeyFormat,
        key_blob: &[u8],
        params: &[KeyParam],
    ) -> Result<ExportKeyResponse, Error> {
        let key = self.load_key(key_blob, params)?;
        let algo = tag::get_algorithm(&key.hw_enforced)?;
        if !matches!(algo, Algorithm::Rsa | Algorithm::Ec) || key_format != KeyFormat::X509 {
            return Err(km_err!(
                UnsupportedKeyFormat,
                "export of {:?} key in format {:?} not supported",
                algo,
                key_format
            ));
        }
        let material = KeyMaterial::from_raw(algo, &key.key_material)?;
        Ok(ExportKeyResponse { key_data: material.subject_public_key_info()?.to_der()? })
    }

    /// Produce an attestation certificate chain for an existing asymmetric key.
    pub(crate) fn attest_key(
        &mut self,
        key_blob: &[u8],
        params: &[KeyParam],
        attestation_key: Option<AttestationKey>,
    ) -> Result<AttestKeyResponse, Error> {
        if get_bool_tag_value!(params, DeviceUniqueAttestation)? {
            return Err(km_err!(Unimplemented, "device unique attestation not supported"));
        }
        if get_opt_tag_value!(params, AttestationChallenge)?.is_none() {
            return Err(km_err!(AttestationChallengeMissing, "no attestation challenge"));
        }
        let key = self.load_key(key_blob, params)?;
        let algo = tag::get_algorithm(&key.hw_enforced)?;
        if !matches!(algo, Algorithm::Rsa | Algorithm::Ec) {
            return Err(km_err!(IncompatibleAlgorithm, "cannot attest {:?} key", algo));
        }
        let material = KeyMaterial::from_raw(algo, &key.key_material)?;

        // Certificate fields come from the request, falling back to an open-ended validity.
        let mut cert_params = Vec::new();
        cert_params.try_extend_from_slice(params)?;
        cert_params.try_extend_from_slice(&key.hw_enforced)?;
        cert_params.try_extend_from_slice(&key.sw_enforced)?;
        if get_opt_tag_value!(&cert_params, CertificateNotBefore)?.is_none() {
            cert_params.try_push(KeyParam::CertificateNotBefore(DateTime { ms_since_epoch: 0 }))?;
        }
        if get_opt_tag_value!(&cert_params, CertificateNotAfter)?.is_none() {
            cert_params.try_push(KeyParam::CertificateNotAfter(UNDEFINED_NOT_AFTER))?;
        }
        let signer = self.cert_signer(&cert_params, &material, attestation_key)?;
        let created = CreatedBlob {
            blob: Vec::new(),
            hw_enforced: key.hw_enforced.clone(),
            sw_enforced: key.sw_enforced.clone(),
        };
        let chain = self.certificate_chain(&material, &cert_params, &created, signer)?;
        info!("attested {:?} key with chain of {} certs", algo, chain.len());
        Ok(AttestKeyResponse { certificate_chain: List(chain) })
    }

    /// Upgrade a key blob to the current system versions. Returns an empty blob if the key is
    /// already current.
    pub(crate) fn upgrade_key(
        &mut self,
        key_blob: &[u8],
        params: &[KeyParam],
    ) -> Result<Vec<u8>, Error> {
        let (keyblobs, secrets) = self.dev.unsealing();
        let mut key = keyblobs.unwrap(key_blob, params, secrets)?;
        let versions = *keyblobs.versions();
        if !versions.upgrade(&mut key.hw_enforced)? {
            info!("key blob already at current versions");
            return Ok(Vec::new());
        }
        warn!("upgrading key blob to {:?}", versions);
        let hidden = tag::hidden(params)?;
        let (keyblobs, secrets) = self.dev.sealing();
        let upgraded = keyblobs.unvalidated_create(
            &key,
            &hidden,
            secrets,
            &mut *self.imp.rng,
            SlotPurpose::KeyUpgrade,
        )?;

        // The new blob has its own slot, so the old one can go.
        self.release_slot(key_blob);
        Ok(upgraded)
    }

    /// Make a key blob permanently unusable, if it depends on a secure deletion slot. Other
    /// blobs hold no state in the secure environment.
    pub(crate) fn delete_key(&mut self, key_blob: &[u8]) -> Result<(), Error> {
        let Some(slot) = keyblob::secure_deletion_slot(key_blob) else {
            debug!("key blob has no secure deletion slot");
            return Ok(());
        };
        let mgr = self.dev.sdd_mgr.as_mut().ok_or_else(|| {
            km_err!(InvalidKeyBlob, "key blob has slot {:?} but no secure storage", slot)
        })?;
        mgr.delete_secret(slot)?;
        info!("deleted key in secure deletion slot {:?}", slot);
        Ok(())
    }

    /// Wipe the factory reset secret, invalidating every key blob bound to secure storage.
    pub(crate) fn delete_all_keys(&mut self) {
        match self.dev.sdd_mgr.as_mut() {
            Some(mgr) => {
                warn!("deleting all keys");
                mgr.delete_all();
            }
            None => info!("no secure storage, no keys to delete"),
        }
    }
}

pub(crate) fn supported_algorithms() -> Result<Vec<Algorithm>, Error> {
    let mut algos = Vec::new();
    algos.try_extend_from_slice(&[
        Algorithm::Rsa,
        Algorithm::Ec,
        Algorithm::Aes,
        Algorithm::TripleDes,
        Algorithm::Hmac,
    ])?;
    Ok(algos)
}

fn check_purpose(algorithm: Algorithm, purpose: KeyPurpose) -> Result<(), Error> {
    match (algorithm, purpose) {
        (Algorithm::Aes | Algorithm::TripleDes, KeyPurpose::Encrypt | KeyPurpose::Decrypt)
        | (Algorithm::Hmac, KeyPurpose::Sign | KeyPurpose::Verify)
        | (
            Algorithm::Rsa,
            KeyPurpose::Encrypt
            | KeyPurpose::Decrypt
            | KeyPurpose::Sign
            | KeyPurpose::Verify
            | KeyPurpose::WrapKey
            | KeyPurpose::AttestKey,
        )
        | (
            Algorithm::Ec,
            KeyPurpose::Sign | KeyPurpose::Verify | KeyPurpose::AgreeKey | KeyPurpose::AttestKey,
        ) => Ok(()),
        _ => Err(km_err!(UnsupportedPurpose, "purpose {:?} invalid for {:?}", purpose, algorithm)),
    }
}

pub(crate) fn supported_block_modes(
    algorithm: Algorithm,
    purpose: KeyPurpose,
) -> Result<Vec<BlockMode>, Error> {
    check_purpose(algorithm, purpose)?;
    let mut modes = Vec::new();
    match algorithm {
        Algorithm::Aes => modes.try_extend_from_slice(&[
            BlockMode::Ecb,
            BlockMode::Cbc,
            BlockMode::Ctr,
            BlockMode::Gcm,
        ])?,
        Algorithm::TripleDes => modes.try_extend_from_slice(&[BlockMode::Ecb, BlockMode::Cbc])?,
        _ => {}
    }
    Ok(modes)
}

pub(crate) fn supported_padding_modes(
    algorithm: Algorithm,
    purpose: KeyPurpose,
) -> Result<Vec<PaddingMode>, Error> {
    check_purpose(algorithm, purpose)?;
    let mut modes = Vec::new();
    match (algorithm, purpose) {
        (Algorithm::Aes | Algorithm::TripleDes, _) => {
            modes.try_extend_from_slice(&[PaddingMode::None, PaddingMode::Pkcs7])?
        }
        (Algorithm::Rsa, KeyPurpose::Encrypt | KeyPurpose::Decrypt | KeyPurpose::WrapKey) => {
            modes.try_extend_from_slice(&[
                PaddingMode::None,
                PaddingMode::RsaOaep,
                PaddingMode::RsaPkcs115Encrypt,
            ])?
        }
        (Algorithm::Rsa, KeyPurpose::Sign | KeyPurpose::Verify) => modes.try_extend_from_slice(
            &[PaddingMode::None, PaddingMode::RsaPss, PaddingMode::RsaPkcs115Sign],
        )?,
        _ => {}
    }
    Ok(modes)
}

pub(crate) fn supported_digests(
    algorithm: Algorithm,
    purpose: KeyPurpose,
) -> Result<Vec<Digest>, Error> {
    check_purpose(algorithm, purpose)?;
    let mut digests = Vec::new();
    match algorithm {
        Algorithm::Rsa | Algorithm::Ec => digests.try_push(Digest::None)?,
        _ => {}
    }
    if matches!(algorithm, Algorithm::Hmac | Algorithm::Rsa | Algorithm::Ec) {
        digests.try_extend_from_slice(&[
            Digest::Sha1,
            Digest::Sha224,
            Digest::Sha256,
            Digest::Sha384,
            Digest::Sha512,
        ])?;
    }
    Ok(digests)
}

pub(crate) fn supported_import_formats(algorithm: Algorithm) -> Result<Vec<KeyFormat>, Error> {
    match algorithm {
        Algorithm::Aes | Algorithm::TripleDes | Algorithm::Hmac => vec_try![KeyFormat::Raw],
        Algorithm::Rsa | Algorithm::Ec => vec_try![KeyFormat::Pkcs8],
    }
}

pub(crate) fn supported_export_formats(algorithm: Algorithm) -> Result<Vec<KeyFormat>, Error> {
    match algorithm {
        Algorithm::Aes | Algorithm::TripleDes | Algorithm::Hmac => Ok(Vec::new()),
        Algorithm::Rsa | Algorithm::Ec => vec_try![KeyFormat::X509],
    }
}

#[cfg(test)]
mod tests;
