//! [`Tpm`] backed by the TSS enhanced system API, over any TCTI the TSS can load.

use crate::{simulator::Swtpm, Tpm, TpmError};
use log::{debug, info};
use std::{path::Path, str::FromStr};
use tss_esapi::{
    attributes::NvIndexAttributesBuilder,
    constants::{PropertyTag, StartupType},
    handles::{KeyHandle, NvIndexHandle, NvIndexTpmHandle, ObjectHandle, TpmHandle},
    interface_types::{
        algorithm::{HashingAlgorithm, SymmetricMode},
        resource_handles::{Hierarchy, NvAuth, Provision},
    },
    structures::{
        Auth, Digest, InitialValue, MaxBuffer, MaxNvBuffer, NvPublicBuilder, Private, Public,
    },
    tcti_ldr::{DeviceConfig, NetworkTPMConfig, TctiNameConf},
    Context,
};


/// A TPM reached through `libtss2-esys`. Owns the simulator process, if any, that it talks to.
pub struct EsysTpm {
    context: Context,
    // Dropped after the context, so the TCTI disconnects before the simulator goes away.
    _simulator: Option<Swtpm>,
}

impl EsysTpm {
    /// Open a TPM character device such as `/dev/tpmrm0`.
    pub fn device(path: &Path) -> Result<Self, TpmError> {
        let config = DeviceConfig::from_str(&path.to_string_lossy())?;
        info!("opening TPM device {}", path.display());
        Ok(Self { context: Context::new(TctiNameConf::Device(config))?, _simulator: None })
    }

    /// Connect to a TPM simulator speaking the swtpm socket protocol.
    pub fn swtpm(host: &str, port: u16) -> Result<Self, TpmError> {
        let config = NetworkTPMConfig::from_str(&format!("host={},port={}", host, port))?;
        Ok(Self { context: Context::new(TctiNameConf::Swtpm(config))?, _simulator: None })
    }

    /// Connect to a freshly launched simulator, which lives as long as the returned value.
    pub fn simulator(simulator: Swtpm) -> Result<Self, TpmError> {
        let mut tpm = Self::swtpm(simulator.host(), simulator.port())?;
        tpm._simulator = Some(simulator);
        Ok(tpm)
    }

    /// Use the TCTI named by the `TCTI` environment variable.
    pub fn from_environment() -> Result<Self, TpmError> {
        let conf = TctiNameConf::from_environment_variable()?;
        Ok(Self { context: Context::new(conf)?, _simulator: None })
    }

    fn nv_handle(&mut self, index: NvIndexTpmHandle) -> Result<NvIndexHandle, TpmError> {
        let object = self
            .context
            .execute_without_session(|ctx| ctx.tr_from_tpm_public(TpmHandle::NvIndex(index)))?;
        Ok(NvIndexHandle::from(object))
    }

    fn close(&mut self, handle: NvIndexHandle) {
        let mut object = ObjectHandle::from(handle);
        if let Err(e) = self.context.tr_close(&mut object) {
            debug!("failed to close NV handle: {}", e);
        }
    }
}

impl Tpm for EsysTpm {
    fn startup(&mut self) -> Result<(), TpmError> {
        match self.context.startup(StartupType::Clear).map_err(TpmError::from) {
            Err(TpmError::Initialize) => {
                debug!("TPM already started");
                Ok(())
            }
            other => other,
        }
    }

    fn dictionary_attack_lock_reset(&mut self) -> Result<(), TpmError> {
        Ok(self.context.execute_with_nullauth_session(|ctx| ctx.dictionary_attack_lock_reset())?)
    }

    fn max_transient_objects(&mut self) -> Result<u32, TpmError> {
        Ok(self.context.get_tpm_property(PropertyTag::HrTransientMin)?.unwrap_or(0))
    }

    fn create_primary(&mut self, template: Public) -> Result<KeyHandle, TpmError> {
        let result = self.context.execute_with_nullauth_session(|ctx| {
            ctx.create_primary(Hierarchy::Owner, template, None, None, None, None)
        })?;
        Ok(result.key_handle)
    }

    fn create(
        &mut self,
        parent: KeyHandle,
        template: Public,
    ) -> Result<(Private, Public), TpmError> {
        let result = self.context.execute_with_nullauth_session(|ctx| {
            ctx.create(parent, template, None, None, None, None)
        })?;
        Ok((result.out_private, result.out_public))
    }

    fn load(
        &mut self,
        parent: KeyHandle,
        private: Private,
        public: Public,
    ) -> Result<KeyHandle, TpmError> {
        Ok(self.context.execute_with_nullauth_session(|ctx| ctx.load(parent, private, public))?)
    }

    fn flush_context(&mut self, handle: ObjectHandle) -> Result<(), TpmError> {
        Ok(self.context.flush_context(handle)?)
    }

    fn hmac(&mut self, key: KeyHandle, data: MaxBuffer) -> Result<Digest, TpmError> {
        Ok(self.context.execute_with_nullauth_session(|ctx| {
            ctx.hmac(key.into(), data, HashingAlgorithm::Sha256)
        })?)
    }

    fn hmac_start(&mut self, key: KeyHandle, auth: Auth) -> Result<ObjectHandle, TpmError> {
        Ok(self.context.execute_with_nullauth_session(|ctx| {
            ctx.hmac_sequence_start(key.into(), HashingAlgorithm::Sha256, Some(auth))
        })?)
    }

    fn sequence_update(
        &mut self,
        sequence: ObjectHandle,
        data: MaxBuffer,
    ) -> Result<(), TpmError> {
        Ok(self.context.execute_with_nullauth_session(|ctx| ctx.sequence_update(sequence, data))?)
    }

    fn sequence_complete(
        &mut self,
        sequence: ObjectHandle,
        data: MaxBuffer,
    ) -> Result<Digest, TpmError> {
        let (digest, _ticket) = self.context.execute_with_nullauth_session(|ctx| {
            ctx.sequence_complete(sequence, data, Hierarchy::Null)
        })?;
        Ok(digest)
    }

    fn encrypt_decrypt(
        &mut self,
        key: KeyHandle,
        decrypt: bool,
        iv: InitialValue,
        data: MaxBuffer,
    ) -> Result<(MaxBuffer, InitialValue), TpmError> {
        Ok(self.context.execute_with_nullauth_session(|ctx| {
            ctx.encrypt_decrypt_2(key, decrypt, SymmetricMode::Cfb, data, iv)
        })?)
    }

    fn nv_define_space(&mut self, index: NvIndexTpmHandle, size: u16) -> Result<(), TpmError> {
        let attributes =
            NvIndexAttributesBuilder::new().with_owner_write(true).with_owner_read(true).build()?;
        let public = NvPublicBuilder::new()
            .with_nv_index(index)
            .with_index_name_algorithm(HashingAlgorithm::Sha256)
            .with_index_attributes(attributes)
            .with_data_area_size(size as usize)
            .build()?;
        let handle = self.context.execute_with_nullauth_session(|ctx| {
            ctx.nv_define_space(Provision::Owner, None, public)
        })?;
        self.close(handle);
        Ok(())
    }

    fn nv_write(
        &mut self,
        index: NvIndexTpmHandle,
        offset: u16,
        data: MaxNvBuffer,
    ) -> Result<(), TpmError> {
        let handle = self.nv_handle(index)?;
        let result = self.context.execute_with_nullauth_session(|ctx| {
            ctx.nv_write(NvAuth::Owner, handle, data, offset)
        });
        self.close(handle);
        Ok(result?)
    }

    fn nv_read(
        &mut self,
        index: NvIndexTpmHandle,
        offset: u16,
        size: u16,
    ) -> Result<MaxNvBuffer, TpmError> {
        let handle = self.nv_handle(index)?;
        let result = self.context.execute_with_nullauth_session(|ctx| {
            ctx.nv_read(NvAuth::Owner, handle, size, offset)
        });
        self.close(handle);
        Ok(result?)
    }

    fn nv_undefine_space(&mut self, index: NvIndexTpmHandle) -> Result<(), TpmError> {
        let handle = self.nv_handle(index)?;
        // Undefining the index also releases the ESYS resource.
        Ok(self.context.execute_with_nullauth_session(|ctx| {
            ctx.nv_undefine_space(Provision::Owner, handle)
        })?)
    }

    fn get_random(&mut self, size: usize) -> Result<Digest, TpmError> {
        Ok(self.context.get_random(size)?)
    }
}
