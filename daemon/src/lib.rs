//! The `secure_env` daemon: serves Keymint, Gatekeeper and confirmation UI signing to a virtual
//! device over inherited pipes and sockets.
//!
//! Every engine is built inside the thread that serves it. The only state shared between threads
//! is the TPM [`ResourceManager`], which serializes access to the TPM, and the [`SuspendGate`].

use anyhow::{anyhow, Context};
use log::{info, warn};
use senv_common::{
    crypto::{DeviceHmac, DeviceKey, Secret, SoftwareDeviceHmac},
    keyblob::{
        InMemorySlotManager, KeyBlobMaker, SecureDeletionSecretManager, SoftwareKeyBlobMaker,
    },
    wire::keymint::SecurityLevel,
};
use senv_crypto::{aes::RustCryptoAes, clock::BootClock, hmac::RustCryptoHmac, rng::RustCryptoRng};
use senv_gatekeeper::{FragileTpmStorage, Gatekeeper, InsecureJsonStorage};
use senv_ta::{
    device::{self, BootloaderDone},
    HardwareInfo, KeyMintTa,
};
use senv_tpm::{
    nv::NvSlotManager, simulator::Swtpm, EsysTpm, ResourceManager, Tpm, TpmDeviceHmac,
    TpmKeyBlobMaker,
};
use std::{
    fs::File,
    io::{Read, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

pub mod attest;
pub mod channel;
pub mod clock;
pub mod confui;
mod error;
pub mod fd;
pub mod flags;
pub mod kernel_events;
pub mod snapshot;

pub use error::Error;
pub use flags::{EngineImpl, Flags, TpmImpl};

use channel::Channel;
use clock::SystemWallClock;
use snapshot::SuspendGate;

/// Host TPM device nodes, in order of preference.
const HOST_TPM_DEVICES: [&str; 2] = ["/dev/tpmrm0", "/dev/tpm0"];

/// Secure deletion slots of a software Keymint, lost on exit.
const SOFTWARE_SLOTS: usize = 32;

/// Gatekeeper state files under the state directory.
const GATEKEEPER_SECURE_FILE: &str = "gatekeeper_secure";
const GATEKEEPER_INSECURE_FILE: &str = "gatekeeper_insecure";

/// Where an engine's device keys live. Each thread builds its own [`DeviceHmac`] from this.
#[derive(Clone)]
pub enum KeySource {
    Tpm(Arc<ResourceManager>),
    /// Process-random keys, shared by every software engine so their tokens interoperate.
    Software([Secret<32>; DeviceKey::COUNT]),
}

impl KeySource {
    pub fn device_hmac(&self) -> Box<dyn DeviceHmac> {
        match self {
            KeySource::Tpm(manager) => Box::new(TpmDeviceHmac::new(Arc::clone(manager))),
            KeySource::Software(keys) => {
                Box::new(SoftwareDeviceHmac::with_keys(Box::new(RustCryptoHmac), keys.clone()))
            }
        }
    }
}

/// Open, start and unlock the selected TPM. `swtpm` is the simulator binary for
/// [`TpmImpl::InMemory`].
pub fn open_tpm(which: TpmImpl, swtpm: &Path) -> Result<Arc<ResourceManager>, Error> {
    let mut tpm: Box<dyn Tpm> = match which {
        TpmImpl::InMemory => {
            let simulator = Swtpm::launch(swtpm).map_err(Error::Simulator)?;
            Box::new(EsysTpm::simulator(simulator)?)
        }
        TpmImpl::HostDevice => Box::new(open_host_device()?),
    };
    tpm.startup()?;
    tpm.dictionary_attack_lock_reset()?;
    Ok(Arc::new(ResourceManager::new(tpm)))
}

fn open_host_device() -> Result<EsysTpm, Error> {
    for path in HOST_TPM_DEVICES {
        let path = Path::new(path);
        if !path.exists() {
            continue;
        }
        match EsysTpm::device(path) {
            Ok(tpm) => {
                info!("Using host TPM at {}", path.display());
                return Ok(tpm);
            }
            Err(e) => warn!("Cannot open {}: {}", path.display(), e),
        }
    }
    Err(Error::NoTpmDevice)
}

/// Engine selection and shared resources, fixed at startup.
pub struct Config {
    pub tpm: Arc<ResourceManager>,
    pub keymint_impl: EngineImpl,
    pub gatekeeper_impl: EngineImpl,
    /// Directory holding the gatekeeper state files.
    pub state_dir: PathBuf,
    /// Software device keys, used by whichever engines run in software.
    pub software_keys: [Secret<32>; DeviceKey::COUNT],
}

impl Config {
    pub fn new(
        tpm: Arc<ResourceManager>,
        keymint_impl: EngineImpl,
        gatekeeper_impl: EngineImpl,
        state_dir: PathBuf,
    ) -> Result<Self, Error> {
        let software_keys = SoftwareDeviceHmac::random_keys(&mut RustCryptoRng::new()?);
        Ok(Self { tpm, keymint_impl, gatekeeper_impl, state_dir, software_keys })
    }

    fn key_source(&self, which: EngineImpl) -> KeySource {
        match which {
            EngineImpl::Tpm => KeySource::Tpm(Arc::clone(&self.tpm)),
            EngineImpl::Software => KeySource::Software(self.software_keys.clone()),
        }
    }

    /// Keys shared by Keymint and the confirmation UI signer.
    pub fn keymint_keys(&self) -> KeySource {
        self.key_source(self.keymint_impl)
    }

    pub fn gatekeeper_keys(&self) -> KeySource {
        self.key_source(self.gatekeeper_impl)
    }
}

pub fn build_keymint(
    which: EngineImpl,
    manager: &Arc<ResourceManager>,
    keys: &KeySource,
) -> Result<KeyMintTa, Error> {
    let imp = senv_crypto::implementation()?;
    type Sealing = (Box<dyn KeyBlobMaker>, Box<dyn SecureDeletionSecretManager>);
    let ((keyblobs, sdd_mgr), security_level): (Sealing, _) = match which {
        EngineImpl::Tpm => (
            (
                Box::new(TpmKeyBlobMaker::new(Arc::clone(manager))),
                Box::new(NvSlotManager::new(Arc::clone(manager))),
            ),
            SecurityLevel::TrustedEnvironment,
        ),
        EngineImpl::Software => (
            (
                Box::new(SoftwareKeyBlobMaker::new(
                    Box::new(RustCryptoAes),
                    Box::new(RustCryptoHmac),
                    Box::new(RustCryptoRng::new()?),
                )),
                Box::new(InMemorySlotManager::<SOFTWARE_SLOTS>::default()),
            ),
            SecurityLevel::Software,
        ),
    };
    let dev = device::Implementation {
        keyblobs,
        sdd_mgr: Some(sdd_mgr),
        keys: keys.device_hmac(),
        bootloader: Box::new(BootloaderDone),
        wall_clock: Box::new(SystemWallClock),
        sign_info: Box::new(attest::SoftAttestation::new().map_err(Error::Attestation)?),
    };
    let hw_info = HardwareInfo {
        security_level,
        version_number: 2,
        impl_name: "Cuttlefish secure environment KeyMint",
        author_name: "Google",
    };
    Ok(KeyMintTa::new(hw_info, imp, dev))
}

pub fn build_gatekeeper(
    which: EngineImpl,
    manager: &Arc<ResourceManager>,
    keys: &KeySource,
    state_dir: &Path,
) -> Result<Gatekeeper, Error> {
    let rng = Box::new(RustCryptoRng::new()?);
    Ok(match which {
        EngineImpl::Tpm => Gatekeeper::new(
            keys.device_hmac(),
            Box::new(BootClock),
            rng,
            true,
            Box::new(FragileTpmStorage::open(
                Arc::clone(manager),
                &state_dir.join(GATEKEEPER_SECURE_FILE),
            )),
            Box::new(InsecureJsonStorage::open(
                Arc::clone(manager),
                &state_dir.join(GATEKEEPER_INSECURE_FILE),
            )),
        ),
        EngineImpl::Software => Gatekeeper::software(keys.device_hmac(), Box::new(BootClock), rng),
    })
}

/// Both directions of a framed channel.
pub struct Pipes {
    pub input: Box<dyn Read + Send>,
    pub output: Box<dyn Write + Send>,
}

/// Connections the daemon serves.
pub struct Endpoints {
    pub keymint: Pipes,
    pub gatekeeper: Pipes,
    pub confui: Option<UnixListener>,
    pub snapshot: Option<UnixStream>,
    pub kernel_events: Option<Box<dyn Read + Send>>,
}

/// Threads serving the guest. Snapshot and kernel event threads are detached and not tracked.
pub struct Services {
    workers: Vec<(&'static str, JoinHandle<()>)>,
    gate: Arc<SuspendGate>,
}

impl Services {
    pub fn gate(&self) -> &Arc<SuspendGate> {
        &self.gate
    }

    /// Whether the named worker has stopped serving.
    pub fn is_finished(&self, name: &str) -> bool {
        self.workers.iter().any(|(n, handle)| *n == name && handle.is_finished())
    }

    /// Wait for every worker to finish. A panicked worker is an error.
    pub fn join(self) -> anyhow::Result<()> {
        for (name, handle) in self.workers {
            handle.join().map_err(|_e| anyhow!("{} thread panicked", name))?;
            info!("{} thread finished", name);
        }
        Ok(())
    }
}

/// Spawn a thread that builds its engine and then serves with it. Returns once the engine is
/// built, or with the build error.
fn spawn_worker<E, B, S>(name: &'static str, build: B, serve: S) -> anyhow::Result<JoinHandle<()>>
where
    B: FnOnce() -> Result<E, Error> + Send + 'static,
    S: FnOnce(E) + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || match build() {
            Ok(engine) => {
                let _ = tx.send(Ok(()));
                serve(engine);
            }
            Err(e) => {
                let _ = tx.send(Err(e));
            }
        })
        .with_context(|| format!("failed to spawn {} thread", name))?;
    match rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => Err(anyhow::Error::new(e).context(format!("failed to build {}", name))),
        Err(_) => Err(anyhow!("{} thread panicked during startup", name)),
    }
}

/// Build every engine and start serving `endpoints`.
pub fn start(config: &Config, endpoints: Endpoints) -> anyhow::Result<Services> {
    let gate = Arc::new(SuspendGate::new());
    let mut workers = Vec::new();

    let (manager, keys, which) =
        (Arc::clone(&config.tpm), config.keymint_keys(), config.keymint_impl);
    let worker_gate = Arc::clone(&gate);
    let Pipes { input, output } = endpoints.keymint;
    workers.push((
        "keymint",
        spawn_worker(
            "keymint",
            move || build_keymint(which, &manager, &keys),
            move |mut ta| {
                channel::serve("keymint", &mut ta, Channel::new(input, output), &worker_gate)
            },
        )?,
    ));

    let (manager, keys, which) =
        (Arc::clone(&config.tpm), config.gatekeeper_keys(), config.gatekeeper_impl);
    let state_dir = config.state_dir.clone();
    let worker_gate = Arc::clone(&gate);
    let Pipes { input, output } = endpoints.gatekeeper;
    workers.push((
        "gatekeeper",
        spawn_worker(
            "gatekeeper",
            move || build_gatekeeper(which, &manager, &keys, &state_dir),
            move |mut gk| {
                channel::serve("gatekeeper", &mut gk, Channel::new(input, output), &worker_gate)
            },
        )?,
    ));

    match endpoints.confui {
        Some(listener) => {
            let keys = config.keymint_keys();
            workers.push((
                "confui",
                spawn_worker(
                    "confui",
                    move || Ok(keys.device_hmac()),
                    move |hmac| confui::serve(listener, hmac.as_ref()),
                )?,
            ));
        }
        None => warn!("No confirmation UI socket, sign requests will not be served"),
    }

    if let Some(socket) = endpoints.snapshot {
        let gate = Arc::clone(&gate);
        thread::Builder::new()
            .name("snapshot".to_string())
            .spawn(move || snapshot::serve(socket, &gate))
            .context("failed to spawn snapshot thread")?;
    }
    if let Some(events) = endpoints.kernel_events {
        thread::Builder::new()
            .name("kernel_events".to_string())
            .spawn(move || kernel_events::serve(events))
            .context("failed to spawn kernel event thread")?;
    }

    Ok(Services { workers, gate })
}

fn adopt_file(raw_fd: std::os::fd::RawFd) -> Result<File, Error> {
    Ok(File::from(fd::take_inherited(raw_fd)?))
}

/// Adopt the inherited descriptors named by `flags`.
pub fn inherited_endpoints(flags: &Flags) -> Result<Endpoints, Error> {
    let pipes = |input, output| -> Result<Pipes, Error> {
        Ok(Pipes { input: Box::new(adopt_file(input)?), output: Box::new(adopt_file(output)?) })
    };
    Ok(Endpoints {
        keymint: pipes(flags.keymaster_fd_in, flags.keymaster_fd_out)?,
        gatekeeper: pipes(flags.gatekeeper_fd_in, flags.gatekeeper_fd_out)?,
        confui: flags
            .confui_server_fd
            .map(|raw| fd::take_inherited(raw).map(UnixListener::from))
            .transpose()?,
        snapshot: flags
            .run_cvd_to_secure_env_fd
            .map(|raw| fd::take_inherited(raw).map(UnixStream::from))
            .transpose()?,
        kernel_events: match flags.kernel_events_fd {
            Some(raw) => Some(Box::new(adopt_file(raw)?) as Box<dyn Read + Send>),
            None => None,
        },
    })
}

/// Run the daemon until the Keymint, Gatekeeper and confirmation UI threads have all finished.
pub fn run(flags: Flags) -> anyhow::Result<()> {
    info!("Starting secure_env: {:?}", flags);
    if flags.enable_jcard_simulator {
        warn!("JavaCard simulator requested, but no applets are available");
    }
    let endpoints = inherited_endpoints(&flags).context("failed to adopt inherited descriptors")?;
    let tpm = open_tpm(flags.tpm_impl, &flags.swtpm_binary)
        .context("failed to initialize the TPM")?;
    let config =
        Config::new(tpm, flags.keymint_impl, flags.gatekeeper_impl, flags.secure_env_dir)?;
    start(&config, endpoints)?.join()?;
    info!("All services finished, exiting");
    Ok(())
}
