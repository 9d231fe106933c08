//! Command line of the `secure_env` daemon. Flag names keep the launcher's underscore spelling.

use clap::{ArgAction, Parser, ValueEnum};
use std::{os::fd::RawFd, path::PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum TpmImpl {
    /// A private `swtpm` simulator whose state lasts as long as the process.
    InMemory,
    /// The host's TPM through `/dev/tpmrm0` or `/dev/tpm0`.
    HostDevice,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum EngineImpl {
    /// Keys and state protected by the TPM.
    Tpm,
    /// Process-random keys; nothing survives a restart.
    Software,
}

#[derive(Parser, Debug)]
#[command(
    name = "secure_env",
    about = "Keymint, Gatekeeper and confirmation UI signing for a virtual device",
    rename_all = "snake_case"
)]
pub struct Flags {
    /// Pipe carrying Keymint requests from the guest.
    #[arg(long)]
    pub keymaster_fd_in: RawFd,
    /// Pipe carrying Keymint responses to the guest.
    #[arg(long)]
    pub keymaster_fd_out: RawFd,
    /// Pipe carrying Gatekeeper requests from the guest.
    #[arg(long)]
    pub gatekeeper_fd_in: RawFd,
    /// Pipe carrying Gatekeeper responses to the guest.
    #[arg(long)]
    pub gatekeeper_fd_out: RawFd,
    /// Listening socket for confirmation UI sign requests.
    #[arg(long)]
    pub confui_server_fd: Option<RawFd>,
    /// Socket carrying suspend and resume commands from the launcher.
    #[arg(long)]
    pub run_cvd_to_secure_env_fd: Option<RawFd>,
    /// Pipe of guest kernel boot events.
    #[arg(long)]
    pub kernel_events_fd: Option<RawFd>,
    #[arg(long, value_enum, default_value_t = TpmImpl::InMemory)]
    pub tpm_impl: TpmImpl,
    /// Simulator started for `--tpm_impl=in_memory`.
    #[arg(long, default_value = "swtpm")]
    pub swtpm_binary: PathBuf,
    #[arg(long, value_enum, default_value_t = EngineImpl::Tpm)]
    pub keymint_impl: EngineImpl,
    #[arg(long, value_enum, default_value_t = EngineImpl::Tpm)]
    pub gatekeeper_impl: EngineImpl,
    /// Accepted for launcher compatibility; no JavaCard applets are served.
    #[arg(
        long,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub enable_jcard_simulator: bool,
    /// Directory holding the gatekeeper state files.
    #[arg(long, default_value = ".")]
    pub secure_env_dir: PathBuf,
}
