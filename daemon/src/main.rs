use clap::Parser;
use log::{error, LevelFilter};
use senv_daemon::Flags;
use std::process::ExitCode;

fn init_logging() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn main() -> ExitCode {
    let flags = Flags::parse();
    init_logging();
    match senv_daemon::run(flags) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("FATAL: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
