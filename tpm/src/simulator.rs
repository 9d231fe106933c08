//! A private `swtpm` process for running without a hardware TPM.

use log::{error, info};
use std::{
    io,
    net::{Ipv4Addr, TcpListener, TcpStream},
    path::Path,
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};
use tempfile::TempDir;

const HOST: &str = "127.0.0.1";
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A running `swtpm` whose state lives in a temporary directory. The TPM, and every key it holds,
/// disappears when this is dropped.
pub struct Swtpm {
    child: Child,
    port: u16,
    _state: TempDir,
}

/// A port whose successor is also free, for the server and control channels.
fn free_port_pair() -> io::Result<u16> {
    for _ in 0..32 {
        let server = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        let port = server.local_addr()?.port();
        let Some(ctrl) = port.checked_add(1) else { continue };
        if TcpListener::bind((Ipv4Addr::LOCALHOST, ctrl)).is_ok() {
            return Ok(port);
        }
    }
    Err(io::Error::new(io::ErrorKind::AddrInUse, "no free port pair for swtpm"))
}

impl Swtpm {
    /// Start `binary` as a TPM 2.0 simulator and wait until it accepts connections.
    pub fn launch(binary: &Path) -> io::Result<Self> {
        let state = tempfile::tempdir()?;
        let port = free_port_pair()?;
        let mut child = Command::new(binary)
            .arg("socket")
            .arg("--tpm2")
            .arg("--tpmstate")
            .arg(format!("dir={}", state.path().display()))
            .arg("--server")
            .arg(format!("type=tcp,port={}", port))
            .arg("--ctrl")
            .arg(format!("type=tcp,port={}", port + 1))
            .arg("--flags")
            .arg("not-need-init,startup-clear")
            .stdin(Stdio::null())
            .spawn()?;

        let deadline = Instant::now() + STARTUP_TIMEOUT;
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(io::Error::other(format!("swtpm exited early: {}", status)));
            }
            if TcpStream::connect((HOST, port)).is_ok() {
                break;
            }
            if Instant::now() > deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(io::Error::new(io::ErrorKind::TimedOut, "swtpm did not start"));
            }
            thread::sleep(POLL_INTERVAL);
        }
        info!("swtpm {} listening on {}:{}", child.id(), HOST, port);
        Ok(Self { child, port, _state: state })
    }

    pub fn host(&self) -> &str {
        HOST
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for Swtpm {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            error!("failed to stop swtpm {}: {}", self.child.id(), e);
        }
        let _ = self.child.wait();
    }
}
