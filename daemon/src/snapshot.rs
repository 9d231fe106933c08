//! Suspend/resume coordination with the launcher.
//!
//! The launcher writes single bytes to a socket: [`SUSPEND`] must be answered with [`SUSPEND_ACK`]
//! once no worker is inside a request; [`RESUME`] releases the workers.

use log::{error, info, warn};
use std::{
    io::{self, Read, Write},
    sync::{Condvar, Mutex, MutexGuard},
};

#[cfg(test)]
mod tests;

pub const SUSPEND: u8 = 1;
pub const SUSPEND_ACK: u8 = 2;
pub const RESUME: u8 = 3;

#[derive(Debug, Default)]
struct GateState {
    suspended: bool,
    busy: usize,
}

/// Lets workers run requests unless a snapshot is in progress.
#[derive(Debug, Default)]
pub struct SuspendGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

/// Marks a worker as inside a request until dropped.
#[must_use]
pub struct Busy<'a> {
    gate: &'a SuspendGate,
}

impl SuspendGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // Counters stay consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, GateState>) -> MutexGuard<'a, GateState> {
        self.changed.wait(guard).unwrap_or_else(|e| e.into_inner())
    }

    /// Block while suspended, then mark the caller busy.
    pub fn begin_request(&self) -> Busy<'_> {
        let mut state = self.lock();
        while state.suspended {
            state = self.wait(state);
        }
        state.busy += 1;
        Busy { gate: self }
    }

    /// Stop new requests and wait for the ones in flight to finish.
    pub fn suspend(&self) {
        let mut state = self.lock();
        state.suspended = true;
        while state.busy > 0 {
            state = self.wait(state);
        }
    }

    pub fn resume(&self) {
        self.lock().suspended = false;
        self.changed.notify_all();
    }

    pub fn is_suspended(&self) -> bool {
        self.lock().suspended
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.gate.lock().busy -= 1;
        self.gate.changed.notify_all();
    }
}

/// Serve launcher snapshot commands until the socket closes. Workers are released on exit so a
/// vanished launcher cannot leave them parked.
pub fn serve<S: Read + Write>(mut socket: S, gate: &SuspendGate) {
    if let Err(e) = serve_commands(&mut socket, gate) {
        error!("snapshot socket failed: {}", e);
    }
    if gate.is_suspended() {
        warn!("snapshot socket closed while suspended, resuming");
        gate.resume();
    }
}

fn serve_commands<S: Read + Write>(socket: &mut S, gate: &SuspendGate) -> io::Result<()> {
    let mut cmd = [0u8];
    loop {
        match socket.read(&mut cmd)? {
            0 => {
                info!("snapshot socket closed");
                return Ok(());
            }
            _ => match cmd[0] {
                SUSPEND => {
                    info!("suspending request processing");
                    gate.suspend();
                    socket.write_all(&[SUSPEND_ACK])?;
                    socket.flush()?;
                }
                RESUME => {
                    info!("resuming request processing");
                    gate.resume();
                }
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("unexpected snapshot command {}", other),
                    ));
                }
            },
        }
    }
}
