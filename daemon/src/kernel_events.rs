//! Drains the guest kernel event pipe, logging boot progress.
//!
//! Each event is a host-endian `u64` length followed by that many bytes of JSON:
//! `{"event": <code>, "metadata": {...}}`.

use log::{info, warn};
use serde::Deserialize;
use std::io::{self, Read};

/// Upper bound on a single event body.
const MAX_EVENT_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct KernelEvent {
    pub event: i64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Name of an event code, if known.
pub fn event_name(code: i64) -> Option<&'static str> {
    Some(match code {
        0 => "BootStarted",
        1 => "BootCompleted",
        2 => "BootFailed",
        3 => "WifiNetworkConnected",
        4 => "MobileNetworkConnected",
        5 => "AdbdStarted",
        6 => "ScreenChanged",
        7 => "EthernetNetworkConnected",
        8 => "KernelLoaded",
        9 => "BootloaderLoaded",
        10 => "BootPending",
        11 => "FastbootStarted",
        _ => return None,
    })
}

/// Next event, or `None` at end of stream.
pub fn read_event<R: Read>(input: &mut R) -> io::Result<Option<KernelEvent>> {
    let mut len = [0u8; 8];
    match input.read_exact(&mut len) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u64::from_ne_bytes(len);
    if len > MAX_EVENT_SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, format!("event of {} bytes", len)));
    }
    let mut body = vec![0u8; len as usize];
    input.read_exact(&mut body)?;
    serde_json::from_slice(&body).map(Some).map_err(io::Error::from)
}

pub fn serve<R: Read>(mut input: R) {
    loop {
        match read_event(&mut input) {
            Ok(Some(ev)) => match event_name(ev.event) {
                Some(name) => info!("kernel event {}", name),
                None => info!("kernel event {} ({})", ev.event, ev.metadata),
            },
            Ok(None) => {
                info!("kernel event pipe closed");
                return;
            }
            Err(e) => {
                warn!("kernel event pipe failed: {}", e);
                return;
            }
        }
    }
}
