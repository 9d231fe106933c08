//! Signing server for confirmation UI prompts. Each connection carries one request and one reply.

use log::{error, info, warn};
use senv_common::{
    crypto::{DeviceHmac, DeviceKey},
    wire::{
        channel::MAX_PAYLOAD_SIZE,
        confui::{SignHeader, SignMessageError, CONFIRMATION_TOKEN_PREFIX},
        gatekeeper::HMAC_SIZE,
    },
};
use std::{
    io::{self, Read, Write},
    os::unix::net::UnixListener,
};

#[cfg(test)]
mod tests;

/// MAC the guest's Keymint accepts as the confirmation token for `message`.
pub fn confirmation_token(keys: &dyn DeviceHmac, message: &[u8]) -> Option<Vec<u8>> {
    let mut input = Vec::with_capacity(CONFIRMATION_TOKEN_PREFIX.len() + message.len());
    input.extend_from_slice(CONFIRMATION_TOKEN_PREFIX);
    input.extend_from_slice(message);
    match keys.hmac(DeviceKey::ConfirmationToken, &input) {
        Ok(mac) if mac.len() == HMAC_SIZE => Some(mac),
        Ok(mac) => {
            error!("confirmation token MAC has length {}", mac.len());
            None
        }
        Err(e) => {
            error!("confirmation token MAC failed: {:?}", e);
            None
        }
    }
}

/// Read one sign request from `conn` and write the reply.
pub fn handle_connection<S: Read + Write>(mut conn: S, keys: &dyn DeviceHmac) -> io::Result<()> {
    let mut header = [0u8; SignHeader::SIZE];
    conn.read_exact(&mut header)?;
    let header = SignHeader::decode(&header).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("bad sign request header: {:?}", e))
    })?;
    if header.payload_size > MAX_PAYLOAD_SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "sign request too long"));
    }
    let mut message = vec![0u8; header.payload_size as usize];
    conn.read_exact(&mut message)?;

    let (error, mac) = match confirmation_token(keys, &message) {
        Some(mac) => (SignMessageError::Ok, mac),
        None => (SignMessageError::UnknownError, Vec::new()),
    };
    let reply = SignHeader { error, payload_size: mac.len() as u32 };
    conn.write_all(&reply.encode())?;
    conn.write_all(&mac)?;
    conn.flush()
}

/// Accept sign requests until the listening socket fails.
pub fn serve(listener: UnixListener, keys: &dyn DeviceHmac) {
    info!("confirmation UI sign server ready");
    for conn in listener.incoming() {
        match conn {
            Ok(conn) => {
                if let Err(e) = handle_connection(conn, keys) {
                    warn!("confirmation UI connection dropped: {}", e);
                }
            }
            Err(e) => {
                error!("confirmation UI accept failed: {}", e);
                return;
            }
        }
    }
}
