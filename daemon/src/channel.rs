//! Request loops for the framed Keymint and Gatekeeper pipes.

use crate::snapshot::SuspendGate;
use log::{debug, error, info, warn};
use senv_common::wire::channel::FrameHeader;
use senv_gatekeeper::Gatekeeper;
use senv_ta::KeyMintTa;
use std::io::{self, Read, Write};


/// An engine answering serialized requests.
pub trait Responder {
    fn process(&mut self, cmd: u32, req_data: &[u8]) -> Vec<u8>;
}

impl Responder for KeyMintTa {
    fn process(&mut self, cmd: u32, req_data: &[u8]) -> Vec<u8> {
        KeyMintTa::process(self, cmd, req_data)
    }
}

impl Responder for Gatekeeper {
    fn process(&mut self, cmd: u32, req_data: &[u8]) -> Vec<u8> {
        Gatekeeper::process(self, cmd, req_data)
    }
}

/// A pair of pipes carrying [`FrameHeader`]-framed messages.
pub struct Channel<R, W> {
    input: R,
    output: W,
}

impl<R: Read, W: Write> Channel<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Next message, or `None` if the peer closed the pipe between messages.
    pub fn read_message(&mut self) -> io::Result<Option<(FrameHeader, Vec<u8>)>> {
        let mut header = [0u8; FrameHeader::SIZE];
        let mut filled = 0;
        while filled < header.len() {
            match self.input.read(&mut header[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        let header = FrameHeader::decode(&header).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("bad frame header: {:?}", e))
        })?;
        let mut payload = vec![0u8; header.payload_size as usize];
        self.input.read_exact(&mut payload)?;
        Ok(Some((header, payload)))
    }

    pub fn write_message(&mut self, header: FrameHeader, payload: &[u8]) -> io::Result<()> {
        self.output.write_all(&header.encode())?;
        self.output.write_all(payload)?;
        self.output.flush()
    }

    pub fn write_response(&mut self, cmd: u32, payload: &[u8]) -> io::Result<()> {
        let size = u32::try_from(payload.len())
            .map_err(|_e| io::Error::new(io::ErrorKind::InvalidInput, "response too long"))?;
        self.write_message(FrameHeader::response(cmd, size), payload)
    }
}

/// Answer requests in order until the channel fails or closes.
pub fn serve<R: Read, W: Write>(
    name: &str,
    responder: &mut dyn Responder,
    mut channel: Channel<R, W>,
    gate: &SuspendGate,
) {
    info!("{} channel ready", name);
    loop {
        let (header, payload) = match channel.read_message() {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                info!("{} channel closed by peer", name);
                return;
            }
            Err(e) => {
                error!("{} channel read failed: {}", name, e);
                return;
            }
        };
        if header.is_response {
            warn!("{} channel received a response frame for command {}", name, header.cmd);
        }

        let _busy = gate.begin_request();
        debug!("{} request {} ({} bytes)", name, header.cmd, payload.len());
        let rsp = responder.process(header.cmd, &payload);
        if let Err(e) = channel.write_response(header.cmd, &rsp) {
            error!("{} channel write failed: {}", name, e);
            return;
        }
    }
}
