use std::io::{self, Read, Write};

use brine_seal::{Handshake, RecvOutcome, SealCodec, SealError, SendOutcome};
use mio::{Token, net::TcpStream};

use crate::{
    buffer::{LegIo, RecvStatus, SendStatus},
    error::RelayError,
};

/// Which end of a pair a leg faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Client => 0,
            Self::Server => 1,
        }
    }
}

/// Lifecycle phase of one leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegPhase {
    /// Outbound connect issued; waiting for writable readiness to learn
    /// whether it completed.
    PendingConnect,
    /// Key exchange in flight on a sealed leg.
    Handshake,
    /// Shuttling bytes.
    Forward,
}

/// One TCP socket of a pair, optionally wrapped in the sealed framing.
pub struct Leg {
    pub(crate) stream: TcpStream,
    pub(crate) token: Option<Token>,
    pub(crate) phase: LegPhase,
    pub(crate) seal: Option<SealCodec>,
}

impl Leg {
    pub(crate) fn new(stream: TcpStream, sealed: bool) -> Self {
        let phase = if sealed { LegPhase::Handshake } else { LegPhase::Forward };
        Self { stream, token: None, phase, seal: sealed.then(SealCodec::new) }
    }

    pub(crate) fn sealed(&self) -> bool {
        self.seal.is_some()
    }

    pub(crate) fn drive_handshake(&mut self) -> Result<Handshake, RelayError> {
        let codec = self.seal.as_mut().expect("handshake on a cleartext leg");
        codec.handshake(&mut self.stream).map_err(Into::into)
    }
}

/// Errors that mean "the peer went away", as opposed to a leg fault.
fn gone(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}

impl LegIo for Leg {
    fn leg_recv(&mut self, out: &mut [u8]) -> Result<RecvStatus, RelayError> {
        match &mut self.seal {
            Some(codec) => match codec.recv(&mut self.stream, out) {
                Ok(RecvOutcome::Data(n)) => Ok(RecvStatus::Data(n)),
                Ok(RecvOutcome::WouldBlock) => Ok(RecvStatus::WouldBlock),
                Ok(RecvOutcome::Closed) => Ok(RecvStatus::Closed),
                Err(SealError::Io(e)) if gone(e.kind()) => Ok(RecvStatus::Closed),
                Err(err) => Err(err.into()),
            },
            None => loop {
                match self.stream.read(out) {
                    Ok(0) => return Ok(RecvStatus::Closed),
                    Ok(n) => return Ok(RecvStatus::Data(n)),
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return Ok(RecvStatus::WouldBlock);
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) if gone(e.kind()) => return Ok(RecvStatus::Closed),
                    Err(e) => return Err(e.into()),
                }
            },
        }
    }

    fn leg_send(&mut self, data: &[u8]) -> Result<SendStatus, RelayError> {
        match &mut self.seal {
            Some(codec) => match codec.send(&mut self.stream, data) {
                Ok(SendOutcome::Sent(n)) => Ok(SendStatus::Sent(n)),
                Ok(SendOutcome::WouldBlock) => Ok(SendStatus::WouldBlock),
                Err(SealError::Io(e)) if gone(e.kind()) => Ok(SendStatus::Closed),
                Err(err) => Err(err.into()),
            },
            None => loop {
                match self.stream.write(data) {
                    Ok(0) => return Ok(SendStatus::Closed),
                    Ok(n) => return Ok(SendStatus::Sent(n)),
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return Ok(SendStatus::WouldBlock);
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) if gone(e.kind()) => return Ok(SendStatus::Closed),
                    Err(e) => return Err(e.into()),
                }
            },
        }
    }
}
