use std::io;

use brine_seal::SealError;
use thiserror::Error;

/// Relay failure taxonomy.
///
/// Per-connection conditions (would-block, orderly disconnect) never appear
/// here; they are handled in-line by the engine and tear down at most one
/// pair. A `RelayError` escaping [`crate::Relay::run`] is fatal to the
/// process: a listener fault, a poll fault, or startup misconfiguration.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("readiness table full")]
    TableFull,
    #[error("no usable address for upstream {0}")]
    NoUpstream(String),
    #[error("listener: {0}")]
    Listener(io::Error),
    #[error("poll: {0}")]
    Poll(io::Error),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Seal(#[from] SealError),
}
