use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SealError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("peer closed the connection during key exchange")]
    HandshakeClosed,
    #[error("record failed authentication")]
    BadRecord,
    #[error("peer declared a {0}-byte record, limit is {1}")]
    OversizedRecord(usize, usize),
    #[error("peer declared a {0}-byte record, shorter than the tag")]
    TruncatedRecord(usize),
}
