//! Authenticated record framing for a single TCP leg.
//!
//! A [`SealCodec`] wraps one non-blocking socket and turns an opaque byte
//! stream into length-prefixed, authenticated records. Key agreement is
//! X25519; records are sealed with XChaCha20-Poly1305 under the derived
//! shared key, one fresh random nonce per record.
//!
//! All entry points tolerate partial I/O: they suspend with an explicit
//! want-read / want-write / would-block outcome and resume from the exact
//! byte where they left off on the next readiness signal.

mod codec;
mod error;
mod record;

pub use codec::{Handshake, RecvOutcome, SealCodec, SendOutcome};
pub use error::SealError;
pub use record::{HEADER_LEN, KEY_LEN, MAX_PLAINTEXT, MAX_RECORD, NONCE_LEN, TAG_LEN};
