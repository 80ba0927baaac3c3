//! Wire layout of a sealed record.
//!
//! ```text
//! | length: u16 BE | nonce: 24 bytes | ciphertext: `length` bytes |
//! ```
//!
//! `length` counts the ciphertext only (plaintext + 16-byte Poly1305 tag)
//! and therefore never exceeds [`MAX_RECORD`].

/// Raw public key size exchanged during the handshake, unframed.
pub const KEY_LEN: usize = 32;

/// Length prefix on every record.
pub const LEN_PREFIX: usize = core::mem::size_of::<u16>();

/// XChaCha20-Poly1305 nonce width.
pub const NONCE_LEN: usize = 24;

/// Poly1305 authentication tag width.
pub const TAG_LEN: usize = 16;

/// Fixed header: length prefix followed by the per-record nonce.
pub const HEADER_LEN: usize = LEN_PREFIX + NONCE_LEN;

/// Largest plaintext carried by a single record. Callers handing over more
/// get clamped and must submit the remainder as further records.
pub const MAX_PLAINTEXT: usize = 4096;

/// Largest ciphertext length the prefix may declare.
pub const MAX_RECORD: usize = MAX_PLAINTEXT + TAG_LEN;

/// Encodes `length` and `nonce` into the first [`HEADER_LEN`] bytes of
/// `dst`. `nonce` must be exactly [`NONCE_LEN`] bytes.
#[inline]
pub(crate) fn encode_header(dst: &mut [u8], length: u16, nonce: &[u8]) {
    dst[..LEN_PREFIX].copy_from_slice(&length.to_be_bytes());
    dst[LEN_PREFIX..HEADER_LEN].copy_from_slice(nonce);
}

/// Reads the declared ciphertext length out of a completed header.
#[inline]
pub(crate) fn declared_len(header: &[u8; HEADER_LEN]) -> usize {
    u16::from_be_bytes([header[0], header[1]]) as usize
}

/// Borrows the nonce out of a completed header.
#[inline]
pub(crate) fn header_nonce(header: &[u8; HEADER_LEN]) -> &[u8] {
    &header[LEN_PREFIX..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut header = [0u8; HEADER_LEN];
        let nonce = [0xab; NONCE_LEN];
        encode_header(&mut header, 4112, &nonce[..]);

        assert_eq!(declared_len(&header), MAX_RECORD);
        assert_eq!(header_nonce(&header), &nonce[..]);
        // Big-endian on the wire.
        assert_eq!(header[0], 0x10);
        assert_eq!(header[1], 0x10);
    }

    #[test]
    fn max_record_fits_length_prefix() {
        assert!(MAX_RECORD <= u16::MAX as usize);
    }
}
