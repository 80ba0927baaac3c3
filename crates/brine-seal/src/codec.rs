use std::io::{self, Read, Write};

use chacha20poly1305::{
    Key, Tag, XChaCha20Poly1305, XNonce,
    aead::{AeadCore, AeadInPlace, KeyInit, OsRng},
};
use tracing::trace;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::{
    error::SealError,
    record::{self, HEADER_LEN, KEY_LEN, MAX_PLAINTEXT, MAX_RECORD, TAG_LEN},
};

/// Outcome of one [`SealCodec::handshake`] drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// Both public keys exchanged, shared key derived; data phase may begin.
    Done,
    /// Our key is out but the peer's is incomplete; wait for readable.
    WantRead,
    /// Our key is still partially written; wait for writable.
    WantWrite,
}

/// Outcome of one [`SealCodec::recv`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// `n` plaintext bytes were copied into the caller's buffer.
    Data(usize),
    /// No complete record is available; wait for readable.
    WouldBlock,
    /// The peer closed the stream (at any pipeline phase).
    Closed,
}

/// Outcome of one [`SealCodec::send`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// A full record left the socket; `n` is the clamped plaintext length
    /// the caller may now account as written.
    Sent(usize),
    /// The staged record is partially written; wait for writable and call
    /// again (the payload is not re-read until the record drains).
    WouldBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecvPhase {
    /// Accumulating the fixed header (length prefix + nonce).
    Header,
    /// Accumulating exactly the declared ciphertext length.
    Body,
    /// Decrypted plaintext is staged; handing it out to the caller.
    Drain,
}

/// Framing codec state for one encrypted leg.
///
/// Owns the local keypair, the peer's public key once received, and the
/// three staging areas of the record pipelines. Invariants:
/// - `pub_sent <= KEY_LEN`, `peer_have <= KEY_LEN`
/// - `head_have <= HEADER_LEN`, `sealed_have <= sealed_len <= MAX_RECORD`
/// - `plain_pos <= plain_len <= MAX_PLAINTEXT`
/// - `wire_pos <= wire_len <= HEADER_LEN + MAX_RECORD`
pub struct SealCodec {
    secret: StaticSecret,
    public: PublicKey,
    pub_sent: usize,
    peer: [u8; KEY_LEN],
    peer_have: usize,
    cipher: Option<XChaCha20Poly1305>,

    rx_phase: RecvPhase,
    head: [u8; HEADER_LEN],
    head_have: usize,
    sealed: [u8; MAX_RECORD],
    sealed_len: usize,
    sealed_have: usize,
    plain: [u8; MAX_PLAINTEXT],
    plain_len: usize,
    plain_pos: usize,

    wire: [u8; HEADER_LEN + MAX_RECORD],
    wire_len: usize,
    wire_pos: usize,
    staged: usize,
}

impl SealCodec {
    /// Draws a fresh keypair from the OS CSPRNG. An unavailable CSPRNG
    /// aborts the process.
    pub fn new() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret,
            public,
            pub_sent: 0,
            peer: [0; KEY_LEN],
            peer_have: 0,
            cipher: None,
            rx_phase: RecvPhase::Header,
            head: [0; HEADER_LEN],
            head_have: 0,
            sealed: [0; MAX_RECORD],
            sealed_len: 0,
            sealed_have: 0,
            plain: [0; MAX_PLAINTEXT],
            plain_len: 0,
            plain_pos: 0,
            wire: [0; HEADER_LEN + MAX_RECORD],
            wire_len: 0,
            wire_pos: 0,
            staged: 0,
        }
    }

    /// True once the shared key is derived and record I/O may begin.
    pub fn established(&self) -> bool {
        self.cipher.is_some()
    }

    /// Drives the unframed public-key exchange. Writes our 32 raw bytes,
    /// then reads the peer's 32, either of which may span several readiness
    /// cycles. Symmetric: both ends write first, so no ordering deadlock.
    pub fn handshake<S: Read + Write>(&mut self, sock: &mut S) -> Result<Handshake, SealError> {
        while self.pub_sent < KEY_LEN {
            match sock.write(&self.public.as_bytes()[self.pub_sent..]) {
                Ok(0) => return Err(SealError::HandshakeClosed),
                Ok(n) => self.pub_sent += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Handshake::WantWrite);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        while self.peer_have < KEY_LEN {
            match sock.read(&mut self.peer[self.peer_have..]) {
                Ok(0) => return Err(SealError::HandshakeClosed),
                Ok(n) => self.peer_have += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Handshake::WantRead);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        if self.cipher.is_none() {
            let shared = self.secret.diffie_hellman(&PublicKey::from(self.peer));
            self.cipher = Some(XChaCha20Poly1305::new(Key::from_slice(shared.as_bytes())));
            trace!("key exchange complete");
        }
        Ok(Handshake::Done)
    }

    /// Receives plaintext into `out`, decoding at most one record at a time.
    ///
    /// Runs the inbound pipeline as far as socket readiness allows: header
    /// accumulation, ciphertext accumulation, authenticated open, plaintext
    /// drain. A caller asking for N bytes gets `min(N, remaining plaintext)`
    /// of the current record; the pipeline resets once the record is fully
    /// handed out.
    pub fn recv<S: Read>(&mut self, sock: &mut S, out: &mut [u8]) -> Result<RecvOutcome, SealError> {
        debug_assert!(!out.is_empty());
        loop {
            match self.rx_phase {
                RecvPhase::Header => {
                    while self.head_have < HEADER_LEN {
                        match sock.read(&mut self.head[self.head_have..]) {
                            Ok(0) => return Ok(RecvOutcome::Closed),
                            Ok(n) => self.head_have += n,
                            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                                return Ok(RecvOutcome::WouldBlock);
                            }
                            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                            Err(e) => return Err(e.into()),
                        }
                    }
                    let declared = record::declared_len(&self.head);
                    if declared > MAX_RECORD {
                        return Err(SealError::OversizedRecord(declared, MAX_RECORD));
                    }
                    if declared < TAG_LEN {
                        return Err(SealError::TruncatedRecord(declared));
                    }
                    self.sealed_len = declared;
                    self.sealed_have = 0;
                    self.rx_phase = RecvPhase::Body;
                }

                RecvPhase::Body => {
                    while self.sealed_have < self.sealed_len {
                        match sock.read(&mut self.sealed[self.sealed_have..self.sealed_len]) {
                            Ok(0) => return Ok(RecvOutcome::Closed),
                            Ok(n) => self.sealed_have += n,
                            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                                return Ok(RecvOutcome::WouldBlock);
                            }
                            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                            Err(e) => return Err(e.into()),
                        }
                    }
                    self.open_record()?;
                    self.rx_phase = RecvPhase::Drain;
                }

                RecvPhase::Drain => {
                    if self.plain_pos == self.plain_len {
                        self.reset_recv();
                        continue;
                    }
                    let n = (self.plain_len - self.plain_pos).min(out.len());
                    out[..n].copy_from_slice(&self.plain[self.plain_pos..self.plain_pos + n]);
                    self.plain_pos += n;
                    if self.plain_pos == self.plain_len {
                        self.reset_recv();
                    }
                    return Ok(RecvOutcome::Data(n));
                }
            }
        }
    }

    /// Sends plaintext as a single sealed record.
    ///
    /// With an empty wire buffer, clamps `payload` to [`MAX_PLAINTEXT`],
    /// seals it under a fresh random nonce and stages header + ciphertext
    /// contiguously. Then drains the wire buffer; until it fully leaves the
    /// socket the call reports [`SendOutcome::WouldBlock`] and the payload
    /// argument is ignored on resumption. The clamped plaintext length is
    /// credited only once the whole record is out.
    pub fn send<S: Write>(&mut self, sock: &mut S, payload: &[u8]) -> Result<SendOutcome, SealError> {
        if self.wire_len == 0 {
            if payload.is_empty() {
                return Ok(SendOutcome::Sent(0));
            }
            self.stage_record(payload);
        }

        while self.wire_pos < self.wire_len {
            match sock.write(&self.wire[self.wire_pos..self.wire_len]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => self.wire_pos += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(SendOutcome::WouldBlock);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        let sent = self.staged;
        self.wire_len = 0;
        self.wire_pos = 0;
        self.staged = 0;
        Ok(SendOutcome::Sent(sent))
    }

    fn stage_record(&mut self, payload: &[u8]) {
        let cipher = self.cipher.as_ref().expect("record I/O before key exchange");
        let take = payload.len().min(MAX_PLAINTEXT);

        // Nonce freshness is the sole integrity dependency: random sampling
        // over 24 bytes is collision-free for the lifetime of a key.
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

        let body = &mut self.wire[HEADER_LEN..HEADER_LEN + take];
        body.copy_from_slice(&payload[..take]);
        let tag: Tag = cipher
            .encrypt_in_place_detached(&nonce, b"", body)
            .expect("sealing a bounded record cannot fail");
        self.wire[HEADER_LEN + take..HEADER_LEN + take + TAG_LEN].copy_from_slice(tag.as_slice());
        record::encode_header(&mut self.wire[..HEADER_LEN], (take + TAG_LEN) as u16, nonce.as_slice());

        self.wire_len = HEADER_LEN + take + TAG_LEN;
        self.wire_pos = 0;
        self.staged = take;
    }

    fn open_record(&mut self) -> Result<(), SealError> {
        let cipher = self.cipher.as_ref().expect("record I/O before key exchange");
        let body = self.sealed_len - TAG_LEN;
        let nonce = XNonce::from_slice(record::header_nonce(&self.head));
        let tag = Tag::from_slice(&self.sealed[body..self.sealed_len]);

        self.plain[..body].copy_from_slice(&self.sealed[..body]);
        cipher
            .decrypt_in_place_detached(nonce, b"", &mut self.plain[..body], tag)
            .map_err(|_| SealError::BadRecord)?;
        self.plain_len = body;
        self.plain_pos = 0;
        Ok(())
    }

    /// Full inbound reset between records: staging areas zeroed, counters
    /// cleared, pipeline back at header accumulation.
    fn reset_recv(&mut self) {
        self.head = [0; HEADER_LEN];
        self.head_have = 0;
        self.sealed[..self.sealed_len].fill(0);
        self.sealed_len = 0;
        self.sealed_have = 0;
        self.plain[..self.plain_len].fill(0);
        self.plain_len = 0;
        self.plain_pos = 0;
        self.rx_phase = RecvPhase::Header;
    }
}

impl Default for SealCodec {
    fn default() -> Self {
        Self::new()
    }
}
