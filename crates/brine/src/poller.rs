//! Readiness multiplexer over a fixed-capacity slot table.
//!
//! Each registered source occupies one slot; the slot index doubles as the
//! `mio::Token`, so an event maps back to its dispatch record without a
//! search. Slots vacated while a batch of events is being dispatched are
//! quarantined until the batch ends: a token can never be re-occupied and
//! then handed a stale event within the same poll iteration.

use std::{io, time::Duration};

use mio::{Events, Poll, Token, event::Source};
use thiserror::Error;

/// Fixed capacity of the readiness table.
pub const TABLE_CAP: usize = 512;

/// Readiness kinds a slot is watched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
    Both,
}

impl Interest {
    fn as_mio(self) -> mio::Interest {
        match self {
            Self::Readable => mio::Interest::READABLE,
            Self::Writable => mio::Interest::WRITABLE,
            Self::Both => mio::Interest::READABLE | mio::Interest::WRITABLE,
        }
    }
}

#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("readiness table full ({0} slots)")]
    Full(usize),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

pub struct Poller<T> {
    poll: Poll,
    slots: Vec<Option<T>>,
    free: Vec<usize>,
    quarantine: Vec<usize>,
    capacity: usize,
}

impl<T> Poller<T> {
    pub fn new() -> io::Result<Self> {
        Self::with_capacity(TABLE_CAP)
    }

    fn with_capacity(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            slots: Vec::new(),
            free: Vec::new(),
            quarantine: Vec::new(),
            capacity,
        })
    }

    /// Registers `source` in the first vacant slot and returns its token.
    /// Fails with [`RegisterError::Full`] at capacity; the caller treats
    /// that as "drop this connection, keep running".
    pub fn register<S: Source + ?Sized>(
        &mut self,
        source: &mut S,
        data: T,
        interest: Interest,
    ) -> Result<Token, RegisterError> {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                if self.slots.len() == self.capacity {
                    return Err(RegisterError::Full(self.capacity));
                }
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        debug_assert!(self.slots[slot].is_none());

        let token = Token(slot);
        if let Err(err) = self.poll.registry().register(source, token, interest.as_mio()) {
            self.free.push(slot);
            return Err(err.into());
        }
        self.slots[slot] = Some(data);
        Ok(token)
    }

    /// Updates the interest mask of a live registration.
    pub fn reregister<S: Source + ?Sized>(
        &mut self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        debug_assert!(self.slots[token.0].is_some());
        self.poll.registry().reregister(source, token, interest.as_mio())
    }

    /// Vacates a slot and quarantines its index. The slot stops dispatching
    /// immediately even if the OS-level deregistration fails.
    pub fn deregister<S: Source + ?Sized>(&mut self, source: &mut S, token: Token) -> io::Result<()> {
        self.slots[token.0] = None;
        self.quarantine.push(token.0);
        self.poll.registry().deregister(source)
    }

    pub fn get(&self, token: Token) -> Option<&T> {
        self.slots.get(token.0).and_then(Option::as_ref)
    }

    pub fn poll(&mut self, events: &mut Events, timeout: Option<Duration>) -> io::Result<()> {
        self.poll.poll(events, timeout)
    }

    /// Returns quarantined slots to the free list. Call once per dispatched
    /// batch of events.
    pub fn end_batch(&mut self) {
        self.free.append(&mut self.quarantine);
    }
}
