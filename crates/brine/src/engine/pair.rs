use std::io;

use brine_seal::Handshake;
use mio::event::Event;
use tracing::{debug, trace, warn};

use super::SlotKind;
use crate::{
    buffer::{DrainOutcome, FillOutcome, ForwardBuf},
    engine::leg::{Leg, LegPhase, Side},
    poller::{Interest, Poller},
};

/// What the dispatcher should do with the pair after an event.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Keep,
    Destroy,
}

/// Two legs of one forwarded connection and their direction buffers.
///
/// `bufs[side]` holds bytes destined for that side's socket: it is filled
/// by reading the opposite leg and drained by writing this one. A leg slot
/// of `None` marks the half-closed drain state: that side's socket is gone
/// and the pair lives only until the surviving leg flushes.
pub(crate) struct Pair {
    legs: [Option<Leg>; 2],
    bufs: [ForwardBuf; 2],
}

impl Pair {
    pub(crate) fn new(client: Leg, server: Leg) -> Self {
        Self {
            legs: [Some(client), Some(server)],
            bufs: [ForwardBuf::default(), ForwardBuf::default()],
        }
    }

    /// Deregisters and closes whatever legs are still attached.
    pub(crate) fn shutdown(&mut self, poller: &mut Poller<SlotKind>) {
        self.close_leg(poller, Side::Client);
        self.close_leg(poller, Side::Server);
    }

    /// Routes one readiness event to the leg's current phase.
    pub(crate) fn on_event(
        &mut self,
        poller: &mut Poller<SlotKind>,
        idx: usize,
        side: Side,
        ev: &Event,
    ) -> Verdict {
        let Some(phase) = self.legs[side.index()].as_ref().map(|leg| leg.phase) else {
            return Verdict::Keep;
        };
        match phase {
            LegPhase::PendingConnect => self.on_connect_ready(poller, idx, side),
            LegPhase::Handshake => self.on_handshake_ready(poller, side),
            LegPhase::Forward => self.on_forward_ready(poller, side, ev),
        }
    }

    /// Writable readiness on a pending outbound connect: learn the result
    /// from the socket-level error, then bring both legs online.
    fn on_connect_ready(&mut self, poller: &mut Poller<SlotKind>, idx: usize, side: Side) -> Verdict {
        {
            let leg = self.legs[side.index()].as_mut().expect("event on vacated leg");
            match leg.stream.take_error() {
                Ok(None) => {}
                Ok(Some(err)) => {
                    debug!(%err, "upstream connect failed");
                    return Verdict::Destroy;
                }
                Err(err) => {
                    debug!(%err, "upstream connect state unreadable");
                    return Verdict::Destroy;
                }
            }
            // A writable wake with no socket error can still be spurious.
            match leg.stream.peer_addr() {
                Ok(_) => {}
                Err(ref err) if err.kind() == io::ErrorKind::NotConnected => {
                    return Verdict::Keep;
                }
                Err(err) => {
                    debug!(%err, "upstream connect incomplete");
                    return Verdict::Destroy;
                }
            }

            leg.phase = if leg.sealed() { LegPhase::Handshake } else { LegPhase::Forward };
            let interest =
                if leg.sealed() { Interest::Writable } else { Interest::Readable };
            let token = leg.token.expect("pending leg is registered");
            if let Err(err) = poller.reregister(&mut leg.stream, token, interest) {
                warn!(%err, "upstream leg reregistration failed");
                return Verdict::Destroy;
            }
        }

        // The client leg was parked unregistered while the connect was in
        // flight; watch it now.
        let client = self.legs[Side::Client.index()].as_mut().expect("client leg present");
        let interest = if client.sealed() { Interest::Writable } else { Interest::Readable };
        match poller.register(
            &mut client.stream,
            SlotKind::Leg { pair: idx, side: Side::Client },
            interest,
        ) {
            Ok(token) => client.token = Some(token),
            Err(err) => {
                warn!(%err, "client leg registration failed");
                return Verdict::Destroy;
            }
        }
        trace!("upstream connected");
        Verdict::Keep
    }

    fn on_handshake_ready(&mut self, poller: &mut Poller<SlotKind>, side: Side) -> Verdict {
        let outcome = {
            let leg = self.legs[side.index()].as_mut().expect("event on vacated leg");
            leg.drive_handshake()
        };
        let interest = match outcome {
            Ok(Handshake::Done) => {
                trace!(?side, "leg handshake complete");
                let pending = self.bufs[side.index()].pending();
                let leg = self.legs[side.index()].as_mut().expect("event on vacated leg");
                leg.phase = LegPhase::Forward;
                if pending { Interest::Writable } else { Interest::Readable }
            }
            Ok(Handshake::WantRead) => Interest::Readable,
            Ok(Handshake::WantWrite) => Interest::Writable,
            Err(err) => {
                debug!(%err, ?side, "handshake failed");
                return Verdict::Destroy;
            }
        };

        let leg = self.legs[side.index()].as_mut().expect("event on vacated leg");
        let token = leg.token.expect("handshaking leg is registered");
        if let Err(err) = poller.reregister(&mut leg.stream, token, interest) {
            warn!(%err, ?side, "interest update failed");
            return Verdict::Destroy;
        }
        Verdict::Keep
    }

    /// Forwarding wake: receive before send, so bytes arriving in this wake
    /// can be scheduled for transmission in the same loop iteration.
    fn on_forward_ready(&mut self, poller: &mut Poller<SlotKind>, side: Side, ev: &Event) -> Verdict {
        if ev.is_error() {
            debug!(?side, "error readiness");
            return Verdict::Destroy;
        }
        if ev.is_readable() {
            if self.handle_receive(poller, side) == Verdict::Destroy {
                return Verdict::Destroy;
            }
        }
        if ev.is_writable()
            && self.legs[side.index()].is_some()
            && self.bufs[side.index()].pending()
        {
            return self.handle_send(poller, side);
        }
        Verdict::Keep
    }

    /// Receive path for `side`: stage readable bytes into the buffer
    /// destined for the opposite leg, then wake that leg to drain.
    fn handle_receive(&mut self, poller: &mut Poller<SlotKind>, side: Side) -> Verdict {
        let peer = side.other();
        if self.bufs[peer.index()].pending() {
            // Backpressure: nothing more is read off this side until the
            // peer transmits the chunk in flight.
            return Verdict::Keep;
        }
        if self.legs[peer.index()].is_none() {
            return Verdict::Keep;
        }

        let outcome = {
            let leg = self.legs[side.index()].as_mut().expect("event on vacated leg");
            self.bufs[peer.index()].fill_from(leg)
        };
        match outcome {
            Ok(FillOutcome::Data) => {
                self.wake_peer_to_drain(poller, peer, Interest::Both)
            }
            Ok(FillOutcome::WouldBlock) => Verdict::Keep,
            Ok(FillOutcome::Eof { buffered: true }) => {
                trace!(?side, "end of stream with residue");
                self.close_leg(poller, side);
                self.wake_peer_to_drain(poller, peer, Interest::Writable)
            }
            Ok(FillOutcome::Eof { buffered: false }) => {
                trace!(?side, "end of stream");
                Verdict::Destroy
            }
            Err(err) => {
                debug!(%err, ?side, "receive failed");
                Verdict::Destroy
            }
        }
    }

    /// Arms the peer leg to drain its now-pending buffer. A peer still in
    /// its handshake is left alone: its completion path checks the buffer.
    fn wake_peer_to_drain(
        &mut self,
        poller: &mut Poller<SlotKind>,
        peer: Side,
        interest: Interest,
    ) -> Verdict {
        let peer_leg = self.legs[peer.index()].as_mut().expect("peer leg present");
        if peer_leg.phase != LegPhase::Forward {
            return Verdict::Keep;
        }
        let token = peer_leg.token.expect("forwarding leg is registered");
        if let Err(err) = poller.reregister(&mut peer_leg.stream, token, interest) {
            warn!(%err, "peer interest update failed");
            return Verdict::Destroy;
        }
        Verdict::Keep
    }

    /// Send path for `side`: drain its own outbound buffer.
    fn handle_send(&mut self, poller: &mut Poller<SlotKind>, side: Side) -> Verdict {
        let outcome = {
            let leg = self.legs[side.index()].as_mut().expect("event on vacated leg");
            self.bufs[side.index()].drain_to(leg)
        };
        match outcome {
            Ok(DrainOutcome::Drained) => {
                let peer = side.other();
                if self.legs[peer.index()].is_none() {
                    trace!(?side, "residue flushed after half close");
                    return Verdict::Destroy;
                }
                {
                    let leg = self.legs[side.index()].as_mut().expect("event on vacated leg");
                    let token = leg.token.expect("forwarding leg is registered");
                    if let Err(err) = poller.reregister(&mut leg.stream, token, Interest::Readable) {
                        warn!(%err, ?side, "interest update failed");
                        return Verdict::Destroy;
                    }
                }
                // The drain unblocked the opposite reader. Bytes already
                // sitting in its kernel buffer will not signal again, so
                // service it inline rather than waiting on readiness.
                if self.legs[peer.index()]
                    .as_ref()
                    .is_some_and(|leg| leg.phase == LegPhase::Forward)
                {
                    self.handle_receive(poller, peer)
                } else {
                    Verdict::Keep
                }
            }
            Ok(DrainOutcome::WouldBlock) => Verdict::Keep,
            Ok(DrainOutcome::Closed) => {
                debug!(?side, "destination closed mid drain");
                Verdict::Destroy
            }
            Err(err) => {
                debug!(%err, ?side, "send failed");
                Verdict::Destroy
            }
        }
    }

    /// Detaches one leg from the loop and closes its socket.
    fn close_leg(&mut self, poller: &mut Poller<SlotKind>, side: Side) {
        if let Some(mut leg) = self.legs[side.index()].take() {
            if let Some(token) = leg.token {
                if let Err(err) = poller.deregister(&mut leg.stream, token) {
                    debug!(%err, ?side, "deregistration failed");
                }
            }
        }
    }
}
