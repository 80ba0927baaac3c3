//! The connection engine: accept, pending-connect, handshake, forward,
//! half-closed drain.
//!
//! One [`Relay`] owns the listener, the readiness poller, and a slab of
//! connection pairs. Every pair registers its two legs with the poller
//! under [`SlotKind::Leg`]; dispatch routes each event back into the pair
//! with a side discriminator. Per-connection failures destroy one pair;
//! only listener or poll faults escape [`Relay::run`].

mod leg;
mod pair;

use std::{
    io,
    net::SocketAddr,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use mio::{Events, event::Event, net::TcpListener, net::TcpStream};
use tracing::{debug, info, trace, warn};

pub use self::leg::{Leg, LegPhase, Side};
use self::pair::{Pair, Verdict};
use crate::{
    config::RelayConfig,
    error::RelayError,
    net,
    poller::{Interest, Poller, RegisterError, TABLE_CAP},
};

/// How long one readiness wait may block; bounds shutdown latency.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Per-slot dispatch target.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SlotKind {
    Listener,
    Leg { pair: usize, side: Side },
}

/// The relay engine. Single-threaded; drive it with [`Relay::run`].
pub struct Relay {
    events: Events,
    core: Core,
}

struct Core {
    cfg: RelayConfig,
    poller: Poller<SlotKind>,
    listener: TcpListener,
    pairs: Vec<Option<Pair>>,
    free_pairs: Vec<usize>,
}

impl Relay {
    /// Binds the listener and registers it with the poller.
    pub fn new(cfg: RelayConfig) -> Result<Self, RelayError> {
        let mut poller = Poller::new()?;
        let mut listener = net::bind_listener(cfg.bind).map_err(RelayError::Listener)?;
        poller
            .register(&mut listener, SlotKind::Listener, Interest::Readable)
            .map_err(|err| match err {
                RegisterError::Full(_) => RelayError::TableFull,
                RegisterError::Io(e) => RelayError::Listener(e),
            })?;
        info!(
            bind = %cfg.bind,
            upstream_host = %cfg.upstream_host,
            upstream_port = cfg.upstream_port,
            seal_client = cfg.seal_client,
            seal_server = cfg.seal_server,
            "listening"
        );
        Ok(Self {
            events: Events::with_capacity(TABLE_CAP),
            core: Core { cfg, poller, listener, pairs: Vec::new(), free_pairs: Vec::new() },
        })
    }

    /// The address actually bound; differs from the configured one when
    /// binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.core.listener.local_addr()
    }

    /// Runs the readiness loop until `stop` is raised or a fatal error
    /// occurs. All sockets close on drop.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), RelayError> {
        while !stop.load(Ordering::Relaxed) {
            if let Err(err) = self.core.poller.poll(&mut self.events, Some(POLL_TIMEOUT)) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(RelayError::Poll(err));
            }
            for ev in self.events.iter() {
                self.core.dispatch(ev)?;
            }
            self.core.poller.end_batch();
        }
        info!("stop requested, shutting down");
        Ok(())
    }
}

impl Core {
    fn dispatch(&mut self, ev: &Event) -> Result<(), RelayError> {
        let Some(&slot) = self.poller.get(ev.token()) else {
            // Vacated earlier in this batch.
            return Ok(());
        };
        match slot {
            SlotKind::Listener => self.accept_ready(),
            SlotKind::Leg { pair, side } => {
                self.leg_ready(pair, side, ev);
                Ok(())
            }
        }
    }

    /// Drains the accept queue. Per-connection failures are logged and the
    /// listener keeps running; only a hard listener fault is returned.
    fn accept_ready(&mut self) -> Result<(), RelayError> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(%peer, "client connected");
                    if let Err(err) = self.spawn_pair(stream) {
                        warn!(%err, %peer, "dropping connection");
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref err) if transient_accept(err) => {
                    debug!(%err, "transient accept failure");
                }
                Err(err) => return Err(RelayError::Listener(err)),
            }
        }
    }

    /// Creates a pair for an accepted client: resolve the upstream, start
    /// the non-blocking connect, and park the client leg until it
    /// completes.
    fn spawn_pair(&mut self, client_stream: TcpStream) -> Result<(), RelayError> {
        client_stream.set_nodelay(true)?;
        if let Some(size) = self.cfg.socket_buf_size {
            net::set_socket_buf_size(&client_stream, size);
        }

        let candidates = net::resolve(&self.cfg.upstream_host, self.cfg.upstream_port)
            .map_err(|_| RelayError::NoUpstream(self.cfg.upstream_host.clone()))?;
        let server_stream = net::connect_upstream(&candidates)?;
        server_stream.set_nodelay(true)?;
        if let Some(size) = self.cfg.socket_buf_size {
            net::set_socket_buf_size(&server_stream, size);
        }

        let idx = self.free_pairs.pop().unwrap_or_else(|| {
            self.pairs.push(None);
            self.pairs.len() - 1
        });

        let client = Leg::new(client_stream, self.cfg.seal_client);
        let mut server = Leg::new(server_stream, self.cfg.seal_server);
        server.phase = LegPhase::PendingConnect;

        match self.poller.register(
            &mut server.stream,
            SlotKind::Leg { pair: idx, side: Side::Server },
            Interest::Writable,
        ) {
            Ok(token) => server.token = Some(token),
            Err(err) => {
                self.free_pairs.push(idx);
                return Err(match err {
                    RegisterError::Full(_) => RelayError::TableFull,
                    RegisterError::Io(e) => RelayError::Io(e),
                });
            }
        }

        self.pairs[idx] = Some(Pair::new(client, server));
        trace!(pair = idx, "pair created");
        Ok(())
    }

    fn leg_ready(&mut self, idx: usize, side: Side, ev: &Event) {
        let Some(pair) = self.pairs.get_mut(idx).and_then(Option::as_mut) else {
            return;
        };
        match pair.on_event(&mut self.poller, idx, side, ev) {
            Verdict::Keep => {}
            Verdict::Destroy => self.destroy_pair(idx),
        }
    }

    fn destroy_pair(&mut self, idx: usize) {
        if let Some(mut pair) = self.pairs[idx].take() {
            pair.shutdown(&mut self.poller);
            self.free_pairs.push(idx);
            trace!(pair = idx, "pair destroyed");
        }
    }
}

/// Any one of these is a come-back-later condition, not a listener fault.
fn transient_accept(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
