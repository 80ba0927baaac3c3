//! `brine` — a single-threaded, readiness-driven TCP relay.
//!
//! Accepts clients on a bound address, opens an outbound connection to one
//! fixed upstream per listener, and shuttles bytes in both directions until
//! either side closes. Either leg may be wrapped in the sealed framing from
//! [`brine_seal`]; chaining three relays yields an encrypted hop in the
//! middle of an otherwise cleartext TCP session.
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//!
//! use brine::{Relay, RelayConfig};
//!
//! let cfg = RelayConfig::new("127.0.0.1:7000".parse().unwrap(), "127.0.0.1", 9000)
//!     .with_sealed_server_leg();
//! let mut relay = Relay::new(cfg).unwrap();
//! let stop = AtomicBool::new(false);
//! relay.run(&stop).unwrap();
//! ```

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod net;
pub mod poller;

pub use config::RelayConfig;
pub use engine::Relay;
pub use error::RelayError;
