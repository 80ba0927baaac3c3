use std::{
    net::{IpAddr, SocketAddr},
    process::ExitCode,
    sync::{Arc, atomic::AtomicBool},
};

use brine::{Relay, RelayConfig};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Bidirectional TCP relay with optionally sealed legs.
///
/// Chain three relays (`brine -o`, a cleartext hop, `brine -i`) to carry
/// an encrypted middle hop inside an otherwise cleartext TCP session.
#[derive(Parser, Debug)]
#[command(name = "brine", version)]
struct Cli {
    /// Seal the client-facing leg.
    #[arg(short = 'i')]
    seal_client: bool,

    /// Seal the server-facing leg.
    #[arg(short = 'o')]
    seal_server: bool,

    /// Numeric address to listen on (v4 or v6).
    bind_addr: IpAddr,

    /// Port to listen on.
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    bind_port: u16,

    /// Upstream host, numeric or a resolvable name.
    server_addr: String,

    /// Upstream port.
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    server_port: u16,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let stop = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        if let Err(err) = signal_hook::flag::register(sig, Arc::clone(&stop)) {
            error!(%err, "failed to register signal handler");
            return ExitCode::FAILURE;
        }
    }

    let mut cfg = RelayConfig::new(
        SocketAddr::from((cli.bind_addr, cli.bind_port)),
        cli.server_addr,
        cli.server_port,
    );
    if cli.seal_client {
        cfg = cfg.with_sealed_client_leg();
    }
    if cli.seal_server {
        cfg = cfg.with_sealed_server_leg();
    }

    let mut relay = match Relay::new(cfg) {
        Ok(relay) => relay,
        Err(err) => {
            error!(%err, "startup failed");
            return ExitCode::FAILURE;
        }
    };
    match relay.run(&stop) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "relay terminated");
            ExitCode::FAILURE
        }
    }
}
