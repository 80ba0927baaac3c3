use std::net::SocketAddr;

/// Validated relay configuration.
///
/// The bind address is numeric (the CLI parses it as an `IpAddr` before it
/// gets here); the upstream host may be a name and is resolved per
/// connection by the engine.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind: SocketAddr,
    pub upstream_host: String,
    pub upstream_port: u16,
    /// Seal the client-facing leg (`-i`).
    pub seal_client: bool,
    /// Seal the server-facing leg (`-o`).
    pub seal_server: bool,
    /// Kernel SO_SNDBUF / SO_RCVBUF applied to both legs of every pair.
    pub socket_buf_size: Option<usize>,
}

impl RelayConfig {
    pub fn new(bind: SocketAddr, upstream_host: impl Into<String>, upstream_port: u16) -> Self {
        Self {
            bind,
            upstream_host: upstream_host.into(),
            upstream_port,
            seal_client: false,
            seal_server: false,
            socket_buf_size: None,
        }
    }

    /// Wraps the client-facing leg in the sealed framing.
    pub fn with_sealed_client_leg(mut self) -> Self {
        self.seal_client = true;
        self
    }

    /// Wraps the server-facing leg in the sealed framing.
    pub fn with_sealed_server_leg(mut self) -> Self {
        self.seal_server = true;
        self
    }

    /// Bounds kernel socket buffering per leg. Mostly useful to force the
    /// backpressure path in tests.
    pub fn with_socket_buf_size(mut self, size: usize) -> Self {
        self.socket_buf_size = Some(size);
        self
    }
}
