//! Socket construction helpers shared by the engine.

use std::{
    io,
    net::{SocketAddr, ToSocketAddrs},
};

use mio::net::{TcpListener, TcpStream};
use tracing::debug;

/// Resolves `host:port` through the platform resolver into an ordered
/// candidate list. `host` may be numeric or a name.
pub fn resolve(host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    let candidates: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    if candidates.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("resolver returned no addresses for {host}"),
        ));
    }
    Ok(candidates)
}

/// Creates the listening socket: non-blocking, close-on-exec, SO_REUSEADDR,
/// default backlog (mio sets all three on Unix).
pub fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    TcpListener::bind(addr)
}

/// Initiates a non-blocking connect to the first viable candidate. A
/// pending connect is not an error here: completion (or refusal) is
/// reported later through writable readiness and `take_error`.
pub fn connect_upstream(candidates: &[SocketAddr]) -> io::Result<TcpStream> {
    let mut last_err = None;
    for &addr in candidates {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                debug!(%addr, %err, "connect attempt failed");
                last_err = Some(err);
            }
        }
    }
    Err(last_err
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no candidate addresses")))
}

/// Set kernel SO_SNDBUF and SO_RCVBUF on a mio TcpStream.
pub(crate) fn set_socket_buf_size(stream: &TcpStream, size: usize) {
    use std::os::fd::AsRawFd;
    let fd = stream.as_raw_fd();
    let size = size as libc::c_int;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            &size as *const _ as *const libc::c_void,
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &size as *const _ as *const libc::c_void,
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}
