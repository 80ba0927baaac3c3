use std::{
    io::{Read, Write},
    net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::{
        Arc, mpsc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use brine::{Relay, RelayConfig};
use rand::RngCore;

fn localhost() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}

fn spawn_relay(cfg: RelayConfig) -> (SocketAddr, Arc<AtomicBool>, thread::JoinHandle<()>) {
    let mut relay = Relay::new(cfg).expect("failed to start relay");
    let addr = relay.local_addr().expect("failed to fetch relay addr");
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let handle = thread::spawn(move || relay.run(&flag).expect("relay loop failed"));
    (addr, stop, handle)
}

/// Echoes every accepted connection until its peer closes.
fn spawn_echo() -> SocketAddr {
    let listener = TcpListener::bind(localhost()).expect("failed to bind echo server");
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for conn in listener.incoming() {
            let Ok(mut conn) = conn else { break };
            thread::spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match conn.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if conn.write_all(&buf[..n]).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

/// Accepts one connection, optionally dawdles, then records everything the
/// peer sent until end-of-stream.
fn spawn_capture(read_delay: Duration) -> (SocketAddr, mpsc::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind(localhost()).expect("failed to bind capture server");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (mut conn, _) = listener.accept().expect("capture accept failed");
        if !read_delay.is_zero() {
            thread::sleep(read_delay);
        }
        let mut bytes = Vec::new();
        conn.read_to_end(&mut bytes).expect("capture read failed");
        let _ = tx.send(bytes);
    });
    (addr, rx)
}

#[test]
fn echo_round_trip() {
    let echo = spawn_echo();
    let (relay_addr, stop, handle) =
        spawn_relay(RelayConfig::new(localhost(), echo.ip().to_string(), echo.port()));

    let mut client = TcpStream::connect(relay_addr).unwrap();
    client.write_all(b"hello\n").unwrap();
    let mut reply = [0u8; 6];
    client.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"hello\n");

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn large_payload_preserved_in_order() {
    let echo = spawn_echo();
    let (relay_addr, stop, handle) =
        spawn_relay(RelayConfig::new(localhost(), echo.ip().to_string(), echo.port()));

    let mut payload = vec![0u8; 10 * 1024 * 1024];
    rand::rng().fill_bytes(&mut payload);

    let mut client = TcpStream::connect(relay_addr).unwrap();
    let mut writer = client.try_clone().unwrap();
    let expected = payload.clone();
    let feeder = thread::spawn(move || writer.write_all(&payload).expect("client write failed"));

    let mut reply = vec![0u8; expected.len()];
    client.read_exact(&mut reply).unwrap();
    feeder.join().unwrap();
    assert_eq!(reply, expected);

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn zero_byte_payload_closes_cleanly() {
    let (capture, rx) = spawn_capture(Duration::ZERO);
    let (relay_addr, stop, handle) =
        spawn_relay(RelayConfig::new(localhost(), capture.ip().to_string(), capture.port()));

    let mut client = TcpStream::connect(relay_addr).unwrap();
    client.shutdown(Shutdown::Write).unwrap();

    let seen = rx.recv_timeout(Duration::from_secs(5)).expect("capture never finished");
    assert!(seen.is_empty(), "upstream saw unexpected bytes");

    // Teardown propagates back as end-of-stream.
    let mut sink = Vec::new();
    let _ = client.read_to_end(&mut sink);
    assert!(sink.is_empty());

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn half_close_flushes_residue_before_teardown() {
    let (capture, rx) = spawn_capture(Duration::from_millis(200));
    let (relay_addr, stop, handle) =
        spawn_relay(RelayConfig::new(localhost(), capture.ip().to_string(), capture.port()));

    let mut client = TcpStream::connect(relay_addr).unwrap();
    client.write_all(b"GET /\r\n\r\n").unwrap();
    client.shutdown(Shutdown::Write).unwrap();

    let seen = rx.recv_timeout(Duration::from_secs(5)).expect("capture never finished");
    assert_eq!(seen, b"GET /\r\n\r\n");

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn backpressure_delivers_everything_to_a_slow_reader() {
    let (capture, rx) = spawn_capture(Duration::from_millis(500));
    let cfg = RelayConfig::new(localhost(), capture.ip().to_string(), capture.port())
        .with_socket_buf_size(1024);
    let (relay_addr, stop, handle) = spawn_relay(cfg);

    let mut payload = vec![0u8; 512 * 1024];
    rand::rng().fill_bytes(&mut payload);

    let mut client = TcpStream::connect(relay_addr).unwrap();
    client.write_all(&payload).unwrap();
    client.shutdown(Shutdown::Write).unwrap();

    let seen = rx.recv_timeout(Duration::from_secs(10)).expect("capture never finished");
    assert_eq!(seen, payload);

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn slow_drip_preserves_every_byte() {
    let echo = spawn_echo();
    let (relay_addr, stop, handle) =
        spawn_relay(RelayConfig::new(localhost(), echo.ip().to_string(), echo.port()));

    let mut client = TcpStream::connect(relay_addr).unwrap();
    let mut writer = client.try_clone().unwrap();
    let feeder = thread::spawn(move || {
        for byte in 0u8..30 {
            writer.write_all(&[byte]).unwrap();
            thread::sleep(Duration::from_millis(10));
        }
    });

    let mut reply = [0u8; 30];
    client.read_exact(&mut reply).unwrap();
    feeder.join().unwrap();
    let expected: Vec<u8> = (0u8..30).collect();
    assert_eq!(&reply[..], &expected[..]);

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn refused_upstream_keeps_the_listener_alive() {
    // Grab a port that refuses connections.
    let dead = TcpListener::bind(localhost()).unwrap().local_addr().unwrap();
    let (relay_addr, stop, handle) =
        spawn_relay(RelayConfig::new(localhost(), dead.ip().to_string(), dead.port()));

    for _ in 0..2 {
        let mut client = TcpStream::connect(relay_addr).expect("listener stopped accepting");
        let mut sink = Vec::new();
        let _ = client.read_to_end(&mut sink);
        assert!(sink.is_empty());
    }

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn ipv6_bind_with_resolved_upstream() {
    // Bind the echo server wherever `localhost` resolves first, so the
    // relay's own resolution finds it.
    let first = ("localhost", 0u16)
        .to_socket_addrs()
        .expect("localhost did not resolve")
        .next()
        .expect("localhost resolved to nothing");
    let listener = TcpListener::bind(first).expect("failed to bind echo server");
    let echo_port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        let mut buf = [0u8; 1024];
        loop {
            match conn.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if conn.write_all(&buf[..n]).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let bind = SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, 0));
    let (relay_addr, stop, handle) =
        spawn_relay(RelayConfig::new(bind, "localhost", echo_port));
    assert!(relay_addr.is_ipv6());

    let mut client = TcpStream::connect(relay_addr).unwrap();
    client.write_all(b"over six").unwrap();
    let mut reply = [0u8; 8];
    client.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"over six");

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}
