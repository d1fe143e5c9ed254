use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use motile_finder::config;
use motile_finder::Directory;

const RECV_BUFFER_SIZE: usize = 65536;
const IDLE_SLEEP: Duration = Duration::from_millis(100);

/// Binds a non-blocking, dual-stack (`IPV6_V6ONLY = 0`) UDP socket. Built
/// through `socket2` because `std::net::UdpSocket` has no way to clear
/// that option before binding.
fn bind_dual_stack_udp(port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_only_v6(false)?;
    let addr: SocketAddr = format!("[::]:{port}").parse().expect("valid listen address");
    socket.bind(&SockAddr::from(addr))?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

fn main() {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("finder.conf"));
    let cfg = config::load(&config_path);

    let socket = bind_dual_stack_udp(cfg.listen_port).expect("failed to bind UDP socket");

    tracing::info!(port = cfg.listen_port, "discovery service listening");

    let mut directory = Directory::new(Duration::from_secs(cfg.server_timeout_seconds));
    let sweep_interval = Duration::from_secs(cfg.sweep_interval_seconds);
    let mut last_sweep = Instant::now();
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    loop {
        let now = Instant::now();

        if now.duration_since(last_sweep) >= sweep_interval {
            last_sweep = now;
            for key in directory.sweep_timeouts(now) {
                tracing::info!(server = %key, "server timed out of directory");
            }
        }

        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                let payload = String::from_utf8_lossy(&buf[..len]);
                if let Some(response) = directory.handle_datagram(&payload, from, now) {
                    if let Err(err) = socket.send_to(response.as_bytes(), from) {
                        tracing::debug!(%err, %from, "failed to send response");
                    }
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(IDLE_SLEEP);
            }
            Err(err) => {
                tracing::warn!(%err, "recv_from failed");
            }
        }
    }
}
