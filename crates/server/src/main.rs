use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use motile_server::config::{self, Config};
use motile_server::GameServer;

const RECV_BUFFER_SIZE: usize = 65536;
const PING_AND_TIMEOUT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);
const FOOD_SPAWN_INTERVAL: Duration = Duration::from_millis(100);
const FINDER_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const IDLE_SLEEP: Duration = Duration::from_millis(10);

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

    let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("server.conf"));
    let cfg = match config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{err}: edit {} and restart", config_path.display());
            tracing::warn!(%err, path = %config_path.display(), "config not ready");
            std::process::exit(1);
        }
    };

    let socket = bind_dual_stack_udp(cfg.listen_port).expect("failed to bind UDP socket");

    tracing::info!(name = %cfg.server_name, port = cfg.listen_port, "game server listening");

    let world_config = config::world_config(&cfg);
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let mut server = GameServer::new(seed, world_config, cfg.server_name.clone(), cfg.server_code.clone());

    let finder_addr: Option<SocketAddr> = format!("[{}]:{}", cfg.finder_address, cfg.finder_port).parse().ok();

    let mut last_sweep = Instant::now();
    let mut last_food_spawn = Instant::now();
    let mut last_heartbeat = Instant::now();
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    loop {
        let now = Instant::now();

        if now.duration_since(last_sweep) >= PING_AND_TIMEOUT_SWEEP_INTERVAL {
            last_sweep = now;
            run_ping_and_timeout_sweep(&socket, &mut server, now);
        }

        if now.duration_since(last_food_spawn) >= FOOD_SPAWN_INTERVAL {
            last_food_spawn = now;
            server.run_food_spawn();
        }

        if let Some(finder) = finder_addr {
            if now.duration_since(last_heartbeat) >= FINDER_HEARTBEAT_INTERVAL {
                last_heartbeat = now;
                send_finder_heartbeat(&socket, finder, &cfg, &server);
            }
        }

        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                let payload = String::from_utf8_lossy(&buf[..len]);
                if let Some(response) = server.handle_datagram(&payload, from, now) {
                    if let Err(err) = socket.send_to(response.as_bytes(), from) {
                        tracing::debug!(%err, %from, "failed to send response");
                    }
                }
                if server.take_reregister_due() {
                    if let Some(finder) = finder_addr {
                        last_heartbeat = now;
                        send_finder_heartbeat(&socket, finder, &cfg, &server);
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

fn run_ping_and_timeout_sweep(socket: &UdpSocket, server: &mut GameServer, now: Instant) {
    for addr in server.run_ping_sweep(now) {
        let _ = socket.send_to(GameServer::ping_payload().as_bytes(), addr);
    }
    server.run_timeout_sweep(now);
}

fn send_finder_heartbeat(socket: &UdpSocket, finder: SocketAddr, cfg: &Config, server: &GameServer) {
    let key = format!("[::]:{}", cfg.listen_port);
    let payload = motile_wire::encode_register(
        &cfg.server_name,
        cfg.listen_port,
        server.player_count() as u32,
        cfg.max_players as u32,
        cfg.map_width as u32,
        cfg.map_height as u32,
        &cfg.server_code,
    );
    if let Err(err) = socket.send_to(payload.as_bytes(), finder) {
        tracing::debug!(%err, %key, "failed to send finder heartbeat");
    }
}
