//! Directory of live Game Servers. Each server periodically sends a
//! `REGISTER` datagram (which doubles as its heartbeat); a 10-second sweep
//! drops any entry that has gone quiet for longer than the configured
//! timeout.

pub mod config;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use motile_wire::{decode_client_to_finder, encode_servers, ClientToFinder, ServerListing};

#[derive(Debug, Clone)]
struct RegisteredServer {
    name: String,
    address: String,
    port: u16,
    current_players: u32,
    max_players: u32,
    map_width: u32,
    map_height: u32,
    has_password: bool,
    server_code: String,
    last_seen: Instant,
}

/// Directory entries are keyed by `"<ip>:<declared-port>"` — the port a
/// server puts in its own `REGISTER` payload, not the UDP source port the
/// datagram happened to arrive from, since NAT and multi-homed hosts can
/// make those differ.
pub struct Directory {
    servers: HashMap<String, RegisteredServer>,
    timeout: std::time::Duration,
}

impl Directory {
    pub fn new(timeout: std::time::Duration) -> Self {
        Directory { servers: HashMap::new(), timeout }
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Handles one inbound datagram, returning the payload to send back to
    /// `from`, if any.
    pub fn handle_datagram(&mut self, payload: &str, from: SocketAddr, now: Instant) -> Option<String> {
        let message = match decode_client_to_finder(payload) {
            Ok(m) => m,
            Err(err) => {
                tracing::debug!(?err, %from, "dropping malformed datagram");
                return None;
            }
        };

        match message {
            ClientToFinder::Register {
                name,
                port,
                current_players,
                max_players,
                map_width,
                map_height,
                has_password,
                server_code,
            } => {
                let key = format!("{}:{}", from.ip(), port);
                self.servers.insert(
                    key,
                    RegisteredServer {
                        name,
                        address: from.ip().to_string(),
                        port,
                        current_players,
                        max_players,
                        map_width,
                        map_height,
                        has_password,
                        server_code,
                        last_seen: now,
                    },
                );
                Some(motile_wire::OK_PAYLOAD.to_string())
            }
            ClientToFinder::Heartbeat { key } => {
                if let Some(entry) = self.servers.get_mut(&key) {
                    entry.last_seen = now;
                }
                None
            }
            ClientToFinder::Query => Some(self.encode_listings()),
        }
    }

    fn encode_listings(&self) -> String {
        let listings: Vec<ServerListing> = self
            .servers
            .values()
            .map(|s| ServerListing {
                name: s.name.clone(),
                address: s.address.clone(),
                port: s.port,
                current_players: s.current_players,
                max_players: s.max_players,
                map_width: s.map_width,
                map_height: s.map_height,
                has_password: s.has_password,
                server_code: s.server_code.clone(),
            })
            .collect();
        encode_servers(&listings)
    }

    /// Drops any server that has not registered or heartbeat within the
    /// configured timeout. Returns the keys removed, for logging.
    pub fn sweep_timeouts(&mut self, now: Instant) -> Vec<String> {
        let timeout = self.timeout;
        let stale: Vec<String> = self
            .servers
            .iter()
            .filter(|(_, s)| now.duration_since(s.last_seen) > timeout)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            self.servers.remove(key);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv6Addr};
    use std::time::Duration;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), port)
    }

    #[test]
    fn register_then_query_returns_the_entry() {
        let mut dir = Directory::new(Duration::from_secs(60));
        let now = Instant::now();
        let reg = "REGISTER:Arena,8888,0,50,1000,1000,0,";
        let reply = dir.handle_datagram(reg, addr(55000), now).unwrap();
        assert_eq!(reply, "OK");
        let listed = dir.handle_datagram("QUERY", addr(1), now).unwrap();
        assert!(listed.contains("Arena"));
        assert!(listed.contains("8888"));
    }

    #[test]
    fn registration_key_uses_declared_port_not_source_port() {
        let mut dir = Directory::new(Duration::from_secs(60));
        let now = Instant::now();
        dir.handle_datagram("REGISTER:Arena,8888,0,50,1000,1000,0,", addr(55000), now);
        assert_eq!(dir.len(), 1);
        // a heartbeat naming the declared-port key must find the same entry and draw no reply
        let key = format!("{}:8888", std::net::Ipv6Addr::LOCALHOST);
        let heartbeat_at = now + Duration::from_secs(50);
        let reply = dir.handle_datagram(&format!("HEARTBEAT:{key}"), addr(1), heartbeat_at);
        assert!(reply.is_none());
        // without the heartbeat this would already be stale against `now`; it survives because
        // the heartbeat refreshed last_seen to `heartbeat_at`.
        let sweep_at = now + Duration::from_secs(65);
        assert_eq!(dir.sweep_timeouts(sweep_at).len(), 0);
    }

    #[test]
    fn stale_entries_are_swept_after_timeout() {
        let mut dir = Directory::new(Duration::from_secs(60));
        let now = Instant::now();
        dir.handle_datagram("REGISTER:Arena,8888,0,50,1000,1000,0,", addr(55000), now);
        let later = now + Duration::from_secs(61);
        let removed = dir.sweep_timeouts(later);
        assert_eq!(removed.len(), 1);
        assert!(dir.is_empty());
    }

    #[test]
    fn fresh_entries_survive_a_sweep() {
        let mut dir = Directory::new(Duration::from_secs(60));
        let now = Instant::now();
        dir.handle_datagram("REGISTER:Arena,8888,0,50,1000,1000,0,", addr(55000), now);
        let removed = dir.sweep_timeouts(now + Duration::from_secs(5));
        assert!(removed.is_empty());
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn malformed_datagram_is_dropped_without_reply() {
        let mut dir = Directory::new(Duration::from_secs(60));
        let response = dir.handle_datagram("not-a-command", addr(1), Instant::now());
        assert!(response.is_none());
    }

    #[test]
    fn empty_directory_query_yields_empty_listing() {
        let mut dir = Directory::new(Duration::from_secs(60));
        let reply = dir.handle_datagram("QUERY", addr(1), Instant::now()).unwrap();
        assert_eq!(reply, "SERVERS:");
    }
}
