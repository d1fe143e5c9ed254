//! Dispatch layer binding the wire codec to the simulation core. This crate
//! has no socket of its own — `main.rs` owns the UDP socket and calls into
//! `GameServer` once per inbound datagram and once per periodic job tick.

pub mod config;

use std::net::SocketAddr;
use std::time::Instant;

use motile_sim::{AdmitError, PlayerId, World, WorldConfig};
use motile_wire::{
    decode_client_to_server, encode_delta_snapshot, encode_food, encode_join_snapshot, encode_roster,
    ClientToServer, DeltaSnapshot, JoinSnapshot, ServerError, SessionCommand, PING_PAYLOAD,
};

pub struct GameServer {
    world: World,
    server_code: String,
    server_name: String,
    reregister_due: bool,
}

impl GameServer {
    pub fn new(seed: u64, world_config: WorldConfig, server_name: String, server_code: String) -> Self {
        GameServer { world: World::new(seed, world_config), server_code, server_name, reregister_due: false }
    }

    /// Whether a newly-admitted player means the Discovery Service should be
    /// told the current player count right away, instead of waiting out the
    /// 30s periodic re-registration. Clears the flag on read.
    pub fn take_reregister_due(&mut self) -> bool {
        std::mem::take(&mut self.reregister_due)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn player_count(&self) -> usize {
        self.world.player_count()
    }

    /// Handles one inbound datagram, returning the payload to send back to
    /// `from`, if any. A malformed datagram is logged and silently dropped
    /// (returns `None`) rather than propagated as an error — the UDP edge
    /// must keep running no matter what a peer sends.
    pub fn handle_datagram(&mut self, payload: &str, from: SocketAddr, now: Instant) -> Option<String> {
        let message = match decode_client_to_server(payload) {
            Ok(m) => m,
            Err(err) => {
                tracing::debug!(?err, %from, "dropping malformed datagram");
                return None;
            }
        };

        match message {
            ClientToServer::Admission { name, code } => self.handle_admission(name, code, from, now),
            ClientToServer::Session { player_id, command, .. } => {
                self.handle_session(player_id, command, from, now)
            }
        }
    }

    fn handle_admission(&mut self, name: String, code: Option<String>, from: SocketAddr, now: Instant) -> Option<String> {
        if !self.server_code.is_empty() {
            match code {
                None => return Some(ServerError::CodeRequired.encode().to_string()),
                Some(given) if given != self.server_code => {
                    return Some(ServerError::WrongCode.encode().to_string())
                }
                Some(_) => {}
            }
        }

        match self.world.admit(&name, from, now) {
            Ok(admitted) => {
                if admitted.is_new {
                    tracing::info!(player = %admitted.id, %name, %from, "player admitted");
                    self.reregister_due = true;
                }
                Some(self.join_snapshot(admitted.id))
            }
            Err(AdmitError::ServerFull) => {
                tracing::info!(%from, "rejecting admission: server full");
                Some(ServerError::ServerFull.encode().to_string())
            }
        }
    }

    fn handle_session(
        &mut self,
        player_id: PlayerId,
        command: SessionCommand,
        from: SocketAddr,
        now: Instant,
    ) -> Option<String> {
        if self.world.player(player_id).is_none() {
            tracing::debug!(%player_id, %from, "session datagram for unknown player");
            return None;
        }
        self.world.refresh_liveness(player_id, from, now);

        match command {
            SessionCommand::Ack | SessionCommand::Pong => None,
            SessionCommand::Split => {
                self.world.apply_split(player_id, now);
                self.world.resolve_collisions(player_id, now);
                Some(self.delta_snapshot(player_id))
            }
            SessionCommand::Merge => {
                self.world.apply_merge(player_id, now);
                self.world.resolve_collisions(player_id, now);
                Some(self.delta_snapshot(player_id))
            }
            SessionCommand::Move(directions) => {
                self.world.apply_movement(player_id, &directions, now);
                let eaten = self.world.resolve_collisions(player_id, now);
                for victim in eaten {
                    tracing::info!(victim = %victim.victim, eaten_by = %player_id, "player eaten and respawned");
                }
                Some(self.delta_snapshot(player_id))
            }
        }
    }

    fn join_snapshot(&self, player_id: PlayerId) -> String {
        let player = self.world.player(player_id).expect("just admitted");
        let centroid = player.centroid();
        let nearby = self.world.nearby_food(centroid);
        let roster = motile_wire::roster_records(self.world.players());
        let roster = encode_roster(roster.into_iter());
        let food = encode_food(&nearby);
        encode_join_snapshot(&JoinSnapshot {
            player_id,
            map_width: self.world.config().map_width,
            map_height: self.world.config().map_height,
            position: centroid,
            size: player.cells[0].size,
            color: player.color,
            roster,
            food,
        })
    }

    fn delta_snapshot(&self, player_id: PlayerId) -> String {
        let player = self.world.player(player_id).expect("session datagram already validated");
        let centroid = player.centroid();
        let size = player.cells[0].size;
        let nearby = self.world.nearby_food(centroid);
        let roster = motile_wire::roster_records(self.world.players());
        let roster = encode_roster(roster.into_iter());
        let food = encode_food(&nearby);
        encode_delta_snapshot(&DeltaSnapshot { position: centroid, size, roster, food })
    }

    /// Periodic job: sends `PING` to any player overdue for one. Returns the
    /// addresses to send to.
    pub fn run_ping_sweep(&mut self, now: Instant) -> Vec<SocketAddr> {
        self.world.ping_sweep(now).into_iter().map(|(_, addr)| addr).collect()
    }

    pub fn ping_payload() -> &'static str {
        PING_PAYLOAD
    }

    /// Periodic job: removes timed-out sessions, scattering their mass as
    /// food.
    pub fn run_timeout_sweep(&mut self, now: Instant) {
        for removed in self.world.timeout_sweep(now) {
            tracing::info!(
                player = %removed.player.id,
                name = %removed.player.name,
                reason = ?removed.reason,
                "session timed out"
            );
        }
    }

    /// Periodic job: tops the food count back up toward `max_food`.
    pub fn run_food_spawn(&mut self) {
        let spawn = self.world.config().food_spawn_per_tick;
        self.world.spawn_food(spawn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motile_sim::WorldConfig;
    use std::net::{IpAddr, Ipv6Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), port)
    }

    fn test_world_config() -> WorldConfig {
        WorldConfig {
            map_width: 1000.0,
            map_height: 1000.0,
            max_players: 2,
            player_start_size: 20.0,
            max_player_size: 200.0,
            min_player_size: 10.0,
            food_size: 5.0,
            max_food: 50,
            food_spawn_per_tick: 2,
            ping_timeout_seconds: 30,
            inactivity_timeout_seconds: 600,
            move_speed_base: 6.0,
            growth_rate_food: 0.04,
            growth_rate_player: 0.04,
        }
    }

    #[test]
    fn admission_roundtrip_produces_join_snapshot() {
        let mut server = GameServer::new(1, test_world_config(), "Arena".into(), String::new());
        let response = server.handle_datagram("NONE:alice:INIT", addr(1), Instant::now()).unwrap();
        assert!(response.starts_with("UUID:"));
        assert_eq!(server.player_count(), 1);
    }

    #[test]
    fn wrong_server_code_is_rejected() {
        let mut server = GameServer::new(1, test_world_config(), "Arena".into(), "secret".into());
        let response = server.handle_datagram("NONE:alice:CODE:nope", addr(1), Instant::now()).unwrap();
        assert_eq!(response, "ERROR:WRONG_CODE");
        assert_eq!(server.player_count(), 0);
    }

    #[test]
    fn missing_server_code_is_rejected_when_required() {
        let mut server = GameServer::new(1, test_world_config(), "Arena".into(), "secret".into());
        let response = server.handle_datagram("NONE:alice:INIT", addr(1), Instant::now()).unwrap();
        assert_eq!(response, "ERROR:CODE_REQUIRED");
    }

    #[test]
    fn server_full_rejects_third_player() {
        let mut server = GameServer::new(1, test_world_config(), "Arena".into(), String::new());
        server.handle_datagram("NONE:a:INIT", addr(1), Instant::now());
        server.handle_datagram("NONE:b:INIT", addr(2), Instant::now());
        let response = server.handle_datagram("NONE:c:INIT", addr(3), Instant::now()).unwrap();
        assert_eq!(response, "ERROR:SERVER_FULL");
    }

    #[test]
    fn malformed_datagram_does_not_crash_dispatch() {
        let mut server = GameServer::new(1, test_world_config(), "Arena".into(), String::new());
        let response = server.handle_datagram("garbage-with-no-colon", addr(1), Instant::now());
        assert!(response.is_none());
    }

    #[test]
    fn ack_and_pong_produce_no_reply() {
        let mut server = GameServer::new(1, test_world_config(), "Arena".into(), String::new());
        let join = server.handle_datagram("NONE:alice:INIT", addr(1), Instant::now()).unwrap();
        let id = join.split(['|', ':']).nth(1).unwrap();
        let payload = format!("{id}:alice:ACK");
        assert!(server.handle_datagram(&payload, addr(1), Instant::now()).is_none());
    }

    #[test]
    fn new_admission_flags_an_immediate_reregister_but_reattach_does_not() {
        let mut server = GameServer::new(1, test_world_config(), "Arena".into(), String::new());
        server.handle_datagram("NONE:alice:INIT", addr(1), Instant::now());
        assert!(server.take_reregister_due());
        assert!(!server.take_reregister_due());

        server.handle_datagram("NONE:alice:INIT", addr(1), Instant::now());
        assert!(!server.take_reregister_due());
    }

    #[test]
    fn split_triggers_a_delta_snapshot() {
        let mut server = GameServer::new(1, test_world_config(), "Arena".into(), String::new());
        let join = server.handle_datagram("NONE:alice:INIT", addr(1), Instant::now()).unwrap();
        let id = join.split(['|', ':']).nth(1).unwrap();
        let payload = format!("{id}:alice:SPLIT");
        let response = server.handle_datagram(&payload, addr(1), Instant::now());
        assert!(response.is_some());
        assert!(response.unwrap().starts_with("POS:"));
    }
}
