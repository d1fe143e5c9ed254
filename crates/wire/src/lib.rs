//! ASCII datagram codec shared by the game server, the discovery service,
//! and any client. Every payload is plain ASCII text; `|` separates
//! top-level fields, `,` separates sub-fields, and `;` terminates repeated
//! records. There is no length prefix and no binary framing — a datagram
//! either parses as one of the message shapes below or it is silently
//! dropped by the caller.

use motile_sim::{Cell, FoodDot, MoveDirection, Player, PlayerId};

/// A datagram received by the Game Server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientToServer {
    /// `"NONE:<name>:INIT"` or `"NONE:<name>:CODE:<code>"`.
    Admission { name: String, code: Option<String> },
    /// `"<uuid>:<name>:<command>"`.
    Session { player_id: PlayerId, name: String, command: SessionCommand },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Ack,
    Pong,
    Split,
    Merge,
    Move(Vec<MoveDirection>),
}

/// Why a datagram could not be turned into a `ClientToServer` value. Every
/// variant here is a silent-drop outcome at the caller, per the error
/// taxonomy: this crate never panics on malformed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    NoColon,
    MissingSecondColon,
    UnparseableIdentifier,
}

/// Parses an inbound Client -> Game Server datagram.
pub fn decode_client_to_server(payload: &str) -> Result<ClientToServer, DecodeError> {
    let first_colon = payload.find(':').ok_or(DecodeError::NoColon)?;
    let (received_id, rest) = payload.split_at(first_colon);
    let rest = &rest[1..];
    let second_colon = rest.find(':').ok_or(DecodeError::MissingSecondColon)?;
    let (name, command) = rest.split_at(second_colon);
    let command = &command[1..];

    if received_id == "NONE" || received_id.is_empty() {
        let code = command.strip_prefix("CODE:").map(|v| v.to_string());
        Ok(ClientToServer::Admission { name: name.to_string(), code })
    } else {
        let player_id = PlayerId::parse_str(received_id).map_err(|_| DecodeError::UnparseableIdentifier)?;
        Ok(ClientToServer::Session { player_id, name: name.to_string(), command: decode_command(command) })
    }
}

fn decode_command(command: &str) -> SessionCommand {
    match command {
        "ACK" => SessionCommand::Ack,
        "PONG" => SessionCommand::Pong,
        "SPLIT" => SessionCommand::Split,
        "MERGE" => SessionCommand::Merge,
        other => {
            let dirs = other
                .split(',')
                .filter_map(|tok| match tok {
                    "UP" => Some(MoveDirection::Up),
                    "DOWN" => Some(MoveDirection::Down),
                    "LEFT" => Some(MoveDirection::Left),
                    "RIGHT" => Some(MoveDirection::Right),
                    _ => None,
                })
                .collect();
            SessionCommand::Move(dirs)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerError {
    CodeRequired,
    WrongCode,
    ServerFull,
}

impl ServerError {
    pub fn encode(self) -> &'static str {
        match self {
            ServerError::CodeRequired => "ERROR:CODE_REQUIRED",
            ServerError::WrongCode => "ERROR:WRONG_CODE",
            ServerError::ServerFull => "ERROR:SERVER_FULL",
        }
    }
}

pub const PING_PAYLOAD: &str = "PING";

/// Builds the `PLAYERS:` roster segment: one record per cell, not per
/// player — a player with multiple cells contributes multiple records that
/// share its identifier and name.
pub fn encode_roster(players: impl Iterator<Item = (PlayerId, String, Cell, (u8, u8, u8))>) -> String {
    let mut out = String::from("PLAYERS:");
    let mut first = true;
    for (id, name, cell, (r, g, b)) in players {
        if !first {
            out.push(';');
        }
        out.push_str(&format!("{id},{name},{:.2},{:.2},{:.2},{r},{g},{b}", cell.x, cell.y, cell.size));
        first = false;
    }
    out
}

/// Flattens the live roster into `(id, name, cell, color)` tuples in the
/// shape `encode_roster` expects, one per cell.
pub fn roster_records<'a>(players: impl Iterator<Item = &'a Player>) -> Vec<(PlayerId, String, Cell, (u8, u8, u8))> {
    let mut out = Vec::new();
    for p in players {
        for cell in &p.cells {
            out.push((p.id, p.name.clone(), *cell, p.color));
        }
    }
    out
}

/// Builds the `FOOD:` segment from an already-AoI-filtered slice.
pub fn encode_food(food: &[&FoodDot]) -> String {
    let mut out = String::from("FOOD:");
    let mut first = true;
    for f in food {
        if !first {
            out.push(';');
        }
        out.push_str(&format!("{},{:.2},{:.2},{},{},{}", f.id, f.x, f.y, f.color.0, f.color.1, f.color.2));
        first = false;
    }
    out
}

pub struct JoinSnapshot {
    pub player_id: PlayerId,
    pub map_width: f64,
    pub map_height: f64,
    pub position: (f64, f64),
    pub size: f64,
    pub color: (u8, u8, u8),
    pub roster: String,
    pub food: String,
}

pub fn encode_join_snapshot(s: &JoinSnapshot) -> String {
    format!(
        "UUID:{}|MAP:{},{}|POS:{:.2},{:.2}|SIZE:{:.2}|COLOR:{},{},{}|{}|{}",
        s.player_id,
        s.map_width as i64,
        s.map_height as i64,
        s.position.0,
        s.position.1,
        s.size,
        s.color.0,
        s.color.1,
        s.color.2,
        s.roster,
        s.food,
    )
}

pub struct DeltaSnapshot {
    pub position: (f64, f64),
    pub size: f64,
    pub roster: String,
    pub food: String,
}

pub fn encode_delta_snapshot(s: &DeltaSnapshot) -> String {
    format!("POS:{:.2},{:.2}|SIZE:{:.2}|{}|{}", s.position.0, s.position.1, s.size, s.roster, s.food)
}

/// Directory entry as carried on the wire between the Game Server, the
/// Discovery Service, and any client querying it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerListing {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub current_players: u32,
    pub max_players: u32,
    pub map_width: u32,
    pub map_height: u32,
    pub has_password: bool,
    pub server_code: String,
}

/// A datagram received by the Discovery Service.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientToFinder {
    Register {
        name: String,
        port: u16,
        current_players: u32,
        max_players: u32,
        map_width: u32,
        map_height: u32,
        has_password: bool,
        server_code: String,
    },
    Query,
    Heartbeat {
        key: String,
    },
}

pub fn decode_client_to_finder(payload: &str) -> Result<ClientToFinder, DecodeError> {
    if let Some(rest) = payload.strip_prefix("REGISTER:") {
        let parts: Vec<&str> = rest.split(',').collect();
        if parts.len() < 7 {
            return Err(DecodeError::UnparseableIdentifier);
        }
        let port: u16 = parts[1].parse().map_err(|_| DecodeError::UnparseableIdentifier)?;
        let current_players: u32 = parts[2].parse().map_err(|_| DecodeError::UnparseableIdentifier)?;
        let max_players: u32 = parts[3].parse().map_err(|_| DecodeError::UnparseableIdentifier)?;
        let map_width: u32 = parts[4].parse().map_err(|_| DecodeError::UnparseableIdentifier)?;
        let map_height: u32 = parts[5].parse().map_err(|_| DecodeError::UnparseableIdentifier)?;
        let has_password = parts[6] == "1";
        let server_code = parts.get(7).map(|s| s.to_string()).unwrap_or_default();
        Ok(ClientToFinder::Register {
            name: parts[0].to_string(),
            port,
            current_players,
            max_players,
            map_width,
            map_height,
            has_password,
            server_code,
        })
    } else if payload == "QUERY" {
        Ok(ClientToFinder::Query)
    } else if let Some(key) = payload.strip_prefix("HEARTBEAT:") {
        Ok(ClientToFinder::Heartbeat { key: key.to_string() })
    } else {
        Err(DecodeError::NoColon)
    }
}

pub fn encode_register(
    name: &str,
    port: u16,
    current_players: u32,
    max_players: u32,
    map_width: u32,
    map_height: u32,
    server_code: &str,
) -> String {
    format!(
        "REGISTER:{name},{port},{current_players},{max_players},{map_width},{map_height},{},{server_code}",
        if server_code.is_empty() { "0" } else { "1" }
    )
}

pub const OK_PAYLOAD: &str = "OK";

pub fn encode_servers(listings: &[ServerListing]) -> String {
    let mut out = String::from("SERVERS:");
    let mut first = true;
    for s in listings {
        if !first {
            out.push(';');
        }
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{}",
            s.name,
            s.address,
            s.port,
            s.current_players,
            s.max_players,
            s.map_width,
            s.map_height,
            if s.has_password { 1 } else { 0 },
            s.server_code,
        ));
        first = false;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bare_init_admission() {
        let msg = decode_client_to_server("NONE:alice:INIT").unwrap();
        assert_eq!(msg, ClientToServer::Admission { name: "alice".into(), code: None });
    }

    #[test]
    fn decodes_admission_with_code() {
        let msg = decode_client_to_server("NONE:eve:CODE:hunter2").unwrap();
        assert_eq!(msg, ClientToServer::Admission { name: "eve".into(), code: Some("hunter2".into()) });
    }

    #[test]
    fn empty_identifier_is_also_admission() {
        let msg = decode_client_to_server(":bob:INIT").unwrap();
        assert!(matches!(msg, ClientToServer::Admission { .. }));
    }

    #[test]
    fn decodes_session_ack_and_movement() {
        let id = PlayerId::nil();
        let payload = format!("{id}:alice:UP,RIGHT");
        let msg = decode_client_to_server(&payload).unwrap();
        match msg {
            ClientToServer::Session { command: SessionCommand::Move(dirs), .. } => {
                assert_eq!(dirs, vec![MoveDirection::Up, MoveDirection::Right]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_uuid_string_is_dropped_not_panicked() {
        let err = decode_client_to_server("not-a-uuid:alice:ACK").unwrap_err();
        assert_eq!(err, DecodeError::UnparseableIdentifier);
    }

    #[test]
    fn garbled_movement_tokens_yield_zero_directions() {
        let id = PlayerId::nil();
        let payload = format!("{id}:alice:SIDEWAYS,,UP");
        let msg = decode_client_to_server(&payload).unwrap();
        match msg {
            ClientToServer::Session { command: SessionCommand::Move(dirs), .. } => {
                assert_eq!(dirs, vec![MoveDirection::Up]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_colon_is_rejected() {
        assert_eq!(decode_client_to_server("garbage").unwrap_err(), DecodeError::NoColon);
    }

    #[test]
    fn roster_emits_one_record_per_cell() {
        let id = PlayerId::nil();
        let cells = vec![Cell { x: 1.0, y: 2.0, size: 3.0 }, Cell { x: 4.0, y: 5.0, size: 6.0 }];
        let records: Vec<_> = cells.into_iter().map(|c| (id, "alice".to_string(), c, (1, 2, 3))).collect();
        let encoded = encode_roster(records.into_iter());
        assert_eq!(encoded.matches(';').count(), 1);
        assert!(encoded.starts_with("PLAYERS:"));
    }

    #[test]
    fn finder_decodes_register_and_query() {
        let reg = decode_client_to_finder("REGISTER:Arena,8888,0,50,1000,1000,0,").unwrap();
        assert_eq!(
            reg,
            ClientToFinder::Register {
                name: "Arena".into(),
                port: 8888,
                current_players: 0,
                max_players: 50,
                map_width: 1000,
                map_height: 1000,
                has_password: false,
                server_code: "".into(),
            }
        );
        assert_eq!(decode_client_to_finder("QUERY").unwrap(), ClientToFinder::Query);
    }

    #[test]
    fn finder_encodes_empty_server_list() {
        assert_eq!(encode_servers(&[]), "SERVERS:");
    }

    #[test]
    fn finder_round_trips_single_server_listing() {
        let listing = ServerListing {
            name: "Arena".into(),
            address: "::1".into(),
            port: 8888,
            current_players: 0,
            max_players: 50,
            map_width: 1000,
            map_height: 1000,
            has_password: false,
            server_code: "".into(),
        };
        assert_eq!(encode_servers(&[listing]), "SERVERS:Arena,::1,8888,0,50,1000,1000,0,");
    }
}
