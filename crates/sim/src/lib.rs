//! Authoritative simulation core for a blob-growth arena.
//!
//! `World` owns every `Player` and `FoodDot` in one map. It performs no I/O,
//! reads no wall clock, and draws no unseeded randomness: every source of
//! non-determinism (spawn positions, palette choice, food scatter) is drawn
//! from a `ChaCha8Rng` seeded at construction, so two worlds built from the
//! same seed and fed the same inputs in the same order stay in lockstep.
//! Time enters only as caller-supplied `Instant` values, never sampled here.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

pub type PlayerId = Uuid;
pub type FoodId = u64;

/// Fixed 12-hue palette used for both player and food-on-death coloring.
pub const PLAYER_PALETTE: [(u8, u8, u8); 12] = [
    (255, 100, 100),
    (100, 255, 100),
    (100, 100, 255),
    (255, 255, 100),
    (255, 100, 255),
    (100, 255, 255),
    (255, 150, 100),
    (150, 100, 255),
    (255, 100, 150),
    (150, 255, 100),
    (100, 150, 255),
    (255, 200, 100),
];

const MAX_FOOD_IN_PACKET: usize = 200;
const AOI_VIEW_DISTANCE: f64 = 300.0;
const SPLIT_COOLDOWN_MS: u128 = 100;
const MERGE_COOLDOWN_MS: u128 = 100;
const PLAYER_EAT_MARGIN: f64 = 1.1;

/// One circular body belonging to a player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

/// A food pellet. Identifiers are dense and never reused during the
/// process lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoodDot {
    pub id: FoodId,
    pub x: f64,
    pub y: f64,
    pub color: (u8, u8, u8),
}

/// A live session. Liveness timestamps are monotonic (`Instant`); the wire
/// and logging layers are responsible for keeping wall-clock time out of
/// this struct entirely.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub cells: Vec<Cell>,
    pub color: (u8, u8, u8),
    pub last_seen: SocketAddr,
    pub last_ping_response: Instant,
    pub last_movement: Instant,
    pub last_ping_sent: Instant,
    pub last_split: Instant,
    pub last_merge: Instant,
}

impl Player {
    /// Centroid of all owned cells; used both for area-of-interest framing
    /// and for the position reported in snapshots.
    pub fn centroid(&self) -> (f64, f64) {
        centroid(&self.cells)
    }
}

fn centroid(cells: &[Cell]) -> (f64, f64) {
    let n = cells.len() as f64;
    let (sx, sy) = cells.iter().fold((0.0, 0.0), |(ax, ay), c| (ax + c.x, ay + c.y));
    (sx / n, sy / n)
}

fn distance(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    ((x1 - x2).powi(2) + (y1 - y2).powi(2)).sqrt()
}

fn fully_overlaps(ax: f64, ay: f64, ar: f64, bx: f64, by: f64, br: f64) -> bool {
    distance(ax, ay, bx, by) + br <= ar
}

/// Sizes and rates derived once at startup from the map dimensions and the
/// percentages in the configuration file. See `motile-server`'s config
/// loader for the derivation formulas.
#[derive(Debug, Clone, Copy)]
pub struct WorldConfig {
    pub map_width: f64,
    pub map_height: f64,
    pub max_players: usize,
    pub player_start_size: f64,
    pub max_player_size: f64,
    pub min_player_size: f64,
    pub food_size: f64,
    pub max_food: usize,
    pub food_spawn_per_tick: usize,
    pub ping_timeout_seconds: u64,
    pub inactivity_timeout_seconds: u64,
    pub move_speed_base: f64,
    pub growth_rate_food: f64,
    pub growth_rate_player: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitError {
    ServerFull,
}

/// Outcome of a successful admission: which player, and whether this was a
/// brand-new session or an idempotent re-attach to one already live at the
/// same endpoint. Only a brand-new session warrants an immediate discovery
/// re-registration (the player count changed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    pub id: PlayerId,
    pub is_new: bool,
}

/// One of the four cardinal move tokens a session datagram may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Outcome of a timeout sweep for one player: which food the conversion
/// produced, reported back so the caller can log it without re-deriving it.
pub struct TimedOutPlayer {
    pub player: Player,
    pub reason: TimeoutReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutReason {
    PingTimeout,
    Inactivity,
}

/// A player whose last cell was just eaten and who has been respawned.
pub struct EatenPlayer {
    pub victim: PlayerId,
}

pub struct World {
    config: WorldConfig,
    players: HashMap<PlayerId, Player>,
    addr_index: HashMap<SocketAddr, PlayerId>,
    food: Vec<FoodDot>,
    next_food_id: FoodId,
    rng: ChaCha8Rng,
}

impl World {
    pub fn new(seed: u64, config: WorldConfig) -> Self {
        let mut world = World {
            config,
            players: HashMap::new(),
            addr_index: HashMap::new(),
            food: Vec::new(),
            next_food_id: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        let initial = world.config.max_food / 2;
        world.spawn_food(initial);
        world
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn food(&self) -> &[FoodDot] {
        &self.food
    }

    pub fn find_player_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.addr_index.get(&addr).copied()
    }

    /// Admission step 1-3: reuse an existing session bound to `addr`, or
    /// mint a new one if there is room. The caller is responsible for the
    /// server-code auth gate — by the time this is called the datagram has
    /// already been judged admissible.
    pub fn admit(&mut self, name: &str, addr: SocketAddr, now: Instant) -> Result<Admitted, AdmitError> {
        if let Some(&existing) = self.addr_index.get(&addr) {
            if let Some(player) = self.players.get_mut(&existing) {
                player.last_ping_response = now;
            }
            return Ok(Admitted { id: existing, is_new: false });
        }

        if self.players.len() >= self.config.max_players {
            return Err(AdmitError::ServerFull);
        }

        let id = Uuid::from_bytes(self.rng.r#gen());
        let cell = self.random_start_cell();
        let color = self.random_palette_color();
        let player = Player {
            id,
            name: name.to_string(),
            cells: vec![cell],
            color,
            last_seen: addr,
            last_ping_response: now,
            last_movement: now,
            last_ping_sent: now,
            last_split: now,
            last_merge: now,
        };
        self.players.insert(id, player);
        self.addr_index.insert(addr, id);
        Ok(Admitted { id, is_new: true })
    }

    /// Refresh liveness on any session datagram (not just admission).
    pub fn refresh_liveness(&mut self, id: PlayerId, addr: SocketAddr, now: Instant) {
        if let Some(player) = self.players.get_mut(&id) {
            if player.last_seen != addr {
                self.addr_index.remove(&player.last_seen);
                self.addr_index.insert(addr, id);
                player.last_seen = addr;
            }
            player.last_ping_response = now;
        }
    }

    pub fn apply_split(&mut self, id: PlayerId, now: Instant) {
        let Some(player) = self.players.get_mut(&id) else { return };
        if now.duration_since(player.last_split).as_millis() < SPLIT_COOLDOWN_MS {
            return;
        }
        let min_eligible = self.config.min_player_size * 2.0;
        let can_split = player.cells.iter().any(|c| c.size >= min_eligible);
        if !can_split {
            return;
        }

        let mut next = Vec::with_capacity(player.cells.len() * 2);
        for cell in &player.cells {
            if cell.size >= min_eligible {
                let size = cell.size / std::f64::consts::SQRT_2;
                let offset = cell.size * 0.6;
                next.push(Cell { x: cell.x - offset, y: cell.y, size });
                next.push(Cell { x: cell.x + offset, y: cell.y, size });
            } else {
                next.push(*cell);
            }
        }
        player.cells = next;
        player.last_split = now;
    }

    pub fn apply_merge(&mut self, id: PlayerId, now: Instant) {
        let Some(player) = self.players.get_mut(&id) else { return };
        if now.duration_since(player.last_merge).as_millis() < MERGE_COOLDOWN_MS {
            return;
        }
        if player.cells.len() < 2 {
            return;
        }

        let mut best = (0usize, 1usize, f64::MAX);
        for i in 0..player.cells.len() {
            for j in (i + 1)..player.cells.len() {
                let d = distance(player.cells[i].x, player.cells[i].y, player.cells[j].x, player.cells[j].y);
                if d < best.2 {
                    best = (i, j, d);
                }
            }
        }
        let (i, j, _) = best;
        let a = player.cells[i];
        let b = player.cells[j];
        let merged = Cell {
            x: (a.x + b.x) / 2.0,
            y: (a.y + b.y) / 2.0,
            size: (a.size * a.size + b.size * b.size).sqrt(),
        };
        let mut next: Vec<Cell> = player
            .cells
            .iter()
            .enumerate()
            .filter(|&(idx, _)| idx != i && idx != j)
            .map(|(_, c)| *c)
            .collect();
        next.push(merged);
        player.cells = next;
        player.last_merge = now;
    }

    /// Applies a comma-list of direction tokens. An empty or all-unknown
    /// token list is a legal zero-displacement input, not an error.
    pub fn apply_movement(&mut self, id: PlayerId, directions: &[MoveDirection], now: Instant) {
        let Some(player) = self.players.get_mut(&id) else { return };
        let mut dx = 0.0;
        let mut dy = 0.0;
        for dir in directions {
            match dir {
                MoveDirection::Up => dy += 1.0,
                MoveDirection::Down => dy -= 1.0,
                MoveDirection::Left => dx -= 1.0,
                MoveDirection::Right => dx += 1.0,
            }
        }
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        player.last_movement = now;
        if dx != 0.0 && dy != 0.0 {
            let len = (dx * dx + dy * dy).sqrt();
            dx /= len;
            dy /= len;
        }

        let start_size = self.config.player_start_size;
        let base_speed = self.config.move_speed_base;
        let (w, h) = (self.config.map_width, self.config.map_height);
        for cell in &mut player.cells {
            let speed = base_speed * (start_size / cell.size);
            let mut new_x = cell.x + dx * speed;
            let mut new_y = cell.y + dy * speed;
            if new_x < cell.size {
                new_x = cell.size;
            }
            if new_x >= w - cell.size {
                new_x = w - cell.size;
            }
            if new_y < cell.size {
                new_y = cell.size;
            }
            if new_y >= h - cell.size {
                new_y = h - cell.size;
            }
            cell.x = new_x;
            cell.y = new_y;
        }
    }

    /// Runs self-eating, food-eating, and player-on-player eating for the
    /// acting player, in that order. Returns the ids of other players whose
    /// cells were fully consumed and who were respawned as a result. `now`
    /// is threaded through to the respawn path rather than sampled here, so
    /// that identical inputs at identical timestamps stay reproducible.
    pub fn resolve_collisions(&mut self, acting: PlayerId, now: Instant) -> Vec<EatenPlayer> {
        self.absorb_self_overlaps(acting);
        self.eat_food(acting);
        self.eat_players(acting, now)
    }

    fn absorb_self_overlaps(&mut self, id: PlayerId) {
        let Some(player) = self.players.get_mut(&id) else { return };
        let mut i = 0;
        while i < player.cells.len() {
            let mut j = i + 1;
            while j < player.cells.len() {
                let a = player.cells[i];
                let b = player.cells[j];
                if fully_overlaps(a.x, a.y, a.size, b.x, b.y, b.size) {
                    player.cells[i] = Cell {
                        x: (a.x + b.x) / 2.0,
                        y: (a.y + b.y) / 2.0,
                        size: (a.size * a.size + b.size * b.size).sqrt(),
                    };
                    player.cells.remove(j);
                } else {
                    j += 1;
                }
            }
            i += 1;
        }
    }

    fn eat_food(&mut self, id: PlayerId) {
        let Some(player) = self.players.get_mut(&id) else { return };
        let food_size = self.config.food_size;
        let growth = food_size * self.config.growth_rate_food;
        let cap = self.config.max_player_size;
        for cell in &mut player.cells {
            self.food.retain(|f| {
                if distance(cell.x, cell.y, f.x, f.y) < cell.size + food_size {
                    cell.size = (cell.size + growth).min(cap);
                    false
                } else {
                    true
                }
            });
        }
    }

    fn eat_players(&mut self, acting: PlayerId, now: Instant) -> Vec<EatenPlayer> {
        let Some(acting_player) = self.players.get(&acting) else { return Vec::new() };
        let mut acting_cells = acting_player.cells.clone();
        let growth_rate = self.config.growth_rate_player;
        let cap = self.config.max_player_size;
        let mut eaten = Vec::new();

        let other_ids: Vec<PlayerId> = self.players.keys().filter(|&&id| id != acting).copied().collect();
        for other_id in other_ids {
            let Some(other) = self.players.get_mut(&other_id) else { continue };
            for acting_cell in acting_cells.iter_mut() {
                other.cells.retain(|oc| {
                    if acting_cell.size > oc.size * PLAYER_EAT_MARGIN
                        && fully_overlaps(acting_cell.x, acting_cell.y, acting_cell.size, oc.x, oc.y, oc.size)
                    {
                        acting_cell.size = (acting_cell.size + oc.size * growth_rate).min(cap);
                        false
                    } else {
                        true
                    }
                });
            }
            if other.cells.is_empty() {
                self.respawn(other_id, now);
                eaten.push(EatenPlayer { victim: other_id });
            }
        }

        if let Some(acting_player) = self.players.get_mut(&acting) {
            acting_player.cells = acting_cells;
        }
        eaten
    }

    /// Re-rolls position and color and replaces the cell list with a single
    /// fresh starting cell. `last_movement` is reset to `now` so a player
    /// who was just eaten doesn't inherit a stale inactivity timer from
    /// before the respawn.
    pub fn respawn(&mut self, id: PlayerId, now: Instant) {
        let cell = self.random_start_cell();
        let color = self.random_palette_color();
        if let Some(player) = self.players.get_mut(&id) {
            player.cells = vec![cell];
            player.color = color;
            player.last_movement = now;
        }
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let player = self.players.remove(&id)?;
        self.addr_index.remove(&player.last_seen);
        Some(player)
    }

    /// For each player with `now - last_ping_sent >= 10s`, marks the ping as
    /// sent and returns the endpoint a `PING` datagram must go to.
    pub fn ping_sweep(&mut self, now: Instant) -> Vec<(PlayerId, SocketAddr)> {
        let mut due = Vec::new();
        for player in self.players.values_mut() {
            if now.duration_since(player.last_ping_sent).as_secs() >= 10 {
                player.last_ping_sent = now;
                due.push((player.id, player.last_seen));
            }
        }
        due
    }

    /// Removes every player who has aged out, converting each of its cells
    /// to scattered food. Returns the removed players for the caller to log.
    pub fn timeout_sweep(&mut self, now: Instant) -> Vec<TimedOutPlayer> {
        let ping_timeout = self.config.ping_timeout_seconds;
        let inactivity_timeout = self.config.inactivity_timeout_seconds;

        let mut stale = Vec::new();
        for player in self.players.values() {
            if now.duration_since(player.last_ping_response).as_secs() > ping_timeout {
                stale.push((player.id, TimeoutReason::PingTimeout));
            } else if now.duration_since(player.last_movement).as_secs() > inactivity_timeout {
                stale.push((player.id, TimeoutReason::Inactivity));
            }
        }

        let mut removed = Vec::with_capacity(stale.len());
        for (id, reason) in stale {
            if let Some(player) = self.remove_player(id) {
                self.convert_to_food(&player);
                removed.push(TimedOutPlayer { player, reason });
            }
        }
        removed
    }

    fn convert_to_food(&mut self, player: &Player) {
        let food_area = std::f64::consts::PI * self.config.food_size.powi(2);
        let (w, h) = (self.config.map_width, self.config.map_height);
        for cell in &player.cells {
            let cell_area = std::f64::consts::PI * cell.size.powi(2);
            let count = (cell_area / food_area) as usize;
            for _ in 0..count {
                let angle = self.rng.gen_range(0.0..std::f64::consts::TAU);
                let dist = self.rng.gen_range(0.0..cell.size);
                let mut x = cell.x + angle.cos() * dist;
                let mut y = cell.y + angle.sin() * dist;
                x = x.clamp(5.0, w - 5.0);
                y = y.clamp(5.0, h - 5.0);
                let id = self.next_food_id;
                self.next_food_id += 1;
                self.food.push(FoodDot { id, x, y, color: player.color });
            }
        }
    }

    /// Spawns up to `count` food dots, stopping early once `max_food` is hit.
    pub fn spawn_food(&mut self, count: usize) {
        let (w, h) = (self.config.map_width, self.config.map_height);
        for _ in 0..count {
            if self.food.len() >= self.config.max_food {
                return;
            }
            let x = self.rng.gen_range(5.0..w - 5.0);
            let y = self.rng.gen_range(5.0..h - 5.0);
            let color = self.random_food_color();
            let id = self.next_food_id;
            self.next_food_id += 1;
            self.food.push(FoodDot { id, x, y, color });
        }
    }

    /// Food within `AOI_VIEW_DISTANCE` of the given centroid, capped at
    /// `MAX_FOOD_IN_PACKET`.
    pub fn nearby_food(&self, centroid: (f64, f64)) -> Vec<&FoodDot> {
        self.food
            .iter()
            .filter(|f| distance(f.x, f.y, centroid.0, centroid.1) <= AOI_VIEW_DISTANCE)
            .take(MAX_FOOD_IN_PACKET)
            .collect()
    }

    fn random_start_cell(&mut self) -> Cell {
        let margin = self.config.player_start_size;
        let x = self.rng.gen_range(margin..(self.config.map_width - margin));
        let y = self.rng.gen_range(margin..(self.config.map_height - margin));
        Cell { x, y, size: self.config.player_start_size }
    }

    fn random_palette_color(&mut self) -> (u8, u8, u8) {
        PLAYER_PALETTE[self.rng.gen_range(0..PLAYER_PALETTE.len())]
    }

    fn random_food_color(&mut self) -> (u8, u8, u8) {
        (
            self.rng.gen_range(100..=255),
            self.rng.gen_range(100..=255),
            self.rng.gen_range(100..=255),
        )
    }
}
