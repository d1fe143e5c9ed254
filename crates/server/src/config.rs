//! Line-oriented `KEY=VALUE` configuration file for the Game Server.
//!
//! If the file named on the command line does not exist, a template is
//! written to that path and the process exits so an operator can review it
//! before the server binds a socket. The in-memory fallback defaults used
//! when a key is simply absent from an existing file are **not** the same
//! numbers written into that template — this mirrors the reference
//! implementation this port is descended from, which never noticed the
//! drift. It is kept here deliberately rather than "fixed".

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use motile_sim::WorldConfig;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    WroteTemplate,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::WroteTemplate => write!(f, "wrote default config template; edit it and restart"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_name: String,
    pub server_code: String,
    pub listen_port: u16,
    pub finder_address: String,
    pub finder_port: u16,
    pub map_width: f64,
    pub map_height: f64,
    pub max_players: usize,
    pub player_start_size_percentage: f64,
    pub player_max_size_percentage: f64,
    pub food_percentage: f64,
    pub food_spawn_per_tick: usize,
    pub growth_rate_food: f64,
    pub growth_rate_player: f64,
    pub move_speed_base: f64,
    pub ping_timeout_seconds: u64,
    pub inactivity_timeout_seconds: u64,
}

impl Default for Config {
    /// Fallback used for any key missing from an existing file. These values
    /// intentionally differ from `write_default_template`'s on-disk text.
    fn default() -> Self {
        Config {
            server_name: "A Blob Game Server!".to_string(),
            server_code: String::new(),
            listen_port: 8888,
            finder_address: "::1".to_string(),
            finder_port: 7777,
            map_width: 3000.0,
            map_height: 3000.0,
            max_players: 50,
            player_start_size_percentage: 0.01,
            player_max_size_percentage: 0.10,
            food_percentage: 0.01,
            food_spawn_per_tick: 5,
            growth_rate_food: 0.02,
            growth_rate_player: 0.02,
            move_speed_base: 6.0,
            ping_timeout_seconds: 30,
            inactivity_timeout_seconds: 600,
        }
    }
}

/// Text written to disk when the configured path does not exist yet. Kept
/// distinct from `Config::default()` on purpose — see the module doc.
pub fn default_template() -> &'static str {
    "# Game Server configuration.\n\
     # Lines starting with '#' are ignored. Whitespace around keys and\n\
     # values is trimmed.\n\
     SERVER_NAME=A Blob Game Server\n\
     SERVER_CODE=\n\
     GAME_SERVER_PORT=8888\n\
     FINDER_ADDRESS=::1\n\
     FINDER_PORT=7777\n\
     MAP_WIDTH=3000\n\
     MAP_HEIGHT=3000\n\
     MAX_PLAYERS=50\n\
     PLAYER_START_SIZE_PERCENTAGE=0.01\n\
     PLAYER_MAX_SIZE_PERCENTAGE=0.10\n\
     FOOD_PERCENTAGE=0.05\n\
     FOOD_SPAWN_PER_TICK=5\n\
     GROWTH_RATE_FOOD=0.04\n\
     GROWTH_RATE_PLAYER=0.04\n\
     MOVE_SPEED_BASE=6.0\n\
     PING_TIMEOUT_SECONDS=30\n\
     INACTIVITY_TIMEOUT_SECONDS=600\n"
}

/// Loads `path`, writing the template and returning `ConfigError::WroteTemplate`
/// if it does not exist.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        fs::write(path, default_template()).map_err(ConfigError::Io)?;
        return Err(ConfigError::WroteTemplate);
    }
    let text = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let entries = parse_key_values(&text);
    let defaults = Config::default();

    Ok(Config {
        server_name: entries.get("SERVER_NAME").cloned().unwrap_or(defaults.server_name),
        server_code: entries.get("SERVER_CODE").cloned().unwrap_or(defaults.server_code),
        listen_port: parsed_or(&entries, "GAME_SERVER_PORT", defaults.listen_port),
        finder_address: entries.get("FINDER_ADDRESS").cloned().unwrap_or(defaults.finder_address),
        finder_port: parsed_or(&entries, "FINDER_PORT", defaults.finder_port),
        map_width: parsed_or(&entries, "MAP_WIDTH", defaults.map_width),
        map_height: parsed_or(&entries, "MAP_HEIGHT", defaults.map_height),
        max_players: parsed_or(&entries, "MAX_PLAYERS", defaults.max_players),
        player_start_size_percentage: parsed_or(
            &entries,
            "PLAYER_START_SIZE_PERCENTAGE",
            defaults.player_start_size_percentage,
        ),
        player_max_size_percentage: parsed_or(
            &entries,
            "PLAYER_MAX_SIZE_PERCENTAGE",
            defaults.player_max_size_percentage,
        ),
        food_percentage: parsed_or(&entries, "FOOD_PERCENTAGE", defaults.food_percentage),
        food_spawn_per_tick: parsed_or(&entries, "FOOD_SPAWN_PER_TICK", defaults.food_spawn_per_tick),
        growth_rate_food: parsed_or(&entries, "GROWTH_RATE_FOOD", defaults.growth_rate_food),
        growth_rate_player: parsed_or(&entries, "GROWTH_RATE_PLAYER", defaults.growth_rate_player),
        move_speed_base: parsed_or(&entries, "MOVE_SPEED_BASE", defaults.move_speed_base),
        ping_timeout_seconds: parsed_or(&entries, "PING_TIMEOUT_SECONDS", defaults.ping_timeout_seconds),
        inactivity_timeout_seconds: parsed_or(
            &entries,
            "INACTIVITY_TIMEOUT_SECONDS",
            defaults.inactivity_timeout_seconds,
        ),
    })
}

fn parsed_or<T: std::str::FromStr>(entries: &HashMap<String, String>, key: &str, default: T) -> T {
    entries.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_key_values(text: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            out.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    out
}

/// Derives the sizes and food count that everything else in the simulation
/// is scaled by, following the same formulas as the reference server.
pub fn world_config(cfg: &Config) -> WorldConfig {
    let player_start_size = (cfg.map_width.min(cfg.map_height)) * cfg.player_start_size_percentage;
    let max_player_size = (cfg.map_width.min(cfg.map_height)) * cfg.player_max_size_percentage;
    let min_player_size = player_start_size * 0.5;
    let food_size = player_start_size * 0.25;

    let food_area = std::f64::consts::PI * food_size * food_size;
    let raw_max_food = ((cfg.map_width * cfg.map_height * cfg.food_percentage) / food_area).floor() as i64;
    let max_food = raw_max_food.clamp(10, 10_000) as usize;

    WorldConfig {
        map_width: cfg.map_width,
        map_height: cfg.map_height,
        max_players: cfg.max_players,
        player_start_size,
        max_player_size,
        min_player_size,
        food_size,
        max_food,
        food_spawn_per_tick: cfg.food_spawn_per_tick.max(1),
        ping_timeout_seconds: cfg.ping_timeout_seconds,
        inactivity_timeout_seconds: cfg.inactivity_timeout_seconds,
        move_speed_base: cfg.move_speed_base,
        growth_rate_food: cfg.growth_rate_food,
        growth_rate_player: cfg.growth_rate_player,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_template_and_errors() {
        let dir = std::env::temp_dir().join(format!("motile-config-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("server.conf");
        let _ = fs::remove_file(&path);
        let result = load(&path);
        assert!(matches!(result, Err(ConfigError::WroteTemplate)));
        assert!(path.exists());
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("FOOD_PERCENTAGE=0.05"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn template_text_and_in_memory_defaults_genuinely_diverge() {
        let defaults = Config::default();
        assert_eq!(defaults.food_percentage, 0.01);
        assert!(default_template().contains("FOOD_PERCENTAGE=0.05"));
        assert_eq!(defaults.server_name, "A Blob Game Server!");
        assert!(default_template().contains("SERVER_NAME=A Blob Game Server\n"));
    }

    #[test]
    fn existing_file_overrides_only_present_keys() {
        let dir = std::env::temp_dir().join(format!("motile-config-test-partial-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("server.conf");
        fs::write(&path, "MAX_PLAYERS=5\n# a comment\nMAP_WIDTH=500\n").unwrap();
        let cfg = load(&path).unwrap();
        assert_eq!(cfg.max_players, 5);
        assert_eq!(cfg.map_width, 500.0);
        assert_eq!(cfg.move_speed_base, Config::default().move_speed_base);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn game_server_port_and_percentage_keys_are_recognized() {
        let dir = std::env::temp_dir().join(format!("motile-config-test-ports-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("server.conf");
        fs::write(
            &path,
            "GAME_SERVER_PORT=9001\nPLAYER_START_SIZE_PERCENTAGE=0.02\nPLAYER_MAX_SIZE_PERCENTAGE=0.2\nFOOD_SPAWN_PER_TICK=9\n",
        )
        .unwrap();
        let cfg = load(&path).unwrap();
        assert_eq!(cfg.listen_port, 9001);
        assert_eq!(cfg.player_start_size_percentage, 0.02);
        assert_eq!(cfg.player_max_size_percentage, 0.2);
        assert_eq!(cfg.food_spawn_per_tick, 9);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn max_food_is_clamped_into_bounds() {
        let mut cfg = Config::default();
        cfg.map_width = 10.0;
        cfg.map_height = 10.0;
        cfg.food_percentage = 0.0001;
        let wc = world_config(&cfg);
        assert!(wc.max_food >= 10);
    }
}
