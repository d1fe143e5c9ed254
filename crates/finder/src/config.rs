//! The Discovery Service's own `KEY=VALUE` configuration. The reference
//! implementation this service is descended from has no config file at all
//! — its listen port and timeout are compiled-in constants. A config file
//! is added here for consistency with the Game Server's ambient stack, but
//! unlike the Game Server's, a missing file is not fatal: it falls back to
//! the compiled-in defaults and logs that it did so, since there is no
//! per-install tuning this service strictly needs before it can run.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub listen_port: u16,
    pub server_timeout_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config { listen_port: 7777, server_timeout_seconds: 60, sweep_interval_seconds: 10 }
    }
}

pub fn load(path: &Path) -> Config {
    let defaults = Config::default();
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => return defaults,
    };
    let entries = parse_key_values(&text);
    Config {
        listen_port: parsed_or(&entries, "FINDER_PORT", defaults.listen_port),
        server_timeout_seconds: parsed_or(&entries, "SERVER_TIMEOUT_SECONDS", defaults.server_timeout_seconds),
        sweep_interval_seconds: parsed_or(&entries, "SWEEP_INTERVAL_SECONDS", defaults.sweep_interval_seconds),
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load(Path::new("/nonexistent/finder.conf"));
        assert_eq!(cfg.listen_port, 7777);
        assert_eq!(cfg.server_timeout_seconds, 60);
    }

    #[test]
    fn present_file_overrides_named_keys() {
        let dir = std::env::temp_dir().join(format!("motile-finder-config-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("finder.conf");
        fs::write(&path, "FINDER_PORT=9999\n").unwrap();
        let cfg = load(&path);
        assert_eq!(cfg.listen_port, 9999);
        assert_eq!(cfg.server_timeout_seconds, 60);
        let _ = fs::remove_dir_all(&dir);
    }
}
