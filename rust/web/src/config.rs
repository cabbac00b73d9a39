//! Server configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `CARDROOM_*` environment variables. The binary applies command-line flags last.
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::logging::LogFormat;

pub const DEFAULT_MIN_BET: u32 = 10;
pub const DEFAULT_BET_SPREAD: u32 = 100;
pub const DEFAULT_STARTING_BALANCE: u32 = cardroom_engine::player::STARTING_BALANCE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Timing and sizing of websocket connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsConfig {
    /// Upper bound for one write to the socket.
    pub write_wait: Duration,
    /// Idle time after which a silent peer is dropped.
    pub pong_wait: Duration,
    /// Interval between server pings; must be shorter than `pong_wait`.
    pub ping_period: Duration,
    pub max_message_size: usize,
    /// Capacity of each connection's outbound queue.
    pub send_queue: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(30),
            max_message_size: 512 * 1024,
            send_queue: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// SQLite file; `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,
    pub starting_balance: u32,
    pub default_min_bet: u32,
    pub default_max_bet: u32,
    pub log_format: LogFormat,
    pub ws: WsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            database_path: None,
            starting_balance: DEFAULT_STARTING_BALANCE,
            default_min_bet: DEFAULT_MIN_BET,
            default_max_bet: DEFAULT_MIN_BET * DEFAULT_BET_SPREAD,
            log_format: LogFormat::Text,
            ws: WsConfig::default(),
        }
    }
}

/// Shape of the optional TOML file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    database_path: Option<PathBuf>,
    starting_balance: Option<u32>,
    default_min_bet: Option<u32>,
    default_max_bet: Option<u32>,
    log_format: Option<LogFormat>,
    write_wait_secs: Option<u64>,
    pong_wait_secs: Option<u64>,
    ping_period_secs: Option<u64>,
    max_message_size: Option<usize>,
    send_queue: Option<usize>,
}

impl ServerConfig {
    /// Loopback on an ephemeral port, in-memory storage.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            ..Self::default()
        }
    }

    /// Defaults, then `CARDROOM_CONFIG` (or `path`) as TOML, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        let env_path = std::env::var_os("CARDROOM_CONFIG").map(PathBuf::from);
        if let Some(file) = path.map(Path::to_path_buf).or(env_path) {
            cfg.apply_file(&file)?;
        }
        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.apply_toml(&raw)
    }

    pub fn apply_toml(&mut self, raw: &str) -> Result<(), ConfigError> {
        let file: FileConfig = toml::from_str(raw)?;
        if let Some(v) = file.host {
            self.host = v;
        }
        if let Some(v) = file.port {
            self.port = v;
        }
        if let Some(v) = file.database_path {
            self.database_path = Some(v);
        }
        if let Some(v) = file.starting_balance {
            self.starting_balance = v;
        }
        if let Some(v) = file.default_min_bet {
            self.default_min_bet = v;
        }
        if let Some(v) = file.default_max_bet {
            self.default_max_bet = v;
        }
        if let Some(v) = file.log_format {
            self.log_format = v;
        }
        if let Some(v) = file.write_wait_secs {
            self.ws.write_wait = Duration::from_secs(v);
        }
        if let Some(v) = file.pong_wait_secs {
            self.ws.pong_wait = Duration::from_secs(v);
        }
        if let Some(v) = file.ping_period_secs {
            self.ws.ping_period = Duration::from_secs(v);
        }
        if let Some(v) = file.max_message_size {
            self.ws.max_message_size = v;
        }
        if let Some(v) = file.send_queue {
            self.ws.send_queue = v;
        }
        Ok(())
    }

    /// Applies `CARDROOM_*` variables read through `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("CARDROOM_HOST") {
            self.host = v;
        }
        if let Some(v) = get("CARDROOM_PORT") {
            self.port = parse_env("CARDROOM_PORT", &v)?;
        }
        if let Some(v) = get("CARDROOM_DATABASE") {
            self.database_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CARDROOM_STARTING_BALANCE") {
            self.starting_balance = parse_env("CARDROOM_STARTING_BALANCE", &v)?;
        }
        if let Some(v) = get("CARDROOM_MIN_BET") {
            self.default_min_bet = parse_env("CARDROOM_MIN_BET", &v)?;
        }
        if let Some(v) = get("CARDROOM_MAX_BET") {
            self.default_max_bet = parse_env("CARDROOM_MAX_BET", &v)?;
        }
        if let Some(v) = get("CARDROOM_LOG_FORMAT") {
            self.log_format = v.parse().map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.default_min_bet == 0 {
            return Err(ConfigError::Invalid("default_min_bet must be > 0".into()));
        }
        if self.default_max_bet < self.default_min_bet {
            return Err(ConfigError::Invalid(format!(
                "default_max_bet ({}) must be >= default_min_bet ({})",
                self.default_max_bet, self.default_min_bet
            )));
        }
        if self.starting_balance == 0 {
            return Err(ConfigError::Invalid("starting_balance must be > 0".into()));
        }
        if self.ws.ping_period >= self.ws.pong_wait {
            return Err(ConfigError::Invalid(
                "ping_period must be shorter than pong_wait".into(),
            ));
        }
        if self.ws.write_wait.is_zero() {
            return Err(ConfigError::Invalid("write_wait must be > 0".into()));
        }
        if self.ws.send_queue == 0 || self.ws.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "send_queue and max_message_size must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key}: cannot parse `{raw}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let cfg = ServerConfig::default();
        cfg.validate().expect("defaults validate");
        assert_eq!(cfg.default_max_bet, 1_000);
        assert_eq!(cfg.starting_balance, 1_000);
        assert_eq!(cfg.ws.send_queue, 256);
        assert_eq!(cfg.ws.max_message_size, 512 * 1024);
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let mut cfg = ServerConfig::default();
        cfg.apply_toml(
            r#"
            port = 9000
            database_path = "/tmp/cardroom.db"
            log_format = "json"
            pong_wait_secs = 90
            "#,
        )
        .expect("parse");

        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.database_path, Some(PathBuf::from("/tmp/cardroom.db")));
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.ws.pong_wait, Duration::from_secs(90));
        assert_eq!(cfg.ws.ping_period, Duration::from_secs(30));
    }

    #[test]
    fn unknown_toml_keys_are_rejected() {
        let mut cfg = ServerConfig::default();
        assert!(matches!(
            cfg.apply_toml("colour = \"green\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_wins_over_file() {
        let mut cfg = ServerConfig::default();
        cfg.apply_toml("port = 9000\ndefault_min_bet = 5").unwrap();

        let env: HashMap<&str, &str> = [
            ("CARDROOM_PORT", "9100"),
            ("CARDROOM_MIN_BET", ""),
            ("CARDROOM_STARTING_BALANCE", "2500"),
        ]
        .into_iter()
        .collect();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.default_min_bet, 5, "empty env values are ignored");
        assert_eq!(cfg.starting_balance, 2500);
    }

    #[test]
    fn bad_env_values_are_reported() {
        let mut cfg = ServerConfig::default();
        let err = cfg
            .apply_env(|k| (k == "CARDROOM_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("CARDROOM_PORT"));
    }

    #[test]
    fn validate_rejects_inconsistent_values() {
        let mut cfg = ServerConfig::default();
        cfg.default_max_bet = 5;
        assert!(cfg.validate().is_err());

        let mut cfg = ServerConfig::default();
        cfg.ws.ping_period = cfg.ws.pong_wait;
        assert!(cfg.validate().is_err());

        let mut cfg = ServerConfig::default();
        cfg.default_min_bet = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cardroom.toml");
        std::fs::write(&path, "host = \"0.0.0.0\"\nstarting_balance = 750\n").unwrap();

        let mut cfg = ServerConfig::default();
        cfg.apply_file(&path).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.starting_balance, 750);

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            cfg.apply_file(&missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
