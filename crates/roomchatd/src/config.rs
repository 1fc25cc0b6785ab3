//! Daemon configuration.
//!
//! Settings come from an optional TOML file; every field has a default so an
//! empty file (or no file at all) is a valid configuration. The listen address
//! can additionally be overridden from the environment.

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "ROOMCHAT_CONFIG";

/// Environment variable overriding `listen_addr`.
pub const LISTEN_ENV: &str = "ROOMCHAT_LISTEN";

/// Default chat listener address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Recipients of the "joined the chat" / "left the chat" notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeScope {
    /// Members of the session's room. A session outside any room still sees
    /// its own joined notice.
    #[default]
    Room,
    /// Every live session.
    Global,
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the chat listener binds.
    pub listen_addr: SocketAddr,

    /// Address of the read-only status reporter; disabled when unset.
    pub status_addr: Option<SocketAddr>,

    /// Who receives join/leave notices.
    pub notice_scope: NoticeScope,

    /// Room new sessions start in; none when unset.
    pub default_room: Option<String>,

    /// Pending writes buffered per session before fan-out starts dropping.
    pub outbox_capacity: usize,

    /// Upper bound for a single socket write, in seconds.
    pub write_timeout_secs: u64,

    /// Longest accepted inbound line, in bytes, excluding the terminator.
    pub max_line_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            status_addr: None,
            notice_scope: NoticeScope::default(),
            default_room: None,
            outbox_capacity: 64,
            write_timeout_secs: 10,
            max_line_length: 4096,
        }
    }
}

impl Config {
    /// Loads configuration using the standard lookup order.
    ///
    /// 1. `path`, if given (must exist)
    /// 2. `$ROOMCHAT_CONFIG`, if set (must exist)
    /// 3. `<config_dir>/roomchat/roomchatd.toml`, if it exists
    /// 4. built-in defaults
    ///
    /// `$ROOMCHAT_LISTEN` then overrides `listen_addr`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        if let Ok(addr) = env::var(LISTEN_ENV) {
            config.listen_addr = parse_addr(&addr)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that deserialize fine but cannot be served.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbox_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "outbox_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.write_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "write_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid {
                field: "max_line_length",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(room) = &self.default_room {
            roomchat_core::RoomName::new(room.as_str()).map_err(|e| ConfigError::Invalid {
                field: "default_room",
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// Returns `<config_dir>/roomchat/roomchatd.toml`, if a config dir exists.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("roomchat").join("roomchatd.toml"))
}

/// Parses a socket address from user input.
pub fn parse_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress(value.to_string()))
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid socket address: {0}")]
    InvalidAddress(String),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
