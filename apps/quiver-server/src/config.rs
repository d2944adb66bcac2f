//! Relay configuration management.
//!
//! Configuration is stored as TOML:
//! - `$QUIVER_CONFIG` when set
//! - Linux: `~/.config/quiver/server.toml`
//! - Windows: `%APPDATA%/quiver/server.toml`

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use quiver_chat_server::{KeepAlive, OriginPolicy, ServerConfig};
use quiver_protocol::constants::{
    DEFAULT_PORT, OUTBOUND_QUEUE_SIZE, WS_IDLE_TIMEOUT, WS_MAX_MESSAGE_SIZE, WS_PATH,
    WS_PING_PERIOD,
};
use serde::{Deserialize, Serialize};

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address to bind.
    #[serde(default = "default_bind")]
    pub bind: IpAddr,

    /// Listening port (0 = auto-assign).
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket upgrade path.
    #[serde(default = "default_path")]
    pub path: String,

    /// Messages buffered per client before it is dropped as too slow.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds between keep-alive pings (0 = never ping).
    #[serde(default = "default_ping_period")]
    pub ping_period_secs: u64,

    /// Seconds of silence before a client is disconnected (0 = never).
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Largest inbound message in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Which browser origins may connect.
    #[serde(default)]
    pub origin: OriginPolicy,
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_path() -> String {
    WS_PATH.into()
}

fn default_queue_capacity() -> usize {
    OUTBOUND_QUEUE_SIZE
}

fn default_ping_period() -> u64 {
    WS_PING_PERIOD.as_secs()
}

fn default_idle_timeout() -> u64 {
    WS_IDLE_TIMEOUT.as_secs()
}

fn default_max_message_size() -> usize {
    WS_MAX_MESSAGE_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            path: default_path(),
            queue_capacity: default_queue_capacity(),
            ping_period_secs: default_ping_period(),
            idle_timeout_secs: default_idle_timeout(),
            max_message_size: default_max_message_size(),
            origin: OriginPolicy::default(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads configuration from `path`, writing defaults there if missing.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save_to(path)?;
            config
        };
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.path.starts_with('/'), "path must start with '/': {}", self.path);
        anyhow::ensure!(self.queue_capacity > 0, "queue_capacity must be at least 1");
        anyhow::ensure!(self.max_message_size > 0, "max_message_size must be at least 1");
        // Clients that only listen stay alive by answering pings.
        anyhow::ensure!(
            self.idle_timeout_secs == 0
                || (self.ping_period_secs > 0 && self.ping_period_secs < self.idle_timeout_secs),
            "ping_period_secs ({}) must be non-zero and below idle_timeout_secs ({})",
            self.ping_period_secs,
            self.idle_timeout_secs
        );
        if matches!(self.origin, OriginPolicy::Any) {
            tracing::warn!("origin checks disabled: any web page may connect");
        }
        Ok(())
    }

    /// Acceptor settings derived from this configuration.
    pub fn server_config(&self) -> ServerConfig {
        let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));
        ServerConfig {
            bind: self.bind,
            port: self.port,
            path: self.path.clone(),
            origin: self.origin.clone(),
            queue_capacity: self.queue_capacity,
            keepalive: KeepAlive {
                ping_period: secs(self.ping_period_secs),
                idle_timeout: secs(self.idle_timeout_secs),
            },
            max_message_size: self.max_message_size,
        }
    }
}

/// Returns the configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("QUIVER_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("quiver")
            .join("server.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("quiver").join("server.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/quiver/server.toml"))
    }
}
