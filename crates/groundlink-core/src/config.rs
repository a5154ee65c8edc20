//! Configuration system for groundlink.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $GROUNDLINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/groundlink/config.toml
//!   3. ~/.config/groundlink/config.toml

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::wire::{Endpoint, GCS_COMPONENT_ID, GCS_SYSTEM_ID};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundlinkConfig {
    pub identity: IdentityConfig,
    pub link: LinkConfig,
    pub timing: TimingConfig,
    pub api: ApiConfig,
    pub mission: MissionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Our system id on the link.
    pub system_id: u8,
    /// Our component id on the link.
    pub component_id: u8,
    /// Vehicle addressed before its heartbeat has been seen.
    pub default_target_system: u8,
    pub default_target_component: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Udp,
    Tcp,
    Serial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Transport used by `auto_connect` and by `connect` with no argument.
    pub kind: LinkKind,
    /// Local UDP port the autopilot sends to.
    pub udp_port: u16,
    pub tcp_host: String,
    pub tcp_port: u16,
    pub serial_path: String,
    pub serial_baud: u32,
    /// Connect as soon as the daemon starts.
    pub auto_connect: bool,
}

/// All intervals in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub heartbeat_interval_ms: u64,
    /// No vehicle heartbeat for this long raises a stale warning.
    pub stale_after_ms: u64,
    pub command_ack_timeout_ms: u64,
    /// Deadline for each mission transfer step.
    pub mission_step_timeout_ms: u64,
    /// Resends of the last mission message before the transfer fails.
    pub mission_retries: u8,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Local HTTP port (bound to 127.0.0.1).
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    /// Used by `takeoff` when no altitude is given, metres.
    pub default_takeoff_altitude: f32,
    /// Default survey altitude, metres.
    pub default_altitude: f32,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            system_id: GCS_SYSTEM_ID,
            component_id: GCS_COMPONENT_ID,
            default_target_system: 1,
            default_target_component: 1,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            kind: LinkKind::Udp,
            udp_port: 14550,
            tcp_host: "127.0.0.1".to_string(),
            tcp_port: 5760,
            serial_path: "/dev/ttyUSB0".to_string(),
            serial_baud: 115_200,
            auto_connect: false,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1000,
            stale_after_ms: 5000,
            command_ack_timeout_ms: 3000,
            mission_step_timeout_ms: 3000,
            mission_retries: 1,
            connect_timeout_ms: 5000,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 14580 }
    }
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            default_takeoff_altitude: 10.0,
            default_altitude: 50.0,
        }
    }
}

impl IdentityConfig {
    pub fn local(&self) -> Endpoint {
        Endpoint::new(self.system_id, self.component_id)
    }

    pub fn default_target(&self) -> Endpoint {
        Endpoint::new(self.default_target_system, self.default_target_component)
    }
}

impl TimingConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn command_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.command_ack_timeout_ms)
    }

    pub fn mission_step_timeout(&self) -> Duration {
        Duration::from_millis(self.mission_step_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

pub fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("groundlink")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl GroundlinkConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            GroundlinkConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("GROUNDLINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&GroundlinkConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply GROUNDLINK_* overrides. `lookup` is `std::env::var` outside tests.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let flag = |v: String| v == "true" || v == "1";

        if let Some(v) = lookup("GROUNDLINK_LINK__KIND") {
            match v.to_ascii_lowercase().as_str() {
                "udp" => self.link.kind = LinkKind::Udp,
                "tcp" => self.link.kind = LinkKind::Tcp,
                "serial" => self.link.kind = LinkKind::Serial,
                _ => {}
            }
        }
        if let Some(p) = lookup("GROUNDLINK_LINK__UDP_PORT").and_then(|v| v.parse().ok()) {
            self.link.udp_port = p;
        }
        if let Some(v) = lookup("GROUNDLINK_LINK__TCP_HOST") {
            self.link.tcp_host = v;
        }
        if let Some(p) = lookup("GROUNDLINK_LINK__TCP_PORT").and_then(|v| v.parse().ok()) {
            self.link.tcp_port = p;
        }
        if let Some(v) = lookup("GROUNDLINK_LINK__SERIAL_PATH") {
            self.link.serial_path = v;
        }
        if let Some(v) = lookup("GROUNDLINK_LINK__AUTO_CONNECT") {
            self.link.auto_connect = flag(v);
        }
        if let Some(p) = lookup("GROUNDLINK_API__PORT").and_then(|v| v.parse().ok()) {
            self.api.port = p;
        }
        if let Some(id) = lookup("GROUNDLINK_IDENTITY__SYSTEM_ID").and_then(|v| v.parse().ok()) {
            self.identity.system_id = id;
        }
    }
}
