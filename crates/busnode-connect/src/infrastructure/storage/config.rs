//! TOML-based configuration for the connection stack.
//!
//! Reads and writes [`BusnodeConfig`] from the platform-appropriate file:
//! - Linux:    `$XDG_CONFIG_HOME/busnode/config.toml` or
//!   `~/.config/busnode/config.toml`
//! - macOS:    `~/Library/Application Support/Busnode/config.toml`
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [discovery]
//! registry_capacity = 3
//! blocklist_capacity = 16
//! min_protocol_version = 0
//! bus_bind_port = 0
//! sweep_window_ms = 5000
//! enable_ipv6 = true
//!
//! [connect]
//! connect_timeout_ms = 10000
//! rx_buffer_size = 1024
//! tx_buffer_size = 1024
//! datagram_segment_size = 1472
//! prefer_datagram = true
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section or a
//! missing key all fall back to the values above.

use std::path::{Path, PathBuf};
use std::time::Duration;

use busnode_core::domain::blocklist::DEFAULT_BLOCKLIST_CAPACITY;
use busnode_core::domain::registry::DEFAULT_CAPACITY;
use busnode_core::protocol::constants::{
    DEFAULT_DATAGRAM_SEGMENT_SIZE, DEFAULT_RX_BUFFER_SIZE, DEFAULT_TX_BUFFER_SIZE,
};
use busnode_core::CandidateRegistry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::net::connector::{ConnectConfig, DEFAULT_CONNECT_TIMEOUT};
use crate::infrastructure::net::discovery::DiscoveryConfig;

/// Why the configuration file could not be read or written.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `XDG_CONFIG_HOME` nor `HOME` is set (or the OS is unsupported).
    #[error("no config directory for this platform")]
    NoPlatformConfigDir,

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid busnode config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot encode busnode config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusnodeConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub connect: ConnectSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Discovery sweep and candidate retention settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoverySettings {
    /// Best candidates kept per sweep.
    #[serde(default = "default_registry_capacity")]
    pub registry_capacity: usize,
    /// Failed routing-node addresses remembered.
    #[serde(default = "default_blocklist_capacity")]
    pub blocklist_capacity: usize,
    /// Oldest routing-node protocol version accepted.
    #[serde(default)]
    pub min_protocol_version: u32,
    /// Local port for the bus-discovery sockets; 0 lets the OS choose.
    #[serde(default)]
    pub bus_bind_port: u16,
    /// How long one sweep collects replies.
    #[serde(default = "default_sweep_window_ms")]
    pub sweep_window_ms: u64,
    #[serde(default = "default_true")]
    pub enable_ipv6: bool,
}

/// Transport setup settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectSettings {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_rx_buffer_size")]
    pub rx_buffer_size: usize,
    #[serde(default = "default_tx_buffer_size")]
    pub tx_buffer_size: usize,
    #[serde(default = "default_datagram_segment_size")]
    pub datagram_segment_size: usize,
    #[serde(default = "default_true")]
    pub prefer_datagram: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_registry_capacity() -> usize {
    DEFAULT_CAPACITY
}
fn default_blocklist_capacity() -> usize {
    DEFAULT_BLOCKLIST_CAPACITY
}
fn default_sweep_window_ms() -> u64 {
    5000
}
fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}
fn default_rx_buffer_size() -> usize {
    DEFAULT_RX_BUFFER_SIZE
}
fn default_tx_buffer_size() -> usize {
    DEFAULT_TX_BUFFER_SIZE
}
fn default_datagram_segment_size() -> usize {
    DEFAULT_DATAGRAM_SEGMENT_SIZE
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            registry_capacity: default_registry_capacity(),
            blocklist_capacity: default_blocklist_capacity(),
            min_protocol_version: 0,
            bus_bind_port: 0,
            sweep_window_ms: default_sweep_window_ms(),
            enable_ipv6: default_true(),
        }
    }
}

impl Default for ConnectSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            rx_buffer_size: default_rx_buffer_size(),
            tx_buffer_size: default_tx_buffer_size(),
            datagram_segment_size: default_datagram_segment_size(),
            prefer_datagram: default_true(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl BusnodeConfig {
    pub fn to_discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            min_protocol_version: self.discovery.min_protocol_version,
            bus_bind_port: self.discovery.bus_bind_port,
            enable_ipv6: self.discovery.enable_ipv6,
        }
    }

    pub fn to_connect_config(&self) -> ConnectConfig {
        ConnectConfig {
            connect_timeout: Duration::from_millis(self.connect.connect_timeout_ms),
            rx_buffer_size: self.connect.rx_buffer_size,
            tx_buffer_size: self.connect.tx_buffer_size,
            datagram_segment_size: self.connect.datagram_segment_size,
            prefer_datagram: self.connect.prefer_datagram,
        }
    }

    /// An empty registry sized and filtered per the discovery settings.
    pub fn build_registry(&self) -> CandidateRegistry {
        CandidateRegistry::new(self.discovery.registry_capacity)
            .with_min_protocol_version(self.discovery.min_protocol_version)
            .with_blocklist_capacity(self.discovery.blocklist_capacity)
    }

    pub fn sweep_window(&self) -> Duration {
        Duration::from_millis(self.discovery.sweep_window_ms)
    }
}

// ── Files ─────────────────────────────────────────────────────────────────────

/// Directory holding `config.toml` on this platform.
///
/// # Errors
///
/// [`ConfigError::NoPlatformConfigDir`] if the environment gives no base
/// directory.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// `<config_dir>/config.toml`.
///
/// # Errors
///
/// See [`config_dir`].
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the platform directory.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<BusnodeConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads the config at `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// [`ConfigError::Parse`] for malformed TOML; [`ConfigError::Io`] for any
/// read failure except a missing file.
pub fn load_config_from(path: &Path) -> Result<BusnodeConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BusnodeConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// [`ConfigError::Serialize`] if encoding fails, [`ConfigError::Io`] if the
/// directory or file cannot be written.
pub fn save_config_to(path: &Path, config: &BusnodeConfig) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `busnode`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("busnode"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("Busnode"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_documented_values() {
        // Arrange / Act
        let cfg = BusnodeConfig::default();

        // Assert
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.discovery.registry_capacity, 3);
        assert_eq!(cfg.discovery.blocklist_capacity, 16);
        assert_eq!(cfg.discovery.sweep_window_ms, 5000);
        assert_eq!(cfg.connect.connect_timeout_ms, 10_000);
        assert_eq!(cfg.connect.datagram_segment_size, 1472);
        assert!(cfg.connect.prefer_datagram);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: BusnodeConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, BusnodeConfig::default());
    }

    #[test]
    fn test_partial_section_overrides_only_named_keys() {
        // Arrange
        let toml_str = r#"
[discovery]
registry_capacity = 5
min_protocol_version = 11
"#;

        // Act
        let cfg: BusnodeConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.discovery.registry_capacity, 5);
        assert_eq!(cfg.discovery.min_protocol_version, 11);
        assert_eq!(cfg.discovery.blocklist_capacity, 16);
        assert_eq!(cfg.connect, ConnectSettings::default());
    }

    #[test]
    fn test_conversions_carry_settings() {
        let mut cfg = BusnodeConfig::default();
        cfg.connect.connect_timeout_ms = 250;
        cfg.connect.prefer_datagram = false;
        cfg.discovery.bus_bind_port = 9956;
        cfg.discovery.enable_ipv6 = false;

        let connect = cfg.to_connect_config();
        let discovery = cfg.to_discovery_config();

        assert_eq!(connect.connect_timeout, Duration::from_millis(250));
        assert!(!connect.prefer_datagram);
        assert_eq!(discovery.bus_bind_port, 9956);
        assert!(!discovery.enable_ipv6);
    }

    #[test]
    fn test_build_registry_applies_capacity_and_minimum_version() {
        let mut cfg = BusnodeConfig::default();
        cfg.discovery.registry_capacity = 7;
        cfg.discovery.min_protocol_version = 12;

        let registry = cfg.build_registry();

        assert_eq!(registry.capacity(), 7);
        assert_eq!(registry.min_protocol_version(), 12);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let result = load_config_from(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();

        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(cfg, BusnodeConfig::default());
    }

    #[test]
    fn test_save_then_load_round_trips_through_nested_dir() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = BusnodeConfig::default();
        cfg.logging.level = "debug".to_string();
        cfg.discovery.sweep_window_ms = 1200;

        // Act
        save_config_to(&path, &cfg).unwrap();
        let loaded = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"), "got {path:?}");
            assert!(path.parent().map_or(false, |p| p.ends_with("busnode") || p.ends_with("Busnode")));
        }
    }
}
