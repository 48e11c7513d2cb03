//! Configuration file support for masterlink.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (MASTERLINK_*)
//! 3. Local config file (./masterlink.toml)
//! 4. Global config file (~/.config/masterlink/config.toml)

use directories::ProjectDirs;
use log::{debug, warn};
use masterlink::CommunicatorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial port of the master (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
}

/// Communicator tunables. Unset fields keep the library defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Default command timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Bounded wait of one reader iteration in milliseconds.
    pub read_timeout_ms: Option<u64>,
    /// Chunks kept in the passthrough buffer.
    pub passthrough_capacity: Option<usize>,
    /// Consecutive timeouts before the master is reported offline.
    pub offline_threshold: Option<u32>,
    /// Kick the master out of CLI mode on start.
    #[serde(default)]
    pub init_master: bool,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Serial connection.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Communicator settings.
    #[serde(default)]
    pub link: LinkConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new("masterlink.toml")) {
            debug!("Loaded local config from masterlink.toml");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse TOML config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "masterlink").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.connection.port.is_some() {
            self.connection.port = other.connection.port;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }

        let link = other.link;
        if link.timeout_ms.is_some() {
            self.link.timeout_ms = link.timeout_ms;
        }
        if link.read_timeout_ms.is_some() {
            self.link.read_timeout_ms = link.read_timeout_ms;
        }
        if link.passthrough_capacity.is_some() {
            self.link.passthrough_capacity = link.passthrough_capacity;
        }
        if link.offline_threshold.is_some() {
            self.link.offline_threshold = link.offline_threshold;
        }
        if link.init_master {
            self.link.init_master = true;
        }
    }

    /// Communicator configuration with the file settings applied.
    pub fn communicator(&self) -> CommunicatorConfig {
        let mut config = CommunicatorConfig::default().with_init_master(self.link.init_master);
        if let Some(ms) = self.link.timeout_ms {
            config = config.with_default_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.link.read_timeout_ms {
            config = config.with_read_timeout(Duration::from_millis(ms));
        }
        if let Some(capacity) = self.link.passthrough_capacity {
            config = config.with_passthrough_capacity(capacity);
        }
        if let Some(threshold) = self.link.offline_threshold {
            config = config.with_offline_threshold(threshold);
        }
        config
    }
}
