//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the swap
//! coordinator. Configuration covers the TCP listen endpoint and the location
//! of the durable command journal.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all service settings.
///
/// This structure holds configuration for:
/// - The TCP server endpoint clients connect to
/// - Durable storage (command journal location)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// TCP server configuration (listen host and port)
    #[serde(default)]
    pub server: ServerConfig,
    /// Durable storage configuration (command journal)
    #[serde(default)]
    pub storage: StorageConfig,
}

/// TCP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind the listener to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to bind the listener to (must be non-zero)
    #[serde(default)]
    pub port: u16,
}

/// Durable storage configuration.
///
/// The journal is the sole persistence mechanism: every accepted mutation
/// command is appended to it and replayed at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the append-only command journal
    #[serde(default = "default_journal_path")]
    pub journal_path: PathBuf,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("info.dat")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            journal_path: default_journal_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

// ============================================================================
// CONFIGURATION LOADING AND MANAGEMENT
// ============================================================================

impl Config {
    /// Loads configuration from the TOML file.
    ///
    /// The config path is taken from the `SWAP_COORDINATOR_CONFIG_PATH`
    /// environment variable when set, otherwise
    /// `config/swap-coordinator.toml`. A missing file is not an error: the
    /// built-in defaults are used and the listen port must then be supplied
    /// on the command line.
    ///
    /// # Returns
    ///
    /// - `Ok(Config)` - Successfully loaded (or defaulted) configuration
    /// - `Err(anyhow::Error)` - The file exists but could not be read or parsed
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("SWAP_COORDINATOR_CONFIG_PATH")
            .unwrap_or_else(|_| "config/swap-coordinator.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Validates the configuration.
    ///
    /// The listener refuses to start without an explicit port, so port 0 is
    /// rejected here before any socket is opened.
    ///
    /// # Returns
    ///
    /// - `Ok(())` - Configuration is valid
    /// - `Err(anyhow::Error)` - No usable listen port
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!(
                "Configuration error: need set a port (server.port is 0)"
            ));
        }
        Ok(())
    }

    /// Address string the listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
