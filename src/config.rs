//! Configuration loading and persistence.
//!
//! Handles reading and writing the pulsewire configuration file. The
//! bearer token is never written to disk; it is supplied via environment
//! variable (or the CLI) and carried as an explicit field so the
//! connection manager receives it at construction rather than reading
//! ambient global state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf};

/// Configuration for the pulsewire client.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Push channel endpoint URL. Treated as opaque; HTTP(S) schemes are
    /// converted to WS(S) at connection time.
    pub server_url: String,
    /// Bearer token - NOT serialized to disk (env var or CLI only). Empty
    /// means the channel is opened anonymously.
    #[serde(skip)]
    pub token: String,
    /// Whether a lost connection schedules a retry. Disabling leaves the
    /// client disconnected after the first failure.
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
}

fn default_auto_reconnect() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "wss://pulsewire.dev/stream".to_string(),
            token: String::new(),
            auto_reconnect: true,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `PULSEWIRE_CONFIG_DIR` overrides the platform config dir (used by
    /// tests and containerized deployments).
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("PULSEWIRE_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("pulsewire")
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file().unwrap_or_else(|_| Self::default());
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(server_url) = std::env::var("PULSEWIRE_SERVER_URL") {
            self.server_url = server_url;
        }

        if let Ok(token) = std::env::var("PULSEWIRE_TOKEN") {
            self.token = token;
        }

        if let Ok(auto_reconnect) = std::env::var("PULSEWIRE_AUTO_RECONNECT") {
            if let Ok(enabled) = auto_reconnect.parse::<bool>() {
                self.auto_reconnect = enabled;
            }
        }
    }

    /// Persists the current configuration to disk.
    /// Note: the token is never saved.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Check if a bearer token is available.
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }
}
