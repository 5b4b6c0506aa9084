//! Client configuration.
//!
//! Config file lives at `~/.config/dapai-chat/client.toml` (the platform
//! config directory). Every field is optional; a missing or broken file
//! yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dapai_sdk::client::{TransportKind, TransportOptions};
use serde::{Deserialize, Serialize};

use crate::render::DEFAULT_RESOLVER_BASE;
use crate::session::SessionTimings;

/// Origin used when none is configured (the chat server's default port).
pub const DEFAULT_ORIGIN: &str = "http://localhost:5000";
/// Server catalog location, relative to the origin.
pub const DEFAULT_CATALOG_PATH: &str = "config/server_config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where the client is "served from": base for the catalog URL, the
    /// fallback server address and the preference namespace.
    pub origin: String,
    pub catalog_path: String,
    /// Prefix for movie embeds; the percent-encoded URL is appended.
    pub resolver_base: String,
    pub catalog_timeout_ms: u64,
    pub transport: TransportConfig,
    pub timings: TimingsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub reconnection_attempts: u32,
    pub reconnection_delay_ms: u64,
    pub timeout_ms: u64,
    pub transports: Vec<TransportKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingsConfig {
    pub logout_grace_ms: u64,
    pub view_swap_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            catalog_path: DEFAULT_CATALOG_PATH.to_string(),
            resolver_base: DEFAULT_RESOLVER_BASE.to_string(),
            catalog_timeout_ms: 10_000,
            transport: TransportConfig::default(),
            timings: TimingsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        let options = TransportOptions::default();
        Self {
            reconnection_attempts: options.reconnection_attempts,
            reconnection_delay_ms: options.reconnection_delay.as_millis() as u64,
            timeout_ms: options.timeout.as_millis() as u64,
            transports: options.transports,
        }
    }
}

impl Default for TimingsConfig {
    fn default() -> Self {
        let timings = SessionTimings::default();
        Self {
            logout_grace_ms: timings.logout_grace.as_millis() as u64,
            view_swap_delay_ms: timings.view_swap_delay.as_millis() as u64,
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dapai-chat")
}

fn config_path() -> PathBuf {
    config_dir().join("client.toml")
}

impl ClientConfig {
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => return c,
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "Bad config file, using defaults"),
                },
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Can't read config file, using defaults"),
            }
        }
        Self::default()
    }

    pub fn save(&self) {
        self.save_to(&config_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        match toml::to_string_pretty(self) {
            Ok(s) => {
                if let Err(e) = std::fs::write(path, s) {
                    tracing::warn!(path = %path.display(), error = %e, "Can't save config");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Can't serialize config"),
        }
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            reconnection_attempts: self.transport.reconnection_attempts,
            reconnection_delay: Duration::from_millis(self.transport.reconnection_delay_ms),
            timeout: Duration::from_millis(self.transport.timeout_ms),
            transports: self.transport.transports.clone(),
        }
    }

    pub fn session_timings(&self) -> SessionTimings {
        SessionTimings {
            logout_grace: Duration::from_millis(self.timings.logout_grace_ms),
            view_swap_delay: Duration::from_millis(self.timings.view_swap_delay_ms),
        }
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }
}
