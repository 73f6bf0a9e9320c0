use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/chat_sync.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the remote store, without a trailing slash.
    pub api_base_url: String,
    /// Websocket URL of the relay.
    pub relay_url: String,
    /// Address the `relay` command binds to.
    pub relay_listen_addr: String,
    pub refresh_debounce_ms: u64,
    pub session_db: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5002".to_string(),
            relay_url: "ws://localhost:5002/ws".to_string(),
            relay_listen_addr: "0.0.0.0:5002".to_string(),
            refresh_debounce_ms: 500,
            session_db: "data/session.db".to_string(),
        }
    }
}

impl AppConfig {
    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
    }

    /// Applies `CHAT_SYNC_*` variables on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CHAT_SYNC_API_URL") {
            self.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("CHAT_SYNC_RELAY_URL") {
            self.relay_url = url;
        }
        if let Some(addr) = lookup("CHAT_SYNC_RELAY_ADDR") {
            self.relay_listen_addr = addr;
        }
    }
}

impl AppConfig {
    /// Reads `path`, falling back to defaults when the file is absent or
    /// unreadable. Fields missing from the file keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("No config at {}; using defaults", path.display());
                return Self::default();
            }
            Err(err) => {
                log::warn!("Cannot read config {}: {err}; using defaults", path.display());
                return Self::default();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|err| {
            log::warn!("Ignoring invalid config {}: {err}", path.display());
            Self::default()
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)
    }
}
