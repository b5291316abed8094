use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use ih_backend::{function_url, ChatClient, ChatError};

use crate::rooms::{ChatRoom, RestStore, RoomChannel, RoomError, StoreError, DEFAULT_HISTORY_LIMIT};

const BACKEND_URL_ENV: &str = "IHUMURE_BACKEND_URL";
const PUBLISHABLE_KEY_ENV: &str = "IHUMURE_PUBLISHABLE_KEY";

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub assistant: AssistantConfig,
    pub rooms: RoomsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the managed backend project.
    pub url: Option<String>,
    /// Command to run to get the publishable key (e.g., "pass show ihumure").
    /// The command is run via `sh -c`.
    pub publishable_key_cmd: Option<String>,
    /// Whole-request timeout, body included.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            publishable_key_cmd: None,
            timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

impl BackendConfig {
    /// Resolve the backend URL from IHUMURE_BACKEND_URL or the config file.
    pub fn resolve_url(&self) -> io::Result<String> {
        std::env::var(BACKEND_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.url.clone())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "IHUMURE_BACKEND_URL not set and no backend.url configured",
                )
            })
    }

    /// Resolve the publishable key from publishable_key_cmd or the
    /// IHUMURE_PUBLISHABLE_KEY env var.
    pub fn resolve_publishable_key(&self) -> io::Result<String> {
        if let Some(cmd) = &self.publishable_key_cmd {
            let output = Command::new("sh").arg("-c").arg(cmd).output()?;

            if output.status.success() {
                let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !key.is_empty() {
                    return Ok(key);
                }
            }
        }

        std::env::var(PUBLISHABLE_KEY_ENV).map_err(|_| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "IHUMURE_PUBLISHABLE_KEY not set and no publishable_key_cmd configured",
            )
        })
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssistantConfig {
    /// Name of the backend function serving chat completions.
    pub function: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            function: "chat".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoomsConfig {
    /// Number of recent messages loaded when entering a room.
    pub history_limit: usize,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive. RUST_LOG takes precedence.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

/// Why a chat client could not be built from configuration.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("{0}")]
    Missing(#[from] io::Error),
    #[error(transparent)]
    Client(#[from] ChatError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Room(#[from] RoomError),
}

impl Config {
    pub fn load_or_default() -> Self {
        Self::load_from(&config_path())
    }

    /// Load from `path`; a missing file yields defaults, a malformed one
    /// warns and yields defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                eprintln!("warning: failed to parse {}: {e}", path.display());
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }

    /// Full URL of the chat function.
    pub fn chat_endpoint(&self) -> io::Result<String> {
        let base = self.backend.resolve_url()?;
        Ok(function_url(&base, &self.assistant.function))
    }

    pub fn chat_client(&self) -> Result<ChatClient, SetupError> {
        let endpoint = self.chat_endpoint()?;
        let key = self.backend.resolve_publishable_key()?;
        Ok(ChatClient::with_timeouts(
            endpoint,
            key,
            Duration::from_secs(self.backend.timeout_secs),
            Duration::from_secs(self.backend.connect_timeout_secs),
        )?)
    }

    /// REST store for room data on the configured backend.
    pub fn room_store(&self) -> Result<RestStore, SetupError> {
        let base = self.backend.resolve_url()?;
        let key = self.backend.resolve_publishable_key()?;
        Ok(RestStore::new(base, key)?)
    }

    /// Open a room on the configured backend, loading `rooms.history_limit`
    /// messages once joined.
    pub async fn open_room<C: RoomChannel>(
        &self,
        channel: C,
        room_id: &str,
        user_id: &str,
    ) -> Result<ChatRoom<RestStore, C>, SetupError> {
        let store = self.room_store()?;
        Ok(ChatRoom::open_with_limit(store, channel, room_id, user_id, self.rooms.history_limit).await?)
    }
}

pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("ihumure").join("config.toml")
}
