//! Configuration system for Patrol.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PATROL_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/patrol/config.toml
//!   3. ~/.config/patrol/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::codec::{CodecError, CodecSecret};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatrolConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub codec: CodecConfig,
    pub messaging: MessagingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address the HTTP API binds to.
    pub bind: String,
    /// TCP port for the HTTP API. 0 = OS-assigned.
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local maps. Lost on restart.
    #[default]
    Memory,
    /// Single SQLite database file.
    Sqlite,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file used by the sqlite backend.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Hex-encoded 32-byte master secret for opaque ids.
    /// Empty = generate an ephemeral secret at startup.
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingSettings {
    /// Max content length, in characters, for a multi-recipient send.
    pub multi_send_max_chars: usize,
    /// Max content length, in characters, for a single send.
    pub single_send_max_chars: usize,
    /// Capacity of the realtime notification channel.
    pub notification_buffer: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 9101,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: data_dir().join("patrol.db"),
        }
    }
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            multi_send_max_chars: 5000,
            single_send_max_chars: 2000,
            notification_buffer: 256,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("patrol")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("patrol")
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
    #[error("codec secret: {0}")]
    Secret(#[from] CodecError),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PatrolConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            PatrolConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PATROL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write a default config if none exists. The written file carries a
    /// freshly generated codec secret so tokens survive restarts.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let mut config = PatrolConfig::default();
            config.codec.secret = CodecSecret::generate().to_hex().to_string();
            let text = toml::to_string_pretty(&config).map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// The configured codec secret, or `None` when left empty.
    pub fn codec_secret(&self) -> Result<Option<CodecSecret>, ConfigError> {
        if self.codec.secret.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(CodecSecret::from_hex(&self.codec.secret)?))
    }

    /// Apply PATROL_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PATROL_API__BIND") {
            self.api.bind = v;
        }
        if let Some(v) = lookup("PATROL_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
        if let Some(v) = lookup("PATROL_STORAGE__BACKEND") {
            match v.as_str() {
                "memory" => self.storage.backend = StorageBackend::Memory,
                "sqlite" => self.storage.backend = StorageBackend::Sqlite,
                _ => {}
            }
        }
        if let Some(v) = lookup("PATROL_STORAGE__PATH") {
            self.storage.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PATROL_CODEC__SECRET") {
            self.codec.secret = v;
        }
        if let Some(v) = lookup("PATROL_MESSAGING__MULTI_SEND_MAX_CHARS") {
            if let Ok(n) = v.parse() {
                self.messaging.multi_send_max_chars = n;
            }
        }
        if let Some(v) = lookup("PATROL_MESSAGING__SINGLE_SEND_MAX_CHARS") {
            if let Ok(n) = v.parse() {
                self.messaging.single_send_max_chars = n;
            }
        }
    }
}
