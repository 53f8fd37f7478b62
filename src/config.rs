//! Chatroom server configuration.
//!
//! Handles the optional configuration file at:
//! - Linux/macOS: ~/.config/chatroom/config.toml
//! - Windows: %APPDATA%\chatroom\config.toml
//!
//! Every field has a default, so a missing file (or a missing section) yields a
//! server listening on port 16271 that admits three clients.

use crate::error::ChatError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default listening port
pub const DEFAULT_PORT: u16 = 16271;

/// Default cap on concurrently connected clients
pub const DEFAULT_MAX_CLIENTS: usize = 3;

/// Command(4) + userID(32) + message(256) + two separators
pub const DEFAULT_MAX_LINE_LENGTH: usize = 294;

/// Chatroom configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// Listener settings
    #[serde(default)]
    pub server: ListenConfig,

    /// Credential storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum number of live sessions
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Maximum bytes in a single protocol line
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_clients() -> usize {
    DEFAULT_MAX_CLIENTS
}

fn default_max_line_length() -> usize {
    DEFAULT_MAX_LINE_LENGTH
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_clients: default_max_clients(),
            max_line_length: default_max_line_length(),
        }
    }
}

/// Credential storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the `(userID, password)` credential file
    #[serde(default = "default_users_file")]
    pub users_file: PathBuf,

    /// Keep registrations in memory only
    #[serde(default)]
    pub ephemeral: bool,
}

fn default_users_file() -> PathBuf {
    PathBuf::from("users.txt")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            users_file: default_users_file(),
            ephemeral: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Default config file location, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chatroom").join("config.toml"))
    }

    /// Load configuration from an explicit path, or the default path if it exists
    pub fn load(explicit: Option<&Path>) -> Result<Self, ChatError> {
        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ChatError::ConfigError {
                        message: format!("Config file not found: {}", path.display()),
                    });
                }
                Self::load_from(path)
            }
            None => match Self::default_path() {
                Some(path) => Self::load_from(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Load configuration from a specific path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, ChatError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ChatError> {
        let config: Self = toml::from_str(content).map_err(|e| ChatError::ConfigError {
            message: format!("Failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.server.max_clients == 0 {
            return Err(ChatError::ConfigError {
                message: "server.max_clients must be at least 1".to_string(),
            });
        }
        if self.server.max_line_length == 0 {
            return Err(ChatError::ConfigError {
                message: "server.max_line_length must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// `host:port` string for the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
