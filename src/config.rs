//! Configuration module for frame-reactor server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::protocols::framed::MAX_FRAME_BYTES;
use clap::Parser;
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "frame-reactor")]
#[command(author = "frame-reactor authors")]
#[command(version = "0.1.0")]
#[command(about = "A single-threaded length-prefixed echo server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:1234)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Maximum number of simultaneous connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Maximum number of readiness events handled per poll
    #[arg(long)]
    pub events_capacity: Option<usize>,

    /// Maximum frame body size in bytes (at most 33554432)
    #[arg(long)]
    pub max_frame_bytes: Option<usize>,

    /// Bytes read from a connection per readiness event
    #[arg(long)]
    pub read_buffer_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum number of simultaneous connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Readiness events handled per poll
    #[serde(default = "default_events_capacity")]
    pub events_capacity: usize,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_connections: default_max_connections(),
            events_capacity: default_events_capacity(),
            backlog: default_backlog(),
        }
    }
}

/// Framing-related configuration
#[derive(Debug, Deserialize)]
pub struct ProtocolConfig {
    /// Maximum frame body size
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Size of the per-read transfer buffer
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:1234".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_events_capacity() -> usize {
    1024
}

fn default_backlog() -> i32 {
    1024
}

fn default_max_frame_bytes() -> usize {
    MAX_FRAME_BYTES
}

fn default_read_buffer_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub max_connections: usize,
    pub events_capacity: usize,
    pub backlog: i32,
    pub max_frame_bytes: usize,
    pub read_buffer_size: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 1234)),
            max_connections: default_max_connections(),
            events_capacity: default_events_capacity(),
            backlog: default_backlog(),
            max_frame_bytes: default_max_frame_bytes(),
            read_buffer_size: default_read_buffer_size(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let listen = cli.listen.unwrap_or(toml_config.server.listen);
        let listen: SocketAddr = listen
            .parse()
            .map_err(|e| ConfigError::InvalidListen(listen.clone(), e))?;

        let config = Config {
            listen,
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            events_capacity: cli
                .events_capacity
                .unwrap_or(toml_config.server.events_capacity),
            backlog: toml_config.server.backlog,
            max_frame_bytes: cli
                .max_frame_bytes
                .unwrap_or(toml_config.protocol.max_frame_bytes),
            read_buffer_size: cli
                .read_buffer_size
                .unwrap_or(toml_config.protocol.read_buffer_size),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_bytes == 0 || self.max_frame_bytes > MAX_FRAME_BYTES {
            return Err(ConfigError::Invalid(format!(
                "max_frame_bytes must be between 1 and {MAX_FRAME_BYTES}, got {}",
                self.max_frame_bytes
            )));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "read_buffer_size must be greater than 0".to_string(),
            ));
        }
        if self.events_capacity == 0 {
            return Err(ConfigError::Invalid(
                "events_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidListen(String, AddrParseError),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidListen(addr, e) => {
                write!(f, "Invalid listen address '{addr}': {e}")
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
