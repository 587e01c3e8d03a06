//! Configuration for the serve-a-file server.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values. The document
//! root and port are validated here so the engine can treat them as
//! opaque startup parameters.

use clap::Parser;
use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Command-line arguments for the file server
#[derive(Parser, Debug, Default)]
#[command(name = "serve-a-file")]
#[command(version = "0.1.0")]
#[command(about = "A static file HTTP/1.1 server with keep-alive support", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on (e.g., 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (1-65535)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Document root for static files (must be an existing directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

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
    pub content: ContentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Read buffer size per connection in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Number of read buffers to pre-allocate
    #[serde(default = "default_pool_buffers")]
    pub pool_buffers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            buffer_size: default_buffer_size(),
            pool_buffers: default_pool_buffers(),
        }
    }
}

/// Static content configuration
#[derive(Debug, Deserialize)]
pub struct ContentConfig {
    /// Document root for static files
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
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

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_buffer_size() -> usize {
    8 * 1024
}

fn default_pool_buffers() -> usize {
    64
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Canonicalized document root.
    pub root: PathBuf,
    pub buffer_size: usize,
    pub pool_buffers: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(CliArgs::parse())
    }

    /// Merge and validate; split from [`Config::load`] so tests can supply
    /// synthetic CLI args.
    pub fn resolve(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let port = cli.port.unwrap_or(toml_config.server.port);
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }

        let root = cli.root.unwrap_or(toml_config.content.root);
        if !root.is_dir() {
            return Err(ConfigError::InvalidRoot(root));
        }
        let root = root
            .canonicalize()
            .map_err(|_| ConfigError::InvalidRoot(root.clone()))?;

        Ok(Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port,
            root,
            buffer_size: toml_config.server.buffer_size,
            pool_buffers: toml_config.server.pool_buffers,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}'", .0.display())]
    FileRead(PathBuf, #[source] io::Error),

    #[error("failed to parse config file '{}'", .0.display())]
    TomlParse(PathBuf, #[source] toml::de::Error),

    #[error("invalid port {0}: valid range is 1-65535")]
    InvalidPort(u16),

    #[error("invalid document root '{}': must be an existing directory", .0.display())]
    InvalidRoot(PathBuf),
}
