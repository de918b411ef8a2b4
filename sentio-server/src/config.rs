//! Server configuration: defaults, then file, then environment, then CLI

use clap::Parser;
use sentio_eye::VisionConfig;
use sentio_sc::AudioConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Command-line flags
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "sentio-server")]
#[command(about = "Real-time face and voice emotion capture server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Bind address
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP port
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Directory holding the voice classifier artifacts
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Do not start the background voice worker
    #[arg(long)]
    pub no_voice_worker: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentioConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub vision: VisionConfig,
    pub logging: LoggingConfig,
}

impl SentioConfig {
    /// Resolve the full configuration for a process
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match cli.config {
            Some(ref path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_str(&content)
    }

    /// Parse JSON, TOML or YAML, tried in that order
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<SentioConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<SentioConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = serde_yaml::from_str::<SentioConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::Parse("Unknown format".to_string()))
    }

    /// Overlay `SENTIO_*` variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SENTIO_HOST") {
            self.server.bind_address = host;
        }

        if let Some(port) = lookup("SENTIO_PORT") {
            self.server.port = port
                .parse::<u16>()
                .map_err(|_| ConfigError::Parse(format!("SENTIO_PORT is not a port: '{}'", port)))?;
        }

        if let Some(dir) = lookup("SENTIO_MODEL_DIR") {
            self.audio.model_dir = PathBuf::from(dir);
        }

        if let Some(level) = lookup("SENTIO_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(ref host) = cli.host {
            self.server.bind_address = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(ref dir) = cli.model_dir {
            self.audio.model_dir = dir.clone();
        }
        if cli.no_voice_worker {
            self.audio.worker.enabled = false;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation("server.bind_address cannot be empty".to_string()));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation("logging.level cannot be empty".to_string()));
        }

        self.audio
            .validate()
            .map_err(|e| ConfigError::Validation(format!("audio: {}", e)))?;
        self.vision
            .validate()
            .map_err(|e| ConfigError::Validation(format!("vision: {}", e)))?;

        Ok(())
    }

    /// `host:port` to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}
