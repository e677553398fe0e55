//! Configuration management

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use config::{Config as ConfigBuilder, ConfigError as BuilderError, Environment, File};
use clap::{Parser, Subcommand};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid plugin configuration: {0}")]
    InvalidPlugin(String),

    #[error("Invalid network configuration: {0}")]
    InvalidNetwork(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

impl From<BuilderError> for ConfigError {
    fn from(err: BuilderError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub plugins: PluginsConfig,
    pub network: NetworkConfig,
    pub parser: ParserConfig,
    pub ui: UiConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with precedence: CLI args > Environment variables > Config file > Defaults
    pub fn load(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut builder = with_defaults(ConfigBuilder::builder())?;

        if let Some(config_path) = &cli_args.config {
            if !config_path.exists() {
                return Err(ConfigError::FileNotFound(
                    config_path.display().to_string()
                ));
            }
            builder = builder.add_source(File::from(config_path.as_path()));
        }

        // Example: MEDIASCOUT_NETWORK__TIMEOUT_SECS=20
        builder = builder.add_source(
            Environment::with_prefix("MEDIASCOUT")
                .separator("__")
                .try_parsing(true)
        );

        if let Some(plugin_dir) = &cli_args.plugin_dir {
            builder = builder.set_override("plugins.user_dir", plugin_dir.display().to_string())?;
        }
        if let Some(log_level) = &cli_args.log_level {
            builder = builder.set_override("logging.level", log_level.clone())?;
        }
        if let Some(quality) = &cli_args.quality {
            builder = builder.set_override("parser.quality", quality.clone())?;
        }
        if cli_args.yes {
            builder = builder.set_override("ui.assume_yes", true)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path, on top of the defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let config: Config = with_defaults(ConfigBuilder::builder())?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults only
    pub fn defaults() -> Result<Self, ConfigError> {
        let config: Config = with_defaults(ConfigBuilder::builder())?
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.plugins.validate()?;
        self.network.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

fn default_user_dir() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mediascout")
        .join("plugins")
        .display()
        .to_string()
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Ok(builder
        .set_default("plugins.system_dir", "/usr/share/mediascout/plugins")?
        .set_default("plugins.user_dir", default_user_dir())?
        .set_default("plugins.extension", "js")?
        .set_default("network.timeout_secs", 10)?
        .set_default("network.connect_timeout_secs", 10)?
        .set_default("network.max_redirects", 16)?
        .set_default("network.user_agent", concat!("mediascout/", env!("CARGO_PKG_VERSION")))?
        .set_default("parser.quality", "normal")?
        .set_default("ui.assume_yes", false)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")?
        .set_default("logging.rotation", "daily")?
        .set_default("logging.max_files", 5)?)
}

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "mediascout")]
#[command(about = "Resolve media URLs and search results through site plugins", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Per-user plugin directory
    #[arg(long, value_name = "DIR", global = true)]
    pub plugin_dir: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Requested quality tier (normal, high, super)
    #[arg(short, long, value_name = "TIER", global = true)]
    pub quality: Option<String>,

    /// Answer yes to every plugin question
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List discovered plugin files and the host routing table
    List,

    /// Resolve the playable streams behind a page URL
    Parse {
        url: String,

        /// Resolve for download instead of playback
        #[arg(long)]
        download: bool,

        /// Write the session cookies for the URL to a Netscape cookie file
        #[arg(long, value_name = "FILE")]
        cookies: Option<PathBuf>,
    },

    /// Search a site through its plugin
    Search {
        /// Plugin name (file name without the `plugin_` prefix)
        plugin: String,

        keyword: String,

        #[arg(short, long, default_value_t = 1)]
        page: u32,

        /// Search albums instead of single videos
        #[arg(long)]
        album: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginsConfig {
    pub system_dir: PathBuf,
    pub user_dir: PathBuf,
    pub extension: String,
}

impl PluginsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidPlugin("user_dir cannot be empty".to_string()));
        }

        if self.extension.is_empty() || self.extension.contains('.') {
            return Err(ConfigError::InvalidPlugin(
                "extension must be a bare file extension such as 'js'".to_string()
            ));
        }

        Ok(())
    }

    /// Directories scanned for plugins, system-wide first
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        vec![self.system_dir.clone(), self.user_dir.clone()]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidNetwork("timeout_secs must be greater than 0".to_string()));
        }

        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidNetwork("connect_timeout_secs must be greater than 0".to_string()));
        }

        if self.max_redirects == 0 {
            return Err(ConfigError::InvalidNetwork("max_redirects must be greater than 0".to_string()));
        }

        Ok(())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Quality tier requested from plugins when parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Normal,
    High,
    Super,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    pub quality: Quality,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UiConfig {
    pub assume_yes: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    pub log_file: Option<PathBuf>,
    /// `never`, `hourly` or `daily`
    pub rotation: String,
    /// Rotated files kept next to `log_file`
    pub max_files: usize,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::InvalidLogging(
                format!("level must be one of: {:?}", valid_levels)
            ));
        }

        let valid_formats = ["json", "text"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidLogging(
                format!("format must be one of: {:?}", valid_formats)
            ));
        }

        let valid_outputs = ["stderr", "file"];
        if !valid_outputs.contains(&self.output.as_str()) {
            return Err(ConfigError::InvalidLogging(
                format!("output must be one of: {:?}", valid_outputs)
            ));
        }

        if self.output == "file" && self.log_file.is_none() {
            return Err(ConfigError::InvalidLogging(
                "log_file must be specified when output is 'file'".to_string()
            ));
        }

        let valid_rotations = ["never", "hourly", "daily"];
        if !valid_rotations.contains(&self.rotation.as_str()) {
            return Err(ConfigError::InvalidLogging(
                format!("rotation must be one of: {:?}", valid_rotations)
            ));
        }

        if self.max_files == 0 {
            return Err(ConfigError::InvalidLogging("max_files must be greater than 0".to_string()));
        }

        Ok(())
    }
}
