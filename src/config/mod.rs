//! Configuration management.
//!
//! Settings come from a TOML file (`./mailgate.toml` or the platform config
//! directory) with environment variable overrides under the `MAILGATE`
//! prefix, for example `MAILGATE_SERVER__PORT=6000`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP transport settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Mail bridge settings
    #[serde(default)]
    pub mail: MailConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5555
}

/// Mail bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Base URL of the mail bridge service
    #[serde(default = "default_bridge_base")]
    pub bridge_base: String,

    /// Default instructions template for fetch-emails. A literal string, a
    /// URL, or a file path. Overridden per request by the
    /// `email-instructions` header or the `EMAIL_INSTRUCTIONS` variable.
    #[serde(default)]
    pub default_instructions: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            bridge_base: default_bridge_base(),
            default_instructions: None,
        }
    }
}

fn default_bridge_base() -> String {
    "http://127.0.0.1:8025".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file for stdio mode, where stdout must stay a clean protocol
    /// channel
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load configuration from a file, with `MAILGATE_*` environment overrides
pub fn load_config(path: &PathBuf) -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.as_path()))
        .add_source(config::Environment::with_prefix("MAILGATE").separator("__"))
        .build()?;

    settings.try_deserialize()
}

/// Locate the configuration file: `./mailgate.toml` first, then the platform
/// config directory
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("mailgate.toml");
    if local.exists() {
        return Some(local);
    }

    let candidate = dirs::config_dir()?.join("mailgate").join("config.toml");
    candidate.exists().then_some(candidate)
}

/// Get the effective configuration: the located file if any, defaults
/// otherwise
pub fn get_config() -> Config {
    match find_config_file() {
        Some(path) => match load_config(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config file ignored");
                Config::default()
            }
        },
        None => Config::default(),
    }
}
