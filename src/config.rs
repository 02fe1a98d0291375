use std::net::SocketAddr;
use std::path::Path;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "bookshelf.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// Controls how tracing is initialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,  // e.g. "info", "debug", "warn"
    pub format: String, // "json" or "console"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_address: String,
    pub redis_url: String,
    pub store: StoreBackend,
    /// Insert sample books when the store starts empty
    pub seed: bool,
    /// Seconds between periodic metric reports; 0 disables them
    pub report_interval_secs: u64,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".into(),
            redis_url: "redis://127.0.0.1:6379/".into(),
            store: StoreBackend::Redis,
            seed: true,
            report_interval_secs: 10,
            logging: LoggingConfig {
                level: "info".into(),
                format: "console".into(),
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),
    #[error("bind_address '{0}' is not a socket address")]
    BindAddress(String),
    #[error("logging.format must be 'console' or 'json', got '{0}'")]
    LogFormat(String),
}

impl Config {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|_| ConfigError::BindAddress(self.bind_address.clone()))
    }
}

/// Layers defaults, the YAML file (if present) and `BOOKSHELF_*` env vars.
/// Nested keys use a double underscore, e.g. `BOOKSHELF_LOGGING__LEVEL`.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Yaml::file(file))
        .merge(Env::prefixed("BOOKSHELF_").split("__"))
        .extract()
        .map_err(Box::new)?;

    config.bind_addr()?;
    if !matches!(config.logging.format.as_str(), "console" | "json") {
        return Err(ConfigError::LogFormat(config.logging.format));
    }
    Ok(config)
}
