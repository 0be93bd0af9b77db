//! # configs
//!
//! Layered runtime settings. Later layers win:
//!
//! 1. built-in defaults
//! 2. `config/default.toml` (optional)
//! 3. `config/local.toml` (optional, not checked in)
//! 4. `AGORA__SECTION__KEY` environment variables, after `.env` is loaded

use std::path::Path;

use config::{Config, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "AGORA";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub log: LogSettings,
    pub seed: SeedSettings,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// May embed credentials for non-file backends; never logged.
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct LogSettings {
    /// An `EnvFilter` directive, e.g. `info` or `services=debug,info`.
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeedSettings {
    pub topics: Vec<String>,
}

impl Settings {
    /// Loads `.env`, then every layer relative to the working directory.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::load_from(Path::new("config"), Self::environment())
    }

    /// Same layering as `load`, with the config directory and environment
    /// source supplied by the caller.
    pub fn load_from(config_dir: &Path, env: Environment) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .set_default("database.url", "sqlite://agora.db?mode=rwc")?
            .set_default("database.max_connections", 5)?
            .set_default("log.level", "info")?
            .set_default("log.json", false)?
            .set_default("seed.topics", Vec::<String>::new())?
            .add_source(File::from(config_dir.join("default")).required(false))
            .add_source(File::from(config_dir.join("local")).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// `AGORA__DATABASE__URL`, `AGORA__SEED__TOPICS=a,b,c` and so on.
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("seed.topics")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.expose_secret().trim().is_empty() {
            return Err(ConfigError::Invalid { key: "database.url", reason: "must not be empty".into() });
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid { key: "database.max_connections", reason: "must be at least 1".into() });
        }
        if self.log.level.trim().is_empty() {
            return Err(ConfigError::Invalid { key: "log.level", reason: "must not be empty".into() });
        }
        Ok(())
    }
}
