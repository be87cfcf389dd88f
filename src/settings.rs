//! Process settings: where the store lives, how keys are named and where the
//! tier file is. Loaded once at start-up from defaults, an optional settings
//! file named by `RATELIMIT_SETTINGS`, and `RATELIMIT_*` environment variables.

use serde::Deserialize;
use std::time::Duration;

use crate::{error::Result, redis::RedisConfig, utils::KeyScheme};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub redis_url: String,
    pub limits_path: Option<String>,
    pub key_namespace: String,
    pub key_separator: String,
    pub connection_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub check_store: bool,
}

impl Settings {
    /// Load settings from the process environment
    pub fn load() -> Result<Self> {
        let file = std::env::var("RATELIMIT_SETTINGS").ok();
        Self::load_from(file.as_deref(), config::Environment::with_prefix("RATELIMIT"))
    }

    /// Load settings from an optional file and an explicit environment source
    pub fn load_from(file: Option<&str>, environment: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("redis_url", "redis://localhost:6379")?
            .set_default("key_namespace", "ratelimit")?
            .set_default("key_separator", ":")?
            .set_default("connection_timeout_secs", 5)?
            .set_default("command_timeout_secs", 1)?
            .set_default("check_store", true)?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path));
        }

        let settings: Settings = builder
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn redis_config(&self) -> RedisConfig {
        RedisConfig {
            url: self.redis_url.clone(),
            connection_timeout: Some(Duration::from_secs(self.connection_timeout_secs)),
            command_timeout: Some(Duration::from_secs(self.command_timeout_secs)),
        }
    }

    pub fn key_scheme(&self) -> Result<KeyScheme> {
        KeyScheme::new(self.key_namespace.clone(), self.key_separator.clone())
    }
}
