use super::ConfigError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    pub source_channel_id: u64,
    pub target_channel_id: u64,
    #[serde(default)]
    pub authorized_role_ids: HashSet<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_liveness_port")]
    pub port: u16,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_liveness_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let config_path =
                    std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
                Self::load_from_file(config_path)
            }
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord.bot_token.expose_secret().trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "discord.bot_token cannot be empty".to_string(),
            ));
        }

        if self.mirror.source_channel_id == 0 {
            return Err(ConfigError::InvalidConfig(
                "mirror.source_channel_id must be a channel snowflake".to_string(),
            ));
        }

        if self.mirror.target_channel_id == 0 {
            return Err(ConfigError::InvalidConfig(
                "mirror.target_channel_id must be a channel snowflake".to_string(),
            ));
        }

        if self.mirror.source_channel_id == self.mirror.target_channel_id {
            return Err(ConfigError::InvalidConfig(
                "mirror.source_channel_id and mirror.target_channel_id must differ".to_string(),
            ));
        }

        if self.liveness.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "liveness.port must be between 1 and 65535".to_string(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(value) = lookup("MIRROR_DISCORD_BOT_TOKEN") {
            self.discord.bot_token = SecretString::from(value);
        }
        if let Some(value) = lookup("MIRROR_SOURCE_CHANNEL_ID") {
            self.mirror.source_channel_id = parse_env("MIRROR_SOURCE_CHANNEL_ID", &value)?;
        }
        if let Some(value) = lookup("MIRROR_TARGET_CHANNEL_ID") {
            self.mirror.target_channel_id = parse_env("MIRROR_TARGET_CHANNEL_ID", &value)?;
        }
        // hosting platforms hand out the listen port through PORT
        if let Some(value) = lookup("PORT") {
            self.liveness.port = parse_env("PORT", &value)?;
        }
        if let Some(value) = lookup("MIRROR_LIVENESS_PORT") {
            self.liveness.port = parse_env("MIRROR_LIVENESS_PORT", &value)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv {
            name,
            value: value.to_string(),
        })
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_liveness_port() -> u16 {
    10000
}

fn default_log_level() -> String {
    "info".to_string()
}
