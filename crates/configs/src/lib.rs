//! # configs
//!
//! Layered settings: struct defaults, then `config/default.toml`, then
//! `config/local.toml`, then `MOMENTS__SECTION__KEY` environment variables.
//! A `.env` file is loaded into the environment first.

use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "MOMENTS";
/// Plain variable accepted for the admin secret when the layered key is unset.
pub const ADMIN_SECRET_ENV: &str = "ADMIN_PASSWORD";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub media: MediaSettings,
    pub admin: AdminSettings,
    pub rate_limit: RateLimitSettings,
    pub color: ColorSettings,
    pub log: LogSettings,
    pub redis: RedisSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty means same-origin only.
    pub cors_origins: Vec<String>,
    /// Take the client address from `x-forwarded-for`/`x-real-ip`. Enable only
    /// behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
    pub shutdown_grace_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_origins: Vec::new(),
            trust_proxy_headers: false,
            shutdown_grace_secs: 10,
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://data/moments.db".into(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub root: PathBuf,
    /// Public path the media root is served under.
    pub url_prefix: String,
    pub max_upload_bytes: usize,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/media"),
            url_prefix: "/media".into(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    /// Plain secret or an Argon2 PHC hash.
    #[serde(deserialize_with = "optional_secret")]
    pub secret: Option<SecretString>,
}

fn optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.is_empty())
        .map(SecretString::from))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct QuotaSettings {
    pub hourly: u32,
    pub daily: u32,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self { hourly: 3, daily: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub submission: QuotaSettings,
    pub upload: QuotaSettings,
    /// How often stale in-memory records are swept.
    pub purge_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            submission: QuotaSettings::default(),
            upload: QuotaSettings::default(),
            purge_interval_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColorSettings {
    pub fetch_timeout_secs: u64,
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self { fetch_timeout_secs: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    /// When set (and built with the `redis` feature) rate limits are shared through Redis.
    pub url: Option<String>,
    pub pool_size: usize,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 8,
        }
    }
}

impl Settings {
    /// Loads `.env`, the config directory and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::load_from("config")
    }

    pub fn load_from(dir: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(&format!("{dir}/default")).required(false))
            .add_source(File::with_name(&format!("{dir}/local")).required(false))
            .add_source(environment());
        Self::finish(builder.build()?.try_deserialize()?)
    }

    /// Parses settings from a TOML string layered over the defaults.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::finish(config.try_deserialize()?)
    }

    fn finish(mut settings: Settings) -> Result<Self, ConfigError> {
        if settings.admin.secret.is_none() {
            settings.admin.secret = std::env::var(ADMIN_SECRET_ENV)
                .ok()
                .filter(|s| !s.is_empty())
                .map(SecretString::from);
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url must not be empty".into()));
        }
        if self.media.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("media.max_upload_bytes must be positive".into()));
        }
        if !self.media.url_prefix.starts_with('/') {
            return Err(ConfigError::Invalid("media.url_prefix must start with '/'".into()));
        }
        for (name, quota) in [
            ("submission", self.rate_limit.submission),
            ("upload", self.rate_limit.upload),
        ] {
            if quota.hourly == 0 || quota.daily == 0 || quota.hourly > quota.daily {
                return Err(ConfigError::Invalid(format!(
                    "rate_limit.{name} needs 0 < hourly <= daily"
                )));
            }
        }
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("server.cors_origins")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn empty_source_yields_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.rate_limit.submission.hourly, 3);
        assert_eq!(settings.rate_limit.submission.daily, 10);
        assert_eq!(settings.media.url_prefix, "/media");
        assert_eq!(settings.media.max_upload_bytes, 10 * 1024 * 1024);
        assert!(!settings.server.trust_proxy_headers);
        assert!(!settings.log.json);
    }

    #[test]
    fn toml_overrides_individual_keys() {
        let settings = Settings::from_toml(
            r#"
            [server]
            port = 8080
            cors_origins = ["https://moments.example"]
            trust_proxy_headers = true

            [admin]
            secret = "hunter2"

            [rate_limit.upload]
            hourly = 20
            daily = 50
            "#,
        )
        .unwrap();
        assert_eq!(settings.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(settings.server.cors_origins, vec!["https://moments.example"]);
        assert!(settings.server.trust_proxy_headers);
        assert_eq!(settings.admin.secret.unwrap().expose_secret(), "hunter2");
        assert_eq!(settings.rate_limit.upload.hourly, 20);
        assert_eq!(settings.rate_limit.submission.hourly, 3);
    }

    #[test]
    fn environment_variables_use_double_underscores() {
        let env = environment().source(Some(
            [
                ("MOMENTS__SERVER__PORT".to_string(), "9000".to_string()),
                ("MOMENTS__LOG__JSON".to_string(), "true".to_string()),
            ]
            .into_iter()
            .collect(),
        ));
        let settings: Settings = Config::builder()
            .add_source(env)
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.server.port, 9000);
        assert!(settings.log.json);
    }

    #[test]
    fn inverted_quota_is_rejected() {
        let err = Settings::from_toml(
            r#"
            [rate_limit.submission]
            hourly = 20
            daily = 5
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("rate_limit.submission"));
    }
}
