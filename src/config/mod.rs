use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, FileFormat};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use validator::{Validate, ValidationError};

const DEFAULT_BATCH_SIZE: usize = 250;
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 3005;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_APP_NAME: &str = "graphite-web";

/// Settings for talking to an IRONdb cluster.
#[derive(Debug, Deserialize, Clone, Validate)]
#[validate(schema(function = "validate_timeouts"))]
pub struct FinderConfig {
    /// Base URLs of every cluster node. Takes precedence over `url`.
    #[serde(default)]
    pub urls: Vec<String>,
    /// Single-node shorthand used when `urls` is empty.
    #[serde(default)]
    pub url: Option<String>,
    #[validate(range(min = 1))]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[validate(range(min = 1))]
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[validate(range(min = 1))]
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    #[validate(range(min = 1))]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_database_rollups")]
    pub database_rollups: bool,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[validate(length(min = 1))]
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_connection_timeout_ms() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_database_rollups() -> bool {
    true
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

// The request deadline also covers connecting. A connect timeout that does not
// fire first would make a dead node look like a stalled one.
fn validate_timeouts(config: &FinderConfig) -> Result<(), ValidationError> {
    if config.connection_timeout_ms >= config.timeout_ms {
        return Err(ValidationError::new("connect_timeout_exceeds_timeout").with_message(
            format!(
                "connection_timeout_ms ({}) must be below timeout_ms ({})",
                config.connection_timeout_ms, config.timeout_ms
            )
            .into(),
        ));
    }
    Ok(())
}

fn parse_bool(value: &str) -> bool {
    let lower = value.to_lowercase();
    matches!(lower.as_str(), "true" | "1" | "yes" | "on")
}

fn split_urls(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect()
}

fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
    prefix: &str,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_default(format!("{prefix}batch_size"), DEFAULT_BATCH_SIZE as i64)?
        .set_default(format!("{prefix}timeout_ms"), DEFAULT_TIMEOUT_MS as i64)?
        .set_default(
            format!("{prefix}connection_timeout_ms"),
            DEFAULT_CONNECTION_TIMEOUT_MS as i64,
        )?
        .set_default(format!("{prefix}max_retries"), DEFAULT_MAX_RETRIES as i64)?
        .set_default(format!("{prefix}database_rollups"), true)?
        .set_default(format!("{prefix}app_name"), DEFAULT_APP_NAME)
}

impl FinderConfig {
    /// Loads settings from `.env` and `IRONDB_*` / `CIRCONUS_TOKEN` environment variables.
    pub fn new() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let s = with_defaults(Config::builder(), "")?
            .add_source(config::Environment::with_prefix("IRONDB").try_parsing(true))
            .set_override_option(
                "urls",
                env::var("IRONDB_URLS").ok().map(|v| split_urls(&v)),
            )?
            .set_override_option(
                "database_rollups",
                env::var("IRONDB_USE_DATABASE_ROLLUPS")
                    .ok()
                    .map(|v| parse_bool(&v)),
            )?
            .set_override_option(
                "auth_token",
                env::var("CIRCONUS_TOKEN").ok().filter(|t| !t.is_empty()),
            )?
            .build()?;

        let config: FinderConfig = s.try_deserialize()?;
        config.finish()
    }

    /// Loads settings from the `[irondb]` table of a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = with_defaults(Config::builder(), "irondb.")?
            .add_source(config::File::from(path.as_ref()).format(FileFormat::Toml))
            .build()?;

        let config: FinderConfig = s.get("irondb")?;
        config.finish()
    }

    /// Builds a config for the given hosts with every other setting at its default.
    pub fn with_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: hosts.into_iter().map(Into::into).collect(),
            url: None,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            database_rollups: true,
            auth_token: None,
            app_name: default_app_name(),
        }
    }

    /// Resolved host list with trailing slashes removed.
    pub fn hosts(&self) -> Vec<String> {
        let raw: Vec<&String> = if self.urls.is_empty() {
            self.url.iter().collect()
        } else {
            self.urls.iter().collect()
        };

        raw.into_iter()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    fn finish(self) -> Result<Self, ConfigError> {
        if let Err(e) = self.validate() {
            return Err(ConfigError::Message(format!("Validation error: {}", e)));
        }

        if self.hosts().is_empty() {
            return Err(ConfigError::Message(
                "Missing configuration: Must provide either IRONDB_URLS or IRONDB_URL".into(),
            ));
        }

        Ok(self)
    }
}
