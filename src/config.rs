use crate::error::ConfigError;
use crate::secrets::{ObjectRef, SecretKeyRef};
use serde_derive::Deserialize;
use std::str::FromStr;
use std::time::Duration;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_config_path() -> String {
    "/config/config.yaml".to_string()
}

/// Process-level settings taken from environment variables.
#[derive(Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub upload_service_url: String,
    #[serde(default = "default_config_path")]
    pub config_path: String,
}

impl AppConfig {
    pub fn log_level(&self) -> tracing::Level {
        tracing::Level::from_str(self.log_level.as_str()).unwrap_or(tracing::Level::INFO)
    }
}

pub(crate) fn load_app_config() -> Result<AppConfig, ConfigError> {
    envy::from_env::<AppConfig>().map_err(|err| ConfigError::env_parse(err))
}

fn default_verb() -> String {
    "GET".to_string()
}

/// Scrape configuration, read from a YAML file on every polling cycle so
/// that changes are picked up without a restart.
#[derive(Deserialize, Debug, Clone)]
pub struct ScrapeConfig {
    pub exporter: ExporterConfig,
    pub database: DatabaseConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ExporterConfig {
    #[serde(with = "humantime_serde")]
    pub polling_interval: Duration,
    pub api: ApiConfig,
    /// When set, only the metric family with this exact name is forwarded.
    #[serde(default)]
    pub metric_name: Option<String>,
}

/// Target API call to issue against the exporter endpoint.
#[derive(Deserialize, Debug, Clone)]
pub struct ApiConfig {
    pub path: String,
    #[serde(default = "default_verb")]
    pub verb: String,
    /// Extra request headers as "key: value" strings.
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub payload: Option<String>,
    /// Reference to the secret describing the exporter endpoint. When
    /// absent the ambient service account identity is used instead.
    #[serde(default)]
    pub endpoint_ref: Option<ObjectRef>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DatabaseConfig {
    pub username: String,
    pub password_secret_ref: SecretKeyRef,
}

pub fn load_scrape_config(path: &str) -> Result<ScrapeConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
        path: path.to_string(),
        source,
    })
}
