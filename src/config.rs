//! Environment-driven configuration
//!
//! Every setting is read from a `WESIO_`-prefixed environment variable,
//! optionally seeded from a `.env` file.

use crate::{Error, Result};
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "WESIO";

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// Object store and CDN settings for the media layer.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// `host[:port]` of the object store, or a full URL with scheme.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub use_ssl: bool,
    pub region: String,
    /// Empty means CDN URLs are unavailable.
    pub cdn_domain: String,
    pub cdn_sign_key: String,
    pub max_upload_size: u64,
    pub operation_timeout: Option<Duration>,
}

impl MediaConfig {
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            use_ssl: false,
            region: DEFAULT_REGION.to_string(),
            cdn_domain: String::new(),
            cdn_sign_key: String::new(),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            operation_timeout: None,
        }
    }

    pub fn with_cdn(mut self, domain: impl Into<String>, sign_key: impl Into<String>) -> Self {
        self.cdn_domain = domain.into();
        self.cdn_sign_key = sign_key.into();
        self
    }

    pub fn with_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn with_max_upload_size(mut self, limit: u64) -> Self {
        self.max_upload_size = limit;
        self
    }

    /// Endpoint URL handed to the S3 client. A bare host gets its scheme
    /// from `use_ssl`.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.trim_end_matches('/').to_string()
        } else {
            let scheme = if self.use_ssl { "https" } else { "http" };
            format!("{}://{}", scheme, self.endpoint.trim_end_matches('/'))
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::Configuration(
                "media endpoint not configured".to_string(),
            ));
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(Error::Configuration(
                "media credentials not configured".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Console,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub media: MediaConfig,
    pub log: LogConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Config::from_env`] but with an explicit `.env` file that must exist.
    pub fn from_env_file(path: &Path) -> Result<Self> {
        dotenvy::from_path(path)?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}_{}", ENV_PREFIX, name));
        let required = |name: &str| {
            var(name).filter(|v| !v.is_empty()).ok_or_else(|| {
                Error::Configuration(format!("{}_{} not set", ENV_PREFIX, name))
            })
        };

        let mut media = MediaConfig::new(
            required("MEDIA_ENDPOINT")?,
            required("MEDIA_ACCESS_KEY")?,
            required("MEDIA_SECRET_KEY")?,
        );

        if let Some(raw) = var("MEDIA_USE_SSL") {
            media.use_ssl = parse_bool("MEDIA_USE_SSL", &raw)?;
        }
        if let Some(region) = var("MEDIA_REGION").filter(|v| !v.is_empty()) {
            media.region = region;
        }
        media.cdn_domain = var("MEDIA_CDN_DOMAIN").unwrap_or_default();
        media.cdn_sign_key = var("MEDIA_CDN_SIGN_KEY").unwrap_or_default();
        if let Some(raw) = var("MEDIA_MAX_UPLOAD_SIZE") {
            media.max_upload_size = parse_number("MEDIA_MAX_UPLOAD_SIZE", &raw)?;
        }
        if let Some(raw) = var("MEDIA_OPERATION_TIMEOUT_SECS") {
            let secs = parse_number("MEDIA_OPERATION_TIMEOUT_SECS", &raw)?;
            media.operation_timeout = Some(Duration::from_secs(secs));
        }

        let mut log = LogConfig::default();
        if let Some(level) = var("LOGGER_LEVEL") {
            if !matches!(level.as_str(), "debug" | "info" | "warn" | "error") {
                return Err(Error::Configuration(format!(
                    "invalid log level: {}",
                    level
                )));
            }
            log.level = level;
        }
        if let Some(format) = var("LOGGER_FORMAT") {
            log.format = match format.as_str() {
                "json" => LogFormat::Json,
                "console" => LogFormat::Console,
                other => {
                    return Err(Error::Configuration(format!(
                        "invalid log format: {}",
                        other
                    )))
                }
            };
        }

        Ok(Self { media, log })
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        _ => Err(Error::Configuration(format!(
            "{}_{} must be a boolean, got '{}'",
            ENV_PREFIX, name, raw
        ))),
    }
}

fn parse_number(name: &str, raw: &str) -> Result<u64> {
    raw.trim().parse().map_err(|_| {
        Error::Configuration(format!(
            "{}_{} must be a non-negative integer, got '{}'",
            ENV_PREFIX, name, raw
        ))
    })
}
