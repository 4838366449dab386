//! Configuration management for Inkcheck Server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder URL shipped in example env files; treated as "not configured".
pub const PLACEHOLDER_WEBHOOK_URL: &str = "https://your-n8n-instance.com/webhook/image-analysis";

/// Default upload limit: 5MB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Default webhook deadline
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub webhook: WebhookConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    /// Root directory for the local provider
    pub local_path: PathBuf,
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Local,
    Minio,
    R2,
    S3,
    B2,
}

impl StorageProvider {
    pub fn is_s3_compatible(&self) -> bool {
        !matches!(self, StorageProvider::Local)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Analysis endpoint; `None` runs the server in demo mode
    pub url: Option<String>,
    pub timeout_secs: u64,
    /// Substitute the mock analysis when the real one fails
    pub fallback_on_failure: bool,
}

impl WebhookConfig {
    /// The configured URL, unless it is missing or still the placeholder
    pub fn live_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty() && *url != PLACEHOLDER_WEBHOOK_URL)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            storage: StorageConfig {
                provider: StorageProvider::Local,
                local_path: PathBuf::from("./data/images"),
                endpoint: "http://localhost:9000".to_string(),
                bucket: "inkcheck".to_string(),
                access_key: "admin".to_string(),
                secret_key: "password123".to_string(),
                region: Some("us-east-1".to_string()),
            },
            database: DatabaseConfig {
                url: "sqlite:./inkcheck.db".to_string(),
            },
            webhook: WebhookConfig {
                url: None,
                timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS,
                fallback_on_failure: true,
            },
            upload: UploadConfig {
                max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let provider = match env::var("STORAGE_PROVIDER")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "minio" => StorageProvider::Minio,
            "r2" => StorageProvider::R2,
            "s3" => StorageProvider::S3,
            "b2" => StorageProvider::B2,
            _ => StorageProvider::Local,
        };

        let storage = if provider.is_s3_compatible() {
            StorageConfig {
                provider,
                local_path: defaults.storage.local_path,
                endpoint: required("S3_ENDPOINT")?,
                bucket: required("S3_BUCKET")?,
                access_key: required("S3_ACCESS_KEY")?,
                secret_key: required("S3_SECRET_KEY")?,
                region: env::var("S3_REGION").ok(),
            }
        } else {
            StorageConfig {
                provider,
                local_path: env::var("STORAGE_LOCAL_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.local_path),
                ..defaults.storage
            }
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            storage,
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./inkcheck.db".to_string()),
            },
            webhook: WebhookConfig {
                url: env::var("N8N_WEBHOOK_URL").ok(),
                timeout_secs: parsed("WEBHOOK_TIMEOUT_SECS", DEFAULT_WEBHOOK_TIMEOUT_SECS)?,
                fallback_on_failure: parse_flag(
                    "WEBHOOK_FALLBACK_ON_FAILURE",
                    env::var("WEBHOOK_FALLBACK_ON_FAILURE").ok(),
                    true,
                )?,
            },
            upload: UploadConfig {
                max_bytes: parsed("UPLOAD_MAX_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            },
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(name: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { name, value }),
    }
}
