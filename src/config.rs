/// Configuration management for the thumbnail service
///
/// Loads configuration from environment variables with sensible defaults.
/// Size and path parsing is lenient: malformed entries are dropped rather
/// than failing the whole parse, so one bad token never takes the service
/// down.
use crate::error::{AppError, Result};
use crate::models::ImageSize;

#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppConfig,
    pub thumbnails: ThumbnailConfig,
    pub gcs: GcsConfig,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct ThumbnailConfig {
    /// Target sizes, in configured order
    pub sizes: Vec<ImageSize>,
    /// Path prefixes whose objects are watched; `/` alone means everything
    pub monitored_paths: Vec<String>,
    /// Publish a manifest notification after successful generation
    pub notify: bool,
}

#[derive(Clone, Debug)]
pub struct GcsConfig {
    pub service_account_json: Option<String>,
    pub service_account_json_path: Option<String>,
    pub host: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Config {
            app: AppConfig {
                host: std::env::var("THUMBGEN_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("THUMBGEN_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .unwrap_or(8080),
            },
            thumbnails: ThumbnailConfig {
                sizes: parse_sizes(&std::env::var("THUMB_SIZES").unwrap_or_default()),
                monitored_paths: parse_monitored_paths(
                    &std::env::var("MONITORED_PATHS").unwrap_or_default(),
                ),
                notify: std::env::var("NOTIFY_THUMBNAIL_GENERATED")
                    .map(|v| !v.is_empty())
                    .unwrap_or(false),
            },
            gcs: GcsConfig {
                service_account_json: std::env::var("GCS_SERVICE_ACCOUNT_JSON").ok(),
                service_account_json_path: std::env::var("GCS_SERVICE_ACCOUNT_JSON_PATH").ok(),
                host: std::env::var("GCS_HOST")
                    .unwrap_or_else(|_| "storage.googleapis.com".to_string()),
            },
        }
    }
}

impl GcsConfig {
    /// Load service account JSON from the inline variable (raw or base64) or
    /// from a file path
    pub fn load_service_account_json(&self) -> Result<String> {
        if let Some(ref json) = self.service_account_json {
            if !json.trim().starts_with('{') {
                use base64::Engine;
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(json.trim())
                    .map_err(|e| {
                        AppError::Config(format!("Failed to decode base64 SA JSON: {e}"))
                    })?;
                return String::from_utf8(decoded)
                    .map_err(|e| AppError::Config(format!("Invalid UTF-8 in SA JSON: {e}")));
            }
            return Ok(json.clone());
        }

        if let Some(ref path) = self.service_account_json_path {
            return std::fs::read_to_string(path)
                .map_err(|e| AppError::Config(format!("Failed to read SA JSON file: {e}")));
        }

        Err(AppError::Config(
            "Either GCS_SERVICE_ACCOUNT_JSON or GCS_SERVICE_ACCOUNT_JSON_PATH must be set"
                .to_string(),
        ))
    }
}

/// Parse the comma-separated `WxH` size list, dropping malformed tokens
pub fn parse_sizes(raw: &str) -> Vec<ImageSize> {
    raw.split(',')
        .filter_map(|token| ImageSize::parse(token.trim()))
        .collect()
}

/// Parse the colon-separated monitored path prefixes. If the root `/` is
/// present it overrides all other entries and the set normalizes to just it.
pub fn parse_monitored_paths(raw: &str) -> Vec<String> {
    let paths: Vec<String> = raw
        .split(':')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if paths.iter().any(|p| p == "/") {
        return vec!["/".to_string()];
    }
    paths
}
