//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use invoice_extraction_core::upload::{UploadPolicy, DEFAULT_MAX_FILE_SIZE_MB};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub default_provider: String,
    pub openai_model: String,
    pub gemini_model: String,
    pub gemini_api_base: String,
    pub max_file_size_mb: u64,
    pub upload_policy: UploadPolicy,
    pub upload_dir: PathBuf,
    pub extraction_timeout: Duration,
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an explicit set of variables.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Load Server and Database Settings ---
        let bind_address_str = get("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3001".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url =
            get("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = get("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load API Keys (as optional; each provider checks its own) ---
        let openai_api_key = get("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        let gemini_api_key = get("GEMINI_API_KEY").filter(|k| !k.trim().is_empty());

        // --- Load Provider Settings ---
        let default_provider = get("LLM_PROVIDER").unwrap_or_else(|| "openai".to_string());
        let openai_model = get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o".to_string());
        let gemini_model = get("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.0-flash".to_string());
        let gemini_api_base = get("GEMINI_API_BASE")
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string());

        // --- Load Upload and Extraction Settings ---
        let max_file_size_mb = parse_number(&get, "MAX_FILE_SIZE_MB", DEFAULT_MAX_FILE_SIZE_MB)?;
        let upload_policy = UploadPolicy::from_megabytes(max_file_size_mb).ok_or_else(|| {
            ConfigError::InvalidValue(
                "MAX_FILE_SIZE_MB".to_string(),
                format!("{} megabytes does not fit in a byte count", max_file_size_mb),
            )
        })?;
        let upload_dir = get("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./uploads"));
        let extraction_timeout =
            Duration::from_secs(parse_number(&get, "EXTRACTION_TIMEOUT_SECS", 120)?);

        let cors_origins = get("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000,http://localhost:5173".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            gemini_api_key,
            default_provider,
            openai_model,
            gemini_model,
            gemini_api_base,
            max_file_size_mb,
            upload_policy,
            upload_dir,
            extraction_timeout,
            cors_origins,
        })
    }

}

fn parse_number(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("'{}' is not a positive integer", raw),
            )),
        },
    }
}
