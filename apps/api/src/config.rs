use std::path::PathBuf;

use anyhow::{Context, Result};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TOKEN_INFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Well-known model identifiers tried, in order, when the live listing is unusable.
pub const DEFAULT_FALLBACK_MODELS: &[&str] =
    &["gemini-2.0-flash", "gemini-1.5-flash", "gemini-1.5-pro"];

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    /// Explicit model override. When set, no model listing is performed.
    pub gemini_model: Option<String>,
    pub fallback_models: Vec<String>,
    /// Persistence is disabled when unset.
    pub database_url: Option<String>,
    pub google_client_id: Option<String>,
    pub token_info_url: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub app_env: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let fallback_models = match optional("GEMINI_FALLBACK_MODELS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect(),
            None => DEFAULT_FALLBACK_MODELS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        };

        Ok(Config {
            gemini_api_key: optional("GEMINI_API_KEY").with_context(|| {
                "Required environment variable 'GEMINI_API_KEY' is not set".to_string()
            })?,
            gemini_api_base: optional("GEMINI_API_BASE")
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            gemini_model: optional("GEMINI_MODEL"),
            fallback_models,
            database_url: optional("DATABASE_URL"),
            google_client_id: optional("GOOGLE_CLIENT_ID"),
            token_info_url: optional("TOKEN_INFO_URL")
                .unwrap_or_else(|| DEFAULT_TOKEN_INFO_URL.to_string()),
            upload_dir: optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            max_upload_bytes: optional("MAX_UPLOAD_BYTES")
                .map(|v| v.parse::<usize>())
                .transpose()
                .context("MAX_UPLOAD_BYTES must be a positive integer")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            app_env: optional("APP_ENV").unwrap_or_else(|| "development".to_string()),
            port: optional("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}
