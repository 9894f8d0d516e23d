//! Runtime configuration.
//!
//! Everything is read from the environment once, at construction. Adapters
//! receive the resolved [`RuntimeConfig`] rather than reading variables on
//! each call.

use std::time::Duration;
use thiserror::Error;

use crate::providers::ApiCredential;

pub const MOCK_ADAPTERS_ENV: &str = "GATEIA_MOCK_ADAPTERS";
pub const REQUEST_TIMEOUT_ENV: &str = "GATEIA_REQUEST_TIMEOUT";
pub const REPAIR_RETRIES_ENV: &str = "GATEIA_REPAIR_RETRIES";
pub const TRANSPORT_RETRIES_ENV: &str = "GATEIA_TRANSPORT_RETRIES";
pub const OLLAMA_BASE_URL_ENV: &str = "OLLAMA_BASE_URL";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REPAIR_RETRIES: u32 = 3;
pub const DEFAULT_TRANSPORT_RETRIES: usize = 2;

/// Invalid configuration value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a duration like '30s' or '1m 30s', got '{value}'")]
    InvalidDuration { var: &'static str, value: String },

    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidCount { var: &'static str, value: String },

    #[error("{var} must start with http:// or https://, got '{value}'")]
    InvalidUrl { var: &'static str, value: String },
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Built-in adapters return canned output instead of calling out
    pub mock_adapters: bool,

    /// Per-request HTTP timeout
    pub request_timeout: Duration,

    /// Retries used by `RepairMode::Auto` when the call sets none
    pub repair_retries: u32,

    /// Transport-level retries for transient HTTP failures
    pub transport_retries: usize,

    pub ollama_base_url: String,
    pub openai_api_key: Option<ApiCredential>,
    pub gemini_api_key: Option<ApiCredential>,
}

impl RuntimeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary lookup. Unset and blank values fall back to
    /// defaults.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(flag) = get(MOCK_ADAPTERS_ENV) {
            config.mock_adapters = matches!(flag.trim(), "true" | "1");
        }

        if let Some(value) = get(REQUEST_TIMEOUT_ENV) {
            config.request_timeout = humantime::parse_duration(value.trim()).map_err(|_| {
                ConfigError::InvalidDuration {
                    var: REQUEST_TIMEOUT_ENV,
                    value,
                }
            })?;
        }

        if let Some(value) = get(REPAIR_RETRIES_ENV) {
            config.repair_retries = value.trim().parse().map_err(|_| ConfigError::InvalidCount {
                var: REPAIR_RETRIES_ENV,
                value,
            })?;
        }

        if let Some(value) = get(TRANSPORT_RETRIES_ENV) {
            config.transport_retries =
                value.trim().parse().map_err(|_| ConfigError::InvalidCount {
                    var: TRANSPORT_RETRIES_ENV,
                    value,
                })?;
        }

        if let Some(url) = get(OLLAMA_BASE_URL_ENV) {
            let url = url.trim().trim_end_matches('/').to_string();
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidUrl {
                    var: OLLAMA_BASE_URL_ENV,
                    value: url,
                });
            }
            config.ollama_base_url = url;
        }

        config.openai_api_key =
            ApiCredential::from_lookup(&lookup, OPENAI_API_KEY_ENV, "OpenAI API key");
        config.gemini_api_key =
            ApiCredential::from_lookup(&lookup, GEMINI_API_KEY_ENV, "Gemini API key");

        Ok(config)
    }

    /// Default settings with mock adapters switched on.
    pub fn mock() -> Self {
        Self {
            mock_adapters: true,
            ..Self::default()
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mock_adapters: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            repair_retries: DEFAULT_REPAIR_RETRIES,
            transport_retries: DEFAULT_TRANSPORT_RETRIES,
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            openai_api_key: None,
            gemini_api_key: None,
        }
    }
}
