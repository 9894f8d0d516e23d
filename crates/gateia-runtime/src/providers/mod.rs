//! Model adapter abstractions for gateia-runtime.
//!
//! This module defines the trait every model backend implements and the
//! adapters shipped with the crate: OpenAI, Gemini and Ollama (real HTTP
//! behind cargo features, canned output in mock mode) plus a scripted
//! in-memory adapter for tests.
//!
//! ## Security
//!
//! All adapters use the [`secrets`] module for credential handling.
//! See [`ApiCredential`] for the recommended patterns.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::ops::AddAssign;
use std::time::Duration;
use thiserror::Error;

use gateia_core::Prompt;

mod gemini;
#[cfg(any(feature = "openai", feature = "gemini", feature = "ollama"))]
mod http;
mod ollama;
mod openai;
mod registry;
mod scripted;
pub mod secrets;

pub use gemini::GeminiAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
pub use registry::{ModelRegistry, ModelRoute};
pub use scripted::ScriptedAdapter;
pub use secrets::{ApiCredential, CredentialSource};

/// Errors from model adapters.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Adapter not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Worth retrying at the transport level: connection failures, timeouts,
    /// rate limiting and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::HttpError(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_) => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            ProviderError::ParseError(_)
            | ProviderError::AuthError
            | ProviderError::NotConfigured(_) => false,
        }
    }
}

/// Per-call generation settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Model name as the caller wrote it (the gate fills this in)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Ask the backend for JSON output where it supports it
    #[serde(default)]
    pub json_mode: bool,
}

/// Token usage from one generation (or accumulated over several).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// What an adapter produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,

    /// Already-parsed output, when the backend returned structured data.
    /// Takes precedence over `text` for validation.
    pub structured: Option<Value>,

    pub tokens: Option<TokenUsage>,
    pub latency_ms: Option<u64>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured: None,
            tokens: None,
            latency_ms: None,
        }
    }

    pub fn with_structured(mut self, structured: Value) -> Self {
        self.structured = Some(structured);
        self
    }

    pub fn with_tokens(mut self, tokens: TokenUsage) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Adapter abstraction allows swapping model backends.
///
/// This is the ONLY place where model calls are made. Adapters report
/// failures as [`ProviderError`]; the gate wraps them with the trace id.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError>;

    /// Adapter name, reported in gate usage.
    fn name(&self) -> &str;
}

/// Run `op`, retrying transient failures with exponential backoff.
///
/// `max_times` is the number of retries after the first attempt.
pub async fn with_transport_retry<T, F, Fut>(max_times: usize, op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    op.retry(
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_times(max_times),
    )
    .when(ProviderError::is_transient)
    .notify(|err, delay| {
        tracing::warn!(error = %err, delay = ?delay, "transient adapter error, retrying");
    })
    .await
}

/// Canned mock output shared by the built-in adapters.
pub(crate) fn mock_generation(body: Value, tokens: TokenUsage, latency_ms: u64) -> Generation {
    Generation::text(body.to_string())
        .with_tokens(tokens)
        .with_latency_ms(latency_ms)
}

/// Strip a routing prefix (`openai/gpt-4o` → `gpt-4o`).
#[cfg_attr(
    not(any(feature = "openai", feature = "gemini", feature = "ollama")),
    allow(dead_code)
)]
pub(crate) fn backend_model<'a>(options: &'a GenerateOptions, prefix: &str, fallback: &'a str) -> &'a str {
    options
        .model
        .as_deref()
        .map(|m| m.strip_prefix(prefix).unwrap_or(m))
        .unwrap_or(fallback)
}
