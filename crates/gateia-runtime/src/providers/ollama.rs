//! Ollama adapter (local models over `/api/generate`).
//!
//! Needs no credential; the server is taken from `OLLAMA_BASE_URL`.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use gateia_core::Prompt;

use super::{mock_generation, GenerateOptions, Generation, ModelAdapter, ProviderError, TokenUsage};
use crate::config::RuntimeConfig;

pub const DEFAULT_OLLAMA_MODEL: &str = "tinyllama";

/// Ollama adapter. Routed for `ollama/*` models.
#[derive(Debug, Clone)]
pub struct OllamaAdapter {
    base_url: String,
    mock: bool,
    #[cfg_attr(not(feature = "ollama"), allow(dead_code))]
    timeout: Duration,
    #[cfg_attr(not(feature = "ollama"), allow(dead_code))]
    retries: usize,
}

impl OllamaAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::from_config(&RuntimeConfig::default())
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            base_url: config.ollama_base_url.clone(),
            mock: config.mock_adapters,
            timeout: config.request_timeout,
            retries: config.transport_retries,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[cfg(feature = "ollama")]
    async fn send(
        &self,
        prompt: &Prompt,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        use serde::Deserialize;

        #[derive(Deserialize)]
        struct GenerateResponse {
            response: String,
            #[serde(default)]
            prompt_eval_count: u32,
            #[serde(default)]
            eval_count: u32,
            /// Nanoseconds
            #[serde(default)]
            total_duration: u64,
        }

        let mut body = json!({
            "model": super::backend_model(options, "ollama/", DEFAULT_OLLAMA_MODEL),
            "prompt": prompt.flatten(),
            "stream": false,
        });
        if options.json_mode {
            body["format"] = json!("json");
        }

        let mut model_options = serde_json::Map::new();
        if let Some(temperature) = options.temperature {
            model_options.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = options.max_tokens {
            model_options.insert("num_predict".into(), json!(max_tokens));
        }
        if !model_options.is_empty() {
            body["options"] = serde_json::Value::Object(model_options);
        }

        let url = format!("{}/api/generate", self.base_url);
        let response: GenerateResponse = super::with_transport_retry(self.retries, || {
            let request = super::http::client().post(&url).json(&body);
            super::http::send_json(request, self.timeout)
        })
        .await?;

        Ok(Generation::text(response.response)
            .with_tokens(TokenUsage::new(response.prompt_eval_count, response.eval_count))
            .with_latency_ms(response.total_duration / 1_000_000))
    }

    #[cfg(not(feature = "ollama"))]
    async fn send(
        &self,
        _prompt: &Prompt,
        _options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "real Ollama calls require the 'ollama' feature; set {}=true for mock output",
            crate::config::MOCK_ADAPTERS_ENV
        )))
    }
}

#[async_trait]
impl ModelAdapter for OllamaAdapter {
    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        if self.mock {
            return Ok(mock_generation(
                json!({"mock": "ollama output"}),
                TokenUsage::new(8, 8),
                120,
            ));
        }

        self.send(prompt, options).await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
