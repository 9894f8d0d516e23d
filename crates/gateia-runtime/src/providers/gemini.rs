//! Google Gemini `generateContent` adapter.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use gateia_core::Prompt;

use super::{
    mock_generation, secrets::CredentialSource, ApiCredential, GenerateOptions, Generation,
    ModelAdapter, ProviderError, TokenUsage,
};
use crate::config::{RuntimeConfig, GEMINI_API_KEY_ENV};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Gemini adapter. Routed for `gemini-*` and `google/*` models.
pub struct GeminiAdapter {
    credential: Option<ApiCredential>,
    base_url: String,
    mock: bool,
    timeout: Duration,
    retries: usize,
}

impl GeminiAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: Some(ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                "Gemini API key",
            )),
            ..Self::from_config(&RuntimeConfig::default())
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            credential: config.gemini_api_key.clone(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            mock: config.mock_adapters,
            timeout: config.request_timeout,
            retries: config.transport_retries,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[cfg(feature = "gemini")]
    async fn send(
        &self,
        credential: &ApiCredential,
        prompt: &Prompt,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        use serde::Deserialize;
        use std::time::Instant;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct GenerateResponse {
            #[serde(default)]
            candidates: Vec<Candidate>,
            #[serde(default)]
            usage_metadata: Option<UsageMetadata>,
        }

        #[derive(Deserialize)]
        struct Candidate {
            content: Content,
        }

        #[derive(Deserialize)]
        struct Content {
            #[serde(default)]
            parts: Vec<Part>,
        }

        #[derive(Deserialize)]
        struct Part {
            #[serde(default)]
            text: Option<String>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct UsageMetadata {
            #[serde(default)]
            prompt_token_count: u32,
            #[serde(default)]
            candidates_token_count: u32,
        }

        let (system, user) = match prompt {
            Prompt::Text(text) => (None, text.as_str()),
            Prompt::Chat { system, user } => (system.as_deref(), user.as_str()),
        };

        let mut body = json!({
            "contents": [{"role": "user", "parts": [{"text": user}]}],
        });
        if let Some(system) = system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = options.temperature {
            generation_config.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = options.max_tokens {
            generation_config.insert("maxOutputTokens".into(), json!(max_tokens));
        }
        if options.json_mode {
            generation_config.insert("responseMimeType".into(), json!("application/json"));
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = serde_json::Value::Object(generation_config);
        }

        let model = super::backend_model(options, "google/", DEFAULT_GEMINI_MODEL);
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let started = Instant::now();

        let response: GenerateResponse = super::with_transport_retry(self.retries, || {
            // SECURITY: Only expose the credential here, at the point of use
            let request = super::http::client()
                .post(&url)
                .header("x-goog-api-key", credential.expose())
                .json(&body);
            super::http::send_json(request, self.timeout)
        })
        .await?;

        let text = response
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| ProviderError::ParseError("response has no candidates".into()))?;

        let mut generation =
            Generation::text(text).with_latency_ms(started.elapsed().as_millis() as u64);
        if let Some(usage) = response.usage_metadata {
            generation = generation.with_tokens(TokenUsage::new(
                usage.prompt_token_count,
                usage.candidates_token_count,
            ));
        }
        Ok(generation)
    }

    #[cfg(not(feature = "gemini"))]
    async fn send(
        &self,
        _credential: &ApiCredential,
        _prompt: &Prompt,
        _options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "real Gemini calls require the 'gemini' feature; set {}=true for mock output",
            crate::config::MOCK_ADAPTERS_ENV
        )))
    }
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("mock", &self.mock)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish()
    }
}

#[async_trait]
impl ModelAdapter for GeminiAdapter {
    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        if self.mock {
            return Ok(mock_generation(
                json!({"mock": "gemini output"}),
                TokenUsage::new(10, 10),
                150,
            ));
        }

        let credential = self.credential.as_ref().ok_or_else(|| {
            ProviderError::NotConfigured(format!("Gemini API key not set: {}", GEMINI_API_KEY_ENV))
        })?;

        self.send(credential, prompt, options).await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
