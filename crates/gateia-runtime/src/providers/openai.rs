//! OpenAI chat-completions adapter.
//!
//! ## Security
//!
//! The API key is held as an [`ApiCredential`] and only exposed when the
//! `Authorization` header is built.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use gateia_core::Prompt;

use super::{
    mock_generation, secrets::CredentialSource, ApiCredential, GenerateOptions, Generation,
    ModelAdapter, ProviderError, TokenUsage,
};
use crate::config::{RuntimeConfig, OPENAI_API_KEY_ENV};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// OpenAI adapter. Routed for `gpt-*` and `openai/*` models.
pub struct OpenAiAdapter {
    credential: Option<ApiCredential>,
    base_url: String,
    mock: bool,
    timeout: Duration,
    retries: usize,
}

impl OpenAiAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: Some(ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                "OpenAI API key",
            )),
            ..Self::from_config(&RuntimeConfig::default())
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            credential: config.openai_api_key.clone(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            mock: config.mock_adapters,
            timeout: config.request_timeout,
            retries: config.transport_retries,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[cfg(feature = "openai")]
    async fn send(
        &self,
        credential: &ApiCredential,
        prompt: &Prompt,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        use serde::Deserialize;
        use std::time::Instant;

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
            #[serde(default)]
            usage: Option<Usage>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }

        #[derive(Deserialize)]
        struct Message {
            #[serde(default)]
            content: Option<String>,
        }

        #[derive(Deserialize)]
        struct Usage {
            prompt_tokens: u32,
            completion_tokens: u32,
        }

        let mut messages = Vec::new();
        match prompt {
            Prompt::Text(text) => messages.push(json!({"role": "user", "content": text})),
            Prompt::Chat { system, user } => {
                if let Some(system) = system {
                    messages.push(json!({"role": "system", "content": system}));
                }
                messages.push(json!({"role": "user", "content": user}));
            }
        }

        let mut body = json!({
            "model": super::backend_model(options, "openai/", DEFAULT_OPENAI_MODEL),
            "messages": messages,
        });
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if options.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let url = format!("{}/chat/completions", self.base_url);
        let started = Instant::now();

        let response: ChatResponse = super::with_transport_retry(self.retries, || {
            // SECURITY: Only expose the credential here, at the point of use
            let request = super::http::client()
                .post(&url)
                .bearer_auth(credential.expose())
                .json(&body);
            super::http::send_json(request, self.timeout)
        })
        .await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::ParseError("response has no message content".into()))?;

        let mut generation =
            Generation::text(text).with_latency_ms(started.elapsed().as_millis() as u64);
        if let Some(usage) = response.usage {
            generation = generation.with_tokens(TokenUsage::new(
                usage.prompt_tokens,
                usage.completion_tokens,
            ));
        }
        Ok(generation)
    }

    #[cfg(not(feature = "openai"))]
    async fn send(
        &self,
        _credential: &ApiCredential,
        _prompt: &Prompt,
        _options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "real OpenAI calls require the 'openai' feature; set {}=true for mock output",
            crate::config::MOCK_ADAPTERS_ENV
        )))
    }
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("mock", &self.mock)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish()
    }
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        if self.mock {
            return Ok(mock_generation(
                json!({"mock": "output"}),
                TokenUsage::new(10, 5),
                100,
            ));
        }

        let credential = self.credential.as_ref().ok_or_else(|| {
            ProviderError::NotConfigured(format!("OpenAI API key not set: {}", OPENAI_API_KEY_ENV))
        })?;

        self.send(credential, prompt, options).await
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_output() {
        let adapter = OpenAiAdapter::from_config(&RuntimeConfig::mock());
        let generation = adapter
            .generate(&Prompt::text("hi"), &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(generation.text, r#"{"mock":"output"}"#);
        assert_eq!(generation.tokens, Some(TokenUsage::new(10, 5)));
        assert_eq!(generation.tokens.unwrap().total_tokens, 15);
        assert_eq!(generation.latency_ms, Some(100));
    }

    #[tokio::test]
    async fn test_missing_key_not_configured() {
        let adapter = OpenAiAdapter::from_config(&RuntimeConfig::default());
        let err = adapter
            .generate(&Prompt::text("hi"), &GenerateOptions::default())
            .await
            .unwrap_err();
        match err {
            ProviderError::NotConfigured(msg) => assert!(msg.contains("OPENAI_API_KEY")),
            other => panic!("expected NotConfigured, got {:?}", other),
        }
    }

    #[cfg(not(feature = "openai"))]
    #[tokio::test]
    async fn test_real_calls_need_feature() {
        let adapter = OpenAiAdapter::new("sk-test");
        let err = adapter
            .generate(&Prompt::text("hi"), &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'openai' feature"));
    }

    #[test]
    fn test_debug_hides_key() {
        let adapter = OpenAiAdapter::new("sk-very-secret");
        assert!(!format!("{:?}", adapter).contains("sk-very-secret"));
        assert_eq!(adapter.name(), "openai");
    }
}
