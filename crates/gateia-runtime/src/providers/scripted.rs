//! In-memory adapter with queued responses.
//!
//! Useful wherever a deterministic backend is needed: tests, demos,
//! replaying recorded generations.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use gateia_core::Prompt;

use super::{GenerateOptions, Generation, ModelAdapter, ProviderError};

/// Adapter that replays queued responses in order and records every prompt
/// it receives.
///
/// When the queue is empty it answers with the fallback if one is set,
/// otherwise with `NotConfigured`.
#[derive(Debug)]
pub struct ScriptedAdapter {
    name: String,
    queue: Mutex<VecDeque<Result<Generation, ProviderError>>>,
    fallback: Option<Generation>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a generation.
    pub fn push(self, generation: Generation) -> Self {
        self.queue.lock().push_back(Ok(generation));
        self
    }

    /// Queue a plain-text generation.
    pub fn push_text(self, text: impl Into<String>) -> Self {
        self.push(Generation::text(text))
    }

    /// Queue a failure.
    pub fn push_error(self, error: ProviderError) -> Self {
        self.queue.lock().push_back(Err(error));
        self
    }

    /// Answer with `generation` once the queue runs dry.
    pub fn repeat(mut self, generation: Generation) -> Self {
        self.fallback = Some(generation);
        self
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ModelAdapter for ScriptedAdapter {
    async fn generate(
        &self,
        prompt: &Prompt,
        _options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        self.prompts.lock().push(prompt.clone());

        match self.queue.lock().pop_front() {
            Some(next) => next,
            None => self.fallback.clone().ok_or_else(|| {
                ProviderError::NotConfigured(format!("scripted adapter '{}' has no responses left", self.name))
            }),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
