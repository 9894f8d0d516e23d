//! Model-name → adapter routing.
//!
//! Resolution order: exact-name overrides first, then routes in
//! registration order (first match wins). Adding a backend means adding a
//! route, not editing an enum.
//!
//! ## Usage
//!
//! ```ignore
//! let mut registry = ModelRegistry::with_defaults(&RuntimeConfig::from_env()?);
//! registry.register_override("my-finetune", Arc::new(MyAdapter::new()));
//!
//! let adapter = registry.resolve("gpt-4o").expect("routed to openai");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{GeminiAdapter, ModelAdapter, OllamaAdapter, OpenAiAdapter};
use crate::config::RuntimeConfig;

type ModelPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// One routing rule: models matching `predicate` go to `adapter`.
#[derive(Clone)]
pub struct ModelRoute {
    predicate: ModelPredicate,
    adapter: Arc<dyn ModelAdapter>,
}

impl ModelRoute {
    pub fn new<P>(predicate: P, adapter: Arc<dyn ModelAdapter>) -> Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            adapter,
        }
    }

    /// Route models starting with any of `prefixes`.
    pub fn prefixed(prefixes: &[&str], adapter: Arc<dyn ModelAdapter>) -> Self {
        let prefixes: Vec<String> = prefixes.iter().map(|p| p.to_string()).collect();
        Self::new(
            move |model| prefixes.iter().any(|p| model.starts_with(p.as_str())),
            adapter,
        )
    }

    pub fn matches(&self, model: &str) -> bool {
        (self.predicate)(model)
    }

    pub fn adapter(&self) -> &Arc<dyn ModelAdapter> {
        &self.adapter
    }
}

impl fmt::Debug for ModelRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRoute")
            .field("adapter", &self.adapter.name())
            .finish_non_exhaustive()
    }
}

/// Registry of model routes and per-model overrides.
#[derive(Default, Clone)]
pub struct ModelRegistry {
    routes: Vec<ModelRoute>,
    overrides: BTreeMap<String, Arc<dyn ModelAdapter>>,
}

impl ModelRegistry {
    /// Create an empty registry (nothing resolves).
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in routes:
    /// `gpt-*`, `openai/*` → OpenAI; `gemini-*`, `google/*` → Gemini;
    /// `ollama/*` → Ollama.
    pub fn with_defaults(config: &RuntimeConfig) -> Self {
        let mut registry = Self::new();
        registry
            .add_route(ModelRoute::prefixed(
                &["gpt-", "openai/"],
                Arc::new(OpenAiAdapter::from_config(config)),
            ))
            .add_route(ModelRoute::prefixed(
                &["gemini-", "google/"],
                Arc::new(GeminiAdapter::from_config(config)),
            ))
            .add_route(ModelRoute::prefixed(
                &["ollama/"],
                Arc::new(OllamaAdapter::from_config(config)),
            ));
        registry
    }

    /// Append a route; earlier routes take precedence.
    pub fn add_route(&mut self, route: ModelRoute) -> &mut Self {
        self.routes.push(route);
        self
    }

    /// Send exactly `model` to `adapter`, ahead of every route. Replaces any
    /// previous override for the same name.
    pub fn register_override(
        &mut self,
        model: impl Into<String>,
        adapter: Arc<dyn ModelAdapter>,
    ) -> &mut Self {
        self.overrides.insert(model.into(), adapter);
        self
    }

    /// Find the adapter for a model name.
    pub fn resolve(&self, model: &str) -> Option<Arc<dyn ModelAdapter>> {
        if let Some(adapter) = self.overrides.get(model) {
            return Some(Arc::clone(adapter));
        }

        self.routes
            .iter()
            .find(|route| route.matches(model))
            .map(|route| Arc::clone(&route.adapter))
    }

    pub fn overridden_models(&self) -> Vec<&str> {
        self.overrides.keys().map(|k| k.as_str()).collect()
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("routes", &self.routes)
            .field("overrides", &self.overridden_models())
            .finish()
    }
}
