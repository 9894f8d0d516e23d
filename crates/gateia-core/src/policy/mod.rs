//! Policies and the engine that runs them.
//!
//! A [`Policy`] is an id, an optional version, a [`PolicyMode`] and a check.
//! Checks are async and receive the current candidate value plus a read-only
//! [`PolicyContext`]. What a check returns is validated against a fixed
//! result schema before the engine acts on it.

mod engine;
mod result;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::types::{PolicyContext, PolicyMode};

pub use engine::{PolicyEngine, PolicyError, PolicyEvaluation, PolicyRecord};
pub use result::{PolicyResult, RewriteFn};

/// The check behind a policy.
#[async_trait]
pub trait PolicyCheck: Send + Sync {
    async fn check(&self, value: &Value, context: &PolicyContext) -> PolicyResult;
}

struct FnCheck<F>(F);

#[async_trait]
impl<F> PolicyCheck for FnCheck<F>
where
    F: Fn(&Value, &PolicyContext) -> PolicyResult + Send + Sync,
{
    async fn check(&self, value: &Value, context: &PolicyContext) -> PolicyResult {
        (self.0)(value, context)
    }
}

struct AsyncFnCheck<F>(F);

#[async_trait]
impl<F> PolicyCheck for AsyncFnCheck<F>
where
    F: Fn(Value, PolicyContext) -> BoxFuture<'static, PolicyResult> + Send + Sync,
{
    async fn check(&self, value: &Value, context: &PolicyContext) -> PolicyResult {
        (self.0)(value.clone(), context.clone()).await
    }
}

/// A named, stateless content check.
#[derive(Clone)]
pub struct Policy {
    id: String,
    version: Option<String>,
    mode: PolicyMode,
    check: Arc<dyn PolicyCheck>,
}

impl Policy {
    pub fn new(id: impl Into<String>, check: impl PolicyCheck + 'static) -> Self {
        Self {
            id: id.into(),
            version: None,
            mode: PolicyMode::Enforce,
            check: Arc::new(check),
        }
    }

    /// Policy from a synchronous closure.
    pub fn from_fn<F>(id: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value, &PolicyContext) -> PolicyResult + Send + Sync + 'static,
    {
        Self::new(id, FnCheck(check))
    }

    /// Policy from a closure returning a boxed future. The future gets owned
    /// copies of the value and context.
    pub fn from_async_fn<F>(id: impl Into<String>, check: F) -> Self
    where
        F: Fn(Value, PolicyContext) -> BoxFuture<'static, PolicyResult> + Send + Sync + 'static,
    {
        Self::new(id, AsyncFnCheck(check))
    }

    pub fn with_mode(mut self, mode: PolicyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Same check under a different id.
    pub fn renamed(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..self.clone()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    pub async fn check(&self, value: &Value, context: &PolicyContext) -> PolicyResult {
        self.check.check(value, context).await
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// A policy named by library id or supplied inline.
#[derive(Debug, Clone)]
pub enum PolicyRef {
    ByName(String),
    Inline(Policy),
}

impl From<&str> for PolicyRef {
    fn from(name: &str) -> Self {
        PolicyRef::ByName(name.to_string())
    }
}

impl From<String> for PolicyRef {
    fn from(name: String) -> Self {
        PolicyRef::ByName(name)
    }
}

impl From<Policy> for PolicyRef {
    fn from(policy: Policy) -> Self {
        PolicyRef::Inline(policy)
    }
}
