//! Credential handling for model adapters.
//!
//! API keys are wrapped in [`ApiCredential`] as soon as they are read:
//!
//! - Debug/Display never show the value
//! - The value is zeroed on drop
//! - Using it requires an explicit `.expose()` at the point of use
//!
//! ## Usage
//!
//! ```ignore
//! use gateia_runtime::providers::ApiCredential;
//!
//! let cred = ApiCredential::from_env("OPENAI_API_KEY", "OpenAI API key")?;
//! request.bearer_auth(cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::ProviderError;

/// Origin of a credential, reported instead of its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialSource::Environment => "env",
            CredentialSource::Programmatic => "code",
        })
    }
}

/// API key that never shows up in logs, errors or `Debug` output.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load from the process environment.
    pub fn from_env(env_var: &str, name: &'static str) -> Result<Self, ProviderError> {
        Self::from_lookup(|key| std::env::var(key).ok(), env_var, name).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "{} not set: configure '{}' environment variable",
                name, env_var
            ))
        })
    }

    /// Load through a lookup function (environment, test map, ...). Empty
    /// values count as unset.
    pub fn from_lookup<L>(lookup: L, env_var: &str, name: &'static str) -> Option<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        lookup(env_var)
            .filter(|v| !v.trim().is_empty())
            .map(|v| Self::new(v, CredentialSource::Environment, name))
    }

    /// Expose the credential value. Only call this where the value is
    /// actually sent (an HTTP header); never store the result.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Clone for ApiCredential {
    fn clone(&self) -> Self {
        Self::new(self.expose(), self.source, self.name)
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, redacted)", self.name, self.source)
    }
}
