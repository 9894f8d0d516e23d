//! Named policies callers can refer to by id.
//!
//! The library is an explicit value, not a global registry. Build one with
//! [`PolicyLibrary::with_builtins`] and register your own policies on top.

pub mod finance;
pub mod markup;
pub mod patterns;
pub mod pii;
pub mod secrets;

use std::collections::BTreeMap;

use crate::policy::{Policy, PolicyRef};

pub use finance::{finance_safe, support_safe, GuaranteeLanguage};
pub use markup::{markup_safe, MarkupScanner};
pub use pii::{pii_safe, PiiDetector};
pub use secrets::{secrets_safe, SecretScanner};

/// Lookup table from policy id to policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyLibrary {
    policies: BTreeMap<String, Policy>,
}

impl PolicyLibrary {
    /// An empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// A library holding `finance-safe`, `support-safe`, `pii-safe`,
    /// `secrets-safe` and `markup-safe`.
    pub fn with_builtins() -> Self {
        let mut library = Self::new();
        for policy in [
            finance_safe(),
            support_safe(),
            pii_safe(),
            secrets_safe(),
            markup_safe(),
        ] {
            library.register(policy);
        }
        library
    }

    /// Add a policy, replacing any existing one with the same id.
    pub fn register(&mut self, policy: Policy) -> &mut Self {
        self.policies.insert(policy.id().to_string(), policy);
        self
    }

    pub fn get(&self, id: &str) -> Option<&Policy> {
        self.policies.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.policies.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Resolve references in order. Fails on the first unknown name, which
    /// is returned as the error.
    pub fn resolve(&self, refs: &[PolicyRef]) -> Result<Vec<Policy>, String> {
        refs.iter()
            .map(|r| match r {
                PolicyRef::Inline(policy) => Ok(policy.clone()),
                PolicyRef::ByName(name) => self.get(name).cloned().ok_or_else(|| name.clone()),
            })
            .collect()
    }
}
