//! Credentials and API keys.

use async_trait::async_trait;
use serde_json::Value;

use super::patterns::{text_of, SECRET_PATTERNS};
use crate::evidence::Evidence;
use crate::policy::{Policy, PolicyCheck, PolicyResult};
use crate::types::{PolicyContext, Severity, Violation};

pub const SECRETS_SAFE: &str = "secrets-safe";

/// Evidence snippet for every secret finding. The secret itself is never
/// repeated.
pub const REDACTED_SECRET: &str = "REDACTED_SECRET";

#[derive(Debug, Default)]
pub struct SecretScanner;

impl SecretScanner {
    pub fn new() -> Self {
        Self
    }

    pub fn scan(&self, content: &str) -> Vec<Violation> {
        SECRET_PATTERNS
            .iter()
            .filter(|(_, pattern)| pattern.is_match(content))
            .map(|(name, _)| {
                Violation::new(
                    SECRETS_SAFE,
                    "SECRET_DETECTED",
                    format!("Potential {} detected", name),
                    Severity::High,
                )
                .with_evidence(Evidence::snippet(REDACTED_SECRET))
            })
            .collect()
    }
}

#[async_trait]
impl PolicyCheck for SecretScanner {
    async fn check(&self, value: &Value, _context: &PolicyContext) -> PolicyResult {
        let violations = self.scan(&text_of(value));
        if violations.is_empty() {
            PolicyResult::pass()
        } else {
            PolicyResult::block(violations)
        }
    }
}

pub fn secrets_safe() -> Policy {
    Policy::new(SECRETS_SAFE, SecretScanner::new())
}
