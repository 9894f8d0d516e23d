//! Guarantee and absolute-assurance language.
//!
//! Registered twice: as `finance-safe` and as `support-safe`. Each
//! registration reports violations under its own id.

use async_trait::async_trait;
use serde_json::Value;

use super::patterns::{text_of, GUARANTEE_PATTERNS, GUARANTEE_PHRASES};
use crate::evidence::Evidence;
use crate::policy::{Policy, PolicyCheck, PolicyResult};
use crate::types::{PolicyContext, Severity, Violation};

pub const FINANCE_SAFE: &str = "finance-safe";
pub const SUPPORT_SAFE: &str = "support-safe";

/// Blocks promises of guaranteed outcomes, risk-free claims and
/// unconditional refunds.
pub struct GuaranteeLanguage {
    policy_id: &'static str,
}

impl GuaranteeLanguage {
    pub fn new(policy_id: &'static str) -> Self {
        Self { policy_id }
    }

    /// The first phrase or pattern label found, if any.
    pub fn find(content: &str) -> Option<&'static str> {
        let lower = content.to_lowercase();

        GUARANTEE_PHRASES
            .iter()
            .copied()
            .find(|phrase| lower.contains(phrase))
            .or_else(|| {
                GUARANTEE_PATTERNS
                    .iter()
                    .find(|(_, pattern)| pattern.is_match(content))
                    .map(|(label, _)| *label)
            })
    }
}

#[async_trait]
impl PolicyCheck for GuaranteeLanguage {
    async fn check(&self, value: &Value, _context: &PolicyContext) -> PolicyResult {
        match Self::find(&text_of(value)) {
            Some(matched) => PolicyResult::block(vec![Violation::new(
                self.policy_id,
                "FIN_GUARANTEE",
                format!("Contains forbidden guarantee language: \"{}\"", matched),
                Severity::High,
            )
            .with_evidence(Evidence::snippet(matched))]),
            None => PolicyResult::pass(),
        }
    }
}

pub fn finance_safe() -> Policy {
    Policy::new(FINANCE_SAFE, GuaranteeLanguage::new(FINANCE_SAFE))
}

pub fn support_safe() -> Policy {
    Policy::new(SUPPORT_SAFE, GuaranteeLanguage::new(SUPPORT_SAFE))
}
