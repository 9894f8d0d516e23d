//! Personally identifiable information.

use async_trait::async_trait;
use serde_json::Value;

use super::patterns::{
    contains_credit_card, contains_dob, contains_email, contains_ip, contains_phone, contains_ssn,
    text_of,
};
use crate::evidence::Evidence;
use crate::policy::{Policy, PolicyCheck, PolicyResult};
use crate::types::{PolicyContext, Severity, Violation};

pub const PII_SAFE: &str = "pii-safe";

/// One entry per detected kind: (detector, code, message, severity, evidence kind).
type Detector = (fn(&str) -> bool, &'static str, &'static str, Severity, &'static str);

const DETECTORS: &[Detector] = &[
    (contains_email, "PII_EMAIL", "Email address detected in output", Severity::High, "email"),
    (contains_phone, "PII_PHONE", "Phone number detected in output", Severity::High, "phone"),
    (contains_ssn, "PII_SSN", "SSN detected in output", Severity::High, "ssn"),
    (
        contains_credit_card,
        "PII_CREDIT_CARD",
        "Credit card number detected in output",
        Severity::High,
        "cc",
    ),
    (contains_ip, "PII_IP", "IP address detected in output", Severity::Med, "ip"),
    (contains_dob, "PII_DOB", "Date of birth detected in output", Severity::High, "dob"),
];

/// Blocks emails, phone numbers, SSNs, card numbers, IP addresses and
/// dates of birth. Evidence is always redacted.
#[derive(Debug, Default)]
pub struct PiiDetector;

impl PiiDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn scan(&self, content: &str) -> Vec<Violation> {
        DETECTORS
            .iter()
            .filter(|(detect, ..)| detect(content))
            .map(|(_, code, message, severity, kind)| {
                Violation::new(PII_SAFE, *code, *message, *severity)
                    .with_evidence(Evidence::redacted(kind))
            })
            .collect()
    }
}

#[async_trait]
impl PolicyCheck for PiiDetector {
    async fn check(&self, value: &Value, _context: &PolicyContext) -> PolicyResult {
        let violations = self.scan(&text_of(value));
        if violations.is_empty() {
            PolicyResult::pass()
        } else {
            PolicyResult::block(violations)
        }
    }
}

pub fn pii_safe() -> Policy {
    Policy::new(PII_SAFE, PiiDetector::new())
}
