//! Active HTML content.

use async_trait::async_trait;
use serde_json::Value;

use super::patterns::{text_of, MARKUP_PATTERNS};
use crate::evidence::Evidence;
use crate::policy::{Policy, PolicyCheck, PolicyResult};
use crate::types::{PolicyContext, Severity, Violation};

pub const MARKUP_SAFE: &str = "markup-safe";

/// Blocks script-capable markup: script/iframe/object/embed tags, inline
/// event handlers, `javascript:` and `data:text/html` URLs.
#[derive(Debug, Default)]
pub struct MarkupScanner;

impl MarkupScanner {
    pub fn new() -> Self {
        Self
    }

    pub fn scan(&self, content: &str) -> Vec<Violation> {
        MARKUP_PATTERNS
            .iter()
            .filter(|(_, pattern)| pattern.is_match(content))
            .map(|(name, _)| {
                Violation::new(
                    MARKUP_SAFE,
                    "UNSAFE_MARKUP",
                    format!("Unsafe markup detected: {}", name),
                    Severity::High,
                )
                .with_evidence(Evidence::snippet(name.to_lowercase().replace(' ', "-")))
            })
            .collect()
    }
}

#[async_trait]
impl PolicyCheck for MarkupScanner {
    async fn check(&self, value: &Value, _context: &PolicyContext) -> PolicyResult {
        let violations = self.scan(&text_of(value));
        if violations.is_empty() {
            PolicyResult::pass()
        } else {
            PolicyResult::block(violations)
        }
    }
}

pub fn markup_safe() -> Policy {
    Policy::new(MARKUP_SAFE, MarkupScanner::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flagged(content: &str) -> bool {
        !MarkupScanner::new().scan(content).is_empty()
    }

    #[test]
    fn test_script_tag() {
        let found = MarkupScanner::new().scan("<script>alert(1)</script>");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "Unsafe markup detected: Script Tag");
        assert_eq!(found[0].evidence.as_ref().unwrap().snippet, "script-tag");
    }

    #[test]
    fn test_event_handlers() {
        assert!(flagged(r#"<img src="x" onerror="alert(1)">"#));
        assert!(flagged("<svg onload=alert(1)>"));
    }

    #[test]
    fn test_dangerous_urls() {
        assert!(flagged(r#"<a href="javascript:alert(1)">x</a>"#));
        assert!(flagged("data:text/html;base64,PHNjcmlwdD4="));
        assert!(flagged("<iframe src=\"https://evil.test\"></iframe>"));
    }

    #[test]
    fn test_plain_links_pass() {
        assert!(!flagged("See https://example.com/help for details."));
        assert!(!flagged(r#"<a href="https://example.com">docs</a>"#));
        assert!(!flagged("One option is fine."));
    }
}
