//! Redaction-safe evidence attached to violations.
//!
//! Evidence must never repeat the sensitive text it was raised for. A policy
//! that detects an email address records *that* it found one, not the
//! address itself.

use serde::{Deserialize, Serialize};

/// A short, redaction-safe pointer to what triggered a violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub snippet: String,
}

impl Evidence {
    /// Evidence carrying a snippet verbatim.
    ///
    /// Only use this for text that is safe to repeat (a matched phrase from a
    /// fixed list, a pattern name).
    pub fn snippet(snippet: impl Into<String>) -> Self {
        Self {
            snippet: snippet.into(),
        }
    }

    /// Evidence recording that a sensitive kind was detected (`"email"` →
    /// `"email-detected-redacted"`).
    pub fn redacted(kind: &str) -> Self {
        Self {
            snippet: format!("{}-detected-redacted", kind),
        }
    }
}
