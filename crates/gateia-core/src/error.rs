//! The single structured error raised on every fatal path.
//!
//! Callers branch on [`GateiaError::report`]: when a report is attached the
//! pipeline ran and produced diagnostics (contract exhaustion, blocked
//! response); when it is absent the call failed on configuration or
//! infrastructure (unknown policy, unknown provider, malformed policy result,
//! adapter failure).

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

use crate::types::{EnforcementReport, FieldError};

/// Boxed cause carried by [`GateiaError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// What went wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("Unknown model provider for: {0}")]
    UnknownProvider(String),

    #[error("Invalid Policy Result from '{policy_id}': {}", FieldError::join(.errors))]
    InvalidPolicyResult {
        policy_id: String,
        errors: Vec<FieldError>,
    },

    #[error("Contract Check Failed")]
    ContractFailed,

    #[error("Policy Blocked Response")]
    PolicyBlocked,

    #[error("Model adapter '{0}' failed")]
    Adapter(String),
}

/// Structured error carrying a trace id, an optional report and an optional
/// wrapped cause.
#[derive(Debug)]
pub struct GateiaError {
    trace_id: String,
    kind: ErrorKind,
    report: Option<Box<EnforcementReport>>,
    cause: Option<BoxError>,
}

impl GateiaError {
    pub fn new(kind: ErrorKind, trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            kind,
            report: None,
            cause: None,
        }
    }

    pub fn with_report(mut self, report: EnforcementReport) -> Self {
        self.report = Some(Box::new(report));
        self
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn report(&self) -> Option<&EnforcementReport> {
        self.report.as_deref()
    }

    pub fn into_report(self) -> Option<EnforcementReport> {
        self.report.map(|r| *r)
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl fmt::Display for GateiaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (trace {})", self.kind, self.trace_id)
    }
}

impl StdError for GateiaError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContractReport, ContractStatus};

    #[test]
    fn test_invalid_result_message_names_policy_and_fields() {
        let err = GateiaError::new(
            ErrorKind::InvalidPolicyResult {
                policy_id: "bad-policy".to_string(),
                errors: vec![FieldError::new("", "\"outcome\" is a required property")],
            },
            "t-1",
        );
        let msg = err.to_string();
        assert!(msg.contains("Invalid Policy Result"));
        assert!(msg.contains("bad-policy"));
        assert!(msg.contains("outcome"));
        assert!(err.report().is_none());
    }

    #[test]
    fn test_report_and_cause_are_carried() {
        let report = EnforcementReport {
            applied_policies: vec![],
            contract: ContractReport {
                outcome: ContractStatus::Fail,
                errors: vec![],
            },
            actions: vec![],
            violations: vec![],
        };
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let err = GateiaError::new(ErrorKind::ContractFailed, "t-2")
            .with_report(report.clone())
            .with_cause(cause);

        assert_eq!(err.trace_id(), "t-2");
        assert_eq!(err.report(), Some(&report));
        assert_eq!(err.source().unwrap().to_string(), "socket closed");
    }
}
