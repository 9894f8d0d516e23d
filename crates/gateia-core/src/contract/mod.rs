//! Contract validation and candidate extraction.
//!
//! A contract is the structural schema a candidate value must satisfy. The
//! pipeline only talks to it through the [`Contract`] trait; the bundled
//! implementation is [`JsonSchemaContract`].

mod extract;
mod parser;
mod schema;

use serde_json::Value;

use crate::types::FieldError;

pub use extract::{extract, extract_text, Extracted};
pub use parser::ContractError;
pub use schema::JsonSchemaContract;

pub(crate) use schema::pointer_to_path;

/// Top-level shape a contract expects, used to decide whether free text
/// should be parsed as JSON before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Object,
    Array,
    Scalar,
    /// No constraint on the root type
    Any,
}

impl RootKind {
    pub fn is_structured(self) -> bool {
        matches!(self, RootKind::Object | RootKind::Array)
    }
}

/// Result of validating a value against a contract.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractOutcome {
    /// The canonicalized value (defaults applied, unknown fields handled per
    /// the contract's rules)
    Valid { data: Value },

    /// Every violated path, in validator order, plus the joined string form
    Invalid {
        error: String,
        errors: Vec<FieldError>,
    },
}

impl ContractOutcome {
    pub fn invalid(errors: Vec<FieldError>) -> Self {
        ContractOutcome::Invalid {
            error: FieldError::join(&errors),
            errors,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ContractOutcome::Valid { .. })
    }

    pub fn errors(&self) -> &[FieldError] {
        match self {
            ContractOutcome::Valid { .. } => &[],
            ContractOutcome::Invalid { errors, .. } => errors,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ContractOutcome::Valid { .. } => None,
            ContractOutcome::Invalid { error, .. } => Some(error),
        }
    }
}

/// Capability interface for a structural schema.
pub trait Contract: Send + Sync {
    /// Validate (and canonicalize) a candidate value.
    fn validate(&self, value: &Value) -> ContractOutcome;

    /// The root shape this contract expects.
    fn root_kind(&self) -> RootKind {
        RootKind::Any
    }

    /// Whether free text should be parsed into structured data first.
    fn expects_structured(&self) -> bool {
        self.root_kind().is_structured()
    }
}

/// Build the follow-up instruction sent to a model after a failed attempt.
pub fn format_repair_instruction(error: &str) -> String {
    format!(
        "The previous response failed schema validation:\n{}\nPlease fix the JSON to match the schema. Return ONLY valid JSON.",
        error
    )
}
