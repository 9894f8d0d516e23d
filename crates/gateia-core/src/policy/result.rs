//! What a policy check returns, and the schema gate it must pass.

use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::OnceLock;

use crate::contract::pointer_to_path;
use crate::types::{FieldError, Outcome, Violation};

/// Embedded result schema (loaded at compile time).
const POLICY_RESULT_SCHEMA_JSON: &str = include_str!("../../../../spec/policy_result.schema.json");

/// Compiled result validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema: Value = serde_json::from_str(POLICY_RESULT_SCHEMA_JSON)
            .map_err(|e| format!("Invalid result schema JSON: {}", e))?;
        jsonschema::options()
            .build(&schema)
            .map_err(|e| format!("Failed to compile result schema: {}", e))
    });

    result.as_ref().map_err(Clone::clone)
}

/// Replacement function carried by a `rewrite` result.
pub type RewriteFn = Box<dyn FnOnce(Value) -> Value + Send>;

/// Raw result of one policy check.
///
/// The outcome and violations travel as an untyped JSON body so that
/// dynamically built policies go through the same validation as typed ones.
pub struct PolicyResult {
    body: Value,
    rewrite: Option<RewriteFn>,
}

impl PolicyResult {
    fn with_outcome(outcome: Outcome, violations: Vec<Violation>) -> Self {
        let mut body = json!({ "outcome": outcome.as_str() });
        if !violations.is_empty() {
            // A violation that fails to serialize leaves `null`, which the
            // result schema rejects.
            body["violations"] = serde_json::to_value(&violations).unwrap_or(Value::Null);
        }
        Self {
            body,
            rewrite: None,
        }
    }

    pub fn pass() -> Self {
        Self::with_outcome(Outcome::Pass, Vec::new())
    }

    pub fn block(violations: Vec<Violation>) -> Self {
        Self::with_outcome(Outcome::Block, violations)
    }

    pub fn warn(violations: Vec<Violation>) -> Self {
        Self::with_outcome(Outcome::Warn, violations)
    }

    pub fn rewrite<F>(rewrite: F) -> Self
    where
        F: FnOnce(Value) -> Value + Send + 'static,
    {
        Self::with_outcome(Outcome::Rewrite, Vec::new()).with_rewrite(rewrite)
    }

    /// Result from an arbitrary JSON body. Checked against the result schema
    /// by the engine like any other result.
    pub fn from_json(body: Value) -> Self {
        Self {
            body,
            rewrite: None,
        }
    }

    pub fn with_violations(self, violations: Vec<Violation>) -> Self {
        let mut next = Self::with_outcome(Outcome::Pass, violations);
        next.body["outcome"] = self.body.get("outcome").cloned().unwrap_or(Value::Null);
        next.rewrite = self.rewrite;
        next
    }

    pub fn with_rewrite<F>(mut self, rewrite: F) -> Self
    where
        F: FnOnce(Value) -> Value + Send + 'static,
    {
        self.rewrite = Some(Box::new(rewrite));
        self
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub(crate) fn into_parts(self) -> (Value, Option<RewriteFn>) {
        (self.body, self.rewrite)
    }
}

impl fmt::Debug for PolicyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyResult")
            .field("body", &self.body)
            .field("rewrite", &self.rewrite.is_some())
            .finish()
    }
}

#[derive(Deserialize)]
struct ResultBody {
    outcome: Outcome,
    #[serde(default)]
    violations: Vec<Violation>,
}

/// Validate a result body and pull out the typed outcome and violations.
pub(crate) fn check_result(body: &Value) -> Result<(Outcome, Vec<Violation>), Vec<FieldError>> {
    let validator = get_validator().map_err(|e| vec![FieldError::new("", e)])?;

    let errors: Vec<FieldError> = validator
        .iter_errors(body)
        .map(|e| FieldError::new(pointer_to_path(&e.instance_path.to_string()), e.to_string()))
        .collect();
    if !errors.is_empty() {
        return Err(errors);
    }

    let parsed = ResultBody::deserialize(body).map_err(|e| vec![FieldError::new("", e.to_string())])?;
    Ok((parsed.outcome, parsed.violations))
}
