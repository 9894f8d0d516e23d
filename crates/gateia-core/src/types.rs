//! Shared types for contract validation and policy enforcement.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::evidence::Evidence;

/// What a policy decided about a candidate value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Block,
    Warn,
    Rewrite,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Block => "block",
            Outcome::Warn => "warn",
            Outcome::Rewrite => "rewrite",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a policy's block outcome is binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// A block affects the final decision.
    #[default]
    Enforce,
    /// A block is recorded but never affects the final decision.
    Audit,
}

impl PolicyMode {
    pub fn is_audit(self) -> bool {
        matches!(self, PolicyMode::Audit)
    }

    /// Resolve the mode in effect for one call.
    ///
    /// A call-level `Audit` override wins over the policy's own mode. A
    /// call-level `Enforce` (or no override) leaves the policy's mode alone.
    pub fn effective(self, call_override: Option<PolicyMode>) -> PolicyMode {
        match call_override {
            Some(PolicyMode::Audit) => PolicyMode::Audit,
            _ => self,
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyMode::Enforce => f.write_str("enforce"),
            PolicyMode::Audit => f.write_str("audit"),
        }
    }
}

/// Severity of a single violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Med,
    High,
}

impl Severity {
    pub fn is_high(self) -> bool {
        matches!(self, Severity::High)
    }
}

/// One recorded finding from a policy check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Policy that produced the finding
    pub policy_id: String,

    /// Stable machine-readable code (e.g. "PII_EMAIL")
    pub code: String,

    /// Human-readable description
    pub message: String,

    pub severity: Severity,

    /// Redaction-safe evidence, never the sensitive text itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
}

impl Violation {
    pub fn new(
        policy_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            policy_id: policy_id.into(),
            code: code.into(),
            message: message.into(),
            severity,
            evidence: None,
        }
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = Some(evidence);
        self
    }
}

/// A path-qualified validation error.
///
/// Paths are dot-joined field names and array indexes (`profile.age`,
/// `items.0.name`). The root of the value is the empty path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Join errors into the single-string form (`path: message; ...`).
    pub fn join(errors: &[FieldError]) -> String {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Prompt sent to a model, either plain text or a system/user pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    Chat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system: Option<String>,
        user: String,
    },
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Prompt::Text(text.into())
    }

    pub fn chat(system: Option<String>, user: impl Into<String>) -> Self {
        Prompt::Chat {
            system,
            user: user.into(),
        }
    }

    /// Flatten to a single string (system first, then user).
    pub fn flatten(&self) -> String {
        match self {
            Prompt::Text(text) => text.clone(),
            Prompt::Chat { system, user } => match system {
                Some(system) => format!("{}\n{}", system, user),
                None => user.clone(),
            },
        }
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}

/// Read-only metadata handed to every policy check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyContext {
    pub trace_id: String,

    /// Model that produced the value (gate only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Original prompt, before any repair turns (gate only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,

    /// Caller-supplied labels, for audit only
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl PolicyContext {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            model: None,
            prompt: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Result of structural validation as recorded in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Valid on the first attempt
    Pass,
    /// Never became valid
    Fail,
    /// Valid after at least one repair attempt
    Repaired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractReport {
    pub outcome: ContractStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Rewrite,
    Block,
    Log,
}

/// Something the policy engine did (or would have done) to the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyAction {
    #[serde(rename = "type")]
    pub action: ActionType,

    pub policy_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl PolicyAction {
    pub fn new(action: ActionType, policy_id: impl Into<String>) -> Self {
        Self {
            action,
            policy_id: policy_id.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Per-policy summary in the enforcement report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPolicy {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Mode in effect for this call (after any call-level override)
    pub mode: PolicyMode,

    pub outcome: Outcome,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

/// Per-call record of everything the gate decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementReport {
    pub applied_policies: Vec<AppliedPolicy>,
    pub contract: ContractReport,
    pub actions: Vec<PolicyAction>,
    pub violations: Vec<Violation>,
}

impl EnforcementReport {
    /// True if any recorded action was an enforced block.
    pub fn has_block(&self) -> bool {
        self.actions.iter().any(|a| a.action == ActionType::Block)
    }

    pub fn was_rewritten(&self) -> bool {
        self.actions.iter().any(|a| a.action == ActionType::Rewrite)
    }

    /// Violations produced by one policy id, in report order.
    pub fn violations_for<'a>(&'a self, policy_id: &'a str) -> impl Iterator<Item = &'a Violation> {
        self.violations
            .iter()
            .filter(move |v| v.policy_id == policy_id)
    }
}
