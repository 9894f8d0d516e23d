//! Ordered policy evaluation.
//!
//! Policies run one at a time in the order given. Each sees the candidate as
//! left by the previous accepted rewrite. A block does not stop evaluation:
//! every policy still runs so the report lists every violation, but once an
//! enforced block has happened no further rewrite is applied.

use serde_json::Value;
use std::ops::Range;
use thiserror::Error;
use tracing::{debug, warn};

use super::result::check_result;
use super::Policy;
use crate::types::{
    ActionType, FieldError, Outcome, PolicyAction, PolicyContext, PolicyMode, Severity, Violation,
};

/// Policy id used for violations the engine itself synthesizes.
pub const ENGINE_POLICY_ID: &str = "gateia-core";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A check returned something that does not match the result schema.
    #[error("Invalid Policy Result from '{policy_id}': {}", FieldError::join(.errors))]
    InvalidResult {
        policy_id: String,
        errors: Vec<FieldError>,
    },
}

/// What one policy returned, as seen by the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRecord {
    pub id: String,
    pub version: Option<String>,

    /// Mode in effect for this call
    pub mode: PolicyMode,

    /// Outcome as returned by the check
    pub outcome: Outcome,

    /// Index range of this policy's violations in [`PolicyEvaluation::violations`]
    pub violations: Range<usize>,
}

/// Aggregate result of running a policy list.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyEvaluation {
    /// `Block` if any enforced policy blocked, else `Pass`
    pub outcome: Outcome,
    pub violations: Vec<Violation>,

    /// Final value, present only if at least one rewrite took effect
    pub rewritten: Option<Value>,

    pub actions: Vec<PolicyAction>,
    pub records: Vec<PolicyRecord>,
}

impl PolicyEvaluation {
    pub fn is_blocked(&self) -> bool {
        self.outcome == Outcome::Block
    }

    /// Violations belonging to one record.
    pub fn violations_of(&self, record: &PolicyRecord) -> &[Violation] {
        self.violations
            .get(record.violations.clone())
            .unwrap_or(&[])
    }
}

/// Runs policies against a candidate value.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `policies` in order against `value`.
    ///
    /// `mode_override = Some(Audit)` puts every policy in audit mode for this
    /// call. Any result that fails the result schema aborts the whole
    /// evaluation.
    pub async fn evaluate(
        &self,
        policies: &[Policy],
        value: &Value,
        context: &PolicyContext,
        mode_override: Option<PolicyMode>,
    ) -> Result<PolicyEvaluation, PolicyError> {
        let mut current = value.clone();
        let mut outcome = Outcome::Pass;
        let mut rewritten = false;
        let mut violations: Vec<Violation> = Vec::new();
        let mut actions = Vec::new();
        let mut records = Vec::with_capacity(policies.len());

        for policy in policies {
            let mode = policy.mode().effective(mode_override);
            let (body, rewrite) = policy.check(&current, context).await.into_parts();

            let (raw, found) = check_result(&body).map_err(|errors| {
                warn!(
                    trace_id = %context.trace_id,
                    policy = policy.id(),
                    errors = %FieldError::join(&errors),
                    "policy returned a malformed result"
                );
                PolicyError::InvalidResult {
                    policy_id: policy.id().to_string(),
                    errors,
                }
            })?;

            debug!(
                trace_id = %context.trace_id,
                policy = policy.id(),
                %mode,
                outcome = %raw,
                violations = found.len(),
                "policy evaluated"
            );

            let start = violations.len();
            violations.extend(found);
            records.push(PolicyRecord {
                id: policy.id().to_string(),
                version: policy.version().map(str::to_string),
                mode,
                outcome: raw,
                violations: start..violations.len(),
            });

            match raw {
                Outcome::Block if mode.is_audit() => {
                    actions.push(
                        PolicyAction::new(ActionType::Log, policy.id())
                            .with_note("would have blocked (audit mode)"),
                    );
                }
                Outcome::Block => {
                    outcome = Outcome::Block;
                    actions.push(PolicyAction::new(ActionType::Block, policy.id()));
                }
                Outcome::Rewrite => {
                    let Some(rewrite) = rewrite else { continue };
                    if mode.is_audit() {
                        actions.push(
                            PolicyAction::new(ActionType::Log, policy.id())
                                .with_note("would have rewritten (audit mode)"),
                        );
                    } else if outcome == Outcome::Block {
                        actions.push(
                            PolicyAction::new(ActionType::Log, policy.id())
                                .with_note("rewrite skipped: response already blocked"),
                        );
                    } else {
                        current = rewrite(std::mem::take(&mut current));
                        rewritten = true;
                        actions.push(
                            PolicyAction::new(ActionType::Rewrite, policy.id())
                                .with_note("output rewritten"),
                        );
                    }
                }
                Outcome::Pass | Outcome::Warn => {}
            }
        }

        if outcome == Outcome::Block && violations.is_empty() {
            violations.push(Violation::new(
                ENGINE_POLICY_ID,
                "POLICY_BLOCK",
                "Response blocked by policy without a stated violation",
                Severity::High,
            ));
        }

        Ok(PolicyEvaluation {
            outcome,
            violations,
            rewritten: rewritten.then_some(current),
            actions,
            records,
        })
    }
}
