//! Synthesizer: assembles the enforcement report for a call.
//!
//! Per-policy summaries follow fixed rules:
//! 1. If ANY of the policy's own violations is high → `block`
//! 2. Else if it has ANY violation → `warn`
//! 3. Else → `pass`
//!
//! The summary is computed from violations alone, so an audit-mode policy
//! that found a high-severity problem still shows `block` in the report even
//! though the call was allowed.

use crate::policy::PolicyEvaluation;
use crate::types::{
    AppliedPolicy, ContractReport, ContractStatus, EnforcementReport, FieldError, Outcome,
    Severity, Violation,
};

/// Policy id on the violation recorded when the contract never validated.
pub const CONTRACT_POLICY_ID: &str = "contract";

pub struct Synthesizer;

impl Synthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Report for a single-pass contract failure: no policies ran.
    pub fn contract_failure(&self, errors: Vec<FieldError>) -> EnforcementReport {
        EnforcementReport {
            applied_policies: Vec::new(),
            contract: ContractReport {
                outcome: ContractStatus::Fail,
                errors,
            },
            actions: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// Report for a repair loop that ran out of attempts.
    pub fn exhausted(&self, errors: Vec<FieldError>, attempts: u32) -> EnforcementReport {
        let violation = Violation::new(
            CONTRACT_POLICY_ID,
            "CONTRACT_FAILED",
            format!(
                "Output failed contract validation after {} attempt(s): {}",
                attempts,
                FieldError::join(&errors)
            ),
            Severity::High,
        );

        let mut report = self.contract_failure(errors);
        report.violations.push(violation);
        report
    }

    /// Report for a call whose contract check succeeded and whose policies
    /// were evaluated.
    pub fn synthesize(
        &self,
        status: ContractStatus,
        evaluation: &PolicyEvaluation,
    ) -> EnforcementReport {
        let applied_policies = evaluation
            .records
            .iter()
            .map(|record| {
                let own = evaluation.violations_of(record);
                AppliedPolicy {
                    id: record.id.clone(),
                    version: record.version.clone(),
                    mode: record.mode,
                    outcome: self.policy_outcome(own),
                    reasons: own.iter().map(|v| v.message.clone()).collect(),
                }
            })
            .collect();

        EnforcementReport {
            applied_policies,
            contract: ContractReport {
                outcome: status,
                errors: Vec::new(),
            },
            actions: evaluation.actions.clone(),
            violations: evaluation.violations.clone(),
        }
    }

    fn policy_outcome(&self, violations: &[Violation]) -> Outcome {
        if violations.iter().any(|v| v.severity.is_high()) {
            Outcome::Block
        } else if !violations.is_empty() {
            Outcome::Warn
        } else {
            Outcome::Pass
        }
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyRecord;
    use crate::types::{ActionType, PolicyAction, PolicyMode};

    fn record(id: &str, mode: PolicyMode, range: std::ops::Range<usize>) -> PolicyRecord {
        PolicyRecord {
            id: id.to_string(),
            version: None,
            mode,
            outcome: Outcome::Block,
            violations: range,
        }
    }

    #[test]
    fn test_per_policy_outcomes() {
        let evaluation = PolicyEvaluation {
            outcome: Outcome::Block,
            violations: vec![
                Violation::new("a", "A", "high one", Severity::High),
                Violation::new("b", "B", "low one", Severity::Low),
            ],
            rewritten: None,
            actions: vec![PolicyAction::new(ActionType::Block, "a")],
            records: vec![
                record("a", PolicyMode::Enforce, 0..1),
                record("b", PolicyMode::Audit, 1..2),
                record("c", PolicyMode::Enforce, 2..2),
            ],
        };

        let report = Synthesizer::new().synthesize(ContractStatus::Pass, &evaluation);
        let outcomes: Vec<Outcome> = report.applied_policies.iter().map(|p| p.outcome).collect();
        assert_eq!(outcomes, vec![Outcome::Block, Outcome::Warn, Outcome::Pass]);
        assert_eq!(report.applied_policies[0].reasons, vec!["high one"]);
        assert_eq!(report.applied_policies[1].mode, PolicyMode::Audit);
        assert!(report.applied_policies[2].reasons.is_empty());
        assert_eq!(report.violations.len(), 2);
        assert!(report.has_block());
    }

    #[test]
    fn test_exhausted_report() {
        let report =
            Synthesizer::new().exhausted(vec![FieldError::new("val", "expected number")], 4);
        assert_eq!(report.contract.outcome, ContractStatus::Fail);
        assert_eq!(report.contract.errors.len(), 1);
        assert!(report.applied_policies.is_empty());
        assert_eq!(report.violations.len(), 1);
        let v = &report.violations[0];
        assert_eq!(v.policy_id, CONTRACT_POLICY_ID);
        assert_eq!(v.code, "CONTRACT_FAILED");
        assert_eq!(v.severity, Severity::High);
        assert!(v.message.contains("4 attempt(s)"));
    }

    #[test]
    fn test_contract_failure_has_no_violations() {
        let report = Synthesizer::new().contract_failure(vec![FieldError::new("", "bad")]);
        assert!(report.violations.is_empty());
        assert!(report.actions.is_empty());
    }
}
