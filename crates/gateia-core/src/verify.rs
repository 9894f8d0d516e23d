//! Verifying output that already exists.
//!
//! [`Verifier`] owns the pieces both entry points share: the policy library,
//! the engine, the report synthesizer and the trace-id generator. The model
//! gate in the runtime crate drives the same steps through the public
//! helpers here, adding its repair loop in front.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::contract::{extract, Contract, ContractOutcome};
use crate::error::{ErrorKind, GateiaError};
use crate::library::PolicyLibrary;
use crate::policy::{Policy, PolicyEngine, PolicyError, PolicyRef};
use crate::synthesizer::Synthesizer;
use crate::trace::{TimestampTraceIds, TraceIdGenerator};
use crate::types::{ContractStatus, EnforcementReport, FieldError, PolicyContext, PolicyMode};

/// Candidate after extraction, with its validation outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractCheck {
    /// What was validated (extracted from text when the contract expects
    /// structured data)
    pub candidate: Value,
    pub outcome: ContractOutcome,
}

/// Result of running policies over a validated value.
#[derive(Debug, Clone, PartialEq)]
pub struct Enforcement {
    pub report: EnforcementReport,

    /// Validated value after any accepted rewrites
    pub output: Value,

    /// True if an enforced policy blocked
    pub blocked: bool,
}

/// Input to [`Verifier::verify`].
#[derive(Clone)]
pub struct VerifyRequest {
    pub output: Value,
    pub contract: Arc<dyn Contract>,
    pub policies: Vec<PolicyRef>,

    /// `Some(Audit)` puts every policy in audit mode for this call
    pub mode: Option<PolicyMode>,

    pub include_raw_output: bool,

    /// Labels handed to policies through the context
    pub metadata: BTreeMap<String, String>,
}

impl VerifyRequest {
    pub fn new(output: impl Into<Value>, contract: impl Contract + 'static) -> Self {
        Self::with_shared_contract(output, Arc::new(contract))
    }

    pub fn with_shared_contract(output: impl Into<Value>, contract: Arc<dyn Contract>) -> Self {
        Self {
            output: output.into(),
            contract,
            policies: Vec::new(),
            mode: None,
            include_raw_output: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn policy(mut self, policy: impl Into<PolicyRef>) -> Self {
        self.policies.push(policy.into());
        self
    }

    pub fn policies<I, P>(mut self, policies: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PolicyRef>,
    {
        self.policies.extend(policies.into_iter().map(Into::into));
        self
    }

    pub fn mode(mut self, mode: PolicyMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn include_raw_output(mut self, include: bool) -> Self {
        self.include_raw_output = include;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl fmt::Debug for VerifyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyRequest")
            .field("output", &self.output)
            .field("policies", &self.policies)
            .field("mode", &self.mode)
            .field("include_raw_output", &self.include_raw_output)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`Verifier::verify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResult {
    /// True iff the contract passed and no enforced policy blocked
    pub allowed: bool,

    /// Validated, possibly rewritten value; `None` when not allowed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_output: Option<Value>,

    pub trace_id: String,
    pub enforcement: EnforcementReport,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<Value>,
}

/// Contract + policy checker for existing output.
///
/// Cheap to share behind an `Arc`; every call builds its own report.
pub struct Verifier {
    library: PolicyLibrary,
    engine: PolicyEngine,
    synthesizer: Synthesizer,
    trace_ids: Arc<dyn TraceIdGenerator>,
}

impl Verifier {
    pub fn new(library: PolicyLibrary) -> Self {
        Self {
            library,
            engine: PolicyEngine::new(),
            synthesizer: Synthesizer::new(),
            trace_ids: Arc::new(TimestampTraceIds::new()),
        }
    }

    pub fn with_trace_ids(mut self, trace_ids: impl TraceIdGenerator + 'static) -> Self {
        self.trace_ids = Arc::new(trace_ids);
        self
    }

    pub fn library(&self) -> &PolicyLibrary {
        &self.library
    }

    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }

    pub fn next_trace_id(&self) -> String {
        self.trace_ids.next_id()
    }

    /// Resolve policy references against the library.
    pub fn resolve(&self, refs: &[PolicyRef], trace_id: &str) -> Result<Vec<Policy>, GateiaError> {
        self.library.resolve(refs).map_err(|name| {
            tracing::warn!(trace_id, policy = %name, "unknown policy");
            GateiaError::new(ErrorKind::UnknownPolicy(name), trace_id)
        })
    }

    /// Extract (when the contract expects structured data) and validate.
    ///
    /// If the text could not be parsed and validation then fails, the parse
    /// failure is reported as the first error, at the root path.
    pub fn check_contract(&self, contract: &dyn Contract, candidate: Value) -> ContractCheck {
        let extracted = extract(candidate, contract.root_kind());
        let outcome = match (contract.validate(&extracted.value), extracted.parse_error) {
            (ContractOutcome::Invalid { errors, .. }, Some(parse_error)) => {
                let mut all = Vec::with_capacity(errors.len() + 1);
                all.push(FieldError::new("", parse_error));
                all.extend(errors);
                ContractOutcome::invalid(all)
            }
            (outcome, _) => outcome,
        };

        ContractCheck {
            candidate: extracted.value,
            outcome,
        }
    }

    /// Run policies over a validated value and assemble the report.
    pub async fn enforce(
        &self,
        status: ContractStatus,
        validated: Value,
        policies: &[Policy],
        context: &PolicyContext,
        mode: Option<PolicyMode>,
    ) -> Result<Enforcement, GateiaError> {
        let evaluation = self
            .engine
            .evaluate(policies, &validated, context, mode)
            .await
            .map_err(|e| match e {
                PolicyError::InvalidResult { policy_id, errors } => GateiaError::new(
                    ErrorKind::InvalidPolicyResult { policy_id, errors },
                    context.trace_id.clone(),
                ),
            })?;

        let report = self.synthesizer.synthesize(status, &evaluation);
        let blocked = evaluation.is_blocked();
        let output = evaluation.rewritten.unwrap_or(validated);

        Ok(Enforcement {
            report,
            output,
            blocked,
        })
    }

    /// Validate `output` against the contract once, then run the policies.
    ///
    /// A contract failure is not an error: the result is simply not allowed.
    /// Errors are returned for unknown policy names and malformed policy
    /// results.
    pub async fn verify(&self, request: VerifyRequest) -> Result<VerifyResult, GateiaError> {
        let trace_id = self.next_trace_id();
        let policies = self.resolve(&request.policies, &trace_id)?;

        let raw_output = request.include_raw_output.then(|| request.output.clone());
        let check = self.check_contract(request.contract.as_ref(), request.output);

        let data = match check.outcome {
            ContractOutcome::Valid { data } => data,
            ContractOutcome::Invalid { error, errors } => {
                tracing::debug!(trace_id = %trace_id, %error, "contract check failed");
                return Ok(VerifyResult {
                    allowed: false,
                    safe_output: None,
                    trace_id,
                    enforcement: self.synthesizer.contract_failure(errors),
                    raw_output,
                });
            }
        };

        let context = PolicyContext::new(trace_id.clone()).with_metadata(request.metadata);
        let enforcement = self
            .enforce(ContractStatus::Pass, data, &policies, &context, request.mode)
            .await?;

        if enforcement.blocked {
            tracing::warn!(
                trace_id = %trace_id,
                violations = enforcement.report.violations.len(),
                "output blocked by policy"
            );
        }

        let allowed = !enforcement.blocked;
        Ok(VerifyResult {
            allowed,
            safe_output: allowed.then_some(enforcement.output),
            trace_id,
            enforcement: enforcement.report,
            raw_output,
        })
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(PolicyLibrary::with_builtins())
    }
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::JsonSchemaContract;
    use crate::policy::PolicyResult;
    use crate::types::{ActionType, Outcome, Severity, Violation};
    use proptest::prelude::*;
    use serde_json::json;

    fn reply_contract() -> JsonSchemaContract {
        JsonSchemaContract::new(json!({
            "type": "object",
            "required": ["reply"],
            "properties": { "reply": { "type": "string" } }
        }))
        .unwrap()
    }

    fn verifier() -> Verifier {
        Verifier::default().with_trace_ids(|| "trace-test".to_string())
    }

    fn censor() -> Policy {
        Policy::from_fn("censor", |value, _| {
            let text = value.as_str().unwrap_or_default();
            if text.contains("darn") {
                let replaced = text.replace("darn", "d**n");
                PolicyResult::rewrite(move |_| Value::String(replaced))
            } else {
                PolicyResult::pass()
            }
        })
    }

    fn string_contract() -> JsonSchemaContract {
        JsonSchemaContract::new(json!({"type": "string"})).unwrap()
    }

    #[tokio::test]
    async fn test_clean_output_allowed() {
        let input = json!({"reply": "Your order shipped."});
        let result = verifier()
            .verify(
                VerifyRequest::new(input.clone(), reply_contract())
                    .policies(["finance-safe", "pii-safe"]),
            )
            .await
            .unwrap();

        assert!(result.allowed);
        assert_eq!(result.safe_output, Some(input));
        assert_eq!(result.trace_id, "trace-test");
        assert!(result.enforcement.violations.is_empty());
        assert_eq!(result.enforcement.contract.outcome, ContractStatus::Pass);
        assert_eq!(result.enforcement.applied_policies.len(), 2);
        assert!(result.raw_output.is_none());
    }

    #[tokio::test]
    async fn test_finance_and_pii_block_together() {
        let result = verifier()
            .verify(
                VerifyRequest::new(
                    json!({"reply": "This is a risk-free investment, email me at joe@x.com"}),
                    reply_contract(),
                )
                .policies(["finance-safe", "pii-safe"]),
            )
            .await
            .unwrap();

        assert!(!result.allowed);
        assert!(result.safe_output.is_none());
        let codes: Vec<&str> = result
            .enforcement
            .violations
            .iter()
            .map(|v| v.code.as_str())
            .collect();
        assert_eq!(codes, vec!["FIN_GUARANTEE", "PII_EMAIL"]);
        let blocks: Vec<&str> = result
            .enforcement
            .actions
            .iter()
            .filter(|a| a.action == ActionType::Block)
            .map(|a| a.policy_id.as_str())
            .collect();
        assert_eq!(blocks, vec!["finance-safe", "pii-safe"]);
    }

    #[tokio::test]
    async fn test_fenced_json_extracted() {
        let text = "Sure thing!\n```json\n{\"reply\": \"hello\"}\n```";
        let result = verifier()
            .verify(VerifyRequest::new(text, reply_contract()).include_raw_output(true))
            .await
            .unwrap();

        assert!(result.allowed);
        assert_eq!(result.safe_output, Some(json!({"reply": "hello"})));
        assert_eq!(result.raw_output, Some(json!(text)));
    }

    #[tokio::test]
    async fn test_rewrite_produces_safe_output() {
        let result = verifier()
            .verify(VerifyRequest::new("Oh darn it", string_contract()).policy(censor()))
            .await
            .unwrap();

        assert!(result.allowed);
        assert_eq!(result.safe_output, Some(json!("Oh d**n it")));
        assert!(result.enforcement.was_rewritten());
    }

    #[tokio::test]
    async fn test_contract_failure_skips_policies() {
        let contract = JsonSchemaContract::new(json!({
            "type": "object",
            "required": ["val"],
            "properties": { "val": { "type": "number" } }
        }))
        .unwrap();
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        let spy = Policy::from_fn("spy", move |_, _| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            PolicyResult::pass()
        });

        let result = verifier()
            .verify(VerifyRequest::new(json!({"val": "string"}), contract).policy(spy))
            .await
            .unwrap();

        assert!(!result.allowed);
        assert!(result.safe_output.is_none());
        assert_eq!(result.enforcement.contract.outcome, ContractStatus::Fail);
        assert_eq!(result.enforcement.contract.errors[0].path, "val");
        assert!(result.enforcement.applied_policies.is_empty());
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_refund_guarantee_and_email_both_reported() {
        let result = verifier()
            .verify(
                VerifyRequest::new(
                    json!({"reply": "Refund guaranteed. Email me at test@example.com"}),
                    reply_contract(),
                )
                .policies(["finance-safe", "pii-safe"]),
            )
            .await
            .unwrap();

        assert!(!result.allowed);
        assert!(result.safe_output.is_none());
        let found: Vec<(&str, &str)> = result
            .enforcement
            .violations
            .iter()
            .map(|v| (v.policy_id.as_str(), v.code.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![("finance-safe", "FIN_GUARANTEE"), ("pii-safe", "PII_EMAIL")]
        );
    }

    #[tokio::test]
    async fn test_fenced_message_and_score_extracted() {
        let contract = JsonSchemaContract::new(json!({
            "type": "object",
            "required": ["message", "score"],
            "properties": {
                "message": { "type": "string" },
                "score": { "type": "number" }
            }
        }))
        .unwrap();

        let result = verifier()
            .verify(VerifyRequest::new(
                "Here is the reply:\n```json\n{ \"message\": \"ok\", \"score\": 9 }\n```",
                contract,
            ))
            .await
            .unwrap();

        assert!(result.allowed);
        assert_eq!(result.safe_output, Some(json!({"message": "ok", "score": 9})));
        assert!(result.enforcement.violations.is_empty());
    }

    #[tokio::test]
    async fn test_rewrite_of_object_field_keeps_shape() {
        let contract = JsonSchemaContract::new(json!({
            "type": "object",
            "required": ["message"],
            "properties": { "message": { "type": "string" } }
        }))
        .unwrap();
        let censor_message = Policy::from_fn("censor-message", |value, _| {
            let message = value["message"].as_str().unwrap_or_default();
            if message.contains("darn") {
                let replaced = message.replace("darn", "d**n");
                PolicyResult::rewrite(move |mut v| {
                    v["message"] = Value::String(replaced);
                    v
                })
            } else {
                PolicyResult::pass()
            }
        });

        let result = verifier()
            .verify(
                VerifyRequest::new(json!({"message": "That implies darn risk"}), contract)
                    .policy(censor_message),
            )
            .await
            .unwrap();

        assert!(result.allowed);
        assert_eq!(
            result.safe_output,
            Some(json!({"message": "That implies d**n risk"}))
        );
        assert!(result.enforcement.was_rewritten());
    }

    #[tokio::test]
    async fn test_string_where_number_expected_fails() {
        let contract = JsonSchemaContract::new(json!({
            "type": "object",
            "required": ["val"],
            "properties": { "val": { "type": "number" } }
        }))
        .unwrap();

        let result = verifier()
            .verify(VerifyRequest::new(json!({"val": "string"}), contract))
            .await
            .unwrap();

        assert!(!result.allowed);
        assert!(result.safe_output.is_none());
        assert_eq!(result.enforcement.contract.outcome, ContractStatus::Fail);
        assert_eq!(result.enforcement.contract.errors.len(), 1);
        assert_eq!(result.enforcement.contract.errors[0].path, "val");
    }

    #[tokio::test]
    async fn test_fenced_json_extracted_for_ref_root() {
        let contract = JsonSchemaContract::new(json!({
            "$ref": "#/definitions/Reply",
            "definitions": {
                "Reply": {
                    "type": "object",
                    "required": ["a"],
                    "properties": { "a": { "type": "string" } }
                }
            }
        }))
        .unwrap();

        let result = verifier()
            .verify(VerifyRequest::new("```json\n{\"a\":\"x\"}\n```", contract))
            .await
            .unwrap();

        assert!(result.allowed);
        assert_eq!(result.safe_output, Some(json!({"a": "x"})));
    }

    #[tokio::test]
    async fn test_unparseable_text_reports_parse_error_first() {
        let result = verifier()
            .verify(VerifyRequest::new("not json at all", reply_contract()))
            .await
            .unwrap();

        assert!(!result.allowed);
        let errors = &result.enforcement.contract.errors;
        assert_eq!(errors[0].path, "");
        assert!(errors[0].message.starts_with("Failed to parse JSON"));
        assert!(errors.len() >= 2);
    }

    #[tokio::test]
    async fn test_unknown_policy_is_error_without_report() {
        let err = verifier()
            .verify(VerifyRequest::new(json!({"reply": "x"}), reply_contract()).policy("nope"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnknownPolicy("nope".to_string()));
        assert!(err.report().is_none());
        assert_eq!(err.trace_id(), "trace-test");
    }

    #[tokio::test]
    async fn test_malformed_policy_result_is_error() {
        let bad = Policy::from_fn("bad-policy", |_, _| PolicyResult::from_json(json!({"foo": "bar"})));
        let err = verifier()
            .verify(VerifyRequest::new(json!({"reply": "x"}), reply_contract()).policy(bad))
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::InvalidPolicyResult { policy_id, .. } if policy_id == "bad-policy"
        ));
        assert!(err.to_string().contains("Invalid Policy Result"));
        assert!(err.report().is_none());
    }

    #[tokio::test]
    async fn test_audit_override_allows_blocked_output() {
        let result = verifier()
            .verify(
                VerifyRequest::new(json!({"reply": "100% guaranteed returns"}), reply_contract())
                    .policy("finance-safe")
                    .mode(PolicyMode::Audit),
            )
            .await
            .unwrap();

        assert!(result.allowed);
        assert_eq!(result.enforcement.violations.len(), 1);
        assert_eq!(result.enforcement.actions[0].action, ActionType::Log);
        assert_eq!(result.enforcement.applied_policies[0].mode, PolicyMode::Audit);
        assert_eq!(result.enforcement.applied_policies[0].outcome, Outcome::Block);
    }

    #[tokio::test]
    async fn test_metadata_reaches_policies() {
        let tenant = Policy::from_fn("tenant", |_, ctx| {
            if ctx.metadata.get("tenant").map(String::as_str) == Some("acme") {
                PolicyResult::pass()
            } else {
                PolicyResult::block(vec![])
            }
        });
        let result = verifier()
            .verify(
                VerifyRequest::new(json!({"reply": "x"}), reply_contract())
                    .policy(tenant)
                    .metadata("tenant", "acme"),
            )
            .await
            .unwrap();
        assert!(result.allowed);
    }

    fn scored(id: &'static str, severity: Severity, block: bool) -> Policy {
        Policy::from_fn(id, move |_, _| {
            let v = vec![Violation::new(id, "CODE", format!("{} finding", id), severity)];
            if block {
                PolicyResult::block(v)
            } else {
                PolicyResult::warn(v)
            }
        })
    }

    fn arb_policy() -> impl Strategy<Value = (Severity, bool, bool)> {
        (
            prop_oneof![Just(Severity::Low), Just(Severity::Med), Just(Severity::High)],
            any::<bool>(),
            any::<bool>(),
        )
    }

    const IDS: [&str; 5] = ["p0", "p1", "p2", "p3", "p4"];

    proptest! {
        #[test]
        fn repeated_verify_is_identical(specs in prop::collection::vec(arb_policy(), 0..5)) {
            let policies: Vec<Policy> = specs
                .iter()
                .zip(IDS)
                .map(|((severity, block, _), id)| scored(id, *severity, *block))
                .collect();
            let v = verifier();
            let run = || {
                futures::executor::block_on(v.verify(
                    VerifyRequest::new(json!({"reply": "hi"}), reply_contract())
                        .policies(policies.clone()),
                ))
                .unwrap()
            };
            prop_assert_eq!(run(), run());
        }

        #[test]
        fn audit_policies_never_block(specs in prop::collection::vec(arb_policy(), 0..5)) {
            let policies: Vec<Policy> = specs
                .iter()
                .zip(IDS)
                .map(|((severity, block, audit), id)| {
                    let p = scored(id, *severity, *block);
                    if *audit || *block { p.with_mode(PolicyMode::Audit) } else { p }
                })
                .collect();
            let result = futures::executor::block_on(verifier().verify(
                VerifyRequest::new(json!({"reply": "hi"}), reply_contract()).policies(policies),
            ))
            .unwrap();
            prop_assert!(result.allowed);
            prop_assert_eq!(result.enforcement.violations.len(), specs.len());
        }
    }
}
