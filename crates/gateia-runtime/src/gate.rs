//! The model gate: call a model, hold its output to a contract with bounded
//! repair, then run policies before releasing anything.
//!
//! # Flow
//! 1. Resolve the adapter for the model name (unknown → error, no report)
//! 2. Resolve policy references (unknown → error, no report)
//! 3. Repair loop: generate, extract, validate; on failure append a repair
//!    instruction to the prompt and try again, at most `max_retries` times
//! 4. Exhausted → contract-failure error with report
//! 5. Evaluate policies; block → error or non-allowed result per `on_block`
//! 6. Release the validated (possibly rewritten) value with usage figures

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

use gateia_core::{
    format_repair_instruction, Contract, ContractOutcome, ContractStatus, EnforcementReport,
    ErrorKind, GateiaError, PolicyContext, PolicyMode, PolicyRef, Prompt, Verifier, VerifyRequest,
    VerifyResult,
};

use crate::config::{ConfigError, RuntimeConfig};
use crate::providers::{GenerateOptions, ModelAdapter, ModelRegistry, TokenUsage};

/// Whether failed contract checks are sent back to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairMode {
    /// Single attempt, whatever `max_retries` says
    Off,
    /// Retry with repair instructions (default budget when none is set)
    Auto,
}

/// What to do when an enforced policy blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnBlock {
    /// Fail with a policy-blocked error carrying the report
    #[default]
    Throw,
    /// Return a non-allowed result with the report
    Return,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractBehavior {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

/// Per-call behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateBehavior {
    #[serde(default)]
    pub contract: ContractBehavior,

    #[serde(default)]
    pub on_block: OnBlock,

    /// `Some(Audit)` puts every policy in audit mode for this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<PolicyMode>,
}

impl GateBehavior {
    /// Repair retries allowed after the first attempt.
    ///
    /// `Off` → 0; `Auto` → explicit `max_retries` if positive, else
    /// `auto_default`; unset → explicit `max_retries` or 0.
    pub fn retry_budget(&self, auto_default: u32) -> u32 {
        match self.contract.repair {
            Some(RepairMode::Off) => 0,
            Some(RepairMode::Auto) => match self.contract.max_retries {
                Some(n) if n > 0 => n,
                _ => auto_default,
            },
            None => self.contract.max_retries.unwrap_or(0),
        }
    }
}

/// Input to [`Gate::gate`].
#[derive(Clone)]
pub struct GateRequest {
    pub model: String,
    pub prompt: Prompt,
    pub contract: Arc<dyn Contract>,
    pub policies: Vec<PolicyRef>,
    pub behavior: GateBehavior,
    pub options: GenerateOptions,
    pub include_raw_output: bool,
    pub metadata: BTreeMap<String, String>,
}

impl GateRequest {
    pub fn new(
        model: impl Into<String>,
        prompt: impl Into<Prompt>,
        contract: impl Contract + 'static,
    ) -> Self {
        Self::with_shared_contract(model, prompt, Arc::new(contract))
    }

    pub fn with_shared_contract(
        model: impl Into<String>,
        prompt: impl Into<Prompt>,
        contract: Arc<dyn Contract>,
    ) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            contract,
            policies: Vec::new(),
            behavior: GateBehavior::default(),
            options: GenerateOptions::default(),
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

    pub fn behavior(mut self, behavior: GateBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn repair(mut self, repair: RepairMode) -> Self {
        self.behavior.contract.repair = Some(repair);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.behavior.contract.max_retries = Some(max_retries);
        self
    }

    pub fn on_block(mut self, on_block: OnBlock) -> Self {
        self.behavior.on_block = on_block;
        self
    }

    pub fn mode(mut self, mode: PolicyMode) -> Self {
        self.behavior.mode = Some(mode);
        self
    }

    pub fn options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
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

impl fmt::Debug for GateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateRequest")
            .field("model", &self.model)
            .field("prompt", &self.prompt)
            .field("policies", &self.policies)
            .field("behavior", &self.behavior)
            .field("options", &self.options)
            .field("include_raw_output", &self.include_raw_output)
            .finish_non_exhaustive()
    }
}

/// Model usage for one gate call, summed over every attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateUsage {
    /// Adapter name
    pub provider: String,
    pub model: String,
    pub tokens: TokenUsage,
    pub latency_ms: u64,
    pub attempts: u32,
}

/// Outcome of [`Gate::gate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub allowed: bool,

    /// Validated, possibly rewritten value; `None` when blocked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_output: Option<Value>,

    pub trace_id: String,
    pub enforcement: EnforcementReport,
    pub usage: GateUsage,

    /// Last candidate handed to the contract, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<Value>,
}

/// Model gate. Share behind an `Arc`; register overrides before sharing.
pub struct Gate {
    verifier: Verifier,
    registry: ModelRegistry,
    repair_retries: u32,
}

impl Gate {
    /// Gate with the built-in policy library and default model routes.
    pub fn new(config: &RuntimeConfig) -> Self {
        Self::builder().config(config.clone()).build()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(&RuntimeConfig::from_env()?))
    }

    pub fn builder() -> GateBuilder {
        GateBuilder::default()
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Send exactly `model` to `adapter`.
    pub fn register_override(
        &mut self,
        model: impl Into<String>,
        adapter: Arc<dyn ModelAdapter>,
    ) -> &mut Self {
        self.registry.register_override(model, adapter);
        self
    }

    /// Check output that already exists (no model call).
    pub async fn verify(&self, request: VerifyRequest) -> Result<VerifyResult, GateiaError> {
        self.verifier.verify(request).await
    }

    /// Call the model and release its output only if it passes the contract
    /// and the policies.
    pub async fn gate(&self, request: GateRequest) -> Result<GateResult, GateiaError> {
        let trace_id = self.verifier.next_trace_id();
        let span = tracing::debug_span!("gate", trace_id = %trace_id, model = %request.model);
        self.run(trace_id, request).instrument(span).await
    }

    async fn run(&self, trace_id: String, request: GateRequest) -> Result<GateResult, GateiaError> {
        let adapter = self.registry.resolve(&request.model).ok_or_else(|| {
            tracing::warn!(model = %request.model, "no adapter routes this model");
            GateiaError::new(ErrorKind::UnknownProvider(request.model.clone()), trace_id.clone())
        })?;
        let policies = self.verifier.resolve(&request.policies, &trace_id)?;

        let max_retries = request.behavior.retry_budget(self.repair_retries);
        let mut options = request.options.clone();
        options.model = Some(request.model.clone());

        let mut usage = GateUsage {
            provider: adapter.name().to_string(),
            model: request.model.clone(),
            tokens: TokenUsage::default(),
            latency_ms: 0,
            attempts: 0,
        };
        let mut prompt = request.prompt.clone();

        let (status, validated, candidate) = loop {
            usage.attempts += 1;
            tracing::debug!(attempt = usage.attempts, max_retries, "invoking model adapter");

            let generation = adapter.generate(&prompt, &options).await.map_err(|e| {
                tracing::warn!(adapter = adapter.name(), error = %e, "model adapter failed");
                GateiaError::new(ErrorKind::Adapter(adapter.name().to_string()), trace_id.clone())
                    .with_cause(e)
            })?;

            if let Some(tokens) = generation.tokens {
                usage.tokens += tokens;
            }
            usage.latency_ms = usage
                .latency_ms
                .saturating_add(generation.latency_ms.unwrap_or(0));

            let raw = generation
                .structured
                .unwrap_or(Value::String(generation.text));
            let check = self.verifier.check_contract(request.contract.as_ref(), raw);

            match check.outcome {
                ContractOutcome::Valid { data } => {
                    let status = if usage.attempts == 1 {
                        ContractStatus::Pass
                    } else {
                        ContractStatus::Repaired
                    };
                    break (status, data, check.candidate);
                }
                ContractOutcome::Invalid { error, errors } => {
                    if usage.attempts > max_retries {
                        tracing::warn!(attempts = usage.attempts, %error, "contract repair exhausted");
                        let report = self.verifier.synthesizer().exhausted(errors, usage.attempts);
                        return Err(GateiaError::new(ErrorKind::ContractFailed, trace_id)
                            .with_report(report));
                    }
                    tracing::warn!(attempt = usage.attempts, %error, "contract check failed, requesting repair");
                    prompt = repair_prompt(prompt, &error);
                }
            }
        };

        let context = PolicyContext::new(trace_id.clone())
            .with_model(request.model.clone())
            .with_prompt(request.prompt)
            .with_metadata(request.metadata);
        let enforcement = self
            .verifier
            .enforce(status, validated, &policies, &context, request.behavior.mode)
            .await?;

        let raw_output = request.include_raw_output.then_some(candidate);

        if enforcement.blocked {
            tracing::warn!(
                violations = enforcement.report.violations.len(),
                on_block = ?request.behavior.on_block,
                "output blocked by policy"
            );
            return match request.behavior.on_block {
                OnBlock::Throw => Err(GateiaError::new(ErrorKind::PolicyBlocked, trace_id)
                    .with_report(enforcement.report)),
                OnBlock::Return => Ok(GateResult {
                    allowed: false,
                    safe_output: None,
                    trace_id,
                    enforcement: enforcement.report,
                    usage,
                    raw_output,
                }),
            };
        }

        tracing::debug!(attempts = usage.attempts, status = ?status, "output released");
        Ok(GateResult {
            allowed: true,
            safe_output: Some(enforcement.output),
            trace_id,
            enforcement: enforcement.report,
            usage,
            raw_output,
        })
    }
}

/// Next prompt after a failed contract check.
fn repair_prompt(prompt: Prompt, error: &str) -> Prompt {
    match prompt {
        Prompt::Text(text) => Prompt::Text(format!(
            "{}\n\nUser: {}",
            text,
            format_repair_instruction(error)
        )),
        Prompt::Chat { system, user } => Prompt::Chat {
            system,
            user: format!(
                "{}\n\n(System: Previous output invalid: {}. Fix it.)",
                user, error
            ),
        },
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("verifier", &self.verifier)
            .field("registry", &self.registry)
            .field("repair_retries", &self.repair_retries)
            .finish()
    }
}

/// Builder for [`Gate`]. Anything left unset gets its default: the built-in
/// policy library, default routes for the config, `RuntimeConfig::default()`.
#[derive(Debug, Default)]
pub struct GateBuilder {
    verifier: Option<Verifier>,
    registry: Option<ModelRegistry>,
    config: Option<RuntimeConfig>,
}

impl GateBuilder {
    pub fn verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Gate {
        let config = self.config.unwrap_or_default();
        Gate {
            verifier: self.verifier.unwrap_or_default(),
            registry: self
                .registry
                .unwrap_or_else(|| ModelRegistry::with_defaults(&config)),
            repair_retries: config.repair_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Generation, ProviderError, ScriptedAdapter};
    use gateia_core::{ActionType, JsonSchemaContract, Policy, PolicyResult};
    use proptest::prelude::*;
    use serde_json::json;
    use std::error::Error as _;

    const MODEL: &str = "test-model";

    fn reply_contract() -> JsonSchemaContract {
        JsonSchemaContract::new(json!({
            "type": "object",
            "required": ["reply"],
            "properties": { "reply": { "type": "string" } }
        }))
        .unwrap()
    }

    fn gate_with(adapter: Arc<ScriptedAdapter>) -> Gate {
        let mut gate = Gate::builder()
            .verifier(Verifier::default().with_trace_ids(|| "trace-gate".to_string()))
            .config(RuntimeConfig::mock())
            .build();
        gate.register_override(MODEL, adapter);
        gate
    }

    fn scripted() -> ScriptedAdapter {
        ScriptedAdapter::new("script")
    }

    #[tokio::test]
    async fn test_mock_openai_passes_first_attempt() {
        let gate = Gate::new(&RuntimeConfig::mock());
        let contract = JsonSchemaContract::new(json!({
            "type": "object",
            "properties": { "mock": { "type": "string" } },
            "required": ["mock"]
        }))
        .unwrap();

        let result = gate
            .gate(GateRequest::new("gpt-4o", "Say hi", contract))
            .await
            .unwrap();

        assert!(result.allowed);
        assert_eq!(result.safe_output, Some(json!({"mock": "output"})));
        assert_eq!(result.enforcement.contract.outcome, ContractStatus::Pass);
        assert_eq!(result.usage.provider, "openai");
        assert_eq!(result.usage.model, "gpt-4o");
        assert_eq!(result.usage.tokens.total_tokens, 15);
        assert_eq!(result.usage.latency_ms, 100);
        assert_eq!(result.usage.attempts, 1);
    }

    #[tokio::test]
    async fn test_unknown_model_is_error_without_report() {
        let gate = Gate::new(&RuntimeConfig::mock());
        let err = gate
            .gate(GateRequest::new("claude-3", "hi", reply_contract()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), &ErrorKind::UnknownProvider("claude-3".to_string()));
        assert!(err.report().is_none());
    }

    #[tokio::test]
    async fn test_unknown_policy_checked_before_model_call() {
        let adapter = Arc::new(scripted().push_text(r#"{"reply": "x"}"#));
        let gate = gate_with(adapter.clone());
        let err = gate
            .gate(GateRequest::new(MODEL, "hi", reply_contract()).policy("no-such-policy"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), &ErrorKind::UnknownPolicy("no-such-policy".to_string()));
        assert_eq!(adapter.calls(), 0);
    }

    #[tokio::test]
    async fn test_repair_succeeds_on_second_attempt() {
        let adapter = Arc::new(
            scripted()
                .push_text("I cannot do JSON today")
                .push_text(r#"{"reply": "fixed"}"#),
        );
        let gate = gate_with(adapter.clone());

        let result = gate
            .gate(GateRequest::new(MODEL, "Write a reply", reply_contract()).repair(RepairMode::Auto))
            .await
            .unwrap();

        assert!(result.allowed);
        assert_eq!(result.safe_output, Some(json!({"reply": "fixed"})));
        assert_eq!(result.enforcement.contract.outcome, ContractStatus::Repaired);
        assert_eq!(result.usage.attempts, 2);

        let prompts = adapter.prompts();
        assert_eq!(prompts[0], Prompt::text("Write a reply"));
        match &prompts[1] {
            Prompt::Text(text) => assert!(text.starts_with(
                "Write a reply\n\nUser: The previous response failed schema validation:\n"
            )),
            other => panic!("expected text prompt, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chat_prompt_repair_appends_to_user() {
        let adapter = Arc::new(
            scripted()
                .push_text("nope")
                .push_text(r#"{"reply": "ok"}"#),
        );
        let gate = gate_with(adapter.clone());

        gate.gate(
            GateRequest::new(
                MODEL,
                Prompt::chat(Some("Be terse".to_string()), "Give JSON"),
                reply_contract(),
            )
            .max_retries(1),
        )
        .await
        .unwrap();

        match &adapter.prompts()[1] {
            Prompt::Chat { system, user } => {
                assert_eq!(system.as_deref(), Some("Be terse"));
                assert!(user.starts_with("Give JSON\n\n(System: Previous output invalid: "));
                assert!(user.ends_with(". Fix it.)"));
            }
            other => panic!("expected chat prompt, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auto_repair_exhausts_after_four_attempts() {
        let adapter = Arc::new(scripted().repeat(Generation::text("still not json")));
        let gate = gate_with(adapter.clone());

        let err = gate
            .gate(
                GateRequest::new(MODEL, "hi", reply_contract())
                    .policy("pii-safe")
                    .repair(RepairMode::Auto),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), &ErrorKind::ContractFailed);
        assert_eq!(err.trace_id(), "trace-gate");
        assert_eq!(adapter.calls(), 4);

        let report = err.report().unwrap();
        assert_eq!(report.contract.outcome, ContractStatus::Fail);
        assert!(!report.contract.errors.is_empty());
        assert!(report.applied_policies.is_empty());
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].policy_id, "contract");
        assert_eq!(report.violations[0].code, "CONTRACT_FAILED");
        assert!(report.violations[0].severity.is_high());
    }

    #[tokio::test]
    async fn test_repair_off_makes_one_attempt() {
        let adapter = Arc::new(scripted().repeat(Generation::text("bad")));
        let gate = gate_with(adapter.clone());

        let err = gate
            .gate(
                GateRequest::new(MODEL, "hi", reply_contract())
                    .repair(RepairMode::Off)
                    .max_retries(5),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), &ErrorKind::ContractFailed);
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_policy_block_throws_by_default() {
        let adapter = Arc::new(scripted().push_text(r#"{"reply": "A risk-free investment!"}"#));
        let gate = gate_with(adapter);

        let err = gate
            .gate(GateRequest::new(MODEL, "hi", reply_contract()).policy("finance-safe"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), &ErrorKind::PolicyBlocked);
        let report = err.report().unwrap();
        assert_eq!(report.contract.outcome, ContractStatus::Pass);
        assert_eq!(report.violations[0].code, "FIN_GUARANTEE");
        assert!(report.actions.iter().any(|a| a.action == ActionType::Block));
    }

    #[tokio::test]
    async fn test_policy_block_can_return() {
        let adapter = Arc::new(scripted().push_text(r#"{"reply": "A risk-free investment!"}"#));
        let gate = gate_with(adapter);

        let result = gate
            .gate(
                GateRequest::new(MODEL, "hi", reply_contract())
                    .policy("finance-safe")
                    .on_block(OnBlock::Return),
            )
            .await
            .unwrap();

        assert!(!result.allowed);
        assert!(result.safe_output.is_none());
        assert_eq!(result.enforcement.violations.len(), 1);
        assert_eq!(result.usage.provider, "script");
    }

    #[tokio::test]
    async fn test_audit_override_releases_output() {
        let adapter = Arc::new(scripted().push_text(r#"{"reply": "A risk-free investment!"}"#));
        let gate = gate_with(adapter);

        let result = gate
            .gate(
                GateRequest::new(MODEL, "hi", reply_contract())
                    .policy("finance-safe")
                    .mode(PolicyMode::Audit),
            )
            .await
            .unwrap();

        assert!(result.allowed);
        assert_eq!(result.enforcement.violations.len(), 1);
        assert_eq!(result.enforcement.actions[0].action, ActionType::Log);
    }

    #[tokio::test]
    async fn test_rewrite_applied_to_released_output() {
        let adapter = Arc::new(scripted().push_text("Oh darn it"));
        let gate = gate_with(adapter);
        let censor = Policy::from_fn("censor", |value, _| {
            let text = value.as_str().unwrap_or_default();
            if text.contains("darn") {
                let replaced = text.replace("darn", "d**n");
                PolicyResult::rewrite(move |_| Value::String(replaced))
            } else {
                PolicyResult::pass()
            }
        });

        let result = gate
            .gate(
                GateRequest::new(MODEL, "hi", JsonSchemaContract::new(json!({"type": "string"})).unwrap())
                    .policy(censor),
            )
            .await
            .unwrap();

        assert_eq!(result.safe_output, Some(json!("Oh d**n it")));
        assert!(result.enforcement.was_rewritten());
    }

    #[tokio::test]
    async fn test_adapter_error_wrapped_with_source() {
        let adapter = Arc::new(scripted().push_error(ProviderError::AuthError));
        let gate = gate_with(adapter);

        let err = gate
            .gate(GateRequest::new(MODEL, "hi", reply_contract()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), &ErrorKind::Adapter("script".to_string()));
        assert!(err.report().is_none());
        assert_eq!(err.source().unwrap().to_string(), "Authentication failed");
    }

    #[tokio::test]
    async fn test_structured_output_preferred_over_text() {
        let adapter = Arc::new(
            scripted().push(Generation::text("ignored").with_structured(json!({"reply": "s"}))),
        );
        let gate = gate_with(adapter);

        let result = gate
            .gate(GateRequest::new(MODEL, "hi", reply_contract()).include_raw_output(true))
            .await
            .unwrap();

        assert_eq!(result.safe_output, Some(json!({"reply": "s"})));
        assert_eq!(result.raw_output, Some(json!({"reply": "s"})));
    }

    #[tokio::test]
    async fn test_fenced_json_extracted_from_text() {
        let adapter = Arc::new(scripted().push_text("Here you go:\n```json\n{\"reply\": \"hi\"}\n```"));
        let gate = gate_with(adapter);

        let result = gate
            .gate(GateRequest::new(MODEL, "hi", reply_contract()))
            .await
            .unwrap();

        assert_eq!(result.safe_output, Some(json!({"reply": "hi"})));
        assert!(result.raw_output.is_none());
    }

    #[tokio::test]
    async fn test_usage_accumulates_over_attempts() {
        let attempt = |text: &str| {
            Generation::text(text)
                .with_tokens(TokenUsage::new(10, 5))
                .with_latency_ms(100)
        };
        let adapter = Arc::new(
            scripted()
                .push(attempt("bad"))
                .push(attempt("worse"))
                .push(attempt(r#"{"reply": "good"}"#)),
        );
        let gate = gate_with(adapter);

        let result = gate
            .gate(GateRequest::new(MODEL, "hi", reply_contract()).repair(RepairMode::Auto))
            .await
            .unwrap();

        assert_eq!(result.usage.attempts, 3);
        assert_eq!(result.usage.tokens, TokenUsage::new(30, 15));
        assert_eq!(result.usage.latency_ms, 300);
    }

    #[tokio::test]
    async fn test_context_carries_model_and_original_prompt() {
        let adapter = Arc::new(scripted().push_text("bad").push_text(r#"{"reply": "ok"}"#));
        let gate = gate_with(adapter);
        let probe = Policy::from_fn("probe", |_, ctx| {
            let expected = Some(Prompt::text("original"));
            if ctx.model.as_deref() == Some(MODEL)
                && ctx.prompt == expected
                && ctx.trace_id == "trace-gate"
            {
                PolicyResult::pass()
            } else {
                PolicyResult::block(vec![])
            }
        });

        let result = gate
            .gate(
                GateRequest::new(MODEL, "original", reply_contract())
                    .policy(probe)
                    .max_retries(1),
            )
            .await
            .unwrap();
        assert!(result.allowed);
    }

    #[test]
    fn test_retry_budget() {
        let behavior = |repair, max_retries| GateBehavior {
            contract: ContractBehavior { repair, max_retries },
            ..Default::default()
        };
        assert_eq!(behavior(None, None).retry_budget(3), 0);
        assert_eq!(behavior(None, Some(2)).retry_budget(3), 2);
        assert_eq!(behavior(Some(RepairMode::Auto), None).retry_budget(3), 3);
        assert_eq!(behavior(Some(RepairMode::Auto), Some(0)).retry_budget(3), 3);
        assert_eq!(behavior(Some(RepairMode::Auto), Some(5)).retry_budget(3), 5);
        assert_eq!(behavior(Some(RepairMode::Off), Some(5)).retry_budget(3), 0);
    }

    fn arb_repair() -> impl Strategy<Value = Option<RepairMode>> {
        prop_oneof![Just(None), Just(Some(RepairMode::Off)), Just(Some(RepairMode::Auto))]
    }

    proptest! {
        #[test]
        fn attempts_never_exceed_budget(
            repair in arb_repair(),
            max_retries in prop::option::of(0u32..5),
        ) {
            let adapter = Arc::new(scripted().repeat(Generation::text("never valid")));
            let gate = gate_with(adapter.clone());
            let mut request = GateRequest::new(MODEL, "hi", reply_contract());
            request.behavior.contract = ContractBehavior { repair, max_retries };
            let budget = request.behavior.retry_budget(3);

            let err = futures::executor::block_on(gate.gate(request)).unwrap_err();
            prop_assert_eq!(err.kind(), &ErrorKind::ContractFailed);
            prop_assert_eq!(adapter.calls() as u32, budget + 1);
            if repair == Some(RepairMode::Off) {
                prop_assert_eq!(adapter.calls(), 1);
            }
            if repair == Some(RepairMode::Auto) && max_retries.unwrap_or(0) == 0 {
                prop_assert_eq!(adapter.calls(), 4);
            }
        }
    }
}
